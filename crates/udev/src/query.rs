//! Interactive query and dump interface
//!
//! Options are handled in command line order, the way `getopt` would
//! see them: `-d`, `-V`, `-h` and a bad `-q` type end processing where
//! they appear, so `-V -d` prints the version and `-d -V` dumps.
//! Everything is printed to the supplied writer; diagnostics go through
//! `tracing` to stderr.

use clap::{Arg, ArgAction, Command};
use common::Error;
use nix::errno::Errno;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};
use udevdb::{DeviceRecord, RecordStore};

use crate::UDEV_VERSION;

/// Usage text printed by `-h` and on bad invocations
pub const USAGE: &str = "Usage: [-pqrdVh]
  -q TYPE  query database for the specified value:
             'name'    name of device node
             'symlink' pointing to node
             'owner'   of node
             'group'   of node
  -p PATH  sysfs device path used for query
  -r       print udev root
  -d       dump whole database
  -V       print udev version
  -h       print this help text

";

/// Record field requested by `-q`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    #[default]
    None,
    Name,
    Symlink,
    Owner,
    Group,
}

impl FromStr for QueryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(QueryType::Name),
            "symlink" => Ok(QueryType::Symlink),
            "owner" => Ok(QueryType::Owner),
            "group" => Ok(QueryType::Group),
            other => Err(Error::InvalidQueryType(other.to_string())),
        }
    }
}

/// Accumulated query options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    pub query_type: QueryType,
    pub sysfs_path: String,
    pub root_prefix: bool,
}

impl QueryRequest {
    /// The requested field of `record`, or `None` for [`QueryType::None`]
    pub fn project(&self, record: &DeviceRecord, udev_root: &Path) -> Option<String> {
        let value = match self.query_type {
            QueryType::None => return None,
            QueryType::Name if self.root_prefix => {
                udev_root.join(&record.name).display().to_string()
            }
            QueryType::Name => record.name.clone(),
            QueryType::Symlink => record.symlink.clone(),
            QueryType::Owner => record.owner.clone(),
            QueryType::Group => record.group.clone(),
        };
        Some(value)
    }
}

/// Five tagged lines and a blank separator
pub fn format_record(record: &DeviceRecord) -> String {
    format!(
        "P: {}\nN: {}\nS: {}\nO: {}\nG: {}\n\n",
        record.path, record.name, record.symlink, record.owner, record.group
    )
}

fn command() -> Command {
    Command::new("udev")
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("path")
                .short('p')
                .value_name("PATH")
                .action(ArgAction::Append)
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("query")
                .short('q')
                .value_name("TYPE")
                .action(ArgAction::Append)
                .allow_hyphen_values(true),
        )
        .arg(Arg::new("root").short('r').action(ArgAction::Count))
        .arg(Arg::new("dump").short('d').action(ArgAction::Count))
        .arg(Arg::new("version").short('V').action(ArgAction::Count))
        .arg(Arg::new("help").short('h').action(ArgAction::Count))
        // non-option arguments are ignored
        .arg(
            Arg::new("operands")
                .action(ArgAction::Append)
                .num_args(1..)
                .hide(true),
        )
}

/// One parsed option, in command line order
#[derive(Debug, Clone, PartialEq, Eq)]
enum QueryOption {
    Path(String),
    Query(String),
    Root,
    Dump,
    Version,
    Help,
}

/// Short options that take a value
const VALUE_OPTIONS: [char; 2] = ['p', 'q'];

/// Split bundled short options into one token per option
///
/// `-rdpclass/tty` becomes `-r -d -p class/tty`. A value option takes the
/// rest of its cluster, or the next argument verbatim. Nothing after `--`
/// is split.
fn split_clusters<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    let mut tokens = Vec::with_capacity(args.len());
    let mut args = args.iter().map(AsRef::as_ref);
    tokens.extend(args.next().map(str::to_string));

    let mut expect_value = false;
    while let Some(arg) = args.next() {
        if expect_value {
            tokens.push(arg.to_string());
            expect_value = false;
            continue;
        }
        if arg == "--" {
            tokens.push(arg.to_string());
            tokens.extend(args.by_ref().map(str::to_string));
            break;
        }
        // long options and bare operands stay whole
        let Some(cluster) = arg
            .strip_prefix('-')
            .filter(|c| !c.is_empty() && !c.starts_with('-'))
        else {
            tokens.push(arg.to_string());
            continue;
        };

        for (at, c) in cluster.char_indices() {
            tokens.push(format!("-{}", c));
            if VALUE_OPTIONS.contains(&c) {
                let rest = &cluster[at + c.len_utf8()..];
                if rest.is_empty() {
                    expect_value = true;
                } else {
                    tokens.push(rest.to_string());
                }
                break;
            }
        }
    }
    tokens
}

/// Options in the order they appear in split `tokens`
///
/// Every occurrence is kept, so a repeated flag takes effect at its first
/// position. Operands are skipped.
fn options_in_order(tokens: &[String]) -> Vec<QueryOption> {
    let mut options = Vec::new();
    let mut tokens = tokens.iter().skip(1);

    while let Some(token) = tokens.next() {
        let option = match token.as_str() {
            "--" => break,
            "-p" => tokens.next().cloned().map(QueryOption::Path),
            "-q" => tokens.next().cloned().map(QueryOption::Query),
            "-r" => Some(QueryOption::Root),
            "-d" => Some(QueryOption::Dump),
            "-V" => Some(QueryOption::Version),
            "-h" => Some(QueryOption::Help),
            _ => None,
        };
        options.extend(option);
    }
    options
}

/// Parse `args` (program name first) into options in command line order
///
/// clap validates the split command line. The order is read from the
/// tokens because clap keeps only the last index of a counted flag.
fn parse_options<S: AsRef<str>>(args: &[S]) -> Result<Vec<QueryOption>, clap::Error> {
    let tokens = split_clusters(args);
    command().try_get_matches_from(&tokens)?;
    Ok(options_in_order(&tokens))
}

/// Options that still parse when the full command line does not
///
/// Mirrors `getopt`, which acts on every option before the bad one, even
/// inside the same cluster.
fn parse_valid_prefix<S: AsRef<str>>(args: &[S]) -> Vec<QueryOption> {
    let tokens = split_clusters(args);
    (1..tokens.len())
        .rev()
        .map(|len| &tokens[..len])
        .find(|prefix| command().try_get_matches_from(*prefix).is_ok())
        .map(options_in_order)
        .unwrap_or_default()
}

struct Query<'a> {
    store: &'a mut dyn RecordStore,
    udev_root: &'a Path,
    out: &'a mut dyn Write,
}

impl Query<'_> {
    fn run<S: AsRef<str>>(&mut self, args: &[S]) -> io::Result<i32> {
        let (options, pending) = match parse_options(args) {
            Ok(options) => (options, None),
            Err(e) => {
                warn!("Invalid option: {}", e.kind());
                (parse_valid_prefix(args), Some(Errno::EINVAL as i32))
            }
        };

        let mut request = QueryRequest::default();

        for option in options {
            debug!("option {:?}", option);
            match option {
                QueryOption::Path(path) => request.sysfs_path = path,
                QueryOption::Query(kind) => match kind.parse() {
                    Ok(query_type) => request.query_type = query_type,
                    Err(e) => {
                        debug!("{}", e);
                        writeln!(self.out, "unknown query type")?;
                        return Ok(Errno::EINVAL as i32);
                    }
                },
                QueryOption::Root => request.root_prefix = true,
                QueryOption::Dump => return self.dump(),
                QueryOption::Version => {
                    writeln!(self.out, "udev, version {}", UDEV_VERSION)?;
                    return Ok(0);
                }
                QueryOption::Help => return self.help(0),
            }
        }

        if let Some(code) = pending {
            return self.help(code);
        }

        if request.query_type != QueryType::None {
            return self.lookup(&request);
        }

        if request.root_prefix {
            writeln!(self.out, "{}", self.udev_root.display())?;
            return Ok(0);
        }

        self.help(Errno::EINVAL as i32)
    }

    fn help(&mut self, retval: i32) -> io::Result<i32> {
        self.out.write_all(USAGE.as_bytes())?;
        Ok(retval)
    }

    fn open(&mut self) -> io::Result<Option<i32>> {
        match self.store.open_read_only() {
            Ok(()) => Ok(None),
            Err(e) => {
                warn!("Failed to open record store: {}", e);
                writeln!(self.out, "unable to open udev database")?;
                Ok(Some(Errno::EACCES as i32))
            }
        }
    }

    fn dump(&mut self) -> io::Result<i32> {
        if let Some(code) = self.open()? {
            return Ok(code);
        }

        let out = &mut *self.out;
        let mut write_error = None;
        let result = self.store.dump(&mut |record| {
            if write_error.is_none()
                && let Err(e) = out.write_all(format_record(record).as_bytes())
            {
                write_error = Some(e);
            }
        });
        self.close();

        if let Some(e) = write_error {
            return Err(e);
        }
        match result {
            Ok(count) => {
                debug!("Dumped {} records", count);
                Ok(0)
            }
            Err(e) => {
                warn!("Failed to dump record store: {}", e);
                Ok(e.errno())
            }
        }
    }

    fn lookup(&mut self, request: &QueryRequest) -> io::Result<i32> {
        if request.sysfs_path.is_empty() {
            writeln!(self.out, "query needs device path specified")?;
            return Ok(Errno::EINVAL as i32);
        }

        if let Some(code) = self.open()? {
            return Ok(code);
        }

        let status = match self.store.get(&request.sysfs_path) {
            Ok(record) => {
                let value = request.project(&record, self.udev_root).unwrap_or_default();
                writeln!(self.out, "{}", value).map(|_| 0)
            }
            Err(e) => {
                debug!("Lookup of '{}' failed: {}", request.sysfs_path, e);
                writeln!(self.out, "device not found in udev database").map(|_| e.errno())
            }
        };
        self.close();
        status
    }

    fn close(&mut self) {
        if let Err(e) = self.store.close() {
            warn!("Failed to close record store: {}", e);
        }
    }
}

/// Run one interactive command and return its exit code
///
/// `args` is the full argument vector including the program name.
pub fn run_interactive<S: AsRef<str>>(
    args: &[S],
    store: &mut dyn RecordStore,
    udev_root: &Path,
    out: &mut dyn Write,
) -> i32 {
    let mut query = Query {
        store,
        udev_root,
        out,
    };
    let code = match query.run(args) {
        Ok(code) => code,
        Err(e) => {
            warn!("Failed to write output: {}", e);
            Errno::EIO as i32
        }
    };
    if let Err(e) = query.out.flush() {
        warn!("Failed to flush output: {}", e);
        return Errno::EIO as i32;
    }
    code
}
