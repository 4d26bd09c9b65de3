//! udev configuration management

use anyhow::{Context, Result, anyhow};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "UDEV_CONFIG_FILE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdevConfig {
    /// Directory device nodes are created in
    #[serde(default = "UdevConfig::default_root")]
    pub udev_root: PathBuf,
    /// Record store file
    #[serde(default = "UdevConfig::default_db")]
    pub udev_db: PathBuf,
    /// sysfs mount point
    #[serde(default = "UdevConfig::default_sysfs_root")]
    pub sysfs_root: PathBuf,
    #[serde(default = "UdevConfig::default_log_level")]
    pub log_level: String,
    /// Owner for nodes no rule assigns one to
    #[serde(default = "UdevConfig::default_owner")]
    pub default_owner: String,
    /// Group for nodes no rule assigns one to
    #[serde(default = "UdevConfig::default_owner")]
    pub default_group: String,
    /// Permission bits for nodes no rule assigns any to
    #[serde(default = "UdevConfig::default_mode")]
    pub default_mode: u32,
    /// System bus notifier
    #[serde(default)]
    pub bus: BusSettings,
    /// Naming rules, first match wins
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusSettings {
    /// Datagram socket notifications are sent to; unset disables the bus
    #[serde(default)]
    pub socket: Option<PathBuf>,
}

/// Naming rule
///
/// # Example Configuration
/// ```toml
/// [[rules]]
/// kernel = "ttyUSB*"
/// name = "usb/tts/%n"
/// symlink = "modem"
/// group = "dialout"
/// mode = 0o660
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Kernel name pattern; shell wildcards `*`, `?` and `[...]`
    pub kernel: String,
    /// Only match devices of this subsystem
    #[serde(default)]
    pub subsystem: Option<String>,
    /// Node name, `%k` = kernel name, `%n` = kernel number
    #[serde(default)]
    pub name: Option<String>,
    /// Space separated symlinks, same substitutions as `name`
    #[serde(default)]
    pub symlink: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub mode: Option<u32>,
}

impl Rule {
    /// Compiled kernel name pattern
    pub fn pattern(&self) -> Result<Pattern, String> {
        Pattern::new(&self.kernel)
            .map_err(|e| format!("rule '{}' has invalid kernel pattern: {}", self.kernel, e))
    }

    /// Check that the rule can be applied safely
    pub fn check(&self) -> Result<(), String> {
        if self.kernel.trim().is_empty() {
            return Err("rule with empty kernel pattern".to_string());
        }
        self.pattern()?;

        let names = self
            .name
            .iter()
            .map(String::as_str)
            .chain(self.symlink.iter().flat_map(|s| s.split_whitespace()));
        for name in names {
            if name.is_empty() || name.starts_with('/') || name.split('/').any(|c| c == "..") {
                return Err(format!(
                    "rule '{}' has invalid node name '{}', must be relative to the device root",
                    self.kernel, name
                ));
            }
        }

        if let Some(mode) = self.mode {
            if mode > 0o7777 {
                return Err(format!("rule '{}' has invalid mode {:#o}", self.kernel, mode));
            }
        }

        Ok(())
    }
}

impl Default for UdevConfig {
    fn default() -> Self {
        Self {
            udev_root: Self::default_root(),
            udev_db: Self::default_db(),
            sysfs_root: Self::default_sysfs_root(),
            log_level: Self::default_log_level(),
            default_owner: Self::default_owner(),
            default_group: Self::default_owner(),
            default_mode: Self::default_mode(),
            bus: BusSettings::default(),
            rules: Vec::new(),
        }
    }
}

impl UdevConfig {
    fn default_root() -> PathBuf {
        PathBuf::from("/dev/")
    }

    fn default_db() -> PathBuf {
        PathBuf::from("/dev/.udevdb")
    }

    fn default_sysfs_root() -> PathBuf {
        PathBuf::from("/sys")
    }

    fn default_log_level() -> String {
        "warn".to_string()
    }

    fn default_owner() -> String {
        "root".to_string()
    }

    fn default_mode() -> u32 {
        0o600
    }

    /// Load configuration from the specified path
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::debug!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: UdevConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the first existing file in `candidates`
    ///
    /// Defaults are used only when none of them exists; a file that is
    /// present but unreadable or invalid is an error.
    pub fn load_first_existing(candidates: &[PathBuf]) -> Result<Self> {
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from the standard locations, or defaults
    pub fn load_or_default() -> Result<Self> {
        let mut candidates = vec![Self::default_path()];
        candidates.extend(Self::user_path());
        Self::load_first_existing(&candidates)
    }

    /// Load the configuration for this invocation
    ///
    /// An explicit `UDEV_CONFIG_FILE` must load; otherwise the standard
    /// locations are tried and defaults used when none exists. Overrides
    /// from `UDEV_ROOT`, `UDEV_DB` and `SYSFS_PATH` are applied last.
    pub fn load_for_invocation(vars: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match vars(CONFIG_FILE_ENV) {
            Some(path) => {
                let path = PathBuf::from(shellexpand::tilde(&path).as_ref());
                Self::load(&path)?
            }
            None => Self::load_or_default()?,
        };
        config.apply_env_overrides(vars);
        config.validate()?;
        Ok(config)
    }

    /// Apply `UDEV_ROOT`, `UDEV_DB` and `SYSFS_PATH` overrides
    pub fn apply_env_overrides(&mut self, vars: impl Fn(&str) -> Option<String>) {
        if let Some(root) = vars("UDEV_ROOT") {
            self.udev_root = PathBuf::from(root);
        }
        if let Some(db) = vars("UDEV_DB") {
            self.udev_db = PathBuf::from(db);
        }
        if let Some(sysfs) = vars("SYSFS_PATH") {
            self.sysfs_root = PathBuf::from(sysfs);
        }
    }

    /// Get the system configuration file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("/etc/udev/udev.toml")
    }

    /// Per-user configuration file, used for interactive queries
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("udev").join("udev.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.udev_root.as_os_str().is_empty() {
            return Err(anyhow!("udev_root must not be empty"));
        }

        if self.default_mode > 0o7777 {
            return Err(anyhow!("Invalid default_mode {:#o}", self.default_mode));
        }

        for rule in &self.rules {
            rule.check().map_err(|e| anyhow!(e))?;
        }

        Ok(())
    }
}
