//! Rule based naming policy
//!
//! The first rule whose kernel pattern matches the device's kernel name
//! (the last component of its sysfs path), and whose subsystem matches
//! when one is given, decides the node name, symlinks and permissions.
//! Anything a rule leaves unset falls back to the configured defaults;
//! the default node name is the kernel name itself.

use crate::config::{Rule, UdevConfig};
use common::{Error, Naming, NamingPolicy, Result};
use glob::Pattern;
use tracing::{debug, info};

/// Naming policy driven by configuration rules
#[derive(Debug, Clone)]
pub struct RuleNamer {
    rules: Vec<Rule>,
    /// Kernel patterns of `rules`, compiled by `init`
    patterns: Option<Vec<Pattern>>,
    default_owner: String,
    default_group: String,
    default_mode: u32,
}

impl RuleNamer {
    pub fn new(rules: Vec<Rule>, owner: &str, group: &str, mode: u32) -> Self {
        Self {
            rules,
            patterns: None,
            default_owner: owner.to_string(),
            default_group: group.to_string(),
            default_mode: mode,
        }
    }

    pub fn from_config(config: &UdevConfig) -> Self {
        Self::new(
            config.rules.clone(),
            &config.default_owner,
            &config.default_group,
            config.default_mode,
        )
    }

    fn find_rule<'a>(
        &'a self,
        patterns: &[Pattern],
        kernel: &str,
        subsystem: &str,
    ) -> Option<&'a Rule> {
        self.rules
            .iter()
            .zip(patterns)
            .find(|(rule, pattern)| {
                pattern.matches(kernel) && rule.subsystem.as_deref().is_none_or(|s| s == subsystem)
            })
            .map(|(rule, _)| rule)
    }
}

impl NamingPolicy for RuleNamer {
    fn init(&mut self) -> Result<()> {
        let mut patterns = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            rule.check().map_err(Error::Naming)?;
            patterns.push(rule.pattern().map_err(Error::Naming)?);
        }
        self.patterns = Some(patterns);
        info!("Naming policy loaded with {} rules", self.rules.len());
        Ok(())
    }

    fn name_device(&self, devpath: &str, subsystem: &str) -> Result<Naming> {
        let Some(patterns) = self.patterns.as_deref() else {
            return Err(Error::Naming("naming rules not loaded".to_string()));
        };

        // the kernel name is the default node name
        let kernel = kernel_name(devpath);
        if matches!(kernel, "" | "." | "..") {
            return Err(Error::Naming(format!("no usable kernel name in '{}'", devpath)));
        }
        let number = kernel_number(kernel);

        let naming = match self.find_rule(patterns, kernel, subsystem) {
            Some(rule) => {
                debug!("'{}' matched rule '{}'", kernel, rule.kernel);
                Naming {
                    name: rule
                        .name
                        .as_deref()
                        .map(|n| expand(n, kernel, number))
                        .unwrap_or_else(|| kernel.to_string()),
                    symlink: rule
                        .symlink
                        .as_deref()
                        .map(|s| expand(s, kernel, number))
                        .unwrap_or_default(),
                    owner: rule.owner.clone().unwrap_or_else(|| self.default_owner.clone()),
                    group: rule.group.clone().unwrap_or_else(|| self.default_group.clone()),
                    mode: rule.mode.unwrap_or(self.default_mode),
                }
            }
            None => {
                debug!("no rule for '{}', using kernel name", kernel);
                Naming {
                    name: kernel.to_string(),
                    symlink: String::new(),
                    owner: self.default_owner.clone(),
                    group: self.default_group.clone(),
                    mode: self.default_mode,
                }
            }
        };

        Ok(naming)
    }
}

/// Last component of a sysfs device path
pub fn kernel_name(devpath: &str) -> &str {
    devpath.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Trailing digits of a kernel name (`ttyS12` -> `12`)
pub fn kernel_number(kernel: &str) -> &str {
    let digits = kernel
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    &kernel[kernel.len() - digits..]
}

/// Substitute `%k` (kernel name) and `%n` (kernel number)
fn expand(template: &str, kernel: &str, number: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('k') => out.push_str(kernel),
            Some('n') => out.push_str(number),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}
