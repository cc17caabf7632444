//! Environment-based configuration
//!
//! Variables are named `<PREFIX>_<NAME>`; the default prefix is
//! `EXPECTKIT`. See [`SessionBuilder::from_env`](crate::SessionBuilder::from_env)
//! for the variables a session reads.

use std::collections::HashMap;
use std::time::Duration;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "EXPECTKIT";

/// Variable names understood by [`SessionBuilder`](crate::SessionBuilder).
pub mod vars {
    /// Default timeout in milliseconds.
    pub const TIMEOUT_MS: &str = "TIMEOUT_MS";
    /// Strip ANSI escape sequences (`1`, `true`, `yes`, `on`).
    pub const STRIP_ANSI: &str = "STRIP_ANSI";
    /// Retention policy: `retain` or `consume`.
    pub const RETENTION: &str = "RETENTION";
    /// PTY rows.
    pub const PTY_ROWS: &str = "PTY_ROWS";
    /// PTY columns.
    pub const PTY_COLS: &str = "PTY_COLS";
}

/// Environment variable reader.
///
/// Values set with [`EnvConfig::with_value`] shadow the process
/// environment, which keeps tests away from global state.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
    overrides: HashMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a reader for variables starting with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: HashMap::new(),
        }
    }

    /// Shadow a variable with a fixed value.
    pub fn with_value(mut self, name: &str, value: impl Into<String>) -> Self {
        self.overrides.insert(name.to_uppercase(), value.into());
        self
    }

    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(&name.to_uppercase()) {
            return Some(value.clone());
        }
        std::env::var(self.var_name(name)).ok()
    }

    /// Get a parsed value. Unparseable values count as unset.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Get a boolean value.
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Get a duration in milliseconds.
    pub fn duration_millis(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_name() {
        assert_eq!(EnvConfig::default().var_name("timeout_ms"), "EXPECTKIT_TIMEOUT_MS");
        assert_eq!(EnvConfig::new("").var_name("x"), "X");
    }

    #[test]
    fn test_overrides_shadow_environment() {
        let config = EnvConfig::new("EXPECTKIT_TEST_UNSET_PREFIX")
            .with_value(vars::TIMEOUT_MS, "1500")
            .with_value(vars::STRIP_ANSI, "Yes")
            .with_value(vars::PTY_ROWS, "forty");

        assert_eq!(
            config.duration_millis(vars::TIMEOUT_MS),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(config.bool(vars::STRIP_ANSI), Some(true));
        assert_eq!(config.parse::<u16>(vars::PTY_ROWS), None);
        assert_eq!(config.get(vars::RETENTION), None);
    }
}
