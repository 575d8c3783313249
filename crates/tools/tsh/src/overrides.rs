//! Explicit version overrides for detection.
//!
//! Overrides are named values handed to the detector instead of being read
//! from the process environment at detection time. [`VersionOverrides::from_env`]
//! takes a one-off snapshot at the program boundary.

use std::collections::BTreeMap;

/// Global override names, in precedence order.
pub const GLOBAL_OVERRIDES: &[&str] = &["TELEPORT_VERSION", "TSH_VERSION", "TELEPORT_TSH_VERSION"];

/// Suffixes of proxy-specific override names, in precedence order.
pub const PROXY_OVERRIDE_SUFFIXES: &[&str] = &["_TELEPORT_VERSION", "_TSH_VERSION"];

/// Named version override values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionOverrides {
    values: BTreeMap<String, String>,
}

impl VersionOverrides {
    /// No overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every override-shaped variable from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let values = std::env::vars()
            .filter(|(name, _)| {
                GLOBAL_OVERRIDES.contains(&name.as_str())
                    || PROXY_OVERRIDE_SUFFIXES.iter().any(|s| name.ends_with(s))
            })
            .collect();
        Self { values }
    }

    /// Set a named override.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Whether no override is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The override names consulted for `proxy`, in precedence order.
    #[must_use]
    pub fn candidate_names(proxy: &str) -> Vec<String> {
        let key = proxy_key(proxy);
        GLOBAL_OVERRIDES
            .iter()
            .map(|name| (*name).to_string())
            .chain(
                PROXY_OVERRIDE_SUFFIXES
                    .iter()
                    .map(|suffix| format!("{key}{suffix}")),
            )
            .collect()
    }

    /// The first non-empty override for `proxy`, with the name it came from.
    #[must_use]
    pub fn lookup(&self, proxy: &str) -> Option<(String, &str)> {
        Self::candidate_names(proxy).into_iter().find_map(|name| {
            let value = self.values.get(&name)?.trim();
            if value.is_empty() {
                None
            } else {
                Some((name, value))
            }
        })
    }
}

/// Upper-cased proxy address with separators replaced by underscores.
///
/// `teleport.example.com:443` becomes `TELEPORT_EXAMPLE_COM_443`.
#[must_use]
pub fn proxy_key(proxy: &str) -> String {
    proxy
        .chars()
        .map(|c| match c {
            ':' | '.' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_key() {
        assert_eq!(proxy_key("teleport.example.com:443"), "TELEPORT_EXAMPLE_COM_443");
        assert_eq!(proxy_key("my-proxy.io"), "MY_PROXY_IO");
    }

    #[test]
    fn test_global_precedence() {
        let overrides = VersionOverrides::new()
            .with("TELEPORT_TSH_VERSION", "13.0.0")
            .with("TSH_VERSION", "14.0.0");
        let (name, value) = overrides.lookup("any.proxy").unwrap();
        assert_eq!(name, "TSH_VERSION");
        assert_eq!(value, "14.0.0");
    }

    #[test]
    fn test_global_beats_proxy_specific() {
        let overrides = VersionOverrides::new()
            .with("PROXY_IO_443_TELEPORT_VERSION", "12.0.0")
            .with("TELEPORT_VERSION", "15.0.0");
        assert_eq!(overrides.lookup("proxy.io:443").unwrap().1, "15.0.0");
    }

    #[test]
    fn test_proxy_specific() {
        let overrides = VersionOverrides::new().with("PROXY_IO_443_TSH_VERSION", "v16.1.0");
        let (name, value) = overrides.lookup("proxy.io:443").unwrap();
        assert_eq!(name, "PROXY_IO_443_TSH_VERSION");
        assert_eq!(value, "v16.1.0");
        assert!(overrides.lookup("other.io:443").is_none());
    }

    #[test]
    fn test_blank_values_are_skipped() {
        let overrides = VersionOverrides::new()
            .with("TELEPORT_VERSION", "  ")
            .with("TSH_VERSION", "14.1.0");
        assert_eq!(overrides.lookup("p").unwrap().1, "14.1.0");
    }

    #[test]
    fn test_from_env_snapshot() {
        temp_env::with_vars(
            [
                ("TELEPORT_VERSION", Some("v15.0.0")),
                ("EXAMPLE_COM_TSH_VERSION", Some("14.0.0")),
                ("UNRELATED_VARIABLE", Some("x")),
            ],
            || {
                let overrides = VersionOverrides::from_env();
                assert_eq!(overrides.lookup("example.com").unwrap().1, "v15.0.0");
                assert!(!overrides.values.contains_key("UNRELATED_VARIABLE"));
                assert!(overrides.values.contains_key("EXAMPLE_COM_TSH_VERSION"));
            },
        );
    }
}
