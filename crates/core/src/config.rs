//! Persisted environment configuration.
//!
//! The configuration is a flat mapping of environment name to proxy address,
//! with an optional pinned client version and an optional identity per
//! environment. The client-management crates only read it, except for
//! writing back a detected version through [`ConfigStore::set_tsh_version`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// A named binding of a proxy to an optional client version and identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Proxy address, `host[:port]`.
    pub proxy: String,
    /// Pinned client version; detected and written back when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsh_version: Option<String>,
    /// Identity used for authentication in this environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Environment {
    /// Create an environment for a proxy with nothing pinned.
    #[must_use]
    pub fn new(proxy: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
            ..Self::default()
        }
    }

    /// Pin a client version.
    #[must_use]
    pub fn with_tsh_version(mut self, version: impl Into<String>) -> Self {
        self.tsh_version = Some(version.into());
        self
    }

    /// Set the environment-specific identity.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// The pinned version, treating an empty string as unpinned.
    #[must_use]
    pub fn pinned_version(&self) -> Option<&str> {
        self.tsh_version.as_deref().filter(|v| !v.is_empty())
    }
}

fn default_auto_login() -> bool {
    true
}

/// The whole tkube configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Environments keyed by name.
    #[serde(default)]
    pub environments: BTreeMap<String, Environment>,
    /// Identity used when an environment does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_user: Option<String>,
    /// Log in automatically when a session is missing.
    #[serde(default = "default_auto_login")]
    pub auto_login: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environments: BTreeMap::new(),
            default_user: None,
            auto_login: default_auto_login(),
        }
    }
}

impl Config {
    /// The configuration written on first use.
    #[must_use]
    pub fn sample() -> Self {
        let mut environments = BTreeMap::new();
        environments.insert(
            "prod".to_string(),
            Environment::new("teleport.prod.env:443"),
        );
        environments.insert(
            "test".to_string(),
            Environment::new("teleport.test.env:443"),
        );
        Self {
            environments,
            ..Self::default()
        }
    }

    /// Look up an environment by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEnvironment`] if no such environment exists.
    pub fn environment(&self, name: &str) -> Result<&Environment> {
        self.environments
            .get(name)
            .ok_or_else(|| Error::unknown_environment(name))
    }

    /// The default identity, treating an empty string as unset.
    #[must_use]
    pub fn default_user(&self) -> Option<&str> {
        self.default_user.as_deref().filter(|u| !u.is_empty())
    }
}

/// Load/save seam for the configuration.
pub trait ConfigStore: Send + Sync {
    /// Load the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or parsed.
    fn load(&self) -> Result<Config>;

    /// Persist the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    fn save(&self, config: &Config) -> Result<()>;

    /// Load a single environment.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the environment is unknown.
    fn environment(&self, name: &str) -> Result<Environment> {
        self.load()?.environment(name).cloned()
    }

    /// Add or replace an environment.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving fails.
    fn set_environment(&self, name: &str, environment: Environment) -> Result<()> {
        let mut config = self.load()?;
        config.environments.insert(name.to_string(), environment);
        self.save(&config)
    }

    /// Remove an environment. Removing an unknown environment is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving fails.
    fn remove_environment(&self, name: &str) -> Result<()> {
        let mut config = self.load()?;
        if config.environments.remove(name).is_some() {
            self.save(&config)?;
        }
        Ok(())
    }

    /// Pin the client version of an environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is unknown or saving fails.
    fn set_tsh_version(&self, name: &str, version: &str) -> Result<()> {
        let mut config = self.load()?;
        let environment = config
            .environments
            .get_mut(name)
            .ok_or_else(|| Error::unknown_environment(name))?;
        environment.tsh_version = Some(version.to_string());
        self.save(&config)
    }
}

/// Configuration stored as pretty-printed JSON on disk.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    /// Create a store backed by the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            info!(path = ?self.path, "Creating default configuration");
            let config = Config::sample();
            self.save(&config)?;
            return Ok(config);
        }

        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::io(e, Some(self.path.clone()), "read config"))?;
        serde_json::from_str(&data).map_err(|e| {
            Error::configuration_with_help(
                format!("Failed to parse {}: {e}", self.path.display()),
                "Fix or remove the file; a default one is created when missing",
            )
        })
    }

    fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(e, Some(parent.to_path_buf()), "create config dir"))?;
        }
        let data = serde_json::to_string_pretty(config)
            .map_err(|e| Error::configuration(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&self.path, data)
            .map_err(|e| Error::io(e, Some(self.path.clone()), "write config"))?;
        debug!(path = ?self.path, "Saved configuration");
        Ok(())
    }
}

/// Configuration held in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<Config>,
}

impl MemoryConfigStore {
    /// Create a store holding the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Config> {
        self.config
            .lock()
            .map(|c| c.clone())
            .map_err(|_| Error::configuration("Configuration lock poisoned"))
    }

    fn save(&self, config: &Config) -> Result<()> {
        let mut guard = self
            .config
            .lock()
            .map_err(|_| Error::configuration("Configuration lock poisoned"))?;
        *guard = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_creates_sample() {
        let temp = TempDir::new().unwrap();
        let store = JsonConfigStore::new(temp.path().join("nested").join("config.json"));

        let config = store.load().unwrap();
        assert_eq!(config, Config::sample());
        assert!(config.auto_login);
        assert!(store.path().exists());
    }

    #[test]
    fn test_round_trip_keeps_optional_fields() {
        let temp = TempDir::new().unwrap();
        let store = JsonConfigStore::new(temp.path().join("config.json"));

        let mut config = Config::default();
        config.default_user = Some("alice".into());
        config.environments.insert(
            "prod".into(),
            Environment::new("teleport.example.com:443")
                .with_tsh_version("14.2.1")
                .with_user("ops"),
        );
        store.save(&config).unwrap();

        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_on_disk_field_names() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"environments":{"dev":{"proxy":"dev.example.com:443","tsh_version":"15.0.0"}}}"#,
        )
        .unwrap();

        let config = JsonConfigStore::new(&path).load().unwrap();
        let dev = config.environment("dev").unwrap();
        assert_eq!(dev.proxy, "dev.example.com:443");
        assert_eq!(dev.pinned_version(), Some("15.0.0"));
        assert!(dev.user.is_none());
        assert!(config.auto_login);
    }

    #[test]
    fn test_unparseable_file_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_set_tsh_version() {
        let store = MemoryConfigStore::new(Config::sample());
        store.set_tsh_version("prod", "16.1.0").unwrap();
        assert_eq!(
            store.environment("prod").unwrap().pinned_version(),
            Some("16.1.0")
        );

        let err = store.set_tsh_version("missing", "1.0.0").unwrap_err();
        assert!(matches!(err, Error::UnknownEnvironment { .. }));
    }

    #[test]
    fn test_set_and_remove_environment() {
        let store = MemoryConfigStore::new(Config::default());
        store
            .set_environment("qa", Environment::new("qa.example.com"))
            .unwrap();
        assert_eq!(store.environment("qa").unwrap().proxy, "qa.example.com");

        store.remove_environment("qa").unwrap();
        assert!(store.environment("qa").is_err());
        store.remove_environment("qa").unwrap();
    }

    #[test]
    fn test_empty_strings_are_unset() {
        let env = Environment::new("p").with_tsh_version("");
        assert_eq!(env.pinned_version(), None);

        let config = Config {
            default_user: Some(String::new()),
            ..Config::default()
        };
        assert_eq!(config.default_user(), None);
    }
}
