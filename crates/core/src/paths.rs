//! On-disk layout of the tkube data root.
//!
//! ```text
//! ~/.tkube/
//! ├── config.json
//! ├── versions/
//! │   └── <version>/
//! │       ├── tsh              # canonical binary (file or symlink into tsh.app)
//! │       └── tsh.app/         # macOS bundle, when the package ships one
//! └── sessions/
//!     └── <environment>/       # isolated TELEPORT_HOME, mode 0700
//! ```
//!
//! The root can be overridden with `TKUBE_HOME` for testing and CI.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "TKUBE_HOME";

/// Resolved locations under the tkube data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Use an explicit data root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the data root.
    ///
    /// Resolution order:
    /// 1. `TKUBE_HOME` environment variable
    /// 2. `~/.tkube`
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn discover() -> Result<Self> {
        if let Ok(dir) = std::env::var(HOME_ENV)
            && !dir.is_empty()
        {
            return Ok(Self::new(dir));
        }

        let home = dirs::home_dir().ok_or_else(|| {
            Error::configuration_with_help(
                "Could not determine home directory",
                format!("Set {HOME_ENV} to choose a data directory"),
            )
        })?;

        Ok(Self::new(home.join(".tkube")))
    }

    /// The data root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root of the installed client versions.
    #[must_use]
    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    /// Root of the per-environment credential directories.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// The persisted configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }
}
