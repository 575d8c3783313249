//! On-disk registry of installed client versions.
//!
//! Layout: `<versions>/<version>/tsh`, where `tsh` is either the executable
//! or a symbolic link into a co-located `tsh.app` bundle. Directories whose
//! names start with `.` are staging areas and never count as versions.
//!
//! Nothing is cached: every query re-reads the filesystem and re-runs the
//! version probe.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tkube_core::{Invocation, ProcessExecutor};
use tracing::{debug, info};

use crate::extract::BINARY_NAME;
use crate::package::{numeric_key, validate_version};
use crate::{Error, Result};

/// Arguments of the version probe.
pub const PROBE_ARGS: &[&str] = &["version", "--client"];

/// A verified installed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    /// The version.
    pub version: String,
    /// Canonical binary path.
    pub binary_path: PathBuf,
}

/// Registry of client versions under one directory.
#[derive(Clone)]
pub struct VersionRegistry {
    root: PathBuf,
    executor: Arc<dyn ProcessExecutor>,
}

impl std::fmt::Debug for VersionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionRegistry")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl VersionRegistry {
    /// Create a registry rooted at `root`, probing binaries with `executor`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            root: root.into(),
            executor,
        }
    }

    /// The registry root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The executor used for probes.
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn ProcessExecutor> {
        &self.executor
    }

    /// Directory of `version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] for malformed versions.
    pub fn version_dir(&self, version: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_version(version)?))
    }

    /// Canonical binary path of `version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] for malformed versions.
    pub fn binary_path(&self, version: &str) -> Result<PathBuf> {
        Ok(self.version_dir(version)?.join(BINARY_NAME))
    }

    /// Run the version probe against `version`, returning its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInstalled`] if the binary is absent or not
    /// executable, and [`Error::Verification`] if the probe fails.
    pub async fn probe(&self, version: &str) -> Result<String> {
        let binary = self.binary_path(version)?;
        if !is_executable(&binary) {
            return Err(Error::NotInstalled(version.to_string()));
        }
        probe_binary(self.executor.as_ref(), &binary).await
    }

    /// Whether `version` is present, executable and passes the probe.
    pub async fn is_verified_installed(&self, version: &str) -> bool {
        match self.probe(version).await {
            Ok(_) => true,
            Err(e) => {
                debug!(%version, error = %e, "Client version not verified");
                false
            }
        }
    }

    /// Every verified installed version, ordered by version number.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the registry root exists but cannot be read.
    pub async fn list_installed(&self) -> Result<Vec<InstalledVersion>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.') && validate_version(name).is_ok())
            .collect();
        names.sort_by_key(|name| numeric_key(name));

        let mut installed = Vec::with_capacity(names.len());
        for version in names {
            if self.is_verified_installed(&version).await {
                installed.push(InstalledVersion {
                    binary_path: self.root.join(&version).join(BINARY_NAME),
                    version,
                });
            }
        }
        Ok(installed)
    }

    /// Remove `version` and everything under its directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInstalled`] if the version directory is absent.
    pub fn uninstall(&self, version: &str) -> Result<()> {
        let dir = self.version_dir(version)?;
        if !dir.is_dir() {
            return Err(Error::NotInstalled(version.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        info!(%version, ?dir, "Uninstalled client version");
        Ok(())
    }
}

/// Run the version probe against a binary.
///
/// # Errors
///
/// Returns [`Error::Verification`] if the binary cannot run or exits with
/// a failure.
pub async fn probe_binary(executor: &dyn ProcessExecutor, binary: &Path) -> Result<String> {
    let invocation = Invocation::new(binary).args(PROBE_ARGS.iter().copied());
    let output = executor
        .output(&invocation)
        .await
        .map_err(|e| Error::verification(binary.display(), e.to_string()))?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(Error::verification(
            binary.display(),
            format!(
                "version probe exited with {}: {}",
                output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                output.combined().trim()
            ),
        ))
    }
}

/// Whether `path` (following links) is a file with an executable bit set.
#[must_use]
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
