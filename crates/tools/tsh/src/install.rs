//! Idempotent client installation.
//!
//! [`Installer::ensure_installed`] does nothing when the version is already
//! verified. Otherwise each package candidate (tarball, then the macOS
//! installer package) is tried in turn inside a private staging directory
//! `<versions>/.<version>.<pid>.partial/`:
//!
//! ```text
//! .<version>.<pid>.partial/
//! ├── <package file>      downloaded archive
//! ├── tree/               unpacked package
//! └── out/                final layout, renamed to <versions>/<version>
//! ```
//!
//! The staging directory is removed whatever the outcome, and a version
//! directory that fails the post-install probe is removed too, so a failed
//! attempt leaves nothing behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tkube_core::Platform;
use tracing::{debug, info, warn};

use crate::extract::{self, BINARY_NAME, LocatePolicy};
use crate::fetch::PackageFetcher;
use crate::package::{ArchiveFormat, PackageDescriptor, PackageResolver, validate_version};
use crate::registry::{InstalledVersion, VersionRegistry, probe_binary};
use crate::{Error, InstallStage, Result};

/// Installs, lists and removes client versions.
pub struct Installer {
    registry: VersionRegistry,
    platform: Platform,
    resolver: PackageResolver,
    fetcher: Arc<dyn PackageFetcher>,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("registry", &self.registry)
            .field("platform", &self.platform)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl Installer {
    /// Create an installer for `platform` writing into `registry`.
    #[must_use]
    pub fn new(
        registry: VersionRegistry,
        platform: Platform,
        resolver: PackageResolver,
        fetcher: Arc<dyn PackageFetcher>,
    ) -> Self {
        Self {
            registry,
            platform,
            resolver,
            fetcher,
        }
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    /// Target platform.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Canonical binary path of `version`, installed or not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] for malformed versions.
    pub fn binary_path(&self, version: &str) -> Result<PathBuf> {
        self.registry.binary_path(version)
    }

    /// Whether `version` is installed and passes the probe.
    pub async fn is_verified_installed(&self, version: &str) -> bool {
        self.registry.is_verified_installed(version).await
    }

    /// Every verified installed version, ordered by version number.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the registry cannot be read.
    pub async fn list_installed(&self) -> Result<Vec<InstalledVersion>> {
        self.registry.list_installed().await
    }

    /// Remove an installed version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInstalled`] if the version is absent.
    pub fn uninstall(&self, version: &str) -> Result<()> {
        self.registry.uninstall(version)
    }

    /// First line of the version probe's output for an installed version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInstalled`] if the version is absent and
    /// [`Error::Verification`] if the probe fails.
    pub async fn version_info(&self, version: &str) -> Result<String> {
        let output = self.registry.probe(version).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string())
    }

    /// Make sure `version` is installed and verified, returning its binary.
    ///
    /// Performs no network activity when the version is already verified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] or [`Error::Resolution`] before any
    /// download, and [`Error::Install`] naming the failed stage when every
    /// package candidate fails.
    pub async fn ensure_installed(&self, version: &str) -> Result<PathBuf> {
        let version = validate_version(version)?;
        let binary = self.registry.binary_path(version)?;

        if self.registry.is_verified_installed(version).await {
            debug!(%version, ?binary, "Client already installed");
            return Ok(binary);
        }

        let candidates = self.resolver.candidates(version, self.platform)?;
        fs::create_dir_all(self.registry.root())?;

        let mut last_error = None;
        for package in &candidates {
            match self.attempt(version, package).await {
                Ok(path) => {
                    info!(%version, package = %package.file_name, ?path, "Installed client");
                    return Ok(path);
                }
                Err(e) => {
                    warn!(%version, package = %package.file_name, error = %e, "Package install failed");
                    last_error = Some(e);
                }
            }
        }

        let source = last_error.unwrap_or_else(|| {
            Error::resolution(version, self.platform, "no package candidates")
        });
        Err(Error::Install {
            version: version.to_string(),
            stage: source.stage().unwrap_or(InstallStage::Download),
            source: Box::new(source),
        })
    }

    async fn attempt(&self, version: &str, package: &PackageDescriptor) -> Result<PathBuf> {
        let staging = self.staging_dir(version);
        if staging.exists() {
            remove_all(&staging);
        }
        fs::create_dir_all(&staging)?;

        let result = self.install_from(version, package, &staging).await;
        remove_all(&staging);
        result
    }

    async fn install_from(
        &self,
        version: &str,
        package: &PackageDescriptor,
        staging: &Path,
    ) -> Result<PathBuf> {
        let archive = staging.join(&package.file_name);
        self.fetcher.fetch(package, &archive).await?;

        let tree = staging.join("tree");
        match package.format {
            ArchiveFormat::Tarball => extract::unpack_tarball(&archive, &tree)?,
            ArchiveFormat::MacPackage => {
                extract::expand_pkg(self.registry.executor().as_ref(), &archive, &tree).await?;
            }
        }
        fs::remove_file(&archive)?;

        let candidate = extract::locate_client(
            &tree,
            &package.file_name,
            LocatePolicy::for_version(version, self.platform),
        )?;
        let out = staging.join("out");
        extract::place_client(&candidate, &out)?;

        let version_dir = self.registry.version_dir(version)?;
        if version_dir.exists() {
            debug!(?version_dir, "Replacing unverified version directory");
            fs::remove_dir_all(&version_dir)?;
        }
        fs::rename(&out, &version_dir)?;

        let binary = version_dir.join(BINARY_NAME);
        if let Err(e) = probe_binary(self.registry.executor().as_ref(), &binary).await {
            remove_all(&version_dir);
            return Err(e);
        }
        Ok(binary)
    }

    fn staging_dir(&self, version: &str) -> PathBuf {
        self.registry
            .root()
            .join(format!(".{version}.{}.partial", std::process::id()))
    }
}

fn remove_all(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        warn!(?path, error = %e, "Failed to clean up");
    }
}
