//! Package resolution: which artifact to download for a version and platform.

use std::fmt;
use tkube_core::{Arch, Os, Platform};

use crate::{Error, Result};

/// Default CDN serving client packages.
pub const DEFAULT_CDN_BASE: &str = "https://cdn.teleport.dev";

/// First major version whose macOS installer package is named
/// `teleport-<version>.pkg`. Older majors ship `tsh-<version>.pkg`.
pub const PKG_NAMING_MAJOR_THRESHOLD: u32 = 17;

/// Archive format of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tarball.
    Tarball,
    /// macOS installer package, expanded with `pkgutil`.
    MacPackage,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tarball => f.write_str("tar.gz"),
            Self::MacPackage => f.write_str("pkg"),
        }
    }
}

/// A downloadable package for one version on one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Normalized version.
    pub version: String,
    /// Download URL.
    pub url: String,
    /// File name of the package.
    pub file_name: String,
    /// Archive format.
    pub format: ArchiveFormat,
}

/// Maps versions and platforms to package descriptors.
#[derive(Debug, Clone)]
pub struct PackageResolver {
    cdn_base: String,
}

impl Default for PackageResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CDN_BASE)
    }
}

impl PackageResolver {
    /// Create a resolver against a CDN base URL.
    #[must_use]
    pub fn new(cdn_base: impl Into<String>) -> Self {
        Self {
            cdn_base: cdn_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// The CDN base URL.
    #[must_use]
    pub fn cdn_base(&self) -> &str {
        &self.cdn_base
    }

    /// Resolve the primary package (a tarball) for `version` on `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] for malformed versions and
    /// [`Error::Resolution`] for unsupported platforms.
    pub fn resolve(&self, version: &str, platform: Platform) -> Result<PackageDescriptor> {
        let version = validate_version(version)?;
        if !platform.os.is_supported() {
            return Err(Error::resolution(
                version,
                platform,
                format!("unsupported operating system '{}'", platform.os),
            ));
        }
        let os = platform.os;
        let arch = match platform.arch {
            Arch::Other(name) => {
                return Err(Error::resolution(
                    version,
                    platform,
                    format!("unsupported architecture '{name}'"),
                ));
            }
            arch => arch.vendor_name(),
        };

        let file_name = format!("teleport-v{version}-{os}-{arch}-bin.tar.gz");
        Ok(self.descriptor(version, file_name, ArchiveFormat::Tarball))
    }

    /// Resolve the secondary package for `version`, if the platform has one.
    ///
    /// Only macOS publishes a secondary format (an installer package).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] for malformed versions.
    pub fn fallback(&self, version: &str, platform: Platform) -> Result<Option<PackageDescriptor>> {
        let version = validate_version(version)?;
        if platform.os != Os::Darwin {
            return Ok(None);
        }

        let file_name = if uses_product_pkg_name(version) {
            format!("teleport-{version}.pkg")
        } else {
            format!("tsh-{version}.pkg")
        };
        Ok(Some(self.descriptor(
            version,
            file_name,
            ArchiveFormat::MacPackage,
        )))
    }

    /// Every package to try for `version`, primary first.
    ///
    /// # Errors
    ///
    /// Fails like [`resolve`](Self::resolve).
    pub fn candidates(&self, version: &str, platform: Platform) -> Result<Vec<PackageDescriptor>> {
        let mut candidates = vec![self.resolve(version, platform)?];
        candidates.extend(self.fallback(version, platform)?);
        Ok(candidates)
    }

    fn descriptor(
        &self,
        version: &str,
        file_name: String,
        format: ArchiveFormat,
    ) -> PackageDescriptor {
        PackageDescriptor {
            version: version.to_string(),
            url: format!("{}/{}", self.cdn_base, file_name),
            file_name,
            format,
        }
    }
}

fn uses_product_pkg_name(version: &str) -> bool {
    major(version).is_some_and(|major| major >= PKG_NAMING_MAJOR_THRESHOLD)
}

/// Check that `version` is usable as a package name component and a
/// directory name, returning it with any leading `v` removed.
///
/// # Errors
///
/// Returns [`Error::InvalidVersion`] if the version is empty, contains
/// characters other than ASCII alphanumerics, `.`, `-` and `+`, or
/// contains `..`.
pub fn validate_version(version: &str) -> Result<&str> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let valid = !trimmed.is_empty()
        && !trimmed.contains("..")
        && !trimmed.starts_with(['.', '-'])
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'));
    if valid {
        Ok(trimmed)
    } else {
        Err(Error::InvalidVersion(version.to_string()))
    }
}

/// The numeric major component of a version.
#[must_use]
pub fn major(version: &str) -> Option<u32> {
    version
        .trim_start_matches('v')
        .split(['.', '-', '+'])
        .next()?
        .parse()
        .ok()
}

/// Numeric components of a version, for ordering.
///
/// Non-numeric components sort as zero; pre-release suffixes are ignored.
#[must_use]
pub fn numeric_key(version: &str) -> Vec<u64> {
    version
        .split(['-', '+'])
        .next()
        .unwrap_or_default()
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}
