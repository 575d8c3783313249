//! Error types for client detection and installation.

use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

/// Result type for client detection and installation.
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of an installation attempt, reported with install failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    /// Fetching the package from the CDN.
    Download,
    /// Unpacking the archive or installer package.
    Extract,
    /// Finding the client inside the unpacked tree.
    Locate,
    /// Copying the client into the version directory.
    Place,
    /// Probing the installed client.
    Verify,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Download => "download",
            Self::Extract => "extract",
            Self::Locate => "locate",
            Self::Place => "place",
            Self::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while detecting, resolving or installing a client.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Every version detection strategy failed.
    #[error("Could not detect the client version required by proxy '{proxy}'")]
    #[diagnostic(
        code(tkube_tsh::detect::failed),
        help("Pin a version with `tsh_version` in the config, or set TELEPORT_VERSION")
    )]
    Detection {
        /// The proxy that was probed.
        proxy: String,
    },

    /// The proxy's version endpoint could not be queried.
    #[error("Version query to {endpoint} failed: {message}")]
    #[diagnostic(code(tkube_tsh::detect::ping))]
    Ping {
        /// The queried URL.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// No package is published for the requested platform.
    #[error("No client package for version {version} on {platform}: {message}")]
    #[diagnostic(code(tkube_tsh::resolve::unsupported))]
    Resolution {
        /// The requested version.
        version: String,
        /// The target platform.
        platform: String,
        /// Error message.
        message: String,
    },

    /// The version string cannot name a package or a directory.
    #[error("Invalid client version '{0}'")]
    #[diagnostic(code(tkube_tsh::version::invalid))]
    InvalidVersion(String),

    /// Download of a package failed.
    #[error("Failed to download {url}: {message}")]
    #[diagnostic(code(tkube_tsh::install::download))]
    Download {
        /// The package URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Unpacking a package failed.
    #[error("Failed to extract {package}: {message}")]
    #[diagnostic(code(tkube_tsh::install::extract))]
    Extraction {
        /// The package file name.
        package: String,
        /// Error message.
        message: String,
    },

    /// The unpacked package holds no recognisable client.
    #[error("Client binary not found in {package}")]
    #[diagnostic(code(tkube_tsh::install::binary_not_found))]
    BinaryNotFound {
        /// The package file name.
        package: String,
    },

    /// The client is present but its version probe fails.
    #[error("Client at {path} failed verification: {message}")]
    #[diagnostic(code(tkube_tsh::install::verify))]
    Verification {
        /// Path of the probed binary.
        path: String,
        /// Error message.
        message: String,
    },

    /// Every package candidate failed to install.
    #[error("Failed to install client {version} ({stage} stage)")]
    #[diagnostic(
        code(tkube_tsh::install::failed),
        help("Installation is idempotent; re-run `tkube install <version>` to retry")
    )]
    Install {
        /// The requested version.
        version: String,
        /// The stage of the last failed attempt.
        stage: InstallStage,
        /// The last failure.
        #[source]
        source: Box<Error>,
    },

    /// The version is not installed.
    #[error("Client version {0} is not installed")]
    #[diagnostic(
        code(tkube_tsh::registry::not_installed),
        help("Run `tkube versions` to list installed versions")
    )]
    NotInstalled(String),

    /// IO error.
    #[error("IO error: {0}")]
    #[diagnostic(code(tkube_tsh::io))]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a detection failure.
    #[must_use]
    pub fn detection(proxy: impl Into<String>) -> Self {
        Self::Detection {
            proxy: proxy.into(),
        }
    }

    /// Create a ping failure.
    #[must_use]
    pub fn ping(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ping {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a resolution failure.
    #[must_use]
    pub fn resolution(
        version: impl Into<String>,
        platform: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self::Resolution {
            version: version.into(),
            platform: platform.to_string(),
            message: message.into(),
        }
    }

    /// Create a download failure.
    #[must_use]
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an extraction failure.
    #[must_use]
    pub fn extraction(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Create a binary-not-found failure.
    #[must_use]
    pub fn binary_not_found(package: impl Into<String>) -> Self {
        Self::BinaryNotFound {
            package: package.into(),
        }
    }

    /// Create a verification failure.
    #[must_use]
    pub fn verification(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Verification {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// The install stage this error belongs to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<InstallStage> {
        match self {
            Self::Download { .. } => Some(InstallStage::Download),
            Self::Extraction { .. } => Some(InstallStage::Extract),
            Self::BinaryNotFound { .. } => Some(InstallStage::Locate),
            Self::Io(_) => Some(InstallStage::Place),
            Self::Verification { .. } => Some(InstallStage::Verify),
            Self::Install { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
