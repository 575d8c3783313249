//! Teleport client (`tsh`) provider for tkube.
//!
//! This crate provides functionality to:
//! - Detect the client version a proxy requires
//! - Resolve the package published for a version and platform
//! - Download, unpack and install versions side by side
//! - List, verify and remove installed versions
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tkube_core::{Paths, Platform, SystemExecutor};
//! use tkube_tools_tsh::{
//!     HttpFetcher, Installer, PackageResolver, PingClient, VersionDetector, VersionOverrides,
//!     VersionRegistry,
//! };
//!
//! let detector = VersionDetector::new(Arc::new(PingClient::new()?), VersionOverrides::from_env());
//! let version = detector.detect("teleport.example.com:443").await?;
//!
//! let registry = VersionRegistry::new(Paths::discover()?.versions_dir(), Arc::new(SystemExecutor));
//! let installer = Installer::new(
//!     registry,
//!     Platform::current(),
//!     PackageResolver::default(),
//!     Arc::new(HttpFetcher::new()?),
//! );
//! let tsh = installer.ensure_installed(&version).await?;
//! ```

#![warn(missing_docs)]

pub mod detect;
mod error;
pub mod extract;
mod fetch;
mod install;
pub mod overrides;
pub mod package;
mod ping;
mod registry;

pub use detect::{Detection, DetectionSource, VersionDetector, normalize_version};
pub use error::{Error, InstallStage, Result};
pub use fetch::{DOWNLOAD_TIMEOUT, HttpFetcher, PackageFetcher};
pub use install::Installer;
pub use overrides::VersionOverrides;
pub use package::{ArchiveFormat, PackageDescriptor, PackageResolver, validate_version};
pub use ping::{PING_PATH, PING_TIMEOUT, PingClient, ServerInfo, ServerInfoSource};
pub use registry::{InstalledVersion, VersionRegistry, is_executable, probe_binary};
