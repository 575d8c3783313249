//! Core types and error handling for tkube.
//!
//! Everything the client-management crates share lives here:
//!
//! - [`Error`] / [`Result`] for configuration and process failures
//! - [`platform`] - OS and architecture identification
//! - [`config`] - persisted environment configuration and the [`ConfigStore`] seam
//! - [`paths`] - on-disk layout of the tkube data root
//! - [`process`] - the [`ProcessExecutor`] capability used for every client invocation

pub mod config;
pub mod error;
pub mod paths;
pub mod platform;
pub mod process;

pub use config::{Config, ConfigStore, Environment, JsonConfigStore, MemoryConfigStore};
pub use error::{Error, Result};
pub use paths::Paths;
pub use platform::{Arch, Os, Platform};
pub use process::{Invocation, ProcessExecutor, ProcessOutput, SystemExecutor};
