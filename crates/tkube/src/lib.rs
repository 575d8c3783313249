//! tkube command-line application.
//!
//! The binary is a thin shell over [`tkube_session::ClientRouter`]: it parses
//! arguments, initialises tracing, runs one [`commands::App::execute`] call
//! and renders the typed [`commands::Output`] or error.

/// CLI argument parsing and exit codes.
pub mod cli;
/// Command execution and rendering.
pub mod commands;
/// Tracing and logging configuration.
pub mod tracing;

pub use cli::{Cli, Commands};
pub use commands::{App, Output};
