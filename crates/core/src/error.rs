//! Error types for the tkube-core crate

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tkube-core operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Configuration could not be read, parsed or written
    #[error("Configuration error: {message}")]
    #[diagnostic(code(tkube_core::config::invalid))]
    Configuration {
        /// The error message describing the configuration issue
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },

    /// The named environment is not present in the configuration
    #[error("Environment '{name}' not found")]
    #[diagnostic(
        code(tkube_core::config::unknown_environment),
        help("Run `tkube status` to list configured environments")
    )]
    UnknownEnvironment {
        /// The requested environment name
        name: String,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(tkube_core::io::error))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable
        path: Option<Box<std::path::Path>>,
        /// Description of the operation that failed
        operation: String,
    },
}

impl Error {
    /// Create a configuration error with a message
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text
    #[must_use]
    pub fn configuration_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an unknown environment error
    #[must_use]
    pub fn unknown_environment(name: impl Into<String>) -> Self {
        Self::UnknownEnvironment { name: name.into() }
    }

    /// Create an I/O error with context
    #[must_use]
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(|p| p.into_boxed_path()),
            operation: operation.into(),
        }
    }
}

/// Result type for tkube-core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error() {
        let error = Error::configuration("config is invalid");
        assert_eq!(error.to_string(), "Configuration error: config is invalid");
    }

    #[test]
    fn test_unknown_environment_error() {
        let error = Error::unknown_environment("staging");
        assert_eq!(error.to_string(), "Environment 'staging' not found");
    }

    #[test]
    fn test_io_error_keeps_operation() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = Error::io(source, Some(PathBuf::from("/tmp/x")), "write config");
        assert!(error.to_string().starts_with("I/O error during write config"));
    }
}
