//! Error types for sessions and client routing.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A follow-up action the caller can offer the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
    /// Install the given client version.
    InstallClient {
        /// Version to install.
        version: String,
    },
    /// Log in to the given environment.
    Login {
        /// Environment name.
        env: String,
    },
}

/// Errors from session management and client routing.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The isolated credential directory cannot be created or accessed.
    #[error("Cannot prepare session directory {}: {source}", path.display())]
    #[diagnostic(code(tkube_session::dir))]
    SessionDir {
        /// The session directory.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The environment name cannot be used as a directory name.
    #[error("Invalid environment name '{0}'")]
    #[diagnostic(
        code(tkube_session::invalid_environment),
        help("Environment names must not be empty or contain path separators")
    )]
    InvalidEnvironmentName(String),

    /// The client version required by an environment is not installed.
    #[error("Client {version} required by environment '{env}' is not installed")]
    #[diagnostic(
        code(tkube_session::client_unavailable),
        help("Run `tkube install <version>` first")
    )]
    ClientUnavailable {
        /// Environment name.
        env: String,
        /// Required version.
        version: String,
    },

    /// The environment has no pinned client version and the operation does not detect one.
    #[error("Environment '{env}' has no client version yet")]
    #[diagnostic(
        code(tkube_session::version_not_pinned),
        help("Run `tkube auto-detect` or `tkube login <env>` to detect and pin it")
    )]
    VersionNotPinned {
        /// Environment name.
        env: String,
    },

    /// The environment has no valid session and automatic login is off.
    #[error("Not logged in to environment '{env}'")]
    #[diagnostic(
        code(tkube_session::not_authenticated),
        help("Run `tkube login <env>`")
    )]
    NotAuthenticated {
        /// Environment name.
        env: String,
    },

    /// Logout failed for a reason other than an absent session.
    #[error("Logout from environment '{env}' failed: {message}")]
    #[diagnostic(code(tkube_session::logout))]
    Logout {
        /// Environment name.
        env: String,
        /// Client output.
        message: String,
    },

    /// A client invocation could not run or failed.
    #[error("`{command}` failed: {message}")]
    #[diagnostic(code(tkube_session::process))]
    Process {
        /// The command line.
        command: String,
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] tkube_core::Error),

    /// Client detection or installation error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] tkube_tools_tsh::Error),
}

impl Error {
    /// Create a session directory error.
    #[must_use]
    pub fn session_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SessionDir {
            path: path.into(),
            source,
        }
    }

    /// Create a client-unavailable error.
    #[must_use]
    pub fn client_unavailable(env: impl Into<String>, version: impl Into<String>) -> Self {
        Self::ClientUnavailable {
            env: env.into(),
            version: version.into(),
        }
    }

    /// Create a process error.
    #[must_use]
    pub fn process(command: impl ToString, message: impl Into<String>) -> Self {
        Self::Process {
            command: command.to_string(),
            message: message.into(),
        }
    }

    /// The follow-up action that would resolve this error, if any.
    #[must_use]
    pub fn suggestion(&self) -> Option<Suggestion> {
        match self {
            Self::ClientUnavailable { version, .. } => Some(Suggestion::InstallClient {
                version: version.clone(),
            }),
            Self::NotAuthenticated { env } => Some(Suggestion::Login { env: env.clone() }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestions() {
        assert_eq!(
            Error::client_unavailable("prod", "14.2.1").suggestion(),
            Some(Suggestion::InstallClient {
                version: "14.2.1".into()
            })
        );
        assert_eq!(
            Error::NotAuthenticated { env: "prod".into() }.suggestion(),
            Some(Suggestion::Login { env: "prod".into() })
        );
        assert_eq!(Error::process("tsh logout", "boom").suggestion(), None);
    }

    #[test]
    fn test_wrapped_errors_keep_message() {
        let err: Error = tkube_core::Error::unknown_environment("staging").into();
        assert_eq!(err.to_string(), "Environment 'staging' not found");

        let err: Error = tkube_tools_tsh::Error::NotInstalled("14.2.1".into()).into();
        assert_eq!(err.to_string(), "Client version 14.2.1 is not installed");
    }
}
