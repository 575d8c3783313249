//! Per-environment Teleport sessions for tkube.
//!
//! [`SessionManager`] owns the isolated credential directories and runs the
//! session commands (`status`, `login`, `logout`, `kube ls`, `kube login`)
//! against a given client. [`ClientRouter`] ties an environment name to its
//! proxy, client version, identity and session directory.

#![warn(missing_docs)]

mod error;
mod router;
mod session;

pub use error::{Error, Result, Suggestion};
pub use router::{ClientRouter, DetectOutcome};
pub use session::{
    ClientContext, FALLBACK_IDENTITY, SessionManager, SessionState, SessionStatus,
    TELEPORT_HOME_ENV, effective_identity, os_username, resolve_identity,
};
