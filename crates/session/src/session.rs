//! Per-environment credential isolation and session state.
//!
//! Every environment gets `<sessions>/<env>/`, created with owner-only
//! permissions and handed to the client as `TELEPORT_HOME`, so no two
//! environments ever share credentials.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tkube_core::{Config, Invocation, ProcessExecutor, ProcessOutput};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Environment variable redirecting the client's credential home.
pub const TELEPORT_HOME_ENV: &str = "TELEPORT_HOME";

/// Identity used when no other source names one.
pub const FALLBACK_IDENTITY: &str = "unknown";

const LOGGED_IN_MARKER: &str = "logged in";
const NOT_LOGGED_IN_MARKERS: &[&str] = &["Not logged in", "not logged in"];
const VALID_UNTIL_MARKER: &str = "Valid until";
const VALID_UNTIL_PREFIX: &str = "Valid until:";
const EXPIRED_MARKER: &str = "EXPIRED";
const REMAINING_OPEN: &str = "[valid for ";
const ALREADY_LOGGED_OUT: &[&str] = &["already logged out", "Not logged in"];

/// Coarse classification of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No usable credentials.
    NotAuthenticated,
    /// Credentials present and not expired.
    Active,
    /// Credentials present but expired.
    Expired,
}

/// Session state parsed from the client's status output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Whether the client reports a session.
    pub is_authenticated: bool,
    /// Expiry timestamp as printed by the client.
    pub valid_until: Option<String>,
    /// Remaining duration (e.g. `11h29m0s`), or `EXPIRED`.
    pub time_remaining: Option<String>,
    /// Whether the client marks the session as expired.
    pub is_expired: bool,
}

impl SessionState {
    /// The fail-closed state.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Parse the output of `tsh status`.
    #[must_use]
    pub fn parse(output: &str) -> Self {
        if NOT_LOGGED_IN_MARKERS.iter().any(|m| output.contains(m))
            || (!output.contains(LOGGED_IN_MARKER) && !output.contains(VALID_UNTIL_MARKER))
        {
            return Self::unauthenticated();
        }

        let mut state = Self {
            is_authenticated: true,
            ..Self::default()
        };

        let Some(detail) = output
            .lines()
            .find_map(|line| line.split_once(VALID_UNTIL_PREFIX).map(|(_, rest)| rest.trim()))
        else {
            return state;
        };

        if detail.contains(EXPIRED_MARKER) {
            state.is_expired = true;
            state.time_remaining = Some(EXPIRED_MARKER.to_string());
            state.valid_until = Some(detail.to_string());
            return state;
        }

        state.time_remaining = detail
            .split_once(REMAINING_OPEN)
            .and_then(|(_, rest)| rest.split_once(']'))
            .map(|(remaining, _)| remaining.trim().to_string())
            .filter(|r| !r.is_empty());
        state.valid_until = Some(
            detail
                .split_once(" [")
                .map_or(detail, |(until, _)| until.trim())
                .to_string(),
        );
        state
    }

    /// Classify the state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        match (self.is_authenticated, self.is_expired) {
            (false, _) => SessionStatus::NotAuthenticated,
            (true, true) => SessionStatus::Expired,
            (true, false) => SessionStatus::Active,
        }
    }
}

/// Everything needed to run the client for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    /// Environment name.
    pub env: String,
    /// Proxy address.
    pub proxy: String,
    /// Effective identity.
    pub user: String,
    /// Verified client binary.
    pub binary: PathBuf,
    /// Isolated credential directory.
    pub session_dir: PathBuf,
}

impl ClientContext {
    /// A client invocation scoped to this environment's credentials.
    #[must_use]
    pub fn invocation(&self) -> Invocation {
        Invocation::new(&self.binary).env(
            TELEPORT_HOME_ENV,
            self.session_dir.to_string_lossy().into_owned(),
        )
    }
}

/// The current OS username: `$USER`, else the home directory's name.
#[must_use]
pub fn os_username() -> Option<String> {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| {
            dirs::home_dir()
                .and_then(|home| home.file_name().map(|n| n.to_string_lossy().into_owned()))
                .filter(|u| !u.is_empty())
        })
}

/// Resolve an identity: environment user, default user, OS user, then
/// [`FALLBACK_IDENTITY`]. Empty values are skipped.
#[must_use]
pub fn resolve_identity(
    env_user: Option<&str>,
    default_user: Option<&str>,
    os_user: Option<String>,
) -> String {
    env_user
        .filter(|u| !u.is_empty())
        .or_else(|| default_user.filter(|u| !u.is_empty()))
        .map(str::to_string)
        .or(os_user)
        .unwrap_or_else(|| FALLBACK_IDENTITY.to_string())
}

/// The identity used for `env` under `config`.
#[must_use]
pub fn effective_identity(config: &Config, env: &str) -> String {
    let env_user = config
        .environments
        .get(env)
        .and_then(|e| e.user.as_deref());
    resolve_identity(env_user, config.default_user(), os_username())
}

#[derive(Debug, Deserialize)]
struct KubeCluster {
    #[serde(default)]
    kube_cluster_name: Option<String>,
}

/// Manages isolated session directories and runs session commands.
#[derive(Clone)]
pub struct SessionManager {
    sessions_dir: PathBuf,
    executor: Arc<dyn ProcessExecutor>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions_dir", &self.sessions_dir)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager keeping sessions under `sessions_dir`.
    #[must_use]
    pub fn new(sessions_dir: impl Into<PathBuf>, executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            executor,
        }
    }

    /// Session directory of `env`, without creating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnvironmentName`] if `env` is not a single
    /// path component.
    pub fn session_dir(&self, env: &str) -> Result<PathBuf> {
        let valid = !env.is_empty()
            && env != "."
            && env != ".."
            && !env.contains(['/', '\\'])
            && !env.contains('\0');
        if !valid {
            return Err(Error::InvalidEnvironmentName(env.to_string()));
        }
        Ok(self.sessions_dir.join(env))
    }

    /// Create `env`'s session directory if needed, with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionDir`] if the directory cannot be created or
    /// its permissions cannot be set.
    pub fn ensure_session_dir(&self, env: &str) -> Result<PathBuf> {
        let dir = self.session_dir(env)?;
        create_private_dir(&dir).map_err(|e| Error::session_dir(&dir, e))?;
        debug!(%env, ?dir, "Session directory ready");
        Ok(dir)
    }

    /// Query the session state. Any failure reads as not authenticated.
    pub async fn status(&self, client: &ClientContext) -> SessionState {
        if !client.session_dir.is_dir() {
            debug!(env = %client.env, "No session directory");
            return SessionState::unauthenticated();
        }

        let invocation = client.invocation().args([
            "status".to_string(),
            format!("--proxy={}", client.proxy),
            format!("--user={}", client.user),
        ]);
        match self.executor.output(&invocation).await {
            Ok(output) if output.success => SessionState::parse(&output.combined()),
            Ok(output) => {
                debug!(env = %client.env, code = ?output.code, "Status reports no session");
                SessionState::unauthenticated()
            }
            Err(e) => {
                warn!(env = %client.env, error = %e, "Status check failed");
                SessionState::unauthenticated()
            }
        }
    }

    /// Log in interactively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] if the client cannot run or fails.
    pub async fn login(&self, client: &ClientContext) -> Result<()> {
        let invocation = client.invocation().args([
            "login".to_string(),
            format!("--proxy={}", client.proxy),
            format!("--user={}", client.user),
        ]);
        self.run_interactive(&invocation).await?;
        info!(env = %client.env, user = %client.user, "Logged in");
        Ok(())
    }

    /// Log in to a Kubernetes cluster interactively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] if the client cannot run or fails.
    pub async fn kube_login(&self, client: &ClientContext, cluster: &str) -> Result<()> {
        let invocation = client.invocation().args([
            format!("--proxy={}", client.proxy),
            "kube".to_string(),
            "login".to_string(),
            cluster.to_string(),
        ]);
        self.run_interactive(&invocation).await?;
        info!(env = %client.env, %cluster, "Logged in to cluster");
        Ok(())
    }

    /// Log out. An already-absent session counts as success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Logout`] if the client reports any other failure.
    pub async fn logout(&self, client: &ClientContext) -> Result<()> {
        let invocation = client.invocation().arg("logout");
        let output = self
            .executor
            .output(&invocation)
            .await
            .map_err(|e| Error::process(&invocation, e.to_string()))?;

        if output.success {
            info!(env = %client.env, "Logged out");
            return Ok(());
        }

        let text = output.combined();
        if ALREADY_LOGGED_OUT.iter().any(|marker| text.contains(marker)) {
            debug!(env = %client.env, "Already logged out");
            return Ok(());
        }
        Err(Error::Logout {
            env: client.env.clone(),
            message: text.trim().to_string(),
        })
    }

    /// Names of the Kubernetes clusters visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] if the client fails or prints
    /// something other than a JSON array.
    pub async fn list_clusters(&self, client: &ClientContext) -> Result<Vec<String>> {
        let invocation = client.invocation().args([
            format!("--proxy={}", client.proxy),
            "kube".to_string(),
            "ls".to_string(),
            "--format=json".to_string(),
        ]);
        let output = self
            .executor
            .output(&invocation)
            .await
            .map_err(|e| Error::process(&invocation, e.to_string()))?;
        if !output.success {
            return Err(Error::process(&invocation, output.combined().trim()));
        }

        let clusters: Vec<KubeCluster> = serde_json::from_str(&output.stdout)
            .map_err(|e| Error::process(&invocation, format!("unexpected output: {e}")))?;
        Ok(clusters
            .into_iter()
            .filter_map(|c| c.kube_cluster_name)
            .collect())
    }

    async fn run_interactive(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let output = self
            .executor
            .interactive(invocation)
            .await
            .map_err(|e| Error::process(invocation, e.to_string()))?;
        if output.success {
            Ok(output)
        } else {
            Err(Error::process(
                invocation,
                output
                    .code
                    .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}")),
            ))
        }
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    let mode = fs::metadata(dir)?.permissions().mode();
    if mode & 0o777 != 0o700 {
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}
