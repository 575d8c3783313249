//! Routes environment-scoped operations to the right client version.
//!
//! Each environment resolves to a client version (pinned in the config, or
//! detected from its proxy and persisted when an operation provisions a
//! client), a verified binary of that version, its isolated session
//! directory and an effective identity. Status queries only read.

use std::collections::BTreeMap;
use std::sync::Arc;
use tkube_core::{ConfigStore, Environment};
use tkube_tools_tsh::{Installer, VersionDetector};
use tracing::{debug, info, warn};

use crate::session::{ClientContext, SessionManager, SessionState, effective_identity};
use crate::{Error, Result};

/// Result of auto-detection for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectOutcome {
    /// A version was already pinned; nothing was detected.
    Pinned(String),
    /// A version was detected and persisted.
    Detected(String),
    /// Detection failed.
    Failed(String),
}

/// Whether a missing client may be installed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provision {
    Install,
    RequireInstalled,
}

/// Resolves environments to clients and runs session operations on them.
pub struct ClientRouter {
    store: Arc<dyn ConfigStore>,
    detector: VersionDetector,
    installer: Installer,
    sessions: SessionManager,
}

impl std::fmt::Debug for ClientRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRouter")
            .field("detector", &self.detector)
            .field("installer", &self.installer)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl ClientRouter {
    /// Create a router.
    #[must_use]
    pub fn new(
        store: Arc<dyn ConfigStore>,
        detector: VersionDetector,
        installer: Installer,
        sessions: SessionManager,
    ) -> Self {
        Self {
            store,
            detector,
            installer,
            sessions,
        }
    }

    /// The configuration store.
    #[must_use]
    pub fn store(&self) -> &dyn ConfigStore {
        self.store.as_ref()
    }

    /// The version detector.
    #[must_use]
    pub fn detector(&self) -> &VersionDetector {
        &self.detector
    }

    /// The installer.
    #[must_use]
    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    /// The session manager.
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The client version `env` requires.
    ///
    /// A pinned version is returned as is. Otherwise the version is
    /// detected from the proxy and pinned in the config.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is unknown, detection fails, or
    /// the detected version cannot be saved.
    pub async fn required_version(&self, env: &str) -> Result<String> {
        let environment = self.store.environment(env)?;
        self.version_for(env, &environment).await
    }

    async fn version_for(&self, env: &str, environment: &Environment) -> Result<String> {
        if let Some(version) = environment.pinned_version() {
            return Ok(version.to_string());
        }
        let version = self.detector.detect(&environment.proxy).await?;
        self.store.set_tsh_version(env, &version)?;
        info!(%env, %version, "Pinned detected client version");
        Ok(version)
    }

    /// Client context for `env`, installing its client version if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be determined or installed,
    /// or the session directory cannot be prepared.
    pub async fn ensure_client(&self, env: &str) -> Result<ClientContext> {
        self.context(env, Provision::Install).await
    }

    /// Client context for `env` without detecting or installing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionNotPinned`] if the environment has no pinned
    /// version, or [`Error::ClientUnavailable`] if that version is not
    /// verified installed.
    pub async fn installed_client(&self, env: &str) -> Result<ClientContext> {
        self.context(env, Provision::RequireInstalled).await
    }

    async fn context(&self, env: &str, provision: Provision) -> Result<ClientContext> {
        let config = self.store.load()?;
        let environment = config.environment(env)?;

        let binary = match provision {
            Provision::Install => {
                let version = self.version_for(env, environment).await?;
                self.installer.ensure_installed(&version).await?
            }
            Provision::RequireInstalled => {
                let version = environment
                    .pinned_version()
                    .ok_or_else(|| Error::VersionNotPinned {
                        env: env.to_string(),
                    })?;
                if !self.installer.is_verified_installed(version).await {
                    return Err(Error::client_unavailable(env, version));
                }
                self.installer.binary_path(version)?
            }
        };

        Ok(ClientContext {
            env: env.to_string(),
            proxy: environment.proxy.clone(),
            user: effective_identity(&config, env),
            binary,
            session_dir: self.sessions.ensure_session_dir(env)?,
        })
    }

    /// Session state of `env`.
    ///
    /// Read-only: never detects, pins or installs a client version. An
    /// unpinned version, a missing client or an unreadable status all read
    /// as not authenticated.
    ///
    /// # Errors
    ///
    /// Returns an error only if the configuration cannot be loaded or
    /// `env` is unknown.
    pub async fn session_state(&self, env: &str) -> Result<SessionState> {
        match self.installed_client(env).await {
            Ok(client) => Ok(self.sessions.status(&client).await),
            Err(Error::Core(e)) => Err(Error::Core(e)),
            Err(e) => {
                debug!(%env, error = %e, "Treating environment as not authenticated");
                Ok(SessionState::unauthenticated())
            }
        }
    }

    /// Log in to `env` interactively, installing its client if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be provisioned or login fails.
    pub async fn login(&self, env: &str) -> Result<()> {
        let client = self.ensure_client(env).await?;
        self.sessions.login(&client).await
    }

    /// Log out of `env`. Logging out of an absent session succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionNotPinned`] or [`Error::ClientUnavailable`] if
    /// no installed client is known, or [`Error::Logout`] if the client
    /// reports a failure.
    pub async fn logout(&self, env: &str) -> Result<()> {
        let client = self.installed_client(env).await?;
        self.sessions.logout(&client).await
    }

    /// Log in to a Kubernetes cluster of `env` interactively.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be provisioned or the login fails.
    pub async fn kube_login(&self, env: &str, cluster: &str) -> Result<()> {
        let client = self.ensure_client(env).await?;
        self.sessions.kube_login(&client, cluster).await
    }

    /// Make sure `env` has a live session, then log in to `cluster`.
    ///
    /// Without a live session, logs in first when `auto_login` is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] if there is no live session and
    /// `auto_login` is disabled, or any provisioning or login error.
    pub async fn connect(&self, env: &str, cluster: &str) -> Result<()> {
        let client = self.ensure_client(env).await?;
        let state = self.sessions.status(&client).await;

        if !state.is_authenticated || state.is_expired {
            if !self.store.load()?.auto_login {
                return Err(Error::NotAuthenticated {
                    env: env.to_string(),
                });
            }
            info!(%env, "No live session, logging in");
            self.sessions.login(&client).await?;
        }

        self.sessions.kube_login(&client, cluster).await
    }

    /// Kubernetes clusters visible in `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be provisioned or the listing fails.
    pub async fn list_clusters(&self, env: &str) -> Result<Vec<String>> {
        let client = self.ensure_client(env).await?;
        self.sessions.list_clusters(&client).await
    }

    /// Detect versions for every environment without a pinned version.
    ///
    /// Detected versions are pinned with a single save. Individual failures
    /// are reported in the result rather than aborting the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or saved.
    pub async fn auto_detect_all(&self) -> Result<BTreeMap<String, DetectOutcome>> {
        let mut config = self.store.load()?;
        let mut outcomes = BTreeMap::new();
        let mut changed = false;

        for (name, environment) in &mut config.environments {
            let outcome = if let Some(version) = environment.pinned_version() {
                DetectOutcome::Pinned(version.to_string())
            } else {
                match self.detector.detect(&environment.proxy).await {
                    Ok(version) => {
                        environment.tsh_version = Some(version.clone());
                        changed = true;
                        DetectOutcome::Detected(version)
                    }
                    Err(e) => {
                        warn!(env = %name, error = %e, "Version detection failed");
                        DetectOutcome::Failed(e.to_string())
                    }
                }
            };
            outcomes.insert(name.clone(), outcome);
        }

        if changed {
            self.store.save(&config)?;
        }
        Ok(outcomes)
    }
}
