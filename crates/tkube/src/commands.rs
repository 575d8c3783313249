//! Command execution and rendering of typed results.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tkube_core::{
    ConfigStore, JsonConfigStore, Paths, Platform, ProcessExecutor, SystemExecutor,
};
use tkube_session::{
    ClientRouter, DetectOutcome, Error, Result, SessionManager, SessionState, SessionStatus,
    Suggestion,
};
use tkube_tools_tsh::{
    Detection, DetectionSource, HttpFetcher, InstalledVersion, Installer, PackageResolver,
    PingClient, VersionDetector, VersionOverrides, VersionRegistry,
};
use tracing::debug;

use crate::cli::{Commands, EXIT_CLI, EXIT_FAILURE};

/// Session state of one configured environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentStatus {
    /// Environment name.
    pub env: String,
    /// Proxy address.
    pub proxy: String,
    /// Pinned client version, if any.
    pub version: Option<String>,
    /// Current session state.
    pub state: SessionState,
}

/// Typed result of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// `detect`
    Detected {
        /// Queried proxy.
        proxy: String,
        /// Detected version and its source.
        detection: Detection,
    },
    /// `install`
    Installed {
        /// Installed version.
        version: String,
        /// Canonical binary path.
        binary: PathBuf,
    },
    /// `uninstall`
    Uninstalled(String),
    /// `versions`
    Versions(Vec<InstalledVersion>),
    /// `status`
    Status(Vec<EnvironmentStatus>),
    /// `login`
    LoggedIn(String),
    /// `logout`
    LoggedOut(String),
    /// `clusters`
    Clusters {
        /// Environment name.
        env: String,
        /// Cluster names.
        clusters: Vec<String>,
    },
    /// `connect`
    Connected {
        /// Environment name.
        env: String,
        /// Cluster name.
        cluster: String,
    },
    /// `auto-detect`
    AutoDetected(BTreeMap<String, DetectOutcome>),
}

fn source_label(source: &DetectionSource) -> String {
    match source {
        DetectionSource::Server => "proxy ping endpoint".to_string(),
        DetectionSource::Hostname(pattern) => format!("hostname pattern {pattern}"),
        DetectionSource::Override(name) => format!("override {name}"),
    }
}

fn status_label(state: &SessionState) -> String {
    match state.status() {
        SessionStatus::NotAuthenticated => "not logged in".to_string(),
        SessionStatus::Expired => "expired".to_string(),
        SessionStatus::Active => match (&state.valid_until, &state.time_remaining) {
            (Some(until), Some(remaining)) => format!("active until {until} ({remaining} left)"),
            (Some(until), None) => format!("active until {until}"),
            _ => "active".to_string(),
        },
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detected { proxy, detection } => write!(
                f,
                "{proxy} requires tsh {} (from {})",
                detection.version,
                source_label(&detection.source)
            ),
            Self::Installed { version, binary } => {
                write!(f, "tsh {version} installed at {}", binary.display())
            }
            Self::Uninstalled(version) => write!(f, "tsh {version} removed"),
            Self::Versions(versions) if versions.is_empty() => {
                write!(f, "No client versions installed")
            }
            Self::Versions(versions) => {
                let lines: Vec<String> = versions
                    .iter()
                    .map(|v| format!("{:<12} {}", v.version, v.binary_path.display()))
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            Self::Status(envs) if envs.is_empty() => write!(f, "No environments configured"),
            Self::Status(envs) => {
                let lines: Vec<String> = envs
                    .iter()
                    .map(|e| {
                        format!(
                            "{:<12} {:<32} {:<10} {}",
                            e.env,
                            e.proxy,
                            e.version.as_deref().unwrap_or("-"),
                            status_label(&e.state)
                        )
                    })
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            Self::LoggedIn(env) => write!(f, "Logged in to {env}"),
            Self::LoggedOut(env) => write!(f, "Logged out of {env}"),
            Self::Clusters { env, clusters } if clusters.is_empty() => {
                write!(f, "No Kubernetes clusters in {env}")
            }
            Self::Clusters { clusters, .. } => write!(f, "{}", clusters.join("\n")),
            Self::Connected { env, cluster } => write!(f, "Connected to {cluster} in {env}"),
            Self::AutoDetected(outcomes) => {
                let lines: Vec<String> = outcomes
                    .iter()
                    .map(|(env, outcome)| match outcome {
                        DetectOutcome::Pinned(v) => format!("{env:<12} {v} (pinned)"),
                        DetectOutcome::Detected(v) => format!("{env:<12} {v} (detected)"),
                        DetectOutcome::Failed(e) => format!("{env:<12} failed: {e}"),
                    })
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
        }
    }
}

/// The command a [`Suggestion`] points at.
#[must_use]
pub fn suggestion_hint(suggestion: &Suggestion) -> String {
    match suggestion {
        Suggestion::InstallClient { version } => format!("run `tkube install {version}`"),
        Suggestion::Login { env } => format!("run `tkube login {env}`"),
    }
}

/// Exit code for a failed command.
#[must_use]
pub const fn exit_code_for(err: &Error) -> i32 {
    match err {
        Error::Core(_) | Error::InvalidEnvironmentName(_) => EXIT_CLI,
        _ => EXIT_FAILURE,
    }
}

/// Everything the commands run against.
#[derive(Debug)]
pub struct App {
    router: ClientRouter,
}

impl App {
    /// Wire the production collaborators under `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(paths: &Paths) -> Result<Self> {
        let executor: Arc<dyn ProcessExecutor> = Arc::new(SystemExecutor);
        let store: Arc<dyn ConfigStore> = Arc::new(JsonConfigStore::new(paths.config_file()));
        let overrides = VersionOverrides::from_env();
        debug!(
            root = ?paths.root(),
            overrides = !overrides.is_empty(),
            "Wiring tkube"
        );

        let detector = VersionDetector::new(Arc::new(PingClient::new()?), overrides);
        let installer = Installer::new(
            VersionRegistry::new(paths.versions_dir(), Arc::clone(&executor)),
            Platform::current(),
            PackageResolver::default(),
            Arc::new(HttpFetcher::new()?),
        );
        let sessions = SessionManager::new(paths.sessions_dir(), executor);

        Ok(Self::from_router(ClientRouter::new(
            store, detector, installer, sessions,
        )))
    }

    /// Run commands against an already wired router.
    #[must_use]
    pub fn from_router(router: ClientRouter) -> Self {
        Self { router }
    }

    /// Execute one command.
    ///
    /// # Errors
    ///
    /// Returns the typed error of the failed operation.
    pub async fn execute(&self, command: Commands) -> Result<Output> {
        let router = &self.router;
        match command {
            Commands::Detect { proxy } => {
                let detection = router.detector().detect_with_source(&proxy).await?;
                Ok(Output::Detected { proxy, detection })
            }
            Commands::Install { version } => {
                let binary = router.installer().ensure_installed(&version).await?;
                Ok(Output::Installed { version, binary })
            }
            Commands::Uninstall { version } => {
                router.installer().uninstall(&version)?;
                Ok(Output::Uninstalled(version))
            }
            Commands::Versions => Ok(Output::Versions(router.installer().list_installed().await?)),
            Commands::Status { env } => self.status(env.as_deref()).await.map(Output::Status),
            Commands::Login { env } => {
                router.login(&env).await?;
                Ok(Output::LoggedIn(env))
            }
            Commands::Logout { env } => {
                router.logout(&env).await?;
                Ok(Output::LoggedOut(env))
            }
            Commands::Clusters { env } => {
                let clusters = router.list_clusters(&env).await?;
                Ok(Output::Clusters { env, clusters })
            }
            Commands::Connect { env, cluster } => {
                router.connect(&env, &cluster).await?;
                Ok(Output::Connected { env, cluster })
            }
            Commands::AutoDetect => Ok(Output::AutoDetected(router.auto_detect_all().await?)),
        }
    }

    async fn status(&self, only: Option<&str>) -> Result<Vec<EnvironmentStatus>> {
        let names: Vec<String> = match only {
            Some(env) => vec![env.to_string()],
            None => self.router.store().load()?.environments.into_keys().collect(),
        };

        let mut statuses = Vec::with_capacity(names.len());
        for env in names {
            let state = self.router.session_state(&env).await?;
            let environment = self.router.store().environment(&env)?;
            statuses.push(EnvironmentStatus {
                proxy: environment.proxy,
                version: environment.tsh_version,
                env,
                state,
            });
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detected_output_names_source() {
        let output = Output::Detected {
            proxy: "teleport-v15.example.com:443".into(),
            detection: Detection {
                version: "15".into(),
                source: DetectionSource::Hostname("teleport-dash"),
            },
        };
        assert_eq!(
            output.to_string(),
            "teleport-v15.example.com:443 requires tsh 15 (from hostname pattern teleport-dash)"
        );
    }

    #[test]
    fn test_status_labels() {
        let active = SessionState::parse("  Valid until: 2099-01-01 [valid for 11h29m0s]\n");
        assert_eq!(status_label(&active), "active until 2099-01-01 (11h29m0s left)");
        assert_eq!(status_label(&SessionState::unauthenticated()), "not logged in");

        let expired = SessionState {
            is_authenticated: true,
            is_expired: true,
            ..SessionState::default()
        };
        assert_eq!(status_label(&expired), "expired");
    }

    #[test]
    fn test_empty_listings() {
        assert_eq!(
            Output::Versions(Vec::new()).to_string(),
            "No client versions installed"
        );
        assert_eq!(
            Output::Clusters {
                env: "prod".into(),
                clusters: Vec::new()
            }
            .to_string(),
            "No Kubernetes clusters in prod"
        );
    }

    #[test]
    fn test_auto_detect_output() {
        let outcomes = BTreeMap::from([
            ("a".to_string(), DetectOutcome::Pinned("14.2.1".into())),
            ("b".to_string(), DetectOutcome::Detected("15".into())),
        ]);
        let rendered = Output::AutoDetected(outcomes).to_string();
        assert!(rendered.contains("14.2.1 (pinned)"));
        assert!(rendered.contains("15 (detected)"));
    }

    #[test]
    fn test_suggestion_hints() {
        assert_eq!(
            suggestion_hint(&Suggestion::InstallClient {
                version: "14.2.1".into()
            }),
            "run `tkube install 14.2.1`"
        );
        assert_eq!(
            suggestion_hint(&Suggestion::Login { env: "prod".into() }),
            "run `tkube login prod`"
        );
    }

    #[test]
    fn test_exit_codes() {
        let unknown: Error = tkube_core::Error::unknown_environment("x").into();
        assert_eq!(exit_code_for(&unknown), EXIT_CLI);
        assert_eq!(
            exit_code_for(&Error::client_unavailable("prod", "14.2.1")),
            EXIT_FAILURE
        );
    }
}
