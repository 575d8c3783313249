//! Detection of the client version a proxy requires.
//!
//! Strategies are tried in order and the first success wins:
//!
//! 1. Remote query of the proxy's ping endpoint
//! 2. Version embedded in the proxy hostname (see [`HOSTNAME_PATTERNS`])
//! 3. Explicit [`VersionOverrides`]
//!
//! Every extracted value passes through [`normalize_version`].

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use crate::overrides::VersionOverrides;
use crate::ping::ServerInfoSource;
use crate::{Error, Result};

/// Product prefixes stripped from raw version values.
const PRODUCT_PREFIXES: &[&str] = &["teleport-", "tsh-"];

/// Hostname patterns in precedence order: `(name, regex)`.
///
/// Each regex captures one to three numeric components; the extracted
/// version is the captured components joined with `.`, exactly as many as
/// the hostname carries.
pub const HOSTNAME_PATTERNS: &[(&str, &str)] = &[
    ("teleport-dash", r"teleport-v?(\d+)(?:\.(\d+))?(?:\.(\d+))?"),
    ("teleport-joined", r"teleport(\d+)(?:\.(\d+))?(?:\.(\d+))?"),
    ("tsh-dash", r"tsh-v?(\d+)(?:\.(\d+))?(?:\.(\d+))?"),
];

static COMPILED_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    HOSTNAME_PATTERNS
        .iter()
        .filter_map(|(name, source)| Regex::new(source).ok().map(|re| (*name, re)))
        .collect()
});

/// Which strategy produced a detected version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionSource {
    /// The proxy's ping endpoint.
    Server,
    /// A hostname pattern, by name.
    Hostname(&'static str),
    /// A version override, by variable name.
    Override(String),
}

/// A detected version and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// The normalized version.
    pub version: String,
    /// The strategy that produced it.
    pub source: DetectionSource,
}

/// Detects the client version required by a proxy.
pub struct VersionDetector {
    server: Arc<dyn ServerInfoSource>,
    overrides: VersionOverrides,
}

impl std::fmt::Debug for VersionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionDetector")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl VersionDetector {
    /// Create a detector querying `server` and falling back to `overrides`.
    #[must_use]
    pub fn new(server: Arc<dyn ServerInfoSource>, overrides: VersionOverrides) -> Self {
        Self { server, overrides }
    }

    /// Detect the version required by `proxy`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detection`] when every strategy fails.
    pub async fn detect(&self, proxy: &str) -> Result<String> {
        self.detect_with_source(proxy).await.map(|d| d.version)
    }

    /// Like [`detect`](Self::detect), also reporting the winning strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detection`] when every strategy fails.
    pub async fn detect_with_source(&self, proxy: &str) -> Result<Detection> {
        let proxy = proxy.trim();
        if proxy.is_empty() {
            return Err(Error::detection(proxy));
        }

        match self.server.server_info(proxy).await {
            Ok(info) => match info.version().map(normalize_version) {
                Some(version) if !version.is_empty() => {
                    info!(%proxy, %version, "Detected client version from server");
                    return Ok(Detection {
                        version,
                        source: DetectionSource::Server,
                    });
                }
                _ => debug!(%proxy, "Server response carried no version"),
            },
            Err(e) => debug!(%proxy, error = %e, "Server version query failed"),
        }

        if let Some((pattern, version)) = version_from_hostname(proxy) {
            info!(%proxy, %version, pattern, "Detected client version from hostname");
            return Ok(Detection {
                version,
                source: DetectionSource::Hostname(pattern),
            });
        }
        debug!(%proxy, "No hostname pattern matched");

        if let Some((name, raw)) = self.overrides.lookup(proxy) {
            let version = normalize_version(raw);
            if !version.is_empty() {
                info!(%proxy, %version, variable = %name, "Using client version override");
                return Ok(Detection {
                    version,
                    source: DetectionSource::Override(name),
                });
            }
        }

        Err(Error::detection(proxy))
    }
}

/// Extract a version from a proxy hostname using [`HOSTNAME_PATTERNS`].
///
/// Returns the name of the matching pattern with the version. Partial
/// versions (`14`, `14.2`) are returned as found.
#[must_use]
pub fn version_from_hostname(proxy: &str) -> Option<(&'static str, String)> {
    COMPILED_PATTERNS.iter().find_map(|(name, re)| {
        let caps = re.captures(proxy)?;
        let parts: Vec<&str> = caps
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some((*name, normalize_version(&parts.join("."))))
    })
}

/// Strip a leading `v` and any product prefixes, keeping full precision.
///
/// Prefixes are stripped repeatedly, so `teleport-teleport-v14.0.0`
/// becomes `14.0.0`.
#[must_use]
pub fn normalize_version(raw: &str) -> String {
    let mut value = raw.trim();
    loop {
        let stripped = value.strip_prefix('v').unwrap_or(value);
        let stripped = PRODUCT_PREFIXES
            .iter()
            .find_map(|prefix| stripped.strip_prefix(prefix))
            .unwrap_or(stripped);
        if stripped.len() == value.len() {
            return value.to_string();
        }
        value = stripped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ping::ServerInfo;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl ServerInfoSource for Unreachable {
        async fn server_info(&self, proxy: &str) -> Result<ServerInfo> {
            Err(Error::ping(proxy, "connection refused"))
        }
    }

    struct Answers(ServerInfo);

    #[async_trait]
    impl ServerInfoSource for Answers {
        async fn server_info(&self, _proxy: &str) -> Result<ServerInfo> {
            Ok(self.0.clone())
        }
    }

    fn offline(overrides: VersionOverrides) -> VersionDetector {
        VersionDetector::new(Arc::new(Unreachable), overrides)
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("v14.2.1"), "14.2.1");
        assert_eq!(normalize_version("14.2.1"), "14.2.1");
        assert_eq!(normalize_version("teleport-v14.2.1"), "14.2.1");
        assert_eq!(normalize_version("teleport-teleport-14.0.0"), "14.0.0");
        assert_eq!(normalize_version("tsh-16.5.12"), "16.5.12");
        assert_eq!(normalize_version(" v15 "), "15");
    }

    #[test]
    fn test_hostname_patterns() {
        assert_eq!(
            version_from_hostname("teleport-v14.2.1.host").map(|(_, v)| v),
            Some("14.2.1".to_string())
        );
        assert_eq!(
            version_from_hostname("teleport-teleport-14.0.0.host").map(|(_, v)| v),
            Some("14.0.0".to_string())
        );
        assert_eq!(
            version_from_hostname("teleport-v14.prod.company.com:443"),
            Some(("teleport-dash", "14".to_string()))
        );
        assert_eq!(
            version_from_hostname("teleport15.internal"),
            Some(("teleport-joined", "15".to_string()))
        );
        assert_eq!(
            version_from_hostname("tsh-v13.4.example.com"),
            Some(("tsh-dash", "13.4".to_string()))
        );
        assert_eq!(version_from_hostname("proxy.example.com:443"), None);
    }

    #[tokio::test]
    async fn test_hostname_partial_version_is_preserved() {
        let detector = offline(VersionOverrides::new());
        let version = detector
            .detect("teleport-v14.prod.company.com:443")
            .await
            .unwrap();
        assert_eq!(version, "14");
    }

    #[tokio::test]
    async fn test_server_beats_hostname() {
        let detector = VersionDetector::new(
            Arc::new(Answers(ServerInfo {
                server_version: Some("v16.4.2".into()),
                ..ServerInfo::default()
            })),
            VersionOverrides::new(),
        );
        let detection = detector
            .detect_with_source("teleport-v14.prod.company.com:443")
            .await
            .unwrap();
        assert_eq!(detection.version, "16.4.2");
        assert_eq!(detection.source, DetectionSource::Server);
    }

    #[tokio::test]
    async fn test_empty_server_answer_falls_through() {
        let detector = VersionDetector::new(
            Arc::new(Answers(ServerInfo::default())),
            VersionOverrides::new(),
        );
        let detection = detector
            .detect_with_source("teleport-v15.1.example.com")
            .await
            .unwrap();
        assert_eq!(detection.version, "15.1");
        assert_eq!(detection.source, DetectionSource::Hostname("teleport-dash"));
    }

    #[tokio::test]
    async fn test_override_fallback() {
        let detector = offline(VersionOverrides::new().with("TELEPORT_VERSION", "v15.0.0"));
        let detection = detector
            .detect_with_source("proxy.example.com:443")
            .await
            .unwrap();
        assert_eq!(detection.version, "15.0.0");
        assert_eq!(
            detection.source,
            DetectionSource::Override("TELEPORT_VERSION".into())
        );
    }

    #[tokio::test]
    async fn test_proxy_specific_override() {
        let detector = offline(
            VersionOverrides::new().with("PROXY_EXAMPLE_COM_443_TSH_VERSION", "tsh-14.3.3"),
        );
        assert_eq!(
            detector.detect("proxy.example.com:443").await.unwrap(),
            "14.3.3"
        );
    }

    #[tokio::test]
    async fn test_all_strategies_fail() {
        let detector = offline(VersionOverrides::new());
        let err = detector.detect("proxy.example.com:443").await.unwrap_err();
        assert!(matches!(err, Error::Detection { ref proxy } if proxy == "proxy.example.com:443"));
    }

    #[tokio::test]
    async fn test_empty_proxy_fails() {
        let detector = offline(VersionOverrides::new().with("TELEPORT_VERSION", "15.0.0"));
        let err = detector.detect("").await.unwrap_err();
        assert!(matches!(err, Error::Detection { .. }));
    }
}
