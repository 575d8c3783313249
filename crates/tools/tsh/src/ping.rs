//! Remote version query against a proxy's ping endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

/// Path of the unauthenticated ping endpoint on a proxy.
pub const PING_PATH: &str = "/webapi/ping";

/// Timeout for a single version query.
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Version fields of a ping response. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    /// Version reported by the auth/proxy server.
    #[serde(default)]
    pub server_version: Option<String>,
    /// Generic version field.
    #[serde(default)]
    pub version: Option<String>,
    /// Build identifier.
    #[serde(default)]
    pub build: Option<String>,
}

impl ServerInfo {
    /// The first populated field: `server_version`, then `version`, then `build`.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        [&self.server_version, &self.version, &self.build]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// Source of server version information for a proxy.
#[async_trait]
pub trait ServerInfoSource: Send + Sync {
    /// Query the proxy.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy is unreachable or answers with
    /// something other than a JSON object.
    async fn server_info(&self, proxy: &str) -> Result<ServerInfo>;
}

/// HTTP client for the ping endpoint.
#[derive(Debug, Clone)]
pub struct PingClient {
    client: Client,
    scheme: &'static str,
}

impl PingClient {
    /// Create a client querying `https://<proxy>/webapi/ping`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend fails to initialise.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tkube/", env!("CARGO_PKG_VERSION")))
            .timeout(PING_TIMEOUT)
            .build()
            .map_err(|e| Error::ping(PING_PATH, format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            scheme: "https",
        })
    }

    /// Query over plain HTTP instead of HTTPS.
    #[must_use]
    pub fn insecure_http(mut self) -> Self {
        self.scheme = "http";
        self
    }

    /// The ping URL for a proxy.
    #[must_use]
    pub fn endpoint(&self, proxy: &str) -> String {
        format!("{}://{}{}", self.scheme, proxy, PING_PATH)
    }
}

#[async_trait]
impl ServerInfoSource for PingClient {
    async fn server_info(&self, proxy: &str) -> Result<ServerInfo> {
        let endpoint = self.endpoint(proxy);
        debug!(%endpoint, "Querying proxy version");

        let response = self
            .client
            .get(&endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::ping(&endpoint, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::ping(
                &endpoint,
                format!("HTTP {}", response.status()),
            ));
        }

        response
            .json::<ServerInfo>()
            .await
            .map_err(|e| Error::ping(&endpoint, format!("Invalid response body: {e}")))
    }
}
