//! Package download.

use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::package::PackageDescriptor;
use crate::{Error, Result};

/// Timeout for a whole package download.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Downloads packages to local files.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    /// Download `package` to `dest`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Download`] if the package cannot be fetched.
    async fn fetch(&self, package: &PackageDescriptor, dest: &Path) -> Result<u64>;
}

/// Fetches packages over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default download timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend fails to initialise.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DOWNLOAD_TIMEOUT)
    }

    /// Create a fetcher with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend fails to initialise.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tkube/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::download("", format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PackageFetcher for HttpFetcher {
    async fn fetch(&self, package: &PackageDescriptor, dest: &Path) -> Result<u64> {
        let url = package.url.as_str();
        info!(%url, "Downloading client package");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::download(url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::download(url, format!("HTTP {}", response.status())));
        }

        let write_error = |e: std::io::Error| {
            Error::download(url, format!("Failed to write {}: {e}", dest.display()))
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(write_error)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::download(url, format!("Failed to read body: {e}")))?
        {
            file.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_error)?;

        debug!(%url, bytes = written, ?dest, "Downloaded client package");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::ArchiveFormat;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor(server: &MockServer, file_name: &str) -> PackageDescriptor {
        PackageDescriptor {
            version: "14.2.1".into(),
            url: format!("{}/{}", server.uri(), file_name),
            file_name: file_name.into(),
            format: ArchiveFormat::Tarball,
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_body() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/pkg.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("pkg.tar.gz");
        let fetcher = HttpFetcher::new().unwrap();

        let written = fetcher
            .fetch(&descriptor(&server, "pkg.tar.gz"), &dest)
            .await
            .unwrap();
        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("missing.tar.gz");
        let fetcher = HttpFetcher::new().unwrap();

        let err = fetcher
            .fetch(&descriptor(&server, "missing.tar.gz"), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Download { .. }));
        assert!(!dest.exists());
    }
}
