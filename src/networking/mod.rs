use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::catalog::{CatalogError, parse_catalog};
use crate::engine::models::{Catalog, Manifest};
use crate::sync::{FileFetcher, TransferError};

const USER_AGENT: &str = concat!("fastpatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog at {url} is unusable: {source}")]
    Catalog {
        url: String,
        #[source]
        source: CatalogError,
    },
}

/// Anything that can produce the current catalog of universes.
pub trait CatalogSource: Send + Sync {
    fn catalog(&self) -> impl Future<Output = Result<Catalog, FetchError>> + Send;
}

#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
}

impl NetworkClient {
    pub fn new() -> Self {
        // No overall timeout: individual files can take a long time to stream.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    pub async fn fetch_catalog(&self, url: &str) -> Result<Catalog, FetchError> {
        let request_failed = |source| FetchError::Request {
            url: url.to_owned(),
            source,
        };
        let text = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(request_failed)?
            .text()
            .await
            .map_err(request_failed)?;
        parse_catalog(&text).map_err(|source| FetchError::Catalog {
            url: url.to_owned(),
            source,
        })
    }

    pub async fn fetch_manifest(&self, url: &str) -> Result<Manifest, FetchError> {
        let request_failed = |source| FetchError::Request {
            url: url.to_owned(),
            source,
        };
        let manifest: Manifest = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(request_failed)?
            .json()
            .await
            .map_err(request_failed)?;
        debug!(
            "manifest: {} files, {} mirrors, prefix {}",
            manifest.files.len(),
            manifest.mirrors.len(),
            manifest.key_prefix
        );
        Ok(manifest)
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    pub async fn download_to_path(&self, url: &str, dest: &Path) -> Result<u64, TransferError> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let expected = response.content_length();
        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = expected
            && downloaded < expected
        {
            return Err(TransferError::Incomplete {
                received: downloaded,
                expected,
            });
        }
        Ok(downloaded)
    }
}

impl FileFetcher for NetworkClient {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), TransferError> {
        let bytes = self.download_to_path(url, destination).await?;
        debug!("download: {} -> {} ({} bytes)", url, destination.display(), bytes);
        Ok(())
    }
}

/// The catalog published at a fixed URL.
#[derive(Clone)]
pub struct RemoteCatalog {
    client: NetworkClient,
    url: String,
}

impl RemoteCatalog {
    pub fn new(client: NetworkClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl CatalogSource for RemoteCatalog {
    async fn catalog(&self) -> Result<Catalog, FetchError> {
        self.client.fetch_catalog(&self.url).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    /// Serve a single canned HTTP response on loopback and return the base URL.
    async fn serve_once(status: &'static str, body: &'static [u8], declared_len: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {declared_len}\r\nConnection: close\r\n\r\n"
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn streams_body_to_disk() {
        let base = serve_once("200 OK", b"hello world", 11).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");

        let written = NetworkClient::new()
            .download_to_path(&format!("{base}/p/file.bin"), &dest)
            .await
            .unwrap();

        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let base = serve_once("404 Not Found", b"", 0).await;
        let dir = tempfile::tempdir().unwrap();

        let err = NetworkClient::new()
            .fetch(&format!("{base}/missing"), &dir.path().join("missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Request(_)));
    }

    #[tokio::test]
    async fn short_body_is_an_error() {
        let base = serve_once("200 OK", b"short", 64).await;
        let dir = tempfile::tempdir().unwrap();

        let result = NetworkClient::new()
            .download_to_path(&format!("{base}/f"), &dir.path().join("f"))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetches_manifest_json() {
        const BODY: &[u8] = br#"{"byte_count_total":5,"file_count_total":1,"file_list":["a"],"key_prefix":"k","webseed_urls":["http://m"]}"#;
        let base = serve_once("200 OK", BODY, BODY.len()).await;

        let manifest = NetworkClient::new()
            .fetch_manifest(&format!("{base}/index.json"))
            .await
            .unwrap();

        assert_eq!(manifest.files, ["a"]);
        assert_eq!(manifest.key_prefix, "k");
    }

    #[tokio::test]
    async fn fetches_and_parses_catalog() {
        const BODY: &[u8] = b"universes = Public\r\nPublic_version = 1.0\r\n";
        let base = serve_once("200 OK", BODY, BODY.len()).await;
        let source = RemoteCatalog::new(NetworkClient::new(), format!("{base}/_LauncherInfo"));

        let catalog = source.catalog().await.unwrap();

        assert_eq!(catalog.universe("public").unwrap().version, "1.0");
    }
}
