//! Streaming package downloads.
//!
//! Files are written to `<dest>.part` and renamed once complete, hashing with
//! SHA-256 along the way.

use std::error::Error as StdError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use miner_schema::ResolvedPackage;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::Reporter;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection reset while downloading {url}")]
    ConnectionReset {
        url: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionReset { .. })
    }

    fn classify(url: &str, err: reqwest::Error) -> Self {
        if err.is_body() || is_connection_reset(&err) {
            Self::ConnectionReset {
                url: url.to_string(),
                source: Box::new(err),
            }
        } else {
            Self::Http(err)
        }
    }
}

/// Whether `err` or any of its sources is a dropped connection.
pub fn is_connection_reset(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        current = e.source();
    }
    false
}

/// A downloaded package on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

/// Downloads one package to a local path.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        package: &ResolvedPackage,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedFile, DownloadError>;
}

/// [`Fetcher`] over HTTP(S).
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}

impl HttpFetcher {
    pub fn new(client: Client, reporter: Arc<dyn Reporter>) -> Self {
        Self { client, reporter }
    }

    async fn stream_to(
        &self,
        package: &ResolvedPackage,
        part: &Path,
    ) -> Result<(u64, String), DownloadError> {
        let url = package.url.as_str();
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await
            .map_err(|e| DownloadError::classify(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let total = response.content_length();
        self.reporter.downloading(package, 0, total);

        let mut file = File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::classify(url, e))?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
            self.reporter.downloading(package, downloaded, total);
        }
        file.flush().await?;

        if let Some(expected) = total
            && downloaded < expected
        {
            return Err(DownloadError::ConnectionReset {
                url: url.to_string(),
                source: format!("received {downloaded} of {expected} bytes").into(),
            });
        }

        Ok((downloaded, hex::encode(hasher.finalize())))
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        package: &ResolvedPackage,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedFile, DownloadError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(dest);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DownloadError::Cancelled),
            r = self.stream_to(package, &part) => r,
        };

        match result {
            Ok((size, sha256)) => {
                tokio::fs::rename(&part, dest).await?;
                self.reporter.downloaded(package, size);
                tracing::debug!(%package, size, %sha256, "fetched");
                Ok(FetchedFile {
                    path: dest.to_path_buf(),
                    size,
                    sha256,
                })
            }
            Err(e) => {
                tokio::fs::remove_file(&part).await.ok();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use miner_schema::{ComponentKind, Platform};
    use tempfile::tempdir;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Client::new(), Arc::new(NullReporter))
    }

    fn package(url: String) -> ResolvedPackage {
        ResolvedPackage::new(ComponentKind::Editor, Platform::Linux, url)
    }

    #[tokio::test]
    async fn test_fetch_writes_file_and_hash() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/Unity.tar.xz")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("pkgs/Unity.tar.xz");
        let fetched = fetcher()
            .fetch(
                &package(format!("{}/Unity.tar.xz", server.url())),
                &dest,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(fetched.size, 5);
        assert_eq!(
            fetched.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_status_error_is_not_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.exe")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let err = fetcher()
            .fetch(
                &package(format!("{}/missing.exe", server.url())),
                &dir.path().join("missing.exe"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Status { status: 404, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Unroutable: the request would hang, cancellation must win.
        let err = fetcher()
            .fetch(
                &package("http://10.255.255.1/x.exe".into()),
                &dir.path().join("x.exe"),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
    }

    #[derive(Debug, Error)]
    #[error("wrapped")]
    struct Wrapped(#[source] std::io::Error);

    #[test]
    fn test_reset_detected_through_source_chain() {
        let reset = Wrapped(std::io::Error::from(ErrorKind::ConnectionReset));
        assert!(is_connection_reset(&reset));

        let refused = Wrapped(std::io::Error::from(ErrorKind::ConnectionRefused));
        assert!(!is_connection_reset(&refused));
    }

    #[test]
    fn test_only_resets_are_transient() {
        let reset = DownloadError::ConnectionReset {
            url: "u".into(),
            source: "eof".into(),
        };
        assert!(reset.is_transient());
        assert!(!DownloadError::Cancelled.is_transient());
        assert!(!DownloadError::Io(std::io::Error::other("disk full")).is_transient());
    }
}
