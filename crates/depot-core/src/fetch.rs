//! Remote artifact download.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{DepotError, Result};

/// Downloads an archive from a URL into a local file.
pub trait ArtifactFetcher: Send + Sync {
    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// Any non-success HTTP status is a `Resolution` error. Cancelling `cancel`
    /// aborts the transfer with `Cancelled`; the caller owns `dest` cleanup.
    fn fetch(&self, url: &Url, dest: &Path, cancel: &CancellationToken) -> Result<u64>;
}

/// `reqwest`-backed fetcher with a whole-transfer timeout.
#[derive(Debug, Clone)]
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
}

impl HttpArtifactFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DepotError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DepotError::Resolution(format!("{url} returned HTTP {status}")));
        }

        let file = File::create(dest)
            .map_err(|e| DepotError::io(format!("create {}", dest.display()), e))?;
        let mut out = BufWriter::new(file);
        let mut total = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| transport_error(url, e))? {
            out.write_all(&chunk)
                .map_err(|e| DepotError::io(format!("write {}", dest.display()), e))?;
            total += chunk.len() as u64;
        }
        out.flush()
            .map_err(|e| DepotError::io(format!("flush {}", dest.display()), e))?;
        Ok(total)
    }
}

impl ArtifactFetcher for HttpArtifactFetcher {
    fn fetch(&self, url: &Url, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        // Block on async fetch using a private runtime.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DepotError::io("start async runtime", e))?;

        runtime.block_on(async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DepotError::Cancelled),
                result = self.download(url, dest) => result,
            }
        })
    }
}

fn transport_error(url: &Url, error: reqwest::Error) -> DepotError {
    let context = if error.is_timeout() {
        format!("request to {url} timed out")
    } else {
        format!("request to {url}")
    };
    DepotError::Io {
        context,
        source: io::Error::other(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_before_start_returns_cancelled() {
        let temp = tempfile::TempDir::new().unwrap();
        let fetcher = HttpArtifactFetcher::new(Duration::from_secs(5)).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        // Port 9 (discard) on loopback; cancellation wins before any I/O matters.
        let url = Url::parse("http://127.0.0.1:9/artifacts/A/v1").unwrap();

        let err = fetcher
            .fetch(&url, &temp.path().join("out.zip"), &token)
            .unwrap_err();
        assert!(matches!(err, DepotError::Cancelled));
    }

    #[test]
    fn connection_failure_is_io() {
        let temp = tempfile::TempDir::new().unwrap();
        let fetcher = HttpArtifactFetcher::new(Duration::from_secs(5)).unwrap();
        // Bind then drop a listener to get a port that refuses connections.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = Url::parse(&format!("http://127.0.0.1:{port}/artifacts/A/v1")).unwrap();

        let err = fetcher
            .fetch(&url, &temp.path().join("out.zip"), &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}
