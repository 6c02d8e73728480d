//! HTTP download of inline images referenced from message bodies.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::config::InlineImagesConfig;

use super::AttachmentError;

/// Downloads inline images with bounded retries and exponential backoff.
#[derive(Debug, Clone)]
pub struct InlineFetcher {
    client: Client,
    max_retries: u32,
    backoff_base: Duration,
}

impl InlineFetcher {
    /// Build a fetcher with its own HTTP client using the configured timeout.
    pub fn from_config(config: &InlineImagesConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;
        Ok(Self::with_client(
            client,
            config.max_retries,
            Duration::from_millis(config.backoff_base_ms),
        ))
    }

    pub fn with_client(client: Client, max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            client,
            max_retries,
            backoff_base,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Stream `url` into `destination`, returning bytes written.
    ///
    /// Transient failures are retried up to `max_retries` times. A partial
    /// file is removed when the download finally fails.
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, AttachmentError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, destination).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    warn!(
                        url = %url,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Inline image fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(destination).await;
                    return Err(e);
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str, destination: &Path) -> Result<u64, AttachmentError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttachmentError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let file = File::create(destination)
            .await
            .map_err(|e| AttachmentError::WriteFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;
        let mut writer = BufWriter::new(file);
        let mut total = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(|e| request_error(url, e))? {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| AttachmentError::WriteFailed {
                    path: destination.to_path_buf(),
                    source: e,
                })?;
            total += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| AttachmentError::WriteFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;

        debug!(url = %url, bytes = total, "Downloaded inline image");
        Ok(total)
    }
}

fn request_error(url: &str, e: reqwest::Error) -> AttachmentError {
    if e.is_timeout() {
        AttachmentError::Timeout {
            url: url.to_string(),
        }
    } else if e.is_connect() {
        AttachmentError::ConnectionFailed {
            url: url.to_string(),
            message: e.to_string(),
        }
    } else {
        AttachmentError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path as UrlPath, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Hits(Arc<AtomicUsize>);

    /// `/ok/{name}` serves bytes, `/flaky/{n}` fails with 503 `n` times,
    /// `/missing` is always 404 and `/broken` always 500.
    async fn serve(hits: Hits) -> SocketAddr {
        async fn ok(UrlPath(name): UrlPath<String>, State(hits): State<Hits>) -> Vec<u8> {
            hits.0.fetch_add(1, Ordering::SeqCst);
            format!("image:{}", name).into_bytes()
        }
        async fn flaky(
            UrlPath(failures): UrlPath<usize>,
            State(hits): State<Hits>,
        ) -> (StatusCode, &'static str) {
            let seen = hits.0.fetch_add(1, Ordering::SeqCst);
            if seen < failures {
                (StatusCode::SERVICE_UNAVAILABLE, "busy")
            } else {
                (StatusCode::OK, "finally")
            }
        }
        async fn missing(State(hits): State<Hits>) -> StatusCode {
            hits.0.fetch_add(1, Ordering::SeqCst);
            StatusCode::NOT_FOUND
        }
        async fn broken(State(hits): State<Hits>) -> StatusCode {
            hits.0.fetch_add(1, Ordering::SeqCst);
            StatusCode::INTERNAL_SERVER_ERROR
        }

        let app = Router::new()
            .route("/ok/{name}", get(ok))
            .route("/flaky/{failures}", get(flaky))
            .route("/missing", get(missing))
            .route("/broken", get(broken))
            .with_state(hits);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn fetcher(max_retries: u32) -> InlineFetcher {
        InlineFetcher::with_client(Client::new(), max_retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_fetch_streams_to_disk() {
        let hits = Hits::default();
        let addr = serve(hits.clone()).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("screenshot.png");

        let bytes = fetcher(3)
            .fetch(&format!("http://{}/ok/abc123", addr), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, "image:abc123".len() as u64);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"image:abc123");
        assert_eq!(hits.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let hits = Hits::default();
        let addr = serve(hits.clone()).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("img.png");

        fetcher(3)
            .fetch(&format!("http://{}/flaky/2", addr), &dest)
            .await
            .unwrap();

        assert_eq!(hits.0.load(Ordering::SeqCst), 3);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"finally");
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let hits = Hits::default();
        let addr = serve(hits.clone()).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("img.png");

        let err = fetcher(2)
            .fetch(&format!("http://{}/broken", addr), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, AttachmentError::HttpStatus { status: 500, .. }));
        assert_eq!(hits.0.load(Ordering::SeqCst), 3);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_client_errors_not_retried() {
        let hits = Hits::default();
        let addr = serve(hits.clone()).await;
        let dir = TempDir::new().unwrap();

        let err = fetcher(3)
            .fetch(
                &format!("http://{}/missing", addr),
                &dir.path().join("img.png"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AttachmentError::HttpStatus { status: 404, .. }));
        assert_eq!(hits.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dir = TempDir::new().unwrap();

        let err = fetcher(1)
            .fetch(&format!("http://{}/ok/x", addr), &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_backoff_doubles() {
        let f = InlineFetcher::with_client(Client::new(), 3, Duration::from_millis(500));
        assert_eq!(f.backoff(0), Duration::from_millis(500));
        assert_eq!(f.backoff(1), Duration::from_millis(1000));
        assert_eq!(f.backoff(2), Duration::from_millis(2000));
    }
}
