//! Content-addressed disk cache for proxied remote avatars
//!
//! Each distinct source URL maps to one cache file named by the SHA-256 of
//! the canonicalized URL. A file, once written, is never rewritten: the URL
//! is expected to encode any version information the source needs, so the
//! content is permanently valid and no revalidation ever happens.
//!
//! Downloads are staged in a private temp directory outside the addressable
//! cache namespace and promoted with an atomic rename. Concurrent fetches
//! for the same URL may download redundantly; they can never publish a
//! partially written file.

use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, trace};

use crate::errors::DownloadError;
use crate::utils::UrlUtils;

#[derive(Debug, Clone)]
pub struct ProxyCache {
    cache_dir: PathBuf,
    temp_dir: PathBuf,
    http_client: Client,
    max_file_size: u64,
    force_https: bool,
}

impl ProxyCache {
    pub fn new(
        cache_dir: PathBuf,
        temp_dir: PathBuf,
        max_file_size: u64,
        read_timeout: Duration,
        force_https: bool,
    ) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(read_timeout)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        Ok(Self {
            cache_dir,
            temp_dir,
            http_client,
            max_file_size,
            force_https,
        })
    }

    /// Canonicalize a source URL before hashing (scheme-relative upgrade)
    fn canonicalize(&self, url: &str) -> String {
        UrlUtils::upgrade_scheme_relative(url, self.force_https)
    }

    /// SHA-256 hex digest of the canonicalized URL
    fn cache_key(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let hash = hasher.finalize();
        format!("{hash:x}")
    }

    /// Final cache path a URL resolves to, whether or not it exists yet
    pub fn cache_path(&self, url: &str) -> PathBuf {
        let normalized = self.canonicalize(url);
        let key = Self::cache_key(&normalized);
        let extension = UrlUtils::extension_of(&normalized);
        self.cache_dir.join(format!("{key}{extension}"))
    }

    /// Fetch a remote image, serving from the cache when present.
    ///
    /// Returns the on-disk path of the complete image. The caller stamps
    /// Last-Modified from its own metadata (not this file's mtime) and
    /// Content-Length from the file's actual byte size.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf, DownloadError> {
        let normalized = self.canonicalize(url);
        let path = self.cache_path(&normalized);

        if fs::try_exists(&path).await.unwrap_or(false) {
            trace!("proxy cache hit: {} -> {}", normalized, path.display());
            return Ok(path);
        }

        debug!("downloading avatar: {} -> {}", normalized, path.display());
        let bytes = self.download(&normalized).await?;

        fs::create_dir_all(&self.cache_dir).await?;
        fs::create_dir_all(&self.temp_dir).await?;

        // Stage privately, then promote atomically: a reader of `path` sees
        // either nothing or the complete file.
        let temp = tempfile::NamedTempFile::new_in(&self.temp_dir)?.into_temp_path();
        fs::write(&temp, &bytes).await?;
        temp.persist(&path)?;

        Ok(path)
    }

    /// Bounded download of the response body. No retries; a failure here
    /// degrades the request to blank at the call site.
    async fn download(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.http_client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_file_size {
                return Err(DownloadError::TooLarge {
                    limit: self.max_file_size,
                    url: url.to_string(),
                });
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if (bytes.len() + chunk.len()) as u64 > self.max_file_size {
                return Err(DownloadError::TooLarge {
                    limit: self.max_file_size,
                    url: url.to_string(),
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn test_cache(dir: &tempfile::TempDir, max_size: u64) -> ProxyCache {
        ProxyCache::new(
            dir.path().join("cache"),
            dir.path().join("temp"),
            max_size,
            Duration::from_secs(10),
            true,
        )
        .unwrap()
    }

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_cached_file_is_served_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir, 1024);

        // Pre-seed the file at its content-addressed path; the host does not
        // resolve, so any network access would fail the fetch.
        let url = "https://unreachable.invalid/a.png";
        let path = cache.cache_path(url);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"cached bytes").await.unwrap();

        let served = cache.fetch(url).await.unwrap();
        assert_eq!(served, path);
        assert_eq!(fs::read(&served).await.unwrap(), b"cached bytes");
    }

    #[tokio::test]
    async fn test_download_and_second_fetch_is_a_hit() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/img/avatar.png",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { PNG_MAGIC.to_vec() }
            }),
        );
        let addr = serve(router).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir, 1024);
        let url = format!("http://{addr}/img/avatar.png");

        let first = cache.fetch(&url).await.unwrap();
        let second = cache.fetch(&url).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.extension().unwrap(), "png");
        assert_eq!(fs::read(&first).await.unwrap(), PNG_MAGIC);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scheme_relative_urls_share_a_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir, 1024);
        assert_eq!(
            cache.cache_path("//cdn.test/a.png"),
            cache.cache_path("https://cdn.test/a.png")
        );
    }

    #[tokio::test]
    async fn test_oversized_response_is_rejected() {
        let router =
            Router::new().route("/big.png", get(|| async { vec![0u8; 2048] }));
        let addr = serve(router).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir, 1024);
        let url = format!("http://{addr}/big.png");

        let err = cache.fetch(&url).await.unwrap_err();
        assert!(matches!(err, DownloadError::TooLarge { limit: 1024, .. }));
        assert!(!cache.cache_path(&url).exists());
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let router = Router::new().route(
            "/gone.png",
            get(|| async { axum::http::StatusCode::NOT_FOUND }),
        );
        let addr = serve(router).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir, 1024);
        let url = format!("http://{addr}/gone.png");

        let err = cache.fetch(&url).await.unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_never_expose_partial_content() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let body = payload.clone();
        let router = Router::new().route(
            "/slow.png",
            get(move || {
                let body = body.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    body
                }
            }),
        );
        let addr = serve(router).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir, 1 << 20);
        let url = format!("http://{addr}/slow.png");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let url = url.clone();
            tasks.push(tokio::spawn(async move { cache.fetch(&url).await }));
        }

        for task in tasks {
            let path = task.await.unwrap().unwrap();
            // Every winner of the race published a complete file
            assert_eq!(fs::read(&path).await.unwrap(), payload);
        }
    }
}
