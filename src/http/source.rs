//! Cached and uncached GETs against one package source

use super::cache::HttpCacheResult;
use super::retry::{HttpRetryHandler, HttpRetryRequest};
use super::transport::{HttpTransport, ResponseBody, TransportResponse};
use super::validation::ContentValidation;
use crate::caching::read_cache_file;
use crate::concurrency::with_file_lock;
use crate::config::{Config, EnhancedRetrySettings};
use crate::context::HttpSourceCacheContext;
use crate::error::{FetchError, FetchResult};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Request policy applied when a request does not override it
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub max_tries: u32,
    pub retry_delay: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(100),
            download_timeout: Duration::from_secs(60),
            max_tries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl HttpSettings {
    pub fn from_config(config: &Config, retry: &EnhancedRetrySettings) -> Self {
        Self {
            request_timeout: config.http.request_timeout(),
            download_timeout: config.http.download_timeout(),
            max_tries: retry.effective_max_tries(config.http.max_tries),
            retry_delay: retry.effective_retry_delay(config.http.retry_delay()),
        }
    }
}

/// A GET whose body is persisted in the HTTP cache
#[derive(Debug, Clone)]
pub struct HttpSourceCachedRequest {
    pub url: String,
    pub cache_key: String,
    pub cache_context: HttpSourceCacheContext,
    pub session_id: Uuid,
    /// Answer 404 with `HttpSourceResult::NotFound` instead of an error
    pub ignore_not_found: bool,
    pub validation: ContentValidation,
    pub max_tries: Option<u32>,
    pub is_retry: bool,
    pub is_last_attempt: bool,
}

impl HttpSourceCachedRequest {
    pub fn new(
        url: impl Into<String>,
        cache_key: impl Into<String>,
        cache_context: HttpSourceCacheContext,
        session_id: Uuid,
    ) -> Self {
        Self {
            url: url.into(),
            cache_key: cache_key.into(),
            cache_context,
            session_id,
            ignore_not_found: false,
            validation: ContentValidation::None,
            max_tries: None,
            is_retry: false,
            is_last_attempt: false,
        }
    }
}

/// An uncached GET
#[derive(Debug, Clone)]
pub struct HttpSourceRequest {
    pub url: String,
    pub session_id: Uuid,
    pub ignore_not_found: bool,
    pub max_tries: Option<u32>,
    pub is_retry: bool,
    pub is_last_attempt: bool,
}

impl HttpSourceRequest {
    pub fn new(url: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            url: url.into(),
            session_id,
            ignore_not_found: false,
            max_tries: None,
            is_retry: false,
            is_last_attempt: false,
        }
    }
}

/// Outcome of a cached GET
#[derive(Debug)]
pub enum HttpSourceResult {
    NotFound,
    NoContent,
    /// Content is on disk, either fresh from the cache or just downloaded
    OpenedFromDisk { cache_file: PathBuf, file: File },
}

/// HTTP access to one package source
pub struct HttpSource {
    source: String,
    transport: Arc<dyn HttpTransport>,
    retry_handler: HttpRetryHandler,
    throttle: Option<Arc<Semaphore>>,
    http_cache_dir: PathBuf,
    settings: HttpSettings,
}

impl HttpSource {
    pub fn new(
        source: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        http_cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            transport,
            retry_handler: HttpRetryHandler::default(),
            throttle: None,
            http_cache_dir: http_cache_dir.into(),
            settings: HttpSettings::default(),
        }
    }

    /// Source configured from the `[http]` section and retry environment
    pub fn from_config(
        source: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        http_cache_dir: impl Into<PathBuf>,
        config: &Config,
        retry: &EnhancedRetrySettings,
    ) -> Self {
        Self::new(source, transport, http_cache_dir)
            .with_settings(HttpSettings::from_config(config, retry))
            .with_retry_handler(HttpRetryHandler::new(retry.enabled && retry.retry_429))
            .with_max_concurrent_requests(config.http.max_concurrent_requests)
    }

    pub fn with_settings(mut self, settings: HttpSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry_handler(mut self, handler: HttpRetryHandler) -> Self {
        self.retry_handler = handler;
        self
    }

    /// Limit in-flight requests; 0 means unlimited
    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.throttle = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn http_cache_dir(&self) -> &Path {
        &self.http_cache_dir
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// GET through the HTTP cache.
    ///
    /// Holds the cross-process lock on the cache entry while reading or
    /// replacing it. A fresh entry that fails validation is fetched again.
    pub async fn get_cached(
        &self,
        request: &HttpSourceCachedRequest,
        token: &CancellationToken,
    ) -> FetchResult<HttpSourceResult> {
        let cache = HttpCacheResult::initialize(
            &self.http_cache_dir,
            &self.source,
            &request.cache_key,
            &request.cache_context,
        );

        with_file_lock(&cache.cache_file, token, || {
            self.get_cached_locked(&cache, request, token)
        })
        .await
    }

    async fn get_cached_locked(
        &self,
        cache: &HttpCacheResult,
        request: &HttpSourceCachedRequest,
        token: &CancellationToken,
    ) -> FetchResult<HttpSourceResult> {
        if let Some(file) = read_cache_file(cache.max_age, &cache.cache_file) {
            match request.validation.validate_file(&request.url, &cache.cache_file).await {
                Ok(()) => {
                    debug!("  CACHE {}", request.url);
                    return Ok(HttpSourceResult::OpenedFromDisk {
                        cache_file: cache.cache_file.clone(),
                        file: File::from_std(file),
                    });
                }
                Err(e) => {
                    warn!(
                        "The cached content of {} is invalid and will be downloaded again: {}",
                        request.url, e
                    );
                }
            }
        }

        let response = self
            .send(
                &request.url,
                request.session_id,
                request.max_tries,
                request.is_retry,
                request.is_last_attempt,
                token,
            )
            .await?;

        match response.status {
            404 if request.ignore_not_found => return Ok(HttpSourceResult::NotFound),
            204 => return Ok(HttpSourceResult::NoContent),
            status if !response.is_success() => {
                return Err(FetchError::HttpStatus {
                    url: request.url.clone(),
                    status,
                })
            }
            _ => {}
        }

        let file = cache
            .create_cache_file(&request.url, response.body, request.validation, token)
            .await?;
        Ok(HttpSourceResult::OpenedFromDisk {
            cache_file: cache.cache_file.clone(),
            file,
        })
    }

    /// GET without the HTTP cache. `None` for 204 and ignored 404.
    pub async fn get_stream(
        &self,
        request: &HttpSourceRequest,
        token: &CancellationToken,
    ) -> FetchResult<Option<ResponseBody>> {
        let response = self
            .send(
                &request.url,
                request.session_id,
                request.max_tries,
                request.is_retry,
                request.is_last_attempt,
                token,
            )
            .await?;

        match response.status {
            404 if request.ignore_not_found => Ok(None),
            204 => Ok(None),
            status if !response.is_success() => Err(FetchError::HttpStatus {
                url: request.url.clone(),
                status,
            }),
            _ => Ok(Some(response.body)),
        }
    }

    /// Cached GET of a JSON object. `None` for 204 and ignored 404.
    pub async fn get_json(
        &self,
        request: &HttpSourceCachedRequest,
        token: &CancellationToken,
    ) -> FetchResult<Option<serde_json::Value>> {
        let mut request = request.clone();
        request.validation = ContentValidation::JsonObject;

        match self.get_cached(&request, token).await? {
            HttpSourceResult::NotFound | HttpSourceResult::NoContent => Ok(None),
            HttpSourceResult::OpenedFromDisk { cache_file, mut file } => {
                let mut text = String::new();
                file.read_to_string(&mut text)
                    .await
                    .map_err(|e| FetchError::io(format!("reading {}", cache_file.display()), e))?;
                Ok(Some(serde_json::from_str(&text)?))
            }
        }
    }

    async fn send(
        &self,
        url: &str,
        session_id: Uuid,
        max_tries: Option<u32>,
        is_retry: bool,
        is_last_attempt: bool,
        token: &CancellationToken,
    ) -> FetchResult<TransportResponse> {
        let permit = match self.throttle {
            Some(ref semaphore) => {
                let acquire = semaphore.clone().acquire_owned();
                let permit = tokio::select! {
                    _ = token.cancelled() => return Err(FetchError::Cancelled),
                    permit = acquire => permit,
                };
                Some(permit.map_err(|_| FetchError::Internal("request throttle closed".to_string()))?)
            }
            None => None,
        };

        let request = HttpRetryRequest {
            source: self.source.clone(),
            url: url.to_string(),
            session_id,
            max_tries: max_tries.unwrap_or(self.settings.max_tries),
            retry_delay: self.settings.retry_delay,
            request_timeout: self.settings.request_timeout,
            download_timeout: self.settings.download_timeout,
            is_retry,
            is_last_attempt,
        };

        let mut response = self
            .retry_handler
            .send(self.transport.as_ref(), &request, token)
            .await?;

        if let Some(permit) = permit {
            response.body = Box::pin(ThrottledBody {
                inner: response.body,
                _permit: permit,
            });
        }
        Ok(response)
    }
}

/// Keeps a throttle permit until the body is dropped
struct ThrottledBody {
    inner: ResponseBody,
    _permit: OwnedSemaphorePermit,
}

impl AsyncRead for ThrottledBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_nupkg, MockReply, MockTransport};
    use tempfile::TempDir;

    const SOURCE: &str = "https://feed.test/flat/";

    fn source(transport: Arc<MockTransport>, cache: &Path) -> HttpSource {
        HttpSource::new(SOURCE, transport, cache).with_settings(HttpSettings {
            retry_delay: Duration::from_millis(1),
            ..HttpSettings::default()
        })
    }

    fn cached(url: &str, key: &str, max_age: Duration) -> HttpSourceCachedRequest {
        HttpSourceCachedRequest::new(
            url,
            key,
            HttpSourceCacheContext {
                max_age,
                root_temp_folder: None,
            },
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn second_request_served_from_cache() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let url = "https://feed.test/flat/a/index.json";
        transport.on(url, MockReply::ok(r#"{"versions":["1.0.0"]}"#));
        let http = source(transport.clone(), temp.path());
        let token = CancellationToken::new();

        let request = cached(url, "list_a", Duration::from_secs(60));
        let first = http.get_json(&request, &token).await.unwrap().unwrap();
        let second = http.get_json(&request, &token).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.hits(url), 1);
    }

    #[tokio::test]
    async fn zero_max_age_refetches() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let url = "https://feed.test/flat/b/index.json";
        transport.on(url, MockReply::ok("{}"));
        let http = source(transport.clone(), temp.path());
        let token = CancellationToken::new();

        let request = cached(url, "list_b", Duration::ZERO);
        http.get_json(&request, &token).await.unwrap();
        http.get_json(&request, &token).await.unwrap();

        assert_eq!(transport.hits(url), 2);
    }

    #[tokio::test]
    async fn invalid_cache_entry_is_refetched() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let url = "https://feed.test/flat/c/1.0.0/c.1.0.0.nupkg";
        transport.on(url, MockReply::ok(build_nupkg("C", "1.0.0")));
        let http = source(transport.clone(), temp.path());

        let mut request = cached(url, "nupkg_c.1.0.0", Duration::from_secs(60));
        request.validation = ContentValidation::Nupkg;

        let cache = HttpCacheResult::initialize(temp.path(), SOURCE, "nupkg_c.1.0.0", &request.cache_context);
        std::fs::create_dir_all(cache.cache_file.parent().unwrap()).unwrap();
        std::fs::write(&cache.cache_file, b"corrupt").unwrap();

        let result = http.get_cached(&request, &CancellationToken::new()).await.unwrap();
        assert!(matches!(result, HttpSourceResult::OpenedFromDisk { .. }));
        assert_eq!(transport.hits(url), 1);
        assert_ne!(std::fs::read(&cache.cache_file).unwrap(), b"corrupt");
    }

    #[tokio::test]
    async fn not_found_and_no_content() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let missing = "https://feed.test/flat/missing/index.json";
        let empty = "https://feed.test/flat/empty/index.json";
        transport.on(empty, MockReply::Status(204, Vec::new()));
        let http = source(transport.clone(), temp.path());
        let token = CancellationToken::new();

        let mut request = cached(missing, "list_missing", Duration::from_secs(60));
        request.ignore_not_found = true;
        assert!(matches!(
            http.get_cached(&request, &token).await.unwrap(),
            HttpSourceResult::NotFound
        ));

        request.ignore_not_found = false;
        let err = http.get_cached(&request, &token).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));

        let request = cached(empty, "list_empty", Duration::from_secs(60));
        assert!(matches!(
            http.get_cached(&request, &token).await.unwrap(),
            HttpSourceResult::NoContent
        ));
    }

    #[tokio::test]
    async fn invalid_download_is_not_cached() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let url = "https://feed.test/flat/d/index.json";
        transport.on(url, MockReply::ok("<html>"));
        let http = source(transport.clone(), temp.path());

        let request = cached(url, "list_d", Duration::from_secs(60));
        let err = http.get_json(&request, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidContent { .. }));

        let cache = HttpCacheResult::initialize(temp.path(), SOURCE, "list_d", &request.cache_context);
        assert!(!cache.cache_file.exists());
    }

    #[tokio::test]
    async fn get_stream_skips_cache() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let url = "https://feed.test/flat/e/1.0.0/e.1.0.0.nupkg";
        transport.on(url, MockReply::ok("payload"));
        let http = source(transport.clone(), temp.path()).with_max_concurrent_requests(1);
        let token = CancellationToken::new();

        let request = HttpSourceRequest::new(url, Uuid::new_v4());
        for _ in 0..2 {
            let mut body = http.get_stream(&request, &token).await.unwrap().unwrap();
            let mut text = String::new();
            body.read_to_string(&mut text).await.unwrap();
            assert_eq!(text, "payload");
        }
        assert_eq!(transport.hits(url), 2);

        let mut missing = HttpSourceRequest::new("https://feed.test/flat/none", Uuid::new_v4());
        missing.ignore_not_found = true;
        assert!(http.get_stream(&missing, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn throttle_permit_held_until_body_dropped() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let url = "https://feed.test/flat/f/1.0.0/f.1.0.0.nupkg";
        transport.on(url, MockReply::ok("payload"));
        let http = source(transport.clone(), temp.path()).with_max_concurrent_requests(1);
        let token = CancellationToken::new();
        let request = HttpSourceRequest::new(url, Uuid::new_v4());

        let first = http.get_stream(&request, &token).await.unwrap().unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(100), http.get_stream(&request, &token)).await;
        assert!(blocked.is_err());
        assert_eq!(transport.hits(url), 1);

        drop(first);
        let mut body = tokio::time::timeout(Duration::from_secs(5), http.get_stream(&request, &token))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let mut text = String::new();
        body.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "payload");
        assert_eq!(transport.hits(url), 2);
    }
}
