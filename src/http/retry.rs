//! Retry handler
//!
//! Sends a request up to `max_tries` times. Each attempt is bounded by the
//! request timeout; the body of the returned response is bounded by the
//! download timeout and instrumented for diagnostics.

use super::transport::{HttpTransport, TransportRequest, TransportResponse, SESSION_ID_HEADER};
use crate::diagnostics::{DiagnosticsStream, ProtocolDiagnostics, RequestInfo};
use crate::error::{FetchError, FetchResult};
use crate::timeout::{start_with_timeout, DownloadTimeoutStream};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Upper bound for the backoff delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// One logical request as seen by the retry handler
#[derive(Debug, Clone)]
pub struct HttpRetryRequest {
    pub source: String,
    pub url: String,
    pub session_id: Uuid,
    pub max_tries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    /// The caller is itself retrying; delay before the first attempt
    pub is_retry: bool,
    /// The caller will not retry after this request
    pub is_last_attempt: bool,
}

impl HttpRetryRequest {
    fn transport_request(&self) -> TransportRequest {
        TransportRequest::get(&self.url).header(SESSION_ID_HEADER, self.session_id.to_string())
    }
}

/// Retries 5xx responses, 429 when enabled, and transport failures
#[derive(Debug, Clone, Default)]
pub struct HttpRetryHandler {
    retry_429: bool,
}

impl HttpRetryHandler {
    pub fn new(retry_429: bool) -> Self {
        Self { retry_429 }
    }

    fn should_retry(&self, status: u16) -> bool {
        status >= 500 || (status == 429 && self.retry_429)
    }

    /// Send `request`, returning the first non-retryable response or the
    /// response of the last attempt.
    pub async fn send(
        &self,
        transport: &dyn HttpTransport,
        request: &HttpRetryRequest,
        token: &CancellationToken,
    ) -> FetchResult<TransportResponse> {
        let max_tries = request.max_tries.max(1);
        let mut delay = request.retry_delay;
        let mut tries = 0;

        loop {
            if tries > 0 || request.is_retry {
                tokio::select! {
                    _ = token.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }

            tries += 1;
            let is_last_try = tries >= max_tries;
            let info = RequestInfo {
                source: request.source.clone(),
                url: request.url.clone(),
                status: None,
                header_duration: None,
                is_retry: request.is_retry || tries > 1,
                is_last_attempt: request.is_last_attempt && is_last_try,
            };

            let started = Instant::now();
            let message = format!(
                "The HTTP request to 'GET {}' has timed out after {}ms.",
                request.url,
                request.request_timeout.as_millis()
            );
            let transport_request = request.transport_request();
            let outcome = start_with_timeout(
                |_| transport.send(transport_request),
                request.request_timeout,
                message,
                token,
            )
            .await;

            match outcome {
                Ok(response) => {
                    let elapsed = started.elapsed();
                    info!(
                        "  {} {} {}ms",
                        status_label(response.status),
                        request.url,
                        elapsed.as_millis()
                    );

                    let info = RequestInfo {
                        status: Some(response.status),
                        header_duration: Some(elapsed),
                        ..info
                    };
                    ProtocolDiagnostics::raise(info.in_progress());

                    let status = response.status;
                    let body = DiagnosticsStream::new(
                        DownloadTimeoutStream::new(&request.url, response.body, request.download_timeout),
                        info,
                        started,
                    );
                    let response = TransportResponse {
                        status,
                        body: Box::pin(body),
                    };

                    if self.should_retry(status) && !is_last_try {
                        warn!(
                            "Request to {} returned {}, retrying ({}/{})",
                            request.url, status, tries, max_tries
                        );
                        continue;
                    }
                    return Ok(response);
                }
                Err(FetchError::Cancelled) => {
                    ProtocolDiagnostics::raise(info.finished(started, 0, false, true));
                    return Err(FetchError::Cancelled);
                }
                Err(e) => {
                    ProtocolDiagnostics::raise(info.finished(started, 0, false, false));
                    if is_last_try {
                        return Err(e);
                    }
                    info!("  {} ({}/{}), retrying", e, tries, max_tries);
                }
            }
        }
    }
}

fn status_label(status: u16) -> String {
    if status == 200 {
        "OK".to_string()
    } else {
        status.to_string()
    }
}
