//! Protocol diagnostics
//!
//! Process-wide event hub for HTTP, resource and nupkg-copy events.
//! Handlers are registered once and receive every event raised anywhere in
//! the process. `DiagnosticsStream` instruments a response body so that
//! exactly one `Http` event is raised per response.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::trace;

/// Response headers received, body not yet read
#[derive(Debug, Clone, Serialize)]
pub struct HttpInProgressEvent {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub url: String,
    pub header_duration: Duration,
    pub status: Option<u16>,
    pub is_retry: bool,
    pub is_last_attempt: bool,
}

/// A request finished, successfully or not
#[derive(Debug, Clone, Serialize)]
pub struct HttpEvent {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub url: String,
    pub header_duration: Option<Duration>,
    pub event_duration: Duration,
    pub bytes: u64,
    pub status: Option<u16>,
    pub is_success: bool,
    pub is_retry: bool,
    pub is_cancelled: bool,
    pub is_last_attempt: bool,
}

/// A resource-level operation finished
#[derive(Debug, Clone, Serialize)]
pub struct ResourceEvent {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub resource_type: String,
    pub method: String,
    pub duration: Duration,
}

/// A nupkg was copied to a caller-supplied destination
#[derive(Debug, Clone, Serialize)]
pub struct NupkgCopiedEvent {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolEvent {
    HttpInProgress(HttpInProgressEvent),
    Http(HttpEvent),
    Resource(ResourceEvent),
    NupkgCopied(NupkgCopiedEvent),
}

type Handler = Arc<dyn Fn(&ProtocolEvent) + Send + Sync>;

/// Identifies a registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

static HANDLERS: Lazy<RwLock<Vec<(SubscriptionId, Handler)>>> = Lazy::new(|| RwLock::new(Vec::new()));
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide diagnostics hub
pub struct ProtocolDiagnostics;

impl ProtocolDiagnostics {
    /// Register a handler for every future event
    pub fn subscribe<F>(handler: F) -> SubscriptionId
    where
        F: Fn(&ProtocolEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        let mut handlers = HANDLERS.write().unwrap_or_else(|e| e.into_inner());
        handlers.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Unknown ids are ignored.
    pub fn unsubscribe(id: SubscriptionId) {
        let mut handlers = HANDLERS.write().unwrap_or_else(|e| e.into_inner());
        handlers.retain(|(existing, _)| *existing != id);
    }

    /// Deliver `event` to every handler
    pub fn raise(event: ProtocolEvent) {
        trace!(?event, "protocol event");
        // Clone the list so handlers may subscribe or unsubscribe
        let handlers: Vec<Handler> = {
            let guard = HANDLERS.read().unwrap_or_else(|e| e.into_inner());
            guard.iter().map(|(_, h)| h.clone()).collect()
        };
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn raise_resource(source: &str, resource_type: &str, method: &str, duration: Duration) {
        Self::raise(ProtocolEvent::Resource(ResourceEvent {
            timestamp: Utc::now(),
            source: source.to_string(),
            resource_type: resource_type.to_string(),
            method: method.to_string(),
            duration,
        }));
    }

    pub fn raise_nupkg_copied(source: &str, file_size: u64) {
        Self::raise(ProtocolEvent::NupkgCopied(NupkgCopiedEvent {
            timestamp: Utc::now(),
            source: source.to_string(),
            file_size,
        }));
    }
}

/// Request facts carried into the final `Http` event
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub source: String,
    pub url: String,
    pub status: Option<u16>,
    pub header_duration: Option<Duration>,
    pub is_retry: bool,
    pub is_last_attempt: bool,
}

impl RequestInfo {
    pub(crate) fn in_progress(&self) -> ProtocolEvent {
        ProtocolEvent::HttpInProgress(HttpInProgressEvent {
            timestamp: Utc::now(),
            source: self.source.clone(),
            url: self.url.clone(),
            header_duration: self.header_duration.unwrap_or_default(),
            status: self.status,
            is_retry: self.is_retry,
            is_last_attempt: self.is_last_attempt,
        })
    }

    pub(crate) fn finished(
        &self,
        started: Instant,
        bytes: u64,
        is_success: bool,
        is_cancelled: bool,
    ) -> ProtocolEvent {
        ProtocolEvent::Http(HttpEvent {
            timestamp: Utc::now(),
            source: self.source.clone(),
            url: self.url.clone(),
            header_duration: self.header_duration,
            event_duration: started.elapsed(),
            bytes,
            status: self.status,
            is_success,
            is_retry: self.is_retry,
            is_cancelled,
            is_last_attempt: self.is_last_attempt,
        })
    }
}

/// Counts body bytes and raises one `Http` event when the body ends
pub struct DiagnosticsStream<R> {
    inner: R,
    info: RequestInfo,
    started: Instant,
    bytes: u64,
    raised: bool,
}

impl<R> DiagnosticsStream<R> {
    /// `started` is when the request was sent
    pub fn new(inner: R, info: RequestInfo, started: Instant) -> Self {
        Self {
            inner,
            info,
            started,
            bytes: 0,
            raised: false,
        }
    }

    fn finish(&mut self, is_success: bool) {
        if !self.raised {
            self.raised = true;
            ProtocolDiagnostics::raise(self.info.finished(self.started, self.bytes, is_success, false));
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DiagnosticsStream<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let read = buf.filled().len() - before;
                if read == 0 && buf.remaining() > 0 {
                    this.finish(true);
                } else {
                    this.bytes += read as u64;
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                this.finish(false);
                Poll::Ready(Err(e))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<R> Drop for DiagnosticsStream<R> {
    fn drop(&mut self) {
        self.finish(false);
    }
}
