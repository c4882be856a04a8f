//! Timeouts for requests and response bodies
//!
//! `start_with_timeout` bounds the time until an operation completes.
//! `DownloadTimeoutStream` bounds the time a single body read may stall.

use crate::error::{FetchError, FetchResult};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;

/// Run `operation` with a child token, racing it against `timeout`.
///
/// When the timeout elapses first the child token is cancelled and
/// `FetchError::Timeout(message)` is returned. Cancelling `token` yields
/// `FetchError::Cancelled`. `Duration::MAX` disables the timeout.
pub async fn start_with_timeout<F, Fut, T>(
    operation: F,
    timeout: Duration,
    message: impl Into<String>,
    token: &CancellationToken,
) -> FetchResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let child = token.child_token();
    let deadline = Instant::now().checked_add(timeout);
    let expired = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    let operation = operation(child.clone());

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(FetchError::Cancelled),
        result = operation => result,
        _ = expired => {
            child.cancel();
            Err(FetchError::Timeout(message.into()))
        }
    }
}

/// Fails a read that receives no data within the download timeout
pub struct DownloadTimeoutStream<R> {
    inner: R,
    url: String,
    timeout: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<R> DownloadTimeoutStream<R> {
    pub fn new(url: impl Into<String>, inner: R, timeout: Duration) -> Self {
        Self {
            inner,
            url: url.into(),
            timeout,
            deadline: None,
        }
    }

    fn timeout_error(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!(
                "The download of '{}' timed out because no data was received for {}ms.",
                self.url,
                self.timeout.as_millis()
            ),
        )
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DownloadTimeoutStream<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                let Some(when) = Instant::now().checked_add(this.timeout) else {
                    return Poll::Pending;
                };
                let deadline = this
                    .deadline
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(when)));
                match deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        this.deadline = None;
                        Poll::Ready(Err(this.timeout_error()))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}
