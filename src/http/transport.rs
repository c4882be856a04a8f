//! HTTP transport seam
//!
//! Everything above this trait deals in status codes and byte streams.
//! `ReqwestTransport` is the production implementation.

use crate::error::{FetchError, FetchResult};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::Client;
use std::io;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

/// A streaming response body
pub type ResponseBody = Pin<Box<dyn AsyncRead + Send>>;

/// Header carrying the per-operation session id
pub const SESSION_ID_HEADER: &str = "X-NuGet-Session-Id";

/// A GET request
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status code plus body
pub struct TransportResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends requests and returns once response headers are available
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> FetchResult<TransportResponse>;
}

/// `reqwest` backed transport
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client. Timeouts are applied per request by the retry handler.
    pub fn new(user_agent: &str) -> FetchResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> FetchResult<TransportResponse> {
        debug!(url = %request.url, "GET");
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::http(&request.url, e.to_string()))?;

        let status = response.status().as_u16();
        let stream = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));

        Ok(TransportResponse {
            status,
            body: Box::pin(StreamReader::new(stream)),
        })
    }
}
