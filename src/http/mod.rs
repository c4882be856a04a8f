//! HTTP access to package sources
//!
//! Layers, outermost first: `HttpSource` (cache files, cross-process locks,
//! throttling), `HttpRetryHandler` (attempts, timeouts, diagnostics) and the
//! `HttpTransport` seam.

pub mod cache;
pub mod retry;
pub mod source;
pub mod transport;
pub mod validation;

pub use cache::HttpCacheResult;
pub use retry::{HttpRetryHandler, HttpRetryRequest};
pub use source::{
    HttpSettings, HttpSource, HttpSourceCachedRequest, HttpSourceRequest, HttpSourceResult,
};
pub use transport::{
    HttpTransport, ReqwestTransport, ResponseBody, TransportRequest, TransportResponse,
    SESSION_ID_HEADER,
};
pub use validation::ContentValidation;
