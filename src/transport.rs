//! Stream transport abstraction
//!
//! The session runtime only needs "open this URL and give me the `data:`
//! payloads in order". Production code uses [`HttpTransport`]; tests plug in
//! scripted transports.

mod error;
mod http;

pub use error::{TransportError, TransportErrorKind};
pub use http::HttpTransport;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// Ordered SSE `data:` payloads of one turn. The stream ending means the
/// peer closed the connection; dropping it closes the connection from our side.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens server-push streams
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<FrameStream, TransportError>;
}

#[async_trait]
impl<T: StreamTransport + ?Sized> StreamTransport for Arc<T> {
    async fn open(&self, url: &Url) -> Result<FrameStream, TransportError> {
        (**self).open(url).await
    }
}

/// Logging wrapper for transports
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T: StreamTransport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: StreamTransport> StreamTransport for LoggingTransport<T> {
    async fn open(&self, url: &Url) -> Result<FrameStream, TransportError> {
        let start = Instant::now();
        let result = self.inner.open(url).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    url = %url,
                    duration_ms = %duration.as_millis(),
                    "Event stream opened"
                );
            }
            Err(e) => {
                tracing::error!(
                    url = %url,
                    duration_ms = %duration.as_millis(),
                    kind = e.kind.as_str(),
                    error = %e.message,
                    "Event stream failed to open"
                );
            }
        }

        result
    }
}
