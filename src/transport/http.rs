//! HTTP transport: `reqwest` body framed by `eventsource-stream`

use super::{FrameStream, StreamTransport, TransportError};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use url::Url;

/// Opens turn streams over plain HTTP(S)
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, url: &Url) -> Result<FrameStream, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| TransportError::connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::status(
                status.as_u16(),
                format!("stream request failed with HTTP {status}"),
            ));
        }

        let frames = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| {
                let frame = match item {
                    // Only default events carry protocol frames; named events
                    // and empty keep-alive payloads are skipped.
                    Ok(event) if !is_message_event(&event.event) || event.data.is_empty() => {
                        tracing::trace!(event = %event.event, "Skipping SSE event");
                        None
                    }
                    Ok(event) => Some(Ok(event.data)),
                    Err(e) => Some(Err(TransportError::stream(e.to_string()))),
                };
                futures::future::ready(frame)
            });

        Ok(frames.boxed())
    }
}

fn is_message_event(name: &str) -> bool {
    name.is_empty() || name == "message"
}
