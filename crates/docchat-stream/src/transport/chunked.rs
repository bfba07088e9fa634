use reqwest::header::ACCEPT;
use tracing::debug;

use crate::config::TransportKind;
use crate::errors::StreamError;
use crate::model::TurnRequest;

use super::{EVENT_STREAM_MIME, StreamTransport, TransportStream, response_into_stream};

/// POSTs the turn as a JSON body and reads the response body incrementally.
pub struct ChunkedBodyTransport {
    client: reqwest::Client,
    url: String,
}

impl ChunkedBodyTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl StreamTransport for ChunkedBodyTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ChunkedBody
    }

    async fn open(&self, request: &TurnRequest) -> Result<TransportStream, StreamError> {
        debug!(url = %self.url, messages = request.messages.len(), "opening chunked body stream");
        let response = self
            .client
            .post(&self.url)
            .header(ACCEPT, EVENT_STREAM_MIME)
            .json(request)
            .send()
            .await
            .map_err(|e| StreamError::transport(format!("stream request failed: {e}")))?;
        response_into_stream(self.kind(), response).await
    }
}
