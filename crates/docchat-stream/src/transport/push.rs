use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use crate::config::TransportKind;
use crate::errors::StreamError;
use crate::model::TurnRequest;

use super::{EVENT_STREAM_MIME, StreamTransport, TransportStream, response_into_stream};

/// Opens a server-push channel with a GET whose query carries the turn.
pub struct PushChannelTransport {
    client: reqwest::Client,
    url: String,
}

impl PushChannelTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl StreamTransport for PushChannelTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::PushChannel
    }

    async fn open(&self, request: &TurnRequest) -> Result<TransportStream, StreamError> {
        let query = request
            .query_pairs()
            .map_err(|e| StreamError::protocol(format!("failed to encode history: {e}")))?;
        debug!(url = %self.url, messages = request.messages.len(), "opening push channel");
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, EVENT_STREAM_MIME)
            .header(CACHE_CONTROL, "no-cache")
            .query(&query)
            .send()
            .await
            .map_err(|e| StreamError::transport(format!("push channel open failed: {e}")))?;
        response_into_stream(self.kind(), response).await
    }
}
