//! Incremental-delivery channels.
//!
//! Both implementations carry the same `data: <json>` wire format; the choice
//! between them is a configuration switch (`ChatConfig::transport`).
mod chunked;
mod push;

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt as _;
use tracing::debug;

use crate::config::{ChatConfig, TransportKind};
use crate::errors::{ChatError, StreamError};
use crate::model::TurnRequest;

pub use chunked::ChunkedBodyTransport;
pub use push::PushChannelTransport;

pub(crate) const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Raw chunks as delivered by the transport.
pub type ChunkStream = Pin<Box<dyn futures::Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// An open stream of raw chunks.
///
/// Dropping or closing it tears the underlying connection down.
pub struct TransportStream {
    kind: TransportKind,
    chunks: ChunkStream,
}

impl TransportStream {
    pub fn new(kind: TransportKind, chunks: ChunkStream) -> Self {
        Self { kind, chunks }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Waits for the next raw chunk. `None` once the channel has ended.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, StreamError>> {
        self.chunks.next().await
    }

    /// Stops delivery early and releases the connection.
    pub fn close(self) {
        debug!(transport = %self.kind, "closing stream transport");
    }
}

/// The "open stream" capability shared by both channels.
#[async_trait::async_trait]
pub trait StreamTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Sends the request and returns the raw chunk stream once the service has
    /// accepted it.
    async fn open(&self, request: &TurnRequest) -> Result<TransportStream, StreamError>;
}

/// Builds the transport selected by `config.transport`.
pub fn transport_for(config: &ChatConfig) -> Result<Arc<dyn StreamTransport>, ChatError> {
    config.validate()?;
    let client = streaming_client()?;
    let url = config.stream_url();
    let transport: Arc<dyn StreamTransport> = match config.transport {
        TransportKind::ChunkedBody => Arc::new(ChunkedBodyTransport::new(client, url)),
        TransportKind::PushChannel => Arc::new(PushChannelTransport::new(client, url)),
    };
    Ok(transport)
}

/// HTTP client for long-lived streams. No overall timeout: idle connections
/// are left to the server and network stack.
pub(crate) fn streaming_client() -> Result<reqwest::Client, ChatError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| ChatError::Config(format!("failed to build streaming client: {e}")))
}

/// Turns an HTTP response into a chunk stream, rejecting non-success statuses.
pub(crate) async fn response_into_stream(
    kind: TransportKind,
    response: reqwest::Response,
) -> Result<TransportStream, StreamError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(StreamError::http_status(
            status.as_u16(),
            format!("stream request failed with status {status}: {body}"),
        ));
    }

    let chunks = response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| StreamError::transport(format!("stream read failed: {e}")))
    });
    Ok(TransportStream::new(kind, Box::pin(chunks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Frame, FrameDecoder};
    use crate::model::Message;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = concat!(
        "data: {\"type\":\"context\",\"contexts\":[\"doc1\"],\"provider\":\"ollama\"}\n\n",
        "data: {\"type\":\"token\",\"content\":\"Hel\"}\n\n",
        "data: {\"type\":\"token\",\"content\":\"lo\"}\n\n",
        "data: [DONE]\n\n",
    );

    fn request() -> TurnRequest {
        TurnRequest {
            messages: vec![Message::user("hi")],
            top_k: 3,
            model: Some("llama3".into()),
            provider: None,
        }
    }

    fn event_stream(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), EVENT_STREAM_MIME)
    }

    async fn decode_all(mut stream: TransportStream) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            frames.extend(decoder.push_chunk(&chunk.expect("chunk")));
        }
        frames.extend(decoder.finish());
        frames
    }

    #[tokio::test]
    async fn chunked_body_posts_json_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/document-chat/stream"))
            .and(header("accept", EVENT_STREAM_MIME))
            .and(body_partial_json(serde_json::json!({"top_k": 3, "model": "llama3"})))
            .respond_with(event_stream(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let config = ChatConfig::new(server.uri()).transport(TransportKind::ChunkedBody);
        let transport = transport_for(&config).expect("transport");
        assert_eq!(transport.kind(), TransportKind::ChunkedBody);
        let frames = decode_all(transport.open(&request()).await.expect("open")).await;
        assert_eq!(frames.len(), 4);
        assert_eq!(frames.last(), Some(&Frame::EndOfStream));
    }

    #[tokio::test]
    async fn push_channel_sends_query_and_matches_chunked_frames() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/document-chat/stream"))
            .and(header("accept", EVENT_STREAM_MIME))
            .and(query_param("top_k", "3"))
            .and(query_param("model", "llama3"))
            .respond_with(event_stream(BODY))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/document-chat/stream"))
            .respond_with(event_stream(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let push = transport_for(&ChatConfig::new(server.uri()).transport(TransportKind::PushChannel))
            .expect("transport");
        assert_eq!(push.kind(), TransportKind::PushChannel);
        let pushed = decode_all(push.open(&request()).await.expect("open")).await;
        let chunked = transport_for(&ChatConfig::new(server.uri())).expect("transport");
        let posted = decode_all(chunked.open(&request()).await.expect("open")).await;
        assert_eq!(pushed, posted);

        let requests = server.received_requests().await.expect("recording enabled");
        let get = requests
            .iter()
            .find(|r| r.body.is_empty())
            .expect("push request");
        let messages = get
            .url
            .query_pairs()
            .find(|(k, _)| k == "messages")
            .map(|(_, v)| v.into_owned())
            .expect("messages param");
        let messages: serde_json::Value = serde_json::from_str(&messages).expect("messages json");
        assert_eq!(messages[0]["content"], "hi");
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"detail": "boom"})),
            )
            .mount(&server)
            .await;
        let transport = transport_for(&ChatConfig::new(server.uri())).expect("transport");
        let err = match transport.open(&request()).await {
            Ok(_) => panic!("500 should fail"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            StreamError::Transport { status_code: Some(500), ref message } if message.contains("boom")
        ));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let transport =
            transport_for(&ChatConfig::new(format!("http://{addr}"))).expect("transport");
        let err = match transport.open(&request()).await {
            Ok(_) => panic!("closed port should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, StreamError::Transport { status_code: None, .. }));
    }
}
