use tracing::{debug, warn};

use crate::errors::StreamError;
use crate::event::{StreamEvent, WirePayload};

/// Receives decoded events in arrival order.
pub trait EventSink {
    fn on_event(&mut self, event: StreamEvent);
}

impl EventSink for Vec<StreamEvent> {
    fn on_event(&mut self, event: StreamEvent) {
        self.push(event);
    }
}

/// Parses one frame payload into a typed event.
///
/// `Ok(None)` means the frame was well formed but failed validation and is
/// dropped. `Err` is a protocol error: the payload was not a JSON object with
/// a `type` field.
pub fn parse_event(payload: &str) -> Result<Option<StreamEvent>, StreamError> {
    let wire: WirePayload = serde_json::from_str(payload)
        .map_err(|e| StreamError::protocol(format!("invalid frame payload: {e}")))?;

    let event = match wire.kind.as_str() {
        "context" => match (wire.contexts, wire.provider) {
            (Some(contexts), Some(provider))
                if !contexts.is_empty() && !provider.trim().is_empty() =>
            {
                Some(StreamEvent::Context { contexts, provider })
            }
            _ => None,
        },
        "token" => wire
            .content
            .filter(|content| !content.is_empty())
            .map(|content| StreamEvent::Token { content }),
        "done" => Some(StreamEvent::Done),
        "error" => Some(StreamEvent::Error {
            message: wire
                .error
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "upstream reported an error without a message".to_string()),
        }),
        _ => None,
    };
    Ok(event)
}

/// Routes decoded payloads to a sink, one event per call.
#[derive(Debug, Default)]
pub struct Dispatcher {
    forwarded: u64,
    dropped: u64,
    malformed: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `payload` and forwards the resulting event, if any.
    ///
    /// Malformed payloads are logged and skipped. Returns whether an event
    /// reached the sink.
    pub fn dispatch<S: EventSink + ?Sized>(&mut self, payload: &str, sink: &mut S) -> bool {
        match parse_event(payload) {
            Ok(Some(event)) => {
                self.forwarded += 1;
                sink.on_event(event);
                true
            }
            Ok(None) => {
                self.dropped += 1;
                debug!(payload_len = payload.len(), "dropping frame that failed validation");
                false
            }
            Err(err) => {
                self.malformed += 1;
                warn!(error = %err, "skipping malformed frame");
                false
            }
        }
    }

    /// Events handed to the sink.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Parsed frames ignored: unknown type or failed field validation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Frames that were not JSON or had no `type`.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_variant() {
        assert_eq!(
            parse_event(r#"{"type":"context","contexts":["doc1","doc2"],"provider":"ollama"}"#),
            Ok(Some(StreamEvent::Context {
                contexts: vec!["doc1".into(), "doc2".into()],
                provider: "ollama".into(),
            }))
        );
        assert_eq!(
            parse_event(r#"{"type":"token","content":"Hello"}"#),
            Ok(Some(StreamEvent::Token {
                content: "Hello".into()
            }))
        );
        assert_eq!(parse_event(r#"{"type":"done"}"#), Ok(Some(StreamEvent::Done)));
        assert_eq!(
            parse_event(r#"{"type":"error","error":"model missing"}"#),
            Ok(Some(StreamEvent::Error {
                message: "model missing".into()
            }))
        );
    }

    #[test]
    fn invalid_frames_are_dropped_not_errors() {
        for payload in [
            r#"{"type":"context","contexts":[],"provider":"ollama"}"#,
            r#"{"type":"context","contexts":["doc1"]}"#,
            r#"{"type":"context","contexts":["doc1"],"provider":" "}"#,
            r#"{"type":"token","content":""}"#,
            r#"{"type":"token"}"#,
            r#"{"type":"heartbeat"}"#,
        ] {
            assert_eq!(parse_event(payload), Ok(None), "payload {payload}");
        }
    }

    #[test]
    fn error_without_message_still_surfaces() {
        let event = parse_event(r#"{"type":"error"}"#).expect("parse");
        assert!(matches!(event, Some(StreamEvent::Error { message }) if !message.is_empty()));
    }

    #[test]
    fn non_json_and_untyped_payloads_are_protocol_errors() {
        assert!(matches!(
            parse_event("{not json"),
            Err(StreamError::Protocol { .. })
        ));
        assert!(matches!(
            parse_event(r#"{"content":"x"}"#),
            Err(StreamError::Protocol { .. })
        ));
    }

    #[test]
    fn malformed_frame_does_not_block_later_frames() {
        let mut dispatcher = Dispatcher::new();
        let mut sink: Vec<StreamEvent> = Vec::new();
        assert!(!dispatcher.dispatch("{\"type\":\"token\",", &mut sink));
        assert!(dispatcher.dispatch(r#"{"type":"token","content":"after"}"#, &mut sink));
        assert_eq!(
            sink,
            vec![StreamEvent::Token {
                content: "after".into()
            }]
        );
        assert_eq!(dispatcher.malformed(), 1);
        assert_eq!(dispatcher.forwarded(), 1);
        assert_eq!(dispatcher.dropped(), 0);
    }
}
