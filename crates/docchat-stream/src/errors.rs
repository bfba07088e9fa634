/// Errors raised by a single streaming stage (transport, decoding, dispatch)
/// before the session controller decides what they mean for the turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Connection or HTTP failure before or during streaming.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status_code: Option<u16>,
    },
    /// A frame payload could not be parsed. Recoverable: the frame is skipped.
    #[error("protocol error: {message}")]
    Protocol { message: String },
    /// The service sent an explicit `error` event.
    #[error("upstream error: {message}")]
    Upstream { message: String },
}

impl StreamError {
    /// Creates a transport error without an HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: None,
        }
    }

    /// Creates a transport error for a non-success HTTP status.
    pub fn http_status(status_code: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message, .. }
            | Self::Protocol { message }
            | Self::Upstream { message } => message,
        }
    }
}

/// Terminal failure of a started turn. Nothing is committed to history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum TurnFailure {
    /// The connection failed or returned a non-success status.
    #[error("transport failure: {message}")]
    Transport {
        message: String,
        status_code: Option<u16>,
    },
    /// The service reported an error inside the stream.
    #[error("upstream failure: {message}")]
    Upstream { message: String },
}

impl TurnFailure {
    /// Returns the message surfaced to the caller.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message, .. } | Self::Upstream { message } => message,
        }
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid input to a session or service call.
    #[error("validation error: {0}")]
    Validation(String),
    /// A turn is already streaming on this session.
    #[error("a turn is already streaming on this session")]
    Busy,
    /// A started turn ended in failure.
    #[error(transparent)]
    Turn(TurnFailure),
    /// A request/response service call failed.
    #[error("service error: {message}")]
    Service {
        message: String,
        status_code: Option<u16>,
    },
    /// A response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChatError {
    pub(crate) fn service(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Service {
            message: message.into(),
            status_code,
        }
    }
}

impl From<TurnFailure> for ChatError {
    fn from(value: TurnFailure) -> Self {
        ChatError::Turn(value)
    }
}

/// Maps a stage error that ends a turn to its terminal failure.
///
/// Protocol errors never end a turn; callers skip them before reaching here.
/// If one does arrive it is reported as a transport failure.
pub(crate) fn turn_failure_from_stream_error(err: &StreamError) -> TurnFailure {
    match err {
        StreamError::Transport {
            message,
            status_code,
        } => TurnFailure::Transport {
            message: message.clone(),
            status_code: *status_code,
        },
        StreamError::Upstream { message } => TurnFailure::Upstream {
            message: message.clone(),
        },
        StreamError::Protocol { message } => TurnFailure::Transport {
            message: format!("unrecoverable protocol error: {message}"),
            status_code: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_keeps_code_in_turn_failure() {
        let err = StreamError::http_status(503, "service unavailable");
        let failure = turn_failure_from_stream_error(&err);
        assert_eq!(
            failure,
            TurnFailure::Transport {
                message: "service unavailable".into(),
                status_code: Some(503),
            }
        );
        assert_eq!(failure.message(), "service unavailable");
    }

    #[test]
    fn upstream_error_maps_to_upstream_failure() {
        let failure = turn_failure_from_stream_error(&StreamError::upstream("model not found"));
        assert!(matches!(failure, TurnFailure::Upstream { ref message } if message == "model not found"));
        let chat: ChatError = failure.into();
        assert_eq!(chat.to_string(), "upstream failure: model not found");
    }
}
