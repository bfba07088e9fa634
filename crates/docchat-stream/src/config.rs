use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ChatError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_STREAM_PATH: &str = "document-chat/stream";
pub const DEFAULT_TOP_K: u32 = 5;

/// Which incremental-delivery channel a session streams over.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TransportKind {
    /// POST with a JSON body, response body read chunk by chunk.
    #[default]
    ChunkedBody,
    /// GET server-push channel with parameters in the query string.
    PushChannel,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ChunkedBody => "chunked",
            Self::PushChannel => "push",
        })
    }
}

impl FromStr for TransportKind {
    type Err = ChatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chunked" | "fetch" | "body" => Ok(Self::ChunkedBody),
            "push" | "sse" | "eventsource" => Ok(Self::PushChannel),
            other => Err(ChatError::Config(format!(
                "unknown transport `{other}` (expected `chunked` or `push`)"
            ))),
        }
    }
}

/// Client configuration shared by the streaming session and the service client.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Base URL of the document chat API, including the version prefix.
    pub base_url: String,
    /// Path of the streaming chat endpoint relative to `base_url`.
    pub stream_path: String,
    pub transport: TransportKind,
    pub top_k: u32,
    /// Optional model override forwarded with every turn.
    pub model: Option<String>,
    /// Optional provider override forwarded with every turn.
    pub provider: Option<String>,
    /// Timeout for request/response calls. Streams are not timed out.
    pub timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            transport: TransportKind::default(),
            top_k: DEFAULT_TOP_K,
            model: None,
            provider: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl ChatConfig {
    /// Creates a config for the given base URL with defaults elsewhere.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Builds a config from `DOCCHAT_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self, ChatError> {
        let mut config = Self::default();
        if let Some(url) = read_env("DOCCHAT_API_URL") {
            config.base_url = url;
        }
        if let Some(path) = read_env("DOCCHAT_STREAM_PATH") {
            config.stream_path = path;
        }
        if let Some(kind) = read_env("DOCCHAT_TRANSPORT") {
            config.transport = kind.parse()?;
        }
        if let Some(top_k) = read_env("DOCCHAT_TOP_K") {
            config.top_k = top_k
                .parse()
                .map_err(|e| ChatError::Config(format!("invalid DOCCHAT_TOP_K `{top_k}`: {e}")))?;
        }
        config.model = read_env("DOCCHAT_MODEL");
        config.provider = read_env("DOCCHAT_PROVIDER");
        if let Some(secs) = read_env("DOCCHAT_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e| {
                ChatError::Config(format!("invalid DOCCHAT_TIMEOUT_SECS `{secs}`: {e}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets the streaming endpoint path, relative to `base_url`.
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Selects the chunked-body or push-channel transport.
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Sets how many contexts are retrieved per turn.
    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    /// Requests a specific model instead of the service default.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Requests a specific provider instead of the service default.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the request timeout for the non-streaming endpoints.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks the values a session cannot work without.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.base_url.trim().is_empty() {
            return Err(ChatError::Config("base_url must not be empty".into()));
        }
        if self.top_k == 0 {
            return Err(ChatError::Config("top_k must be greater than 0".into()));
        }
        Ok(())
    }

    /// Joins a relative endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn stream_url(&self) -> String {
        self.endpoint(&self.stream_path)
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let config = ChatConfig::new("http://localhost:8000/api/v1/");
        assert_eq!(
            config.endpoint("/document-chat"),
            "http://localhost:8000/api/v1/document-chat"
        );
        assert_eq!(
            config.stream_url(),
            "http://localhost:8000/api/v1/document-chat/stream"
        );
    }

    #[test]
    fn transport_kind_parses_aliases() {
        assert_eq!("push".parse::<TransportKind>(), Ok(TransportKind::PushChannel));
        assert_eq!("SSE".parse::<TransportKind>(), Ok(TransportKind::PushChannel));
        assert_eq!(" chunked ".parse::<TransportKind>(), Ok(TransportKind::ChunkedBody));
        assert!(matches!(
            "carrier-pigeon".parse::<TransportKind>(),
            Err(ChatError::Config(msg)) if msg.contains("carrier-pigeon")
        ));
    }

    #[test]
    fn validate_rejects_zero_top_k_and_empty_url() {
        assert!(ChatConfig::default().validate().is_ok());
        assert!(matches!(
            ChatConfig::default().top_k(0).validate(),
            Err(ChatError::Config(msg)) if msg.contains("top_k")
        ));
        assert!(matches!(
            ChatConfig::new("  ").validate(),
            Err(ChatError::Config(msg)) if msg.contains("base_url")
        ));
    }
}
