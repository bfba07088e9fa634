/// Typed event decoded from one stream frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Retrieved contexts and the provider answering this turn.
    Context {
        contexts: Vec<String>,
        provider: String,
    },
    /// Incremental answer text.
    Token { content: String },
    /// Structured end of the answer.
    Done,
    /// Service-side failure; ends the turn.
    Error { message: String },
}

/// Raw JSON shape of a frame payload.
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct WirePayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub contexts: Option<Vec<String>>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
