use std::fmt;

use chrono::{DateTime, Utc};

/// Author of a chat message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// One entry of the turn history.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Parameters of one streaming turn, shared by both transports.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnRequest {
    /// Full message history including the latest user message.
    pub messages: Vec<Message>,
    /// Number of retrieved contexts the service should use.
    pub top_k: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl TurnRequest {
    /// Flattens the request into query parameters for GET-style channels.
    ///
    /// The message history is JSON-encoded into a single `messages` value.
    pub fn query_pairs(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        let mut pairs = vec![
            ("messages", serde_json::to_string(&self.messages)?),
            ("top_k", self.top_k.to_string()),
        ];
        if let Some(model) = &self.model {
            pairs.push(("model", model.clone()));
        }
        if let Some(provider) = &self.provider {
            pairs.push(("provider", provider.clone()));
        }
        Ok(pairs)
    }
}

/// Retrieved context reported at the start of a turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RetrievedContext {
    pub contexts: Vec<String>,
    pub provider: String,
}
