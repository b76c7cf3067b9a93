use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Author role of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    pub fn from_db(value: &str) -> Result<Self> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            other => Err(Error::Database(format!("unknown message role: {other}"))),
        }
    }
}

/// Message shape accepted on write paths, before persistence assigns an
/// ID, sequence number, and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl NewMessage {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            embedding: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MessageRole;

    #[test]
    fn role_round_trips_through_db_encoding() {
        for role in [
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::System,
            MessageRole::Tool,
        ] {
            let decoded = MessageRole::from_db(role.as_str()).expect("known role should decode");
            assert_eq!(decoded, role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(MessageRole::from_db("operator").is_err());
    }
}
