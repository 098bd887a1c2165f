//! Chat message types

use serde::{Deserialize, Serialize};

/// A single chat message exchanged between two users.
///
/// `id` is the store key assigned on creation. It is never part of the
/// stored document body and is filled in when a chat is read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    pub body: String,
    /// Unix seconds
    pub timestamp: i64,
}

impl Chat {
    /// Create a chat with an explicit timestamp
    pub fn at(
        from: impl Into<String>,
        to: impl Into<String>,
        body: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: None,
            from: from.into(),
            to: to.into(),
            body: body.into(),
            timestamp,
        }
    }

    /// True when this chat was sent between `a` and `b`, in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
