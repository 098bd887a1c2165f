//! Error types for Parley

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParleyError>;

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Store command timed out after {0}ms")]
    Timeout(u64),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Could not allocate a free chat key after {0} attempts")]
    KeyCollision(usize),

    #[error("Invalid range: from {from} is after to {to}")]
    InvalidRange { from: i64, to: i64 },

    #[error("Invalid username {0:?}: {1}")]
    InvalidUsername(String, &'static str),
}

impl From<serde_json::Error> for ParleyError {
    fn from(e: serde_json::Error) -> Self {
        ParleyError::Serialization(e.to_string())
    }
}

/// A store reply that does not have the shape its command promises.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("expected {expected}, got {found}")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },

    #[error("search reply is missing the total count")]
    MissingTotal,

    #[error("search reply has a dangling document id at position {0}")]
    DanglingId(usize),

    #[error("document {0} has no fields")]
    EmptyFields(String),

    #[error("sorted set reply has an odd number of elements ({0})")]
    OddPairs(usize),

    #[error("invalid score {value:?} for member {member}")]
    InvalidScore { member: String, value: String },

    #[error("document {id} has an unreadable body: {reason}")]
    Payload { id: String, reason: String },
}
