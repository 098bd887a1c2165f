//! Contact list types

use serde::{Deserialize, Serialize};

/// One entry of a user's contact list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactList {
    pub username: String,
    /// Unix seconds of the last interaction with this contact
    pub last_activity: i64,
}

impl ContactList {
    pub fn new(username: impl Into<String>, last_activity: i64) -> Self {
        Self {
            username: username.into(),
            last_activity,
        }
    }
}
