//! Chat persistence contract

use crate::Result;
use async_trait::async_trait;
use parley_types::{Chat, ContactList};

/// Storage contract for chats and contact lists.
///
/// Keeps callers agnostic of the backing store. Implementations must:
///
///   - keep one entry per contact in a user's list, overwriting its
///     activity time on every interaction
///   - never overwrite a stored chat with another one
///   - return chats newest first and contacts most recent first
#[async_trait]
pub trait Cache: Send + Sync {
    /// Add `contact` to `username`'s contact list, or refresh its last
    /// activity to the current time if it is already there.
    async fn update_contact_list(&self, username: &str, contact: &str) -> Result<()>;

    /// Store a new chat and return its key.
    ///
    /// Both participants are added to each other's contact list with the
    /// chat's timestamp as last activity. Those updates are best-effort:
    /// their failures are logged and the key is still returned, so a
    /// successful call says nothing about contact list consistency.
    async fn create_chat(&self, chat: &Chat) -> Result<String>;

    /// Chats exchanged between `user_a` and `user_b` (either direction) with
    /// `from_ts <= timestamp <= to_ts`, newest first.
    async fn fetch_chat_between(
        &self,
        user_a: &str,
        user_b: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<Chat>>;

    /// A user's contacts, most recent activity first, ties by username.
    async fn fetch_contact_list(&self, username: &str) -> Result<Vec<ContactList>>;

    /// Round trip to the backing store.
    async fn ping(&self) -> Result<()>;
}
