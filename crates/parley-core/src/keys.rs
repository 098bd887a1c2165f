//! Store key naming
//!
//! These names are shared with existing data and must not change:
//!
//! - chat documents: `chat#{unix_millis}`
//! - contact lists: `contacts:{username}`
//! - chat search index: `idx#chats`

use crate::ports::Clock;
use std::sync::atomic::{AtomicI64, Ordering};

pub const CHAT_KEY_PREFIX: &str = "chat#";
pub const CONTACTS_KEY_PREFIX: &str = "contacts:";
pub const CHAT_INDEX: &str = "idx#chats";

/// How many keys `create_chat` tries before giving up on a write
pub const MAX_CREATE_ATTEMPTS: usize = 8;

pub fn chat_key(unix_millis: i64) -> String {
    format!("{}{}", CHAT_KEY_PREFIX, unix_millis)
}

pub fn contact_list_key(username: &str) -> String {
    format!("{}{}", CONTACTS_KEY_PREFIX, username)
}

/// Issues chat keys whose millisecond component strictly increases.
///
/// Two calls landing in the same millisecond get consecutive values instead
/// of the same key. This only holds within one process; writers must still
/// use create-if-absent and ask for another key when one is taken.
#[derive(Debug, Default)]
pub struct ChatKeyGenerator {
    last: AtomicI64,
}

impl ChatKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next millisecond value, at least `now_millis` and above every value
    /// issued before.
    pub fn next_millis(&self, now_millis: i64) -> i64 {
        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now_millis.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }

    pub fn next_key(&self, clock: &dyn Clock) -> String {
        chat_key(self.next_millis(clock.now_millis()))
    }
}
