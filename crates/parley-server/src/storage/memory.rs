//! In-memory cache using DashMap
//!
//! Same contract and ordering as the Redis cache, without a store. Nothing
//! survives a restart.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parley_core::keys::MAX_CREATE_ATTEMPTS;
use parley_core::ordering::{rank_contacts, sort_chats};
use parley_core::query::check_username;
use parley_core::{
    Cache, Chat, ChatKeyGenerator, ChatRangeQuery, Clock, ContactList, ParleyError, Result,
    SystemClock,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct MemoryCache {
    /// Chat key -> stored chat (without id)
    chats: DashMap<String, Chat>,
    /// Owner -> contact -> last activity
    contacts: DashMap<String, HashMap<String, i64>>,
    clock: Arc<dyn Clock>,
    keys: ChatKeyGenerator,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            chats: DashMap::new(),
            contacts: DashMap::new(),
            clock,
            keys: ChatKeyGenerator::new(),
        }
    }

    fn set_contact(&self, username: &str, contact: &str, score: i64) {
        self.contacts
            .entry(username.to_string())
            .or_default()
            .insert(contact.to_string(), score);
    }

    fn insert_chat(&self, chat: Chat) -> Result<String> {
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let key = self.keys.next_key(self.clock.as_ref());
            match self.chats.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(chat);
                    return Ok(key);
                }
                Entry::Occupied(_) => {
                    warn!(key = %key, attempt, "Chat key already taken, trying the next one");
                }
            }
        }
        Err(ParleyError::KeyCollision(MAX_CREATE_ATTEMPTS))
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn update_contact_list(&self, username: &str, contact: &str) -> Result<()> {
        self.set_contact(username, contact, self.clock.now_secs());
        Ok(())
    }

    async fn create_chat(&self, chat: &Chat) -> Result<String> {
        check_username(&chat.from)?;
        check_username(&chat.to)?;

        let mut chat = chat.clone();
        chat.id = None;

        let (from, to, timestamp) = (chat.from.clone(), chat.to.clone(), chat.timestamp);
        let key = self.insert_chat(chat)?;
        debug!(key = %key, "Stored chat");

        self.set_contact(&from, &to, timestamp);
        self.set_contact(&to, &from, timestamp);

        Ok(key)
    }

    async fn fetch_chat_between(
        &self,
        user_a: &str,
        user_b: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<Chat>> {
        let query = ChatRangeQuery::new(user_a, user_b, from_ts, to_ts)?;

        let mut chats: Vec<Chat> = self
            .chats
            .iter()
            .filter(|entry| entry.is_between(user_a, user_b) && query.contains(entry.timestamp))
            .map(|entry| entry.value().clone().with_id(entry.key().clone()))
            .collect();
        sort_chats(&mut chats);
        Ok(chats)
    }

    async fn fetch_contact_list(&self, username: &str) -> Result<Vec<ContactList>> {
        let mut contacts: Vec<ContactList> = self
            .contacts
            .get(username)
            .map(|list| {
                list.iter()
                    .map(|(contact, score)| ContactList::new(contact.clone(), *score))
                    .collect()
            })
            .unwrap_or_default();
        rank_contacts(&mut contacts);
        Ok(contacts)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
