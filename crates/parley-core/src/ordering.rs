//! Result ordering shared by every `Cache` implementation

use parley_types::{Chat, ContactList};
use std::cmp::Ordering;

/// Most recent activity first; equal activity ordered by username ascending.
pub fn contact_order(a: &ContactList, b: &ContactList) -> Ordering {
    b.last_activity
        .cmp(&a.last_activity)
        .then_with(|| a.username.cmp(&b.username))
}

pub fn rank_contacts(contacts: &mut [ContactList]) {
    contacts.sort_by(contact_order);
}

/// Newest first; equal timestamps ordered by key, newest key first.
pub fn chat_order(a: &Chat, b: &Chat) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| key_millis(b).cmp(&key_millis(a)))
}

pub fn sort_chats(chats: &mut [Chat]) {
    chats.sort_by(chat_order);
}

fn key_millis(chat: &Chat) -> Option<i64> {
    chat.id
        .as_deref()
        .and_then(|id| id.strip_prefix(crate::keys::CHAT_KEY_PREFIX))
        .and_then(|millis| millis.parse().ok())
}
