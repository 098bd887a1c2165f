//! Decoders for raw store replies
//!
//! Replies arrive as loosely typed `redis::Value` trees. Every decoder here
//! matches the exact shape its command promises and returns a
//! `DecodeError` for anything else.

use bytes::Bytes;
use parley_core::{Chat, ContactList, DecodeError, Document};
use redis::Value;

/// Decode an `FT.SEARCH` reply:
///
/// ```text
/// [total, id_1, [field, value, ..., body], id_2, [...], ...]
/// ```
///
/// The last element of each field array is the stored document body. A reply
/// of `[0]` decodes to no documents.
pub fn search_documents(reply: Value) -> Result<Vec<Document>, DecodeError> {
    let items = match reply {
        Value::Bulk(items) => items,
        other => return Err(unexpected("search reply array", &other)),
    };

    let mut items = items.into_iter();
    let total = match items.next() {
        Some(Value::Int(total)) => total,
        Some(other) => return Err(unexpected("integer total", &other)),
        None => return Err(DecodeError::MissingTotal),
    };

    let mut docs = Vec::with_capacity(items.len() / 2);
    let mut position = 1;
    while let Some(id) = items.next() {
        let id = string(id, "document id")?;
        let fields = match items.next() {
            Some(Value::Bulk(fields)) => fields,
            Some(other) => return Err(unexpected("document field array", &other)),
            None => return Err(DecodeError::DanglingId(position)),
        };
        let body = match fields.into_iter().last() {
            Some(Value::Data(body)) => Bytes::from(body),
            Some(Value::Status(body)) => Bytes::from(body),
            Some(other) => return Err(unexpected("document body", &other)),
            None => return Err(DecodeError::EmptyFields(id)),
        };

        docs.push(Document {
            id,
            payload: body,
            total,
        });
        position += 2;
    }

    Ok(docs)
}

/// Parse document bodies into chats, taking each chat's id from its key.
///
/// A body that does not parse fails the whole batch and names the document.
pub fn chats(docs: Vec<Document>) -> Result<Vec<Chat>, DecodeError> {
    docs.into_iter()
        .map(|doc| {
            let chat: Chat =
                serde_json::from_slice(&doc.payload).map_err(|e| DecodeError::Payload {
                    id: doc.id.clone(),
                    reason: e.to_string(),
                })?;
            Ok(chat.with_id(doc.id))
        })
        .collect()
}

/// Decode a `ZRANGE ... WITHSCORES` reply: `[member, score, member, score, ...]`.
pub fn scored_members(reply: Value) -> Result<Vec<ContactList>, DecodeError> {
    let items = match reply {
        Value::Bulk(items) => items,
        Value::Nil => return Ok(Vec::new()),
        other => return Err(unexpected("sorted set reply array", &other)),
    };
    if items.len() % 2 != 0 {
        return Err(DecodeError::OddPairs(items.len()));
    }

    let mut contacts = Vec::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let (Some(member), Some(score)) = (items.next(), items.next()) {
        let username = string(member, "sorted set member")?;
        let last_activity = score_value(&username, score)?;
        contacts.push(ContactList {
            username,
            last_activity,
        });
    }

    Ok(contacts)
}

fn score_value(member: &str, score: Value) -> Result<i64, DecodeError> {
    let raw = match score {
        Value::Int(score) => return Ok(score),
        Value::Data(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Value::Status(s) => s,
        other => return Err(unexpected("sorted set score", &other)),
    };

    match raw.parse::<f64>() {
        Ok(score) if score.is_finite() => Ok(score as i64),
        _ => Err(DecodeError::InvalidScore {
            member: member.to_string(),
            value: raw,
        }),
    }
}

fn string(value: Value, expected: &'static str) -> Result<String, DecodeError> {
    match value {
        Value::Data(bytes) => String::from_utf8(bytes).map_err(|e| DecodeError::UnexpectedType {
            expected,
            found: format!("non-UTF-8 bytes ({})", e),
        }),
        Value::Status(s) => Ok(s),
        other => Err(unexpected(expected, &other)),
    }
}

fn unexpected(expected: &'static str, found: &Value) -> DecodeError {
    DecodeError::UnexpectedType {
        expected,
        found: kind(found).to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Int(_) => "integer",
        Value::Data(_) => "bulk string",
        Value::Bulk(_) => "array",
        Value::Status(_) => "status",
        Value::Okay => "OK",
    }
}
