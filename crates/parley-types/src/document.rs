//! Raw search result rows

use bytes::Bytes;

/// A single search-result row as returned by the store.
///
/// `total` is the overall match count the store reported for the query,
/// repeated on every row. Documents are never persisted; they only carry raw
/// payloads until they are parsed into typed records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub payload: Bytes,
    pub total: i64,
}
