//! Search query construction for the chat index

use crate::{ParleyError, Result};

/// A conversation between two users within an inclusive timestamp range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRangeQuery<'a> {
    pub user_a: &'a str,
    pub user_b: &'a str,
    pub from_ts: i64,
    pub to_ts: i64,
}

impl<'a> ChatRangeQuery<'a> {
    pub fn new(user_a: &'a str, user_b: &'a str, from_ts: i64, to_ts: i64) -> Result<Self> {
        if from_ts > to_ts {
            return Err(ParleyError::InvalidRange {
                from: from_ts,
                to: to_ts,
            });
        }
        Ok(Self {
            user_a,
            user_b,
            from_ts,
            to_ts,
        })
    }

    /// Query string for the `from`/`to` tag fields and the numeric
    /// `timestamp` field, e.g.
    ///
    /// `@from:{alice|bob} @to:{alice|bob} @timestamp:[0 2000]`
    pub fn to_search_query(&self) -> String {
        let users = format!("{}|{}", escape_tag(self.user_a), escape_tag(self.user_b));
        format!(
            "@from:{{{users}}} @to:{{{users}}} @timestamp:[{} {}]",
            self.from_ts, self.to_ts
        )
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        (self.from_ts..=self.to_ts).contains(&timestamp)
    }
}

/// Separator of the `from`/`to` tag fields in the chat index
pub const TAG_SEPARATOR: char = ',';

/// Reject usernames the chat index cannot match as a single tag.
///
/// Stored tag values are split on `TAG_SEPARATOR`, so a name containing it
/// would be indexed as several tags and never found again. Empty names
/// produce no tag at all.
pub fn check_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(ParleyError::InvalidUsername(
            username.to_string(),
            "must not be empty",
        ));
    }
    if username.contains(TAG_SEPARATOR) {
        return Err(ParleyError::InvalidUsername(
            username.to_string(),
            "must not contain ','",
        ));
    }
    Ok(())
}

/// Escape a value for use inside a tag filter.
///
/// Tag values are tokenized on punctuation and whitespace, so anything
/// other than ASCII alphanumerics, `_` and non-ASCII characters is
/// backslash-escaped.
pub fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if !(c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii()) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
