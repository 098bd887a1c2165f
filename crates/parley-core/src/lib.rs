//! Parley Core Library
//!
//! Domain contract for chat persistence: the `Cache` port, key naming,
//! chat key generation and search query construction.

// Re-export pure types from parley-types
pub use parley_types::*;

pub mod error;
pub mod keys;
pub mod ordering;
pub mod ports;
pub mod query;

pub use error::{DecodeError, ParleyError, Result};
pub use keys::ChatKeyGenerator;
pub use ports::{Cache, Clock, ManualClock, SystemClock};
pub use query::ChatRangeQuery;
