//! Port traits (interfaces) for dependency injection

pub mod cache;
pub mod clock;

pub use cache::Cache;
pub use clock::{Clock, ManualClock, SystemClock};
