//! Storage layer
//!
//! Redis Stack (RedisJSON + RediSearch + sorted sets) for real deployments,
//! DashMap (in-memory) when no store is configured.

pub mod decode;
pub mod memory;
pub mod redis;

pub use self::redis::RedisCache;
pub use memory::MemoryCache;
