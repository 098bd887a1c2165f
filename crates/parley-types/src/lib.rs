//! Parley Types - Pure type definitions
//!
//! This crate contains only plain data types shared by the persistence
//! contract and the server, with no async runtime dependencies.

pub mod chat;
pub mod contact;
pub mod document;

pub use chat::*;
pub use contact::*;
pub use document::*;
