//! HTTP handlers

pub mod health;
pub mod ws;

pub use health::health;
