//! Request extractors

pub mod origin;

pub use origin::AllowedOrigin;
