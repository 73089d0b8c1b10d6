//! Shared types for Tally
//!
//! The sales record model and the document store error types, used by the
//! client library and the desk binary.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};
