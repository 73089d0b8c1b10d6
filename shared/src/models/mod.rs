//! Data models
//!
//! Wire format is camelCase JSON, matching the remote collection.

pub mod sales_record;

// Re-exports
pub use sales_record::*;
