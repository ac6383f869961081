//! Core data types for the stablecoin weekly report.

pub mod asset;
pub mod error;
pub mod format;
pub mod history;
pub mod metric;

pub use asset::*;
pub use error::*;
pub use format::*;
pub use history::*;
pub use metric::*;

/// A single row of a query result, keyed by column name.
pub type VolumeRow = serde_json::Map<String, serde_json::Value>;
