//! Metric computation engine.
//!
//! This crate reconciles the supply provider's top stablecoins with the
//! volume provider's rows, derives the reportable metrics, and computes
//! week-over-week changes against the previous run.

pub mod delta;
pub mod metrics;
pub mod reconcile;

pub use delta::*;
pub use metrics::*;
pub use reconcile::*;
