//! Provider clients for the weekly stablecoin report.
//!
//! ## Architecture
//!
//! - `http` - Transport seam (`HttpTransport`) and the retrying JSON client
//! - `retry` - Transient-fault classification and backoff policy
//! - `supply` - DefiLlama stablecoin supply snapshot
//! - `volume` - Dune async query execution and paginated results

pub mod http;
pub mod retry;
pub mod supply;
pub mod volume;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use http::*;
pub use retry::*;
pub use supply::*;
pub use volume::*;
