//! tickstore - Transactional Time-Series Storage Engine
//!
//! A durable store for sequences of numeric samples keyed by a string
//! identifier and a timestamp, which computes, caches, and serves
//! pre-aggregated OHLC + Volume + Sum rollups over arbitrary periods,
//! from seconds through years.
//!
//! # Architecture
//!
//! - **Substrate**: a transactional tree store with MVCC snapshots, a
//!   single serialized writer, and a CRC-checked commit journal
//! - **Series layout**: one raw tree and one rollup tree per series arity,
//!   with per-key fixed trees ordered by timestamp tick
//! - **Reader**: lazy raw-point and rollup queries; missing rollup buckets
//!   are computed on demand and written back to the cache
//! - **Writer**: appends raw samples, tracks the touched span per key, and
//!   invalidates every overlapping cached bucket on commit

pub mod period;
pub mod storage;

mod codec;
mod error;
mod layout;
mod meta;
mod reader;
mod store;
mod types;
mod writer;

pub use error::{Result, TickError};
pub use period::{PeriodDuration, PeriodType};
pub use reader::{RawQuery, Reader, RollupQuery};
pub use storage::{StoreConfig, SyncPolicy};
pub use store::{StoreStats, TickStore};
pub use types::*;
pub use writer::Writer;

/// tickstore version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// How long `close` waits for in-flight requests to drain (3 seconds)
    pub const DRAIN_TIMEOUT_MS: u64 = 3_000;

    /// Interval between drain polls while closing
    pub const DRAIN_POLL_INTERVAL_MS: u64 = 100;
}
