//! Kestrel Signal Cache & Distribution
//!
//! The fan-out layer between the signal pipeline and its consumers:
//!
//! - [`SignalCache`]: fixed-capacity, symbol-keyed lookup of the most
//!   recent signal per instrument. Last-write-wins, sharded reads, lookups
//!   never block on an insert for a different key.
//! - [`SignalDistributor`]: pushes signals into per-subscriber bounded
//!   queues under one of four distribution policies. Under load, full
//!   queues drop and count rather than grow - a deliberate lossy
//!   backpressure policy, not a bug.
//!
//! Both components hold `CompactSignal` by value; consumers receive
//! copies, never references, so no synchronization survives past the
//! handoff.

pub mod cache;
pub mod distributor;
pub mod error;

// Re-export main types
pub use cache::{CacheStats, SignalCache};
pub use distributor::{
    DistributionMode, DistributionStats, DistributorConfig, SignalDistributor,
};
pub use error::{Error, Result};
