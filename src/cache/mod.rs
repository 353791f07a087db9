//! Cache subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator lookup:
//!     → ttl.rs get(key) (expired entries read as absent)
//!     → on miss, fresh value written back with set(key, value)
//!
//! Background (optional):
//!     sweeper.rs interval tick
//!     → ttl.rs purge_expired() reclaims memory
//! ```
//!
//! # Design Decisions
//! - Expiry is checked lazily on read; the sweeper only reclaims memory
//! - One uniform TTL per cache instance, no per-entry override
//! - Sharded map: readers never block readers, writers lock one shard
//! - Monotonic clock for expiry comparisons

pub mod sweeper;
pub mod ttl;

pub use sweeper::CacheSweeper;
pub use ttl::{CacheEntry, CacheSummary, TtlCache};
