//! Fragment cache subsystem.
//!
//! # Data Flow
//! ```text
//! Include src + vary request headers
//!     → fingerprint.rs (cache key)
//!     → store.rs get (hit → copy with remaining TTL)
//!     → miss: single_flight.rs (join in-flight fetch or lead a new one)
//!     → leader stores cacheable result, releases waiters
//! ```
//!
//! # Design Decisions
//! - The cache is the only state shared across resolution calls
//! - Expired entries are a miss; no stale-while-revalidate
//! - Capacity is counted in bytes and enforced with LRU eviction
//! - Cache faults are logged and treated as misses

pub mod fingerprint;
pub mod single_flight;
pub mod store;

pub use fingerprint::Fingerprint;
pub use single_flight::{FlightRole, SharedFlight, SingleFlight};
pub use store::{CacheEntry, CacheSnapshot, FetchResult, FragmentCache};
