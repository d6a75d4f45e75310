//! Fragment subsystem.
//!
//! # Data Flow
//! ```text
//! Include + request headers
//!     → resolver.rs (cache, single-flight, fallbacks)
//!     → client.rs (FragmentClient: outbound GET)
//!     → cache_control.rs (TTL from the fragment's own directives)
//!     → response.rs (immutable FragmentResponse)
//! ```
//!
//! # Design Decisions
//! - The transport is a trait so tests and embedders can supply their own
//! - Fetch failures never escape; every include yields content

pub mod cache_control;
pub mod client;
pub mod resolver;
pub mod response;

pub use cache_control::CachePolicy;
pub use client::{FetchedFragment, FragmentClient, FragmentRequest, HttpFragmentClient};
pub use resolver::{FragmentOutcome, FragmentResolver, ResolvedFragment, Resolution};
pub use response::FragmentResponse;
