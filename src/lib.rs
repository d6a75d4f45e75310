//! Server-side fragment transclusion.
//!
//! Scans HTML-like markup for include directives, resolves each one to
//! remote fragment content (concurrently, through a shared cache with
//! single-flight fetches, timeouts and fallbacks) and reassembles the
//! document together with the status, headers and `Cache-Control` value a
//! host should respond with.
//!
//! ```text
//! DirectiveParser → FragmentResolver × N (FragmentCache) → ResultAssembler
//!                                                        → TransclusionResult
//! ```

// Core subsystems
pub mod cache;
pub mod config;
pub mod fragment;
pub mod include;
pub mod transclusion;

// Sample host
pub mod http;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::schema::{AppConfig, TransclusionConfig};
pub use error::{FetchError, TransclusionError};
pub use http::HttpServer;
pub use lifecycle::{abort_pair, AbortHandle, AbortSignal, Shutdown};
pub use transclusion::{Transcluder, TransclusionResult, TransclusionStats};
