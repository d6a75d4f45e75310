//! Transclusion subsystem: the public entry point of the library.
//!
//! # Data Flow
//! ```text
//! engine.rs (Transcluder::resolve_includes)
//!     → include parser → fragment resolver × N
//!     → assembler.rs (document order, aggregate metadata)
//!     → result.rs (TransclusionResult) + stats.rs
//! ```
//!
//! # Design Decisions
//! - Configuration is built once and shared by `Arc`; no global state
//! - The fragment cache is the only state shared between calls
//! - Content is always assembled in document order, whatever order fetches finish

pub mod assembler;
pub mod engine;
pub mod result;
pub mod stats;

pub use assembler::ResultAssembler;
pub use engine::Transcluder;
pub use result::TransclusionResult;
pub use stats::{FragmentStat, TransclusionStats};
