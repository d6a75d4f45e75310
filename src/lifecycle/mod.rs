//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Engine dropped / signal received → cache sweeper stops, server drains
//!
//! Abort (abort.rs):
//!     Client disconnect / caller decision → pending fragments settle
//!     with error content, resolution returns promptly
//! ```
//!
//! # Design Decisions
//! - Shutdown is a broadcast: any number of background tasks subscribe
//! - Abort is level-triggered: a signal checked late still sees the abort

pub mod abort;
pub mod shutdown;

pub use abort::{abort_pair, AbortHandle, AbortSignal};
pub use shutdown::Shutdown;
