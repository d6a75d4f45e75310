//! Sample HTTP host.
//!
//! # Data Flow
//! ```text
//! POST /verify (body = markup)
//!     → request.rs (request ID)
//!     → server.rs handler → Transcluder::resolve_includes
//!     → status override, headers to pass, Cache-Control, Vary
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - The host only adapts HTTP to the library; all transclusion logic lives
//!   in the library modules
//! - A client disconnect drops the handler future, cancelling this request's
//!   fragment waits

pub mod request;
pub mod server;

pub use request::{MakeRequestUuidV4, RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
