//! Include directive subsystem.
//!
//! # Data Flow
//! ```text
//! raw markup
//!     → parser.rs (scan for configured tag names, extract attributes)
//!     → Vec<Segment> (Text / Include, document order)
//!     → resolver (one fetch per Include) → assembler
//! ```
//!
//! # Design Decisions
//! - Malformed directives degrade to literal text, never abort the call
//! - No HTML tree is built; only the directive vocabulary is recognized
//! - Descriptors are immutable once parsed

pub mod descriptor;
pub mod parser;

pub use descriptor::{Include, Segment};
pub use parser::{DirectiveParser, ParseAnomaly};
