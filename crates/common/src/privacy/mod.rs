//! Privacy Module - secret redaction
//!
//! Domain-independent rules for scrubbing credentials out of structured
//! context before it reaches any log or audit sink.

pub mod redaction;

pub use redaction::{Redactor, REDACTION_MARKER};
