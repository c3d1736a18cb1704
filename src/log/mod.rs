//! Logging and observability
//!
//! JSONL logging for cycle history, plus the tracing setup used by the
//! binary.

pub mod jsonl;
pub mod tracing_setup;

pub use jsonl::JsonlLogger;
pub use tracing_setup::init_tracing;
