//! CLI output formatting
//!
//! Provides human-readable terminal display for cycle execution,
//! with formatted, colored output on stderr.

pub mod display;

pub use display::CycleDisplay;
