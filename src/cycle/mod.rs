//! Check-in cycle machinery
//!
//! A cycle fetches each target group's tasks, answers the answerable ones
//! with a simulated coordinate, classifies the responses, and records a
//! summary per group.

pub mod classify;
pub mod history;
pub mod orchestrator;
pub mod task;

pub use classify::{classify, Outcome};
pub use history::{CycleHistory, CycleRecord, HISTORY_CAPACITY};
pub use orchestrator::CycleOrchestrator;
pub use task::{Geofence, TaskDescriptor, TaskKind, TaskStatus};
