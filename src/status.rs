//! Runtime status snapshot

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cycle::history::CycleRecord;

/// Point-in-time view of the orchestrator, safe to serialize for display
/// or logging.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub cycles_completed: u64,
    /// Distinct tasks confirmed this session.
    pub confirmed: usize,
    /// Distinct tasks found permanently unanswerable this session.
    pub permanently_invalid: usize,
    pub total_confirmed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_record: Option<CycleRecord>,
    pub next_cycle_time: Option<DateTime<Utc>>,
    /// Group ids that have had at least one confirmation this session.
    pub groups_succeeded: Vec<String>,
}

impl StatusSnapshot {
    #[must_use]
    pub fn idle() -> Self {
        Self {
            running: false,
            cycles_completed: 0,
            confirmed: 0,
            permanently_invalid: 0,
            total_confirmed: 0,
            last_record: None,
            next_cycle_time: None,
            groups_succeeded: Vec::new(),
        }
    }
}
