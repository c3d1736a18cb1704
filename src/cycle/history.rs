//! Cycle history ring

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many completed cycles are kept in memory.
pub const HISTORY_CAPACITY: usize = 50;

/// Summary of one completed check-in cycle for one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_number: u64,
    pub start_time: DateTime<Utc>,
    pub group_id: String,
    /// Tasks the service reported for the group.
    pub found: usize,
    /// Tasks that reached a confirmed state this cycle.
    pub processed: usize,
    /// Tasks skipped or left unresolved.
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fixed-capacity ring of the most recent cycle records.
#[derive(Debug, Default)]
pub struct CycleHistory {
    records: VecDeque<CycleRecord>,
}

impl CycleHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, evicting the oldest once at capacity.
    pub fn push(&mut self, record: CycleRecord) {
        if self.records.len() == HISTORY_CAPACITY {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &CycleRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&CycleRecord> {
        self.records.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u64) -> CycleRecord {
        CycleRecord {
            cycle_number: n,
            start_time: Utc::now(),
            group_id: "g1".to_string(),
            found: 1,
            processed: 1,
            skipped: 0,
            error: None,
        }
    }

    #[test]
    fn test_push_and_latest() {
        let mut history = CycleHistory::new();
        assert!(history.is_empty());
        history.push(record(1));
        history.push(record(2));
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().cycle_number, 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = CycleHistory::new();
        for n in 0..(HISTORY_CAPACITY as u64 + 10) {
            history.push(record(n));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.iter().next().unwrap().cycle_number, 10);
        assert_eq!(
            history.latest().unwrap().cycle_number,
            HISTORY_CAPACITY as u64 + 9
        );
    }

    #[test]
    fn test_record_serialization_omits_empty_error() {
        let json = serde_json::to_string(&record(3)).unwrap();
        assert!(!json.contains("error"));
    }
}
