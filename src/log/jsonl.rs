//! JSONL (JSON Lines) logging for cycle history
//!
//! Provides append-only logging of cycle records to `log.jsonl` inside
//! the state directory, so history survives restarts.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use crate::cycle::history::CycleRecord;

/// JSONL logger for cycle history
///
/// Each line is one JSON-encoded [`CycleRecord`].
pub struct JsonlLogger {
    log_path: PathBuf,
}

impl JsonlLogger {
    /// Create a logger writing to `log.jsonl` under `log_dir`, creating
    /// the directory if needed.
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self> {
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

        Ok(Self {
            log_path: log_dir.join("log.jsonl"),
        })
    }

    /// Append one record to the log.
    pub fn append(&self, record: &CycleRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open log file: {}", self.log_path.display()))?;

        let json =
            serde_json::to_string(record).context("Failed to serialize cycle record to JSON")?;
        writeln!(file, "{json}").context("Failed to write to log file")?;

        Ok(())
    }

    /// Read all records from the log, in chronological order. A missing
    /// file reads as empty.
    pub fn read_all(&self) -> Result<Vec<CycleRecord>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.log_path)
            .with_context(|| format!("Failed to read log file: {}", self.log_path.display()))?;

        let mut records = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: CycleRecord = serde_json::from_str(line)
                .with_context(|| format!("Failed to parse line {} as JSON", line_num + 1))?;
            records.push(record);
        }

        Ok(records)
    }

    /// Get the path to the log file
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}
