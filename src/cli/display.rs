//! Rich CLI display for cycle execution
//!
//! Renders cycle progress as human-readable terminal output. All output
//! goes to stderr so stdout remains clean for piping.

use colored::Colorize;

use crate::cycle::classify::Outcome;
use crate::geo::GeneratedCoordinate;

/// Display handler for cycle output
#[derive(Debug, Default)]
pub struct CycleDisplay;

impl CycleDisplay {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Print the cycle header at the start of a cycle
    pub fn cycle_header(&self, cycle_number: u64, group_count: usize, coordinate: &GeneratedCoordinate) {
        eprintln!(
            "\n{} {}",
            "===".bold().cyan(),
            format!("Cycle {cycle_number} ({group_count} group(s))")
                .bold()
                .cyan()
        );
        eprintln!(
            "  {} {:.6}, {:.6} ±{:.0}m [{}]",
            "Coordinate:".dimmed(),
            coordinate.lat,
            coordinate.lng,
            coordinate.accuracy,
            coordinate.source
        );
        eprintln!("{}", "─".repeat(50).dimmed());
    }

    /// One line per classified attempt
    pub fn task_outcome(&self, task_id: &str, title: &str, outcome: Outcome) {
        let marker = match outcome {
            Outcome::Success | Outcome::AlreadyDone => "✓".green().bold(),
            Outcome::Ambiguous => "?".yellow().bold(),
            Outcome::NeedsSecret | Outcome::OutOfRange => "⚠".yellow().bold(),
            Outcome::NotOpenOrClosed | Outcome::InvalidOrNotFound => "✗".red().bold(),
        };
        eprintln!(
            "  {marker} {} {}",
            Self::task_label(task_id, title).bold(),
            outcome.label().dimmed()
        );
    }

    /// One line per task skipped before any attempt
    pub fn task_skipped(&self, task_id: &str, title: &str, reason: &str) {
        eprintln!(
            "  {} {} {}",
            "·".dimmed(),
            Self::task_label(task_id, title),
            format!("skipped: {reason}").dimmed()
        );
    }

    /// Render the post-group summary
    pub fn group_summary(
        &self,
        group_id: &str,
        found: usize,
        processed: usize,
        skipped: usize,
        error: Option<&str>,
    ) {
        let status = if error.is_some() {
            "FAILED".red().bold().to_string()
        } else if processed > 0 {
            "COMPLETED".green().bold().to_string()
        } else {
            "IDLE".dimmed().to_string()
        };
        eprintln!("  {status} {}", group_id.bold());
        eprintln!(
            "  {} {found} found | {processed} processed | {skipped} skipped",
            "Stats:".dimmed()
        );
        if let Some(error) = error {
            let short = if error.len() > 100 {
                format!("{}...", &error[..97])
            } else {
                error.to_string()
            };
            eprintln!("  {} {}", "✗".red().bold(), short.red());
        }
    }

    /// Periodic notice while sleeping between cycles
    pub fn waiting_notice(&self, remaining_secs: u64) {
        let mins = remaining_secs / 60;
        let secs = remaining_secs % 60;
        eprintln!(
            "  {} next cycle in {mins}m {secs}s",
            "Waiting:".dimmed()
        );
    }

    /// Periodic notice while outside the active-hours window
    pub fn window_wait_notice(&self, start: &str, end: &str) {
        eprintln!(
            "  {} outside active hours ({start}-{end}), waiting",
            "Window:".dimmed()
        );
    }

    /// Shown when the session credential looks expired
    pub fn credential_warning(&self) {
        eprintln!(
            "  {} session credential rejected, re-run the login flow",
            "⚠".yellow().bold()
        );
    }

    /// Shown when the exit-after-success condition stops the loop
    pub fn exit_notice(&self, groups_succeeded: usize) {
        eprintln!(
            "\n  {} {groups_succeeded} group(s) confirmed, stopping",
            "DONE".green().bold()
        );
    }

    /// Startup announcement from the remote policy
    pub fn announcement(&self, title: &str, message: &str) {
        eprintln!("\n{} {}", "📢".bold(), title.bold().yellow());
        eprintln!("  {message}\n");
    }

    fn task_label(task_id: &str, title: &str) -> String {
        if title.is_empty() {
            task_id.to_string()
        } else {
            format!("{title} ({task_id})")
        }
    }
}
