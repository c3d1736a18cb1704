//! Error taxonomy
//!
//! Fatal errors (`ServiceAccessError`, `ForcedUpdateError`) propagate to
//! the process boundary and terminate the run. Transient errors
//! (`FetchError`, `AttemptError`, `SimulationError`) are recovered locally
//! inside the cycle.

use thiserror::Error;

/// Remote policy denied access. Fatal; clears the process-wide run signal.
#[derive(Debug, Error)]
pub enum ServiceAccessError {
    /// The remote policy disables the service for everyone.
    #[error("service disabled remotely: {0}")]
    GloballyDisabled(String),
    /// This device is not on the allow-list (or is on the deny-list).
    #[error("device blocked: {0}")]
    DeviceBlocked(String),
}

/// The remote policy requires a newer version than the one running.
#[derive(Debug, Error)]
#[error("update required: running {current}, minimum {required}{}", reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default())]
pub struct ForcedUpdateError {
    /// Version currently running.
    pub current: String,
    /// Minimum version the remote policy accepts.
    pub required: String,
    /// Optional operator-facing reason from the policy document.
    pub reason: Option<String>,
}

/// Fetching the task list for a target group failed. Aborts only that
/// group's sub-cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The group id was rejected before any request was made.
    #[error("invalid group id '{0}'")]
    InvalidGroup(String),
    /// Transport-level failure (DNS, connect, timeout).
    #[error("task list request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The endpoint answered but the payload was not a task list.
    #[error("task list payload malformed: {0}")]
    Malformed(String),
}

/// A single check-in attempt failed at the transport level.
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    /// The request did not complete within the deadline.
    #[error("check-in request timed out")]
    Timeout,
    /// Any other transport failure.
    #[error("check-in request failed: {0}")]
    Transport(String),
    /// The endpoint answered with a non-success HTTP status.
    #[error("check-in rejected with HTTP {0}")]
    Status(u16),
}

/// A zone cannot be used to generate a coordinate.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The zone's bounding rectangle is degenerate or missing.
    #[error("zone '{0}' has no usable bounding rectangle")]
    UnusableBounds(String),
}
