//! Checkpoint - Automated periodic check-in runner
//!
//! Checkpoint drives recurring check-in cycles against a remote service:
//! it simulates plausible coordinates, honors remotely-controlled policy,
//! classifies responses, and keeps an auditable cycle history.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

pub mod cli;
pub mod client;
pub mod cycle;
pub mod device;
pub mod error;
pub mod geo;
pub mod log;
pub mod notify;
pub mod policy;
pub mod scheduler;
pub mod settings;
pub mod signal;
pub mod status;

// Re-export commonly used types
pub use cli::CycleDisplay;
pub use client::{CheckinClient, HttpCheckinClient};
pub use cycle::{classify, CycleHistory, CycleOrchestrator, CycleRecord, Outcome, TaskDescriptor};
pub use error::{AttemptError, FetchError, ForcedUpdateError, ServiceAccessError};
pub use geo::{CoordinateSimulator, GeneratedCoordinate, Zone, ZoneCatalog};
pub use log::JsonlLogger;
pub use notify::{LogNotifier, Notifier, NotifyEvent};
pub use policy::RemotePolicyCache;
pub use scheduler::PeriodicJobScheduler;
pub use settings::Settings;
pub use signal::{ControlFlags, RunSignal};
pub use status::StatusSnapshot;
