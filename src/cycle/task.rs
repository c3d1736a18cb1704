//! Check-in task model

use serde::Deserialize;

/// What kind of action a task asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    LocationPing,
    LocationPingWithPhoto,
    ScanCode,
    RollCall,
    SecretRequired,
    #[serde(other)]
    Unknown,
}

impl TaskKind {
    /// Whether this kind can be answered with a generated coordinate alone.
    #[must_use]
    pub fn is_location_based(self) -> bool {
        matches!(self, Self::LocationPing | Self::LocationPingWithPhoto)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::LocationPing => "location ping",
            Self::LocationPingWithPhoto => "location ping with photo",
            Self::ScanCode => "scan code",
            Self::RollCall => "roll call",
            Self::SecretRequired => "secret required",
            Self::Unknown => "unknown",
        }
    }
}

/// Server-reported task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Done,
    NotStarted,
    Closed,
    #[serde(other)]
    Unknown,
}

/// Circular area a location answer must fall inside.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Geofence {
    pub lat: f64,
    pub lng: f64,
    pub radius_m: f64,
}

/// One task as reported by the service for a group.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDescriptor {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub geofence: Option<Geofence>,
    #[serde(default)]
    pub requires_secret: bool,
}
