//! Attempt response classification
//!
//! Maps the free-text body returned by a check-in attempt onto a small
//! outcome taxonomy. Rules are matched in order against the lowercased
//! response and the first hit wins, so more specific phrases (a secret
//! prompt inside an otherwise successful page) take precedence over
//! generic ones.

/// Classified result of a check-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The task wants a secret the client cannot supply.
    NeedsSecret,
    /// The task was already completed earlier.
    AlreadyDone,
    /// The attempt was accepted.
    Success,
    /// The task is not yet open or has been closed.
    NotOpenOrClosed,
    /// The submitted coordinate fell outside the allowed area.
    OutOfRange,
    /// The task no longer exists or the reference was invalid.
    InvalidOrNotFound,
    /// None of the known phrases matched.
    Ambiguous,
}

impl Outcome {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NeedsSecret => "needs secret",
            Self::AlreadyDone => "already done",
            Self::Success => "success",
            Self::NotOpenOrClosed => "not open or closed",
            Self::OutOfRange => "out of range",
            Self::InvalidOrNotFound => "invalid or not found",
            Self::Ambiguous => "ambiguous",
        }
    }
}

/// Ordered first-match-wins rule table. Earlier rows shadow later ones.
const RULES: &[(Outcome, &[&str])] = &[
    (
        Outcome::NeedsSecret,
        &["secret", "password", "passcode", "access code required"],
    ),
    (
        Outcome::AlreadyDone,
        &["already checked in", "already completed", "already done", "duplicate check-in"],
    ),
    (
        Outcome::Success,
        &["check-in successful", "checked in successfully", "success", "recorded"],
    ),
    (
        Outcome::NotOpenOrClosed,
        &["not started", "not yet open", "has ended", "has closed", "window is closed"],
    ),
    (
        Outcome::OutOfRange,
        &["out of range", "outside the allowed area", "too far", "not within range"],
    ),
    (
        Outcome::InvalidOrNotFound,
        &["not found", "does not exist", "invalid task", "no longer available"],
    ),
];

/// Classify a raw response body.
#[must_use]
pub fn classify(response: &str) -> Outcome {
    let lowered = response.to_lowercase();
    for (outcome, phrases) in RULES {
        if phrases.iter().any(|p| lowered.contains(p)) {
            return *outcome;
        }
    }
    Outcome::Ambiguous
}
