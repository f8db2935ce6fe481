//! Capture session states and UI-facing snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::outcome::{FailureKind, VerificationOutcome};

/// Tagged-union state of one capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    /// Session created, camera not yet confirmed.
    Idle,
    /// Gate armed; detection ticks are accumulating progress.
    Scanning {
        /// Lock-on progress in `[0, 100]`.
        progress: u8,
    },
    /// Gate fired (or manual override); encoding the capture.
    Capturing,
    /// Capture submitted; waiting on the remote judgment.
    AwaitingResult,
    /// The service answered positively. Terminal unless the user continues.
    Verified {
        /// The positive judgment.
        outcome: VerificationOutcome,
    },
    /// The attempt failed; a retry re-arms the gate.
    Failed {
        /// Why the attempt failed.
        kind: FailureKind,
        /// User-facing message.
        message: String,
    },
    /// Session torn down; the camera has been released.
    Closed,
}

impl CaptureState {
    /// Stable state name for logs and error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Scanning { .. } => "Scanning",
            Self::Capturing => "Capturing",
            Self::AwaitingResult => "AwaitingResult",
            Self::Verified { .. } => "Verified",
            Self::Failed { .. } => "Failed",
            Self::Closed => "Closed",
        }
    }

    /// Current lock-on progress, zero outside `Scanning`.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        match self {
            Self::Scanning { progress } => *progress,
            _ => 0,
        }
    }

    /// Whether the session has been torn down.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Read-only session view published to the embedding application.
///
/// Snapshots are the whole UI surface of the pipeline: one is published on
/// every state change over a watch channel.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier (`CAP-<uuid>`).
    pub session_id: String,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Current state name.
    pub state: &'static str,
    /// Lock-on progress in `[0, 100]`.
    pub progress: u8,
    /// Failure classification, when in `Failed`.
    pub failure: Option<FailureKind>,
    /// User-facing message (service message or failure guidance).
    pub message: Option<String>,
    /// The positive outcome, when in `Verified`.
    pub outcome: Option<VerificationOutcome>,
}

impl SessionSnapshot {
    /// Builds the snapshot for `state`.
    #[must_use]
    pub fn of(session_id: &str, started_at: DateTime<Utc>, state: &CaptureState) -> Self {
        let (failure, message, outcome) = match state {
            CaptureState::Verified { outcome } => (
                None,
                Some(outcome.message.clone()).filter(|m| !m.is_empty()),
                Some(outcome.clone()),
            ),
            CaptureState::Failed { kind, message } => {
                let text = if message.is_empty() {
                    kind.guidance().to_string()
                } else {
                    message.clone()
                };
                (Some(*kind), Some(text), None)
            }
            _ => (None, None, None),
        };
        Self {
            session_id: session_id.to_string(),
            started_at,
            state: state.name(),
            progress: state.progress(),
            failure,
            message,
            outcome,
        }
    }
}
