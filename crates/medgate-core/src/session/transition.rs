//! The pure transition function.

use crate::geometry::NormalizedRect;
use crate::outcome::{FailureKind, VerificationOutcome};

use super::error::TransitionError;
use super::state::CaptureState;

/// Events consumed by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Camera acquisition succeeded; the session may start scanning.
    CameraReady,
    /// The gate advanced (or reset) to the contained progress.
    GateProgress(u8),
    /// The gate reached full progress.
    GateLocked {
        /// Last known bounding box for crop computation.
        bbox: Option<NormalizedRect>,
    },
    /// Explicit user-triggered capture, bypassing the gate.
    ManualCapture {
        /// Last known bounding box; `None` yields a full-frame capture.
        bbox: Option<NormalizedRect>,
    },
    /// The capture was rasterized and is ready to submit.
    CaptureEncoded,
    /// Local rasterization failed before submission.
    CaptureFailed {
        /// Encoder error text.
        message: String,
    },
    /// The remote service answered.
    OutcomeReceived(VerificationOutcome),
    /// The remote call failed without a service answer.
    SubmitFailed {
        /// Failure classification (transport or timeout).
        kind: FailureKind,
        /// Transport error text.
        message: String,
    },
    /// Explicit user retry; re-arms the gate.
    Retry,
    /// Explicit user cancel or session teardown.
    Cancel,
}

impl CaptureEvent {
    /// Stable event name for logs and error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CameraReady => "CameraReady",
            Self::GateProgress(_) => "GateProgress",
            Self::GateLocked { .. } => "GateLocked",
            Self::ManualCapture { .. } => "ManualCapture",
            Self::CaptureEncoded => "CaptureEncoded",
            Self::CaptureFailed { .. } => "CaptureFailed",
            Self::OutcomeReceived(_) => "OutcomeReceived",
            Self::SubmitFailed { .. } => "SubmitFailed",
            Self::Retry => "Retry",
            Self::Cancel => "Cancel",
        }
    }
}

/// Side effects the controller executes on transition.
///
/// The machine never performs effects itself; it names them, and the
/// controller runs them in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Arm the gate scheduler's tick loop.
    StartTicking,
    /// Disarm the tick loop. A timer outliving its state is a defect.
    StopTicking,
    /// Rasterize the last frame with the given bounding box.
    Encode {
        /// Bounding box for crop computation; `None` is full-frame.
        bbox: Option<NormalizedRect>,
    },
    /// Submit the encoded capture to the verification port.
    Submit,
    /// Release the camera handle. Runs exactly once per session.
    ReleaseCamera,
}

/// Applies `event` to `state`, returning the next state and its effects.
///
/// Pure: no I/O, no clocks, no channels. The controller owns execution.
///
/// # Errors
///
/// Returns [`TransitionError::InvalidTransition`] for any state/event pair
/// not listed in the module-level transition table.
pub fn transition(
    state: &CaptureState,
    event: CaptureEvent,
) -> Result<(CaptureState, Vec<Action>), TransitionError> {
    use CaptureState as S;

    match (state, event) {
        (S::Idle, CaptureEvent::CameraReady) => Ok((
            S::Scanning { progress: 0 },
            vec![Action::StartTicking],
        )),

        (S::Scanning { .. }, CaptureEvent::GateProgress(progress)) => {
            Ok((S::Scanning { progress }, Vec::new()))
        }

        (S::Scanning { .. }, CaptureEvent::GateLocked { bbox })
        | (S::Scanning { .. }, CaptureEvent::ManualCapture { bbox }) => Ok((
            S::Capturing,
            vec![Action::StopTicking, Action::Encode { bbox }],
        )),

        (S::Capturing, CaptureEvent::CaptureEncoded) => {
            Ok((S::AwaitingResult, vec![Action::Submit]))
        }

        (S::Capturing, CaptureEvent::CaptureFailed { message }) => Ok((
            S::Failed {
                kind: FailureKind::Capture,
                message,
            },
            Vec::new(),
        )),

        (S::AwaitingResult, CaptureEvent::OutcomeReceived(outcome)) => {
            let next = match outcome.failure_kind() {
                None => S::Verified { outcome },
                Some(kind) => S::Failed {
                    kind,
                    message: outcome.message,
                },
            };
            Ok((next, Vec::new()))
        }

        (S::AwaitingResult, CaptureEvent::SubmitFailed { kind, message }) => {
            Ok((S::Failed { kind, message }, Vec::new()))
        }

        // Retry re-arms the gate with progress and error text cleared; from
        // Verified it is the explicit "continue" path.
        (S::Failed { .. } | S::Verified { .. }, CaptureEvent::Retry) => Ok((
            S::Scanning { progress: 0 },
            vec![Action::StartTicking],
        )),

        // Cancel is legal from every state. Closing an already-closed
        // session is a no-op, and the camera release runs exactly once.
        (S::Closed, CaptureEvent::Cancel) => Ok((S::Closed, Vec::new())),
        (_, CaptureEvent::Cancel) => Ok((
            S::Closed,
            vec![Action::StopTicking, Action::ReleaseCamera],
        )),

        (state, event) => Err(TransitionError::InvalidTransition {
            from: state.name(),
            event: event.name(),
        }),
    }
}
