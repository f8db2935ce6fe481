//! Boundary traits for the detector and the remote verification service.
//!
//! The pipeline never sees inside either collaborator: the detector is an
//! opaque per-frame classifier and the verification service is an opaque
//! remote judgment. Both are injected, so tests drive the pipeline with
//! scripted fakes and production wires in a model-backed detector plus the
//! HTTP adapter from `medgate-capture`.

use async_trait::async_trait;
use thiserror::Error;

use crate::frame::Frame;
use crate::gate::DetectorStatus;
use crate::outcome::VerificationOutcome;

/// Which remote pipeline variant a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Confirm a capture against an already-trained fingerprint.
    Verify,
    /// Train the fingerprint with a fresh capture.
    Enroll,
}

impl CaptureMode {
    /// Stable label for logs and snapshots.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Enroll => "enroll",
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject-scoping context attached to every remote submission.
#[derive(Debug, Clone)]
pub struct SubjectContext {
    /// Opaque identifier of the medication container being verified/trained.
    pub subject_id: String,
    /// Pipeline variant.
    pub mode: CaptureMode,
}

/// Per-frame hand/object detector boundary.
///
/// Synchronous with respect to the polling tick: detection must complete
/// well inside the tick period. A loading model reports
/// [`DetectorStatus::NotReady`], which the gate treats as skip-not-reset.
pub trait DetectionPort: Send {
    /// Classifies one frame.
    fn detect(&mut self, frame: &Frame) -> DetectorStatus;
}

/// Errors from the remote verification boundary.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The request never produced a service answer.
    #[error("verification transport failed: {0}")]
    Transport(String),

    /// The request exceeded the configured deadline.
    #[error("verification timed out after {secs}s")]
    Timeout {
        /// The deadline that was exceeded.
        secs: u64,
    },

    /// The service answered with a non-success status.
    #[error("verification service error (status {status}): {message}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Service-provided error text, possibly empty.
        message: String,
    },
}

/// Remote verification/training boundary.
///
/// Implementations perform no retries: a retry must first re-arm the gate
/// rather than blindly resubmit the same image, so it is a state-machine
/// decision, not a transport one.
#[async_trait]
pub trait VerificationPort: Send + Sync {
    /// Submits one encoded capture for judgment.
    async fn submit(
        &self,
        image: &[u8],
        context: &SubjectContext,
    ) -> Result<VerificationOutcome, VerificationError>;
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn mode_labels() {
        assert_eq!(CaptureMode::Verify.to_string(), "verify");
        assert_eq!(CaptureMode::Enroll.to_string(), "enroll");
    }

    #[test]
    fn error_messages_are_user_presentable() {
        let err = VerificationError::Timeout { secs: 30 };
        assert_eq!(err.to_string(), "verification timed out after 30s");
        let err = VerificationError::Service {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("maintenance"));
    }
}
