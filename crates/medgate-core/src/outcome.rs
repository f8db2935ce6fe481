//! Remote verification outcomes and failure classification.

use serde::{Deserialize, Serialize};

/// Diagnostic detail returned alongside a verification judgment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeDiagnostics {
    /// Per-layer match flags from the remote model, in model order.
    #[serde(default)]
    pub layer_results: Vec<bool>,
    /// The matching method the service applied.
    #[serde(default)]
    pub method: String,
}

/// The remote service's structured judgment on one captured image.
///
/// Created per remote call, drives the terminal UI state, and is discarded
/// on retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// Whether the capture matched (or, for enrollment, was accepted).
    pub verified: bool,
    /// Service confidence in `[0, 1]`. Enrollment responses may omit it.
    #[serde(default)]
    pub confidence: f32,
    /// Human-readable message from the service.
    #[serde(default)]
    pub message: String,
    /// Diagnostic detail.
    #[serde(default)]
    pub diagnostics: OutcomeDiagnostics,
}

impl VerificationOutcome {
    /// Classifies a negative outcome.
    ///
    /// A rejection where some model layers still matched is reported as a
    /// partial match so the caller can offer different follow-up guidance.
    /// Returns `None` for positive outcomes.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.verified {
            return None;
        }
        if self.diagnostics.layer_results.iter().any(|&flag| flag) {
            Some(FailureKind::PartialMatch)
        } else {
            Some(FailureKind::Rejected)
        }
    }
}

/// Why a capture attempt ended in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The service answered and the capture did not match.
    Rejected,
    /// The service answered with an ambiguous, partial match.
    PartialMatch,
    /// The remote call itself failed (network, timeout, service error).
    Transport,
    /// Local capture encoding failed before anything was submitted.
    Capture,
}

impl FailureKind {
    /// Short follow-up guidance for the user.
    #[must_use]
    pub const fn guidance(&self) -> &'static str {
        match self {
            Self::Rejected => "this does not look like the expected container; check the medication and try again",
            Self::PartialMatch => "partial match; hold the container closer and steadier, then try again",
            Self::Transport => "could not reach the verification service; check the connection and try again",
            Self::Capture => "capture failed; try again",
        }
    }

    /// Stable label for logs and snapshots.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::PartialMatch => "partial-match",
            Self::Transport => "transport",
            Self::Capture => "capture",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
