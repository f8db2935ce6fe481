//! Heuristic stand-in detector.
//!
//! The real detector is an externally-owned model behind
//! [`DetectionPort`]; this stand-in keeps the pipeline drivable from the
//! CLI and from smoke tests when no model is wired in. It reports
//! `NotReady` for a configurable warmup (exercising the skip-not-reset
//! path) and then a fixed centered detection.

use medgate_core::{DetectionPort, DetectionResult, DetectorStatus, Frame, NormalizedRect};

/// Always-present detector with a model-warmup phase.
#[derive(Debug, Clone)]
pub struct HeuristicDetector {
    warmup_ticks: u32,
    seen: u32,
}

impl HeuristicDetector {
    /// Creates a detector that reports `NotReady` for `warmup_ticks` frames.
    #[must_use]
    pub const fn new(warmup_ticks: u32) -> Self {
        Self {
            warmup_ticks,
            seen: 0,
        }
    }
}

impl Default for HeuristicDetector {
    fn default() -> Self {
        Self::new(5)
    }
}

impl DetectionPort for HeuristicDetector {
    fn detect(&mut self, _frame: &Frame) -> DetectorStatus {
        if self.seen < self.warmup_ticks {
            self.seen += 1;
            return DetectorStatus::NotReady;
        }
        DetectorStatus::Ready(DetectionResult {
            is_present: true,
            bounding_box: Some(NormalizedRect::new(0.25, 0.25, 0.5, 0.5)),
        })
    }
}
