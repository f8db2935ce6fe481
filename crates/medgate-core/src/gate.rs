//! Lock-on presence gate.
//!
//! The gate rewards sustained positive detections and punishes any
//! single-frame dropout: progress accumulates by a fixed step while presence
//! holds and hard-resets to zero the instant it does not. A detector that is
//! still loading its model reports [`DetectorStatus::NotReady`], which skips
//! the tick without resetting accumulated progress.
//!
//! The gate is a pure accumulator. Tick cadence belongs to the scheduler in
//! `medgate-capture`; single-shot capture dispatch is guaranteed here by
//! returning [`GateTick::LockAchieved`] exactly once per scanning episode.

use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedRect;

/// Full lock-on progress, in percent.
pub const FULL_PROGRESS: u8 = 100;

/// One detector observation for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Whether a qualifying hand/object is present in the frame.
    pub is_present: bool,
    /// Normalized bounding box of the detection, when one is available.
    pub bounding_box: Option<NormalizedRect>,
}

/// Detector boundary status for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorStatus {
    /// The detector model is still initializing; skip the tick, keep progress.
    NotReady,
    /// The detector classified the frame.
    Ready(DetectionResult),
}

/// Outcome of feeding one observation to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTick {
    /// Detector not ready; nothing changed.
    Skipped,
    /// Presence lost; progress reset to zero.
    Reset,
    /// Presence held; progress advanced to the contained value.
    Advanced(u8),
    /// Progress crossed full; emitted exactly once per episode.
    LockAchieved,
    /// The gate is already locked; observations are ignored.
    Saturated,
}

/// Accumulates lock-on progress across detection ticks.
#[derive(Debug, Clone)]
pub struct LockOnGate {
    step: u8,
    progress: u8,
    locked: bool,
}

impl LockOnGate {
    /// Creates a gate advancing `step` percent per positive tick.
    ///
    /// A zero step is coerced to 1 so the gate always makes progress.
    #[must_use]
    pub fn new(step: u8) -> Self {
        Self {
            step: step.max(1),
            progress: 0,
            locked: false,
        }
    }

    /// Current progress in `[0, 100]`.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        self.progress
    }

    /// Whether the gate has reached full progress this episode.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Re-arms the gate for a fresh scanning episode.
    pub fn reset(&mut self) {
        self.progress = 0;
        self.locked = false;
    }

    /// Feeds one detector observation to the gate.
    pub fn observe(&mut self, status: &DetectorStatus) -> GateTick {
        if self.locked {
            return GateTick::Saturated;
        }
        match status {
            DetectorStatus::NotReady => GateTick::Skipped,
            DetectorStatus::Ready(detection) if detection.is_present => {
                self.progress = self.progress.saturating_add(self.step).min(FULL_PROGRESS);
                if self.progress >= FULL_PROGRESS {
                    self.locked = true;
                    GateTick::LockAchieved
                } else {
                    GateTick::Advanced(self.progress)
                }
            }
            DetectorStatus::Ready(_) => {
                self.progress = 0;
                GateTick::Reset
            }
        }
    }
}
