//! Armed/disarmed gate tick loop.
//!
//! The scheduler owns the fixed-period timer and the lock-on gate. It is
//! armed exactly while the state machine is in `Scanning` and disarmed the
//! moment it leaves; an active timer outliving its state is a defect, so
//! disarming drops the interval outright.

use std::time::Duration;

use medgate_core::{CaptureEvent, DetectorStatus, GateTick, LockOnGate, NormalizedRect};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

/// Drives the lock-on gate on a fixed period.
pub struct GateScheduler {
    period: Duration,
    step: u8,
    gate: LockOnGate,
    ticker: Option<Interval>,
    last_bbox: Option<NormalizedRect>,
}

impl GateScheduler {
    /// Creates a disarmed scheduler.
    #[must_use]
    pub fn new(period: Duration, step: u8) -> Self {
        Self {
            period,
            step,
            gate: LockOnGate::new(step),
            ticker: None,
            last_bbox: None,
        }
    }

    /// Arms the loop for a fresh scanning episode.
    ///
    /// The gate re-arms from zero; a retry must never inherit progress from
    /// the failed attempt.
    pub fn arm(&mut self) {
        self.gate = LockOnGate::new(self.step);
        self.last_bbox = None;
        let mut ticker = tokio::time::interval(self.period);
        // Ticks must not bunch up after a stall.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        debug!(period_ms = self.period.as_millis() as u64, "gate armed");
    }

    /// Disarms the loop and drops the timer.
    pub fn disarm(&mut self) {
        if self.ticker.take().is_some() {
            debug!(progress = self.gate.progress(), "gate disarmed");
        }
    }

    /// Whether the tick loop is currently armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.ticker.is_some()
    }

    /// Waits for the next tick. Pends forever while disarmed, so it is safe
    /// to poll unconditionally inside `select!`.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Feeds one detector observation through the gate.
    ///
    /// Returns the state machine event the observation amounts to, or
    /// `None` when nothing changed (skip, idle reset, post-lock noise).
    pub fn observe(&mut self, status: &DetectorStatus) -> Option<CaptureEvent> {
        if let DetectorStatus::Ready(detection) = status {
            if detection.is_present {
                if let Some(bbox) = detection.bounding_box {
                    self.last_bbox = Some(bbox);
                }
            }
        }
        let before = self.gate.progress();
        match self.gate.observe(status) {
            GateTick::Skipped | GateTick::Saturated => None,
            // Only report a reset that actually cleared progress.
            GateTick::Reset => (before > 0).then_some(CaptureEvent::GateProgress(0)),
            GateTick::Advanced(progress) => Some(CaptureEvent::GateProgress(progress)),
            GateTick::LockAchieved => Some(CaptureEvent::GateLocked {
                bbox: self.last_bbox,
            }),
        }
    }

    /// Last bounding box seen this episode, for manual capture.
    #[must_use]
    pub const fn last_bbox(&self) -> Option<NormalizedRect> {
        self.last_bbox
    }

    /// Current gate progress.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        self.gate.progress()
    }
}

#[cfg(test)]
mod unit_tests {
    use medgate_core::DetectionResult;

    use super::*;

    fn present(bbox: Option<NormalizedRect>) -> DetectorStatus {
        DetectorStatus::Ready(DetectionResult {
            is_present: true,
            bounding_box: bbox,
        })
    }

    fn absent() -> DetectorStatus {
        DetectorStatus::Ready(DetectionResult {
            is_present: false,
            bounding_box: None,
        })
    }

    #[test]
    fn lock_event_carries_last_seen_bbox() {
        let mut scheduler = GateScheduler::new(Duration::from_millis(100), 50);
        let bbox = NormalizedRect::new(0.1, 0.1, 0.3, 0.3);
        // Second positive frame has no box; the gate remembers the first.
        assert!(matches!(
            scheduler.observe(&present(Some(bbox))),
            Some(CaptureEvent::GateProgress(50))
        ));
        match scheduler.observe(&present(None)) {
            Some(CaptureEvent::GateLocked { bbox: Some(b) }) => assert_eq!(b, bbox),
            other => panic!("expected lock with bbox, got {other:?}"),
        }
    }

    #[test]
    fn idle_resets_are_suppressed() {
        let mut scheduler = GateScheduler::new(Duration::from_millis(100), 10);
        assert_eq!(scheduler.observe(&absent()), None);
        scheduler.observe(&present(None));
        assert_eq!(
            scheduler.observe(&absent()),
            Some(CaptureEvent::GateProgress(0))
        );
        assert_eq!(scheduler.observe(&absent()), None);
    }

    #[test]
    fn rearm_clears_progress_and_bbox() {
        let mut scheduler = GateScheduler::new(Duration::from_millis(100), 10);
        let bbox = NormalizedRect::new(0.1, 0.1, 0.3, 0.3);
        scheduler.observe(&present(Some(bbox)));
        assert_eq!(scheduler.progress(), 10);

        // arm() needs a runtime because it builds a tokio interval.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = runtime.enter();
        scheduler.arm();
        assert!(scheduler.is_armed());
        assert_eq!(scheduler.progress(), 0);
        assert_eq!(scheduler.last_bbox(), None);

        scheduler.disarm();
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn skipped_and_saturated_produce_no_events() {
        let mut scheduler = GateScheduler::new(Duration::from_millis(100), 100);
        assert_eq!(scheduler.observe(&DetectorStatus::NotReady), None);
        assert!(matches!(
            scheduler.observe(&present(None)),
            Some(CaptureEvent::GateLocked { .. })
        ));
        assert_eq!(scheduler.observe(&present(None)), None);
    }
}
