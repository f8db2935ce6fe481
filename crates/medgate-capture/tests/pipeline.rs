//! End-to-end pipeline tests with scripted ports.
//!
//! A fake frame source, a scripted detector, and a scripted verification
//! port drive the controller through every recoverable and terminal path.
//! Time is paused, so the 100 ms tick cadence runs instantly and
//! deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use medgate_capture::camera::{CameraError, CameraSession, FrameSource};
use medgate_capture::controller::CaptureController;
use medgate_core::{
    CaptureMode, CaptureProfile, DetectionPort, DetectionResult, DetectorStatus, Frame,
    NormalizedRect, OutcomeDiagnostics, SubjectContext, VerificationError, VerificationOutcome,
    VerificationPort,
};

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Serves one synthetic frame forever and counts device releases.
struct StaticSource {
    released: Arc<AtomicUsize>,
}

impl FrameSource for StaticSource {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        Ok(Frame::new(64, 48, vec![90u8; 64 * 48 * 3]))
    }

    fn resolution(&self) -> (u32, u32) {
        (64, 48)
    }
}

impl Drop for StaticSource {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn camera() -> (CameraSession, Arc<AtomicUsize>) {
    let released = Arc::new(AtomicUsize::new(0));
    let mut session = CameraSession::new();
    session
        .attach(Box::new(StaticSource {
            released: Arc::clone(&released),
        }))
        .unwrap();
    (session, released)
}

/// Plays a fixed script of statuses, then repeats the final entry.
struct ScriptedDetector {
    script: VecDeque<DetectorStatus>,
    tail: DetectorStatus,
}

impl ScriptedDetector {
    fn new(script: Vec<DetectorStatus>, tail: DetectorStatus) -> Self {
        Self {
            script: script.into(),
            tail,
        }
    }
}

impl DetectionPort for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> DetectorStatus {
        self.script.pop_front().unwrap_or(self.tail)
    }
}

fn present() -> DetectorStatus {
    DetectorStatus::Ready(DetectionResult {
        is_present: true,
        bounding_box: Some(NormalizedRect::new(0.3, 0.3, 0.4, 0.4)),
    })
}

fn absent() -> DetectorStatus {
    DetectorStatus::Ready(DetectionResult {
        is_present: false,
        bounding_box: None,
    })
}

fn positive() -> VerificationOutcome {
    VerificationOutcome {
        verified: true,
        confidence: 0.94,
        message: "verified".to_string(),
        diagnostics: OutcomeDiagnostics {
            layer_results: vec![true, true],
            method: "embedding".to_string(),
        },
    }
}

fn negative(layers: Vec<bool>) -> VerificationOutcome {
    VerificationOutcome {
        verified: false,
        confidence: 0.3,
        message: "no match".to_string(),
        diagnostics: OutcomeDiagnostics {
            layer_results: layers,
            method: "embedding".to_string(),
        },
    }
}

type SubmitResult = Result<VerificationOutcome, VerificationError>;

/// Answers submissions from a script; counts them.
struct ScriptedVerifier {
    responses: Mutex<VecDeque<SubmitResult>>,
    submissions: AtomicUsize,
}

impl ScriptedVerifier {
    fn new(responses: Vec<SubmitResult>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            submissions: AtomicUsize::new(0),
        })
    }

    fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationPort for ScriptedVerifier {
    async fn submit(
        &self,
        image: &[u8],
        _context: &SubjectContext,
    ) -> Result<VerificationOutcome, VerificationError> {
        assert!(!image.is_empty(), "submitted capture must not be empty");
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Ok(positive()))
    }
}

/// Never answers inside the test window; proves late results are discarded.
struct StalledVerifier {
    submissions: AtomicUsize,
}

#[async_trait]
impl VerificationPort for StalledVerifier {
    async fn submit(
        &self,
        _image: &[u8],
        _context: &SubjectContext,
    ) -> Result<VerificationOutcome, VerificationError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(positive())
    }
}

fn context() -> SubjectContext {
    SubjectContext {
        subject_id: "med-42".to_string(),
        mode: CaptureMode::Verify,
    }
}

fn fast_profile(step: u8) -> CaptureProfile {
    CaptureProfile {
        step_size: step,
        target_resolution: 32,
        ..CaptureProfile::verify()
    }
}

const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

async fn wait_for_state(
    snapshots: &mut tokio::sync::watch::Receiver<medgate_core::SessionSnapshot>,
    state: &str,
) {
    loop {
        // borrow_and_update marks the version seen, so a later changed()
        // never re-delivers a snapshot this helper already inspected.
        if snapshots.borrow_and_update().state == state {
            return;
        }
        snapshots.changed().await.expect("controller alive");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn gated_capture_verifies_and_closes_cleanly() {
    let (camera, released) = camera();
    let verifier = ScriptedVerifier::new(vec![Ok(positive())]);
    // Warmup (skip-not-reset), then sustained presence to lock-on.
    let detector = ScriptedDetector::new(vec![DetectorStatus::NotReady; 3], present());
    let (controller, handle) = CaptureController::new(
        camera,
        Box::new(detector),
        Arc::clone(&verifier) as Arc<dyn VerificationPort>,
        fast_profile(4),
        context(),
        REMOTE_TIMEOUT,
    );

    let session = tokio::spawn(controller.run());
    let mut snapshots = handle.snapshots();
    wait_for_state(&mut snapshots, "Verified").await;
    {
        let snapshot = snapshots.borrow();
        let outcome = snapshot.outcome.as_ref().expect("outcome on snapshot");
        assert!(outcome.verified);
    }

    handle.cancel().await;
    let report = session.await.unwrap();
    assert!(report.outcome.is_some());
    assert_eq!(verifier.submissions(), 1);
    assert_eq!(released.load(Ordering::SeqCst), 1, "camera released exactly once");
}

#[tokio::test(start_paused = true)]
async fn transport_failure_recovers_via_retry() {
    let (camera, released) = camera();
    let verifier = ScriptedVerifier::new(vec![
        Err(VerificationError::Transport("connection refused".to_string())),
        Ok(positive()),
    ]);
    let detector = ScriptedDetector::new(Vec::new(), present());
    let (controller, handle) = CaptureController::new(
        camera,
        Box::new(detector),
        Arc::clone(&verifier) as Arc<dyn VerificationPort>,
        fast_profile(20),
        context(),
        REMOTE_TIMEOUT,
    );

    let session = tokio::spawn(controller.run());
    let mut snapshots = handle.snapshots();

    wait_for_state(&mut snapshots, "Failed").await;
    {
        let snapshot = snapshots.borrow();
        assert_eq!(snapshot.failure, Some(medgate_core::FailureKind::Transport));
        assert_eq!(snapshot.progress, 0, "no stale progress in failure state");
        assert!(snapshot.message.is_some());
    }

    handle.retry().await;
    wait_for_state(&mut snapshots, "Verified").await;

    handle.cancel().await;
    let report = session.await.unwrap();
    assert!(report.outcome.is_some());
    assert_eq!(verifier.submissions(), 2, "retry resubmits a fresh capture");
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn rejection_and_partial_match_are_distinguished() {
    let (camera, _released) = camera();
    let verifier = ScriptedVerifier::new(vec![
        Ok(negative(vec![false, false])),
        Ok(negative(vec![true, false])),
    ]);
    let detector = ScriptedDetector::new(Vec::new(), present());
    let (controller, handle) = CaptureController::new(
        camera,
        Box::new(detector),
        Arc::clone(&verifier) as Arc<dyn VerificationPort>,
        fast_profile(25),
        context(),
        REMOTE_TIMEOUT,
    );

    let session = tokio::spawn(controller.run());
    let mut snapshots = handle.snapshots();

    wait_for_state(&mut snapshots, "Failed").await;
    assert_eq!(
        snapshots.borrow().failure,
        Some(medgate_core::FailureKind::Rejected)
    );

    handle.retry().await;
    // The second Failed state must be reached (watch may coalesce repeats of
    // the same state name, but the failure kind changes with it).
    loop {
        snapshots.changed().await.expect("controller alive");
        let snapshot = snapshots.borrow_and_update().clone();
        if snapshot.state == "Failed" {
            assert_eq!(
                snapshot.failure,
                Some(medgate_core::FailureKind::PartialMatch)
            );
            break;
        }
    }

    handle.cancel().await;
    let report = session.await.unwrap();
    assert!(report.outcome.is_none(), "no attempt verified");
    assert_eq!(verifier.submissions(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_scan_submits_nothing() {
    let (camera, released) = camera();
    let verifier = ScriptedVerifier::new(Vec::new());
    let detector = ScriptedDetector::new(Vec::new(), absent());
    let (controller, handle) = CaptureController::new(
        camera,
        Box::new(detector),
        Arc::clone(&verifier) as Arc<dyn VerificationPort>,
        fast_profile(4),
        context(),
        REMOTE_TIMEOUT,
    );

    let session = tokio::spawn(controller.run());
    let mut snapshots = handle.snapshots();
    wait_for_state(&mut snapshots, "Scanning").await;

    handle.cancel().await;
    let report = session.await.unwrap();
    assert!(report.outcome.is_none());
    assert_eq!(verifier.submissions(), 0);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn late_result_after_cancel_is_discarded() {
    let (camera, released) = camera();
    let verifier = Arc::new(StalledVerifier {
        submissions: AtomicUsize::new(0),
    });
    let detector = ScriptedDetector::new(Vec::new(), present());
    let (controller, handle) = CaptureController::new(
        camera,
        Box::new(detector),
        Arc::clone(&verifier) as Arc<dyn VerificationPort>,
        fast_profile(100),
        context(),
        // Generous deadline: the cancel must win, not the timeout.
        Duration::from_secs(7200),
    );

    let session = tokio::spawn(controller.run());
    let mut snapshots = handle.snapshots();
    wait_for_state(&mut snapshots, "AwaitingResult").await;
    assert_eq!(verifier.submissions.load(Ordering::SeqCst), 1);

    handle.cancel().await;
    let report = session.await.unwrap();

    // The in-flight submission never mutated the torn-down session.
    assert!(report.outcome.is_none());
    assert_eq!(snapshots.borrow().state, "Closed");
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_timeout_is_a_recoverable_failure() {
    let (camera, _released) = camera();
    let verifier = Arc::new(StalledVerifier {
        submissions: AtomicUsize::new(0),
    });
    let detector = ScriptedDetector::new(Vec::new(), present());
    let (controller, handle) = CaptureController::new(
        camera,
        Box::new(detector),
        Arc::clone(&verifier) as Arc<dyn VerificationPort>,
        fast_profile(50),
        context(),
        Duration::from_secs(30),
    );

    let session = tokio::spawn(controller.run());
    let mut snapshots = handle.snapshots();
    wait_for_state(&mut snapshots, "Failed").await;
    {
        let snapshot = snapshots.borrow();
        assert_eq!(snapshot.failure, Some(medgate_core::FailureKind::Transport));
        let message = snapshot.message.clone().unwrap_or_default();
        assert!(message.contains("timed out"), "got message: {message}");
    }

    handle.cancel().await;
    session.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn manual_capture_bypasses_the_gate() {
    let (camera, _released) = camera();
    let verifier = ScriptedVerifier::new(vec![Ok(positive())]);
    // Presence never holds, so the gate alone would scan forever.
    let detector = ScriptedDetector::new(Vec::new(), absent());
    let (controller, handle) = CaptureController::new(
        camera,
        Box::new(detector),
        Arc::clone(&verifier) as Arc<dyn VerificationPort>,
        fast_profile(4),
        context(),
        REMOTE_TIMEOUT,
    );

    let session = tokio::spawn(controller.run());
    let mut snapshots = handle.snapshots();
    wait_for_state(&mut snapshots, "Scanning").await;

    // No bounding box was ever seen: this is an un-cropped full-frame
    // capture, and it must still submit and verify.
    handle.manual_capture().await;
    wait_for_state(&mut snapshots, "Verified").await;

    handle.cancel().await;
    let report = session.await.unwrap();
    assert!(report.outcome.is_some());
    assert_eq!(verifier.submissions(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_tears_the_session_down() {
    let (camera, released) = camera();
    let verifier = ScriptedVerifier::new(Vec::new());
    let detector = ScriptedDetector::new(Vec::new(), absent());
    let (controller, handle) = CaptureController::new(
        camera,
        Box::new(detector),
        Arc::clone(&verifier) as Arc<dyn VerificationPort>,
        fast_profile(4),
        context(),
        REMOTE_TIMEOUT,
    );

    let session = tokio::spawn(controller.run());
    drop(handle);

    let report = session.await.unwrap();
    assert!(report.outcome.is_none());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn scan_deadline_closes_an_idle_session() {
    let (camera, released) = camera();
    let verifier = ScriptedVerifier::new(Vec::new());
    let detector = ScriptedDetector::new(Vec::new(), absent());
    let profile = CaptureProfile {
        scan_timeout_secs: Some(5),
        ..fast_profile(4)
    };
    let (controller, handle) = CaptureController::new(
        camera,
        Box::new(detector),
        Arc::clone(&verifier) as Arc<dyn VerificationPort>,
        profile,
        context(),
        REMOTE_TIMEOUT,
    );

    let session = tokio::spawn(controller.run());
    let report = session.await.unwrap();

    assert!(report.outcome.is_none());
    assert_eq!(verifier.submissions(), 0);
    assert_eq!(released.load(Ordering::SeqCst), 1);
    drop(handle);
}
