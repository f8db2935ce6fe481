//! The capture controller task.
//!
//! One controller owns one capture session end to end: the camera, the
//! detector, the gate scheduler, and the state machine. It is a single
//! cooperative task; the only work it spawns is the one-shot remote
//! submission, and a submission that completes after teardown is discarded
//! rather than applied to a torn-down session.
//!
//! The embedding application talks to a running controller through a
//! [`CaptureHandle`]: commands in (manual capture, retry, cancel),
//! state snapshots out over a watch channel. Dropping the handle tears the
//! session down the same way an explicit cancel does.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use medgate_core::{
    Action, CaptureEvent, CaptureProfile, CaptureState, CropSpec, DetectionPort, FailureKind,
    Frame, SessionSnapshot, SubjectContext, VerificationError, VerificationOutcome,
    VerificationPort, crop_to_jpeg, transition,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::camera::CameraSession;
use crate::scheduler::GateScheduler;

type SubmitResult = Result<VerificationOutcome, VerificationError>;

/// Commands accepted by a running controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    /// Capture now, bypassing the gate (possibly un-cropped).
    ManualCapture,
    /// Re-arm the gate after a result.
    Retry,
    /// Tear the session down.
    Cancel,
}

/// Client side of a running capture session.
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    commands: mpsc::Sender<CaptureCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl CaptureHandle {
    /// Requests an immediate capture, bypassing the gate.
    ///
    /// Returns `false` if the session is already gone.
    pub async fn manual_capture(&self) -> bool {
        self.commands
            .send(CaptureCommand::ManualCapture)
            .await
            .is_ok()
    }

    /// Requests a retry after a failed (or completed) attempt.
    pub async fn retry(&self) -> bool {
        self.commands.send(CaptureCommand::Retry).await.is_ok()
    }

    /// Requests session teardown.
    pub async fn cancel(&self) -> bool {
        self.commands.send(CaptureCommand::Cancel).await.is_ok()
    }

    /// A fresh receiver for session snapshots.
    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}

/// Final report of a finished session.
#[derive(Debug, Clone)]
pub struct CaptureReport {
    /// Session identifier.
    pub session_id: String,
    /// The last positive outcome, if any attempt verified.
    pub outcome: Option<VerificationOutcome>,
}

/// Owns and drives one capture session.
pub struct CaptureController {
    session_id: String,
    started_at: DateTime<Utc>,
    profile: CaptureProfile,
    context: SubjectContext,
    camera: CameraSession,
    detector: Box<dyn DetectionPort>,
    verifier: Arc<dyn VerificationPort>,
    remote_timeout: Duration,
    scheduler: GateScheduler,
    state: CaptureState,
    last_frame: Option<Frame>,
    encoded: Option<Vec<u8>>,
    pending: Option<oneshot::Receiver<SubmitResult>>,
    scan_deadline: Option<tokio::time::Instant>,
    commands: mpsc::Receiver<CaptureCommand>,
    snapshots: watch::Sender<SessionSnapshot>,
    last_outcome: Option<VerificationOutcome>,
}

enum Wake {
    Tick,
    Command(Option<CaptureCommand>),
    Submission(SubmitResult),
    ScanDeadline,
}

impl CaptureController {
    /// Builds a controller around an already-acquired camera.
    ///
    /// Camera acquisition happens before the controller exists so that an
    /// acquisition error is reported exactly once, by the caller; there is
    /// no in-session retry for it.
    #[must_use]
    pub fn new(
        camera: CameraSession,
        detector: Box<dyn DetectionPort>,
        verifier: Arc<dyn VerificationPort>,
        profile: CaptureProfile,
        context: SubjectContext,
        remote_timeout: Duration,
    ) -> (Self, CaptureHandle) {
        let session_id = format!("CAP-{}", uuid::Uuid::new_v4());
        let started_at = Utc::now();
        let (command_tx, command_rx) = mpsc::channel(16);
        let initial = SessionSnapshot::of(&session_id, started_at, &CaptureState::Idle);
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let scheduler = GateScheduler::new(profile.tick_interval(), profile.step_size);
        let controller = Self {
            session_id,
            started_at,
            profile,
            context,
            camera,
            detector,
            verifier,
            remote_timeout,
            scheduler,
            state: CaptureState::Idle,
            last_frame: None,
            encoded: None,
            pending: None,
            scan_deadline: None,
            commands: command_rx,
            snapshots: snapshot_tx,
            last_outcome: None,
        };
        let handle = CaptureHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (controller, handle)
    }

    /// Runs the session to completion.
    ///
    /// Returns when the session reaches `Closed` (explicit cancel, handle
    /// drop, or scan deadline). The camera is released exactly once on every
    /// exit path.
    pub async fn run(mut self) -> CaptureReport {
        info!(
            session_id = %self.session_id,
            subject_id = %self.context.subject_id,
            mode = %self.context.mode,
            "capture session started"
        );

        if self.camera.is_open() {
            self.dispatch(CaptureEvent::CameraReady);
        } else {
            warn!(session_id = %self.session_id, "camera not open; closing session");
            self.dispatch(CaptureEvent::Cancel);
        }

        while !self.state.is_closed() {
            let wake = {
                let has_pending = self.pending.is_some();
                let scheduler = &mut self.scheduler;
                let commands = &mut self.commands;
                let pending = &mut self.pending;
                let deadline = self.scan_deadline;
                tokio::select! {
                    () = scheduler.tick() => Wake::Tick,
                    command = commands.recv() => Wake::Command(command),
                    result = await_submission(pending), if has_pending => {
                        Wake::Submission(result)
                    }
                    () = tokio::time::sleep_until(
                        deadline.unwrap_or_else(tokio::time::Instant::now),
                    ), if deadline.is_some() => Wake::ScanDeadline,
                }
            };
            match wake {
                Wake::Tick => self.handle_tick(),
                Wake::Command(Some(command)) => self.handle_command(command),
                Wake::Command(None) => {
                    debug!(session_id = %self.session_id, "handle dropped; tearing down");
                    self.dispatch(CaptureEvent::Cancel);
                }
                Wake::Submission(result) => {
                    self.pending = None;
                    let event = match result {
                        Ok(outcome) => CaptureEvent::OutcomeReceived(outcome),
                        Err(error) => CaptureEvent::SubmitFailed {
                            kind: FailureKind::Transport,
                            message: error.to_string(),
                        },
                    };
                    self.dispatch(event);
                }
                Wake::ScanDeadline => {
                    warn!(session_id = %self.session_id, "scan deadline elapsed; closing session");
                    self.dispatch(CaptureEvent::Cancel);
                }
            }
        }

        info!(
            session_id = %self.session_id,
            verified = self.last_outcome.is_some(),
            "capture session finished"
        );
        CaptureReport {
            session_id: self.session_id.clone(),
            outcome: self.last_outcome.take(),
        }
    }

    /// Grabs a frame, runs detection, and feeds the gate.
    fn handle_tick(&mut self) {
        let frame = match self.camera.grab() {
            Ok(frame) => frame,
            Err(error) => {
                // A transient grab failure skips the tick; progress holds.
                warn!(error = %error, "frame grab failed; skipping tick");
                return;
            }
        };
        let status = self.detector.detect(&frame);
        self.last_frame = Some(frame);
        if let Some(event) = self.scheduler.observe(&status) {
            self.dispatch(event);
        }
    }

    fn handle_command(&mut self, command: CaptureCommand) {
        match command {
            CaptureCommand::ManualCapture => {
                let bbox = self.scheduler.last_bbox();
                self.dispatch(CaptureEvent::ManualCapture { bbox });
            }
            CaptureCommand::Retry => self.dispatch(CaptureEvent::Retry),
            CaptureCommand::Cancel => self.dispatch(CaptureEvent::Cancel),
        }
    }

    /// Feeds an event (and any follow-on events) through the machine,
    /// executing the returned actions in order.
    fn dispatch(&mut self, event: CaptureEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let event_name = event.name();
            match transition(&self.state, event) {
                Ok((next, actions)) => {
                    debug!(
                        from = self.state.name(),
                        to = next.name(),
                        event = event_name,
                        "transition"
                    );
                    if let CaptureState::Verified { outcome } = &next {
                        self.last_outcome = Some(outcome.clone());
                    }
                    self.state = next;
                    if !matches!(self.state, CaptureState::AwaitingResult) {
                        // Leaving AwaitingResult by any path drops the
                        // in-flight submission; a late result must not
                        // mutate this session.
                        self.pending = None;
                    }
                    for action in actions {
                        self.execute(action, &mut queue);
                    }
                    self.publish();
                }
                Err(error) => {
                    // External inputs can race state changes (a command
                    // arriving after a result); that is noise, not a crash.
                    warn!(state = self.state.name(), error = %error, "event ignored");
                }
            }
        }
    }

    fn execute(&mut self, action: Action, queue: &mut VecDeque<CaptureEvent>) {
        match action {
            Action::StartTicking => {
                self.scheduler.arm();
                self.scan_deadline = self
                    .profile
                    .scan_timeout()
                    .map(|timeout| tokio::time::Instant::now() + timeout);
            }
            Action::StopTicking => {
                self.scheduler.disarm();
                self.scan_deadline = None;
            }
            Action::Encode { bbox } => {
                let spec = CropSpec {
                    source_bbox: bbox,
                    padding_ratio: self.profile.padding_ratio,
                    target: self.profile.target_resolution,
                    jpeg_quality: self.profile.jpeg_quality,
                };
                let result = match self.last_frame.as_ref() {
                    Some(frame) => crop_to_jpeg(frame, &spec).map_err(|e| e.to_string()),
                    None => Err("no frame available for capture".to_string()),
                };
                match result {
                    Ok(bytes) => {
                        debug!(bytes = bytes.len(), cropped = bbox.is_some(), "capture encoded");
                        self.encoded = Some(bytes);
                        queue.push_back(CaptureEvent::CaptureEncoded);
                    }
                    Err(message) => {
                        warn!(error = %message, "capture encoding failed");
                        queue.push_back(CaptureEvent::CaptureFailed { message });
                    }
                }
            }
            Action::Submit => self.spawn_submission(queue),
            Action::ReleaseCamera => self.camera.close(),
        }
    }

    fn spawn_submission(&mut self, queue: &mut VecDeque<CaptureEvent>) {
        let Some(image) = self.encoded.take() else {
            queue.push_back(CaptureEvent::SubmitFailed {
                kind: FailureKind::Capture,
                message: "no encoded capture to submit".to_string(),
            });
            return;
        };
        let verifier = Arc::clone(&self.verifier);
        let context = self.context.clone();
        let timeout = self.remote_timeout;
        let (result_tx, result_rx) = oneshot::channel();
        self.pending = Some(result_rx);
        info!(
            bytes = image.len(),
            mode = %context.mode,
            subject_id = %context.subject_id,
            "submitting capture"
        );
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, verifier.submit(&image, &context))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(VerificationError::Timeout {
                    secs: timeout.as_secs(),
                }),
            };
            // Receiver gone means the session moved on; the result is
            // deliberately discarded.
            let _ = result_tx.send(result);
        });
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot::of(&self.session_id, self.started_at, &self.state);
        let _ = self.snapshots.send(snapshot);
    }
}

/// Awaits the in-flight submission; pends forever when there is none.
async fn await_submission(pending: &mut Option<oneshot::Receiver<SubmitResult>>) -> SubmitResult {
    match pending.as_mut() {
        Some(receiver) => match receiver.await {
            Ok(result) => result,
            Err(_) => Err(VerificationError::Transport(
                "verification task dropped".to_string(),
            )),
        },
        None => std::future::pending().await,
    }
}
