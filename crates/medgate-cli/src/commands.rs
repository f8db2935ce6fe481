//! Capture session driver.
//!
//! Opens the camera, runs one controller, and relays its snapshots to the
//! terminal. Enter triggers a manual capture; Ctrl-C cancels. Failed
//! attempts are retried automatically up to the configured budget, then the
//! session is closed.

use std::sync::Arc;

use anyhow::{Context, Result};
use medgate_capture::camera::CameraSession;
use medgate_capture::controller::CaptureController;
use medgate_capture::detect::HeuristicDetector;
use medgate_capture::remote::HttpVerificationPort;
use medgate_core::{CaptureMode, MedgateConfig, SubjectContext, VerificationPort};
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

/// Runs one capture session to completion.
///
/// Returns `true` if an attempt verified (or enrolled) successfully.
pub async fn run_capture(
    config: &MedgateConfig,
    mode: CaptureMode,
    subject: String,
    retries: u32,
) -> Result<bool> {
    let profile = match mode {
        CaptureMode::Verify => config.verify,
        CaptureMode::Enroll => config.enroll,
    };
    profile.validate().context("capture profile")?;

    let verifier: Arc<dyn VerificationPort> = Arc::new(
        HttpVerificationPort::new(&config.endpoint).context("verification endpoint")?,
    );

    // Acquisition errors are reported once, here; there is no in-session
    // retry for a missing or denied camera.
    let mut camera = CameraSession::new();
    camera
        .open(&config.camera)
        .context("acquiring the camera")?;

    // The production detector is an externally-wired model; the bundled
    // heuristic stand-in keeps the harness usable without one.
    let detector = Box::new(HeuristicDetector::default());

    let context = SubjectContext {
        subject_id: subject,
        mode,
    };
    let (controller, handle) = CaptureController::new(
        camera,
        detector,
        verifier,
        profile,
        context,
        config.endpoint.request_timeout(),
    );

    let session = tokio::spawn(controller.run());
    let mut snapshots = handle.snapshots();
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut remaining_retries = retries;

    eprintln!("hold the medication container up to the camera (Enter = capture now, Ctrl-C = cancel)");

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                match snapshot.state {
                    "Scanning" => {
                        if snapshot.progress > 0 {
                            eprint!("\rlocking on... {:>3}%", snapshot.progress);
                        }
                    }
                    "AwaitingResult" => {
                        eprintln!("\ncaptured; waiting for the service...");
                    }
                    "Verified" => {
                        if let Some(outcome) = &snapshot.outcome {
                            info!(
                                confidence = outcome.confidence,
                                method = %outcome.diagnostics.method,
                                "capture accepted"
                            );
                            eprintln!("result: {}", outcome.message);
                        }
                        handle.cancel().await;
                    }
                    "Failed" => {
                        let message = snapshot.message.clone().unwrap_or_default();
                        warn!(
                            kind = ?snapshot.failure,
                            message = %message,
                            "capture attempt failed"
                        );
                        eprintln!("\nattempt failed: {message}");
                        if remaining_retries > 0 {
                            remaining_retries -= 1;
                            info!(remaining = remaining_retries, "retrying");
                            handle.retry().await;
                        } else {
                            handle.cancel().await;
                        }
                    }
                    _ => {}
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        info!("manual capture requested");
                        handle.manual_capture().await;
                    }
                    // EOF or a read error: stop polling stdin.
                    _ => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted; closing session");
                handle.cancel().await;
            }
        }
    }

    let report = session.await.context("capture session task")?;
    info!(session_id = %report.session_id, "session closed");
    Ok(report.outcome.is_some())
}
