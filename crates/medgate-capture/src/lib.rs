//! medgate-capture - Asynchronous capture runtime.
//!
//! This crate runs the pipeline that `medgate-core` specifies: it owns the
//! camera for the whole session, drives the fixed-period detection loop,
//! executes state machine actions, and talks to the remote
//! verification/training service over HTTP.
//!
//! # Runtime Requirements
//!
//! A tokio runtime with timers enabled. The controller is a single
//! cooperative task; the only spawned work is the one-shot remote
//! submission.
//!
//! # Modules
//!
//! - [`camera`]: camera session with a single-owner device handle
//! - [`controller`]: the capture controller task and its handle
//! - [`detect`]: a heuristic stand-in detector for harness use
//! - [`remote`]: `reqwest` adapter for the verification/enrollment endpoints
//! - [`scheduler`]: the armed/disarmed gate tick loop

pub mod camera;
pub mod controller;
pub mod detect;
pub mod remote;
pub mod scheduler;

pub use camera::{CameraError, CameraSession, FrameSource, NokhwaSource};
pub use controller::{CaptureCommand, CaptureController, CaptureHandle, CaptureReport};
pub use detect::HeuristicDetector;
pub use remote::HttpVerificationPort;
pub use scheduler::GateScheduler;
