//! Camera session with a single-owner device handle.
//!
//! The camera is the one expensive shared resource in the pipeline. A
//! [`CameraSession`] owns it for the whole capture session: acquired once
//! before the first detection tick, never reacquired mid-session (doing so
//! is costly and re-triggers OS permission UI), and released exactly once on
//! teardown no matter which terminal path the state machine took. `close` is
//! idempotent and `Drop` closes as a last resort.

use medgate_core::Frame;
use medgate_core::config::CameraConfig;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the camera boundary.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The device could not be acquired (missing, busy, or denied).
    ///
    /// Fatal to the capture flow, non-fatal to the embedding application;
    /// there is no fallback capture path without a camera.
    #[error("camera acquisition failed: {0}")]
    Acquisition(String),

    /// `open` was called while a handle is already open for the session.
    #[error("camera already open for this session")]
    AlreadyOpen,

    /// Grabbing or decoding a frame failed.
    #[error("camera frame failed: {0}")]
    Frame(String),

    /// The session has already been closed.
    #[error("camera session is closed")]
    Closed,
}

/// Pulls frames from a live video source.
///
/// Production uses [`NokhwaSource`]; tests inject scripted sources.
/// Dropping a source releases the underlying device.
pub trait FrameSource: Send {
    /// Grabs the current frame.
    fn grab(&mut self) -> Result<Frame, CameraError>;

    /// The actual resolution the source is delivering.
    fn resolution(&self) -> (u32, u32);
}

/// Owns the video input device for one capture session.
#[derive(Default)]
pub struct CameraSession {
    source: Option<Box<dyn FrameSource>>,
}

impl CameraSession {
    /// Creates a session with no device attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the configured device.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::AlreadyOpen`] if a handle is already open, or
    /// [`CameraError::Acquisition`] if the device cannot be opened.
    pub fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        if self.source.is_some() {
            return Err(CameraError::AlreadyOpen);
        }
        let source = NokhwaSource::open(config)?;
        self.source = Some(Box::new(source));
        Ok(())
    }

    /// Attaches an already-built source (test seam).
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::AlreadyOpen`] if a handle is already open.
    pub fn attach(&mut self, source: Box<dyn FrameSource>) -> Result<(), CameraError> {
        if self.source.is_some() {
            return Err(CameraError::AlreadyOpen);
        }
        self.source = Some(source);
        Ok(())
    }

    /// Whether a device handle is currently open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Grabs the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::Closed`] if no handle is open, or a frame
    /// error from the source.
    pub fn grab(&mut self) -> Result<Frame, CameraError> {
        match self.source.as_mut() {
            Some(source) => source.grab(),
            None => Err(CameraError::Closed),
        }
    }

    /// Releases the device handle. Idempotent: closing an already-closed
    /// session is a no-op.
    pub fn close(&mut self) {
        if let Some(source) = self.source.take() {
            drop(source);
            debug!("camera handle released");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// `nokhwa`-backed device source.
pub struct NokhwaSource {
    camera: nokhwa::Camera,
    width: u32,
    height: u32,
}

impl NokhwaSource {
    /// Opens the configured device and starts its stream.
    ///
    /// The driver may settle on a resolution near the requested one; the
    /// actual resolution is reported by [`FrameSource::resolution`].
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::Acquisition`] if the device cannot be created
    /// or its stream cannot be opened.
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let index = CameraIndex::Index(config.index);
        let format = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::YUYV,
            30,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = nokhwa::Camera::new(index, requested)
            .map_err(|e| CameraError::Acquisition(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CameraError::Acquisition(e.to_string()))?;

        let actual = camera.resolution();
        info!(
            index = config.index,
            width = actual.width(),
            height = actual.height(),
            "camera stream opened"
        );
        Ok(Self {
            width: actual.width(),
            height: actual.height(),
            camera,
        })
    }
}

impl FrameSource for NokhwaSource {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::Frame(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::Frame(e.to_string()))?;
        let (width, height) = decoded.dimensions();
        Ok(Frame::new(width, height, decoded.into_raw()))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for NokhwaSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            warn!(error = %e, "failed to stop camera stream on release");
        }
    }
}
