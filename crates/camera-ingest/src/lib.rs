//! Still-frame camera collaborators.
//!
//! A capture cycle switches the camera from its low-latency preview mode into a
//! still configuration, grabs one frame and switches back. Every backend
//! implements [`StillCamera`] so the caller never needs to know whether it is
//! talking to real hardware or to the mock.

use std::{path::PathBuf, time::Duration};

mod camera;
mod mock;
mod types;

#[cfg(feature = "opencv")]
pub use camera::DeviceCamera;
pub use camera::parse_device_index;
pub use mock::MockCamera;
pub use types::{CaptureError, Frame, FrameFormat};

/// Camera capable of switching between preview and still capture.
pub trait StillCamera: Send {
    /// Put the camera into preview mode. Called once after opening.
    fn start_preview(&mut self) -> Result<(), CaptureError>;

    /// Reconfigure for still capture and return a single frame.
    fn acquire_still_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Return to preview mode after a still capture.
    fn resume_preview(&mut self) -> Result<(), CaptureError>;

    /// Human readable description used in logs.
    fn describe(&self) -> String;
}

/// Backend selected at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraKind {
    /// Synthetic frames, optionally seeded from test images on disk.
    Mock,
    /// V4L/OpenCV device. Requires the `opencv` feature.
    Device,
}

impl CameraKind {
    pub fn label(self) -> &'static str {
        match self {
            CameraKind::Mock => "mock",
            CameraKind::Device => "device",
        }
    }
}

/// Parameters shared by every camera backend.
#[derive(Clone, Debug)]
pub struct CameraSettings {
    /// Device index, `/dev/videoN` path or stream URI.
    pub uri: String,
    /// (width, height) used while previewing.
    pub preview_size: (i32, i32),
    /// (width, height) requested for still captures.
    pub still_size: (i32, i32),
    /// Time given to the sensor to settle after a mode switch.
    pub settle: Duration,
    /// Directory searched for `test_image_<n>.jpg` by the mock backend.
    pub test_image_dir: PathBuf,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            uri: "/dev/video0".to_string(),
            preview_size: (300, 400),
            still_size: (300, 400),
            settle: Duration::from_millis(500),
            test_image_dir: PathBuf::from("."),
        }
    }
}

/// Open the requested backend and leave it in preview mode.
pub fn open_camera(
    kind: CameraKind,
    settings: &CameraSettings,
) -> Result<Box<dyn StillCamera>, CaptureError> {
    let mut camera: Box<dyn StillCamera> = match kind {
        CameraKind::Mock => Box::new(MockCamera::from_settings(settings)),
        #[cfg(feature = "opencv")]
        CameraKind::Device => Box::new(DeviceCamera::open(settings)?),
        #[cfg(not(feature = "opencv"))]
        CameraKind::Device => return Err(CaptureError::Unsupported("opencv")),
    };
    camera.start_preview()?;
    tracing::info!("Camera initialised: {}", camera.describe());
    Ok(camera)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_backend_opens_in_preview_mode() {
        let settings = CameraSettings {
            test_image_dir: PathBuf::from("/nonexistent"),
            ..Default::default()
        };
        let mut camera = open_camera(CameraKind::Mock, &settings).expect("mock opens");
        let frame = camera.acquire_still_frame().expect("mock frame");
        assert_eq!((frame.width, frame.height), (300, 400));
        camera.resume_preview().expect("resume");
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn device_backend_requires_feature() {
        let err = open_camera(CameraKind::Device, &CameraSettings::default())
            .err()
            .expect("device camera must be unavailable");
        assert!(matches!(err, CaptureError::Unsupported("opencv")));
    }
}
