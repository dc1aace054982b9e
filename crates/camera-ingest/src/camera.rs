//! OpenCV-backed still camera.

#[cfg(feature = "opencv")]
pub use device::DeviceCamera;

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = stripped.parse::<i32>() {
                return Some(index);
            }
        }
    }
    None
}

#[cfg(feature = "opencv")]
mod device {
    use std::thread;

    use chrono::Utc;
    use opencv::{
        core::{self, MatTraitConstManual},
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait},
    };
    use tracing::{debug, warn};

    use super::parse_device_index;
    use crate::{
        CameraSettings, StillCamera,
        types::{CaptureError, Frame, FrameFormat},
    };

    /// Frames discarded after a mode switch so the driver queue holds a frame
    /// taken with the new configuration.
    const STALE_FRAMES: usize = 2;

    pub struct DeviceCamera {
        cap: VideoCapture,
        settings: CameraSettings,
    }

    impl DeviceCamera {
        pub fn open(settings: &CameraSettings) -> Result<Self, CaptureError> {
            let cap = open_video_capture(&settings.uri)?;
            Ok(Self {
                cap,
                settings: settings.clone(),
            })
        }

        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            let mut frame = Mat::default();
            let mut scratch = Mat::default();
            let (target_w, target_h) = self.settings.still_size;

            for _ in 0..STALE_FRAMES {
                let _ = self.cap.grab();
            }
            let ok = self
                .cap
                .read(&mut frame)
                .map_err(|e| CaptureError::Other(e.into()))?;
            let size = frame.size().map_err(|e| CaptureError::Other(e.into()))?;
            if !ok || size.width <= 0 || size.height <= 0 {
                return Err(CaptureError::EmptyFrame);
            }

            let working = if size.width != target_w || size.height != target_h {
                opencv::imgproc::resize(
                    &frame,
                    &mut scratch,
                    core::Size {
                        width: target_w,
                        height: target_h,
                    },
                    0.0,
                    0.0,
                    opencv::imgproc::INTER_LINEAR,
                )
                .map_err(|e| CaptureError::Other(e.into()))?;
                &scratch
            } else {
                &frame
            };

            let data = working
                .data_bytes()
                .map_err(|e| CaptureError::Other(e.into()))?
                .to_vec();

            Ok(Frame {
                data,
                width: target_w,
                height: target_h,
                timestamp_ms: Utc::now().timestamp_millis(),
                format: FrameFormat::Bgr8,
            })
        }
    }

    impl StillCamera for DeviceCamera {
        fn start_preview(&mut self) -> Result<(), CaptureError> {
            configure_camera(&mut self.cap, self.settings.preview_size, 30.0);
            Ok(())
        }

        fn acquire_still_frame(&mut self) -> Result<Frame, CaptureError> {
            configure_camera(&mut self.cap, self.settings.still_size, 5.0);
            thread::sleep(self.settings.settle);
            self.read_frame()
        }

        fn resume_preview(&mut self) -> Result<(), CaptureError> {
            self.start_preview()
        }

        fn describe(&self) -> String {
            let (w, h) = self.settings.still_size;
            format!("opencv device {} ({w}x{h})", self.settings.uri)
        }
    }

    /// Attempt to open a camera input either by index or URI.
    fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
        if let Some(index) = parse_device_index(uri) {
            for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
                match VideoCapture::new(index, backend) {
                    Ok(cap) => {
                        if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                            return Ok(cap);
                        }
                    }
                    Err(err) => {
                        warn!("failed to open device #{index} with backend {backend}: {err}");
                    }
                }
            }
        }

        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::from_file(uri, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open {uri} with backend {backend}: {err}");
                }
            }
        }

        Err(CaptureError::Open {
            uri: uri.to_string(),
        })
    }

    /// Apply resolution and frame rate for the requested mode.
    fn configure_camera(cap: &mut VideoCapture, size: (i32, i32), fps: f64) {
        if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
            let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
        }
        let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, size.0 as f64);
        let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, size.1 as f64);
        let _ = cap.set(videoio::CAP_PROP_FPS, fps);
        debug!("camera configured for {}x{} @ {fps} fps", size.0, size.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_index_accepts_numbers_and_dev_paths() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("rtsp://cam/stream"), None);
    }
}
