use anyhow::Error;
use thiserror::Error;

/// Raw BGR frame captured from a still camera.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

impl Frame {
    /// Allocate a black frame of the given size.
    pub fn blank(width: i32, height: i32, timestamp_ms: i64) -> Self {
        let len = (width.max(0) as usize) * (height.max(0) as usize) * FrameFormat::Bgr8.channels();
        Self {
            data: vec![0; len],
            width,
            height,
            timestamp_ms,
            format: FrameFormat::Bgr8,
        }
    }

    /// Number of bytes a well-formed frame of this size carries.
    pub fn expected_len(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize) * self.format.channels()
    }

    /// True when the frame has a positive size and a buffer matching it.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn channels(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera {uri:?}")]
    Open { uri: String },
    #[error("camera returned an empty frame")]
    EmptyFrame,
    #[error("camera support for {0:?} was not compiled in")]
    Unsupported(&'static str),
    #[error(transparent)]
    Other(#[from] Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frame_is_well_formed() {
        let frame = Frame::blank(300, 400, 0);
        assert_eq!(frame.data.len(), 300 * 400 * 3);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn zero_sized_frame_is_rejected() {
        let frame = Frame::blank(0, 400, 0);
        assert!(frame.data.is_empty());
        assert!(!frame.is_well_formed());
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut frame = Frame::blank(4, 4, 0);
        frame.data.truncate(10);
        assert!(!frame.is_well_formed());
    }
}
