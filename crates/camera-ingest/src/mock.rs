//! Hardware-free camera used on development machines and in tests.

use std::path::Path;

use chrono::{DateTime, Local, Utc};
use tracing::{debug, warn};

use crate::{
    CameraSettings, StillCamera,
    types::{CaptureError, Frame, FrameFormat},
};

const MAX_TEST_IMAGES: usize = 3;
/// Top-left corner of the `MOCK: <time>` stamp.
const STAMP_ORIGIN: (i32, i32) = (10, 23);
/// Stamp colour in BGR order.
const STAMP_COLOR: [u8; 3] = [0, 255, 0];
const GLYPH_ADVANCE: i32 = 6;

/// Serves a blank frame followed by any `test_image_<n>.jpg` found on disk,
/// cycling through them on every still capture.
pub struct MockCamera {
    frames: Vec<Frame>,
    next: usize,
    previewing: bool,
}

impl MockCamera {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            frames: vec![Frame::blank(width, height, 0)],
            next: 0,
            previewing: false,
        }
    }

    pub fn from_settings(settings: &CameraSettings) -> Self {
        let (width, height) = settings.still_size;
        let mut camera = Self::new(width, height);
        for index in 1..=MAX_TEST_IMAGES {
            let path = settings.test_image_dir.join(format!("test_image_{index}.jpg"));
            if !path.exists() {
                continue;
            }
            match load_bgr(&path) {
                Ok(frame) => {
                    debug!("mock camera loaded {}", path.display());
                    camera.frames.push(frame);
                }
                Err(err) => warn!("mock camera skipped {}: {err}", path.display()),
            }
        }
        camera
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_previewing(&self) -> bool {
        self.previewing
    }
}

impl StillCamera for MockCamera {
    fn start_preview(&mut self) -> Result<(), CaptureError> {
        self.previewing = true;
        Ok(())
    }

    fn acquire_still_frame(&mut self) -> Result<Frame, CaptureError> {
        self.previewing = false;
        let template = self
            .frames
            .get(self.next % self.frames.len().max(1))
            .ok_or(CaptureError::EmptyFrame)?;
        self.next = self.next.wrapping_add(1);
        let mut frame = template.clone();
        let now = Utc::now();
        frame.timestamp_ms = now.timestamp_millis();
        stamp_frame(&mut frame, &now.with_timezone(&Local));
        Ok(frame)
    }

    fn resume_preview(&mut self) -> Result<(), CaptureError> {
        self.previewing = true;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("mock camera ({} frame(s))", self.frames.len())
    }
}

fn load_bgr(path: &Path) -> Result<Frame, CaptureError> {
    let rgb = image::open(path)
        .map_err(|err| CaptureError::Other(err.into()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut data = Vec::with_capacity(rgb.as_raw().len());
    for px in rgb.pixels() {
        data.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    Ok(Frame {
        data,
        width: width as i32,
        height: height as i32,
        timestamp_ms: 0,
        format: FrameFormat::Bgr8,
    })
}

/// Draw `MOCK: <local time>` at the top left, clipped to the frame.
fn stamp_frame(frame: &mut Frame, at: &DateTime<Local>) {
    let text = format!("MOCK: {}", at.format("%Y-%m-%d %H:%M:%S"));
    let (mut x, y) = STAMP_ORIGIN;
    for ch in text.chars() {
        if let Some(rows) = glyph_bits(ch) {
            for (dy, bits) in (0i32..).zip(rows) {
                for dx in 0..5 {
                    if bits & (0b10000 >> dx) != 0 {
                        put_pixel(frame, x + dx, y + dy);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn put_pixel(frame: &mut Frame, x: i32, y: i32) {
    if x < 0 || y < 0 || x >= frame.width || y >= frame.height {
        return;
    }
    let channels = frame.format.channels();
    let offset = (y as usize * frame.width as usize + x as usize) * channels;
    if let Some(px) = frame.data.get_mut(offset..offset + channels) {
        px.copy_from_slice(&STAMP_COLOR);
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0, 0b00110, 0b00110, 0, 0b00110, 0b00110, 0],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        _ => return None,
    };
    Some(rows)
}
