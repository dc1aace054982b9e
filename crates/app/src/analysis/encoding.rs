//! Frame conversion and JPEG/base64 encoding.

use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use camera_ingest::{Frame, FrameFormat};
use image::{ImageBuffer, Rgb, RgbImage, codecs::jpeg::JpegEncoder};

/// Copy a BGR frame into an RGB image buffer.
pub(crate) fn frame_to_rgb(frame: &Frame) -> Result<RgbImage> {
    if !frame.is_well_formed() {
        return Err(anyhow!(
            "frame buffer holds {} bytes, expected {} for {}x{}",
            frame.data.len(),
            frame.expected_len(),
            frame.width,
            frame.height
        ));
    }
    let rgb = match frame.format {
        FrameFormat::Bgr8 => swap_red_blue(&frame.data),
    };
    ImageBuffer::<Rgb<u8>, Vec<u8>>::from_vec(frame.width as u32, frame.height as u32, rgb)
        .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))
}

pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

/// Encode an unannotated frame, as archived next to the annotated one.
pub(crate) fn encode_frame_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    encode_jpeg(&frame_to_rgb(frame)?, quality)
}

pub(crate) fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode an image file into a BGR frame for offline analysis.
pub(crate) fn load_frame(path: &std::path::Path) -> Result<Frame> {
    let rgb = image::open(path)
        .map_err(|err| anyhow!("failed to open {}: {err}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame {
        data: swap_red_blue(rgb.as_raw()),
        width: width as i32,
        height: height as i32,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
        format: FrameFormat::Bgr8,
    })
}

/// Swap the first and third channel of packed 3-channel pixels. The same swap
/// converts BGR→RGB and RGB→BGR.
fn swap_red_blue(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}
