//! Drawing primitives for the annotated result image: box outlines plus a
//! built-in 5x7 bitmap font for the `S<id> (<category>)` labels.

use image::{Rgb, RgbImage};
use rebar_core::Segment;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const GLYPH_ADVANCE: i32 = 6;
const GLYPH_HEIGHT: i32 = 7;
/// Gap between the label baseline and the top edge of its box.
const LABEL_OFFSET: i32 = 10;

/// Draw every segment's box and label onto `image`.
pub(crate) fn annotate_segments(image: &mut RgbImage, segments: &[Segment]) {
    for segment in segments {
        let bbox = &segment.bbox;
        for inset in 0..BOX_THICKNESS {
            draw_rectangle(
                image,
                bbox.x1 as i32 + inset,
                bbox.y1 as i32 + inset,
                bbox.x2 as i32 - inset,
                bbox.y2 as i32 - inset,
                BOX_COLOR,
            );
        }
    }

    for segment in segments {
        let label = segment.label();
        let label_x = segment.bbox.x1 as i32;
        let label_y = (segment.bbox.y1 as i32 - LABEL_OFFSET - GLYPH_HEIGHT / 2).max(0);
        let text_width = label_width(&label);
        fill_rect(
            image,
            label_x - 1,
            label_y - 1,
            label_x + text_width,
            label_y + GLYPH_HEIGHT,
            LABEL_BACKGROUND,
        );
        draw_label(image, label_x, label_y, &label, BOX_COLOR);
    }
}

pub(crate) fn label_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE
}

fn draw_rectangle(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    if left > right || top > bottom {
        return;
    }
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for x in left..=right {
        *image.get_pixel_mut(x as u32, top as u32) = color;
        *image.get_pixel_mut(x as u32, bottom as u32) = color;
    }
    for y in top..=bottom {
        *image.get_pixel_mut(left as u32, y as u32) = color;
        *image.get_pixel_mut(right as u32, y as u32) = color;
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < width {
                            *image.get_pixel_mut(px as u32, py as u32) = color;
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
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
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebar_core::BoundingBox;

    fn segment(section_id: u32, bbox: BoundingBox, category: &str) -> Segment {
        Segment {
            section_id,
            bbox,
            confidence: 0.8,
            diameter_mm: 1.0,
            size_category: category.into(),
            width_cm: 1.0,
            length_cm: 1.0,
            height_cm: 1.0,
            volume_cc: 1.0,
        }
    }

    #[test]
    fn boxes_are_outlined_in_green() {
        let mut image = RgbImage::new(300, 400);
        let bbox = BoundingBox::new(50, 100, 150, 250).unwrap();
        annotate_segments(&mut image, &[segment(1, bbox, "small")]);

        assert_eq!(*image.get_pixel(50, 180), BOX_COLOR);
        assert_eq!(*image.get_pixel(51, 180), BOX_COLOR);
        assert_eq!(*image.get_pixel(150, 180), BOX_COLOR);
        assert_eq!(*image.get_pixel(100, 250), BOX_COLOR);
        assert_eq!(*image.get_pixel(100, 180), Rgb([0, 0, 0]));
    }

    #[test]
    fn label_is_drawn_above_the_box() {
        let mut image = RgbImage::new(300, 400);
        let bbox = BoundingBox::new(50, 100, 150, 250).unwrap();
        annotate_segments(&mut image, &[segment(1, bbox, "small")]);

        let band_top = 100 - LABEL_OFFSET - GLYPH_HEIGHT / 2;
        let lit = (band_top..band_top + GLYPH_HEIGHT)
            .flat_map(|y| (50..50 + label_width("S1 (small)")).map(move |x| (x, y)))
            .filter(|&(x, y)| *image.get_pixel(x as u32, y as u32) == BOX_COLOR)
            .count();
        assert!(lit > 20, "expected label pixels, found {lit}");
    }

    #[test]
    fn boxes_touching_the_frame_edge_are_clamped() {
        let mut image = RgbImage::new(20, 20);
        let bbox = BoundingBox::new(0, 0, 20, 20).unwrap();
        annotate_segments(&mut image, &[segment(12, bbox, "unclassified")]);
        assert_eq!(*image.get_pixel(19, 19), BOX_COLOR);
    }

    #[test]
    fn every_category_character_has_a_glyph() {
        for ch in "S0123456789 (SMALL MEDIUM LARGE UNCLASSIFIED)".chars() {
            assert!(glyph_bits(ch).is_some(), "missing glyph for {ch:?}");
        }
        assert!(glyph_bits('?').is_none());
    }
}
