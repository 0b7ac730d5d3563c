//! Text drawing for figure titles and legend labels.
//!
//! Uses a DejaVu Sans face embedded at compile time, so rendering is
//! deterministic and needs no system font lookup.

use std::sync::OnceLock;

use ab_glyph::{FontRef, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};

static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
static FONT: OnceLock<FontRef<'static>> = OnceLock::new();

fn font() -> &'static FontRef<'static> {
    FONT.get_or_init(|| FontRef::try_from_slice(FONT_DATA).expect("embedded font is valid"))
}

/// Pixel width of `text` at the given point size.
pub fn text_width(text: &str, size: f32) -> u32 {
    let (w, _) = text_size(PxScale::from(size), font(), text);
    u32::try_from(w).unwrap_or(0)
}

/// Draw `text` with its top-left corner at (x, y). Glyphs falling outside
/// the canvas are clipped.
pub fn draw_text(img: &mut RgbaImage, x: i32, y: i32, size: f32, text: &str, color: Rgba<u8>) {
    draw_text_mut(img, color, x, y, PxScale::from(size), font(), text);
}
