//! Post-processing for shareable board downloads.
//!
//! [`prepare_download`] takes a composed board PNG and optimizes it for
//! mobile sharing: downscale the longest edge, wrap the image in an ivory
//! frame with a double gold border, stroke a watermark into the bottom-right
//! corner, and re-encode with stronger compression than the interactive
//! render uses.

use ab_glyph::PxScale;
use anyhow::Context as _;
use image::{
    imageops::{self, FilterType},
    Rgba, RgbaImage,
};
use imageproc::drawing::{draw_text_mut, text_size};
use log::debug;

use crate::{
    compose::{compression_for_level, encode_png},
    fonts, Result,
};

/// Frame background, a warm ivory.
const FRAME_BACKGROUND: Rgba<u8> = Rgba([255, 254, 248, 255]);
/// Border and watermark gold.
const GOLD: Rgba<u8> = Rgba([212, 175, 55, 255]);
/// Watermark stroke, a dark brown that reads against the gold fill.
const WATERMARK_STROKE: Rgba<u8> = Rgba([60, 50, 30, 255]);
/// Stroke radius around the watermark glyphs, in pixels.
const STROKE_WIDTH: i32 = 2;

/// Knobs for [`prepare_download`]. `Default` gives the standard share
/// treatment; callers normally only override the watermark text.
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    /// Text drawn near the bottom-right corner. Blank disables the
    /// watermark layer.
    pub watermark_text: String,
    /// Longest allowed edge of the board image before framing.
    pub max_side: u32,
    /// Inset of the watermark from the framed image's edges, added on top
    /// of the frame padding.
    pub padding: u32,
    /// Alpha of the watermark fill.
    pub opacity: u8,
    /// PNG compression level, 0 (fastest) through 9 (smallest).
    pub compress_level: u8,
    /// Width of the ivory frame added around the image.
    pub frame_padding: u32,
    /// Stroke width of each of the two gold border rectangles.
    pub border_width: u32,
}

impl Default for DownloadOptions {
    fn default() -> DownloadOptions {
        DownloadOptions {
            watermark_text: "taroboard".to_owned(),
            max_side: 1080,
            padding: 18,
            opacity: 255,
            compress_level: 9,
            frame_padding: 24,
            border_width: 6,
        }
    }
}

/// A share-ready PNG with its final framed dimensions.
#[derive(Clone, Debug)]
pub struct DownloadArtifact {
    /// PNG-encoded image data.
    pub png_bytes: Vec<u8>,
    /// Final width in pixels, frame included.
    pub width: u32,
    /// Final height in pixels, frame included.
    pub height: u32,
}

impl DownloadArtifact {
    /// A short human-readable summary, e.g. `1128×776 · 342KB`.
    pub fn caption(&self) -> String {
        let kb = self.png_bytes.len() as f64 / 1024.0;
        format!("{}×{} · {:.0}KB", self.width, self.height, kb)
    }
}

/// Downscale, frame, watermark and re-encode a board PNG.
///
/// When no usable display font exists on the host, the watermark layer is
/// skipped rather than failing the export.
pub fn prepare_download(png_bytes: &[u8], options: &DownloadOptions) -> Result<DownloadArtifact> {
    let mut img = image::load_from_memory(png_bytes)
        .context("could not decode board image")?
        .to_rgba8();

    let (w, h) = img.dimensions();
    let longest = w.max(h);
    if longest > options.max_side {
        let scale = options.max_side as f64 / longest as f64;
        let nw = ((w as f64 * scale).round() as u32).max(1);
        let nh = ((h as f64 * scale).round() as u32).max(1);
        img = imageops::resize(&img, nw, nh, FilterType::Lanczos3);
    }

    let fp = options.frame_padding;
    let new_w = img.width() + 2 * fp;
    let new_h = img.height() + 2 * fp;
    let mut canvas = RgbaImage::from_pixel(new_w, new_h, FRAME_BACKGROUND);
    imageops::overlay(&mut canvas, &img, fp as i64, fp as i64);

    // Double gold border: one stroke at the edge, one a stroke-width in.
    stroke_rect(&mut canvas, 0, options.border_width, GOLD);
    stroke_rect(&mut canvas, options.border_width, options.border_width, GOLD);

    if !options.watermark_text.trim().is_empty() {
        draw_watermark(&mut canvas, options);
    }

    let png_bytes = encode_png(&canvas, compression_for_level(options.compress_level))?;
    Ok(DownloadArtifact { png_bytes, width: new_w, height: new_h })
}

/// Stroke a rectangle `width` pixels thick, inset `inset` pixels from the
/// canvas edge, growing inward.
fn stroke_rect(canvas: &mut RgbaImage, inset: u32, width: u32, color: Rgba<u8>) {
    let (cw, ch) = canvas.dimensions();
    for ring in inset..inset + width {
        if cw <= 2 * ring + 1 || ch <= 2 * ring + 1 {
            break;
        }
        let right = cw - 1 - ring;
        let bottom = ch - 1 - ring;
        for x in ring..=right {
            canvas.put_pixel(x, ring, color);
            canvas.put_pixel(x, bottom, color);
        }
        for y in ring..=bottom {
            canvas.put_pixel(ring, y, color);
            canvas.put_pixel(right, y, color);
        }
    }
}

/// Draw the watermark at the bottom-right, stroked for legibility. Skipped
/// (with a log line) when font discovery came up empty.
fn draw_watermark(canvas: &mut RgbaImage, options: &DownloadOptions) {
    let Some(font) = fonts::display_font() else {
        debug!("no display font; skipping watermark");
        return;
    };
    let text = options.watermark_text.trim();
    let (cw, ch) = canvas.dimensions();
    let size = f64::max(14.0, (cw.min(ch) as f64 * 0.04).round()) as f32;
    let scale = PxScale::from(size);
    let (text_w, text_h) = text_size(scale, font, text);
    // The stroke widens the rendered box on every side.
    let box_w = text_w as i32 + 2 * STROKE_WIDTH;
    let box_h = text_h as i32 + 2 * STROKE_WIDTH;

    let inset = (options.padding + options.frame_padding) as i32;
    let x = (cw as i32 - inset - box_w).max(inset);
    let y = (ch as i32 - inset - box_h).max(inset);

    for dx in -STROKE_WIDTH..=STROKE_WIDTH {
        for dy in -STROKE_WIDTH..=STROKE_WIDTH {
            if dx == 0 && dy == 0 {
                continue;
            }
            draw_text_mut(canvas, WATERMARK_STROKE, x + dx, y + dy, scale, font, text);
        }
    }
    let fill = Rgba([GOLD[0], GOLD[1], GOLD[2], options.opacity]);
    draw_text_mut(canvas, fill, x, y, scale, font, text);
}
