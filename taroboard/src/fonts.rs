//! Cross-platform font discovery for on-image text.
//!
//! We prefer a serif face for the watermark, then fall back through sans
//! faces. When the host has none of our candidates installed at all, text
//! layers are skipped rather than failing the render, so a missing font can
//! never break an export.

use std::fs;

use ab_glyph::FontVec;
use lazy_static::lazy_static;
use log::{debug, warn};

/// Font files to try, in preference order. Serif first, covering the Linux,
/// Windows and macOS locations we have actually seen.
const FONT_CANDIDATES: &[&str] = &[
    // Linux (Debian/Ubuntu and friends).
    "/usr/share/fonts/truetype/dejavu/DejaVuSerif.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSerif-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSerif.ttf",
    // Linux sans fallback.
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    // Windows.
    "C:/Windows/Fonts/times.ttf",
    "C:/Windows/Fonts/georgia.ttf",
    "C:/Windows/Fonts/arial.ttf",
    // macOS.
    "/Library/Fonts/Georgia.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

lazy_static! {
    static ref DISPLAY_FONT: Option<FontVec> = load_display_font();
}

/// The best display font we could find on this host, if any. Loaded once
/// and cached for the life of the process.
pub fn display_font() -> Option<&'static FontVec> {
    DISPLAY_FONT.as_ref()
}

/// Walk our candidate list and parse the first font that loads.
fn load_display_font() -> Option<FontVec> {
    for path in FONT_CANDIDATES {
        let Ok(bytes) = fs::read(path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                debug!("using display font {}", path);
                return Some(font);
            }
            Err(err) => {
                debug!("could not parse font {}: {}", path, err);
            }
        }
    }
    warn!("no usable display font found; text layers will be skipped");
    None
}
