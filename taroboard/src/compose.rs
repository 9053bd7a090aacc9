//! The spread-board compositor.
//!
//! Given a deck, a spread with an absolute layout, and the current
//! code/angle assignment, [`BoardRenderer::compose`] produces one flattened
//! PNG: each card image is cover-fitted into the layout's card box, rotated,
//! and alpha-composited in ascending `(z, key)` order onto the background
//! canvas. Empty slots show the deck's card back; a card whose image asset
//! is missing gets a labeled placeholder frame instead of failing the whole
//! render.
//!
//! Rendering the same inputs twice yields byte-identical PNG output, which
//! is what makes the layer cache and upstream memoization safe.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use ab_glyph::PxScale;
use anyhow::Context as _;
use image::{
    codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder},
    imageops::{self, FilterType},
    ColorType, ImageEncoder, Rgba, RgbaImage,
};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use log::debug;

use crate::{
    cache::Cache,
    cards::Deck,
    errors::BoardError,
    fonts, geom,
    spreads::{Anchor, LayoutSlot, LayoutSpec, Spread},
    state::DrawState,
    Result,
};

/// How many resized-and-rotated layers we keep around. Generous for a deck
/// of ~80 cards at a handful of spread geometries and four angles.
const LAYER_CACHE_ENTRIES: usize = 1024;

/// A composed board image.
#[derive(Clone, Debug)]
pub struct RenderedBoard {
    /// PNG-encoded image data.
    pub png_bytes: Vec<u8>,
    /// Final width in pixels.
    pub width: u32,
    /// Final height in pixels.
    pub height: u32,
}

/// Content address of a prepared layer: same source, same box, same angle
/// means the same pixels.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct LayerKey {
    path: PathBuf,
    width: u32,
    height: u32,
    angle: i32,
}

/// Renders spread boards, caching prepared layers between renders.
///
/// Compositing is a pure function of its inputs, so a renderer can be
/// shared and called from concurrent contexts; the only mutable state is
/// the layer cache behind a lock.
#[derive(Debug)]
pub struct BoardRenderer {
    data_root: PathBuf,
    layers: Mutex<Cache<LayerKey, Arc<RgbaImage>>>,
}

impl BoardRenderer {
    /// Create a renderer resolving image assets relative to `data_root`.
    pub fn new<P: Into<PathBuf>>(data_root: P) -> BoardRenderer {
        BoardRenderer {
            data_root: data_root.into(),
            layers: Mutex::new(Cache::new("layers", LAYER_CACHE_ENTRIES)),
        }
    }

    /// Compose the board for a full code/angle assignment, keyed by slot.
    ///
    /// Fails with [`BoardError::LayoutUnsupported`] when the spread has no
    /// absolute layout, and with [`BoardError::UnsupportedAngle`] when an
    /// assigned angle is not a quarter turn. A missing card image does
    /// *not* fail the render; the slot gets a labeled placeholder frame.
    pub fn compose(
        &self,
        deck: &Deck,
        spread: &Spread,
        codes_by_slot: &HashMap<String, String>,
        angles_by_slot: &HashMap<String, i32>,
        render_back_for_missing: bool,
    ) -> Result<RenderedBoard> {
        let layout = board_layout(spread)?;
        let m = geom::metrics(layout);
        let bg = parse_hex_color(&layout.canvas.background);
        let mut canvas = RgbaImage::from_pixel(m.canvas_w, m.canvas_h, bg);

        for ls in geom::paint_order(layout) {
            let angle = angles_by_slot.get(&ls.key).copied().unwrap_or(0);
            let layer = match codes_by_slot.get(&ls.key) {
                Some(code) => {
                    let path = deck.card_image_path(&self.data_root, code);
                    match self.layer(&path, m.card_w, m.card_h, angle) {
                        Ok(layer) => layer,
                        Err(err) => {
                            debug!("substituting placeholder for {:?}: {}", code, err);
                            let label = match deck.card_by_code(code) {
                                Some(card) => format!("{}. {}", code, card.display_name()),
                                None => code.clone(),
                            };
                            Arc::new(placeholder_tile(m.card_w, m.card_h, &label, angle)?)
                        }
                    }
                }
                None => {
                    if !render_back_for_missing {
                        continue;
                    }
                    let Some(back_path) = deck.back_image_path(&self.data_root) else {
                        continue;
                    };
                    match self.layer(&back_path, m.card_w, m.card_h, angle) {
                        Ok(layer) => layer,
                        Err(err) => {
                            debug!("skipping card back for {:?}: {}", ls.key, err);
                            continue;
                        }
                    }
                }
            };
            let Some((px, py)) = paste_origin(layout, ls, layer.width(), layer.height()) else {
                continue;
            };
            // `overlay` clips, so partially off-canvas layers are fine.
            imageops::overlay(&mut canvas, &*layer, px, py);
        }

        let png_bytes = encode_png(&canvas, CompressionType::Default)?;
        Ok(RenderedBoard {
            png_bytes,
            width: m.canvas_w,
            height: m.canvas_h,
        })
    }

    /// Compose the board for a [`DrawState`], in spread slot order.
    pub fn compose_state(
        &self,
        deck: &Deck,
        spread: &Spread,
        state: &DrawState,
    ) -> Result<RenderedBoard> {
        let mut codes = HashMap::new();
        let mut slot_angles = HashMap::new();
        for (slot, drawn) in spread.slots.iter().zip(&state.slots) {
            if let Some(code) = &drawn.code {
                codes.insert(slot.key.clone(), code.clone());
            }
            slot_angles.insert(slot.key.clone(), drawn.angle);
        }
        self.compose(deck, spread, &codes, &slot_angles, true)
    }

    /// Load, cover-fit and rotate one layer, going through the cache.
    fn layer(&self, path: &Path, width: u32, height: u32, angle: i32) -> Result<Arc<RgbaImage>> {
        let key = LayerKey { path: path.to_owned(), width, height, angle };
        {
            let mut layers = self.layers.lock().expect("layer cache lock poisoned");
            if let Some(hit) = layers.get(&key) {
                return Ok(hit);
            }
        }
        let src = image::open(path)
            .with_context(|| format!("could not load {}", path.display()))?
            .to_rgba8();
        let layer = Arc::new(rotate_layer(resize_cover(&src, width, height), angle)?);
        let mut layers = self.layers.lock().expect("layer cache lock poisoned");
        layers.insert(key, layer.clone());
        Ok(layer)
    }
}

/// The spread's layout, or the error telling the caller board mode is off
/// the table for this spread.
fn board_layout(spread: &Spread) -> Result<&LayoutSpec> {
    match &spread.layout {
        Some(layout) if layout.is_absolute() => Ok(layout),
        _ => Err(BoardError::LayoutUnsupported { spread_id: spread.id.clone() }.into()),
    }
}

/// Where to paste a prepared layer, given its final (possibly swapped)
/// dimensions. `None` when the slot is missing its anchor coordinates.
fn paste_origin(
    layout: &LayoutSpec,
    slot: &LayoutSlot,
    layer_w: u32,
    layer_h: u32,
) -> Option<(i64, i64)> {
    let scale = layout.scale;
    match slot.anchor {
        Anchor::TopLeft => Some((
            (slot.x? * scale).round() as i64,
            (slot.y? * scale).round() as i64,
        )),
        Anchor::Center => Some((
            (slot.cx? * scale - layer_w as f64 / 2.0).round() as i64,
            (slot.cy? * scale - layer_h as f64 / 2.0).round() as i64,
        )),
    }
}

/// Scale uniformly so both dimensions cover the target box, then
/// center-crop to exactly that box. Never distorts, never leaves a margin.
pub(crate) fn resize_cover(img: &RgbaImage, target_w: u32, target_h: u32) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();
    if src_w == 0 || src_h == 0 {
        return imageops::resize(img, target_w, target_h, FilterType::Lanczos3);
    }
    let scale = f64::max(
        target_w as f64 / src_w as f64,
        target_h as f64 / src_h as f64,
    );
    let new_w = ((src_w as f64 * scale).round() as u32).max(target_w);
    let new_h = ((src_h as f64 * scale).round() as u32).max(target_h);
    let resized = imageops::resize(img, new_w, new_h, FilterType::Lanczos3);
    let left = (new_w - target_w) / 2;
    let top = (new_h - target_h) / 2;
    imageops::crop_imm(&resized, left, top, target_w, target_h).to_image()
}

/// Rotate a layer by a quarter turn, expanding the bounds so 90°/270° swap
/// the footprint. Angles follow the usual counter-clockwise convention.
pub(crate) fn rotate_layer(img: RgbaImage, angle: i32) -> Result<RgbaImage> {
    match angle.rem_euclid(360) {
        0 => Ok(img),
        90 => Ok(imageops::rotate270(&img)),
        180 => Ok(imageops::rotate180(&img)),
        270 => Ok(imageops::rotate90(&img)),
        _ => Err(BoardError::UnsupportedAngle(angle).into()),
    }
}

/// Draw a bordered frame carrying the card's code and name, for cards whose
/// image asset is missing on disk.
fn placeholder_tile(card_w: u32, card_h: u32, label: &str, angle: i32) -> Result<RgbaImage> {
    let mut img = RgbaImage::from_pixel(card_w, card_h, Rgba([245, 240, 232, 255]));
    let border_color = Rgba([120, 115, 105, 255]);
    for inset in 0..2u32 {
        if card_w > 2 * inset + 1 && card_h > 2 * inset + 1 {
            let rect = Rect::at(inset as i32, inset as i32)
                .of_size(card_w - 2 * inset, card_h - 2 * inset);
            draw_hollow_rect_mut(&mut img, rect, border_color);
        }
    }
    if let Some(font) = fonts::display_font() {
        let text = truncate_label(label, 24);
        let size = (card_w.min(card_h) / 12).max(12) as f32;
        let scale = PxScale::from(size);
        let (text_w, text_h) = text_size(scale, font, &text);
        let x = (card_w as i32 - text_w as i32) / 2;
        let y = (card_h as i32 - text_h as i32) / 2;
        draw_text_mut(&mut img, Rgba([60, 55, 50, 255]), x, y, scale, font, &text);
    }
    rotate_layer(img, angle)
}

/// Shorten a label to `max` characters, ellipsizing.
fn truncate_label(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        return label.to_owned();
    }
    let head: String = label.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}

/// Parse `#rrggbb` or `#rgb` into an opaque color, falling back to white.
pub(crate) fn parse_hex_color(color: &str) -> Rgba<u8> {
    let hex = color.trim().trim_start_matches('#');
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    let rgb = match hex.len() {
        6 => (
            channel(&hex[0..2]),
            channel(&hex[2..4]),
            channel(&hex[4..6]),
        ),
        3 => {
            let expand = |s: &str| channel(s).map(|v| v * 16 + v);
            (expand(&hex[0..1]), expand(&hex[1..2]), expand(&hex[2..3]))
        }
        _ => (None, None, None),
    };
    match rgb {
        (Some(r), Some(g), Some(b)) => Rgba([r, g, b, 255]),
        _ => Rgba([255, 255, 255, 255]),
    }
}

/// Encode RGBA pixels as a PNG.
pub(crate) fn encode_png(img: &RgbaImage, compression: CompressionType) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, compression, PngFilterType::Adaptive);
    encoder
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgba8.into())
        .context("could not encode PNG")?;
    Ok(out)
}

/// Map a 0-9 compression level onto the PNG encoder's coarser knob.
pub(crate) fn compression_for_level(level: u8) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=7 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

#[cfg(test)]
pub(crate) mod test {
    use image::RgbImage;
    use tempfile::TempDir;

    use super::*;
    use crate::spreads::test::overlap_spread;

    const RED: Rgba<u8> = Rgba([220, 30, 30, 255]);
    const BLUE: Rgba<u8> = Rgba([30, 30, 220, 255]);
    const BACK: Rgba<u8> = Rgba([40, 160, 90, 255]);

    /// Build a data root with generated card images: each card is red on
    /// top, blue on the bottom, so rotations are observable.
    pub(crate) fn image_fixtures(codes: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images/testdeck");
        std::fs::create_dir_all(&images).unwrap();
        for code in codes {
            let img = RgbImage::from_fn(120, 200, |_, y| {
                if y < 100 {
                    image::Rgb([RED[0], RED[1], RED[2]])
                } else {
                    image::Rgb([BLUE[0], BLUE[1], BLUE[2]])
                }
            });
            img.save(images.join(format!("{}.jpg", code))).unwrap();
        }
        let back = RgbImage::from_pixel(120, 200, image::Rgb([BACK[0], BACK[1], BACK[2]]));
        back.save(images.join("back.jpg")).unwrap();
        dir
    }

    pub(crate) fn fixture_deck() -> Deck {
        serde_json::from_value(serde_json::json!({
            "id": "testdeck",
            "name": "Test Deck",
            "image_dir": "images/testdeck",
            "back_image": "images/testdeck/back.jpg",
            "cards": [
                { "code": "0", "name": "The Fool" },
                { "code": "1", "name": "The Magician" },
                { "code": "2", "name": "The High Priestess" },
            ],
        }))
        .unwrap()
    }

    fn assignment(
        codes: &[(&str, &str)],
        slot_angles: &[(&str, i32)],
    ) -> (HashMap<String, String>, HashMap<String, i32>) {
        (
            codes.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            slot_angles.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        )
    }

    fn pixel_near(img: &RgbaImage, x: u32, y: u32, want: Rgba<u8>) -> bool {
        let got = img.get_pixel(x, y);
        got.0
            .iter()
            .zip(want.0.iter())
            .all(|(a, b)| (*a as i32 - *b as i32).abs() <= 16)
    }

    #[test]
    fn compose_is_deterministic() {
        let root = image_fixtures(&["0", "1", "2"]);
        let renderer = BoardRenderer::new(root.path());
        let spread = overlap_spread();
        let deck = fixture_deck();
        let (codes, slot_angles) =
            assignment(&[("base", "0"), ("cross", "1"), ("side", "2")], &[("cross", 90)]);
        let first = renderer.compose(&deck, &spread, &codes, &slot_angles, true).unwrap();
        let second = renderer.compose(&deck, &spread, &codes, &slot_angles, true).unwrap();
        assert_eq!(first.png_bytes, second.png_bytes);
        assert_eq!((600, 400), (first.width, first.height));
    }

    #[test]
    fn rotation_by_180_flips_the_card() {
        let root = image_fixtures(&["0"]);
        let renderer = BoardRenderer::new(root.path());
        let spread = overlap_spread();
        let deck = fixture_deck();
        let (codes, slot_angles) = assignment(&[("side", "0")], &[("side", 180)]);
        let board = renderer.compose(&deck, &spread, &codes, &slot_angles, false).unwrap();
        let img = image::load_from_memory(&board.png_bytes).unwrap().to_rgba8();
        // "side" is top-left anchored at (400, 100), 100x180. Reversed, the
        // blue bottom half ends up on top.
        assert!(pixel_near(&img, 450, 120, BLUE));
        assert!(pixel_near(&img, 450, 260, RED));
    }

    #[test]
    fn sideways_cards_swap_their_footprint() {
        let root = image_fixtures(&["1"]);
        let renderer = BoardRenderer::new(root.path());
        let spread = overlap_spread();
        let deck = fixture_deck();
        let (codes, slot_angles) = assignment(&[("cross", "1")], &[("cross", 90)]);
        let board = renderer.compose(&deck, &spread, &codes, &slot_angles, false).unwrap();
        let img = image::load_from_memory(&board.png_bytes).unwrap().to_rgba8();
        // The crossing card is centered at (200, 200) and now lies 180x100.
        // Just beyond the un-rotated box's horizontal extent is card pixels;
        // just beyond its vertical extent is background.
        assert!(pixel_near(&img, 120, 200, RED) || pixel_near(&img, 120, 200, BLUE));
        let bg = parse_hex_color("#fffdf2");
        assert!(pixel_near(&img, 200, 280, bg));
    }

    #[test]
    fn empty_slots_render_the_card_back() {
        let root = image_fixtures(&[]);
        let renderer = BoardRenderer::new(root.path());
        let spread = overlap_spread();
        let deck = fixture_deck();
        let (codes, slot_angles) = assignment(&[], &[]);
        let board = renderer.compose(&deck, &spread, &codes, &slot_angles, true).unwrap();
        let img = image::load_from_memory(&board.png_bytes).unwrap().to_rgba8();
        assert!(pixel_near(&img, 450, 190, BACK));

        // Without back rendering the canvas shows through.
        let board = renderer.compose(&deck, &spread, &codes, &slot_angles, false).unwrap();
        let img = image::load_from_memory(&board.png_bytes).unwrap().to_rgba8();
        assert!(pixel_near(&img, 450, 190, parse_hex_color("#fffdf2")));
    }

    #[test]
    fn missing_asset_gets_a_placeholder_frame() {
        let root = image_fixtures(&[]);
        let renderer = BoardRenderer::new(root.path());
        let spread = overlap_spread();
        let deck = fixture_deck();
        // Card "2" exists in the deck but its image file does not.
        let (codes, slot_angles) = assignment(&[("side", "2")], &[]);
        let board = renderer.compose(&deck, &spread, &codes, &slot_angles, false).unwrap();
        let img = image::load_from_memory(&board.png_bytes).unwrap().to_rgba8();
        // Placeholder background, away from the border and the label text.
        assert!(pixel_near(&img, 450, 240, Rgba([245, 240, 232, 255])));
    }

    #[test]
    fn spread_without_layout_is_refused() {
        let root = image_fixtures(&[]);
        let renderer = BoardRenderer::new(root.path());
        let mut spread = overlap_spread();
        spread.layout = None;
        let deck = fixture_deck();
        let (codes, slot_angles) = assignment(&[], &[]);
        let err = renderer
            .compose(&deck, &spread, &codes, &slot_angles, true)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoardError>(),
            Some(BoardError::LayoutUnsupported { .. })
        ));
    }

    #[test]
    fn resize_cover_center_crops() {
        let src = RgbaImage::from_fn(400, 100, |x, _| if x < 200 { RED } else { BLUE });
        let out = resize_cover(&src, 100, 180);
        assert_eq!((100, 180), out.dimensions());
        assert!(pixel_near(&out, 5, 90, RED));
        assert!(pixel_near(&out, 95, 90, BLUE));
    }

    #[test]
    fn non_quarter_angles_are_rejected() {
        let img = RgbaImage::from_pixel(4, 4, RED);
        assert!(rotate_layer(img.clone(), 45).is_err());
        assert!(rotate_layer(img, -90).is_ok());
    }

    #[test]
    fn hex_colors_parse_with_fallback() {
        assert_eq!(Rgba([255, 253, 242, 255]), parse_hex_color("#fffdf2"));
        assert_eq!(Rgba([255, 255, 255, 255]), parse_hex_color("#f2"));
        assert_eq!(Rgba([255, 255, 255, 255]), parse_hex_color("bogus"));
        assert_eq!(Rgba([255, 0, 0, 255]), parse_hex_color("#f00"));
    }
}
