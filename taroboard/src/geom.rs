//! Placement math shared by the compositor and the hit-tester.
//!
//! The compositor walks slots in ascending `(z, key)` order and paints; the
//! hit-tester walks the same slots in descending order and asks "does this
//! box contain the click?". Keeping both sides of that mirror in one module
//! is what keeps them consistent.

use crate::spreads::{Anchor, LayoutSlot, LayoutSpec, Spread};

/// Integer board dimensions after applying the layout scale.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BoardMetrics {
    /// Canvas width in pixels.
    pub canvas_w: u32,
    /// Canvas height in pixels.
    pub canvas_h: u32,
    /// Card box width in pixels, before rotation.
    pub card_w: u32,
    /// Card box height in pixels, before rotation.
    pub card_h: u32,
}

/// Compute the scaled pixel dimensions for a layout.
pub fn metrics(layout: &LayoutSpec) -> BoardMetrics {
    let scale = layout.scale;
    let px = |units: u32| (units as f64 * scale).round().max(1.0) as u32;
    BoardMetrics {
        canvas_w: px(layout.canvas.width),
        canvas_h: px(layout.canvas.height),
        card_w: px(layout.card.width),
        card_h: px(layout.card.height),
    }
}

/// Does rotating by this angle swap a card's width and height?
pub fn swaps_axes(angle: i32) -> bool {
    matches!(angle.rem_euclid(360), 90 | 270)
}

/// An axis-aligned box on the canvas, in float pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotBox {
    /// Left edge.
    pub left: f64,
    /// Top edge.
    pub top: f64,
    /// Width, after any axis swap.
    pub width: f64,
    /// Height, after any axis swap.
    pub height: f64,
}

impl SlotBox {
    /// Is the point inside this box? Edges count as inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left
            && x <= self.left + self.width
            && y >= self.top
            && y <= self.top + self.height
    }

    /// The center of this box.
    pub fn center(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// The on-canvas footprint of a slot at the given angle, or `None` when the
/// slot is missing the coordinates its anchor requires.
pub fn slot_footprint(layout: &LayoutSpec, slot: &LayoutSlot, angle: i32) -> Option<SlotBox> {
    let scale = layout.scale;
    let base_w = layout.card.width as f64 * scale;
    let base_h = layout.card.height as f64 * scale;
    let (width, height) = if swaps_axes(angle) {
        (base_h, base_w)
    } else {
        (base_w, base_h)
    };
    let (left, top) = match slot.anchor {
        Anchor::TopLeft => (slot.x? * scale, slot.y? * scale),
        Anchor::Center => (
            slot.cx? * scale - width / 2.0,
            slot.cy? * scale - height / 2.0,
        ),
    };
    Some(SlotBox { left, top, width, height })
}

/// Layout slots in paint order: ascending z, ties broken by key, so that a
/// higher z paints later and wins visually.
pub fn paint_order(layout: &LayoutSpec) -> Vec<&LayoutSlot> {
    let mut slots: Vec<&LayoutSlot> = layout.slots.iter().collect();
    slots.sort_by(|a, b| (a.z, &a.key).cmp(&(b.z, &b.key)));
    slots
}

/// Which slot does a pixel click land on? The inverse of the compositor's
/// placement: candidates are tested topmost first (descending `(z, key)`),
/// each against its footprint at the slot's *current* angle. Returns `None`
/// when nothing was hit or the spread has no absolute layout.
pub fn hit_test<'a>(spread: &'a Spread, slot_angles: &[i32], x: f64, y: f64) -> Option<&'a str> {
    let layout = spread.layout.as_ref()?;
    if !layout.is_absolute() {
        return None;
    }
    let mut candidates = paint_order(layout);
    candidates.reverse();
    for ls in candidates {
        let Some(idx) = spread.slot_index(&ls.key) else {
            continue;
        };
        let angle = slot_angles.get(idx).copied().unwrap_or(0);
        if let Some(footprint) = slot_footprint(layout, ls, angle) {
            if footprint.contains(x, y) {
                return Some(&ls.key);
            }
        }
    }
    None
}
