//! Viewport state: what part of the infinite sheet is on screen.

use serde::{Deserialize, Serialize};

use super::OffsetIndex;
use crate::types::ScreenRect;

/// Smallest zoom the viewport accepts.
const MIN_SCALE: f64 = 0.01;

/// Visible area of a sheet. Scroll positions are sheet pixels and may be
/// negative, since the sheet extends in both directions from the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    /// Sheet x at the left edge of the screen
    pub scroll_x: f64,
    /// Sheet y at the top edge of the screen
    pub scroll_y: f64,
    /// Screen width in pixels
    pub width: f64,
    /// Screen height in pixels
    pub height: f64,
    /// Zoom scale factor (1.0 = 100%)
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width,
            height,
            scale: 1.0,
        }
    }

    /// The part of the sheet on screen, in sheet pixels.
    pub fn bounds(&self) -> ScreenRect {
        ScreenRect::from_span(
            self.scroll_x,
            self.scroll_y,
            self.width / self.scale,
            self.height / self.scale,
        )
    }

    /// Visible column range (inclusive).
    pub fn visible_columns(&self, offsets: &OffsetIndex) -> (i64, i64) {
        let bounds = self.bounds();
        (
            offsets.column_index(bounds.left).index,
            offsets.column_index(bounds.right).index,
        )
    }

    /// Visible row range (inclusive).
    pub fn visible_rows(&self, offsets: &OffsetIndex) -> (i64, i64) {
        let bounds = self.bounds();
        (
            offsets.row_index(bounds.top).index,
            offsets.row_index(bounds.bottom).index,
        )
    }

    /// Convert sheet coordinates to screen coordinates
    pub fn to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.scroll_x) * self.scale,
            (y - self.scroll_y) * self.scale,
        )
    }

    /// Convert screen coordinates to sheet coordinates
    pub fn to_sheet(&self, screen_x: f64, screen_y: f64) -> (f64, f64) {
        (
            screen_x / self.scale + self.scroll_x,
            screen_y / self.scale + self.scroll_y,
        )
    }

    pub fn scroll_by(&mut self, delta_x: f64, delta_y: f64) {
        self.scroll_x += delta_x;
        self.scroll_y += delta_y;
    }

    pub fn set_scroll(&mut self, x: f64, y: f64) {
        self.scroll_x = x;
        self.scroll_y = y;
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    /// Zoom around the top-left corner. Non-finite or tiny scales are clamped.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = if scale.is_finite() {
            scale.max(MIN_SCALE)
        } else {
            1.0
        };
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_COLUMN_WIDTH, DEFAULT_ROW_HEIGHT};

    #[test]
    fn test_bounds_respect_scale() {
        let mut viewport = Viewport::new(800.0, 600.0);
        viewport.set_scale(2.0);
        let bounds = viewport.bounds();
        assert_eq!(bounds.left, 0.0);
        assert_eq!(bounds.right, 399.0);
        assert_eq!(bounds.bottom, 299.0);
    }

    #[test]
    fn test_visible_ranges_with_negative_scroll() {
        let offsets = OffsetIndex::default();
        let mut viewport = Viewport::new(DEFAULT_COLUMN_WIDTH * 4.0, DEFAULT_ROW_HEIGHT * 10.0);
        viewport.set_scroll(-DEFAULT_COLUMN_WIDTH * 2.0, -DEFAULT_ROW_HEIGHT * 5.0);
        assert_eq!(viewport.visible_columns(&offsets), (-2, 1));
        assert_eq!(viewport.visible_rows(&offsets), (-5, 4));
    }

    #[test]
    fn test_screen_sheet_roundtrip() {
        let mut viewport = Viewport::new(800.0, 600.0);
        viewport.set_scroll(150.0, -40.0);
        viewport.set_scale(1.5);
        let (sx, sy) = viewport.to_screen(300.0, 20.0);
        let (x, y) = viewport.to_sheet(sx, sy);
        assert!((x - 300.0).abs() < 1e-9);
        assert!((y - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_scale_clamps() {
        let mut viewport = Viewport::default();
        viewport.set_scale(0.0);
        assert_eq!(viewport.scale, MIN_SCALE);
        viewport.set_scale(f64::INFINITY);
        assert_eq!(viewport.scale, 1.0);
    }
}
