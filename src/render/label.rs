//! Glyph layout for a single cell.
//!
//! A label is shaped once. Afterwards it can be moved or re-aligned inside a
//! resized cell without calling the shaper again, which is what makes heading
//! drags cheap.

use std::mem::size_of;

use serde::{Deserialize, Serialize};

use super::shaper::{GlyphShaper, ShapedGlyph};
use crate::types::{CellAlign, CellVerticalAlign, CellWrap, RenderCell, ScreenRect};

/// A glyph placed in sheet pixels. `x + width` and `y + height` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlyphQuad {
    pub ch: char,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// What a heading change did to a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelAdjust {
    Unchanged,
    Moved,
    /// Wrapped text whose cell width changed; lines must be re-broken.
    NeedsLayout,
}

#[derive(Debug, Clone)]
struct Line {
    glyphs: Vec<ShapedGlyph>,
    width: f64,
}

#[derive(Debug, Clone)]
pub struct CellLabel {
    pub column: i64,
    pub row: i64,
    align: CellAlign,
    vertical_align: CellVerticalAlign,
    wrap: CellWrap,
    color: Option<String>,
    padding: f64,
    line_height: f64,
    lines: Vec<Line>,
    cell: ScreenRect,
    /// Unclipped glyphs in sheet pixels
    glyphs: Vec<GlyphQuad>,
    text_left: f64,
    text_right: f64,
    text_top: f64,
    text_bottom: f64,
    clip_left: f64,
    clip_right: f64,
}

impl CellLabel {
    /// Shape `cell` and place it inside `rect`.
    pub fn layout(
        cell: &RenderCell,
        rect: ScreenRect,
        padding: f64,
        shaper: &dyn GlyphShaper,
    ) -> Self {
        let wrap = cell.wrap.unwrap_or_default();
        let shaped = shaper.shape(&cell.value, &cell.text_style());
        let lines = if wrap == CellWrap::Wrap {
            let available = (rect.right - rect.left + 1.0 - padding * 2.0).max(0.0);
            break_lines(&shaped.glyphs, available)
        } else {
            vec![Line {
                glyphs: shaped.glyphs,
                width: shaped.width,
            }]
        };

        let mut label = Self {
            column: cell.x,
            row: cell.y,
            align: cell.align.unwrap_or_default(),
            vertical_align: cell.vertical_align.unwrap_or_default(),
            wrap,
            color: cell.text_color.clone(),
            padding,
            line_height: shaped.line_height,
            lines,
            cell: rect,
            glyphs: Vec::new(),
            text_left: rect.left,
            text_right: rect.left,
            text_top: rect.top,
            text_bottom: rect.top,
            clip_left: f64::NEG_INFINITY,
            clip_right: f64::INFINITY,
        };
        label.place();
        label
    }

    /// Recompute absolute glyph positions from the cell rectangle.
    fn place(&mut self) {
        let cell_width = self.cell.right - self.cell.left + 1.0;
        let cell_height = self.cell.bottom - self.cell.top + 1.0;
        let text_height = self.lines.len() as f64 * self.line_height;
        let top = match self.vertical_align {
            CellVerticalAlign::Top => self.cell.top + self.padding,
            CellVerticalAlign::Middle => self.cell.top + (cell_height - text_height) / 2.0,
            CellVerticalAlign::Bottom => self.cell.bottom + 1.0 - self.padding - text_height,
        };

        self.glyphs.clear();
        self.text_left = f64::INFINITY;
        self.text_right = f64::NEG_INFINITY;
        let mut y = top;
        for line in &self.lines {
            let left = match self.align {
                CellAlign::Left => self.cell.left + self.padding,
                CellAlign::Center => self.cell.left + (cell_width - line.width) / 2.0,
                CellAlign::Right => self.cell.right + 1.0 - self.padding - line.width,
            };
            for glyph in &line.glyphs {
                let quad = GlyphQuad {
                    ch: glyph.ch,
                    x: left + glyph.x,
                    y,
                    width: glyph.width,
                    height: self.line_height,
                };
                self.text_left = self.text_left.min(quad.x);
                self.text_right = self.text_right.max(quad.x + quad.width);
                self.glyphs.push(quad);
            }
            y += self.line_height;
        }
        if self.glyphs.is_empty() {
            self.text_left = self.cell.left;
            self.text_right = self.cell.left;
        }
        self.text_top = top;
        self.text_bottom = y;
    }

    pub fn wrap(&self) -> CellWrap {
        self.wrap
    }

    pub fn cell(&self) -> ScreenRect {
        self.cell
    }

    pub fn glyphs(&self) -> &[GlyphQuad] {
        &self.glyphs
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    pub fn clip(&self) -> (f64, f64) {
        (self.clip_left, self.clip_right)
    }

    /// Width the cell would need to show all text without clipping.
    pub fn content_width(&self) -> f64 {
        let widest = self.lines.iter().map(|l| l.width).fold(0.0, f64::max);
        widest + self.padding * 2.0
    }

    /// Text extends past the cell's right edge.
    pub fn overflows_right(&self) -> bool {
        self.wrap == CellWrap::Overflow && self.text_right > self.cell.right + 1.0
    }

    /// Text extends past the cell's left edge.
    pub fn overflows_left(&self) -> bool {
        self.wrap == CellWrap::Overflow && self.text_left < self.cell.left
    }

    /// Set the horizontal clip window `[left, right)`. Returns whether it moved.
    pub fn set_clip(&mut self, left: f64, right: f64) -> bool {
        let changed =
            self.clip_left.to_bits() != left.to_bits() || self.clip_right.to_bits() != right.to_bits();
        self.clip_left = left;
        self.clip_right = right;
        changed
    }

    /// Text extent after clipping, if anything remains visible.
    pub fn clipped_bounds(&self) -> Option<ScreenRect> {
        let left = self.text_left.max(self.clip_left);
        let right = self.text_right.min(self.clip_right);
        let top = self.text_top.max(self.cell.top);
        let bottom = self.text_bottom.min(self.cell.bottom + 1.0);
        if right <= left || bottom <= top {
            return None;
        }
        Some(ScreenRect::new(left, top, right - 1.0, bottom - 1.0))
    }

    /// Glyphs trimmed to the clip window and the cell's vertical extent.
    pub fn clipped_quads(&self) -> impl Iterator<Item = GlyphQuad> + '_ {
        let (clip_left, clip_right) = (self.clip_left, self.clip_right);
        let (clip_top, clip_bottom) = (self.cell.top, self.cell.bottom + 1.0);
        self.glyphs.iter().filter_map(move |quad| {
            let left = quad.x.max(clip_left);
            let right = (quad.x + quad.width).min(clip_right);
            let top = quad.y.max(clip_top);
            let bottom = (quad.y + quad.height).min(clip_bottom);
            if right <= left || bottom <= top {
                return None;
            }
            Some(GlyphQuad {
                ch: quad.ch,
                x: left,
                y: top,
                width: right - left,
                height: bottom - top,
            })
        })
    }

    fn shift(&mut self, dx: f64, dy: f64) {
        self.cell.left += dx;
        self.cell.right += dx;
        self.cell.top += dy;
        self.cell.bottom += dy;
        self.clip_left += dx;
        self.clip_right += dx;
        self.place();
    }

    fn resized(&mut self) -> LabelAdjust {
        if self.wrap == CellWrap::Wrap {
            return LabelAdjust::NeedsLayout;
        }
        self.place();
        LabelAdjust::Moved
    }

    /// Column `column` changed width by `delta`. Columns further from the
    /// origin than `column` move; `column` itself grows away from the origin.
    pub fn adjust_column(&mut self, column: i64, delta: f64) -> LabelAdjust {
        if column >= 0 {
            if self.column > column {
                self.shift(delta, 0.0);
                LabelAdjust::Moved
            } else if self.column == column {
                self.cell.right += delta;
                self.resized()
            } else {
                LabelAdjust::Unchanged
            }
        } else if self.column < column {
            self.shift(-delta, 0.0);
            LabelAdjust::Moved
        } else if self.column == column {
            self.cell.left -= delta;
            self.resized()
        } else {
            LabelAdjust::Unchanged
        }
    }

    /// Row `row` changed height by `delta`.
    pub fn adjust_row(&mut self, row: i64, delta: f64) -> LabelAdjust {
        if row >= 0 {
            if self.row > row {
                self.shift(0.0, delta);
                LabelAdjust::Moved
            } else if self.row == row {
                self.cell.bottom += delta;
                self.place();
                LabelAdjust::Moved
            } else {
                LabelAdjust::Unchanged
            }
        } else if self.row < row {
            self.shift(0.0, -delta);
            LabelAdjust::Moved
        } else if self.row == row {
            self.cell.top -= delta;
            self.place();
            LabelAdjust::Moved
        } else {
            LabelAdjust::Unchanged
        }
    }

    /// Approximate heap + inline bytes held by this label.
    pub fn estimate_memory(&self) -> usize {
        let shaped: usize = self
            .lines
            .iter()
            .map(|l| l.glyphs.capacity() * size_of::<ShapedGlyph>())
            .sum();
        size_of::<Self>()
            + shaped
            + self.glyphs.capacity() * size_of::<GlyphQuad>()
            + self.color.as_ref().map_or(0, String::capacity)
    }
}

/// Greedy line breaking at glyph boundaries.
fn break_lines(glyphs: &[ShapedGlyph], available: f64) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current: Vec<ShapedGlyph> = Vec::new();
    let mut line_start = 0.0;
    for glyph in glyphs {
        let right = glyph.x + glyph.width - line_start;
        if right > available && !current.is_empty() {
            lines.push(finish_line(std::mem::take(&mut current)));
            line_start = glyph.x;
        }
        current.push(ShapedGlyph {
            ch: glyph.ch,
            x: glyph.x - line_start,
            width: glyph.width,
        });
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(finish_line(current));
    }
    lines
}

fn finish_line(glyphs: Vec<ShapedGlyph>) -> Line {
    let width = glyphs.last().map_or(0.0, |g| g.x + g.width);
    Line { glyphs, width }
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
    use crate::render::shaper::MonospaceShaper;

    const PAD: f64 = 2.0;

    fn rect(left: f64, top: f64, width: f64, height: f64) -> ScreenRect {
        ScreenRect::from_span(left, top, width, height)
    }

    fn label(cell: &RenderCell, r: ScreenRect) -> CellLabel {
        CellLabel::layout(cell, r, PAD, &MonospaceShaper::default())
    }

    #[test]
    fn test_left_aligned_bottom_placement() {
        let l = label(&RenderCell::text(0, 0, "ab"), rect(0.0, 0.0, 100.0, 21.0));
        assert_eq!(l.glyphs().len(), 2);
        assert_eq!(l.glyphs()[0].x, PAD);
        assert_eq!(l.glyphs()[1].x, PAD + 8.0);
        // bottom aligned: 21 - 2 - 16
        assert_eq!(l.glyphs()[0].y, 3.0);
        assert!(!l.overflows_right());
    }

    #[test]
    fn test_right_and_center_alignment() {
        let mut cell = RenderCell::text(0, 0, "ab");
        cell.align = Some(CellAlign::Right);
        let l = label(&cell, rect(0.0, 0.0, 100.0, 21.0));
        assert_eq!(l.glyphs()[0].x, 100.0 - PAD - 16.0);

        cell.align = Some(CellAlign::Center);
        let l = label(&cell, rect(0.0, 0.0, 100.0, 21.0));
        assert_eq!(l.glyphs()[0].x, 42.0);
    }

    #[test]
    fn test_long_text_overflows() {
        let l = label(
            &RenderCell::text(0, 0, "x".repeat(20)),
            rect(0.0, 0.0, 100.0, 21.0),
        );
        assert!(l.overflows_right());
        assert!(!l.overflows_left());
        // unclipped: all glyphs survive
        assert_eq!(l.clipped_quads().count(), 20);
    }

    #[test]
    fn test_clip_trims_glyphs() {
        let mut l = label(
            &RenderCell::text(0, 0, "x".repeat(20)),
            rect(0.0, 0.0, 100.0, 21.0),
        );
        assert!(l.set_clip(f64::NEG_INFINITY, 100.0));
        assert!(!l.set_clip(f64::NEG_INFINITY, 100.0));
        let quads: Vec<_> = l.clipped_quads().collect();
        // glyphs start at 2, 10, ..., 90, 98 -> last one trimmed to 2px
        assert_eq!(quads.len(), 13);
        assert_eq!(quads[12].x, 98.0);
        assert_eq!(quads[12].width, 2.0);
        assert_eq!(l.clipped_bounds().unwrap().right, 99.0);
    }

    #[test]
    fn test_wrap_breaks_lines() {
        let mut cell = RenderCell::text(0, 0, "x".repeat(15));
        cell.wrap = Some(CellWrap::Wrap);
        cell.vertical_align = Some(CellVerticalAlign::Top);
        let l = label(&cell, rect(0.0, 0.0, 100.0, 60.0));
        // 96px available -> 12 glyphs per line
        assert_eq!(l.glyphs()[11].y, PAD);
        assert_eq!(l.glyphs()[12].y, PAD + 16.0);
        assert_eq!(l.glyphs()[12].x, PAD);
        assert!(!l.overflows_right());
    }

    #[test]
    fn test_adjust_column_shifts_labels_past_resized_column() {
        let mut l = label(&RenderCell::text(3, 0, "a"), rect(300.0, 0.0, 100.0, 21.0));
        assert_eq!(l.adjust_column(1, 10.0), LabelAdjust::Moved);
        assert_eq!(l.glyphs()[0].x, 312.0);
        assert_eq!(l.adjust_column(5, 10.0), LabelAdjust::Unchanged);
        assert_eq!(l.glyphs()[0].x, 312.0);
    }

    #[test]
    fn test_adjust_negative_column_shifts_away_from_origin() {
        let mut l = label(&RenderCell::text(-3, 0, "a"), rect(-300.0, 0.0, 100.0, 21.0));
        assert_eq!(l.adjust_column(-1, 10.0), LabelAdjust::Moved);
        assert_eq!(l.cell().left, -310.0);
        assert_eq!(l.adjust_column(-5, 10.0), LabelAdjust::Unchanged);
    }

    #[test]
    fn test_adjust_own_column_realigns_right_text() {
        let mut cell = RenderCell::text(0, 0, "ab");
        cell.align = Some(CellAlign::Right);
        let mut l = label(&cell, rect(0.0, 0.0, 100.0, 21.0));
        assert_eq!(l.adjust_column(0, 20.0), LabelAdjust::Moved);
        assert_eq!(l.glyphs()[0].x, 120.0 - PAD - 16.0);
    }

    #[test]
    fn test_adjust_wrapped_column_needs_layout() {
        let mut cell = RenderCell::text(0, 0, "ab");
        cell.wrap = Some(CellWrap::Wrap);
        let mut l = label(&cell, rect(0.0, 0.0, 100.0, 21.0));
        assert_eq!(l.adjust_column(0, 20.0), LabelAdjust::NeedsLayout);
    }

    #[test]
    fn test_adjust_row_moves_down() {
        let mut l = label(&RenderCell::text(0, 2, "a"), rect(0.0, 42.0, 100.0, 21.0));
        let before = l.glyphs()[0].y;
        assert_eq!(l.adjust_row(0, 5.0), LabelAdjust::Moved);
        assert_eq!(l.glyphs()[0].y, before + 5.0);
    }
}
