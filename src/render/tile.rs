//! One bucket of pre-rendered cell text.
//!
//! State machine:
//! `Unloaded -> (accept_content) -> Dirty -> (derive_layout) -> DirtyBuffers
//! -> (upload_buffers) -> Loaded -> (unload) -> Unloaded`.
//! Heading adjustments move `Loaded -> DirtyBuffers` without re-deriving.

use std::collections::{BTreeMap, BTreeSet};
use std::mem::size_of;

use serde::{Deserialize, Serialize};

use super::label::{CellLabel, GlyphQuad, LabelAdjust};
use super::shaper::GlyphShaper;
use crate::layout::OffsetIndex;
use crate::types::{CellRect, CellWrap, RenderCell, ScreenRect, TileKey};

/// Columns holding text, per logical row, across one bucket row.
pub type ContentColumns = BTreeMap<i64, BTreeSet<i64>>;

/// Glyphs sharing one text color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub quads: Vec<GlyphQuad>,
}

/// Glyph buffer handed to the presentation layer for one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileBuffers {
    pub key: TileKey,
    pub runs: Vec<TextRun>,
    /// Extent of all visible glyphs, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<ScreenRect>,
}

impl TileBuffers {
    pub fn glyph_count(&self) -> usize {
        self.runs.iter().map(|r| r.quads.len()).sum()
    }

    fn estimate_memory(&self) -> usize {
        size_of::<Self>()
            + self
                .runs
                .iter()
                .map(|r| {
                    size_of::<TextRun>()
                        + r.quads.capacity() * size_of::<GlyphQuad>()
                        + r.color.as_ref().map_or(0, String::capacity)
                })
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TileState {
    Unloaded,
    Dirty,
    DirtyBuffers,
    Loaded,
}

/// A size change of one column or row, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadingDelta {
    Column { column: i64, delta: f64 },
    Row { row: i64, delta: f64 },
}

impl HeadingDelta {
    pub fn is_zero(&self) -> bool {
        match *self {
            HeadingDelta::Column { delta, .. } | HeadingDelta::Row { delta, .. } => {
                delta.abs() < f64::EPSILON
            }
        }
    }
}

#[derive(Debug)]
pub struct Tile {
    key: TileKey,
    cell_rect: CellRect,
    /// Raw content keyed by `(row, column)`; `None` until fetched
    cells: Option<BTreeMap<(i64, i64), RenderCell>>,
    labels: BTreeMap<(i64, i64), CellLabel>,
    buffers: Option<TileBuffers>,
    view_rectangle: ScreenRect,
    /// `view_rectangle` grown by text overflowing the bucket
    visible_rectangle: ScreenRect,
    dirty: bool,
    dirty_buffers: bool,
    loaded: bool,
    /// Highest content sequence seen
    sequence: u64,
    pending_request: Option<u64>,
}

impl Tile {
    pub fn new(key: TileKey, cell_rect: CellRect, offsets: &OffsetIndex) -> Self {
        let view = offsets.screen_rectangle(
            cell_rect.x,
            cell_rect.y,
            cell_rect.width,
            cell_rect.height,
        );
        Self {
            key,
            cell_rect,
            cells: None,
            labels: BTreeMap::new(),
            buffers: None,
            view_rectangle: view,
            visible_rectangle: view,
            dirty: false,
            dirty_buffers: false,
            loaded: false,
            sequence: 0,
            pending_request: None,
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn cell_rect(&self) -> CellRect {
        self.cell_rect
    }

    pub fn view_rectangle(&self) -> ScreenRect {
        self.view_rectangle
    }

    pub fn visible_rectangle(&self) -> ScreenRect {
        self.visible_rectangle
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_dirty_buffers(&self) -> bool {
        self.dirty_buffers
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn state(&self) -> TileState {
        if self.dirty {
            TileState::Dirty
        } else if self.dirty_buffers {
            TileState::DirtyBuffers
        } else if self.loaded {
            TileState::Loaded
        } else {
            TileState::Unloaded
        }
    }

    pub fn needs_work(&self) -> bool {
        self.dirty || self.dirty_buffers || !self.loaded
    }

    /// Content must be fetched before layout can run.
    pub fn needs_content(&self) -> bool {
        self.cells.is_none()
    }

    pub fn pending_request(&self) -> Option<u64> {
        self.pending_request
    }

    pub fn set_pending_request(&mut self, request_id: Option<u64>) {
        self.pending_request = request_id;
    }

    pub fn labels(&self) -> impl Iterator<Item = &CellLabel> {
        self.labels.values()
    }

    pub fn has_labels(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn buffers(&self) -> Option<&TileBuffers> {
        self.buffers.as_ref()
    }

    /// `view_rectangle` from the current offsets.
    pub fn compute_rectangle(&mut self, offsets: &OffsetIndex) {
        self.view_rectangle = offsets.screen_rectangle(
            self.cell_rect.x,
            self.cell_rect.y,
            self.cell_rect.width,
            self.cell_rect.height,
        );
        self.update_visible_rectangle();
    }

    fn update_visible_rectangle(&mut self) {
        self.visible_rectangle = self
            .labels
            .values()
            .filter_map(CellLabel::clipped_bounds)
            .fold(self.view_rectangle, |acc, b| acc.union(&b));
    }

    /// Replace content. Returns `false` (and changes nothing) when `sequence`
    /// is older than what the tile already holds.
    pub fn accept_content(&mut self, sequence: u64, cells: Vec<RenderCell>) -> bool {
        if sequence < self.sequence {
            return false;
        }
        let rect = self.cell_rect;
        self.sequence = sequence;
        self.cells = Some(
            cells
                .into_iter()
                .filter(|c| rect.contains(c.x, c.y))
                .map(|c| ((c.y, c.x), c))
                .collect(),
        );
        self.dirty = true;
        true
    }

    /// Content changed upstream at `sequence`. The old glyphs stay on screen
    /// until the new content arrives.
    pub fn invalidate_content(&mut self, sequence: u64) {
        self.sequence = self.sequence.max(sequence);
        self.cells = None;
        self.dirty = true;
    }

    fn make_label(
        cell: &RenderCell,
        offsets: &OffsetIndex,
        shaper: &dyn GlyphShaper,
        padding: f64,
    ) -> Option<CellLabel> {
        if cell.value.is_empty() {
            return None;
        }
        let rect = offsets.cell_rect(cell.x, cell.y);
        Some(CellLabel::layout(cell, rect, padding, shaper))
    }

    /// Build glyph layout for every cell.
    pub fn derive_layout(&mut self, offsets: &OffsetIndex, shaper: &dyn GlyphShaper, padding: f64) {
        self.labels = self
            .cells
            .iter()
            .flat_map(BTreeMap::iter)
            .filter_map(|(pos, cell)| {
                Self::make_label(cell, offsets, shaper, padding).map(|label| (*pos, label))
            })
            .collect();
        self.dirty = false;
        self.dirty_buffers = true;
        self.update_visible_rectangle();
    }

    /// Re-derive only the labels of one logical row.
    pub fn relayout_row(
        &mut self,
        row: i64,
        offsets: &OffsetIndex,
        shaper: &dyn GlyphShaper,
        padding: f64,
    ) {
        let Some(cells) = &self.cells else {
            return;
        };
        self.labels.retain(|(r, _), _| *r != row);
        for (pos, cell) in cells.range((row, i64::MIN)..=(row, i64::MAX)) {
            if let Some(label) = Self::make_label(cell, offsets, shaper, padding) {
                self.labels.insert(*pos, label);
            }
        }
        self.dirty_buffers = true;
    }

    /// `(row, column)` of every cell with text.
    pub fn content_positions(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.labels.keys().copied()
    }

    /// Clip every label against the nearest content on either side. Returns
    /// whether any clip window moved.
    pub fn compute_clipping(&mut self, offsets: &OffsetIndex, content: &ContentColumns) -> bool {
        let mut changed = false;
        for label in self.labels.values_mut() {
            let (left, right) = match label.wrap() {
                CellWrap::Overflow => {
                    let row = content.get(&label.row);
                    let next = row.and_then(|cols| cols.range(label.column + 1..).next());
                    let prev = row.and_then(|cols| cols.range(..label.column).next_back());
                    (
                        prev.map_or(f64::NEG_INFINITY, |&c| offsets.column_placement(c + 1)),
                        next.map_or(f64::INFINITY, |&c| offsets.column_placement(c)),
                    )
                }
                CellWrap::Clip | CellWrap::Wrap => {
                    let cell = label.cell();
                    (cell.left, cell.right + 1.0)
                }
            };
            changed |= label.set_clip(left, right);
        }
        if changed {
            self.dirty_buffers = true;
        }
        self.update_visible_rectangle();
        changed
    }

    /// Publish the clipped glyphs.
    pub fn upload_buffers(&mut self) -> TileBuffers {
        let mut runs: BTreeMap<Option<&str>, Vec<GlyphQuad>> = BTreeMap::new();
        let mut bounds: Option<ScreenRect> = None;
        for label in self.labels.values() {
            let quads = runs.entry(label.color()).or_default();
            quads.extend(label.clipped_quads());
            if let Some(b) = label.clipped_bounds() {
                bounds = Some(bounds.map_or(b, |acc| acc.union(&b)));
            }
        }
        let buffers = TileBuffers {
            key: self.key,
            runs: runs
                .into_iter()
                .filter(|(_, quads)| !quads.is_empty())
                .map(|(color, quads)| TextRun {
                    color: color.map(str::to_string),
                    quads,
                })
                .collect(),
            bounds,
        };
        self.buffers = Some(buffers.clone());
        self.dirty_buffers = false;
        self.loaded = true;
        buffers
    }

    /// Move cached glyphs for a heading size change. Returns whether any label
    /// was affected. Wrapped labels in a resized column flag the tile dirty so
    /// their lines are re-broken.
    pub fn adjust_headings(&mut self, delta: HeadingDelta) -> bool {
        if delta.is_zero() {
            return false;
        }
        let mut affected = false;
        for label in self.labels.values_mut() {
            let outcome = match delta {
                HeadingDelta::Column { column, delta } => label.adjust_column(column, delta),
                HeadingDelta::Row { row, delta } => label.adjust_row(row, delta),
            };
            match outcome {
                LabelAdjust::Unchanged => {}
                LabelAdjust::Moved => affected = true,
                LabelAdjust::NeedsLayout => {
                    affected = true;
                    if self.cells.is_some() {
                        self.dirty = true;
                    }
                }
            }
        }
        if affected {
            self.dirty_buffers = true;
        }
        affected
    }

    /// Drop content, glyphs and buffers. Safe to call repeatedly.
    pub fn unload(&mut self) {
        if !self.loaded && self.cells.is_none() && self.labels.is_empty() {
            return;
        }
        self.cells = None;
        self.labels.clear();
        self.buffers = None;
        self.dirty = false;
        self.dirty_buffers = false;
        self.loaded = false;
        self.visible_rectangle = self.view_rectangle;
    }

    /// Approximate bytes this tile keeps resident.
    pub fn estimate_memory(&self) -> usize {
        let cells: usize = self.cells.as_ref().map_or(0, |cells| {
            cells
                .values()
                .map(|c| size_of::<RenderCell>() + c.value.capacity())
                .sum()
        });
        let labels: usize = self.labels.values().map(CellLabel::estimate_memory).sum();
        size_of::<Self>()
            + cells
            + labels
            + self.buffers.as_ref().map_or(0, TileBuffers::estimate_memory)
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
    use crate::render::shaper::MonospaceShaper;

    const PAD: f64 = 2.0;

    fn tile(offsets: &OffsetIndex) -> Tile {
        let key = TileKey::new(0, 0);
        Tile::new(key, key.cell_rect(15, 30), offsets)
    }

    fn render(t: &mut Tile, offsets: &OffsetIndex) -> TileBuffers {
        t.derive_layout(offsets, &MonospaceShaper::default(), PAD);
        let content: ContentColumns = t.content_positions().fold(
            ContentColumns::new(),
            |mut acc, (row, col)| {
                acc.entry(row).or_default().insert(col);
                acc
            },
        );
        t.compute_clipping(offsets, &content);
        t.upload_buffers()
    }

    #[test]
    fn test_lifecycle() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        assert_eq!(t.state(), TileState::Unloaded);
        assert!(t.needs_work());
        assert!(t.needs_content());

        assert!(t.accept_content(1, vec![RenderCell::text(0, 0, "hi")]));
        assert_eq!(t.state(), TileState::Dirty);

        t.derive_layout(&offsets, &MonospaceShaper::default(), PAD);
        assert_eq!(t.state(), TileState::DirtyBuffers);

        let buffers = t.upload_buffers();
        assert_eq!(t.state(), TileState::Loaded);
        assert!(!t.needs_work());
        assert_eq!(buffers.glyph_count(), 2);

        t.unload();
        assert_eq!(t.state(), TileState::Unloaded);
        assert!(t.buffers().is_none());
    }

    #[test]
    fn test_view_rectangle_from_offsets() {
        let mut offsets = OffsetIndex::default();
        let t = tile(&offsets);
        assert_eq!(t.view_rectangle(), ScreenRect::new(0.0, 0.0, 1499.0, 629.0));

        offsets.set_column_width(3, 150.0).unwrap();
        let mut t = tile(&offsets);
        t.compute_rectangle(&offsets);
        assert_eq!(t.view_rectangle().right, 1549.0);
    }

    #[test]
    fn test_stale_content_rejected() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        assert!(t.accept_content(5, vec![RenderCell::text(0, 0, "new")]));
        render(&mut t, &offsets);
        assert!(!t.accept_content(4, vec![RenderCell::text(0, 0, "old")]));
        assert_eq!(t.sequence(), 5);
        assert_eq!(t.state(), TileState::Loaded);
        assert_eq!(t.labels().count(), 1);
    }

    #[test]
    fn test_content_outside_bucket_ignored() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        t.accept_content(
            1,
            vec![RenderCell::text(0, 0, "in"), RenderCell::text(15, 0, "out")],
        );
        render(&mut t, &offsets);
        assert_eq!(t.labels().count(), 1);
    }

    #[test]
    fn test_invalidate_keeps_old_buffers() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        t.accept_content(1, vec![RenderCell::text(0, 0, "hi")]);
        render(&mut t, &offsets);
        t.invalidate_content(2);
        assert_eq!(t.state(), TileState::Dirty);
        assert!(t.needs_content());
        assert!(t.buffers().is_some());
        assert!(!t.accept_content(1, vec![]));
        assert!(t.accept_content(2, vec![]));
    }

    #[test]
    fn test_unload_is_idempotent() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        t.accept_content(1, vec![RenderCell::text(0, 0, "hi")]);
        render(&mut t, &offsets);
        t.unload();
        let memory = t.estimate_memory();
        t.unload();
        assert_eq!(t.state(), TileState::Unloaded);
        assert_eq!(t.estimate_memory(), memory);
    }

    #[test]
    fn test_adjust_zero_delta_is_noop() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        t.accept_content(1, vec![RenderCell::text(3, 0, "hi")]);
        render(&mut t, &offsets);
        assert!(!t.adjust_headings(HeadingDelta::Column {
            column: 0,
            delta: 0.0
        }));
        assert_eq!(t.state(), TileState::Loaded);
    }

    #[test]
    fn test_adjust_moves_to_dirty_buffers() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        t.accept_content(1, vec![RenderCell::text(3, 0, "hi")]);
        render(&mut t, &offsets);
        assert!(t.adjust_headings(HeadingDelta::Column {
            column: 1,
            delta: 10.0
        }));
        assert_eq!(t.state(), TileState::DirtyBuffers);
        let buffers = t.upload_buffers();
        assert_eq!(buffers.runs[0].quads[0].x, 312.0);
        // column to the right of the label does not move it
        assert!(!t.adjust_headings(HeadingDelta::Column {
            column: 9,
            delta: 10.0
        }));
    }

    #[test]
    fn test_overflow_clipped_at_next_content() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        t.accept_content(
            1,
            vec![
                RenderCell::text(0, 0, "x".repeat(30)),
                RenderCell::text(2, 0, "y"),
            ],
        );
        let buffers = render(&mut t, &offsets);
        let xs: usize = buffers
            .runs
            .iter()
            .flat_map(|r| &r.quads)
            .filter(|q| q.ch == 'x')
            .count();
        // 2..200 holds 25 glyph starts at 8px
        assert_eq!(xs, 25);
        assert!(buffers
            .runs
            .iter()
            .flat_map(|r| &r.quads)
            .all(|q| q.ch != 'x' || q.x + q.width <= 200.0));
    }

    #[test]
    fn test_clip_mode_stays_in_cell() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        let mut cell = RenderCell::text(0, 0, "x".repeat(30));
        cell.wrap = Some(CellWrap::Clip);
        t.accept_content(1, vec![cell]);
        let buffers = render(&mut t, &offsets);
        assert_eq!(buffers.bounds.unwrap().right, 99.0);
    }

    #[test]
    fn test_runs_grouped_by_color() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        let mut red = RenderCell::text(0, 1, "r");
        red.text_color = Some("#ff0000".to_string());
        t.accept_content(1, vec![RenderCell::text(0, 0, "a"), red]);
        let buffers = render(&mut t, &offsets);
        assert_eq!(buffers.runs.len(), 2);
    }

    #[test]
    fn test_memory_grows_with_content() {
        let offsets = OffsetIndex::default();
        let mut t = tile(&offsets);
        let empty = t.estimate_memory();
        t.accept_content(1, vec![RenderCell::text(0, 0, "hello")]);
        render(&mut t, &offsets);
        assert!(t.estimate_memory() > empty);
    }
}
