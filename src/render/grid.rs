//! All tiles of one sheet, plus the scheduler that decides what to render next.
//!
//! Each call to [`TileGrid::schedule_next`] performs exactly one unit of work:
//! a batch of pending heading deltas, one tile, or one dirty row. Selection
//! only iterates ordered maps and breaks ties by key, so the same state always
//! yields the same choice.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::shaper::GlyphShaper;
use super::tile::{ContentColumns, HeadingDelta, Tile, TileBuffers};
use crate::config::RenderConfig;
use crate::error::Result;
use crate::layout::{HeadingResize, OffsetIndex};
use crate::messages::{CellsRequest, CellsResponse};
use crate::types::{CellRect, OffsetsData, ScreenRect, SheetId, SheetInfo, TileKey};

/// Upper bound on tiles created by a single content change or bounds update.
/// Larger ranges only invalidate tiles that already exist.
const MAX_TILES_PER_CHANGE: i64 = 4096;

/// Outcome of the pure selection step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    /// Tile to process, and whether it is on screen
    pub next: Option<(TileKey, bool)>,
    /// Loaded off-screen tile to unload first
    pub evict: Option<TileKey>,
}

/// What processing one tile produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TileWork {
    /// Content must be requested from the engine.
    Fetch(CellsRequest),
    /// Fresh buffers for the presentation layer.
    Rendered(TileBuffers),
    /// Nothing to do right now.
    Skipped,
}

/// One unit of scheduler work.
#[derive(Debug, Clone, PartialEq)]
pub enum Scheduled {
    /// Pending heading deltas were applied to every tile.
    Headings { columns: usize, rows: usize },
    Tile {
        key: TileKey,
        visible: bool,
        work: TileWork,
        evicted: Option<TileKey>,
    },
    /// A dirty row was re-laid out and re-clipped.
    Row { row: i64, uploads: Vec<TileBuffers> },
    Idle,
}

impl Scheduled {
    pub fn is_idle(&self) -> bool {
        matches!(self, Scheduled::Idle)
    }

    /// Work was done on a tile inside the viewport.
    pub fn is_visible(&self) -> bool {
        matches!(self, Scheduled::Tile { visible: true, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Heading {
    Column(i64),
    Row(i64),
}

pub struct TileGrid {
    sheet_id: SheetId,
    config: RenderConfig,
    offsets: OffsetIndex,
    shaper: Rc<dyn GlyphShaper>,
    tiles: BTreeMap<TileKey, Tile>,
    /// hash_y -> hash_x of every tile in that bucket row
    row_index: BTreeMap<i64, BTreeSet<i64>>,
    dirty_rows: BTreeSet<i64>,
    dirty_column_headings: BTreeMap<i64, f64>,
    dirty_row_headings: BTreeMap<i64, f64>,
    /// `None` while the sheet is not on screen
    viewport: Option<ScreenRect>,
    next_request_id: u64,
}

impl TileGrid {
    /// Grid for `info`. Malformed offsets are logged and replaced by defaults.
    pub fn new(info: &SheetInfo, config: RenderConfig, shaper: Rc<dyn GlyphShaper>) -> Self {
        let mut offsets = OffsetIndex::from_config(&config);
        if let Err(e) = offsets.load(&info.offsets) {
            warn!(sheet = %info.sheet_id, "Offsets rejected: {}", e);
        }
        let mut grid = Self {
            sheet_id: info.sheet_id.clone(),
            config,
            offsets,
            shaper,
            tiles: BTreeMap::new(),
            row_index: BTreeMap::new(),
            dirty_rows: BTreeSet::new(),
            dirty_column_headings: BTreeMap::new(),
            dirty_row_headings: BTreeMap::new(),
            viewport: None,
            next_request_id: 1,
        };
        if let Some(bounds) = info.bounds {
            grid.set_bounds(bounds);
        }
        grid
    }

    pub fn sheet_id(&self) -> &SheetId {
        &self.sheet_id
    }

    pub fn offsets(&self) -> &OffsetIndex {
        &self.offsets
    }

    pub fn viewport(&self) -> Option<ScreenRect> {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: ScreenRect) {
        self.viewport = Some(viewport);
    }

    /// Take the sheet off screen. Every tile then counts as off-screen and
    /// work proceeds in bucket key order.
    pub fn clear_viewport(&mut self) {
        self.viewport = None;
    }

    pub fn tile(&self, key: TileKey) -> Option<&Tile> {
        self.tiles.get(&key)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tiles in bucket row `hash_y`, left to right.
    pub fn tiles_in_row(&self, hash_y: i64) -> Vec<TileKey> {
        self.row_index
            .get(&hash_y)
            .map(|xs| xs.iter().map(|&x| TileKey::new(x, hash_y)).collect())
            .unwrap_or_default()
    }

    fn key_for(&self, column: i64, row: i64) -> TileKey {
        TileKey::for_cell(
            column,
            row,
            self.config.bucket_width,
            self.config.bucket_height,
        )
    }

    fn ensure_tile(&mut self, key: TileKey) -> &mut Tile {
        let (bucket_width, bucket_height) = (self.config.bucket_width, self.config.bucket_height);
        let offsets = &self.offsets;
        let row_index = &mut self.row_index;
        self.tiles.entry(key).or_insert_with(|| {
            trace!("Creating tile {}", key);
            row_index.entry(key.hash_y).or_default().insert(key.hash_x);
            Tile::new(key, key.cell_rect(bucket_width, bucket_height), offsets)
        })
    }

    /// Tile holding the cell at `(column, row)`, created if absent.
    pub fn get_or_create(&mut self, column: i64, row: i64) -> &mut Tile {
        let key = self.key_for(column, row);
        self.ensure_tile(key)
    }

    /// Bucket keys covering `rect`, or `None` when there are too many to create.
    fn keys_covering(&self, rect: CellRect) -> Option<Vec<TileKey>> {
        if rect.is_empty() {
            return Some(Vec::new());
        }
        let first = self.key_for(rect.x, rect.y);
        let last = self.key_for(rect.right(), rect.bottom());
        let across = last.hash_x.saturating_sub(first.hash_x).saturating_add(1);
        let down = last.hash_y.saturating_sub(first.hash_y).saturating_add(1);
        if across.saturating_mul(down) > MAX_TILES_PER_CHANGE {
            return None;
        }
        Some(
            (first.hash_y..=last.hash_y)
                .flat_map(|y| (first.hash_x..=last.hash_x).map(move |x| TileKey::new(x, y)))
                .collect(),
        )
    }

    fn existing_keys_in(&self, rect: CellRect) -> Vec<TileKey> {
        let first = self.key_for(rect.x, rect.y);
        let last = self.key_for(rect.right(), rect.bottom());
        self.tiles
            .keys()
            .filter(|k| {
                (first.hash_x..=last.hash_x).contains(&k.hash_x)
                    && (first.hash_y..=last.hash_y).contains(&k.hash_y)
            })
            .copied()
            .collect()
    }

    /// Create every tile covering the sheet's content bounds.
    pub fn set_bounds(&mut self, bounds: CellRect) {
        match self.keys_covering(bounds) {
            Some(keys) => {
                for key in keys {
                    self.ensure_tile(key);
                }
            }
            None => warn!(
                sheet = %self.sheet_id,
                "Bounds {:?} span too many tiles; creating on demand", bounds
            ),
        }
    }

    /// Content in `rect` changed upstream at `sequence`.
    pub fn cells_changed(&mut self, rect: CellRect, sequence: u64) {
        let keys = match self.keys_covering(rect) {
            Some(keys) => keys,
            None => self.existing_keys_in(rect),
        };
        for key in keys {
            self.ensure_tile(key).invalidate_content(sequence);
        }
    }

    /// Content (requested or pushed) arrived. Returns whether it was applied.
    pub fn receive_cells(&mut self, response: CellsResponse) -> bool {
        let CellsResponse {
            request_id,
            key,
            sequence,
            result,
            ..
        } = response;
        let tile = self.ensure_tile(key);
        if request_id.is_some() && tile.pending_request() == request_id {
            tile.set_pending_request(None);
        }
        match result {
            Ok(cells) => {
                let accepted = tile.accept_content(sequence, cells);
                if !accepted {
                    debug!(
                        "Discarding stale cells for tile {} (sequence {} < {})",
                        key,
                        sequence,
                        tile.sequence()
                    );
                }
                accepted
            }
            Err(e) => {
                warn!(sheet = %self.sheet_id, "Fetching tile {} failed: {}", key, e);
                false
            }
        }
    }

    /// Replace all offsets. Every tile is re-laid out against the new sizes.
    pub fn load_offsets(&mut self, data: &OffsetsData) -> Result<()> {
        let loaded = self.offsets.load(data);
        self.dirty_column_headings.clear();
        self.dirty_row_headings.clear();
        for tile in self.tiles.values_mut() {
            tile.compute_rectangle(&self.offsets);
            if tile.has_labels() && !tile.needs_content() {
                tile.derive_layout(&self.offsets, self.shaper.as_ref(), self.config.cell_padding);
            }
        }
        self.reclip_all();
        loaded
    }

    pub fn mark_column_heading_dirty(&mut self, column: i64, delta: f64) {
        *self.dirty_column_headings.entry(column).or_insert(0.0) += delta;
    }

    pub fn mark_row_heading_dirty(&mut self, row: i64, delta: f64) {
        *self.dirty_row_headings.entry(row).or_insert(0.0) += delta;
    }

    pub fn mark_row_dirty(&mut self, row: i64) {
        self.dirty_rows.insert(row);
    }

    pub fn pending_column_delta(&self, column: i64) -> Option<f64> {
        self.dirty_column_headings.get(&column).copied()
    }

    pub fn pending_row_delta(&self, row: i64) -> Option<f64> {
        self.dirty_row_headings.get(&row).copied()
    }

    pub fn has_pending_headings(&self) -> bool {
        !self.dirty_column_headings.is_empty() || !self.dirty_row_headings.is_empty()
    }

    pub fn dirty_rows(&self) -> impl Iterator<Item = i64> + '_ {
        self.dirty_rows.iter().copied()
    }

    fn heading_size(&self, heading: Heading) -> f64 {
        match heading {
            Heading::Column(c) => self.offsets.column_width(c),
            Heading::Row(r) => self.offsets.row_height(r),
        }
    }

    fn record_heading_change(&mut self, heading: Heading, before: f64) {
        let delta = self.heading_size(heading) - before;
        if delta.abs() < f64::EPSILON {
            return;
        }
        match heading {
            Heading::Column(c) => self.mark_column_heading_dirty(c, delta),
            Heading::Row(r) => self.mark_row_heading_dirty(r, delta),
        }
    }

    /// Set a column width and queue the resulting glyph shift.
    pub fn resize_column(&mut self, column: i64, width: f64) -> Result<()> {
        let before = self.offsets.column_width(column);
        self.offsets.set_column_width(column, width)?;
        self.record_heading_change(Heading::Column(column), before);
        Ok(())
    }

    /// Set a row height and queue the resulting glyph shift.
    pub fn resize_row(&mut self, row: i64, height: f64) -> Result<()> {
        let before = self.offsets.row_height(row);
        self.offsets.set_row_height(row, height)?;
        self.record_heading_change(Heading::Row(row), before);
        Ok(())
    }

    /// Start, update or cancel a drag resize.
    pub fn set_heading_resize(&mut self, resizing: Option<HeadingResize>) {
        let touched: BTreeSet<Heading> = [self.offsets.heading_resize(), resizing]
            .into_iter()
            .flatten()
            .map(|r| match r {
                HeadingResize::Column { column, .. } => Heading::Column(column),
                HeadingResize::Row { row, .. } => Heading::Row(row),
            })
            .collect();
        let before: Vec<(Heading, f64)> = touched
            .into_iter()
            .map(|h| (h, self.heading_size(h)))
            .collect();
        self.offsets.set_heading_resize(resizing);
        for (heading, size) in before {
            self.record_heading_change(heading, size);
        }
    }

    /// Make the active drag resize permanent. Positions do not move.
    pub fn commit_heading_resize(&mut self) -> Result<Option<HeadingResize>> {
        self.offsets.commit_heading_resize()
    }

    /// Apply every pending heading delta to cached glyphs, then refresh tile
    /// rectangles and clipping.
    fn apply_headings(&mut self) -> (usize, usize) {
        let columns = std::mem::take(&mut self.dirty_column_headings);
        let rows = std::mem::take(&mut self.dirty_row_headings);
        let deltas = columns
            .iter()
            .map(|(&column, &delta)| HeadingDelta::Column { column, delta })
            .chain(
                rows.iter()
                    .map(|(&row, &delta)| HeadingDelta::Row { row, delta }),
            );
        for delta in deltas {
            for tile in self.tiles.values_mut() {
                tile.adjust_headings(delta);
            }
        }
        for tile in self.tiles.values_mut() {
            tile.compute_rectangle(&self.offsets);
        }
        self.reclip_all();
        (columns.len(), rows.len())
    }

    fn reclip_all(&mut self) {
        let rows_with_labels: BTreeSet<i64> = self
            .tiles
            .values()
            .filter(|t| t.has_labels())
            .map(|t| t.key().hash_y)
            .collect();
        for hash_y in rows_with_labels {
            self.reclip_row(hash_y);
        }
    }

    /// Columns with text per logical row, across bucket row `hash_y`.
    fn content_columns(&self, hash_y: i64) -> ContentColumns {
        let mut content = ContentColumns::new();
        for key in self.tiles_in_row(hash_y) {
            if let Some(tile) = self.tiles.get(&key) {
                for (row, column) in tile.content_positions() {
                    content.entry(row).or_default().insert(column);
                }
            }
        }
        content
    }

    fn reclip_row(&mut self, hash_y: i64) {
        let content = self.content_columns(hash_y);
        for key in self.tiles_in_row(hash_y) {
            if let Some(tile) = self.tiles.get_mut(&key) {
                if tile.has_labels() {
                    tile.compute_clipping(&self.offsets, &content);
                }
            }
        }
    }

    /// Re-clip the nearest tiles with text on either side of `key`. A
    /// neighbour whose clip window moved becomes `DirtyBuffers`.
    fn mark_neighbors(&mut self, key: TileKey, content: &ContentColumns) {
        let Some(xs) = self.row_index.get(&key.hash_y) else {
            return;
        };
        let with_labels = |x: &&i64| {
            self.tiles
                .get(&TileKey::new(**x, key.hash_y))
                .is_some_and(Tile::has_labels)
        };
        let prev = xs.range(..key.hash_x).rev().find(with_labels).copied();
        let next = xs.range(key.hash_x + 1..).find(with_labels).copied();
        for x in [prev, next].into_iter().flatten() {
            if let Some(tile) = self.tiles.get_mut(&TileKey::new(x, key.hash_y)) {
                if tile.compute_clipping(&self.offsets, content) {
                    trace!("Neighbour {} of {} re-clipped", tile.key(), key);
                }
            }
        }
    }

    /// Bytes held by loaded tiles.
    pub fn memory_usage(&self) -> usize {
        self.tiles
            .values()
            .filter(|t| t.is_loaded())
            .map(Tile::estimate_memory)
            .sum()
    }

    /// Choose the next tile to process and the tile to evict, without mutating.
    /// Without a viewport nothing is visible and all distances are equal.
    pub fn select(&self, viewport: Option<ScreenRect>) -> Selection {
        let on_screen =
            |tile: &Tile| viewport.is_some_and(|v| tile.visible_rectangle().intersects(&v));
        let distance_to =
            |tile: &Tile| viewport.map_or(0.0, |v| tile.view_rectangle().distance_squared(&v));

        let mut visible: Option<TileKey> = None;
        let mut offscreen: Option<(TileKey, f64)> = None;
        for (key, tile) in &self.tiles {
            if !tile.needs_work() || tile.pending_request().is_some() {
                continue;
            }
            if on_screen(tile) {
                if visible.map_or(true, |v| (key.hash_y, key.hash_x) < (v.hash_y, v.hash_x)) {
                    visible = Some(*key);
                }
            } else {
                let distance = distance_to(tile);
                if offscreen.map_or(true, |(_, d)| distance.total_cmp(&d).is_lt()) {
                    offscreen = Some((*key, distance));
                }
            }
        }

        let mut evict: Option<(TileKey, f64)> = None;
        if self.memory_usage() > self.config.memory_budget {
            for (key, tile) in &self.tiles {
                if !tile.is_loaded() || on_screen(tile) {
                    continue;
                }
                let distance = distance_to(tile);
                if evict.map_or(true, |(_, d)| distance.total_cmp(&d).is_gt()) {
                    evict = Some((*key, distance));
                }
            }
        }

        let next = match (visible, offscreen) {
            (Some(key), _) => Some((key, true)),
            // prefetch only when it beats the tile it would displace
            (None, Some((key, distance))) => match evict {
                Some((_, evict_distance)) if distance.total_cmp(&evict_distance).is_ge() => None,
                _ => Some((key, false)),
            },
            (None, None) => None,
        };
        Selection {
            next,
            evict: next.and(evict.map(|(key, _)| key)),
        }
    }

    /// Perform one unit of work.
    pub fn schedule_next(&mut self) -> Scheduled {
        if self.has_pending_headings() {
            let (columns, rows) = self.apply_headings();
            trace!(sheet = %self.sheet_id, columns, rows, "Applied heading deltas");
            return Scheduled::Headings { columns, rows };
        }

        let selection = self.select(self.viewport);
        if let Some((key, visible)) = selection.next {
            if let Some(evict) = selection.evict {
                debug!(sheet = %self.sheet_id, "Evicting tile {} (memory {})", evict, self.memory_usage());
                if let Some(tile) = self.tiles.get_mut(&evict) {
                    tile.unload();
                }
            }
            trace!(sheet = %self.sheet_id, visible, "Processing tile {}", key);
            let work = self.process_tile(key);
            return Scheduled::Tile {
                key,
                visible,
                work,
                evicted: selection.evict,
            };
        }

        if let Some(row) = self.dirty_rows.pop_first() {
            let uploads = self.process_row(row);
            return Scheduled::Row { row, uploads };
        }
        Scheduled::Idle
    }

    /// Advance one tile through its state machine.
    pub fn process_tile(&mut self, key: TileKey) -> TileWork {
        let Some(tile) = self.tiles.get_mut(&key) else {
            return TileWork::Skipped;
        };
        if tile.needs_content() {
            if tile.pending_request().is_some() {
                return TileWork::Skipped;
            }
            let request_id = self.next_request_id;
            self.next_request_id += 1;
            tile.set_pending_request(Some(request_id));
            return TileWork::Fetch(CellsRequest {
                request_id,
                sheet_id: self.sheet_id.clone(),
                key,
                rect: tile.cell_rect(),
            });
        }

        // clip windows of DirtyBuffers tiles are kept current by whoever
        // dirtied them; only fresh layout needs clipping here
        if tile.is_dirty() {
            tile.derive_layout(&self.offsets, self.shaper.as_ref(), self.config.cell_padding);
            let content = self.content_columns(key.hash_y);
            if let Some(tile) = self.tiles.get_mut(&key) {
                tile.compute_clipping(&self.offsets, &content);
            }
            self.mark_neighbors(key, &content);
        }
        let Some(tile) = self.tiles.get_mut(&key) else {
            return TileWork::Skipped;
        };
        TileWork::Rendered(tile.upload_buffers())
    }

    /// Re-lay out one logical row in every tile of its bucket row.
    fn process_row(&mut self, row: i64) -> Vec<TileBuffers> {
        let hash_y = row.div_euclid(self.config.bucket_height);
        let keys = self.tiles_in_row(hash_y);
        for key in &keys {
            if let Some(tile) = self.tiles.get_mut(key) {
                if !tile.is_dirty() {
                    tile.relayout_row(row, &self.offsets, self.shaper.as_ref(), self.config.cell_padding);
                }
            }
        }
        self.reclip_row(hash_y);
        let mut uploads = Vec::new();
        for key in keys {
            if let Some(tile) = self.tiles.get_mut(&key) {
                if tile.is_dirty_buffers() && !tile.is_dirty() && !tile.needs_content() {
                    uploads.push(tile.upload_buffers());
                }
            }
        }
        trace!(sheet = %self.sheet_id, row, uploads = uploads.len(), "Processed dirty row");
        uploads
    }

    /// Some tile inside the viewport still needs work.
    pub fn has_visible_work(&self) -> bool {
        let Some(viewport) = self.viewport else {
            return false;
        };
        self.tiles
            .values()
            .any(|t| t.needs_work() && t.visible_rectangle().intersects(&viewport))
    }

    /// A fetch could not be sent. The tile stays without content and becomes
    /// selectable again.
    pub fn fetch_failed(&mut self, key: TileKey) {
        if let Some(tile) = self.tiles.get_mut(&key) {
            tile.set_pending_request(None);
        }
    }

    /// Tiles whose bucket column contains `column`.
    pub fn column_tiles(&self, column: i64) -> Vec<TileKey> {
        let hash_x = column.div_euclid(self.config.bucket_width);
        self.tiles
            .keys()
            .filter(|k| k.hash_x == hash_x)
            .copied()
            .collect()
    }

    /// Tiles whose bucket row contains `row`.
    pub fn row_tiles(&self, row: i64) -> Vec<TileKey> {
        self.tiles_in_row(row.div_euclid(self.config.bucket_height))
    }

    /// Widest laid-out text in `column`, padding included.
    pub fn content_max_width(&self, column: i64) -> Option<f64> {
        self.column_tiles(column)
            .iter()
            .filter_map(|k| self.tiles.get(k))
            .flat_map(Tile::labels)
            .filter(|l| l.column == column)
            .map(|l| l.content_width())
            .reduce(f64::max)
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
    use crate::types::RenderCell;

    fn grid() -> TileGrid {
        TileGrid::new(
            &SheetInfo::new("sheet"),
            RenderConfig::default(),
            Rc::new(MonospaceShaper::default()),
        )
    }

    #[test]
    fn test_get_or_create_registers_row() {
        let mut g = grid();
        g.get_or_create(-1, 31);
        assert_eq!(g.tiles_in_row(1), vec![TileKey::new(-1, 1)]);
        g.get_or_create(-15, 59);
        assert_eq!(g.tile_count(), 1);
    }

    #[test]
    fn test_bounds_create_tiles() {
        let info = SheetInfo {
            bounds: Some(CellRect::new(0, 0, 20, 40)),
            ..SheetInfo::new("sheet")
        };
        let g = TileGrid::new(
            &info,
            RenderConfig::default(),
            Rc::new(MonospaceShaper::default()),
        );
        assert_eq!(g.tile_count(), 4);
    }

    #[test]
    fn test_huge_change_only_touches_existing() {
        let mut g = grid();
        g.get_or_create(0, 0);
        g.cells_changed(CellRect::new(0, 0, 1_000_000, 1_000_000), 3);
        assert_eq!(g.tile_count(), 1);
        assert_eq!(g.tile(TileKey::new(0, 0)).unwrap().sequence(), 3);
    }

    #[test]
    fn test_heading_deltas_accumulate() {
        let mut g = grid();
        g.mark_column_heading_dirty(3, 5.0);
        g.mark_column_heading_dirty(3, 3.0);
        assert_eq!(g.pending_column_delta(3), Some(8.0));
    }

    #[test]
    fn test_resize_records_delta() {
        let mut g = grid();
        g.resize_column(2, 130.0).unwrap();
        g.resize_column(2, 130.0).unwrap();
        assert_eq!(g.pending_column_delta(2), Some(30.0));
        assert!(g.resize_row(0, -1.0).is_err());
        assert_eq!(g.pending_row_delta(0), None);
    }

    #[test]
    fn test_drag_resize_records_delta() {
        let mut g = grid();
        g.set_heading_resize(Some(HeadingResize::Column {
            column: 1,
            width: 120.0,
        }));
        g.set_heading_resize(Some(HeadingResize::Column {
            column: 1,
            width: 125.0,
        }));
        assert_eq!(g.pending_column_delta(1), Some(25.0));
        g.set_heading_resize(None);
        assert!(g.pending_column_delta(1).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_headings_take_priority() {
        let mut g = grid();
        g.set_viewport(ScreenRect::new(0.0, 0.0, 799.0, 599.0));
        g.get_or_create(0, 0);
        g.mark_row_heading_dirty(0, 4.0);
        assert_eq!(
            g.schedule_next(),
            Scheduled::Headings {
                columns: 0,
                rows: 1
            }
        );
        assert!(!g.has_pending_headings());
    }

    #[test]
    fn test_fetch_then_render() {
        let mut g = grid();
        g.set_viewport(ScreenRect::new(0.0, 0.0, 799.0, 599.0));
        g.get_or_create(0, 0);
        let Scheduled::Tile {
            work: TileWork::Fetch(request),
            visible: true,
            ..
        } = g.schedule_next()
        else {
            panic!("expected fetch");
        };
        // in flight: not selected again
        assert!(g.schedule_next().is_idle());

        assert!(g.receive_cells(CellsResponse {
            request_id: Some(request.request_id),
            sheet_id: request.sheet_id,
            key: request.key,
            sequence: 0,
            result: Ok(vec![RenderCell::text(0, 0, "a")]),
        }));
        let Scheduled::Tile {
            work: TileWork::Rendered(buffers),
            ..
        } = g.schedule_next()
        else {
            panic!("expected render");
        };
        assert_eq!(buffers.glyph_count(), 1);
        assert!(!g.has_visible_work());
        assert!(g.schedule_next().is_idle());
    }

    #[test]
    fn test_failed_fetch_is_retried() {
        let mut g = grid();
        g.get_or_create(0, 0);
        let TileWork::Fetch(request) = g.process_tile(TileKey::new(0, 0)) else {
            panic!("expected fetch");
        };
        assert!(!g.receive_cells(CellsResponse {
            request_id: Some(request.request_id),
            sheet_id: request.sheet_id,
            key: request.key,
            sequence: 0,
            result: Err("engine busy".to_string()),
        }));
        assert!(matches!(
            g.process_tile(TileKey::new(0, 0)),
            TileWork::Fetch(_)
        ));
    }

    #[test]
    fn test_content_max_width() {
        let mut g = grid();
        g.get_or_create(0, 0);
        g.receive_cells(CellsResponse {
            request_id: None,
            sheet_id: SheetId::new("sheet"),
            key: TileKey::new(0, 0),
            sequence: 1,
            result: Ok(vec![
                RenderCell::text(1, 0, "abc"),
                RenderCell::text(1, 4, "abcdef"),
            ]),
        });
        g.process_tile(TileKey::new(0, 0));
        assert_eq!(g.content_max_width(1), Some(48.0 + 4.0));
        assert_eq!(g.content_max_width(2), None);
    }
}
