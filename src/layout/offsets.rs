//! Logical index <-> pixel position mapping over sparse size overrides.
//!
//! Columns and rows extend infinitely in both directions. Index 0 starts at
//! pixel 0; positive indices accumulate sizes forward and negative indices
//! backward, so column -1 starts at `-width(-1)`. Only non-default sizes are
//! stored, sorted by index, together with a prefix sum of their deviation from
//! the default. That makes every lookup O(log n) in the number of overrides,
//! independent of how far from the origin the index is.

use std::cell::RefCell;

use tracing::warn;

use super::cache::PositionCache;
use crate::config::{
    RenderConfig, DEFAULT_COLUMN_WIDTH, DEFAULT_POSITION_CACHE_CAPACITY, DEFAULT_ROW_HEIGHT,
};
use crate::error::{Result, SheetTextError};
use crate::types::{OffsetsData, ScreenRect};

/// An in-progress drag resize. Takes precedence over committed sizes until it
/// is committed or cleared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadingResize {
    Column { column: i64, width: f64 },
    Row { row: i64, height: f64 },
}

/// Result of a reverse lookup: the index under a pixel and where it starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexPosition {
    pub index: i64,
    pub position: f64,
}

/// One axis worth of overrides.
struct AxisOffsets {
    default_size: f64,
    /// `(index, size)` sorted by index, no duplicates, no default-sized entries
    overrides: Vec<(i64, f64)>,
    /// `prefix[j]` = sum of `size - default_size` over `overrides[..j]`
    prefix: Vec<f64>,
    placements: RefCell<PositionCache<i64, f64>>,
    indices: RefCell<PositionCache<u64, IndexPosition>>,
}

impl AxisOffsets {
    fn new(default_size: f64, cache_capacity: usize) -> Self {
        Self {
            default_size,
            overrides: Vec::new(),
            prefix: vec![0.0],
            placements: RefCell::new(PositionCache::new(cache_capacity)),
            indices: RefCell::new(PositionCache::new(cache_capacity)),
        }
    }

    fn invalidate(&self) {
        self.placements.borrow_mut().invalidate();
        self.indices.borrow_mut().invalidate();
    }

    fn rebuild_prefix(&mut self) {
        self.prefix.clear();
        self.prefix.push(0.0);
        let mut sum = 0.0;
        for &(_, size) in &self.overrides {
            sum += size - self.default_size;
            self.prefix.push(sum);
        }
        self.invalidate();
    }

    fn clear(&mut self) {
        self.overrides.clear();
        self.rebuild_prefix();
    }

    /// Replace all overrides. Leaves the axis untouched on error.
    fn load(&mut self, runs: &[(i64, f64)], axis: &str) -> Result<()> {
        let mut sorted = runs.to_vec();
        sorted.sort_by_key(|&(index, _)| index);
        for pair in sorted.windows(2) {
            if let [(a, _), (b, _)] = pair {
                if a == b {
                    return Err(SheetTextError::InvalidOffsets(format!(
                        "duplicate {axis} override at index {a}"
                    )));
                }
            }
        }
        if let Some(&(index, size)) = sorted.iter().find(|(_, size)| !valid_size(*size)) {
            return Err(SheetTextError::InvalidOffsets(format!(
                "{axis} {index} has invalid size {size}"
            )));
        }
        let default_size = self.default_size;
        sorted.retain(|&(_, size)| !same_size(size, default_size));
        self.overrides = sorted;
        self.rebuild_prefix();
        Ok(())
    }

    fn committed_size(&self, index: i64) -> f64 {
        match self.overrides.binary_search_by_key(&index, |&(i, _)| i) {
            Ok(pos) => self
                .overrides
                .get(pos)
                .map_or(self.default_size, |&(_, size)| size),
            Err(_) => self.default_size,
        }
    }

    fn set_size(&mut self, index: i64, size: f64) -> Result<()> {
        if !valid_size(size) {
            return Err(SheetTextError::InvalidSize { index, size });
        }
        let is_default = same_size(size, self.default_size);
        match self.overrides.binary_search_by_key(&index, |&(i, _)| i) {
            Ok(pos) if is_default => {
                self.overrides.remove(pos);
            }
            Ok(pos) => {
                if let Some(entry) = self.overrides.get_mut(pos) {
                    entry.1 = size;
                }
            }
            Err(_) if is_default => {}
            Err(pos) => self.overrides.insert(pos, (index, size)),
        }
        self.rebuild_prefix();
        Ok(())
    }

    /// Sum of override deviations for indices in `[start, end)`.
    fn deviation(&self, start: i64, end: i64) -> f64 {
        let lo = self.overrides.partition_point(|&(i, _)| i < start);
        let hi = self.overrides.partition_point(|&(i, _)| i < end);
        let upper = self.prefix.get(hi).copied().unwrap_or(0.0);
        let lower = self.prefix.get(lo).copied().unwrap_or(0.0);
        upper - lower
    }

    /// Total pixel size of indices in `[start, end)`.
    fn span(&self, start: i64, end: i64, transient: Option<(i64, f64)>) -> f64 {
        if end <= start {
            return 0.0;
        }
        let count = end.saturating_sub(start) as f64;
        let mut total = count * self.default_size + self.deviation(start, end);
        if let Some((index, size)) = transient {
            if index >= start && index < end {
                total += size - self.committed_size(index);
            }
        }
        total
    }

    fn placement_uncached(&self, index: i64, transient: Option<(i64, f64)>) -> f64 {
        if index >= 0 {
            self.span(0, index, transient)
        } else {
            -self.span(index, 0, transient)
        }
    }

    fn placement(&self, index: i64, transient: Option<(i64, f64)>) -> f64 {
        if let Some(position) = self.placements.borrow().get(index) {
            return position;
        }
        let position = self.placement_uncached(index, transient);
        self.placements.borrow_mut().insert(index, position);
        position
    }

    /// Largest index whose placement is at or before `position`.
    fn index_at(&self, position: f64, transient: Option<(i64, f64)>) -> IndexPosition {
        let position = if position.is_finite() { position } else { 0.0 };
        let key = position.to_bits();
        if let Some(found) = self.indices.borrow().get(key) {
            return found;
        }

        // Bracket so that placement(lo) <= position < placement(hi), then bisect.
        let (mut lo, mut hi) = if position >= 0.0 {
            let (mut lo, mut hi) = (0_i64, 1_i64);
            while hi < i64::MAX && self.placement_uncached(hi, transient) <= position {
                lo = hi;
                hi = hi.saturating_mul(2);
            }
            (lo, hi)
        } else {
            let (mut lo, mut hi) = (-1_i64, 0_i64);
            while lo > i64::MIN && self.placement_uncached(lo, transient) > position {
                hi = lo;
                lo = lo.saturating_mul(2);
            }
            (lo, hi)
        };
        while hi.saturating_sub(lo) > 1 {
            let mid = lo + hi.saturating_sub(lo) / 2;
            if self.placement_uncached(mid, transient) <= position {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let found = IndexPosition {
            index: lo,
            position: self.placement(lo, transient),
        };
        self.indices.borrow_mut().insert(key, found);
        found
    }
}

fn valid_size(size: f64) -> bool {
    size.is_finite() && size > 0.0
}

fn same_size(a: f64, b: f64) -> bool {
    (a - b).abs() < f64::EPSILON
}

/// Sparse column-width and row-height store for one sheet.
pub struct OffsetIndex {
    columns: AxisOffsets,
    rows: AxisOffsets,
    resizing: Option<HeadingResize>,
}

impl Default for OffsetIndex {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMN_WIDTH, DEFAULT_ROW_HEIGHT)
    }
}

impl OffsetIndex {
    /// All-default index.
    pub fn new(default_column_width: f64, default_row_height: f64) -> Self {
        Self::with_cache_capacity(
            default_column_width,
            default_row_height,
            DEFAULT_POSITION_CACHE_CAPACITY,
        )
    }

    pub fn with_cache_capacity(
        default_column_width: f64,
        default_row_height: f64,
        cache_capacity: usize,
    ) -> Self {
        Self {
            columns: AxisOffsets::new(default_column_width, cache_capacity),
            rows: AxisOffsets::new(default_row_height, cache_capacity),
            resizing: None,
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::with_cache_capacity(
            config.default_column_width,
            config.default_row_height,
            config.position_cache_capacity,
        )
    }

    /// Replace all overrides with `data`.
    ///
    /// Malformed data (duplicate indices, non-positive or non-finite sizes) is
    /// rejected as a whole and the index falls back to default sizes only.
    pub fn load(&mut self, data: &OffsetsData) -> Result<()> {
        let loaded = self
            .columns
            .load(&data.columns, "column")
            .and_then(|()| self.rows.load(&data.rows, "row"));
        if let Err(e) = loaded {
            warn!("Rejecting offsets, falling back to defaults: {}", e);
            self.columns.clear();
            self.rows.clear();
            return Err(e);
        }
        Ok(())
    }

    /// Parse `{"columns": [[start, size], ...], "rows": [...]}` and load it.
    pub fn load_json(&mut self, json: &str) -> Result<()> {
        match serde_json::from_str::<OffsetsData>(json) {
            Ok(data) => self.load(&data),
            Err(e) => {
                warn!("Rejecting unparseable offsets: {}", e);
                self.columns.clear();
                self.rows.clear();
                Err(SheetTextError::InvalidOffsets(e.to_string()))
            }
        }
    }

    /// Committed overrides in serialized form.
    pub fn to_data(&self) -> OffsetsData {
        OffsetsData {
            columns: self.columns.overrides.clone(),
            rows: self.rows.overrides.clone(),
        }
    }

    pub fn default_column_width(&self) -> f64 {
        self.columns.default_size
    }

    pub fn default_row_height(&self) -> f64 {
        self.rows.default_size
    }

    fn column_transient(&self) -> Option<(i64, f64)> {
        match self.resizing {
            Some(HeadingResize::Column { column, width }) => Some((column, width)),
            _ => None,
        }
    }

    fn row_transient(&self) -> Option<(i64, f64)> {
        match self.resizing {
            Some(HeadingResize::Row { row, height }) => Some((row, height)),
            _ => None,
        }
    }

    pub fn heading_resize(&self) -> Option<HeadingResize> {
        self.resizing
    }

    /// Start, update or cancel (`None`) a drag resize.
    pub fn set_heading_resize(&mut self, resizing: Option<HeadingResize>) {
        self.resizing = resizing;
        self.columns.invalidate();
        self.rows.invalidate();
    }

    /// Turn the active drag resize into a committed override.
    pub fn commit_heading_resize(&mut self) -> Result<Option<HeadingResize>> {
        let Some(resizing) = self.resizing else {
            return Ok(None);
        };
        match resizing {
            HeadingResize::Column { column, width } => self.columns.set_size(column, width)?,
            HeadingResize::Row { row, height } => self.rows.set_size(row, height)?,
        }
        self.resizing = None;
        self.columns.invalidate();
        self.rows.invalidate();
        Ok(Some(resizing))
    }

    pub fn column_width(&self, column: i64) -> f64 {
        match self.column_transient() {
            Some((index, width)) if index == column => width,
            _ => self.columns.committed_size(column),
        }
    }

    pub fn row_height(&self, row: i64) -> f64 {
        match self.row_transient() {
            Some((index, height)) if index == row => height,
            _ => self.rows.committed_size(row),
        }
    }

    pub fn set_column_width(&mut self, column: i64, width: f64) -> Result<()> {
        self.columns.set_size(column, width)
    }

    pub fn set_row_height(&mut self, row: i64, height: f64) -> Result<()> {
        self.rows.set_size(row, height)
    }

    /// Left edge of `column` in pixels.
    pub fn column_placement(&self, column: i64) -> f64 {
        self.columns.placement(column, self.column_transient())
    }

    /// Top edge of `row` in pixels.
    pub fn row_placement(&self, row: i64) -> f64 {
        self.rows.placement(row, self.row_transient())
    }

    /// Column under pixel `x`, with that column's left edge.
    pub fn column_index(&self, x: f64) -> IndexPosition {
        self.columns.index_at(x, self.column_transient())
    }

    /// Row under pixel `y`, with that row's top edge.
    pub fn row_index(&self, y: f64) -> IndexPosition {
        self.rows.index_at(y, self.row_transient())
    }

    /// Closed pixel span `(start, end)` of `count` columns from `column`.
    pub fn columns_start_end(&self, column: i64, count: i64) -> (f64, f64) {
        let start = self.column_placement(column);
        let end = self.column_placement(column.saturating_add(count));
        (start, end - 1.0)
    }

    /// Closed pixel span `(start, end)` of `count` rows from `row`.
    pub fn rows_start_end(&self, row: i64, count: i64) -> (f64, f64) {
        let start = self.row_placement(row);
        let end = self.row_placement(row.saturating_add(count));
        (start, end - 1.0)
    }

    /// Pixel rectangle covering `width` x `height` cells from `(column, row)`.
    pub fn screen_rectangle(&self, column: i64, row: i64, width: i64, height: i64) -> ScreenRect {
        let (left, right) = self.columns_start_end(column, width);
        let (top, bottom) = self.rows_start_end(row, height);
        ScreenRect::new(left, top, right, bottom)
    }

    /// Pixel rectangle of a single cell.
    pub fn cell_rect(&self, column: i64, row: i64) -> ScreenRect {
        self.screen_rectangle(column, row, 1, 1)
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

    const W: f64 = DEFAULT_COLUMN_WIDTH;
    const H: f64 = DEFAULT_ROW_HEIGHT;

    fn offsets(columns: &[(i64, f64)], rows: &[(i64, f64)]) -> OffsetIndex {
        let mut index = OffsetIndex::default();
        index
            .load(&OffsetsData {
                columns: columns.to_vec(),
                rows: rows.to_vec(),
            })
            .unwrap();
        index
    }

    #[test]
    fn test_load_populates_rows_and_columns() {
        let index = offsets(&[(3, 10.0)], &[(4, 5.0), (5, 6.0)]);
        let data = index.to_data();
        assert_eq!(data.columns.len(), 1);
        assert_eq!(data.rows.len(), 2);
    }

    #[test]
    fn test_override_covers_only_its_index() {
        let index = offsets(&[(3, 10.0)], &[]);
        assert_eq!(index.column_width(2), W);
        assert_eq!(index.column_width(3), 10.0);
        assert_eq!(index.column_width(4), W);
        assert_eq!(index.column_placement(5), 4.0 * W + 10.0);
    }

    #[test]
    fn test_set_width_invalidates_cache() {
        let mut index = OffsetIndex::default();
        assert_eq!(index.column_placement(3), 3.0 * W);
        index.set_column_width(1, 40.0).unwrap();
        assert_eq!(index.column_placement(3), 2.0 * W + 40.0);
        assert_eq!(index.column_index(2.0 * W + 40.0).index, 3);

        index.set_row_height(-2, 5.0).unwrap();
        assert_eq!(index.row_placement(-3), -(2.0 * H + 5.0));
    }

    #[test]
    fn test_setting_default_size_removes_override() {
        let mut index = offsets(&[(3, 10.0)], &[]);
        index.set_column_width(3, W).unwrap();
        assert!(index.to_data().columns.is_empty());
    }

    #[test]
    fn test_rejects_invalid_sizes() {
        let mut index = OffsetIndex::default();
        assert!(matches!(
            index.set_column_width(0, 0.0),
            Err(SheetTextError::InvalidSize { index: 0, .. })
        ));
        assert!(index.set_row_height(0, f64::NAN).is_err());
        assert!(index.set_row_height(0, -3.0).is_err());
    }

    #[test]
    fn test_malformed_load_falls_back_to_defaults() {
        let mut index = offsets(&[(1, 50.0)], &[(1, 50.0)]);
        let err = index.load(&OffsetsData {
            columns: vec![(2, 10.0), (2, 12.0)],
            rows: vec![],
        });
        assert!(matches!(err, Err(SheetTextError::InvalidOffsets(_))));
        assert_eq!(index.column_width(1), W);
        assert_eq!(index.row_height(1), H);

        let err = index.load_json(r#"{"columns": [[1, "wide"]]}"#);
        assert!(err.is_err());
        assert_eq!(index.column_width(1), W);
    }

    #[test]
    fn test_load_json_accepts_unsorted_runs() {
        let mut index = OffsetIndex::default();
        index
            .load_json(r#"{"columns": [[-1, 5], [-3, 7], [-2, 6]], "rows": []}"#)
            .unwrap();
        assert_eq!(index.column_placement(-3), -18.0);
        assert_eq!(index.column_index(-18.0).index, -3);
    }

    #[test]
    fn test_heading_resize_commit() {
        let mut index = OffsetIndex::default();
        index.set_heading_resize(Some(HeadingResize::Row { row: 2, height: 40.0 }));
        assert_eq!(index.row_placement(3), 2.0 * H + 40.0);
        let committed = index.commit_heading_resize().unwrap();
        assert_eq!(committed, Some(HeadingResize::Row { row: 2, height: 40.0 }));
        assert_eq!(index.heading_resize(), None);
        assert_eq!(index.row_height(2), 40.0);
        assert_eq!(index.row_placement(3), 2.0 * H + 40.0);
    }

    #[test]
    fn test_non_finite_position_maps_to_origin() {
        let index = OffsetIndex::default();
        assert_eq!(index.column_index(f64::NAN).index, 0);
    }
}
