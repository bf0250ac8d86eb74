use serde::{Deserialize, Serialize};

/// Pixel-space rectangle with closed bounds.
///
/// `right` and `bottom` are the last pixel covered, so a span of `w` pixels
/// starting at `left` ends at `left + w - 1`. Adjacent rectangles therefore
/// meet without a one-pixel gap.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ScreenRect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build from an origin and the pixel span it covers.
    pub fn from_span(left: f64, top: f64, span_width: f64, span_height: f64) -> Self {
        Self {
            left,
            top,
            right: left + span_width - 1.0,
            bottom: top + span_height - 1.0,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.left + self.width() / 2.0,
            self.top + self.height() / 2.0,
        )
    }

    /// Whether the two closed rectangles share at least one pixel.
    pub fn intersects(&self, other: &ScreenRect) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    /// Squared distance between the centers of two rectangles.
    pub fn distance_squared(&self, other: &ScreenRect) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        (ax - bx).powi(2) + (ay - by).powi(2)
    }

    /// Smallest rectangle covering both.
    #[must_use]
    pub fn union(&self, other: &ScreenRect) -> ScreenRect {
        ScreenRect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// Rectangle of logical cells: `width` columns by `height` rows from `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl CellRect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Last column covered (inclusive).
    pub fn right(&self) -> i64 {
        self.x + self.width - 1
    }

    /// Last row covered (inclusive).
    pub fn bottom(&self) -> i64 {
        self.y + self.height - 1
    }

    pub fn contains(&self, column: i64, row: i64) -> bool {
        column >= self.x && column <= self.right() && row >= self.y && row <= self.bottom()
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Bucket coordinate of a tile: `floor(index / bucket size)` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileKey {
    pub hash_x: i64,
    pub hash_y: i64,
}

impl TileKey {
    pub fn new(hash_x: i64, hash_y: i64) -> Self {
        Self { hash_x, hash_y }
    }

    /// Bucket containing the given cell. Negative indices floor toward
    /// negative infinity, so column -1 lives in bucket -1, not 0.
    pub fn for_cell(column: i64, row: i64, bucket_width: i64, bucket_height: i64) -> Self {
        Self {
            hash_x: column.div_euclid(bucket_width),
            hash_y: row.div_euclid(bucket_height),
        }
    }

    /// Logical cells covered by this bucket.
    pub fn cell_rect(&self, bucket_width: i64, bucket_height: i64) -> CellRect {
        CellRect::new(
            self.hash_x * bucket_width,
            self.hash_y * bucket_height,
            bucket_width,
            bucket_height,
        )
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.hash_x, self.hash_y)
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

    #[test]
    fn test_tile_key_floors_negative_indices() {
        assert_eq!(TileKey::for_cell(0, 0, 15, 30), TileKey::new(0, 0));
        assert_eq!(TileKey::for_cell(14, 29, 15, 30), TileKey::new(0, 0));
        assert_eq!(TileKey::for_cell(15, 30, 15, 30), TileKey::new(1, 1));
        assert_eq!(TileKey::for_cell(-1, -1, 15, 30), TileKey::new(-1, -1));
        assert_eq!(TileKey::for_cell(-15, -30, 15, 30), TileKey::new(-1, -1));
        assert_eq!(TileKey::for_cell(-16, -31, 15, 30), TileKey::new(-2, -2));
    }

    #[test]
    fn test_tile_key_cell_rect() {
        let rect = TileKey::new(-1, 2).cell_rect(15, 30);
        assert_eq!(rect, CellRect::new(-15, 60, 15, 30));
        assert_eq!(rect.right(), -1);
        assert_eq!(rect.bottom(), 89);
        assert!(rect.contains(-1, 60));
        assert!(!rect.contains(0, 60));
    }

    #[test]
    fn test_screen_rect_closed_bounds() {
        let rect = ScreenRect::from_span(0.0, 0.0, 100.0, 21.0);
        assert_eq!(rect.right, 99.0);
        assert_eq!(rect.bottom, 20.0);

        let next = ScreenRect::from_span(100.0, 0.0, 100.0, 21.0);
        assert!(!rect.intersects(&next));
        let overlapping = ScreenRect::from_span(99.0, 20.0, 10.0, 10.0);
        assert!(rect.intersects(&overlapping));
    }

    #[test]
    fn test_distance_squared_between_centers() {
        let a = ScreenRect::new(0.0, 0.0, 10.0, 10.0);
        let b = ScreenRect::new(30.0, 40.0, 40.0, 50.0);
        assert_eq!(a.distance_squared(&b), 30.0 * 30.0 + 40.0 * 40.0);
        assert_eq!(a.distance_squared(&a), 0.0);
    }
}
