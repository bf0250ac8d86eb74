//! Geometry of the infinite grid.
//!
//! This module handles:
//! - Mapping logical column/row indices to pixel positions and back
//! - Sparse size overrides plus an optional in-progress drag resize
//! - Viewport state (scroll position, zoom, visible index range)

mod cache;
mod offsets;
mod viewport;

pub use offsets::{HeadingResize, IndexPosition, OffsetIndex};
pub use viewport::Viewport;
