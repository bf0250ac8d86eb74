//! Tiled text rendering.
//!
//! - `shaper`: glyph advances from an external shaping service
//! - `label`: per-cell glyph layout, alignment, wrapping and clipping
//! - `tile`: one bucket of labels and its uploaded buffers
//! - `grid`: every tile of a sheet and the scheduler
//! - `driver`: the cross-sheet cooperative loop

pub mod driver;
pub mod grid;
pub mod label;
pub mod shaper;
pub mod tile;

pub use driver::{RenderDriver, TickReport, WorkKind};
pub use grid::{Scheduled, Selection, TileGrid, TileWork};
pub use label::{CellLabel, GlyphQuad, LabelAdjust};
pub use shaper::{GlyphShaper, MonospaceShaper, ShapedGlyph, ShapedText};
pub use tile::{ContentColumns, HeadingDelta, TextRun, Tile, TileBuffers, TileState};
