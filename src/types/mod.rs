//! Data types shared by the offset index, the tile cache and the message layer.

mod cell;
mod geometry;
mod sheet;

pub use cell::*;
pub use geometry::*;
pub use sheet::*;
