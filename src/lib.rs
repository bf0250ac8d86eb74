//! sheettext - tiled text cache for infinite spreadsheets
//!
//! Two pieces make scrolling through tens of millions of rows cheap:
//! - [`layout::OffsetIndex`]: sparse column widths / row heights with
//!   index <-> pixel lookups in both directions from the origin
//! - [`render::TileGrid`]: fixed-size buckets of pre-laid-out glyphs,
//!   rendered incrementally (visible first, then closest first) within a
//!   memory budget
//!
//! [`render::RenderDriver`] runs one grid per sheet and talks to the
//! computation engine and the presentation layer through [`channel`].
//!
//! # Usage
//!
//! ```no_run
//! use std::rc::Rc;
//! use sheettext::channel::{content_channel, presenter_channel};
//! use sheettext::layout::Viewport;
//! use sheettext::render::{MonospaceShaper, RenderDriver};
//! use sheettext::{RenderConfig, SheetInfo};
//!
//! let (source, _requests) = content_channel();
//! let (presenter, _client, _viewport) = presenter_channel(Viewport::default());
//! let mut driver = RenderDriver::new(
//!     RenderConfig::default(),
//!     Rc::new(MonospaceShaper::default()),
//!     source,
//!     presenter,
//! );
//! driver.add_sheet(&SheetInfo::new("sheet-1"));
//! let _ = driver.tick();
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod layout;
pub mod messages;
pub mod render;
pub mod types;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use config::RenderConfig;
pub use error::{Result, SheetTextError};
pub use types::*;

/// Get the library version
#[must_use]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen::prelude::wasm_bindgen)]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
