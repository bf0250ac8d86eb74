//! JavaScript bindings for the offset index.
//!
//! Indices cross the boundary as `i32` (JS numbers); positions as `f64`.

use wasm_bindgen::prelude::*;

use crate::config::RenderConfig;
use crate::layout::{HeadingResize, OffsetIndex};

#[wasm_bindgen]
pub struct SheetOffsets {
    index: OffsetIndex,
}

#[wasm_bindgen]
impl SheetOffsets {
    /// Offsets with the given defaults, loaded from `{"columns": [...], "rows": [...]}`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        default_column_width: f64,
        default_row_height: f64,
        json: Option<String>,
    ) -> Result<SheetOffsets, JsValue> {
        console_error_panic_hook::set_once();
        let config = RenderConfig {
            default_column_width,
            default_row_height,
            ..RenderConfig::default()
        };
        config.validate()?;
        let mut index = OffsetIndex::from_config(&config);
        if let Some(json) = json {
            index.load_json(&json)?;
        }
        Ok(SheetOffsets { index })
    }

    /// Serialized overrides.
    #[wasm_bindgen]
    pub fn export(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.index.to_data())
            .map_err(|e| JsValue::from_str(&format!("JSON serialization error: {e}")))
    }

    #[wasm_bindgen(js_name = "columnWidth")]
    pub fn column_width(&self, column: i32) -> f64 {
        self.index.column_width(i64::from(column))
    }

    #[wasm_bindgen(js_name = "rowHeight")]
    pub fn row_height(&self, row: i32) -> f64 {
        self.index.row_height(i64::from(row))
    }

    #[wasm_bindgen(js_name = "setColumnWidth")]
    pub fn set_column_width(&mut self, column: i32, width: f64) -> Result<(), JsValue> {
        Ok(self.index.set_column_width(i64::from(column), width)?)
    }

    #[wasm_bindgen(js_name = "setRowHeight")]
    pub fn set_row_height(&mut self, row: i32, height: f64) -> Result<(), JsValue> {
        Ok(self.index.set_row_height(i64::from(row), height)?)
    }

    #[wasm_bindgen(js_name = "columnPlacement")]
    pub fn column_placement(&self, column: i32) -> f64 {
        self.index.column_placement(i64::from(column))
    }

    #[wasm_bindgen(js_name = "rowPlacement")]
    pub fn row_placement(&self, row: i32) -> f64 {
        self.index.row_placement(i64::from(row))
    }

    /// `[index, position]` of the column under `x`.
    #[wasm_bindgen(js_name = "columnIndex")]
    pub fn column_index(&self, x: f64) -> Vec<f64> {
        let found = self.index.column_index(x);
        vec![found.index as f64, found.position]
    }

    /// `[index, position]` of the row under `y`.
    #[wasm_bindgen(js_name = "rowIndex")]
    pub fn row_index(&self, y: f64) -> Vec<f64> {
        let found = self.index.row_index(y);
        vec![found.index as f64, found.position]
    }

    /// `[left, top, right, bottom]`, right/bottom inclusive.
    #[wasm_bindgen(js_name = "screenRectangle")]
    pub fn screen_rectangle(&self, column: i32, row: i32, width: i32, height: i32) -> Vec<f64> {
        let rect = self.index.screen_rectangle(
            i64::from(column),
            i64::from(row),
            i64::from(width),
            i64::from(height),
        );
        vec![rect.left, rect.top, rect.right, rect.bottom]
    }

    /// Start or update a drag resize of a column.
    #[wasm_bindgen(js_name = "resizeColumnTransient")]
    pub fn resize_column_transient(&mut self, column: i32, width: f64) {
        self.index.set_heading_resize(Some(HeadingResize::Column {
            column: i64::from(column),
            width,
        }));
    }

    /// Start or update a drag resize of a row.
    #[wasm_bindgen(js_name = "resizeRowTransient")]
    pub fn resize_row_transient(&mut self, row: i32, height: f64) {
        self.index.set_heading_resize(Some(HeadingResize::Row {
            row: i64::from(row),
            height,
        }));
    }

    #[wasm_bindgen(js_name = "cancelResize")]
    pub fn cancel_resize(&mut self) {
        self.index.set_heading_resize(None);
    }

    /// Commit the drag resize. Returns whether one was active.
    #[wasm_bindgen(js_name = "commitResize")]
    pub fn commit_resize(&mut self) -> Result<bool, JsValue> {
        Ok(self.index.commit_heading_resize()?.is_some())
    }
}
