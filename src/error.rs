//! Structured error types for sheettext.
//!
//! Every fallible operation in the crate returns [`Result`].

use crate::types::SheetId;

/// All errors that can occur while indexing offsets or driving tile renders.
#[derive(Debug, thiserror::Error)]
pub enum SheetTextError {
    /// Operation addressed a sheet the driver does not know about.
    #[error("Unknown sheet: {0}")]
    UnknownSheet(SheetId),

    /// Serialized override runs were rejected on load.
    #[error("Invalid offsets: {0}")]
    InvalidOffsets(String),

    /// A column width or row height that is not a positive, finite number.
    #[error("Invalid size {size} for index {index}")]
    InvalidSize { index: i64, size: f64 },

    /// Configuration failed validation.
    #[error("Invalid config: {0}")]
    Config(String),

    /// JSON (de)serialization error.
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The other end of a message channel has gone away.
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SheetTextError>;

#[cfg(target_arch = "wasm32")]
impl From<SheetTextError> for wasm_bindgen::JsValue {
    fn from(e: SheetTextError) -> Self {
        wasm_bindgen::JsValue::from_str(&e.to_string())
    }
}
