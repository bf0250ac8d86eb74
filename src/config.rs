//! Renderer configuration.
//!
//! All fields have defaults, so an empty JSON object (or no config at all)
//! yields a working setup.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SheetTextError};

/// Columns per tile.
pub const DEFAULT_BUCKET_WIDTH: i64 = 15;

/// Rows per tile.
pub const DEFAULT_BUCKET_HEIGHT: i64 = 30;

/// Default column width in pixels.
pub const DEFAULT_COLUMN_WIDTH: f64 = 100.0;

/// Default row height in pixels.
pub const DEFAULT_ROW_HEIGHT: f64 = 21.0;

/// Memory allowed per sheet before tiles start being unloaded (500 MiB).
pub const DEFAULT_MEMORY_BUDGET: usize = 1024 * 1024 * 500;

/// Horizontal inset between a cell edge and its text.
pub const DEFAULT_CELL_PADDING: f64 = 2.0;

/// Entries kept per position cache before the oldest are dropped.
pub const DEFAULT_POSITION_CACHE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderConfig {
    pub bucket_width: i64,
    pub bucket_height: i64,
    pub default_column_width: f64,
    pub default_row_height: f64,
    /// Bytes of glyph buffers a sheet may keep resident.
    pub memory_budget: usize,
    pub cell_padding: f64,
    pub position_cache_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            bucket_width: DEFAULT_BUCKET_WIDTH,
            bucket_height: DEFAULT_BUCKET_HEIGHT,
            default_column_width: DEFAULT_COLUMN_WIDTH,
            default_row_height: DEFAULT_ROW_HEIGHT,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            cell_padding: DEFAULT_CELL_PADDING,
            position_cache_capacity: DEFAULT_POSITION_CACHE_CAPACITY,
        }
    }
}

impl RenderConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RenderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_width < 1 || self.bucket_height < 1 {
            return Err(SheetTextError::Config(format!(
                "bucket size must be at least 1x1, got {}x{}",
                self.bucket_width, self.bucket_height
            )));
        }
        for (name, size) in [
            ("defaultColumnWidth", self.default_column_width),
            ("defaultRowHeight", self.default_row_height),
        ] {
            if !size.is_finite() || size <= 0.0 {
                return Err(SheetTextError::Config(format!(
                    "{name} must be positive, got {size}"
                )));
            }
        }
        if !self.cell_padding.is_finite() || self.cell_padding < 0.0 {
            return Err(SheetTextError::Config(format!(
                "cellPadding must not be negative, got {}",
                self.cell_padding
            )));
        }
        if self.memory_budget == 0 {
            return Err(SheetTextError::Config(
                "memoryBudget must be positive".to_string(),
            ));
        }
        Ok(())
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
    fn test_empty_json_uses_defaults() {
        let config = RenderConfig::from_json("{}").unwrap();
        assert_eq!(config, RenderConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            RenderConfig::from_json(r#"{"bucketWidth": 4, "memoryBudget": 1024}"#).unwrap();
        assert_eq!(config.bucket_width, 4);
        assert_eq!(config.bucket_height, DEFAULT_BUCKET_HEIGHT);
        assert_eq!(config.memory_budget, 1024);
    }

    #[test]
    fn test_rejects_zero_bucket() {
        let err = RenderConfig::from_json(r#"{"bucketHeight": 0}"#).unwrap_err();
        assert!(matches!(err, SheetTextError::Config(_)));
    }

    #[test]
    fn test_rejects_non_positive_default_size() {
        let err = RenderConfig::from_json(r#"{"defaultRowHeight": -1.0}"#).unwrap_err();
        assert!(matches!(err, SheetTextError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = RenderConfig::from_json("{bucketWidth").unwrap_err();
        assert!(matches!(err, SheetTextError::Json(_)));
    }
}
