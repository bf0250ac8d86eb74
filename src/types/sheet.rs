use serde::{Deserialize, Serialize};

use super::CellRect;

/// Opaque identifier of a sheet, as assigned by the computation engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub String);

impl SheetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SheetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SheetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Serialized override runs: `{"columns": [[start, size], ...], "rows": [...]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OffsetsData {
    #[serde(default)]
    pub columns: Vec<(i64, f64)>,
    #[serde(default)]
    pub rows: Vec<(i64, f64)>,
}

/// Everything the renderer needs to open a sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetInfo {
    pub sheet_id: SheetId,
    #[serde(default)]
    pub offsets: OffsetsData,
    /// Content bounds (ignoring formatting-only cells), if the sheet has any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<CellRect>,
}

impl SheetInfo {
    pub fn new(sheet_id: impl Into<String>) -> Self {
        Self {
            sheet_id: SheetId::new(sheet_id),
            offsets: OffsetsData::default(),
            bounds: None,
        }
    }
}
