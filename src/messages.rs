//! Typed message contracts between the renderer, the computation engine and
//! the presentation layer.
//!
//! Every content payload carries the engine's per-sheet `sequence`, so a
//! response that was overtaken by a newer edit can be recognised and dropped.

use serde::{Deserialize, Serialize};

use crate::render::TileBuffers;
use crate::types::{CellRect, RenderCell, SheetId, SheetInfo, TileKey};

/// Renderer -> engine: content for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellsRequest {
    pub request_id: u64,
    pub sheet_id: SheetId,
    pub key: TileKey,
    pub rect: CellRect,
}

/// Engine -> renderer: content for one bucket, requested or pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellsResponse {
    /// `None` for content the engine pushed without being asked
    #[serde(default)]
    pub request_id: Option<u64>,
    pub sheet_id: SheetId,
    pub key: TileKey,
    pub sequence: u64,
    pub result: Result<Vec<RenderCell>, String>,
}

impl CellsResponse {
    /// Answer to `request`.
    pub fn reply(request: &CellsRequest, sequence: u64, cells: Vec<RenderCell>) -> Self {
        Self {
            request_id: Some(request.request_id),
            sheet_id: request.sheet_id.clone(),
            key: request.key,
            sequence,
            result: Ok(cells),
        }
    }
}

/// Inbound events: engine responses and edit notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CoreMessage {
    Cells(CellsResponse),
    #[serde(rename_all = "camelCase")]
    CellsChanged {
        sheet_id: SheetId,
        rect: CellRect,
        sequence: u64,
    },
    #[serde(rename_all = "camelCase")]
    ColumnResized {
        sheet_id: SheetId,
        column: i64,
        width: f64,
    },
    #[serde(rename_all = "camelCase")]
    RowResized {
        sheet_id: SheetId,
        row: i64,
        height: f64,
    },
    #[serde(rename_all = "camelCase")]
    RowsDirty { sheet_id: SheetId, rows: Vec<i64> },
    #[serde(rename_all = "camelCase")]
    SheetBounds { sheet_id: SheetId, bounds: CellRect },
    SheetAdded(SheetInfo),
    #[serde(rename_all = "camelCase")]
    SheetRemoved { sheet_id: SheetId },
    #[serde(rename_all = "camelCase")]
    ActiveSheet { sheet_id: Option<SheetId> },
}

impl CoreMessage {
    /// Sheet the message addresses, if any.
    pub fn sheet_id(&self) -> Option<&SheetId> {
        match self {
            CoreMessage::Cells(response) => Some(&response.sheet_id),
            CoreMessage::SheetAdded(info) => Some(&info.sheet_id),
            CoreMessage::ActiveSheet { sheet_id } => sheet_id.as_ref(),
            CoreMessage::CellsChanged { sheet_id, .. }
            | CoreMessage::ColumnResized { sheet_id, .. }
            | CoreMessage::RowResized { sheet_id, .. }
            | CoreMessage::RowsDirty { sheet_id, .. }
            | CoreMessage::SheetBounds { sheet_id, .. }
            | CoreMessage::SheetRemoved { sheet_id } => Some(sheet_id),
        }
    }
}

/// Outbound messages to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    TileBuffers {
        sheet_id: SheetId,
        buffers: TileBuffers,
    },
    #[serde(rename_all = "camelCase")]
    TileUnloaded { sheet_id: SheetId, key: TileKey },
    FirstPaintComplete,
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
    fn test_cells_changed_wire_format() {
        let json = r#"{"type":"cellsChanged","sheetId":"s1","rect":{"x":0,"y":-3,"width":2,"height":4},"sequence":9}"#;
        let msg: CoreMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            CoreMessage::CellsChanged {
                sheet_id: SheetId::new("s1"),
                rect: CellRect::new(0, -3, 2, 4),
                sequence: 9,
            }
        );
        assert_eq!(msg.sheet_id(), Some(&SheetId::new("s1")));
    }

    #[test]
    fn test_pushed_cells_without_request_id() {
        let json = r#"{"type":"cells","sheetId":"s1","key":{"hashX":1,"hashY":0},"sequence":2,"result":{"Ok":[{"x":15,"y":0,"value":"hi"}]}}"#;
        let CoreMessage::Cells(response) = serde_json::from_str(json).unwrap() else {
            panic!("expected cells");
        };
        assert_eq!(response.request_id, None);
        assert_eq!(response.result.unwrap()[0].value, "hi");
    }

    #[test]
    fn test_first_paint_serializes_as_tag() {
        let json = serde_json::to_string(&ClientMessage::FirstPaintComplete).unwrap();
        assert_eq!(json, r#"{"type":"firstPaintComplete"}"#);
    }
}
