use serde::{Deserialize, Serialize};

/// Font size (px) used when a cell does not carry one.
pub const DEFAULT_FONT_SIZE: f64 = 14.0;

/// Horizontal text alignment within a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical text alignment within a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellVerticalAlign {
    Top,
    Middle,
    #[default]
    Bottom,
}

/// What happens to text wider than its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellWrap {
    /// Spill into empty neighbours; clipped at the first neighbour with content.
    #[default]
    Overflow,
    /// Clipped at the cell's own edges.
    Clip,
    /// Broken into lines that fit the cell width.
    Wrap,
}

/// Font attributes the shaper needs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub font_size: f64,
}

/// Raw cell content as supplied by the computation engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderCell {
    pub x: i64,
    pub y: i64,
    /// Display value (already formatted by the engine)
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<CellAlign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_align: Option<CellVerticalAlign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<CellWrap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

impl RenderCell {
    /// Plain left-aligned text cell.
    pub fn text(x: i64, y: i64, value: impl Into<String>) -> Self {
        Self {
            x,
            y,
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn text_style(&self) -> TextStyle {
        TextStyle {
            bold: self.bold.unwrap_or(false),
            italic: self.italic.unwrap_or(false),
            font_size: self
                .font_size
                .filter(|size| size.is_finite() && *size > 0.0)
                .unwrap_or(DEFAULT_FONT_SIZE),
        }
    }
}
