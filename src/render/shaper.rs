//! Glyph shaping service.
//!
//! Real font shaping and rasterization live outside this crate; the tile
//! cache only needs advances and extents. [`MonospaceShaper`] is a
//! deterministic stand-in used by the CLI and the tests.

use unicode_width::UnicodeWidthChar;

use crate::types::{TextStyle, DEFAULT_FONT_SIZE};

/// One positioned glyph relative to the start of its run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapedGlyph {
    pub ch: char,
    /// Offset from the run origin
    pub x: f64,
    /// Advance width
    pub width: f64,
}

/// A shaped run of text on a single line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShapedText {
    /// Visible glyphs only; whitespace advances the pen without a glyph.
    pub glyphs: Vec<ShapedGlyph>,
    /// Total advance of the run
    pub width: f64,
    pub line_height: f64,
}

/// Turns text into glyph advances.
pub trait GlyphShaper {
    fn shape(&self, text: &str, style: &TextStyle) -> ShapedText;
}

/// Fixed-advance shaper: every terminal column of a character costs
/// `advance` pixels at the default font size, scaled linearly with size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonospaceShaper {
    pub advance: f64,
    pub line_height: f64,
}

impl Default for MonospaceShaper {
    fn default() -> Self {
        Self {
            advance: 8.0,
            line_height: 16.0,
        }
    }
}

impl MonospaceShaper {
    pub fn new(advance: f64, line_height: f64) -> Self {
        Self {
            advance,
            line_height,
        }
    }
}

impl GlyphShaper for MonospaceShaper {
    fn shape(&self, text: &str, style: &TextStyle) -> ShapedText {
        let scale = style.font_size / DEFAULT_FONT_SIZE;
        let advance = self.advance * scale;
        let mut pen = 0.0;
        let mut glyphs = Vec::with_capacity(text.len());
        for ch in text.chars() {
            let columns = match ch.width() {
                Some(0) | None => continue,
                Some(w) => w as f64,
            };
            let width = advance * columns;
            if !ch.is_whitespace() {
                glyphs.push(ShapedGlyph { ch, x: pen, width });
            }
            pen += width;
        }
        ShapedText {
            glyphs,
            width: pen,
            line_height: self.line_height * scale,
        }
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

    fn style() -> TextStyle {
        TextStyle {
            bold: false,
            italic: false,
            font_size: DEFAULT_FONT_SIZE,
        }
    }

    #[test]
    fn test_fixed_advance() {
        let shaped = MonospaceShaper::default().shape("abc", &style());
        assert_eq!(shaped.width, 24.0);
        assert_eq!(shaped.glyphs.len(), 3);
        assert_eq!(shaped.glyphs[2].x, 16.0);
        assert_eq!(shaped.line_height, 16.0);
    }

    #[test]
    fn test_whitespace_advances_without_glyph() {
        let shaped = MonospaceShaper::default().shape("a b", &style());
        assert_eq!(shaped.glyphs.len(), 2);
        assert_eq!(shaped.glyphs[1].x, 16.0);
        assert_eq!(shaped.width, 24.0);
    }

    #[test]
    fn test_wide_characters_take_two_columns() {
        let shaped = MonospaceShaper::default().shape("日本", &style());
        assert_eq!(shaped.width, 32.0);
        assert_eq!(shaped.glyphs[1].x, 16.0);
    }

    #[test]
    fn test_font_size_scales() {
        let mut big = style();
        big.font_size = DEFAULT_FONT_SIZE * 2.0;
        let shaped = MonospaceShaper::default().shape("ab", &big);
        assert_eq!(shaped.width, 32.0);
        assert_eq!(shaped.line_height, 32.0);
    }
}
