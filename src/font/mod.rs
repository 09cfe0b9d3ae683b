//! Font loading and glyph rasterization
//!
//! Handles:
//! - Face discovery (fontconfig), one face per style plus CJK fallback
//! - Cell metrics derived from the regular face
//! - Glyph lookup with fallback and cached coverage bitmaps (fontdue)

pub mod fontconfig;
pub mod raster;

pub use raster::FontdueEngine;

/// Face variant selected by cell attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => FontStyle::Regular,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (true, true) => FontStyle::BoldItalic,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            FontStyle::Regular => 0,
            FontStyle::Bold => 1,
            FontStyle::Italic => 2,
            FontStyle::BoldItalic => 3,
        }
    }
}

/// Cell geometry in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    pub cell_width: u32,
    pub cell_height: u32,
    /// Baseline offset from the top of the cell
    pub ascent: u32,
}

/// Glyph resolved to a concrete face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlyphId {
    pub face: u16,
    pub index: u16,
}

/// 8-bit coverage bitmap positioned against the pen
#[derive(Debug, Clone, Default)]
pub struct RasterGlyph {
    /// Offset of the bitmap's left edge from the pen position
    pub left: i32,
    /// Height of the bitmap's top edge above the baseline
    pub top: i32,
    pub width: usize,
    pub height: usize,
    /// Row-major, one byte per pixel
    pub coverage: Vec<u8>,
}

/// Source of glyphs for the renderer
pub trait FontEngine {
    fn metrics(&self) -> FontMetrics;

    /// Resolve a character, falling back across faces; missing glyphs
    /// resolve to the primary face's notdef
    fn glyph(&mut self, ch: char, style: FontStyle) -> GlyphId;

    /// Coverage bitmap for a resolved glyph (cached)
    fn rasterize(&mut self, glyph: GlyphId) -> &RasterGlyph;

    /// Current pixel size
    fn size(&self) -> f32;

    /// Change pixel size; cached bitmaps and metrics are rebuilt
    fn set_size(&mut self, px: f32);
}

#[cfg(test)]
pub(crate) mod testing;
