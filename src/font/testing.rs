//! Deterministic glyph source for tests
//!
//! Every glyph is a box inset by one pixel from its cell(s), filled with
//! a coverage pattern derived from the character and face so different
//! glyphs produce different pixels.

use std::collections::HashMap;

use unicode_width::UnicodeWidthChar;

use super::{FontEngine, FontMetrics, FontStyle, GlyphId, RasterGlyph};

pub struct BoxFont {
    size: f32,
    bitmaps: HashMap<GlyphId, RasterGlyph>,
}

impl BoxFont {
    pub fn new() -> Self {
        Self {
            size: 10.0,
            bitmaps: HashMap::new(),
        }
    }
}

impl FontEngine for BoxFont {
    fn metrics(&self) -> FontMetrics {
        let cell_width = (self.size * 0.6).round() as u32;
        let cell_height = self.size as u32;
        FontMetrics {
            cell_width,
            cell_height,
            ascent: cell_height * 4 / 5,
        }
    }

    fn glyph(&mut self, ch: char, style: FontStyle) -> GlyphId {
        GlyphId {
            face: style.index() as u16,
            index: ch as u32 as u16,
        }
    }

    fn rasterize(&mut self, glyph: GlyphId) -> &RasterGlyph {
        let m = self.metrics();
        self.bitmaps.entry(glyph).or_insert_with(|| {
            let ch = char::from_u32(glyph.index as u32).unwrap_or(' ');
            if ch == ' ' {
                return RasterGlyph::default();
            }
            let cells = ch.width().unwrap_or(1).max(1) as u32;
            let width = (m.cell_width * cells - 2) as usize;
            let height = (m.cell_height - 2) as usize;
            let coverage = (0..width * height)
                .map(|i| ((glyph.index as usize * 7 + glyph.face as usize * 31 + i * 13) % 256) as u8)
                .collect();
            RasterGlyph {
                left: 1,
                top: m.ascent as i32 - 1,
                width,
                height,
                coverage,
            }
        })
    }

    fn size(&self) -> f32 {
        self.size
    }

    fn set_size(&mut self, px: f32) {
        self.size = px;
        self.bitmaps.clear();
    }
}
