//! fontdue-backed glyph source
//!
//! Faces are loaded once per style; glyph indices are resolved with
//! fallback and cached, bitmaps are cached per pixel size.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use fontdue::{Font, FontSettings};
use log::{debug, info, warn};

use super::fontconfig::{resolve_font, FontFinder};
use super::{FontEngine, FontMetrics, FontStyle, GlyphId, RasterGlyph};

const STYLED: [FontStyle; 3] = [FontStyle::Bold, FontStyle::Italic, FontStyle::BoldItalic];

/// Glyph source over fontdue faces
pub struct FontdueEngine {
    /// Regular face first, then styled faces, then fallbacks
    faces: Vec<Font>,
    /// Face index used for each style
    styles: [u16; 4],
    /// Faces searched when the styled and regular faces lack a glyph
    fallbacks: Vec<u16>,
    size: f32,
    width_scale: f32,
    height_scale: f32,
    metrics: FontMetrics,
    lookup: HashMap<(char, FontStyle), GlyphId>,
    bitmaps: HashMap<GlyphId, RasterGlyph>,
    /// Returned for ids that do not name a loaded face
    empty: RasterGlyph,
}

impl FontdueEngine {
    /// Load `family` (name or path) in all styles plus a CJK fallback
    pub fn load(family: &str, size: f32, width_scale: f32, height_scale: f32) -> Result<Self> {
        let finder = FontFinder::new()?;

        let regular = parse_face(resolve_font(&finder, family, FontStyle::Regular)?)?;
        let mut engine = Self::new(regular, size, width_scale, height_scale)?;

        for style in STYLED {
            match resolve_font(&finder, family, style).and_then(parse_face) {
                Ok(face) => engine.add_style(style, face),
                Err(e) => debug!("{:?} face unavailable, using regular: {}", style, e),
            }
        }

        if let Some(cjk) = finder.find_cjk() {
            match super::fontconfig::load_font_file(&cjk.path).and_then(parse_face) {
                Ok(face) => {
                    info!("CJK fallback font loaded: {}", cjk.family);
                    engine.add_fallback(face);
                }
                Err(e) => warn!("Failed to load CJK font (continuing): {}", e),
            }
        }

        Ok(engine)
    }

    /// Engine over a single regular face
    pub fn new(regular: Font, size: f32, width_scale: f32, height_scale: f32) -> Result<Self> {
        let metrics = compute_metrics(&regular, size, width_scale, height_scale)?;
        info!(
            "Font metrics: size={:.1}, cell={}x{}, ascent={}",
            size, metrics.cell_width, metrics.cell_height, metrics.ascent
        );
        Ok(Self {
            faces: vec![regular],
            styles: [0; 4],
            fallbacks: Vec::new(),
            size,
            width_scale,
            height_scale,
            metrics,
            lookup: HashMap::new(),
            bitmaps: HashMap::new(),
            empty: RasterGlyph::default(),
        })
    }

    pub fn add_style(&mut self, style: FontStyle, face: Font) {
        self.styles[style.index()] = self.push_face(face);
        self.lookup.clear();
    }

    pub fn add_fallback(&mut self, face: Font) {
        let index = self.push_face(face);
        self.fallbacks.push(index);
        self.lookup.clear();
    }

    fn push_face(&mut self, face: Font) -> u16 {
        self.faces.push(face);
        (self.faces.len() - 1) as u16
    }
}

impl FontEngine for FontdueEngine {
    fn metrics(&self) -> FontMetrics {
        self.metrics
    }

    fn glyph(&mut self, ch: char, style: FontStyle) -> GlyphId {
        if let Some(&id) = self.lookup.get(&(ch, style)) {
            return id;
        }

        let primary = self.styles[style.index()];
        let faces = &self.faces;
        let id = std::iter::once(primary)
            .chain(std::iter::once(0))
            .chain(self.fallbacks.iter().copied())
            .find_map(|face| {
                let index = faces[face as usize].lookup_glyph_index(ch);
                (index != 0).then_some(GlyphId { face, index })
            })
            .unwrap_or(GlyphId {
                face: primary,
                index: 0,
            });

        self.lookup.insert((ch, style), id);
        id
    }

    fn rasterize(&mut self, glyph: GlyphId) -> &RasterGlyph {
        let Some(font) = self.faces.get(glyph.face as usize) else {
            return &self.empty;
        };
        let size = self.size;
        self.bitmaps.entry(glyph).or_insert_with(|| {
            let (m, coverage) = font.rasterize_indexed(glyph.index, size);
            RasterGlyph {
                left: m.xmin,
                top: m.ymin + m.height as i32,
                width: m.width,
                height: m.height,
                coverage,
            }
        })
    }

    fn size(&self) -> f32 {
        self.size
    }

    fn set_size(&mut self, px: f32) {
        match compute_metrics(&self.faces[0], px, self.width_scale, self.height_scale) {
            Ok(metrics) => {
                info!(
                    "Font size {:.1} -> {:.1}, cell={}x{}",
                    self.size, px, metrics.cell_width, metrics.cell_height
                );
                self.size = px;
                self.metrics = metrics;
                self.bitmaps.clear();
            }
            Err(e) => warn!("Keeping font size {:.1}: {}", self.size, e),
        }
    }
}

fn parse_face(data: Vec<u8>) -> Result<Font> {
    Font::from_bytes(data, FontSettings::default()).map_err(|e| anyhow!("Failed to load font: {}", e))
}

fn compute_metrics(font: &Font, size: f32, width_scale: f32, height_scale: f32) -> Result<FontMetrics> {
    let line = font
        .horizontal_line_metrics(size)
        .ok_or_else(|| anyhow!("Cannot get line metrics"))?;
    let advance = font.metrics('M', size).advance_width;
    let advance = if advance > 0.0 { advance } else { size * 0.6 };
    Ok(cell_metrics(
        line.ascent,
        line.descent,
        line.line_gap,
        advance,
        width_scale,
        height_scale,
    ))
}

/// Cell size from face metrics; descent is negative as fontdue reports it
fn cell_metrics(
    ascent: f32,
    descent: f32,
    line_gap: f32,
    advance: f32,
    width_scale: f32,
    height_scale: f32,
) -> FontMetrics {
    let cell_width = (advance * width_scale).ceil().max(1.0) as u32;
    let cell_height = ((ascent - descent + line_gap) * height_scale).ceil().max(1.0) as u32;
    let ascent = (ascent.ceil().max(0.0) as u32).min(cell_height);
    FontMetrics {
        cell_width,
        cell_height,
        ascent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_metrics() {
        let m = cell_metrics(12.2, -3.4, 0.0, 8.4, 1.0, 1.0);
        assert_eq!(m.cell_width, 9);
        assert_eq!(m.cell_height, 16);
        assert_eq!(m.ascent, 13);
    }

    #[test]
    fn test_cell_metrics_scaled() {
        let m = cell_metrics(10.0, -2.0, 0.0, 6.0, 1.5, 2.0);
        assert_eq!(m.cell_width, 9);
        assert_eq!(m.cell_height, 24);
        assert_eq!(m.ascent, 10);
    }

    #[test]
    fn test_style_from_flags() {
        assert_eq!(FontStyle::from_flags(true, true), FontStyle::BoldItalic);
        assert_eq!(FontStyle::from_flags(false, true), FontStyle::Italic);
        assert_eq!(FontStyle::from_flags(false, false).index(), 0);
    }
}
