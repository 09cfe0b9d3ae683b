//! fontconfig integration
//!
//! Search and select system fonts

use anyhow::{anyhow, Result};
use fontconfig::Fontconfig;
use log::{info, warn};
use std::path::{Path, PathBuf};

use super::FontStyle;

/// Font search result
#[derive(Debug, Clone)]
pub struct FontMatch {
    /// Font file path
    pub path: PathBuf,
    /// Font name
    pub family: String,
}

/// Search fonts using fontconfig
pub struct FontFinder {
    fc: Fontconfig,
}

impl FontFinder {
    /// Initialize FontFinder
    pub fn new() -> Result<Self> {
        let fc = Fontconfig::new().ok_or_else(|| anyhow!("fontconfig initialization failed"))?;
        info!("fontconfig initialized");
        Ok(Self { fc })
    }

    /// Search by family name and style
    /// Verifies that the returned font actually matches the requested family name
    /// (fontconfig always returns the "closest" match, even if completely unrelated)
    pub fn find_font(&self, family: &str, style: FontStyle) -> Option<FontMatch> {
        let font = self.fc.find(family, style_name(style))?;
        if !family_matches(family, &font.name) {
            warn!(
                "fontconfig: rejected false match for \"{}\": got \"{}\"",
                family, font.name
            );
            return None;
        }
        if style != FontStyle::Regular && !style_matches(style, &font.path) {
            // fontconfig hands back the regular face when the style is missing
            return None;
        }
        Some(FontMatch {
            path: font.path,
            family: font.name,
        })
    }

    /// Search for monospace font
    pub fn find_monospace(&self, style: FontStyle) -> Option<FontMatch> {
        // Fallback candidates
        let fallbacks = [
            "DejaVu Sans Mono",
            "Liberation Mono",
            "Noto Sans Mono",
            "Source Code Pro",
            "Inconsolata",
            "Courier New",
            "monospace",
        ];

        for name in fallbacks {
            if let Some(m) = self.find_font(name, style) {
                return Some(m);
            }
        }

        if style == FontStyle::Regular {
            warn!("Monospace font not found");
        }
        None
    }

    /// Search for CJK font
    pub fn find_cjk(&self) -> Option<FontMatch> {
        let candidates = [
            "Noto Sans CJK JP",
            "Noto Sans CJK",
            "Source Han Sans",
            "IPA Gothic",
            "IPAGothic",
            "VL Gothic",
            "Takao Gothic",
        ];

        for name in candidates {
            if let Some(m) = self.find_font(name, FontStyle::Regular) {
                return Some(m);
            }
        }

        warn!("CJK font not found");
        None
    }
}

fn style_name(style: FontStyle) -> Option<&'static str> {
    match style {
        FontStyle::Regular => None,
        FontStyle::Bold => Some("Bold"),
        FontStyle::Italic => Some("Italic"),
        FontStyle::BoldItalic => Some("Bold Italic"),
    }
}

fn family_matches(requested: &str, got: &str) -> bool {
    let req = requested.to_ascii_lowercase();
    let got = got.to_ascii_lowercase();
    got.contains(&req) || req.contains(&got)
}

/// Whether the file name looks like the requested style ("Oblique" counts as italic)
fn style_matches(style: FontStyle, path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let bold = name.contains("bold");
    let italic = name.contains("italic") || name.contains("oblique");
    match style {
        FontStyle::Regular => true,
        FontStyle::Bold => bold && !italic,
        FontStyle::Italic => italic && !bold,
        FontStyle::BoldItalic => bold && italic,
    }
}

/// Load font file
pub fn load_font_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| anyhow!("Failed to read font file: {} ({})", path.display(), e))
}

/// Resolve a font specifier for one style: an existing path is read
/// directly (regular style only), otherwise it is a family name searched
/// via fontconfig. An empty specifier selects the first available
/// monospace family.
pub fn resolve_font(finder: &FontFinder, specifier: &str, style: FontStyle) -> Result<Vec<u8>> {
    let path = Path::new(specifier);
    if !specifier.is_empty() && path.exists() {
        if style != FontStyle::Regular {
            return Err(anyhow!("No {:?} variant for font file {}", style, specifier));
        }
        info!("Font loaded from path: {}", specifier);
        return load_font_file(path);
    }

    let found = if specifier.is_empty() {
        finder.find_monospace(style)
    } else {
        finder
            .find_font(specifier, style)
            .or_else(|| finder.find_monospace(style))
    };

    match found {
        Some(font_match) => {
            info!(
                "Font resolved ({:?}): \"{}\" → {} ({})",
                style,
                specifier,
                font_match.family,
                font_match.path.display()
            );
            load_font_file(&font_match.path)
        }
        None => Err(anyhow!(
            "Font not found: \"{}\" {:?} (not a valid path or font name)",
            specifier,
            style
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_matches() {
        assert!(family_matches("DejaVu Sans Mono", "DejaVu Sans Mono"));
        assert!(family_matches("dejavu", "DejaVu Sans Mono"));
        assert!(!family_matches("Hack", "DejaVu Sans"));
    }

    #[test]
    fn test_style_matches_file_names() {
        let bold = Path::new("/usr/share/fonts/DejaVuSansMono-Bold.ttf");
        let oblique = Path::new("/usr/share/fonts/DejaVuSansMono-Oblique.ttf");
        let both = Path::new("/usr/share/fonts/DejaVuSansMono-BoldOblique.ttf");
        assert!(style_matches(FontStyle::Bold, bold));
        assert!(!style_matches(FontStyle::Bold, both));
        assert!(style_matches(FontStyle::Italic, oblique));
        assert!(style_matches(FontStyle::BoldItalic, both));
        assert!(!style_matches(FontStyle::Italic, bold));
    }
}
