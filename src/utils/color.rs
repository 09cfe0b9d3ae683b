//! Color parsing and the 256-color table
//!
//! Hex strings from the config file and OSC color specifications both
//! end up as [`Rgb`] values, which the renderer packs into pixels.

/// 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Pack as 0x00RRGGBB (the back buffer pixel format)
    #[inline]
    pub const fn to_pixel(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// Bitwise inverse, used by global reverse video for non-default colors
    #[inline]
    pub const fn inverted(self) -> Self {
        Self::new(!self.r, !self.g, !self.b)
    }

    /// Half intensity (faint)
    #[inline]
    pub const fn halved(self) -> Self {
        Self::new(self.r / 2, self.g / 2, self.b / 2)
    }
}

/// Parse 6-digit hex color (e.g., "ff0000" -> (255, 0, 0))
/// Also supports 3-digit short format (e.g., "f00" -> (255, 0, 0))
/// Returns None on invalid input.
pub fn parse_hex_color(hex: &str) -> Option<Rgb> {
    let hex = hex.trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some(Rgb::new(r, g, b))
        }
        3 => {
            // Short format: expand F -> FF
            let r = u8::from_str_radix(&hex[0..1], 16).ok()? * 17;
            let g = u8::from_str_radix(&hex[1..2], 16).ok()? * 17;
            let b = u8::from_str_radix(&hex[2..3], 16).ok()? * 17;
            Some(Rgb::new(r, g, b))
        }
        _ => None,
    }
}

/// Parse OSC color specification formats.
///
/// Supported formats:
/// - rgb:RR/GG/BB (X11 format, 8-bit per component)
/// - rgb:RRRR/GGGG/BBBB (X11 format, 16-bit per component)
/// - #RRGGBB (hex format)
/// - #RGB (short hex format)
pub fn parse_osc_color(data: &[u8]) -> Option<Rgb> {
    let s = std::str::from_utf8(data).ok()?;

    if let Some(hex) = s.strip_prefix('#') {
        parse_hex_color(hex)
    } else if let Some(rgb) = s.strip_prefix("rgb:") {
        let parts: Vec<&str> = rgb.split('/').collect();
        if parts.len() != 3 {
            return None;
        }

        // Use the high byte of wider components
        let parse_component = |s: &str| -> Option<u8> {
            let v = u16::from_str_radix(s, 16).ok()?;
            match s.len() {
                4 => Some((v >> 8) as u8),
                2 => Some(v as u8),
                1 => Some((v as u8) * 17),
                _ => None,
            }
        };

        Some(Rgb::new(
            parse_component(parts[0])?,
            parse_component(parts[1])?,
            parse_component(parts[2])?,
        ))
    } else {
        None
    }
}

/// Built-in 256-color table (compile-time generated).
///
/// Entries 0-15 are xterm's defaults and are normally overridden by the
/// configured ANSI colors. 16-231 are the 6x6x6 cube, 232-255 the gray ramp.
pub const fn default_palette() -> [Rgb; 256] {
    let mut palette = [Rgb::new(0, 0, 0); 256];

    const fn cube_val(v: u8) -> u8 {
        if v == 0 { 0 } else { 55 + 40 * v }
    }

    palette[0] = Rgb::new(0, 0, 0);
    palette[1] = Rgb::new(205, 0, 0);
    palette[2] = Rgb::new(0, 205, 0);
    palette[3] = Rgb::new(205, 205, 0);
    palette[4] = Rgb::new(0, 0, 238);
    palette[5] = Rgb::new(205, 0, 205);
    palette[6] = Rgb::new(0, 205, 205);
    palette[7] = Rgb::new(229, 229, 229);
    palette[8] = Rgb::new(127, 127, 127);
    palette[9] = Rgb::new(255, 0, 0);
    palette[10] = Rgb::new(0, 255, 0);
    palette[11] = Rgb::new(255, 255, 0);
    palette[12] = Rgb::new(92, 92, 255);
    palette[13] = Rgb::new(255, 0, 255);
    palette[14] = Rgb::new(0, 255, 255);
    palette[15] = Rgb::new(255, 255, 255);

    let mut i = 16usize;
    while i < 232 {
        let n = (i - 16) as u8;
        palette[i] = Rgb::new(cube_val(n / 36), cube_val((n / 6) % 6), cube_val(n % 6));
        i += 1;
    }

    let mut i = 232usize;
    while i < 256 {
        let v = (8 + 10 * (i - 232)) as u8;
        palette[i] = Rgb::new(v, v, v);
        i += 1;
    }

    palette
}
