//! Color table
//!
//! 256 indexed colors plus the default foreground, background, cursor and
//! reverse cursor, with the configured values kept for resets.

use log::debug;

use crate::config::Config;
use crate::terminal::grid::Color;
use crate::terminal::ColorSlot;
use crate::utils::color::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Specials {
    fg: Rgb,
    bg: Rgb,
    cursor: Rgb,
    rcursor: Rgb,
}

#[derive(Debug, Clone)]
pub struct Palette {
    colors: [Rgb; 256],
    specials: Specials,
    default_colors: [Rgb; 256],
    default_specials: Specials,
}

impl Palette {
    pub fn new(colors: [Rgb; 256], fg: Rgb, bg: Rgb, cursor: Rgb, rcursor: Rgb) -> Self {
        let specials = Specials {
            fg,
            bg,
            cursor,
            rcursor,
        };
        Self {
            colors,
            specials,
            default_colors: colors,
            default_specials: specials,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let appearance = &config.appearance;
        Self::new(
            config.colors.to_palette(),
            appearance.foreground_rgb(),
            appearance.background_rgb(),
            appearance.cursor_rgb(),
            appearance.reverse_cursor_rgb(),
        )
    }

    pub fn indexed(&self, index: u8) -> Rgb {
        self.colors[index as usize]
    }

    pub fn fg(&self) -> Rgb {
        self.specials.fg
    }

    pub fn bg(&self) -> Rgb {
        self.specials.bg
    }

    pub fn cursor(&self) -> Rgb {
        self.specials.cursor
    }

    pub fn rcursor(&self) -> Rgb {
        self.specials.rcursor
    }

    /// Resolve a cell color; `Default` means the default fg or bg
    pub fn resolve(&self, color: Color, foreground: bool) -> Rgb {
        match color {
            Color::Default if foreground => self.specials.fg,
            Color::Default => self.specials.bg,
            Color::Indexed(i) => self.colors[i as usize],
            Color::Rgb(rgb) => rgb,
        }
    }

    /// Change one slot; `None` restores its configured value
    pub fn set(&mut self, slot: ColorSlot, rgb: Option<Rgb>) {
        debug!("Palette {:?} -> {:?}", slot, rgb);
        match slot {
            ColorSlot::Indexed(i) => {
                let i = i as usize;
                self.colors[i] = rgb.unwrap_or(self.default_colors[i]);
            }
            ColorSlot::Foreground => {
                self.specials.fg = rgb.unwrap_or(self.default_specials.fg);
            }
            ColorSlot::Background => {
                self.specials.bg = rgb.unwrap_or(self.default_specials.bg);
            }
            ColorSlot::Cursor => {
                self.specials.cursor = rgb.unwrap_or(self.default_specials.cursor);
            }
        }
    }

    pub fn reset(&mut self) {
        self.colors = self.default_colors;
        self.specials = self.default_specials;
    }
}
