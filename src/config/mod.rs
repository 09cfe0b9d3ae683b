//! Configuration file management
//!
//! Loads TOML configuration files and provides application settings.
//! Default config path: ~/.config/glint/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    ACTIVE_FPS, BLINK_INTERVAL_MS, DOUBLE_CLICK_THRESHOLD_MS, IDLE_FPS, TRANSFER_TIMEOUT_MS,
    TRIPLE_CLICK_THRESHOLD_MS,
};
use crate::terminal::grid::CursorStyle;
use crate::utils::color::{default_palette, parse_hex_color, Rgb};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Font settings
    pub font: FontConfig,
    /// Appearance settings
    pub appearance: AppearanceConfig,
    /// Color scheme settings (ANSI 16 colors)
    pub colors: ColorsConfig,
    /// Frame rate, blink and click timing
    pub timing: TimingConfig,
    /// Selection settings
    pub selection: SelectionConfig,
    /// Terminal settings
    pub terminal: TerminalConfig,
    /// Keyboard layout settings
    pub keyboard: KeyboardConfig,
    /// Keybind settings
    pub keybinds: KeybindConfig,
}

/// Font settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Family name or file path (searches system monospace fonts if empty)
    pub family: String,
    /// Pixel size
    pub size: f32,
    /// Cell width scale relative to the advance of 'M'
    pub cell_width_scale: f32,
    /// Cell height scale relative to ascent + descent
    pub cell_height_scale: f32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: String::new(),
            size: 16.0,
            cell_width_scale: 1.0,
            cell_height_scale: 1.0,
        }
    }
}

/// Appearance settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    /// Background color (RRGGBB)
    pub background: String,
    /// Foreground color (RRGGBB)
    pub foreground: String,
    /// Cursor color (RRGGBB)
    pub cursor: String,
    /// Cursor color over selected cells and in reverse video (RRGGBB)
    pub reverse_cursor: String,
    /// Inner border in pixels
    pub border: u32,
    /// "block" | "underline" | "bar"
    pub cursor_shape: String,
    /// Underline/bar cursor thickness in pixels
    pub cursor_thickness: u32,
    /// Promote colors 0-7 to 8-15 on bold text
    pub bold_is_bright: bool,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            background: "000000".to_string(),
            foreground: "e5e5e5".to_string(),
            cursor: "cccccc".to_string(),
            reverse_cursor: "555555".to_string(),
            border: 2,
            cursor_shape: "block".to_string(),
            cursor_thickness: 2,
            bold_is_bright: true,
        }
    }
}

/// Color scheme settings (ANSI 16 colors)
/// Colors are specified as RRGGBB hex strings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    pub black: String,
    pub red: String,
    pub green: String,
    pub yellow: String,
    pub blue: String,
    pub magenta: String,
    pub cyan: String,
    pub white: String,
    pub bright_black: String,
    pub bright_red: String,
    pub bright_green: String,
    pub bright_yellow: String,
    pub bright_blue: String,
    pub bright_magenta: String,
    pub bright_cyan: String,
    pub bright_white: String,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            black: "000000".to_string(),
            red: "cd0000".to_string(),
            green: "00cd00".to_string(),
            yellow: "cdcd00".to_string(),
            blue: "0000ee".to_string(),
            magenta: "cd00cd".to_string(),
            cyan: "00cdcd".to_string(),
            white: "e5e5e5".to_string(),
            bright_black: "7f7f7f".to_string(),
            bright_red: "ff0000".to_string(),
            bright_green: "00ff00".to_string(),
            bright_yellow: "ffff00".to_string(),
            bright_blue: "5c5cff".to_string(),
            bright_magenta: "ff00ff".to_string(),
            bright_cyan: "00ffff".to_string(),
            bright_white: "ffffff".to_string(),
        }
    }
}

impl ColorsConfig {
    /// Build the full 256-color table with the configured ANSI colors on top.
    /// Unparseable entries keep the built-in value.
    pub fn to_palette(&self) -> [Rgb; 256] {
        let mut palette = default_palette();
        let ansi = [
            &self.black,
            &self.red,
            &self.green,
            &self.yellow,
            &self.blue,
            &self.magenta,
            &self.cyan,
            &self.white,
            &self.bright_black,
            &self.bright_red,
            &self.bright_green,
            &self.bright_yellow,
            &self.bright_blue,
            &self.bright_magenta,
            &self.bright_cyan,
            &self.bright_white,
        ];
        for (i, hex) in ansi.iter().enumerate() {
            match parse_hex_color(hex) {
                Some(rgb) => palette[i] = rgb,
                None => warn!("Invalid color {} for index {}, using default", hex, i),
            }
        }
        palette
    }
}

/// Frame rate, blink and click timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Second click within this many ms snaps to words
    pub double_click_ms: u64,
    /// Third click within this many ms of the first snaps to lines
    pub triple_click_ms: u64,
    /// Blink interval in ms (0 = never blink)
    pub blink_ms: u64,
    /// Frame rate while there is window-system activity
    pub active_fps: u32,
    /// Frame rate otherwise
    pub idle_fps: u32,
    /// Stalled chunked paste transfers are abandoned after this many ms
    pub transfer_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            double_click_ms: DOUBLE_CLICK_THRESHOLD_MS,
            triple_click_ms: TRIPLE_CLICK_THRESHOLD_MS,
            blink_ms: BLINK_INTERVAL_MS,
            active_fps: ACTIVE_FPS,
            idle_fps: IDLE_FPS,
            transfer_timeout_ms: TRANSFER_TIMEOUT_MS,
        }
    }
}

impl TimingConfig {
    pub fn double_click(&self) -> Duration {
        Duration::from_millis(self.double_click_ms)
    }

    pub fn triple_click(&self) -> Duration {
        Duration::from_millis(self.triple_click_ms)
    }

    pub fn blink(&self) -> Option<Duration> {
        (self.blink_ms > 0).then(|| Duration::from_millis(self.blink_ms))
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

/// Selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Characters that end a word for double-click selection
    pub word_delimiters: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            word_delimiters: " ".to_string(),
        }
    }
}

/// Terminal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// TERM environment variable for the child
    pub term: String,
    /// Shell override (falls back to $SHELL, then /bin/sh)
    pub shell: String,
    /// Initial columns
    pub cols: u16,
    /// Initial rows
    pub rows: u16,
    /// Honour alternate screen requests
    pub allow_altscreen: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            shell: String::new(),
            cols: 80,
            rows: 24,
            allow_altscreen: true,
        }
    }
}

/// Keyboard layout settings (passed to xkbcommon)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    pub xkb_model: String,
    pub xkb_layout: String,
    pub xkb_variant: String,
    pub xkb_options: String,
}

/// Keybind settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybindConfig {
    /// Copy PRIMARY into CLIPBOARD (default: "ctrl+shift+c")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub copy: Vec<String>,
    /// Paste CLIPBOARD (default: "ctrl+shift+v")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub paste: Vec<String>,
    /// Paste PRIMARY (default: "shift+insert", "ctrl+shift+y")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub paste_selection: Vec<String>,
    /// Font increase (default: "ctrl+shift+pageup")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub font_increase: Vec<String>,
    /// Font decrease (default: "ctrl+shift+pagedown")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub font_decrease: Vec<String>,
    /// Font reset (default: "ctrl+shift+home")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub font_reset: Vec<String>,
}

impl Default for KeybindConfig {
    fn default() -> Self {
        Self {
            copy: vec!["ctrl+shift+c".to_string()],
            paste: vec!["ctrl+shift+v".to_string()],
            paste_selection: vec!["shift+insert".to_string(), "ctrl+shift+y".to_string()],
            font_increase: vec!["ctrl+shift+pageup".to_string()],
            font_decrease: vec!["ctrl+shift+pagedown".to_string()],
            font_reset: vec!["ctrl+shift+home".to_string()],
        }
    }
}

/// Keybind deserializer: accepts string or array
fn deserialize_keybind<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct KeybindVisitor;

    impl<'de> Visitor<'de> for KeybindVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or array of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut keys = Vec::new();
            while let Some(key) = seq.next_element::<String>()? {
                keys.push(key);
            }
            Ok(keys)
        }
    }

    deserializer.deserialize_any(KeybindVisitor)
}

impl AppearanceConfig {
    fn color_or(hex: &str, fallback: Rgb) -> Rgb {
        parse_hex_color(hex).unwrap_or_else(|| {
            warn!("Invalid color {}, using default", hex);
            fallback
        })
    }

    pub fn background_rgb(&self) -> Rgb {
        Self::color_or(&self.background, Rgb::new(0, 0, 0))
    }

    pub fn foreground_rgb(&self) -> Rgb {
        Self::color_or(&self.foreground, Rgb::new(0xe5, 0xe5, 0xe5))
    }

    pub fn cursor_rgb(&self) -> Rgb {
        Self::color_or(&self.cursor, Rgb::new(0xcc, 0xcc, 0xcc))
    }

    pub fn reverse_cursor_rgb(&self) -> Rgb {
        Self::color_or(&self.reverse_cursor, Rgb::new(0x55, 0x55, 0x55))
    }

    pub fn cursor_style(&self) -> CursorStyle {
        match self.cursor_shape.to_ascii_lowercase().as_str() {
            "block" => CursorStyle::Block,
            "underline" => CursorStyle::Underline,
            "bar" | "beam" => CursorStyle::Bar,
            other => {
                warn!("Unknown cursor shape {}, using block", other);
                CursorStyle::Block
            }
        }
    }
}

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/glint/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. GLINT_CONFIG environment variable
        if let Ok(path) = std::env::var("GLINT_CONFIG") {
            let p = std::path::Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/glint/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("glint").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/glint/config.toml
        let system_config = std::path::Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. GLINT_CONFIG environment variable
    /// 2. ~/.config/glint/config.toml (user config)
    /// 3. /etc/glint/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Parsed keybind string
/// Example: "ctrl+shift+c" -> (ctrl: true, shift: true, key: "c")
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedKeybind {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub super_key: bool,
    pub key: String,
}

impl ParsedKeybind {
    pub fn parse(s: &str) -> Self {
        let mut result = Self::default();

        for part in s.split('+').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => result.ctrl = true,
                "shift" => result.shift = true,
                "alt" | "meta" => result.alt = true,
                "super" | "mod4" => result.super_key = true,
                _ => result.key = part.to_string(),
            }
        }

        result
    }
}
