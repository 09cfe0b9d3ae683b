//! Utility functions shared across glint

pub mod color;

pub use color::{default_palette, parse_hex_color, parse_osc_color, Rgb};
