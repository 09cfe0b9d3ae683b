//! Terminal emulation
//!
//! Terminal model consumed by the front-end: the VT parser applied to the
//! character grid, plus the events the model raises for the window
//! (title, bell, replies to the child, palette changes, scrolls).

pub mod grid;
pub mod parser;
pub mod pty;

use log::trace;

use grid::{Cell, CellAttrs, CursorStyle, Grid, TermMode};
use parser::Performer;

use crate::utils::color::Rgb;

/// Palette slot targeted by an OSC color change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSlot {
    Indexed(u8),
    Foreground,
    Background,
    Cursor,
}

/// Notification raised while interpreting child output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// OSC 0/2
    Title(String),
    /// BEL
    Bell,
    /// Bytes to write back to the child (DSR, DA)
    Reply(Vec<u8>),
    /// Rows `top..=bottom` moved by `delta` (negative is up).
    /// Consecutive scrolls of one region arrive merged.
    Scrolled {
        top: usize,
        bottom: usize,
        delta: isize,
    },
    /// Palette entry changed; `None` restores the default
    SetColor { slot: ColorSlot, rgb: Option<Rgb> },
    /// OSC 104 / RIS
    ResetPalette,
}

/// Terminal model
pub struct Terminal {
    grid: Grid,
    parser: vte::Parser,
}

impl Terminal {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            grid: Grid::new(cols, rows),
            parser: vte::Parser::new(),
        }
    }

    /// Interpret child output
    pub fn feed(&mut self, bytes: &[u8]) {
        trace!("Feeding {} bytes", bytes.len());
        let mut performer = Performer::new(&mut self.grid);
        for &byte in bytes {
            self.parser.advance(&mut performer, byte);
        }
    }

    /// Drain events raised since the last call
    pub fn take_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.grid.events)
    }

    pub fn cols(&self) -> usize {
        self.grid.cols()
    }

    pub fn rows(&self) -> usize {
        self.grid.rows()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.grid.cell(row, col)
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.grid.row(row)
    }

    pub fn mode(&self) -> TermMode {
        self.grid.mode
    }

    /// Flip the blink phase
    pub fn toggle_blink(&mut self) {
        self.grid.mode.toggle(TermMode::BLINK);
    }

    /// Return to the visible blink phase
    pub fn clear_blink(&mut self) {
        self.grid.mode.remove(TermMode::BLINK);
    }

    /// Cursor position as (col, row)
    pub fn cursor(&self) -> (usize, usize) {
        (self.grid.cursor_col, self.grid.cursor_row)
    }

    pub fn cursor_style(&self) -> CursorStyle {
        self.grid.cursor_style
    }

    /// Shape used until the child picks one with DECSCUSR
    pub fn set_default_cursor_style(&mut self, style: CursorStyle) {
        self.grid.default_cursor_style = style;
        self.grid.cursor_style = style;
    }

    /// With `false`, requests for the alternate screen are ignored
    pub fn set_allow_altscreen(&mut self, allow: bool) {
        self.grid.allow_altscreen = allow;
    }

    pub fn scroll_region(&self) -> (usize, usize) {
        self.grid.scroll_region()
    }

    pub fn is_dirty(&self, row: usize) -> bool {
        self.grid.is_dirty(row)
    }

    pub fn clear_dirty(&mut self, row: usize) {
        self.grid.clear_dirty(row);
    }

    pub fn set_dirty(&mut self, top: usize, bottom: usize) {
        self.grid.set_dirty(top, bottom);
    }

    pub fn set_full_dirty(&mut self) {
        self.grid.set_full_dirty();
    }

    pub fn set_dirty_attr(&mut self, attr: CellAttrs) {
        self.grid.set_dirty_attr(attr);
    }

    pub fn has_attr(&self, attr: CellAttrs) -> bool {
        self.grid.has_attr(attr)
    }

    pub fn line_len(&self, row: usize) -> usize {
        self.grid.line_len(row)
    }

    pub fn resize(&mut self, cols: usize, rows: usize) {
        self.grid.resize(cols, rows);
    }
}
