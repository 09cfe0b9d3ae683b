//! Window geometry and focus bookkeeping
//!
//! Pixel size of the window, the text area inside the border and the
//! cell size, plus visibility/focus flags read by the renderer.

use bitflags::bitflags;

use crate::font::FontMetrics;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WinMode: u8 {
        /// Mapped and not fully obscured
        const VISIBLE = 1 << 0;
        /// Has keyboard focus
        const FOCUSED = 1 << 1;
    }
}

/// Window/surface state shared by the renderer and the scheduler
#[derive(Debug, Clone)]
pub struct WindowState {
    /// Window size in pixels
    pub width: u32,
    pub height: u32,
    /// Text area size in pixels (cols * cw, rows * ch)
    pub tw: u32,
    pub th: u32,
    /// Cell size in pixels
    pub cw: u32,
    pub ch: u32,
    /// Baseline offset inside a cell
    pub ascent: u32,
    /// Border width in pixels
    pub border: u32,
    /// Window managers are asked to keep the size
    pub fixed: bool,
    pub mode: WinMode,
}

impl WindowState {
    /// Window sized to hold `cols` x `rows` cells
    pub fn new(cols: usize, rows: usize, metrics: FontMetrics, border: u32) -> Self {
        let mut win = Self {
            width: 0,
            height: 0,
            tw: 0,
            th: 0,
            cw: 1,
            ch: 1,
            ascent: 0,
            border,
            fixed: false,
            mode: WinMode::VISIBLE,
        };
        win.set_metrics(metrics);
        win.width = 2 * border + cols as u32 * win.cw;
        win.height = 2 * border + rows as u32 * win.ch;
        win.tw = cols as u32 * win.cw;
        win.th = rows as u32 * win.ch;
        win
    }

    pub fn set_metrics(&mut self, metrics: FontMetrics) {
        self.cw = metrics.cell_width.max(1);
        self.ch = metrics.cell_height.max(1);
        self.ascent = metrics.ascent;
    }

    /// Grid size that fits a `width` x `height` window
    pub fn grid_size(&self, width: u32, height: u32) -> (usize, usize) {
        let cols = width.saturating_sub(2 * self.border) / self.cw;
        let rows = height.saturating_sub(2 * self.border) / self.ch;
        (cols.max(1) as usize, rows.max(1) as usize)
    }

    /// Adopt a new window size; returns the grid size it holds
    pub fn resize(&mut self, width: u32, height: u32) -> (usize, usize) {
        let (cols, rows) = self.grid_size(width, height);
        self.width = width;
        self.height = height;
        self.tw = cols as u32 * self.cw;
        self.th = rows as u32 * self.ch;
        (cols, rows)
    }

    /// Column under a pixel x, clamped to the text area
    pub fn x2col(&self, x: i32) -> usize {
        let x = (x - self.border as i32).clamp(0, self.tw.saturating_sub(1) as i32);
        (x as u32 / self.cw) as usize
    }

    /// Row under a pixel y, clamped to the text area
    pub fn y2row(&self, y: i32) -> usize {
        let y = (y - self.border as i32).clamp(0, self.th.saturating_sub(1) as i32);
        (y as u32 / self.ch) as usize
    }

    pub fn is_visible(&self) -> bool {
        self.mode.contains(WinMode::VISIBLE)
    }

    pub fn is_focused(&self) -> bool {
        self.mode.contains(WinMode::FOCUSED)
    }
}
