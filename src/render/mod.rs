//! Glyph-run renderer
//!
//! Turns dirty rows into batches of glyphs that share one resolved style,
//! paints them into the back buffer together with their backgrounds,
//! decorations and the border strips they touch, then overlays the cursor.

pub mod buffer;
pub mod palette;

use log::trace;

use crate::font::{FontEngine, FontStyle, GlyphId};
use crate::selection::Selection;
use crate::terminal::grid::{Cell, CellAttrs, Color, CursorStyle, TermMode};
use crate::terminal::Terminal;
use crate::utils::color::Rgb;
use crate::window::WindowState;

pub use buffer::{PixelBuffer, Rect};
pub use palette::Palette;

/// Attributes that split batches (besides colors)
const STYLE_ATTRS: CellAttrs = CellAttrs::BOLD
    .union(CellAttrs::ITALIC)
    .union(CellAttrs::UNDERLINE)
    .union(CellAttrs::STRUCK)
    .union(CellAttrs::WIDE);

/// Resolved look of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub fg: Rgb,
    pub bg: Rgb,
    pub attrs: CellAttrs,
}

/// Positioned glyph; `y` is the baseline
#[derive(Debug, Clone, Copy)]
pub struct GlyphSpec {
    pub glyph: GlyphId,
    pub x: i32,
    pub y: i32,
}

/// Everything a draw call touches
pub struct Surface<'a, F: FontEngine> {
    pub term: &'a mut Terminal,
    pub sel: &'a Selection,
    pub win: &'a WindowState,
    pub font: &'a mut F,
    pub buf: &'a mut PixelBuffer,
}

pub struct Renderer {
    palette: Palette,
    bold_is_bright: bool,
    cursor_thickness: u32,
    /// Cell the cursor was last drawn on (col, row)
    old_cursor: (usize, usize),
    specs: Vec<GlyphSpec>,
}

impl Renderer {
    pub fn new(palette: Palette, bold_is_bright: bool, cursor_thickness: u32) -> Self {
        Self {
            palette,
            bold_is_bright,
            cursor_thickness: cursor_thickness.max(1),
            old_cursor: (0, 0),
            specs: Vec::new(),
        }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn palette_mut(&mut self) -> &mut Palette {
        &mut self.palette
    }

    /// Repaint every dirty row and the cursor; no-op while invisible
    pub fn draw<F: FontEngine>(&mut self, s: &mut Surface<'_, F>) -> bool {
        if !s.win.is_visible() {
            return false;
        }
        let (cols, rows) = (s.term.cols(), s.term.rows());

        let (mut ox, mut oy) = self.old_cursor;
        ox = ox.min(cols - 1);
        oy = oy.min(rows - 1);
        if ox > 0 && s.term.cell(oy, ox).attrs.contains(CellAttrs::WDUMMY) {
            ox -= 1;
        }
        let (mut cx, cy) = s.term.cursor();
        if cx > 0 && s.term.cell(cy, cx).attrs.contains(CellAttrs::WDUMMY) {
            cx -= 1;
        }

        self.draw_region(s, 0, 0, cols, rows);
        self.draw_cursor(s, (cx, cy), (ox, oy));
        self.old_cursor = (cx, cy);
        true
    }

    /// Repaint dirty rows in `[y1, y2)`, columns `[x1, x2)`
    pub fn draw_region<F: FontEngine>(
        &mut self,
        s: &mut Surface<'_, F>,
        x1: usize,
        y1: usize,
        x2: usize,
        y2: usize,
    ) {
        let x2 = x2.min(s.term.cols());
        for y in y1..y2.min(s.term.rows()) {
            if !s.term.is_dirty(y) {
                continue;
            }
            s.term.clear_dirty(y);
            self.draw_line(s, x1, y, x2);
        }
    }

    /// Coalesce one row into batches and draw them
    fn draw_line<F: FontEngine>(&mut self, s: &mut Surface<'_, F>, x1: usize, y: usize, x2: usize) {
        let mode = s.term.mode();
        let alt = mode.contains(TermMode::ALTSCREEN);
        let mut run: Option<(usize, Style)> = None;
        let mut batches = 0;
        self.specs.clear();

        for x in x1..x2 {
            let mut cell = *s.term.cell(y, x);
            if cell.attrs.contains(CellAttrs::WDUMMY) {
                continue;
            }
            if s.sel.selected(x, y, alt) {
                cell.attrs.toggle(CellAttrs::REVERSE);
            }
            let style = self.resolve(&cell, mode);

            if let Some((start, current)) = run {
                if current != style {
                    self.draw_batch(s, start, y, current, mode);
                    self.specs.clear();
                    batches += 1;
                    run = None;
                }
            }
            if run.is_none() {
                run = Some((x, style));
            }
            let spec = self.make_spec(s, &cell, x, y);
            self.specs.push(spec);
        }
        if let Some((start, current)) = run {
            self.draw_batch(s, start, y, current, mode);
            batches += 1;
        }
        trace!("Row {} drawn in {} batches", y, batches);
    }

    fn make_spec<F: FontEngine>(&self, s: &mut Surface<'_, F>, cell: &Cell, x: usize, y: usize) -> GlyphSpec {
        let style = FontStyle::from_flags(
            cell.attrs.contains(CellAttrs::BOLD),
            cell.attrs.contains(CellAttrs::ITALIC),
        );
        let win = s.win;
        GlyphSpec {
            glyph: s.font.glyph(cell.ch, style),
            x: (win.border + x as u32 * win.cw) as i32,
            y: (win.border + y as u32 * win.ch + win.ascent) as i32,
        }
    }

    /// Effective colors of a cell
    pub fn resolve(&self, cell: &Cell, mode: TermMode) -> Style {
        let attrs = cell.attrs;

        let mut fg_color = cell.fg;
        if self.bold_is_bright && attrs.intersection(CellAttrs::BOLD_FAINT) == CellAttrs::BOLD {
            if let Color::Indexed(i @ 0..=7) = fg_color {
                fg_color = Color::Indexed(i + 8);
            }
        }
        let mut fg = self.palette.resolve(fg_color, true);
        let mut bg = self.palette.resolve(cell.bg, false);

        if mode.contains(TermMode::REVERSE) {
            fg = if cell.fg == Color::Default {
                self.palette.bg()
            } else {
                fg.inverted()
            };
            bg = if cell.bg == Color::Default {
                self.palette.fg()
            } else {
                bg.inverted()
            };
        }

        if attrs.intersection(CellAttrs::BOLD_FAINT) == CellAttrs::FAINT {
            fg = fg.halved();
        }
        if attrs.contains(CellAttrs::REVERSE) {
            std::mem::swap(&mut fg, &mut bg);
        }
        if attrs.contains(CellAttrs::BLINK) && mode.contains(TermMode::BLINK) {
            fg = bg;
        }
        if attrs.contains(CellAttrs::INVISIBLE) {
            fg = bg;
        }

        Style {
            fg,
            bg,
            attrs: attrs.intersection(STYLE_ATTRS),
        }
    }

    /// Paint the specs collected for one batch starting at column `x`
    fn draw_batch<F: FontEngine>(
        &self,
        s: &mut Surface<'_, F>,
        x: usize,
        y: usize,
        style: Style,
        mode: TermMode,
    ) {
        let win = s.win;
        let cols = self.specs.len() * if style.attrs.contains(CellAttrs::WIDE) { 2 } else { 1 };
        let winx = (win.border + x as u32 * win.cw) as i32;
        let winy = (win.border + y as u32 * win.ch) as i32;
        let width = cols as u32 * win.cw;
        let ch = win.ch as i32;
        let border = win.border as i32;
        let (w, h) = (win.width as i32, win.height as i32);
        let last_row = winy + ch >= border + win.th as i32;
        let top = if y == 0 { 0 } else { winy };

        // Border strips take the default background
        let border_color = if mode.contains(TermMode::REVERSE) {
            self.palette.fg()
        } else {
            self.palette.bg()
        };
        if x == 0 {
            let bottom = winy + ch + if last_row { h } else { 0 };
            clear(s.buf, 0, top, border, bottom, border_color);
        }
        if winx + width as i32 >= border + win.tw as i32 {
            let bottom = if last_row { h } else { winy + ch };
            clear(s.buf, winx + width as i32, top, w, bottom, border_color);
        }
        if y == 0 {
            clear(s.buf, winx, 0, winx + width as i32, border, border_color);
        }
        if last_row {
            clear(s.buf, winx, winy + ch, winx + width as i32, h, border_color);
        }

        let clip = Rect::new(winx, winy, width, win.ch);
        s.buf.fill_rect(clip, style.bg);

        for spec in &self.specs {
            let glyph = s.font.rasterize(spec.glyph);
            s.buf.draw_glyph(glyph, spec.x, spec.y, style.fg, clip);
        }

        let ascent = win.ascent as i32;
        if style.attrs.contains(CellAttrs::UNDERLINE) {
            let line = Rect::new(winx, winy + ascent + 1, width, 1).intersect(&clip);
            s.buf.fill_rect(line, style.fg);
        }
        if style.attrs.contains(CellAttrs::STRUCK) {
            let line = Rect::new(winx, winy + 2 * ascent / 3, width, 1).intersect(&clip);
            s.buf.fill_rect(line, style.fg);
        }
    }

    /// Draw a single cell through the normal color pipeline
    fn draw_cell<F: FontEngine>(&mut self, s: &mut Surface<'_, F>, cell: &Cell, x: usize, y: usize) {
        let mode = s.term.mode();
        let style = self.resolve(cell, mode);
        self.draw_styled_cell(s, cell, x, y, style, mode);
    }

    fn draw_styled_cell<F: FontEngine>(
        &mut self,
        s: &mut Surface<'_, F>,
        cell: &Cell,
        x: usize,
        y: usize,
        style: Style,
        mode: TermMode,
    ) {
        self.specs.clear();
        let spec = self.make_spec(s, cell, x, y);
        self.specs.push(spec);
        self.draw_batch(s, x, y, style, mode);
    }

    /// Restore the cell under the previous cursor and draw the new one
    fn draw_cursor<F: FontEngine>(
        &mut self,
        s: &mut Surface<'_, F>,
        (cx, cy): (usize, usize),
        (ox, oy): (usize, usize),
    ) {
        let mode = s.term.mode();
        let alt = mode.contains(TermMode::ALTSCREEN);

        let mut old = *s.term.cell(oy, ox);
        if !old.attrs.contains(CellAttrs::WDUMMY) {
            if s.sel.selected(ox, oy, alt) {
                old.attrs.toggle(CellAttrs::REVERSE);
            }
            self.draw_cell(s, &old, ox, oy);
        }

        if mode.contains(TermMode::HIDE) {
            return;
        }

        let mut cell = *s.term.cell(cy, cx);
        cell.attrs = cell.attrs.intersection(STYLE_ATTRS);
        let selected = s.sel.selected(cx, cy, alt);
        let reverse = mode.contains(TermMode::REVERSE);
        let (fg, bg) = match (reverse, selected) {
            (false, false) => (self.palette.bg(), self.palette.cursor()),
            (false, true) => (self.palette.fg(), self.palette.rcursor()),
            (true, false) => (self.palette.fg(), self.palette.rcursor()),
            (true, true) => (self.palette.bg(), self.palette.cursor()),
        };
        let color = bg;

        let win = s.win;
        let x = (win.border + cx as u32 * win.cw) as i32;
        let y = (win.border + cy as u32 * win.ch) as i32;
        let (cw, ch) = (win.cw, win.ch);

        if !win.is_focused() {
            s.buf.fill_rect(Rect::new(x, y, cw.saturating_sub(1), 1), color);
            s.buf.fill_rect(Rect::new(x, y, 1, ch.saturating_sub(1)), color);
            s.buf.fill_rect(Rect::new(x + cw as i32 - 1, y, 1, ch.saturating_sub(1)), color);
            s.buf.fill_rect(Rect::new(x, y + ch as i32 - 1, cw, 1), color);
            return;
        }

        let thickness = self.cursor_thickness.min(ch).min(cw);
        match s.term.cursor_style() {
            CursorStyle::Block => {
                let style = Style {
                    fg,
                    bg,
                    attrs: cell.attrs,
                };
                self.draw_styled_cell(s, &cell, cx, cy, style, mode);
            }
            CursorStyle::Underline => {
                let rect = Rect::new(x, y + (ch - thickness) as i32, cw, thickness);
                s.buf.fill_rect(rect, color);
            }
            CursorStyle::Bar => {
                s.buf.fill_rect(Rect::new(x, y, thickness, ch), color);
            }
        }
    }
}

/// Fill the box with corners (x1, y1) and (x2, y2)
fn clear(buf: &mut PixelBuffer, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgb) {
    if x2 <= x1 || y2 <= y1 {
        return;
    }
    buf.fill_rect(Rect::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32), color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::testing::BoxFont;
    use crate::font::FontEngine;
    use crate::utils::color::default_palette;
    use crate::window::WinMode;
    use std::time::Instant;

    const FG: Rgb = Rgb::new(200, 200, 200);
    const BG: Rgb = Rgb::new(10, 10, 10);
    const CURSOR: Rgb = Rgb::new(0, 255, 0);
    const RCURSOR: Rgb = Rgb::new(0, 0, 255);

    fn renderer() -> Renderer {
        Renderer::new(Palette::new(default_palette(), FG, BG, CURSOR, RCURSOR), true, 2)
    }

    struct Fixture {
        term: Terminal,
        sel: Selection,
        win: WindowState,
        font: BoxFont,
        buf: PixelBuffer,
    }

    impl Fixture {
        fn new(cols: usize, rows: usize) -> Self {
            let font = BoxFont::new();
            let mut win = WindowState::new(cols, rows, font.metrics(), 2);
            win.mode = WinMode::VISIBLE | WinMode::FOCUSED;
            let buf = PixelBuffer::new(win.width, win.height);
            Self {
                term: Terminal::new(cols, rows),
                sel: Selection::default(),
                win,
                font,
                buf,
            }
        }

        fn surface(&mut self) -> Surface<'_, BoxFont> {
            Surface {
                term: &mut self.term,
                sel: &self.sel,
                win: &self.win,
                font: &mut self.font,
                buf: &mut self.buf,
            }
        }
    }

    #[test]
    fn test_resolve_bold_bright_and_reverse() {
        let r = renderer();
        let mut cell = Cell {
            fg: Color::Indexed(1),
            attrs: CellAttrs::BOLD,
            ..Cell::default()
        };
        assert_eq!(r.resolve(&cell, TermMode::empty()).fg, default_palette()[9]);

        cell.attrs = CellAttrs::REVERSE;
        let style = r.resolve(&cell, TermMode::empty());
        assert_eq!((style.fg, style.bg), (BG, default_palette()[1]));

        // Global reverse swaps defaults and inverts explicit colors
        let plain = Cell::default();
        let style = r.resolve(&plain, TermMode::REVERSE);
        assert_eq!((style.fg, style.bg), (BG, FG));
        cell.attrs = CellAttrs::empty();
        assert_eq!(r.resolve(&cell, TermMode::REVERSE).fg, default_palette()[1].inverted());
    }

    #[test]
    fn test_resolve_faint_blink_invisible() {
        let r = renderer();
        let mut cell = Cell {
            attrs: CellAttrs::FAINT,
            ..Cell::default()
        };
        assert_eq!(r.resolve(&cell, TermMode::empty()).fg, FG.halved());

        cell.attrs = CellAttrs::BLINK;
        assert_eq!(r.resolve(&cell, TermMode::empty()).fg, FG);
        assert_eq!(r.resolve(&cell, TermMode::BLINK).fg, BG);

        cell.attrs = CellAttrs::INVISIBLE;
        assert_eq!(r.resolve(&cell, TermMode::empty()).fg, BG);
    }

    /// Paint a row one cell per batch, the reference for coalescing
    fn draw_row_per_cell(r: &mut Renderer, s: &mut Surface<'_, BoxFont>, y: usize) {
        let mode = s.term.mode();
        let alt = mode.contains(TermMode::ALTSCREEN);
        for x in 0..s.term.cols() {
            let mut cell = *s.term.cell(y, x);
            if cell.attrs.contains(CellAttrs::WDUMMY) {
                continue;
            }
            if s.sel.selected(x, y, alt) {
                cell.attrs.toggle(CellAttrs::REVERSE);
            }
            r.draw_cell(s, &cell, x, y);
        }
    }

    #[test]
    fn test_coalescing_is_lossless() {
        let input = "\x1b[1mab\x1b[3mcd\x1b[22mef\x1b[0m漢字\x1b[4;31mgh\x1b[9mij\x1b[0m k";
        let mut batched = Fixture::new(20, 2);
        let mut single = Fixture::new(20, 2);
        for f in [&mut batched, &mut single] {
            f.term.feed(input.as_bytes());
            f.term.feed(b"\r\n\x1b[7mxy\x1b[0m  z");
        }

        let mut r1 = renderer();
        r1.draw_region(&mut batched.surface(), 0, 0, 20, 2);

        let mut r2 = renderer();
        for y in 0..2 {
            draw_row_per_cell(&mut r2, &mut single.surface(), y);
        }

        assert_eq!(batched.buf.pixels(), single.buf.pixels());
    }

    #[test]
    fn test_selection_highlight_changes_pixels() {
        let mut f = Fixture::new(10, 2);
        f.term.feed(b"hello");
        let mut r = renderer();
        r.draw_region(&mut f.surface(), 0, 0, 10, 2);
        let before = f.buf.pixels().to_vec();

        let now = Instant::now();
        f.sel.press(&mut f.term, 0, 0, now);
        f.sel.drag(&mut f.term, 2, 0, false);
        assert!(f.term.is_dirty(0));
        r.draw_region(&mut f.surface(), 0, 0, 10, 2);
        assert_ne!(f.buf.pixels(), &before[..]);

        // Selected cell background is the default foreground
        let (x, y) = (f.win.border, f.win.border);
        assert_eq!(f.buf.pixel(x, y), FG.to_pixel());
    }

    #[test]
    fn test_selection_highlight_follows_screen_switch() {
        let mut f = Fixture::new(10, 2);
        f.term.feed(b"hello");
        let now = Instant::now();
        f.sel.press(&mut f.term, 0, 0, now);
        f.sel.drag(&mut f.term, 2, 0, false);
        let mut r = renderer();
        r.draw(&mut f.surface());
        let (x, y) = (f.win.border, f.win.border);
        assert_eq!(f.buf.pixel(x, y), FG.to_pixel());

        // Same text on the alternate screen is not highlighted
        f.term.feed(b"\x1b[?1049h\x1b[Hhello");
        r.draw(&mut f.surface());
        assert_eq!(f.buf.pixel(x, y), BG.to_pixel());

        f.term.feed(b"\x1b[?1049l");
        r.draw(&mut f.surface());
        assert_eq!(f.buf.pixel(x, y), FG.to_pixel());
    }

    #[test]
    fn test_border_cleared_with_default_background() {
        let mut f = Fixture::new(4, 2);
        f.buf.fill_rect(Rect::new(0, 0, f.win.width, f.win.height), Rgb::new(1, 2, 3));
        f.term.feed(b"\x1b[41mabcd\r\n\x1b[0mwxyz");
        let mut r = renderer();
        r.draw_region(&mut f.surface(), 0, 0, 4, 2);

        let (w, h) = (f.win.width, f.win.height);
        for (x, y) in [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1), (5, 0), (5, h - 1)] {
            assert_eq!(f.buf.pixel(x, y), BG.to_pixel(), "pixel ({}, {})", x, y);
        }
        // First row body keeps its own background
        assert_eq!(f.buf.pixel(2, 2), default_palette()[1].to_pixel());
    }

    #[test]
    fn test_cursor_shapes() {
        let mut f = Fixture::new(4, 2);
        let mut r = renderer();
        r.draw(&mut f.surface());
        let (b, cw, ch) = (f.win.border, f.win.cw, f.win.ch);
        // Block cursor at origin fills the cell with the cursor color
        assert_eq!(f.buf.pixel(b, b), CURSOR.to_pixel());

        // Unfocused: hollow outline, interior untouched
        f.win.mode.remove(WinMode::FOCUSED);
        f.term.set_dirty(0, 1);
        r.draw(&mut f.surface());
        assert_eq!(f.buf.pixel(b, b), CURSOR.to_pixel());
        assert_eq!(f.buf.pixel(b + cw / 2, b + ch / 2), BG.to_pixel());

        // Moving the cursor restores the old cell
        f.win.mode.insert(WinMode::FOCUSED);
        f.term.feed(b"\x1b[2;3H\x1b[6 q");
        r.draw(&mut f.surface());
        assert_eq!(f.buf.pixel(b, b), BG.to_pixel());
        let (x, y) = (b + 2 * cw, b + ch);
        assert_eq!(f.buf.pixel(x + 1, y + ch / 2), CURSOR.to_pixel());
        assert_eq!(f.buf.pixel(x + cw - 1, y + ch / 2), BG.to_pixel());
    }

    #[test]
    fn test_hidden_cursor_and_invisible_window() {
        let mut f = Fixture::new(4, 2);
        let mut r = renderer();
        f.term.feed(b"\x1b[?25l");
        r.draw(&mut f.surface());
        let b = f.win.border;
        assert_eq!(f.buf.pixel(b, b), BG.to_pixel());

        f.win.mode.remove(WinMode::VISIBLE);
        f.term.set_full_dirty();
        assert!(!r.draw(&mut f.surface()));
        assert!(f.term.is_dirty(0));
    }
}
