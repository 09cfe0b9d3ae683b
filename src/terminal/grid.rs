//! Character grid
//!
//! 2D cell array that manages terminal screen state.
//! Provides cursor position, character attributes, erase and scroll
//! operations, per-row dirty tracking and the alternate screen.

use bitflags::bitflags;
use log::trace;
use unicode_width::UnicodeWidthChar;

use super::ModelEvent;
use crate::utils::color::Rgb;

/// Cursor style (DECSCUSR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorStyle {
    /// Block cursor (default)
    #[default]
    Block,
    /// Underline cursor
    Underline,
    /// Bar (vertical line) cursor
    Bar,
}

/// Text color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    /// Default color (foreground or background depending on use)
    #[default]
    Default,
    /// 256-color palette index
    Indexed(u8),
    /// True Color (24bit RGB)
    Rgb(Rgb),
}

bitflags! {
    /// Cell character attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellAttrs: u16 {
        const BOLD      = 1 << 0;
        const FAINT     = 1 << 1;
        const ITALIC    = 1 << 2;
        const UNDERLINE = 1 << 3;
        const BLINK     = 1 << 4;
        const REVERSE   = 1 << 5;
        const INVISIBLE = 1 << 6;
        const STRUCK    = 1 << 7;
        /// Line continues on the next row (set on the last column at autowrap)
        const WRAP      = 1 << 8;
        /// Head of a double-width character
        const WIDE      = 1 << 9;
        /// Placeholder right of a WIDE cell
        const WDUMMY    = 1 << 10;

        const BOLD_FAINT = Self::BOLD.bits() | Self::FAINT.bits();
    }
}

bitflags! {
    /// Terminal mode flags (SM/RM, DECSET/DECRST and friends)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TermMode: u32 {
        /// Autowrap (DECAWM, ?7)
        const WRAP          = 1 << 0;
        /// Insert mode (IRM, 4)
        const INSERT        = 1 << 1;
        /// Alternate screen active
        const ALTSCREEN     = 1 << 2;
        /// LF also returns the carriage (LNM, 20)
        const CRLF          = 1 << 3;
        /// Application cursor keys (DECCKM, ?1)
        const APPCURSOR     = 1 << 4;
        /// Application keypad (DECKPAM)
        const APPKEYPAD     = 1 << 5;
        /// Reverse video (DECSCNM, ?5)
        const REVERSE       = 1 << 6;
        /// Cursor hidden (DECTCEM reset, ?25)
        const HIDE          = 1 << 7;
        /// Bracketed paste (?2004)
        const BRCKTPASTE    = 1 << 8;
        /// X10 mouse reporting (?9)
        const MOUSE_X10     = 1 << 9;
        /// Button press/release reporting (?1000)
        const MOUSE_BTN     = 1 << 10;
        /// Motion while a button is held (?1002)
        const MOUSE_MOTION  = 1 << 11;
        /// All motion (?1003)
        const MOUSE_MANY    = 1 << 12;
        /// SGR mouse encoding (?1006)
        const MOUSE_SGR     = 1 << 13;
        /// Focus in/out reporting (?1004)
        const FOCUS         = 1 << 14;
        /// Blink phase: blinking text currently hidden
        const BLINK         = 1 << 15;
        /// Keyboard action mode (KAM, 2)
        const KBDLOCK       = 1 << 16;
        /// Origin mode (DECOM, ?6)
        const ORIGIN        = 1 << 17;

        const MOUSE = Self::MOUSE_X10.bits()
            | Self::MOUSE_BTN.bits()
            | Self::MOUSE_MOTION.bits()
            | Self::MOUSE_MANY.bits();
    }
}

/// Data for one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// Character ('\0' in WDUMMY cells)
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
    pub attrs: CellAttrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::Default,
            bg: Color::Default,
            attrs: CellAttrs::empty(),
        }
    }
}

/// Pen state (current drawing attributes)
#[derive(Debug, Clone, Copy, Default)]
struct Pen {
    fg: Color,
    bg: Color,
    attrs: CellAttrs,
}

/// DECSC state
#[derive(Debug, Clone, Copy, Default)]
struct SavedCursor {
    row: usize,
    col: usize,
    pen: Pen,
    origin: bool,
}

/// Character grid
pub struct Grid {
    /// Active screen (row-major)
    cells: Vec<Cell>,
    /// Inactive screen (primary while ALTSCREEN is set, alternate otherwise)
    other: Vec<Cell>,
    cols: usize,
    rows: usize,
    /// Cursor row (0-indexed)
    pub cursor_row: usize,
    /// Cursor column (0-indexed)
    pub cursor_col: usize,
    /// Next printable wraps before being written
    wrap_next: bool,
    pen: Pen,
    /// Saved cursor per screen: [primary, alternate]
    saved: [SavedCursor; 2],
    /// Top of scroll region (0-indexed)
    scroll_top: usize,
    /// Bottom of scroll region (0-indexed, inclusive)
    scroll_bottom: usize,
    /// Tab stops
    tabs: Vec<bool>,
    /// Rows changed since the last redraw
    dirty: Vec<bool>,
    /// Mode flags
    pub mode: TermMode,
    /// Cursor style (DECSCUSR)
    pub cursor_style: CursorStyle,
    /// Style restored by DECSCUSR 0 and RIS
    pub default_cursor_style: CursorStyle,
    /// Alternate screen requests (47, 1047, 1049) are honoured
    pub allow_altscreen: bool,
    /// Events for the front-end, drained after each feed
    pub(crate) events: Vec<ModelEvent>,
}

impl Grid {
    /// Create grid with specified size
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let mut grid = Self {
            cells: vec![Cell::default(); cols * rows],
            other: vec![Cell::default(); cols * rows],
            cols,
            rows,
            cursor_row: 0,
            cursor_col: 0,
            wrap_next: false,
            pen: Pen::default(),
            saved: [SavedCursor::default(); 2],
            scroll_top: 0,
            scroll_bottom: rows - 1,
            tabs: Vec::new(),
            dirty: vec![true; rows],
            mode: TermMode::WRAP,
            cursor_style: CursorStyle::Block,
            default_cursor_style: CursorStyle::Block,
            allow_altscreen: true,
            events: Vec::new(),
        };
        grid.reset_tabs();
        grid
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Get reference to cell
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.cells[row * self.cols + col]
    }

    fn cell_mut(&mut self, row: usize, col: usize) -> &mut Cell {
        &mut self.cells[row * self.cols + col]
    }

    /// One row of cells
    pub fn row(&self, row: usize) -> &[Cell] {
        let start = row * self.cols;
        &self.cells[start..start + self.cols]
    }

    // ========== Dirty tracking ==========

    pub fn is_dirty(&self, row: usize) -> bool {
        self.dirty.get(row).copied().unwrap_or(false)
    }

    pub fn clear_dirty(&mut self, row: usize) {
        if let Some(d) = self.dirty.get_mut(row) {
            *d = false;
        }
    }

    /// Mark rows `top..=bottom` dirty (clamped)
    pub fn set_dirty(&mut self, top: usize, bottom: usize) {
        let bottom = bottom.min(self.rows - 1);
        for row in top.min(bottom)..=bottom {
            self.dirty[row] = true;
        }
    }

    pub fn set_full_dirty(&mut self) {
        self.dirty.fill(true);
    }

    /// Mark every row holding a cell with `attr` dirty
    pub fn set_dirty_attr(&mut self, attr: CellAttrs) {
        for row in 0..self.rows {
            if self.row(row).iter().any(|c| c.attrs.intersects(attr)) {
                self.dirty[row] = true;
            }
        }
    }

    /// Whether any visible cell carries `attr`
    pub fn has_attr(&self, attr: CellAttrs) -> bool {
        self.cells.iter().any(|c| c.attrs.intersects(attr))
    }

    /// Length of the row's content: trailing blanks excluded,
    /// full width when the row wraps onto the next
    pub fn line_len(&self, row: usize) -> usize {
        let line = self.row(row);
        if line[self.cols - 1].attrs.contains(CellAttrs::WRAP) {
            return self.cols;
        }
        line.iter().rposition(|c| c.ch != ' ').map_or(0, |i| i + 1)
    }

    // ========== Character writing ==========

    /// Write character at cursor position and advance cursor
    pub fn put_char(&mut self, ch: char) {
        let width = match ch.width() {
            Some(0) | None => {
                trace!("Dropping zero-width character U+{:04X}", ch as u32);
                return;
            }
            Some(w) => w.min(2),
        };

        if self.mode.contains(TermMode::WRAP) && self.wrap_next {
            let (row, col) = (self.cursor_row, self.cursor_col);
            self.cell_mut(row, col).attrs.insert(CellAttrs::WRAP);
            self.newline(true);
        }

        if self.mode.contains(TermMode::INSERT) && self.cursor_col + width < self.cols {
            let start = self.cursor_row * self.cols + self.cursor_col;
            let end = (self.cursor_row + 1) * self.cols;
            self.cells[start..end].rotate_right(width);
        }

        // Wide character doesn't fit at right edge
        if self.cursor_col + width > self.cols {
            self.newline(true);
        }

        let (row, col) = (self.cursor_row, self.cursor_col);
        self.set_char(ch, row, col);

        if width == 2 {
            self.cell_mut(row, col).attrs.insert(CellAttrs::WIDE);
            if col + 1 < self.cols {
                let fg = self.pen.fg;
                let bg = self.pen.bg;
                *self.cell_mut(row, col + 1) = Cell {
                    ch: '\0',
                    fg,
                    bg,
                    attrs: CellAttrs::WDUMMY,
                };
            }
        }

        if col + width < self.cols {
            self.move_to(row, col + width);
        } else {
            self.wrap_next = true;
        }
    }

    /// Store one character with the pen, repairing any wide pair it splits
    fn set_char(&mut self, ch: char, row: usize, col: usize) {
        let attrs = self.cell(row, col).attrs;
        if attrs.contains(CellAttrs::WIDE) && col + 1 < self.cols {
            let next = self.cell_mut(row, col + 1);
            next.ch = ' ';
            next.attrs.remove(CellAttrs::WDUMMY);
        } else if attrs.contains(CellAttrs::WDUMMY) && col > 0 {
            let prev = self.cell_mut(row, col - 1);
            prev.ch = ' ';
            prev.attrs.remove(CellAttrs::WIDE);
        }

        self.dirty[row] = true;
        let pen = self.pen;
        *self.cell_mut(row, col) = Cell {
            ch,
            fg: pen.fg,
            bg: pen.bg,
            attrs: pen.attrs,
        };
    }

    // ========== Cursor movement ==========

    /// Move cursor to (row, col), clamped to the screen or, in origin
    /// mode, to the scroll region
    pub fn move_to(&mut self, row: usize, col: usize) {
        let (min_row, max_row) = if self.mode.contains(TermMode::ORIGIN) {
            (self.scroll_top, self.scroll_bottom)
        } else {
            (0, self.rows - 1)
        };
        self.wrap_next = false;
        self.cursor_col = col.min(self.cols - 1);
        self.cursor_row = row.clamp(min_row, max_row);
    }

    /// Absolute move honoring origin mode (CUP, VPA)
    pub fn move_to_origin(&mut self, row: usize, col: usize) {
        let offset = if self.mode.contains(TermMode::ORIGIN) {
            self.scroll_top
        } else {
            0
        };
        self.move_to(row + offset, col);
    }

    pub fn move_up(&mut self, n: usize) {
        self.move_to(self.cursor_row.saturating_sub(n), self.cursor_col);
    }

    pub fn move_down(&mut self, n: usize) {
        self.move_to(self.cursor_row + n, self.cursor_col);
    }

    pub fn move_forward(&mut self, n: usize) {
        self.move_to(self.cursor_row, self.cursor_col + n);
    }

    pub fn move_backward(&mut self, n: usize) {
        self.move_to(self.cursor_row, self.cursor_col.saturating_sub(n));
    }

    /// LF / NEL: next line, scrolling at the bottom margin
    pub fn newline(&mut self, first_col: bool) {
        let mut row = self.cursor_row;
        if row == self.scroll_bottom {
            self.scroll_up(self.scroll_top, 1);
        } else {
            row += 1;
        }
        let col = if first_col { 0 } else { self.cursor_col };
        self.move_to(row, col);
    }

    /// Line feed (LF, VT, FF)
    pub fn linefeed(&mut self) {
        let crlf = self.mode.contains(TermMode::CRLF);
        self.newline(crlf);
    }

    /// Reverse index (RI / ESC M)
    pub fn reverse_index(&mut self) {
        if self.cursor_row == self.scroll_top {
            self.scroll_down(self.scroll_top, 1);
        } else {
            self.move_to(self.cursor_row - 1, self.cursor_col);
        }
    }

    /// Index (IND / ESC D)
    pub fn index(&mut self) {
        self.newline(false);
    }

    /// Carriage return (CR)
    pub fn carriage_return(&mut self) {
        self.move_to(self.cursor_row, 0);
    }

    /// Backspace (BS)
    pub fn backspace(&mut self) {
        self.move_backward(1);
    }

    /// Horizontal tab, forward (n > 0) or backward (n < 0)
    pub fn tab(&mut self, n: isize) {
        let mut col = self.cursor_col;
        if n > 0 {
            for _ in 0..n {
                col += 1;
                while col < self.cols && !self.tabs[col] {
                    col += 1;
                }
            }
        } else {
            for _ in 0..n.unsigned_abs() {
                col = col.saturating_sub(1);
                while col > 0 && !self.tabs[col] {
                    col -= 1;
                }
            }
        }
        self.move_to(self.cursor_row, col);
    }

    /// HTS
    pub fn set_tab_stop(&mut self) {
        self.tabs[self.cursor_col] = true;
    }

    /// TBC: 0 clears the stop under the cursor, 3 clears all
    pub fn clear_tab_stop(&mut self, mode: u16) {
        match mode {
            0 => self.tabs[self.cursor_col] = false,
            3 => self.tabs.fill(false),
            _ => {}
        }
    }

    fn reset_tabs(&mut self) {
        self.tabs = (0..self.cols).map(|c| c > 0 && c % 8 == 0).collect();
    }

    /// DECSC
    pub fn save_cursor(&mut self) {
        let slot = self.screen_index();
        self.saved[slot] = SavedCursor {
            row: self.cursor_row,
            col: self.cursor_col,
            pen: self.pen,
            origin: self.mode.contains(TermMode::ORIGIN),
        };
    }

    /// DECRC
    pub fn restore_cursor(&mut self) {
        let saved = self.saved[self.screen_index()];
        self.pen = saved.pen;
        self.mode.set(TermMode::ORIGIN, saved.origin);
        self.move_to(saved.row, saved.col);
    }

    fn screen_index(&self) -> usize {
        usize::from(self.mode.contains(TermMode::ALTSCREEN))
    }

    // ========== Erase ==========

    /// Blank cells in the rectangle, using the pen's colors
    fn clear_region(&mut self, col1: usize, row1: usize, col2: usize, row2: usize) {
        let blank = Cell {
            ch: ' ',
            fg: self.pen.fg,
            bg: self.pen.bg,
            attrs: CellAttrs::empty(),
        };
        let col2 = col2.min(self.cols - 1);
        let row2 = row2.min(self.rows - 1);
        if col1 > col2 || row1 > row2 {
            return;
        }
        for row in row1..=row2 {
            self.dirty[row] = true;
            let start = row * self.cols;
            self.cells[start + col1..=start + col2].fill(blank);
        }
    }

    /// Erase display (CSI J)
    /// mode: 0=from cursor, 1=to cursor, 2=entire screen
    pub fn erase_in_display(&mut self, mode: u16) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        let (last_col, last_row) = (self.cols - 1, self.rows - 1);
        match mode {
            0 => {
                self.clear_region(col, row, last_col, row);
                if row < last_row {
                    self.clear_region(0, row + 1, last_col, last_row);
                }
            }
            1 => {
                if row > 0 {
                    self.clear_region(0, 0, last_col, row - 1);
                }
                self.clear_region(0, row, col, row);
            }
            2 | 3 => self.clear_region(0, 0, last_col, last_row),
            _ => {}
        }
    }

    /// Erase line (CSI K)
    /// mode: 0=from cursor, 1=to cursor, 2=entire line
    pub fn erase_in_line(&mut self, mode: u16) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        match mode {
            0 => self.clear_region(col, row, self.cols - 1, row),
            1 => self.clear_region(0, row, col, row),
            2 => self.clear_region(0, row, self.cols - 1, row),
            _ => {}
        }
    }

    /// Erase characters (CSI X)
    pub fn erase_chars(&mut self, n: usize) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        self.clear_region(col, row, col + n.max(1) - 1, row);
    }

    /// Insert blank characters (CSI @)
    pub fn insert_chars(&mut self, n: usize) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        let n = n.clamp(1, self.cols - col);
        let start = row * self.cols;
        self.cells[start + col..start + self.cols].rotate_right(n);
        self.clear_region(col, row, col + n - 1, row);
    }

    /// Delete characters (CSI P)
    pub fn delete_chars(&mut self, n: usize) {
        let (row, col) = (self.cursor_row, self.cursor_col);
        let n = n.clamp(1, self.cols - col);
        let start = row * self.cols;
        self.cells[start + col..start + self.cols].rotate_left(n);
        self.clear_region(self.cols - n, row, self.cols - 1, row);
    }

    /// Insert lines (CSI L)
    pub fn insert_lines(&mut self, n: usize) {
        if (self.scroll_top..=self.scroll_bottom).contains(&self.cursor_row) {
            self.scroll_down(self.cursor_row, n);
        }
    }

    /// Delete lines (CSI M)
    pub fn delete_lines(&mut self, n: usize) {
        if (self.scroll_top..=self.scroll_bottom).contains(&self.cursor_row) {
            self.scroll_up(self.cursor_row, n);
        }
    }

    // ========== Scroll ==========

    /// Scroll rows `orig..=bottom` up by n
    pub fn scroll_up(&mut self, orig: usize, n: usize) {
        let bottom = self.scroll_bottom;
        let n = n.clamp(1, bottom - orig + 1);
        let (start, end) = (orig * self.cols, (bottom + 1) * self.cols);
        self.cells[start..end].rotate_left(n * self.cols);
        self.clear_region(0, bottom + 1 - n, self.cols - 1, bottom);
        self.set_dirty(orig, bottom);
        self.push_scroll(orig, bottom, -(n as isize));
    }

    /// Scroll rows `orig..=bottom` down by n
    pub fn scroll_down(&mut self, orig: usize, n: usize) {
        let bottom = self.scroll_bottom;
        let n = n.clamp(1, bottom - orig + 1);
        let (start, end) = (orig * self.cols, (bottom + 1) * self.cols);
        self.cells[start..end].rotate_right(n * self.cols);
        self.clear_region(0, orig, self.cols - 1, orig + n - 1);
        self.set_dirty(orig, bottom);
        self.push_scroll(orig, bottom, n as isize);
    }

    /// Record a scroll, merging with a directly preceding one of the same region
    fn push_scroll(&mut self, top: usize, bottom: usize, delta: isize) {
        if let Some(ModelEvent::Scrolled {
            top: t,
            bottom: b,
            delta: d,
        }) = self.events.last_mut()
        {
            if *t == top && *b == bottom && (*d < 0) == (delta < 0) {
                *d += delta;
                return;
            }
        }
        self.events.push(ModelEvent::Scrolled { top, bottom, delta });
    }

    pub fn scroll_region(&self) -> (usize, usize) {
        (self.scroll_top, self.scroll_bottom)
    }

    /// DECSTBM (0-indexed, inclusive)
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let top = top.min(self.rows - 1);
        let bottom = bottom.min(self.rows - 1);
        let (top, bottom) = if top > bottom { (bottom, top) } else { (top, bottom) };
        self.scroll_top = top;
        self.scroll_bottom = bottom;
    }

    // ========== SGR (attribute setting) ==========

    pub fn reset_attrs(&mut self) {
        self.pen = Pen::default();
    }

    pub fn set_fg(&mut self, color: Color) {
        self.pen.fg = color;
    }

    pub fn set_bg(&mut self, color: Color) {
        self.pen.bg = color;
    }

    pub fn set_attr(&mut self, attr: CellAttrs) {
        self.pen.attrs.insert(attr);
    }

    pub fn clear_attr(&mut self, attr: CellAttrs) {
        self.pen.attrs.remove(attr);
    }

    // ========== Screens ==========

    /// Swap primary and alternate screens
    pub fn swap_screen(&mut self) {
        std::mem::swap(&mut self.cells, &mut self.other);
        self.mode.toggle(TermMode::ALTSCREEN);
        self.set_full_dirty();
    }

    /// Switch to (`enable`) or from the alternate screen. The alternate
    /// screen is cleared when left.
    pub fn set_alt_screen(&mut self, enable: bool) {
        let alt = self.mode.contains(TermMode::ALTSCREEN);
        if alt {
            self.clear_region(0, 0, self.cols - 1, self.rows - 1);
        }
        if enable != alt {
            self.swap_screen();
        }
    }

    /// RIS
    pub fn reset(&mut self) {
        self.pen = Pen::default();
        self.saved = [SavedCursor::default(); 2];
        self.mode = TermMode::WRAP;
        self.cursor_style = self.default_cursor_style;
        self.scroll_top = 0;
        self.scroll_bottom = self.rows - 1;
        self.reset_tabs();
        self.cells.fill(Cell::default());
        self.other.fill(Cell::default());
        self.move_to(0, 0);
        self.set_full_dirty();
    }

    /// Resize both screens, keeping the cursor row on screen
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        if cols == self.cols && rows == self.rows {
            return;
        }

        // Drop rows from the top so the cursor stays visible
        let slide = (self.cursor_row + 1).saturating_sub(rows);

        let resize_screen = |old: &[Cell], old_cols: usize, old_rows: usize| -> Vec<Cell> {
            let mut new = vec![Cell::default(); cols * rows];
            for row in 0..rows.min(old_rows.saturating_sub(slide)) {
                let src = (row + slide) * old_cols;
                let n = cols.min(old_cols);
                new[row * cols..row * cols + n].copy_from_slice(&old[src..src + n]);
            }
            new
        };
        self.cells = resize_screen(&self.cells, self.cols, self.rows);
        self.other = resize_screen(&self.other, self.cols, self.rows);

        self.cols = cols;
        self.rows = rows;
        self.dirty = vec![true; rows];
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.reset_tabs();

        for saved in &mut self.saved {
            saved.row = saved.row.min(rows - 1);
            saved.col = saved.col.min(cols - 1);
        }
        let row = self.cursor_row.saturating_sub(slide);
        self.move_to(row, self.cursor_col);
    }
}
