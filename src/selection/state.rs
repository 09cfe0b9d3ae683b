//! Selection geometry
//!
//! Anchor/extent pair in grid coordinates, normalized into a
//! begin/end range after snapping to words or wrapped lines.

use std::time::{Duration, Instant};

use crate::constants::{DOUBLE_CLICK_THRESHOLD_MS, TRIPLE_CLICK_THRESHOLD_MS};
use crate::terminal::grid::{CellAttrs, TermMode};
use crate::terminal::Terminal;

/// Selection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelMode {
    /// No drag in progress
    Idle,
    /// Button pressed, nothing selected yet
    Empty,
    /// Range established
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelType {
    Regular,
    Rectangular,
}

/// Granularity the ends expand to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snap {
    None,
    Word,
    Line,
}

/// Grid position, column then row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    mode: SelMode,
    kind: SelType,
    snap: Snap,
    /// Anchor and extent as clicked
    ob: Point,
    oe: Point,
    /// Normalized begin/end, begin <= end
    nb: Point,
    ne: Point,
    /// A range exists (possibly empty, possibly finished)
    active: bool,
    /// Screen the range belongs to
    alt: bool,
    last_click: Option<Instant>,
    prev_click: Option<Instant>,
    delimiters: Vec<char>,
    double_click: Duration,
    triple_click: Duration,
}

impl Default for Selection {
    fn default() -> Self {
        Self::new(
            " ",
            Duration::from_millis(DOUBLE_CLICK_THRESHOLD_MS),
            Duration::from_millis(TRIPLE_CLICK_THRESHOLD_MS),
        )
    }
}

impl Selection {
    pub fn new(delimiters: &str, double_click: Duration, triple_click: Duration) -> Self {
        Self {
            mode: SelMode::Idle,
            kind: SelType::Regular,
            snap: Snap::None,
            ob: Point::default(),
            oe: Point::default(),
            nb: Point::default(),
            ne: Point::default(),
            active: false,
            alt: false,
            last_click: None,
            prev_click: None,
            delimiters: delimiters.chars().collect(),
            double_click,
            triple_click,
        }
    }

    pub fn mode(&self) -> SelMode {
        self.mode
    }

    pub fn kind(&self) -> SelType {
        self.kind
    }

    pub fn snap(&self) -> Snap {
        self.snap
    }

    pub fn is_ready(&self) -> bool {
        self.mode == SelMode::Ready
    }

    /// Normalized range, if one exists
    pub fn range(&self) -> Option<(Point, Point)> {
        self.active.then_some((self.nb, self.ne))
    }

    /// Button-1 press at a cell: start a new selection, snapping when the
    /// click closely follows earlier ones
    pub fn press(&mut self, term: &mut Terminal, col: usize, row: usize, now: Instant) {
        self.clear(term);
        self.mode = SelMode::Empty;
        self.kind = SelType::Regular;
        self.alt = term.mode().contains(TermMode::ALTSCREEN);
        self.active = true;
        let p = clamp(term, col, row);
        self.ob = p;
        self.oe = p;

        let within = |t: Option<Instant>, limit: Duration| {
            t.map_or(false, |t| now.saturating_duration_since(t) <= limit)
        };
        self.snap = if within(self.prev_click, self.triple_click) {
            Snap::Line
        } else if within(self.last_click, self.double_click) {
            Snap::Word
        } else {
            Snap::None
        };
        self.normalize(term);

        // A snapped click selects something by itself
        if self.snap != Snap::None {
            self.mode = SelMode::Ready;
        }
        term.set_dirty(self.nb.y, self.ne.y);
        self.prev_click = self.last_click;
        self.last_click = Some(now);
    }

    /// Move the extent to a cell and re-normalize
    pub fn extend(&mut self, term: &mut Terminal, col: usize, row: usize, rectangular: bool) {
        self.alt = term.mode().contains(TermMode::ALTSCREEN);
        self.oe = clamp(term, col, row);
        self.kind = if rectangular {
            SelType::Rectangular
        } else {
            SelType::Regular
        };
        self.normalize(term);
    }

    /// Pointer motion with button 1 held
    pub fn drag(&mut self, term: &mut Terminal, col: usize, row: usize, rectangular: bool) {
        if self.mode == SelMode::Idle {
            return;
        }
        let (old_mode, old_kind) = (self.mode, self.kind);
        let (old_oe, old_nb, old_ne) = (self.oe, self.nb.y, self.ne.y);
        self.mode = SelMode::Ready;
        self.extend(term, col, row, rectangular);

        // The first motion shows the anchor cell; a type switch reshapes
        // the highlight in place
        if self.oe != old_oe || self.kind != old_kind || old_mode == SelMode::Empty {
            term.set_dirty(self.nb.y.min(old_nb), self.ne.y.max(old_ne));
        }
    }

    /// Button-1 release. Returns the selected text when a range was
    /// established; otherwise the selection is cleared.
    pub fn release(
        &mut self,
        term: &mut Terminal,
        col: usize,
        row: usize,
        rectangular: bool,
    ) -> Option<String> {
        let text = if self.mode == SelMode::Ready {
            self.extend(term, col, row, rectangular);
            self.text(term)
        } else {
            self.clear(term);
            None
        };
        self.mode = SelMode::Idle;
        if self.active {
            term.set_dirty(self.nb.y, self.ne.y);
        }
        text
    }

    /// Drop the range and repaint the rows it covered
    pub fn clear(&mut self, term: &mut Terminal) {
        if !self.active {
            return;
        }
        self.mode = SelMode::Idle;
        self.active = false;
        term.set_dirty(self.nb.y, self.ne.y);
    }

    /// Whether the cell at column `x`, row `y` is highlighted while the
    /// screen shown is `alt`
    pub fn selected(&self, x: usize, y: usize, alt: bool) -> bool {
        if self.mode == SelMode::Empty || !self.active || self.alt != alt {
            return false;
        }
        let rows = self.nb.y <= y && y <= self.ne.y;
        match self.kind {
            SelType::Rectangular => rows && self.nb.x <= x && x <= self.ne.x,
            SelType::Regular => {
                rows && (y != self.nb.y || x >= self.nb.x) && (y != self.ne.y || x <= self.ne.x)
            }
        }
    }

    /// Follow content moved by `n` rows from `orig` down to the scroll
    /// region bottom. A range cut by the move, or pushed out of the
    /// region, is dropped.
    pub fn scroll(&mut self, term: &mut Terminal, orig: usize, n: isize) {
        if !self.active {
            return;
        }
        let (top, bot) = term.scroll_region();
        let inside = |y: usize| orig <= y && y <= bot;

        if inside(self.nb.y) != inside(self.ne.y) {
            self.clear(term);
        } else if inside(self.nb.y) {
            let shift = |y: usize| y as isize + n;
            let (by, ey) = (shift(self.ob.y), shift(self.oe.y));
            let within = |y: isize| top as isize <= y && y <= bot as isize;
            if within(by) && within(ey) {
                self.ob.y = by as usize;
                self.oe.y = ey as usize;
                self.normalize(term);
            } else {
                self.clear(term);
            }
        }
    }

    /// Text covered by the range. Trailing blanks are trimmed per row and
    /// rows that do not continue onto the next line end with '\n'.
    pub fn text(&self, term: &Terminal) -> Option<String> {
        if !self.active {
            return None;
        }
        let cols = term.cols();
        let mut out = String::new();

        for y in self.nb.y..=self.ne.y {
            let len = term.line_len(y);
            if len == 0 {
                out.push('\n');
                continue;
            }
            let line = term.row(y);
            let (first, lastx) = match self.kind {
                SelType::Rectangular => (self.nb.x, self.ne.x),
                SelType::Regular => (
                    if y == self.nb.y { self.nb.x } else { 0 },
                    if y == self.ne.y { self.ne.x } else { cols - 1 },
                ),
            };

            let mut last = lastx.min(len - 1) as isize;
            while last >= first as isize && line[last as usize].ch == ' ' {
                last -= 1;
            }
            if last >= first as isize {
                for cell in &line[first..=last as usize] {
                    if !cell.attrs.contains(CellAttrs::WDUMMY) {
                        out.push(cell.ch);
                    }
                }
            }

            let wrapped = self.kind == SelType::Regular
                && last >= 0
                && line[last as usize].attrs.contains(CellAttrs::WRAP);
            if (y < self.ne.y || lastx >= len) && !wrapped {
                out.push('\n');
            }
        }
        Some(out)
    }

    fn is_delim(&self, ch: char) -> bool {
        ch != '\0' && self.delimiters.contains(&ch)
    }

    fn normalize(&mut self, term: &Terminal) {
        let (ob, oe) = (self.ob, self.oe);
        if self.kind == SelType::Regular && ob.y != oe.y {
            let forward = ob.y < oe.y;
            self.nb.x = if forward { ob.x } else { oe.x };
            self.ne.x = if forward { oe.x } else { ob.x };
        } else {
            self.nb.x = ob.x.min(oe.x);
            self.ne.x = ob.x.max(oe.x);
        }
        self.nb.y = ob.y.min(oe.y);
        self.ne.y = ob.y.max(oe.y);

        self.nb = self.snap_point(term, self.nb, -1);
        self.ne = self.snap_point(term, self.ne, 1);

        // Expand over line ends
        if self.kind == SelType::Rectangular {
            return;
        }
        let len = term.line_len(self.nb.y);
        if len < self.nb.x {
            self.nb.x = len;
        }
        if term.line_len(self.ne.y) <= self.ne.x {
            self.ne.x = term.cols() - 1;
        }
    }

    fn snap_point(&self, term: &Terminal, mut p: Point, direction: isize) -> Point {
        let (cols, rows) = (term.cols() as isize, term.rows() as isize);
        match self.snap {
            Snap::None => {}
            Snap::Word => {
                let mut prev = *term.cell(p.y, p.x);
                let mut prev_delim = self.is_delim(prev.ch);
                loop {
                    let mut nx = p.x as isize + direction;
                    let mut ny = p.y as isize;
                    if !(0..cols).contains(&nx) {
                        ny += direction;
                        nx = (nx + cols) % cols;
                        if !(0..rows).contains(&ny) {
                            break;
                        }
                        // Only continue across a soft wrap
                        let (wy, wx) = if direction > 0 {
                            (p.y, p.x)
                        } else {
                            (ny as usize, nx as usize)
                        };
                        if !term.cell(wy, wx).attrs.contains(CellAttrs::WRAP) {
                            break;
                        }
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    if nx >= term.line_len(ny) {
                        break;
                    }
                    let cell = *term.cell(ny, nx);
                    let delim = self.is_delim(cell.ch);
                    if !cell.attrs.contains(CellAttrs::WDUMMY)
                        && (delim != prev_delim || (delim && cell.ch != prev.ch))
                    {
                        break;
                    }
                    p = Point::new(nx, ny);
                    prev = cell;
                    prev_delim = delim;
                }
            }
            Snap::Line => {
                let last_col = term.cols() - 1;
                let wraps = |y: usize| term.cell(y, last_col).attrs.contains(CellAttrs::WRAP);
                if direction < 0 {
                    p.x = 0;
                    while p.y > 0 && wraps(p.y - 1) {
                        p.y -= 1;
                    }
                } else {
                    p.x = last_col;
                    while (p.y as isize) < rows - 1 && wraps(p.y) {
                        p.y += 1;
                    }
                }
            }
        }
        p
    }
}

fn clamp(term: &Terminal, col: usize, row: usize) -> Point {
    Point::new(col.min(term.cols() - 1), row.min(term.rows() - 1))
}
