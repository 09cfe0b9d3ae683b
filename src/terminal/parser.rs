//! VT escape sequence parser
//!
//! Implements vte crate's Perform trait
//! and applies parsed results to Grid.

use log::{debug, trace};
use vte::{Params, Perform};

use super::grid::{CellAttrs, Color, CursorStyle, Grid, TermMode};
use super::{ColorSlot, ModelEvent};
use crate::utils::color::{parse_osc_color, Rgb};

/// vte::Perform implementation
/// Holds reference to Grid and directly applies parsed results
pub struct Performer<'a> {
    pub grid: &'a mut Grid,
}

impl<'a> Performer<'a> {
    pub fn new(grid: &'a mut Grid) -> Self {
        Self { grid }
    }

    fn emit(&mut self, event: ModelEvent) {
        self.grid.events.push(event);
    }
}

impl<'a> Perform for Performer<'a> {
    /// Handle printable character
    fn print(&mut self, c: char) {
        self.grid.put_char(c);
    }

    /// Handle C0/C1 control character
    fn execute(&mut self, byte: u8) {
        match byte {
            0x08 => self.grid.backspace(), // BS
            0x09 => self.grid.tab(1),      // HT
            0x0A | 0x0B | 0x0C => {
                // LF, VT, FF
                self.grid.linefeed();
            }
            0x0D => self.grid.carriage_return(), // CR
            0x07 => self.emit(ModelEvent::Bell), // BEL
            _ => {
                trace!("Unhandled control character: 0x{:02x}", byte);
            }
        }
    }

    /// Handle CSI sequence
    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        // Convert parameters to flat array (supports sub-parameters)
        let flat_params: Vec<Vec<u16>> = params.iter().map(|p| p.to_vec()).collect();

        // First parameter (with default value)
        let param0 = flat_params
            .first()
            .and_then(|p| p.first().copied())
            .unwrap_or(0);
        let param1 = flat_params
            .get(1)
            .and_then(|p| p.first().copied())
            .unwrap_or(0);
        let n = if param0 == 0 { 1 } else { param0 as usize };

        match (action, intermediates) {
            // Cursor movement
            ('A', []) => self.grid.move_up(n),      // CUU
            ('B', []) | ('e', []) => self.grid.move_down(n), // CUD, VPR
            ('C', []) | ('a', []) => self.grid.move_forward(n), // CUF, HPR
            ('D', []) => self.grid.move_backward(n), // CUB
            ('E', []) => {
                // CNL - Cursor Next Line
                self.grid.move_down(n);
                self.grid.carriage_return();
            }
            ('F', []) => {
                // CPL - Cursor Previous Line
                self.grid.move_up(n);
                self.grid.carriage_return();
            }
            ('G', []) | ('`', []) => {
                // CHA / HPA - Column absolute
                let row = self.grid.cursor_row;
                self.grid.move_to(row, n - 1);
            }
            ('H', []) | ('f', []) => {
                // CUP / HVP - Cursor Position
                let col = if param1 == 0 { 1 } else { param1 as usize };
                self.grid.move_to_origin(n - 1, col - 1);
            }
            ('d', []) => {
                // VPA - Line absolute
                let col = self.grid.cursor_col;
                self.grid.move_to_origin(n - 1, col);
            }
            ('I', []) => self.grid.tab(n as isize),     // CHT
            ('Z', []) => self.grid.tab(-(n as isize)), // CBT
            ('g', []) => self.grid.clear_tab_stop(param0), // TBC

            // Erase
            ('J', []) => self.grid.erase_in_display(param0), // ED
            ('K', []) => self.grid.erase_in_line(param0),    // EL
            ('X', []) => self.grid.erase_chars(n),           // ECH
            ('@', []) => self.grid.insert_chars(n),          // ICH
            ('P', []) => self.grid.delete_chars(n),          // DCH
            ('L', []) => self.grid.insert_lines(n),          // IL
            ('M', []) => self.grid.delete_lines(n),          // DL
            ('S', []) => {
                // SU - Scroll Up
                let (top, _) = self.grid.scroll_region();
                self.grid.scroll_up(top, n);
            }
            ('T', []) => {
                // SD - Scroll Down
                let (top, _) = self.grid.scroll_region();
                self.grid.scroll_down(top, n);
            }

            ('r', []) => {
                // DECSTBM - Set Top and Bottom Margins
                let top = if param0 == 0 { 1 } else { param0 as usize };
                let bottom = if param1 == 0 {
                    self.grid.rows()
                } else {
                    param1 as usize
                };
                self.grid.set_scroll_region(top - 1, bottom - 1);
                self.grid.move_to_origin(0, 0);
            }
            ('s', []) => self.grid.save_cursor(),    // SCOSC
            ('u', []) => self.grid.restore_cursor(), // SCORC

            ('m', []) => self.handle_sgr(&flat_params),

            ('h', []) | ('l', []) => {
                // SM / RM - ANSI modes
                let enable = action == 'h';
                for p in &flat_params {
                    self.handle_ansi_mode(p.first().copied().unwrap_or(0), enable);
                }
            }
            ('h', [b'?']) | ('l', [b'?']) => {
                // DECSET / DECRST
                let enable = action == 'h';
                for p in &flat_params {
                    self.handle_decset(p.first().copied().unwrap_or(0), enable);
                }
            }

            ('n', []) => {
                // DSR - Device Status Report
                match param0 {
                    5 => self.emit(ModelEvent::Reply(b"\x1b[0n".to_vec())),
                    6 => {
                        let reply = format!(
                            "\x1b[{};{}R",
                            self.grid.cursor_row + 1,
                            self.grid.cursor_col + 1
                        );
                        self.emit(ModelEvent::Reply(reply.into_bytes()));
                    }
                    _ => trace!("Unhandled DSR: {}", param0),
                }
            }
            ('c', []) => {
                // DA - Primary Device Attributes (VT102)
                if param0 == 0 {
                    self.emit(ModelEvent::Reply(b"\x1b[?6c".to_vec()));
                }
            }

            ('q', [b' ']) => {
                // DECSCUSR - Cursor style (blinking variants share a shape)
                self.grid.cursor_style = match param0 {
                    0 => self.grid.default_cursor_style,
                    1 | 2 => CursorStyle::Block,
                    3 | 4 => CursorStyle::Underline,
                    5 | 6 => CursorStyle::Bar,
                    _ => self.grid.cursor_style,
                };
            }

            _ => {
                trace!(
                    "Unhandled CSI: action={}, intermediates={:?}, params={:?}",
                    action,
                    intermediates,
                    flat_params
                );
            }
        }
    }

    /// Handle ESC sequence
    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        match (byte, intermediates) {
            (b'D', []) => {
                // IND - Index (move cursor down 1 line, with scroll)
                self.grid.index();
            }
            (b'E', []) => {
                // NEL - Next Line
                self.grid.newline(true);
            }
            (b'H', []) => self.grid.set_tab_stop(), // HTS
            (b'M', []) => {
                // RI - Reverse Index (move cursor up 1 line)
                self.grid.reverse_index();
            }
            (b'c', []) => {
                // RIS - Full Reset
                self.grid.reset();
                self.emit(ModelEvent::ResetPalette);
            }
            (b'7', []) => self.grid.save_cursor(),    // DECSC
            (b'8', []) => self.grid.restore_cursor(), // DECRC
            (b'=', []) => self.grid.mode.insert(TermMode::APPKEYPAD), // DECKPAM
            (b'>', []) => self.grid.mode.remove(TermMode::APPKEYPAD), // DECKPNM
            _ => {
                trace!(
                    "Unhandled ESC: byte=0x{:02x}, intermediates={:?}",
                    byte,
                    intermediates
                );
            }
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, action: char) {
        trace!("Ignoring DCS: action={}", action);
    }

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    /// Handle OSC sequence
    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        if params.is_empty() {
            return;
        }

        let cmd = std::str::from_utf8(params[0]).unwrap_or("");
        trace!("OSC dispatch: cmd={}, params.len()={}", cmd, params.len());
        match cmd {
            "0" | "2" => self.handle_osc_title(params),
            "4" => self.handle_osc_4(params),
            "10" => self.handle_osc_dynamic(params, ColorSlot::Foreground),
            "11" => self.handle_osc_dynamic(params, ColorSlot::Background),
            "12" => self.handle_osc_dynamic(params, ColorSlot::Cursor),
            "104" => self.emit(ModelEvent::ResetPalette),
            _ => {
                trace!("Unhandled OSC: cmd={}", cmd);
            }
        }
    }
}

impl<'a> Performer<'a> {
    /// SM/RM handling
    fn handle_ansi_mode(&mut self, mode: u16, enable: bool) {
        let flag = match mode {
            2 => TermMode::KBDLOCK,
            4 => TermMode::INSERT,
            20 => TermMode::CRLF,
            _ => {
                trace!("Unhandled ANSI mode: {} = {}", mode, enable);
                return;
            }
        };
        self.grid.mode.set(flag, enable);
    }

    /// DECSET/DECRST handling
    fn handle_decset(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.grid.mode.set(TermMode::APPCURSOR, enable), // DECCKM
            5 => {
                // DECSCNM - Reverse video
                if self.grid.mode.contains(TermMode::REVERSE) != enable {
                    self.grid.mode.set(TermMode::REVERSE, enable);
                    self.grid.set_full_dirty();
                }
            }
            6 => {
                // DECOM - Origin mode
                self.grid.mode.set(TermMode::ORIGIN, enable);
                self.grid.move_to_origin(0, 0);
            }
            7 => self.grid.mode.set(TermMode::WRAP, enable), // DECAWM
            25 => self.grid.mode.set(TermMode::HIDE, !enable), // DECTCEM
            9 | 1000 | 1002 | 1003 => {
                // Mouse tracking modes are mutually exclusive
                self.grid.mode.remove(TermMode::MOUSE);
                let flag = match mode {
                    9 => TermMode::MOUSE_X10,
                    1000 => TermMode::MOUSE_BTN,
                    1002 => TermMode::MOUSE_MOTION,
                    _ => TermMode::MOUSE_MANY,
                };
                self.grid.mode.set(flag, enable);
            }
            1004 => self.grid.mode.set(TermMode::FOCUS, enable),
            1006 => self.grid.mode.set(TermMode::MOUSE_SGR, enable),
            47 | 1047 | 1049 if !self.grid.allow_altscreen => {
                debug!("Alternate screen disabled, ignoring mode {}", mode);
            }
            47 | 1047 => self.grid.set_alt_screen(enable),
            1048 => {
                if enable {
                    self.grid.save_cursor();
                } else {
                    self.grid.restore_cursor();
                }
            }
            1049 => {
                // Alternate Screen Buffer with saved cursor
                if enable {
                    self.grid.save_cursor();
                    self.grid.set_alt_screen(true);
                } else {
                    self.grid.set_alt_screen(false);
                    self.grid.restore_cursor();
                }
            }
            2004 => self.grid.mode.set(TermMode::BRCKTPASTE, enable),
            _ => {
                trace!("Unhandled DEC private mode: {} = {}", mode, enable);
            }
        }
    }

    /// SGR (Select Graphic Rendition) handling
    fn handle_sgr(&mut self, params: &[Vec<u16>]) {
        // No parameters -> reset
        if params.is_empty() {
            self.grid.reset_attrs();
            return;
        }

        let mut iter = params.iter().peekable();

        while let Some(param) = iter.next() {
            // Colon-separated extended color (38:2:r:g:b, 48:5:n)
            if param.len() > 1 {
                if let Some(color) = parse_colon_color(param) {
                    match param[0] {
                        38 => self.grid.set_fg(color),
                        48 => self.grid.set_bg(color),
                        _ => {}
                    }
                } else if param[0] == 4 {
                    // 4:0 disables underline, any other style draws a plain one
                    if param[1] == 0 {
                        self.grid.clear_attr(CellAttrs::UNDERLINE);
                    } else {
                        self.grid.set_attr(CellAttrs::UNDERLINE);
                    }
                }
                continue;
            }

            let code = param[0];
            match code {
                0 => self.grid.reset_attrs(),
                1 => self.grid.set_attr(CellAttrs::BOLD),
                2 => self.grid.set_attr(CellAttrs::FAINT),
                3 => self.grid.set_attr(CellAttrs::ITALIC),
                4 => self.grid.set_attr(CellAttrs::UNDERLINE),
                5 | 6 => self.grid.set_attr(CellAttrs::BLINK),
                7 => self.grid.set_attr(CellAttrs::REVERSE),
                8 => self.grid.set_attr(CellAttrs::INVISIBLE),
                9 => self.grid.set_attr(CellAttrs::STRUCK),
                22 => self.grid.clear_attr(CellAttrs::BOLD_FAINT),
                23 => self.grid.clear_attr(CellAttrs::ITALIC),
                24 => self.grid.clear_attr(CellAttrs::UNDERLINE),
                25 => self.grid.clear_attr(CellAttrs::BLINK),
                27 => self.grid.clear_attr(CellAttrs::REVERSE),
                28 => self.grid.clear_attr(CellAttrs::INVISIBLE),
                29 => self.grid.clear_attr(CellAttrs::STRUCK),
                // Foreground color (standard 8 colors)
                30..=37 => self.grid.set_fg(Color::Indexed((code - 30) as u8)),
                38 => {
                    // Extended foreground color: 38;5;n (256 color) or 38;2;r;g;b (True Color)
                    if let Some(color) = parse_extended_color(&mut iter) {
                        self.grid.set_fg(color);
                    }
                }
                39 => self.grid.set_fg(Color::Default),
                // Background color (standard 8 colors)
                40..=47 => self.grid.set_bg(Color::Indexed((code - 40) as u8)),
                48 => {
                    if let Some(color) = parse_extended_color(&mut iter) {
                        self.grid.set_bg(color);
                    }
                }
                49 => self.grid.set_bg(Color::Default),
                // Foreground color (bright 8 colors)
                90..=97 => self.grid.set_fg(Color::Indexed((code - 90 + 8) as u8)),
                // Background color (bright 8 colors)
                100..=107 => self.grid.set_bg(Color::Indexed((code - 100 + 8) as u8)),
                _ => {
                    trace!("Unhandled SGR: {}", code);
                }
            }
        }
    }

    /// OSC 0 / OSC 2: window title
    fn handle_osc_title(&mut self, params: &[&[u8]]) {
        // Titles may contain ';', which vte splits on
        let title = params[1..]
            .iter()
            .map(|p| String::from_utf8_lossy(p))
            .collect::<Vec<_>>()
            .join(";");
        debug!("Title set: {}", title);
        self.emit(ModelEvent::Title(title));
    }

    /// OSC 4 ; index ; spec [; index ; spec ...]
    fn handle_osc_4(&mut self, params: &[&[u8]]) {
        for pair in params[1..].chunks(2) {
            let [index, spec] = pair else {
                break;
            };
            let Some(index) = std::str::from_utf8(index)
                .ok()
                .and_then(|s| s.parse::<u8>().ok())
            else {
                trace!("OSC 4: bad index {:?}", index);
                continue;
            };
            if *spec == b"?" {
                // Queries are not answered
                continue;
            }
            let rgb = parse_osc_color(spec);
            self.emit(ModelEvent::SetColor {
                slot: ColorSlot::Indexed(index),
                rgb,
            });
        }
    }

    /// OSC 10/11/12: default fg, bg and cursor colors
    fn handle_osc_dynamic(&mut self, params: &[&[u8]], slot: ColorSlot) {
        let Some(spec) = params.get(1) else {
            return;
        };
        if *spec == b"?" {
            return;
        }
        match parse_osc_color(spec) {
            Some(rgb) => self.emit(ModelEvent::SetColor {
                slot,
                rgb: Some(rgb),
            }),
            None => trace!("OSC color: unparsable {:?}", String::from_utf8_lossy(spec)),
        }
    }
}

/// Parse extended color (semicolon-separated)
/// Format: 38;5;n or 38;2;r;g;b
fn parse_extended_color(
    iter: &mut std::iter::Peekable<std::slice::Iter<'_, Vec<u16>>>,
) -> Option<Color> {
    let mode = iter.next()?.first().copied()?;
    match mode {
        5 => {
            // 256 colors: 38;5;n
            let idx = iter.next()?.first().copied()?;
            Some(Color::Indexed(idx.min(255) as u8))
        }
        2 => {
            // True Color: 38;2;r;g;b
            let r = iter.next()?.first().copied()?.min(255) as u8;
            let g = iter.next()?.first().copied()?.min(255) as u8;
            let b = iter.next()?.first().copied()?.min(255) as u8;
            Some(Color::Rgb(Rgb::new(r, g, b)))
        }
        _ => None,
    }
}

/// Parse colon format color: 38:2:r:g:b, 38:2::r:g:b or 38:5:n
fn parse_colon_color(subparams: &[u16]) -> Option<Color> {
    if !matches!(subparams.first(), Some(38) | Some(48)) {
        return None;
    }
    match subparams.get(1)? {
        5 => Some(Color::Indexed((*subparams.get(2)?).min(255) as u8)),
        2 => {
            // Optional color space id before the components
            let rgb = if subparams.len() >= 6 {
                &subparams[3..6]
            } else {
                subparams.get(2..5)?
            };
            Some(Color::Rgb(Rgb::new(
                rgb[0].min(255) as u8,
                rgb[1].min(255) as u8,
                rgb[2].min(255) as u8,
            )))
        }
        _ => None,
    }
}
