//! xterm mouse reporting
//!
//! Encodes pointer events for the child when a mouse tracking mode is on:
//! X10 (press only), button-event and any-event tracking, in SGR or the
//! legacy byte encoding.

use crate::display::ModState;
use crate::terminal::grid::TermMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    Press,
    Release,
    Motion,
}

/// Legacy coordinates are one byte offset by 32
const LEGACY_LIMIT: usize = 223;

/// Code meaning "no button held"
const RELEASED: u8 = 3;

#[derive(Debug, Clone)]
pub struct MouseReporter {
    /// Button of the last press, or `RELEASED`
    old_button: u8,
    /// Last reported cell
    ox: usize,
    oy: usize,
}

impl Default for MouseReporter {
    fn default() -> Self {
        Self {
            old_button: RELEASED,
            ox: 0,
            oy: 0,
        }
    }
}

impl MouseReporter {
    /// Report bytes for a pointer event at cell (`col`, `row`), or `None`
    /// when the active mode does not report it. `button` is 1-based.
    pub fn report(
        &mut self,
        kind: MouseKind,
        button: u8,
        col: usize,
        row: usize,
        state: ModState,
        mode: TermMode,
    ) -> Option<Vec<u8>> {
        let sgr = mode.contains(TermMode::MOUSE_SGR);
        let x10 = mode.contains(TermMode::MOUSE_X10);

        let mut code = match kind {
            MouseKind::Motion => {
                if (col, row) == (self.ox, self.oy) {
                    return None;
                }
                if !mode.intersects(TermMode::MOUSE_MOTION | TermMode::MOUSE_MANY) {
                    return None;
                }
                // Button-event tracking only reports drags
                if mode.contains(TermMode::MOUSE_MOTION) && self.old_button == RELEASED {
                    return None;
                }
                self.ox = col;
                self.oy = row;
                self.old_button + 32
            }
            MouseKind::Press | MouseKind::Release => {
                let code = if !sgr && kind == MouseKind::Release {
                    RELEASED
                } else {
                    // Wheel buttons 4/5 become 64/65
                    let b = button.saturating_sub(1);
                    if b >= 3 {
                        b + 64 - 3
                    } else {
                        b
                    }
                };
                if kind == MouseKind::Press {
                    self.old_button = code;
                    self.ox = col;
                    self.oy = row;
                } else {
                    self.old_button = RELEASED;
                    if x10 || code == 64 || code == 65 {
                        return None;
                    }
                }
                code
            }
        };

        if !x10 {
            if state.contains(ModState::SHIFT) {
                code += 4;
            }
            if state.contains(ModState::MOD4) {
                code += 8;
            }
            if state.contains(ModState::CONTROL) {
                code += 16;
            }
        }

        if sgr {
            let end = if kind == MouseKind::Release { 'm' } else { 'M' };
            Some(format!("\x1b[<{};{};{}{}", code, col + 1, row + 1, end).into_bytes())
        } else if col < LEGACY_LIMIT && row < LEGACY_LIMIT {
            Some(vec![
                0x1b,
                b'[',
                b'M',
                32 + code,
                (32 + col + 1) as u8,
                (32 + row + 1) as u8,
            ])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: ModState = ModState::empty();

    #[test]
    fn test_legacy_press_release() {
        let mut m = MouseReporter::default();
        let mode = TermMode::MOUSE_BTN;
        assert_eq!(
            m.report(MouseKind::Press, 1, 2, 3, NONE, mode),
            Some(vec![0x1b, b'[', b'M', 32, 35, 36])
        );
        assert_eq!(
            m.report(MouseKind::Release, 1, 2, 3, NONE, mode),
            Some(vec![0x1b, b'[', b'M', 35, 35, 36])
        );
    }

    #[test]
    fn test_sgr_encoding_with_modifiers() {
        let mut m = MouseReporter::default();
        let mode = TermMode::MOUSE_BTN | TermMode::MOUSE_SGR;
        let state = ModState::SHIFT | ModState::CONTROL;
        assert_eq!(
            m.report(MouseKind::Press, 3, 9, 0, state, mode),
            Some(b"\x1b[<22;10;1M".to_vec())
        );
        assert_eq!(
            m.report(MouseKind::Release, 3, 9, 0, NONE, mode),
            Some(b"\x1b[<2;10;1m".to_vec())
        );
    }

    #[test]
    fn test_wheel_press_reported_release_dropped() {
        let mut m = MouseReporter::default();
        let mode = TermMode::MOUSE_BTN | TermMode::MOUSE_SGR;
        assert_eq!(
            m.report(MouseKind::Press, 4, 0, 0, NONE, mode),
            Some(b"\x1b[<64;1;1M".to_vec())
        );
        assert_eq!(m.report(MouseKind::Release, 4, 0, 0, NONE, mode), None);
    }

    #[test]
    fn test_x10_has_no_release_or_modifiers() {
        let mut m = MouseReporter::default();
        let mode = TermMode::MOUSE_X10;
        assert_eq!(
            m.report(MouseKind::Press, 1, 0, 0, ModState::SHIFT, mode),
            Some(vec![0x1b, b'[', b'M', 32, 33, 33])
        );
        assert_eq!(m.report(MouseKind::Release, 1, 0, 0, NONE, mode), None);
    }

    #[test]
    fn test_motion_rules() {
        let mut m = MouseReporter::default();
        let drag = TermMode::MOUSE_MOTION | TermMode::MOUSE_SGR;
        // No button held: button-event mode stays quiet
        assert_eq!(m.report(MouseKind::Motion, 0, 1, 1, NONE, drag), None);

        m.report(MouseKind::Press, 1, 1, 1, NONE, drag);
        // Same cell is not repeated
        assert_eq!(m.report(MouseKind::Motion, 0, 1, 1, NONE, drag), None);
        assert_eq!(
            m.report(MouseKind::Motion, 0, 2, 1, NONE, drag),
            Some(b"\x1b[<32;3;2M".to_vec())
        );

        // Any-event mode reports without a button
        let mut m = MouseReporter::default();
        let many = TermMode::MOUSE_MANY | TermMode::MOUSE_SGR;
        assert_eq!(
            m.report(MouseKind::Motion, 0, 4, 0, NONE, many),
            Some(b"\x1b[<35;5;1M".to_vec())
        );
        // Plain button tracking never reports motion
        let mut m = MouseReporter::default();
        m.report(MouseKind::Press, 1, 0, 0, NONE, TermMode::MOUSE_BTN);
        assert_eq!(m.report(MouseKind::Motion, 0, 3, 0, NONE, TermMode::MOUSE_BTN), None);
    }

    #[test]
    fn test_legacy_coordinates_limit() {
        let mut m = MouseReporter::default();
        assert_eq!(
            m.report(MouseKind::Press, 1, 223, 0, NONE, TermMode::MOUSE_BTN),
            None
        );
        assert!(m
            .report(MouseKind::Press, 1, 223, 0, NONE, TermMode::MOUSE_BTN | TermMode::MOUSE_SGR)
            .is_some());
    }
}
