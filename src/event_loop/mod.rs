//! Redraw scheduler and event dispatch
//!
//! One thread waits on the child's PTY and the display connection,
//! applies child output to the terminal model, and redraws at a capped
//! rate. Window events are drained and dispatched right before each
//! draw, so a frame always sees a fully applied batch of input.

pub mod clock;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info, trace, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use crate::config::Config;
use crate::constants::{
    FOCUS_IN, FOCUS_OUT, MAX_FONT_SIZE, MIN_FONT_SIZE, PTY_READ_BUDGET, ZOOM_STEP,
};
use crate::display::{ModState, Pointer, WindowEvent, WindowSystem, CURRENT_TIME};
use crate::font::FontEngine;
use crate::input::{Action, Bindings, KeyTranslator, ModMatch, MouseKind, MouseReporter, Operation};
use crate::render::{Palette, PixelBuffer, Renderer, Surface};
use crate::selection::{SelectionEngine, SelectionKind};
use crate::terminal::grid::{CellAttrs, TermMode};
use crate::terminal::pty::{ProcessChannel, Pty};
use crate::terminal::{ModelEvent, Terminal};
use crate::window::{WinMode, WindowState};

pub use clock::FrameClock;

/// Everything the front-end owns, driven by [`Frontend::run`]
pub struct Frontend<W: WindowSystem, F: FontEngine, P: ProcessChannel> {
    pub display: W,
    pub font: F,
    pub chan: P,
    pub term: Terminal,
    pub window: WindowState,
    pub buf: PixelBuffer,
    pub renderer: Renderer,
    pub selection: SelectionEngine,
    keys: Box<dyn KeyTranslator>,
    bindings: Bindings,
    mouse: MouseReporter,
    clock: FrameClock,
    default_font_size: f32,
    /// Something on screen carries the blink attribute
    blinking: bool,
    /// Motion without buttons is subscribed
    pointer_motion: bool,
    running: bool,
}

impl<W: WindowSystem, F: FontEngine, P: ProcessChannel> Frontend<W, F, P> {
    /// Assemble the front-end for an already mapped window
    pub fn new(
        config: &Config,
        display: W,
        font: F,
        chan: P,
        keys: Box<dyn KeyTranslator>,
        window: WindowState,
    ) -> Self {
        let (cols, rows) = window.grid_size(window.width, window.height);
        let mut term = Terminal::new(cols, rows);
        term.set_default_cursor_style(config.appearance.cursor_style());
        term.set_allow_altscreen(config.terminal.allow_altscreen);

        let timing = &config.timing;
        let clock = FrameClock::new(
            timing.active_fps,
            timing.idle_fps,
            timing.blink(),
            Instant::now(),
        );
        let renderer = Renderer::new(
            Palette::from_config(config),
            config.appearance.bold_is_bright,
            config.appearance.cursor_thickness,
        );
        let buf = PixelBuffer::new(window.width, window.height);
        let default_font_size = font.size();

        Self {
            display,
            font,
            chan,
            term,
            window,
            buf,
            renderer,
            selection: SelectionEngine::from_config(config),
            keys,
            bindings: Bindings::from_config(&config.keybinds),
            mouse: MouseReporter::default(),
            clock,
            default_font_size,
            blinking: false,
            pointer_motion: false,
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Apply child output to the model and act on what it raised
    pub fn process_output(&mut self, bytes: &[u8]) -> Result<()> {
        self.term.feed(bytes);

        for event in self.term.take_events() {
            match event {
                ModelEvent::Title(title) => {
                    debug!("Title: {}", title);
                    self.display.set_title(&title)?;
                }
                ModelEvent::Bell => {
                    if !self.window.is_focused() {
                        self.display.set_urgency(true)?;
                    }
                    self.display.bell()?;
                }
                ModelEvent::Reply(reply) => self.chan.send(&reply)?,
                ModelEvent::Scrolled { top, delta, .. } => {
                    self.selection.sel.scroll(&mut self.term, top, delta);
                }
                ModelEvent::SetColor { slot, rgb } => {
                    self.renderer.palette_mut().set(slot, rgb);
                    self.term.set_full_dirty();
                }
                ModelEvent::ResetPalette => {
                    self.renderer.palette_mut().reset();
                    self.term.set_full_dirty();
                }
            }
        }

        let want_motion = self.term.mode().contains(TermMode::MOUSE_MANY);
        if want_motion != self.pointer_motion {
            self.display.set_pointer_motion(want_motion)?;
            self.pointer_motion = want_motion;
        }
        Ok(())
    }

    /// One scheduler step after the wait returned. Returns the next wait
    /// timeout; `None` blocks until input.
    pub fn tick(&mut self, pty_ready: bool, display_ready: bool, now: Instant) -> Result<Option<Duration>> {
        if pty_ready && self.clock.blink_enabled() {
            self.blinking = self.term.has_attr(CellAttrs::BLINK);
            if !self.blinking {
                self.term.clear_blink();
            }
        }
        if display_ready {
            self.clock.note_input();
        }

        let mut timeout = Some(self.clock.frame_interval());
        let mut redraw = false;

        if self.clock.blink_due(now) {
            self.term.set_dirty_attr(CellAttrs::BLINK);
            self.term.toggle_blink();
            redraw = true;
        }
        if self.clock.frame_due(now) {
            redraw = true;
        }

        if redraw {
            self.drain_events(now)?;
            if !self.running {
                return Ok(None);
            }
            self.draw()?;
            self.clock.after_draw(display_ready);
            if !pty_ready && !display_ready {
                timeout = self.clock.idle_timeout(now, self.blinking);
            }
        }

        self.selection
            .expire_stalled(&mut self.display, &mut self.chan, now)?;
        if let Some(left) = self.selection.transfer_deadline(now) {
            let left = left.max(Duration::from_millis(1));
            timeout = Some(timeout.map_or(left, |t| t.min(left)));
        }
        Ok(timeout)
    }

    /// Dispatch every queued window event
    pub fn drain_events(&mut self, now: Instant) -> Result<()> {
        while let Some(event) = self.display.poll_event()? {
            self.handle_event(event, now)?;
            if !self.running {
                break;
            }
        }
        Ok(())
    }

    /// Repaint dirty rows and the cursor, then push the frame out
    pub fn draw(&mut self) -> Result<()> {
        let mut surface = Surface {
            term: &mut self.term,
            sel: &self.selection.sel,
            win: &self.window,
            font: &mut self.font,
            buf: &mut self.buf,
        };
        if self.renderer.draw(&mut surface) {
            self.display.present(&mut self.buf)?;
        }
        self.display.flush()?;
        Ok(())
    }

    pub fn handle_event(&mut self, event: WindowEvent, now: Instant) -> Result<()> {
        trace!("Event: {:?}", event);
        let bracketed = self.term.mode().contains(TermMode::BRCKTPASTE);

        match event {
            WindowEvent::Expose => self.term.set_full_dirty(),
            WindowEvent::Visibility { obscured } => {
                self.window.mode.set(WinMode::VISIBLE, !obscured);
            }
            WindowEvent::Map => {
                self.window.mode.insert(WinMode::VISIBLE);
                self.term.set_full_dirty();
            }
            WindowEvent::Unmap => self.window.mode.remove(WinMode::VISIBLE),
            WindowEvent::Key { keycode, state } => self.on_key(keycode, state)?,
            WindowEvent::CloseRequest => {
                info!("Close requested, hanging up child");
                self.chan.hangup();
                self.running = false;
            }
            WindowEvent::EmbedFocus(focused) => {
                self.window.mode.set(WinMode::FOCUSED, focused);
                if focused {
                    self.display.set_urgency(false)?;
                }
            }
            WindowEvent::Configure { width, height } => {
                if (width, height) != (self.window.width, self.window.height) {
                    self.resize(width, height)?;
                }
            }
            WindowEvent::Focus { focused, grab } => {
                if !grab {
                    self.on_focus(focused)?;
                }
            }
            WindowEvent::Motion(p) => self.on_motion(p)?,
            WindowEvent::ButtonPress(p) => self.on_button_press(p, now)?,
            WindowEvent::ButtonRelease(p) => self.on_button_release(p)?,
            WindowEvent::SelectionNotify { property, .. } => {
                self.selection.on_selection_notify(
                    &mut self.display,
                    &mut self.chan,
                    property,
                    bracketed,
                    now,
                )?;
            }
            WindowEvent::PropertyNotify { atom, new_value } => {
                self.selection.on_property_notify(
                    &mut self.display,
                    &mut self.chan,
                    atom,
                    new_value,
                    bracketed,
                    now,
                )?;
            }
            WindowEvent::SelectionRequest(req) => {
                self.selection.on_selection_request(&mut self.display, &req);
            }
            WindowEvent::SelectionClear { selection } => {
                self.selection
                    .on_selection_clear(&self.display, &mut self.term, selection);
            }
        }
        Ok(())
    }

    fn on_key(&mut self, keycode: u32, state: ModState) -> Result<()> {
        let mode = self.term.mode();
        if mode.contains(TermMode::KBDLOCK) {
            return Ok(());
        }
        let (keysym, text) = self.keys.translate(keycode, state);
        match self.bindings.key_action(keysym, &text, state, mode) {
            Some(action) => self.perform(action),
            None => Ok(()),
        }
    }

    fn perform(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Send(bytes) => self.chan.send(&bytes),
            Action::Invoke(op) => self.invoke(op),
        }
    }

    fn invoke(&mut self, op: Operation) -> Result<()> {
        debug!("Operation {:?}", op);
        match op {
            Operation::ClipCopy => self.selection.clip_copy(&mut self.display),
            Operation::ClipPaste => self.selection.paste(
                &mut self.display,
                &mut self.chan,
                SelectionKind::Clipboard,
                CURRENT_TIME,
            )?,
            Operation::SelPaste => self.selection.paste(
                &mut self.display,
                &mut self.chan,
                SelectionKind::Primary,
                CURRENT_TIME,
            )?,
            Operation::ZoomIn => self.zoom(self.font.size() + ZOOM_STEP)?,
            Operation::ZoomOut => self.zoom(self.font.size() - ZOOM_STEP)?,
            Operation::ZoomReset => self.zoom(self.default_font_size)?,
        }
        Ok(())
    }

    fn on_focus(&mut self, focused: bool) -> Result<()> {
        self.window.mode.set(WinMode::FOCUSED, focused);
        if focused {
            self.display.set_urgency(false)?;
        }
        if self.term.mode().contains(TermMode::FOCUS) {
            self.chan.send(if focused { FOCUS_IN } else { FOCUS_OUT })?;
        }
        Ok(())
    }

    /// Pointer events go to the child while it tracks the mouse, unless
    /// Shift forces local selection
    fn reports_mouse(&self, state: ModState) -> bool {
        self.term.mode().intersects(TermMode::MOUSE) && !state.contains(ModState::SHIFT)
    }

    fn cell_at(&self, p: &Pointer) -> (usize, usize) {
        (self.window.x2col(p.x), self.window.y2row(p.y))
    }

    fn report_mouse(&mut self, kind: MouseKind, p: &Pointer) -> Result<()> {
        let (col, row) = self.cell_at(p);
        let mode = self.term.mode();
        match self.mouse.report(kind, p.button, col, row, p.state, mode) {
            Some(bytes) => self.chan.send(&bytes),
            None => Ok(()),
        }
    }

    fn on_button_press(&mut self, p: Pointer, now: Instant) -> Result<()> {
        if self.reports_mouse(p.state) {
            return self.report_mouse(MouseKind::Press, &p);
        }
        if let Some(action) = self.bindings.mouse_action(p.button, p.state) {
            return self.perform(action);
        }
        if p.button == 1 {
            let (col, row) = self.cell_at(&p);
            self.selection.sel.press(&mut self.term, col, row, now);
        }
        Ok(())
    }

    fn on_motion(&mut self, p: Pointer) -> Result<()> {
        if self.reports_mouse(p.state) {
            return self.report_mouse(MouseKind::Motion, &p);
        }
        let (col, row) = self.cell_at(&p);
        self.selection
            .sel
            .drag(&mut self.term, col, row, rectangular(p.state));
        Ok(())
    }

    fn on_button_release(&mut self, p: Pointer) -> Result<()> {
        if self.reports_mouse(p.state) {
            return self.report_mouse(MouseKind::Release, &p);
        }
        match p.button {
            2 => self.selection.paste(
                &mut self.display,
                &mut self.chan,
                SelectionKind::Primary,
                p.time,
            )?,
            1 => {
                let (col, row) = self.cell_at(&p);
                self.selection.release(
                    &mut self.display,
                    &mut self.term,
                    col,
                    row,
                    rectangular(p.state),
                    p.time,
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Adopt a new window size: grid, back buffer and child
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let (cols, rows) = self.window.resize(width, height);
        debug!("Resize {}x{} -> {}x{} cells", width, height, cols, rows);
        if (cols, rows) != (self.term.cols(), self.term.rows()) {
            self.selection.sel.clear(&mut self.term);
            self.term.resize(cols, rows);
        }
        self.buf.resize(width, height);
        self.term.set_full_dirty();
        self.chan.resize(
            cols as u16,
            rows as u16,
            self.window.tw as u16,
            self.window.th as u16,
        )
    }

    /// Change the font pixel size and refit the grid to the window
    fn zoom(&mut self, size: f32) -> Result<()> {
        let size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        if (size - self.font.size()).abs() < f32::EPSILON {
            return Ok(());
        }
        info!("Font size {} -> {}", self.font.size(), size);
        self.font.set_size(size);
        let metrics = self.font.metrics();
        self.window.set_metrics(metrics);
        self.display.set_size_hints(
            metrics.cell_width,
            metrics.cell_height,
            self.window.border,
            self.window.fixed,
        )?;
        let (width, height) = (self.window.width, self.window.height);
        self.resize(width, height)
    }
}

/// Alt drag selects a rectangle
fn rectangular(state: ModState) -> bool {
    ModMatch::Exact(ModState::MOD1).matches(state.difference(ModState::SHIFT))
}

/// Poll timeout in milliseconds, rounding up so short waits do not spin
fn poll_timeout(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(d) => d.as_micros().div_ceil(1000).min(i32::MAX as u128) as i32,
    }
}

impl<W: WindowSystem, F: FontEngine> Frontend<W, F, Pty> {
    /// Service the child and the display until the window closes or the
    /// child exits
    pub fn run(&mut self) -> Result<()> {
        info!("Terminal loop started");
        let mut buf = vec![0u8; PTY_READ_BUDGET];
        // Events read while mapping the window are already queued
        let mut timeout = Some(Duration::ZERO);

        while self.running {
            let (pty_ready, display_ready, hangup) = {
                let pty_fd = self.chan.fd();
                let display_fd = self.display.fd();
                let mut fds = [
                    PollFd::new(&pty_fd, PollFlags::POLLIN),
                    PollFd::new(&display_fd, PollFlags::POLLIN),
                ];
                match poll(&mut fds, poll_timeout(timeout)) {
                    Ok(_) => {}
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(e).context("poll failed"),
                }
                let ready = |fd: &PollFd, flags: PollFlags| {
                    fd.revents().map_or(false, |r| r.intersects(flags))
                };
                (
                    ready(&fds[0], PollFlags::POLLIN),
                    ready(&fds[1], PollFlags::POLLIN),
                    ready(&fds[0], PollFlags::POLLHUP | PollFlags::POLLERR),
                )
            };

            if pty_ready || hangup {
                match self.chan.read(&mut buf) {
                    Ok(0) if hangup => {
                        info!("Child hung up");
                        break;
                    }
                    Ok(0) => {}
                    Ok(n) => self.process_output(&buf[..n])?,
                    Err(e) => {
                        if self.chan.is_alive() {
                            return Err(e);
                        }
                        info!("Child exited");
                        break;
                    }
                }
            }

            timeout = self.tick(pty_ready, display_ready, Instant::now())?;
        }

        if let Err(e) = self.display.flush() {
            warn!("Final flush failed: {}", e);
        }
        info!("Terminal loop finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::testing::{FakeDisplay, ATOMS};
    use crate::display::PropertyChunk;
    use crate::font::testing::BoxFont;
    use crate::input::keyboard::testing::IdentityKeys;
    use xkbcommon::xkb::keysyms;

    type TestFrontend = Frontend<FakeDisplay, BoxFont, Vec<u8>>;

    fn frontend(cols: usize, rows: usize) -> TestFrontend {
        let mut config = Config::default();
        config.timing.blink_ms = 500;
        let font = BoxFont::new();
        let mut window = WindowState::new(cols, rows, font.metrics(), 2);
        window.mode = WinMode::VISIBLE | WinMode::FOCUSED;
        Frontend::new(
            &config,
            FakeDisplay::new(),
            font,
            Vec::new(),
            Box::new(IdentityKeys),
            window,
        )
    }

    fn pointer(f: &TestFrontend, button: u8, col: u32, row: u32, state: ModState) -> Pointer {
        let b = f.window.border;
        Pointer {
            button,
            x: (b + col * f.window.cw + 1) as i32,
            y: (b + row * f.window.ch + 1) as i32,
            state,
            time: 0,
        }
    }

    fn key(f: &mut TestFrontend, keysym: u32, state: ModState) {
        f.handle_event(WindowEvent::Key { keycode: keysym, state }, Instant::now())
            .unwrap();
    }

    #[test]
    fn test_typed_text_reaches_child() {
        let mut f = frontend(10, 3);
        key(&mut f, 'a' as u32, ModState::empty());
        key(&mut f, 'b' as u32, ModState::MOD1);
        key(&mut f, keysyms::KEY_Up, ModState::empty());
        assert_eq!(f.chan, b"a\x1bb\x1b[A");
    }

    #[test]
    fn test_keyboard_lock_drops_keys() {
        let mut f = frontend(10, 3);
        f.process_output(b"\x1b[2h").unwrap();
        key(&mut f, 'a' as u32, ModState::empty());
        assert!(f.chan.is_empty());
    }

    #[test]
    fn test_child_replies_and_title() {
        let mut f = frontend(10, 3);
        f.process_output(b"\x1b[5n\x1b]2;hello\x07").unwrap();
        assert_eq!(f.chan, b"\x1b[0n");
        assert_eq!(f.display.titles, vec!["hello".to_string()]);
    }

    #[test]
    fn test_bell_sets_urgency_only_unfocused() {
        let mut f = frontend(10, 3);
        f.process_output(b"\x07").unwrap();
        assert_eq!(f.display.bells, 1);
        assert!(!f.display.urgent);

        let now = Instant::now();
        f.handle_event(WindowEvent::Focus { focused: false, grab: false }, now)
            .unwrap();
        f.process_output(b"\x07").unwrap();
        assert!(f.display.urgent);

        f.handle_event(WindowEvent::Focus { focused: true, grab: false }, now)
            .unwrap();
        assert!(!f.display.urgent);
    }

    #[test]
    fn test_focus_reporting() {
        let mut f = frontend(10, 3);
        let now = Instant::now();
        f.handle_event(WindowEvent::Focus { focused: false, grab: false }, now)
            .unwrap();
        assert!(f.chan.is_empty());

        f.process_output(b"\x1b[?1004h").unwrap();
        f.handle_event(WindowEvent::Focus { focused: true, grab: false }, now)
            .unwrap();
        // Grab notifications are ignored
        f.handle_event(WindowEvent::Focus { focused: false, grab: true }, now)
            .unwrap();
        assert!(f.window.is_focused());
        f.handle_event(WindowEvent::Focus { focused: false, grab: false }, now)
            .unwrap();
        assert_eq!(f.chan, b"\x1b[I\x1b[O");
    }

    #[test]
    fn test_mouse_reporting_and_shift_override() {
        let mut f = frontend(10, 3);
        f.process_output(b"\x1b[?1000h\x1b[?1006h").unwrap();
        let now = Instant::now();
        let p = pointer(&f, 1, 2, 1, ModState::empty());
        f.handle_event(WindowEvent::ButtonPress(p), now).unwrap();
        assert_eq!(f.chan, b"\x1b[<0;3;2M");

        // Shift selects locally instead
        f.chan.clear();
        let p = pointer(&f, 1, 2, 1, ModState::SHIFT);
        f.handle_event(WindowEvent::ButtonPress(p), now).unwrap();
        assert!(f.chan.is_empty());
        assert_eq!(f.selection.sel.mode(), crate::selection::SelMode::Empty);
    }

    #[test]
    fn test_any_event_mode_subscribes_motion() {
        let mut f = frontend(10, 3);
        f.process_output(b"\x1b[?1003h").unwrap();
        assert!(f.display.pointer_motion);
        f.process_output(b"\x1b[?1003l").unwrap();
        assert!(!f.display.pointer_motion);
    }

    #[test]
    fn test_wheel_sends_scroll_keys() {
        let mut f = frontend(10, 3);
        let now = Instant::now();
        let p = pointer(&f, 4, 0, 0, ModState::empty());
        f.handle_event(WindowEvent::ButtonPress(p), now).unwrap();
        let p = pointer(&f, 5, 0, 0, ModState::empty());
        f.handle_event(WindowEvent::ButtonPress(p), now).unwrap();
        assert_eq!(f.chan, b"\x19\x05");
    }

    #[test]
    fn test_drag_select_then_copy_shortcut() {
        let mut f = frontend(20, 5);
        f.process_output(b"\x1b[4;1Hthe quick brown fox").unwrap();
        let now = Instant::now();
        let none = ModState::empty();

        let p = pointer(&f, 1, 2, 3, none);
        f.handle_event(WindowEvent::ButtonPress(p), now).unwrap();
        let p = pointer(&f, 0, 7, 3, ModState::BUTTON1);
        f.handle_event(WindowEvent::Motion(p), now).unwrap();
        let p = pointer(&f, 1, 7, 3, ModState::BUTTON1);
        f.handle_event(WindowEvent::ButtonRelease(p), now).unwrap();

        assert_eq!(f.selection.buffers.primary.get(), Some(&b"e quic"[..]));
        assert!(f.display.owned.contains(&ATOMS.primary));

        let ctrl_shift = ModState::CONTROL | ModState::SHIFT;
        key(&mut f, keysyms::KEY_C, ctrl_shift);
        assert_eq!(f.selection.buffers.clipboard.get(), Some(&b"e quic"[..]));
        assert!(f.display.owned.contains(&ATOMS.clipboard));
        assert!(f.chan.is_empty());
    }

    #[test]
    fn test_middle_click_pastes_primary() {
        let mut f = frontend(10, 3);
        f.process_output(b"\x1b[?2004h").unwrap();
        let now = Instant::now();
        let p = pointer(&f, 2, 0, 0, ModState::empty());
        f.handle_event(WindowEvent::ButtonRelease(p), now).unwrap();
        assert_eq!(f.display.converts, vec![(ATOMS.primary, ATOMS.text, ATOMS.primary)]);

        f.display.serve(
            ATOMS.primary,
            PropertyChunk {
                type_: ATOMS.text,
                format: 8,
                data: b"echo\n".to_vec(),
                bytes_after: 0,
            },
        );
        f.handle_event(
            WindowEvent::SelectionNotify {
                selection: ATOMS.primary,
                property: Some(ATOMS.primary),
            },
            now,
        )
        .unwrap();
        assert_eq!(f.chan, b"\x1b[200~echo\r\x1b[201~");
    }

    #[test]
    fn test_configure_resizes_grid() {
        let mut f = frontend(10, 3);
        let (cw, ch, b) = (f.window.cw, f.window.ch, f.window.border);
        let now = Instant::now();
        f.handle_event(
            WindowEvent::Configure {
                width: 2 * b + 20 * cw + 3,
                height: 2 * b + 5 * ch,
            },
            now,
        )
        .unwrap();
        assert_eq!((f.term.cols(), f.term.rows()), (20, 5));
        assert_eq!(f.buf.width(), 2 * b + 20 * cw + 3);
    }

    #[test]
    fn test_zoom_refits_grid() {
        let mut f = frontend(20, 4);
        let ctrl_shift = ModState::CONTROL | ModState::SHIFT;
        key(&mut f, keysyms::KEY_Prior, ctrl_shift);
        assert_eq!(f.font.size(), 11.0);
        assert_eq!(f.display.size_hints.map(|h| (h.2, h.3)), Some((2, false)));
        assert!(f.term.cols() < 20);

        key(&mut f, keysyms::KEY_Home, ctrl_shift);
        assert_eq!(f.font.size(), 10.0);
        assert_eq!(f.term.cols(), 20);
    }

    #[test]
    fn test_zoom_keeps_fixed_window_hints() {
        let mut f = frontend(20, 4);
        f.window.fixed = true;
        key(&mut f, keysyms::KEY_Prior, ModState::CONTROL | ModState::SHIFT);
        assert_eq!(f.display.size_hints.map(|h| h.3), Some(true));
    }

    #[test]
    fn test_close_request_stops_loop() {
        let mut f = frontend(10, 3);
        f.display.events.push_back(WindowEvent::CloseRequest);
        f.display.events.push_back(WindowEvent::Expose);
        f.drain_events(Instant::now()).unwrap();
        assert!(!f.is_running());
        // Remaining events stay queued
        assert_eq!(f.display.events.len(), 1);
    }

    #[test]
    fn test_invisible_window_is_not_presented() {
        let mut f = frontend(10, 3);
        let now = Instant::now();
        f.handle_event(WindowEvent::Unmap, now).unwrap();
        f.draw().unwrap();
        assert_eq!(f.display.presents, 0);

        f.handle_event(WindowEvent::Visibility { obscured: false }, now)
            .unwrap();
        f.draw().unwrap();
        assert_eq!(f.display.presents, 1);
    }

    #[test]
    fn test_tick_draws_and_idles() {
        let mut f = frontend(10, 3);
        let t0 = Instant::now();
        f.display.events.push_back(WindowEvent::Expose);

        // Too early for a frame
        let timeout = f.tick(false, true, t0).unwrap();
        assert_eq!(timeout, Some(Duration::from_secs(1) / 120));
        assert_eq!(f.display.presents, 0);

        // Frame due: events drained, drawn; nothing blinks so block
        let timeout = f.tick(false, false, t0 + Duration::from_millis(20)).unwrap();
        assert!(f.display.events.is_empty());
        assert_eq!(f.display.presents, 1);
        assert_eq!(timeout, None);
    }

    #[test]
    fn test_tick_blink_toggles_and_schedules() {
        let mut f = frontend(10, 3);
        let t0 = Instant::now();
        f.process_output(b"\x1b[5mblink").unwrap();
        f.tick(true, false, t0).unwrap();
        assert!(!f.term.mode().contains(TermMode::BLINK));

        let t1 = t0 + Duration::from_millis(501);
        let timeout = f.tick(false, false, t1).unwrap();
        assert!(f.term.mode().contains(TermMode::BLINK));
        assert_eq!(timeout, Some(Duration::from_millis(500)));

        // Blink text gone: phase resets on the next output
        f.process_output(b"\x1b[2J").unwrap();
        f.tick(true, false, t1 + Duration::from_millis(1)).unwrap();
        assert!(!f.term.mode().contains(TermMode::BLINK));
    }

    #[test]
    fn test_stalled_transfer_bounds_timeout() {
        let mut f = frontend(10, 3);
        let t0 = Instant::now();
        f.display.serve(
            ATOMS.clipboard,
            PropertyChunk {
                type_: ATOMS.incr,
                format: 32,
                data: vec![0; 4],
                bytes_after: 0,
            },
        );
        f.handle_event(
            WindowEvent::SelectionNotify {
                selection: ATOMS.clipboard,
                property: Some(ATOMS.clipboard),
            },
            t0,
        )
        .unwrap();
        assert!(f.selection.is_transferring());

        let timeout = f.tick(false, false, t0 + Duration::from_millis(20)).unwrap();
        assert!(timeout.is_some());

        f.tick(false, false, t0 + Duration::from_secs(6)).unwrap();
        assert!(!f.selection.is_transferring());
    }

    #[test]
    fn test_altscreen_disabled_by_config() {
        let mut config = Config::default();
        config.terminal.allow_altscreen = false;
        let font = BoxFont::new();
        let window = WindowState::new(10, 3, font.metrics(), 2);
        let mut f = Frontend::new(
            &config,
            FakeDisplay::new(),
            font,
            Vec::new(),
            Box::new(IdentityKeys),
            window,
        );
        f.process_output(b"\x1b[?1049h").unwrap();
        assert!(!f.term.mode().contains(TermMode::ALTSCREEN));
    }

    #[test]
    fn test_startup_events_handled_without_readiness() {
        let mut f = frontend(10, 3);
        f.display.events.push_back(WindowEvent::CloseRequest);
        // The loop's first wait does not block, so this tick follows at once
        let timeout = f
            .tick(false, false, Instant::now() + Duration::from_secs(1))
            .unwrap();
        assert!(!f.is_running());
        assert_eq!(timeout, None);
    }

    #[test]
    fn test_poll_timeout_rounds_up() {
        assert_eq!(poll_timeout(None), -1);
        assert_eq!(poll_timeout(Some(Duration::ZERO)), 0);
        assert_eq!(poll_timeout(Some(Duration::from_micros(1))), 1);
        assert_eq!(poll_timeout(Some(Duration::from_millis(8))), 8);
    }
}
