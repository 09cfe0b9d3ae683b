//! X11 backend on x11rb
//!
//! One top-level (or XEMBED child) window, a GC for uploading the back
//! buffer with PutImage, and the selection/property requests the
//! clipboard engine needs.

use std::collections::VecDeque;
use std::os::fd::{AsFd, BorrowedFd};

use log::{debug, info, trace, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::properties::{WmHints, WmSizeHints, WmSizeHintsSpecification};
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, CreateGCAux, CreateWindowAux,
    EventMask, Gravity, ImageFormat, ImageOrder, KeyButMask, NotifyMode, PropMode,
    Property, SelectionNotifyEvent, Visibility, Window, WindowClass, SELECTION_NOTIFY_EVENT,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::NONE;

use super::{
    Atom, DisplayError, ModState, Pointer, PropertyChunk, PropertyData, SelectionAtoms,
    SelectionRequest, SelectionTransport, WindowEvent, WindowPosition, WindowSystem,
};
use crate::render::{PixelBuffer, Rect};

x11rb::atom_manager! {
    /// Atoms interned once at connect time
    pub Atoms: AtomsCookie {
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        _NET_WM_NAME,
        _NET_WM_PID,
        _XEMBED,
        UTF8_STRING,
        CLIPBOARD,
        TARGETS,
        INCR,
    }
}

/// XEMBED message codes carried in data[1]
const XEMBED_FOCUS_IN: u32 = 4;
const XEMBED_FOCUS_OUT: u32 = 5;

/// Fixed part of a PutImage request
const PUT_IMAGE_HEADER: usize = 24;

impl From<ConnectionError> for DisplayError {
    fn from(e: ConnectionError) -> Self {
        DisplayError::Connection(e.to_string())
    }
}

impl From<ReplyError> for DisplayError {
    fn from(e: ReplyError) -> Self {
        match e {
            ReplyError::ConnectionError(e) => e.into(),
            ReplyError::X11Error(e) => DisplayError::Request(format!("{:?}", e.error_kind)),
        }
    }
}

impl From<ReplyOrIdError> for DisplayError {
    fn from(e: ReplyOrIdError) -> Self {
        match e {
            ReplyOrIdError::ConnectionError(e) => e.into(),
            ReplyOrIdError::X11Error(e) => DisplayError::Request(format!("{:?}", e.error_kind)),
            ReplyOrIdError::IdsExhausted => DisplayError::Request("resource ids exhausted".into()),
        }
    }
}

/// How to create the window
#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub title: String,
    /// WM_CLASS instance and class
    pub instance: String,
    pub class: String,
    pub width: u32,
    pub height: u32,
    /// User-requested position
    pub position: Option<WindowPosition>,
    /// Embed into this window instead of the root
    pub parent: Option<u32>,
}

impl WindowPosition {
    /// Top-left corner of a `width` x `height` window on the screen
    fn resolve(&self, screen_width: u32, screen_height: u32, width: u32, height: u32) -> (i32, i32) {
        let x = if self.from_right {
            screen_width as i32 - width as i32 + self.x
        } else {
            self.x
        };
        let y = if self.from_bottom {
            screen_height as i32 - height as i32 + self.y
        } else {
            self.y
        };
        (x, y)
    }

    /// The corner the window manager keeps fixed
    fn gravity(&self) -> Gravity {
        match (self.from_right, self.from_bottom) {
            (true, true) => Gravity::SOUTH_EAST,
            (true, false) => Gravity::NORTH_EAST,
            (false, true) => Gravity::SOUTH_WEST,
            (false, false) => Gravity::NORTH_WEST,
        }
    }
}

pub struct X11Display {
    conn: RustConnection,
    atoms: Atoms,
    window: Window,
    gc: u32,
    depth: u8,
    lsb_first: bool,
    width: u32,
    height: u32,
    position: Option<(i32, i32)>,
    gravity: Gravity,
    pointer_motion: bool,
    watching: bool,
    /// Events read while waiting for the map
    pending: VecDeque<WindowEvent>,
}

impl X11Display {
    /// Connect to `$DISPLAY`, create and map the window, and wait until
    /// the server reports it mapped
    pub fn open(opts: &WindowOptions) -> Result<Self, DisplayError> {
        let (conn, screen_num) =
            x11rb::connect(None).map_err(|e| DisplayError::Connect(e.to_string()))?;
        let screen = &conn.setup().roots[screen_num];
        let depth = screen.root_depth;
        let bpp = conn
            .setup()
            .pixmap_formats
            .iter()
            .find(|f| f.depth == depth)
            .map(|f| f.bits_per_pixel);
        if depth < 24 || bpp != Some(32) {
            return Err(DisplayError::Connect(format!(
                "unsupported visual: depth {} at {:?} bits per pixel",
                depth, bpp
            )));
        }
        let lsb_first = conn.setup().image_byte_order == ImageOrder::LSB_FIRST;
        let root = screen.root;
        let root_visual = screen.root_visual;
        let black = screen.black_pixel;
        info!(
            "X11 connected: screen {}, depth {}, {}",
            screen_num,
            depth,
            if lsb_first { "LSB" } else { "MSB" }
        );

        let atoms = Atoms::new(&conn)?.reply()?;

        let window = conn.generate_id()?;
        let parent = opts.parent.unwrap_or(root);
        let position = opts.position.map(|p| {
            p.resolve(
                screen.width_in_pixels as u32,
                screen.height_in_pixels as u32,
                opts.width,
                opts.height,
            )
        });
        let gravity = opts.position.map_or(Gravity::NORTH_WEST, |p| p.gravity());
        let (x, y) = position.unwrap_or((0, 0));
        conn.create_window(
            depth,
            window,
            parent,
            x as i16,
            y as i16,
            opts.width as u16,
            opts.height as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            root_visual,
            &CreateWindowAux::new()
                .background_pixel(black)
                .bit_gravity(Gravity::NORTH_WEST)
                .event_mask(event_mask(false, false)),
        )?;

        let gc = conn.generate_id()?;
        conn.create_gc(gc, window, &CreateGCAux::new().graphics_exposures(0))?;

        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.WM_PROTOCOLS,
            AtomEnum::ATOM,
            &[atoms.WM_DELETE_WINDOW],
        )?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms._NET_WM_PID,
            AtomEnum::CARDINAL,
            &[std::process::id()],
        )?;
        let wm_class = format!("{}\0{}\0", opts.instance, opts.class);
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            wm_class.as_bytes(),
        )?;

        let mut display = Self {
            conn,
            atoms,
            window,
            gc,
            depth,
            lsb_first,
            width: opts.width,
            height: opts.height,
            position,
            gravity,
            pointer_motion: false,
            watching: false,
            pending: VecDeque::new(),
        };
        display.set_title(&opts.title)?;
        display.set_urgency(false)?;

        display.conn.map_window(window)?;
        display.conn.flush()?;
        display.wait_mapped()?;
        debug!("Window 0x{:x} mapped at {}x{}", window, display.width, display.height);
        Ok(display)
    }

    /// Current window size as last reported by the server
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Block until MapNotify, keeping everything else for the event queue
    fn wait_mapped(&mut self) -> Result<(), DisplayError> {
        loop {
            let event = self.conn.wait_for_event()?;
            let mapped = matches!(event, Event::MapNotify(_));
            if let Some(ev) = self.translate(event) {
                self.pending.push_back(ev);
            }
            if mapped {
                return Ok(());
            }
        }
    }

    fn update_event_mask(&mut self) -> Result<(), DisplayError> {
        let mask = event_mask(self.pointer_motion, self.watching);
        self.conn.change_window_attributes(
            self.window,
            &ChangeWindowAttributesAux::new().event_mask(mask),
        )?;
        Ok(())
    }

    fn translate(&mut self, event: Event) -> Option<WindowEvent> {
        let ev = match event {
            Event::Expose(e) if e.count == 0 => WindowEvent::Expose,
            Event::Expose(_) => return None,
            Event::VisibilityNotify(e) => WindowEvent::Visibility {
                obscured: e.state == Visibility::FULLY_OBSCURED,
            },
            Event::MapNotify(_) => WindowEvent::Map,
            Event::UnmapNotify(_) => WindowEvent::Unmap,
            Event::KeyPress(e) => WindowEvent::Key {
                keycode: e.detail as u32,
                state: mod_state(e.state),
            },
            Event::ClientMessage(e) => {
                let data = e.data.as_data32();
                if e.type_ == self.atoms._XEMBED && e.format == 32 {
                    match data[1] {
                        XEMBED_FOCUS_IN => WindowEvent::EmbedFocus(true),
                        XEMBED_FOCUS_OUT => WindowEvent::EmbedFocus(false),
                        _ => return None,
                    }
                } else if e.type_ == self.atoms.WM_PROTOCOLS
                    && e.format == 32
                    && data[0] == self.atoms.WM_DELETE_WINDOW
                {
                    WindowEvent::CloseRequest
                } else {
                    return None;
                }
            }
            Event::ConfigureNotify(e) => {
                self.width = e.width as u32;
                self.height = e.height as u32;
                WindowEvent::Configure {
                    width: self.width,
                    height: self.height,
                }
            }
            Event::FocusIn(e) => WindowEvent::Focus {
                focused: true,
                grab: e.mode == NotifyMode::GRAB,
            },
            Event::FocusOut(e) => WindowEvent::Focus {
                focused: false,
                grab: e.mode == NotifyMode::GRAB,
            },
            Event::MotionNotify(e) => WindowEvent::Motion(Pointer {
                button: 0,
                x: e.event_x as i32,
                y: e.event_y as i32,
                state: mod_state(e.state),
                time: e.time,
            }),
            Event::ButtonPress(e) => WindowEvent::ButtonPress(Pointer {
                button: e.detail,
                x: e.event_x as i32,
                y: e.event_y as i32,
                state: mod_state(e.state),
                time: e.time,
            }),
            Event::ButtonRelease(e) => WindowEvent::ButtonRelease(Pointer {
                button: e.detail,
                x: e.event_x as i32,
                y: e.event_y as i32,
                state: mod_state(e.state),
                time: e.time,
            }),
            Event::SelectionNotify(e) => WindowEvent::SelectionNotify {
                selection: e.selection,
                property: (e.property != NONE).then_some(e.property),
            },
            Event::PropertyNotify(e) => WindowEvent::PropertyNotify {
                atom: e.atom,
                new_value: e.state == Property::NEW_VALUE,
            },
            Event::SelectionRequest(e) => WindowEvent::SelectionRequest(SelectionRequest {
                requestor: e.requestor,
                selection: e.selection,
                target: e.target,
                property: (e.property != NONE).then_some(e.property),
                time: e.time,
            }),
            Event::SelectionClear(e) => WindowEvent::SelectionClear {
                selection: e.selection,
            },
            Event::Error(e) => {
                warn!("X11 error: {:?} (sequence {})", e.error_kind, e.sequence);
                return None;
            }
            other => {
                trace!("Unhandled X11 event: {:?}", other);
                return None;
            }
        };
        Some(ev)
    }
}

/// Events we always listen for, plus the optional subscriptions
fn event_mask(pointer_motion: bool, watching: bool) -> EventMask {
    let mut mask = EventMask::FOCUS_CHANGE
        | EventMask::KEY_PRESS
        | EventMask::KEY_RELEASE
        | EventMask::EXPOSURE
        | EventMask::VISIBILITY_CHANGE
        | EventMask::STRUCTURE_NOTIFY
        | EventMask::BUTTON_MOTION
        | EventMask::BUTTON_PRESS
        | EventMask::BUTTON_RELEASE;
    if pointer_motion {
        mask |= EventMask::POINTER_MOTION;
    }
    if watching {
        mask |= EventMask::PROPERTY_CHANGE;
    }
    mask
}

fn mod_state(state: KeyButMask) -> ModState {
    ModState::from_bits_truncate(u16::from(state))
}

/// Rows of `width` pixels that fit one PutImage request
fn rows_per_request(max_request_bytes: usize, width: u32) -> u32 {
    let stride = (width as usize * 4).max(1);
    (max_request_bytes.saturating_sub(PUT_IMAGE_HEADER) / stride).max(1) as u32
}

/// Z-pixmap bytes for `rect` of the buffer in the server's byte order
fn pack_strip(buffer: &PixelBuffer, rect: Rect, lsb_first: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(rect.w as usize * rect.h as usize * 4);
    let pixels = buffer.pixels();
    for y in rect.y as u32..rect.y as u32 + rect.h {
        let start = (y * buffer.width()) as usize + rect.x as usize;
        for &px in &pixels[start..start + rect.w as usize] {
            if lsb_first {
                data.extend_from_slice(&px.to_le_bytes());
            } else {
                data.extend_from_slice(&px.to_be_bytes());
            }
        }
    }
    data
}

impl SelectionTransport for X11Display {
    fn atoms(&self) -> SelectionAtoms {
        SelectionAtoms {
            primary: AtomEnum::PRIMARY.into(),
            clipboard: self.atoms.CLIPBOARD,
            targets: self.atoms.TARGETS,
            incr: self.atoms.INCR,
            text: self.atoms.UTF8_STRING,
            string: AtomEnum::STRING.into(),
            atom: AtomEnum::ATOM.into(),
        }
    }

    fn set_selection_owner(&mut self, selection: Atom, time: u32) -> Result<(), DisplayError> {
        self.conn.set_selection_owner(self.window, selection, time)?;
        Ok(())
    }

    fn selection_owned(&mut self, selection: Atom) -> Result<bool, DisplayError> {
        let owner = self.conn.get_selection_owner(selection)?.reply()?.owner;
        Ok(owner == self.window)
    }

    fn convert_selection(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: u32,
    ) -> Result<(), DisplayError> {
        self.conn
            .convert_selection(self.window, selection, target, property, time)?;
        Ok(())
    }

    fn read_property(
        &mut self,
        property: Atom,
        offset: u32,
        length: u32,
    ) -> Result<PropertyChunk, DisplayError> {
        let reply = self
            .conn
            .get_property(false, self.window, property, AtomEnum::ANY, offset, length)?
            .reply()?;
        Ok(PropertyChunk {
            type_: reply.type_,
            format: reply.format,
            data: reply.value,
            bytes_after: reply.bytes_after,
        })
    }

    fn delete_property(&mut self, property: Atom) -> Result<(), DisplayError> {
        self.conn.delete_property(self.window, property)?;
        Ok(())
    }

    fn watch_property_changes(&mut self, enable: bool) -> Result<(), DisplayError> {
        if self.watching != enable {
            self.watching = enable;
            self.update_event_mask()?;
        }
        Ok(())
    }

    fn write_property(
        &mut self,
        window: u32,
        property: Atom,
        type_: Atom,
        data: PropertyData<'_>,
    ) -> Result<(), DisplayError> {
        let limit = self.conn.maximum_request_bytes().saturating_sub(PUT_IMAGE_HEADER);
        match data {
            PropertyData::Atoms(atoms) => {
                self.conn
                    .change_property32(PropMode::REPLACE, window, property, type_, atoms)?;
            }
            PropertyData::Bytes(bytes) if bytes.len() > limit => {
                return Err(DisplayError::PropertyTooLarge {
                    property,
                    len: bytes.len(),
                });
            }
            PropertyData::Bytes(bytes) => {
                self.conn
                    .change_property8(PropMode::REPLACE, window, property, type_, bytes)?;
            }
        }
        Ok(())
    }

    fn notify_selection(
        &mut self,
        request: &SelectionRequest,
        property: Option<Atom>,
    ) -> Result<(), DisplayError> {
        let event = SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time: request.time,
            requestor: request.requestor,
            selection: request.selection,
            target: request.target,
            property: property.unwrap_or(NONE),
        };
        self.conn
            .send_event(true, request.requestor, EventMask::NO_EVENT, event)?;
        Ok(())
    }
}

impl WindowSystem for X11Display {
    fn window_id(&self) -> u32 {
        self.window
    }

    fn set_title(&mut self, title: &str) -> Result<(), DisplayError> {
        let utf8 = self.atoms.UTF8_STRING;
        self.conn.change_property8(
            PropMode::REPLACE,
            self.window,
            AtomEnum::WM_NAME,
            utf8,
            title.as_bytes(),
        )?;
        self.conn.change_property8(
            PropMode::REPLACE,
            self.window,
            self.atoms._NET_WM_NAME,
            utf8,
            title.as_bytes(),
        )?;
        Ok(())
    }

    fn set_urgency(&mut self, urgent: bool) -> Result<(), DisplayError> {
        let mut hints = WmHints::new();
        hints.input = Some(true);
        hints.urgent = urgent;
        hints.set(&self.conn, self.window)?;
        Ok(())
    }

    fn bell(&mut self) -> Result<(), DisplayError> {
        self.conn.bell(0)?;
        Ok(())
    }

    fn set_pointer_motion(&mut self, enable: bool) -> Result<(), DisplayError> {
        if self.pointer_motion != enable {
            self.pointer_motion = enable;
            self.update_event_mask()?;
        }
        Ok(())
    }

    fn set_size_hints(
        &mut self,
        cell_width: u32,
        cell_height: u32,
        border: u32,
        fixed: bool,
    ) -> Result<(), DisplayError> {
        let hints = size_hints(
            (self.width, self.height),
            self.position,
            self.gravity,
            (cell_width, cell_height),
            border,
            fixed,
        );
        hints.set_normal_hints(&self.conn, self.window)?;
        Ok(())
    }

    fn present(&mut self, buffer: &mut PixelBuffer) -> Result<(), DisplayError> {
        let bounds = Rect::new(0, 0, buffer.width(), buffer.height());
        let damage = buffer.take_damage().intersect(&bounds);
        if damage.is_empty() {
            return Ok(());
        }
        let rows = rows_per_request(self.conn.maximum_request_bytes(), damage.w);
        let bottom = damage.y as u32 + damage.h;
        let mut y = damage.y as u32;
        while y < bottom {
            let h = rows.min(bottom - y);
            let strip = Rect::new(damage.x, y as i32, damage.w, h);
            let data = pack_strip(buffer, strip, self.lsb_first);
            self.conn.put_image(
                ImageFormat::Z_PIXMAP,
                self.window,
                self.gc,
                damage.w as u16,
                h as u16,
                damage.x as i16,
                y as i16,
                0,
                self.depth,
                &data,
            )?;
            y += h;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        self.conn.flush()?;
        Ok(())
    }

    fn poll_event(&mut self) -> Result<Option<WindowEvent>, DisplayError> {
        if let Some(ev) = self.pending.pop_front() {
            return Ok(Some(ev));
        }
        while let Some(event) = self.conn.poll_for_event()? {
            if let Some(ev) = self.translate(event) {
                return Ok(Some(ev));
            }
        }
        Ok(None)
    }

    fn fd(&self) -> BorrowedFd<'_> {
        self.conn.stream().as_fd()
    }
}

/// WM_NORMAL_HINTS for a window of `size` with cells of `cell`
fn size_hints(
    size: (u32, u32),
    position: Option<(i32, i32)>,
    gravity: Gravity,
    cell: (u32, u32),
    border: u32,
    fixed: bool,
) -> WmSizeHints {
    let base = 2 * border as i32;
    let (width, height) = (size.0 as i32, size.1 as i32);
    let mut hints = WmSizeHints::new();
    hints.size = Some((WmSizeHintsSpecification::ProgramSpecified, width, height));
    hints.position = position.map(|(x, y)| (WmSizeHintsSpecification::UserSpecified, x, y));
    hints.base_size = Some((base, base));
    hints.size_increment = Some((cell.0 as i32, cell.1 as i32));
    hints.win_gravity = Some(gravity);
    if fixed {
        hints.min_size = Some((width, height));
        hints.max_size = Some((width, height));
    } else {
        hints.min_size = Some((base + cell.0 as i32, base + cell.1 as i32));
    }
    hints
}
