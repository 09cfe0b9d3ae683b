//! Window-system seam
//!
//! The closed set of window events the front-end reacts to, and the
//! requests it makes of the display server: selection ownership and
//! property traffic ([`SelectionTransport`]) plus window operations
//! ([`WindowSystem`]). The X11 backend lives in [`x11`].

#[cfg(feature = "x11")]
pub mod x11;

use std::os::fd::BorrowedFd;

use bitflags::bitflags;
use thiserror::Error;

use crate::render::PixelBuffer;

/// Server-side atom handle
pub type Atom = u32;

/// Timestamp meaning "now" in ownership requests
pub const CURRENT_TIME: u32 = 0;

bitflags! {
    /// Core protocol key/button state mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModState: u16 {
        const SHIFT   = 1 << 0;
        const LOCK    = 1 << 1;
        const CONTROL = 1 << 2;
        const MOD1    = 1 << 3;
        const MOD2    = 1 << 4;
        const MOD3    = 1 << 5;
        const MOD4    = 1 << 6;
        const MOD5    = 1 << 7;
        const BUTTON1 = 1 << 8;
        const BUTTON2 = 1 << 9;
        const BUTTON3 = 1 << 10;
        const BUTTON4 = 1 << 11;
        const BUTTON5 = 1 << 12;

        const BUTTONS = Self::BUTTON1.bits()
            | Self::BUTTON2.bits()
            | Self::BUTTON3.bits()
            | Self::BUTTON4.bits()
            | Self::BUTTON5.bits();
    }
}

/// Another client's request for one of our selections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRequest {
    pub requestor: u32,
    pub selection: Atom,
    pub target: Atom,
    /// `None` from obsolete clients; the target is used instead
    pub property: Option<Atom>,
    pub time: u32,
}

/// Pointer event payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointer {
    /// 1 = left, 2 = middle, 3 = right, 4/5 = wheel
    pub button: u8,
    pub x: i32,
    pub y: i32,
    pub state: ModState,
    pub time: u32,
}

/// Requested window offsets; a negative offset counts from the right or
/// bottom screen edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPosition {
    pub x: i32,
    pub y: i32,
    pub from_right: bool,
    pub from_bottom: bool,
}

/// Window-system events, one case per kind the front-end handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    /// Contents lost; repaint everything
    Expose,
    Visibility { obscured: bool },
    Map,
    Unmap,
    Key { keycode: u32, state: ModState },
    /// WM_DELETE_WINDOW
    CloseRequest,
    /// XEMBED focus in (true) / out (false)
    EmbedFocus(bool),
    Configure { width: u32, height: u32 },
    /// `grab` marks notifications caused by keyboard grabs
    Focus { focused: bool, grab: bool },
    Motion(Pointer),
    ButtonPress(Pointer),
    ButtonRelease(Pointer),
    /// Conversion finished; `None` means the owner refused
    SelectionNotify { selection: Atom, property: Option<Atom> },
    PropertyNotify { atom: Atom, new_value: bool },
    SelectionRequest(SelectionRequest),
    SelectionClear { selection: Atom },
}

/// Atoms the selection protocol needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionAtoms {
    pub primary: Atom,
    pub clipboard: Atom,
    pub targets: Atom,
    pub incr: Atom,
    /// Negotiated text format (UTF8_STRING, or STRING when unsupported)
    pub text: Atom,
    /// Legacy STRING
    pub string: Atom,
    /// ATOM, type of a TARGETS reply
    pub atom: Atom,
}

/// One read of a window property
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyChunk {
    /// Type tag, e.g. the INCR atom or the text format
    pub type_: Atom,
    pub format: u8,
    pub data: Vec<u8>,
    /// Bytes remaining past this chunk
    pub bytes_after: u32,
}

/// Payload written into a requestor's property
#[derive(Debug, Clone, Copy)]
pub enum PropertyData<'a> {
    /// Format 32 atom list
    Atoms(&'a [Atom]),
    /// Format 8 bytes
    Bytes(&'a [u8]),
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display connection failed: {0}")]
    Connect(String),
    #[error("display connection lost: {0}")]
    Connection(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("property {property} too large for one request ({len} bytes)")]
    PropertyTooLarge { property: Atom, len: usize },
}

/// Selection ownership and property traffic
pub trait SelectionTransport {
    fn atoms(&self) -> SelectionAtoms;

    /// Claim a selection
    fn set_selection_owner(&mut self, selection: Atom, time: u32) -> Result<(), DisplayError>;

    /// Whether we currently own a selection
    fn selection_owned(&mut self, selection: Atom) -> Result<bool, DisplayError>;

    /// Ask the owner to convert `selection` to `target` into our `property`
    fn convert_selection(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: u32,
    ) -> Result<(), DisplayError>;

    /// Read `length` 32-bit units of our `property` starting at `offset` units
    fn read_property(
        &mut self,
        property: Atom,
        offset: u32,
        length: u32,
    ) -> Result<PropertyChunk, DisplayError>;

    fn delete_property(&mut self, property: Atom) -> Result<(), DisplayError>;

    /// Subscribe to (or stop) property change notifications on our window
    fn watch_property_changes(&mut self, enable: bool) -> Result<(), DisplayError>;

    /// Replace `property` on another client's window
    fn write_property(
        &mut self,
        window: u32,
        property: Atom,
        type_: Atom,
        data: PropertyData<'_>,
    ) -> Result<(), DisplayError>;

    /// Tell a requestor its conversion finished; `None` means refused
    fn notify_selection(
        &mut self,
        request: &SelectionRequest,
        property: Option<Atom>,
    ) -> Result<(), DisplayError>;
}

/// Window operations used by the scheduler
pub trait WindowSystem: SelectionTransport {
    fn window_id(&self) -> u32;

    /// WM_NAME and _NET_WM_NAME
    fn set_title(&mut self, title: &str) -> Result<(), DisplayError>;

    fn set_urgency(&mut self, urgent: bool) -> Result<(), DisplayError>;

    fn bell(&mut self) -> Result<(), DisplayError>;

    /// Receive motion without a button held (any-event mouse mode)
    fn set_pointer_motion(&mut self, enable: bool) -> Result<(), DisplayError>;

    /// Size hints: base size from the border, increments of one cell.
    /// A fixed window pins both the minimum and maximum to its current size
    fn set_size_hints(
        &mut self,
        cell_width: u32,
        cell_height: u32,
        border: u32,
        fixed: bool,
    ) -> Result<(), DisplayError>;

    /// Copy the damaged part of the back buffer onto the window
    fn present(&mut self, buffer: &mut PixelBuffer) -> Result<(), DisplayError>;

    fn flush(&mut self) -> Result<(), DisplayError>;

    /// Next queued event without blocking
    fn poll_event(&mut self) -> Result<Option<WindowEvent>, DisplayError>;

    /// Connection descriptor for the scheduler's wait
    fn fd(&self) -> BorrowedFd<'_>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording display used by selection and scheduler tests

    use std::collections::{HashMap, VecDeque};

    use super::*;

    /// A property write seen by the fake server
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Written {
        pub window: u32,
        pub property: Atom,
        pub type_: Atom,
        pub atoms: Vec<Atom>,
        pub bytes: Vec<u8>,
    }

    pub const WINDOW: u32 = 0x40_0001;

    pub const ATOMS: SelectionAtoms = SelectionAtoms {
        primary: 1,
        clipboard: 100,
        targets: 101,
        incr: 102,
        text: 103,
        string: 31,
        atom: 4,
    };

    #[derive(Default)]
    pub struct FakeDisplay {
        pub owned: Vec<Atom>,
        /// Ownership claims that fail
        pub lose_ownership: bool,
        pub converts: Vec<(Atom, Atom, Atom)>,
        /// Values served per property, consumed front to back
        pub properties: HashMap<Atom, VecDeque<PropertyChunk>>,
        pub deleted: Vec<Atom>,
        pub watching: bool,
        pub written: Vec<Written>,
        pub notified: Vec<(SelectionRequest, Option<Atom>)>,
        pub fail_reads: bool,
        pub titles: Vec<String>,
        pub urgent: bool,
        pub bells: usize,
        pub pointer_motion: bool,
        pub size_hints: Option<(u32, u32, u32, bool)>,
        pub presents: usize,
        pub events: VecDeque<WindowEvent>,
    }

    impl FakeDisplay {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue what the next reads of `property` return
        pub fn serve(&mut self, property: Atom, chunk: PropertyChunk) {
            self.properties.entry(property).or_default().push_back(chunk);
        }
    }

    impl SelectionTransport for FakeDisplay {
        fn atoms(&self) -> SelectionAtoms {
            ATOMS
        }

        fn set_selection_owner(&mut self, selection: Atom, _time: u32) -> Result<(), DisplayError> {
            if !self.lose_ownership && !self.owned.contains(&selection) {
                self.owned.push(selection);
            }
            Ok(())
        }

        fn selection_owned(&mut self, selection: Atom) -> Result<bool, DisplayError> {
            Ok(self.owned.contains(&selection))
        }

        fn convert_selection(
            &mut self,
            selection: Atom,
            target: Atom,
            property: Atom,
            _time: u32,
        ) -> Result<(), DisplayError> {
            self.converts.push((selection, target, property));
            Ok(())
        }

        fn read_property(
            &mut self,
            property: Atom,
            _offset: u32,
            _length: u32,
        ) -> Result<PropertyChunk, DisplayError> {
            if self.fail_reads {
                return Err(DisplayError::Request("BadWindow".into()));
            }
            Ok(self
                .properties
                .get_mut(&property)
                .and_then(|q| q.pop_front())
                .unwrap_or_default())
        }

        fn delete_property(&mut self, property: Atom) -> Result<(), DisplayError> {
            self.deleted.push(property);
            Ok(())
        }

        fn watch_property_changes(&mut self, enable: bool) -> Result<(), DisplayError> {
            self.watching = enable;
            Ok(())
        }

        fn write_property(
            &mut self,
            window: u32,
            property: Atom,
            type_: Atom,
            data: PropertyData<'_>,
        ) -> Result<(), DisplayError> {
            let (atoms, bytes) = match data {
                PropertyData::Atoms(a) => (a.to_vec(), Vec::new()),
                PropertyData::Bytes(b) => (Vec::new(), b.to_vec()),
            };
            self.written.push(Written {
                window,
                property,
                type_,
                atoms,
                bytes,
            });
            Ok(())
        }

        fn notify_selection(
            &mut self,
            request: &SelectionRequest,
            property: Option<Atom>,
        ) -> Result<(), DisplayError> {
            self.notified.push((*request, property));
            Ok(())
        }
    }

    impl WindowSystem for FakeDisplay {
        fn window_id(&self) -> u32 {
            WINDOW
        }

        fn set_title(&mut self, title: &str) -> Result<(), DisplayError> {
            self.titles.push(title.to_string());
            Ok(())
        }

        fn set_urgency(&mut self, urgent: bool) -> Result<(), DisplayError> {
            self.urgent = urgent;
            Ok(())
        }

        fn bell(&mut self) -> Result<(), DisplayError> {
            self.bells += 1;
            Ok(())
        }

        fn set_pointer_motion(&mut self, enable: bool) -> Result<(), DisplayError> {
            self.pointer_motion = enable;
            Ok(())
        }

        fn set_size_hints(
            &mut self,
            cw: u32,
            ch: u32,
            border: u32,
            fixed: bool,
        ) -> Result<(), DisplayError> {
            self.size_hints = Some((cw, ch, border, fixed));
            Ok(())
        }

        fn present(&mut self, buffer: &mut PixelBuffer) -> Result<(), DisplayError> {
            buffer.take_damage();
            self.presents += 1;
            Ok(())
        }

        fn flush(&mut self) -> Result<(), DisplayError> {
            Ok(())
        }

        fn poll_event(&mut self) -> Result<Option<WindowEvent>, DisplayError> {
            Ok(self.events.pop_front())
        }

        fn fd(&self) -> BorrowedFd<'_> {
            // Never polled; any open descriptor will do
            // SAFETY: fd 0 (stdin) stays open for the life of the process
            unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) }
        }
    }
}
