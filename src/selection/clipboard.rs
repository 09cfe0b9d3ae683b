//! Committed selection contents
//!
//! The text we serve to other clients: PRIMARY, set when a drag is
//! released, and CLIPBOARD, copied from PRIMARY on request.

use std::fmt;

/// One owned, replaceable buffer
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SelectionBuffer(Option<Vec<u8>>);

impl SelectionBuffer {
    pub fn set(&mut self, bytes: Vec<u8>) {
        self.0 = Some(bytes);
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn get(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for SelectionBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(b) => write!(f, "SelectionBuffer({} bytes)", b.len()),
            None => f.write_str("SelectionBuffer(empty)"),
        }
    }
}

/// Which committed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Primary,
    Clipboard,
}

#[derive(Debug, Clone, Default)]
pub struct Clipboards {
    pub primary: SelectionBuffer,
    pub clipboard: SelectionBuffer,
}

impl Clipboards {
    pub fn get(&self, kind: SelectionKind) -> Option<&[u8]> {
        match kind {
            SelectionKind::Primary => self.primary.get(),
            SelectionKind::Clipboard => self.clipboard.get(),
        }
    }

    /// Duplicate PRIMARY into CLIPBOARD; false when PRIMARY is empty
    pub fn copy_primary(&mut self) -> bool {
        match self.primary.get() {
            Some(bytes) => {
                let bytes = bytes.to_vec();
                self.clipboard.set(bytes);
                true
            }
            None => false,
        }
    }
}
