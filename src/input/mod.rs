//! Input handling
//!
//! - Keycode translation via xkbcommon
//! - Shortcut, key and mouse binding tables
//! - xterm mouse reporting

pub mod bindings;
pub mod keyboard;
pub mod mouse;

pub use bindings::{Action, Bindings, ModMatch, Operation};
pub use keyboard::{KeyTranslator, XkbKeyboard};
pub use mouse::{MouseKind, MouseReporter};
