//! Keyboard input
//!
//! Core-protocol keycodes and modifier state are turned into a keysym and
//! the composed UTF-8 text with xkbcommon. The display server reports the
//! modifier mask with every key event, so the xkb state is fed that mask
//! instead of tracking key presses itself.

use anyhow::{anyhow, Result};
use log::info;
use xkbcommon::xkb;

use crate::config::KeyboardConfig;
use crate::display::ModState;

/// Keycode + modifiers to keysym + text
pub trait KeyTranslator {
    fn translate(&mut self, keycode: u32, state: ModState) -> (u32, String);
}

pub struct XkbKeyboard {
    state: xkb::State,
}

impl XkbKeyboard {
    pub fn new(config: &KeyboardConfig) -> Result<Self> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);

        // Empty names select the system defaults
        let options = if config.xkb_options.is_empty() {
            None
        } else {
            Some(config.xkb_options.clone())
        };
        let keymap = xkb::Keymap::new_from_names(
            &context,
            "",
            &config.xkb_model,
            &config.xkb_layout,
            &config.xkb_variant,
            options.clone(),
            xkb::COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| {
            anyhow!(
                "Failed to create xkb keymap (model={}, layout={}, variant={}, options={:?})",
                config.xkb_model,
                config.xkb_layout,
                config.xkb_variant,
                options
            )
        })?;

        info!(
            "Keyboard initialized (layout={})",
            if config.xkb_layout.is_empty() {
                "default"
            } else {
                &config.xkb_layout
            }
        );

        Ok(Self {
            state: xkb::State::new(&keymap),
        })
    }
}

impl KeyTranslator for XkbKeyboard {
    fn translate(&mut self, keycode: u32, state: ModState) -> (u32, String) {
        // Core modifier bits line up with the standard xkb modifier
        // indices (Shift, Lock, Control, Mod1..Mod5)
        let mods = (state.bits() & 0xff) as xkb::ModMask;
        let locked = mods & (ModState::LOCK | ModState::MOD2).bits() as xkb::ModMask;
        self.state.update_mask(mods & !locked, 0, locked, 0, 0, 0);

        let keycode = xkb::Keycode::new(keycode);
        let sym = self.state.key_get_one_sym(keycode);
        let text = self.state.key_get_utf8(keycode);
        (sym.raw(), text)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Keycode is the keysym; text is the keysym as a char when printable
    pub struct IdentityKeys;

    impl KeyTranslator for IdentityKeys {
        fn translate(&mut self, keycode: u32, state: ModState) -> (u32, String) {
            let text = match char::from_u32(keycode) {
                Some(c) if (' '..='~').contains(&c) => {
                    if state.contains(ModState::CONTROL) && c.is_ascii_alphabetic() {
                        ((c.to_ascii_lowercase() as u8 - b'a' + 1) as char).to_string()
                    } else {
                        c.to_string()
                    }
                }
                _ => String::new(),
            };
            (keycode, text)
        }
    }
}
