//! Key and mouse binding tables
//!
//! Each table is an ordered list of entries; the first entry whose
//! predicate matches wins. Lookup for a key press goes shortcuts (invoke
//! an operation), then the key table (send a sequence), then the
//! composed text.

use log::warn;
use xkbcommon::xkb::{self, keysyms};

use crate::config::{KeybindConfig, ParsedKeybind};
use crate::display::ModState;
use crate::terminal::grid::TermMode;

/// Named front-end operations reachable from shortcuts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ClipCopy,
    ClipPaste,
    SelPaste,
    ZoomIn,
    ZoomOut,
    ZoomReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Bytes for the child
    Send(Vec<u8>),
    Invoke(Operation),
}

/// Modifier predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModMatch {
    Any,
    Exact(ModState),
}

/// Modifiers that never take part in matching
const IGNORED_MODS: ModState = ModState::LOCK
    .union(ModState::MOD2)
    .union(ModState::BUTTONS);

impl ModMatch {
    pub fn matches(self, state: ModState) -> bool {
        match self {
            ModMatch::Any => true,
            ModMatch::Exact(mods) => mods == state.difference(IGNORED_MODS),
        }
    }
}

/// Requirement on a terminal mode flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeReq {
    #[default]
    Any,
    On,
    Off,
}

impl ModeReq {
    fn allows(self, set: bool) -> bool {
        match self {
            ModeReq::Any => true,
            ModeReq::On => set,
            ModeReq::Off => !set,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub keysym: u32,
    pub mods: ModMatch,
    /// Application keypad mode requirement
    pub appkey: ModeReq,
    /// Application cursor mode requirement
    pub appcursor: ModeReq,
    pub action: Action,
}

impl KeyBinding {
    pub fn send(keysym: u32, mods: ModMatch, seq: impl Into<Vec<u8>>) -> Self {
        Self {
            keysym,
            mods,
            appkey: ModeReq::Any,
            appcursor: ModeReq::Any,
            action: Action::Send(seq.into()),
        }
    }

    pub fn invoke(keysym: u32, mods: ModState, op: Operation) -> Self {
        Self {
            keysym: fold_case(keysym),
            mods: ModMatch::Exact(mods),
            appkey: ModeReq::Any,
            appcursor: ModeReq::Any,
            action: Action::Invoke(op),
        }
    }

    pub fn appkey(mut self, req: ModeReq) -> Self {
        self.appkey = req;
        self
    }

    pub fn appcursor(mut self, req: ModeReq) -> Self {
        self.appcursor = req;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouseBinding {
    pub button: u8,
    pub mods: ModMatch,
    pub action: Action,
}

#[derive(Debug, Clone)]
pub struct Bindings {
    shortcuts: Vec<KeyBinding>,
    keys: Vec<KeyBinding>,
    mouse: Vec<MouseBinding>,
}

impl Bindings {
    pub fn new(shortcuts: Vec<KeyBinding>, keys: Vec<KeyBinding>, mouse: Vec<MouseBinding>) -> Self {
        Self {
            shortcuts,
            keys,
            mouse,
        }
    }

    pub fn from_config(config: &KeybindConfig) -> Self {
        let groups = [
            (&config.copy, Operation::ClipCopy),
            (&config.paste, Operation::ClipPaste),
            (&config.paste_selection, Operation::SelPaste),
            (&config.font_increase, Operation::ZoomIn),
            (&config.font_decrease, Operation::ZoomOut),
            (&config.font_reset, Operation::ZoomReset),
        ];
        let shortcuts = groups
            .iter()
            .flat_map(|(keys, op)| keys.iter().filter_map(move |k| shortcut(k, *op)))
            .collect();
        Self::new(shortcuts, default_keys(), default_mouse())
    }

    /// Resolve a key press to an action
    pub fn key_action(
        &self,
        keysym: u32,
        text: &str,
        state: ModState,
        mode: TermMode,
    ) -> Option<Action> {
        let folded = fold_case(keysym);
        if let Some(b) = self
            .shortcuts
            .iter()
            .find(|b| b.keysym == folded && b.mods.matches(state))
        {
            return Some(b.action.clone());
        }

        let appkey = mode.contains(TermMode::APPKEYPAD);
        let appcursor = mode.contains(TermMode::APPCURSOR);
        if let Some(b) = self.keys.iter().find(|b| {
            b.keysym == keysym
                && b.mods.matches(state)
                && b.appkey.allows(appkey)
                && b.appcursor.allows(appcursor)
        }) {
            return Some(b.action.clone());
        }

        if text.is_empty() {
            return None;
        }
        let mut bytes = Vec::with_capacity(text.len() + 1);
        // Meta sends ESC prefix
        if text.len() == 1 && state.contains(ModState::MOD1) {
            bytes.push(0x1b);
        }
        bytes.extend_from_slice(text.as_bytes());
        Some(Action::Send(bytes))
    }

    /// Mouse shortcut for a button press
    pub fn mouse_action(&self, button: u8, state: ModState) -> Option<Action> {
        self.mouse
            .iter()
            .find(|b| b.button == button && b.mods.matches(state))
            .map(|b| b.action.clone())
    }
}

/// xterm modifier parameter: 1 + shift + 2*alt + 4*ctrl
fn modifier_code(mods: ModState) -> u8 {
    let mut code = 1u8;
    if mods.contains(ModState::SHIFT) {
        code += 1;
    }
    if mods.contains(ModState::MOD1) {
        code += 2;
    }
    if mods.contains(ModState::CONTROL) {
        code += 4;
    }
    code
}

/// Every non-empty combination of shift, alt and control
fn modifier_combos() -> impl Iterator<Item = ModState> {
    (1u8..8).map(|bits| {
        let mut mods = ModState::empty();
        mods.set(ModState::SHIFT, bits & 1 != 0);
        mods.set(ModState::MOD1, bits & 2 != 0);
        mods.set(ModState::CONTROL, bits & 4 != 0);
        mods
    })
}

/// Function-key sequences
pub fn default_keys() -> Vec<KeyBinding> {
    use xkbcommon::xkb::keysyms::*;
    let mut keys = Vec::new();

    // Application keypad
    let keypad = [
        (KEY_KP_Enter, "\x1bOM"),
        (KEY_KP_Multiply, "\x1bOj"),
        (KEY_KP_Add, "\x1bOk"),
        (KEY_KP_Subtract, "\x1bOm"),
        (KEY_KP_Decimal, "\x1bOn"),
        (KEY_KP_Divide, "\x1bOo"),
    ];
    for (sym, seq) in keypad {
        keys.push(KeyBinding::send(sym, ModMatch::Any, seq).appkey(ModeReq::On));
    }
    for (i, sym) in (KEY_KP_0..=KEY_KP_9).enumerate() {
        let seq = vec![0x1b, b'O', b'p' + i as u8];
        keys.push(KeyBinding::send(sym, ModMatch::Any, seq).appkey(ModeReq::On));
    }
    keys.push(KeyBinding::send(KEY_KP_Enter, ModMatch::Any, "\r").appkey(ModeReq::Off));

    // Cursor keys: CSI 1;m X with modifiers, else CSI X / SS3 X by mode
    let cursor: [(&[u32], char); 6] = [
        (&[KEY_Up, KEY_KP_Up], 'A'),
        (&[KEY_Down, KEY_KP_Down], 'B'),
        (&[KEY_Right, KEY_KP_Right], 'C'),
        (&[KEY_Left, KEY_KP_Left], 'D'),
        (&[KEY_Home, KEY_KP_Home], 'H'),
        (&[KEY_End, KEY_KP_End], 'F'),
    ];
    for (syms, c) in cursor {
        for &sym in syms {
            for mods in modifier_combos() {
                let seq = format!("\x1b[1;{}{}", modifier_code(mods), c);
                keys.push(KeyBinding::send(sym, ModMatch::Exact(mods), seq));
            }
            keys.push(
                KeyBinding::send(sym, ModMatch::Any, format!("\x1b[{}", c))
                    .appcursor(ModeReq::Off),
            );
            keys.push(
                KeyBinding::send(sym, ModMatch::Any, format!("\x1bO{}", c))
                    .appcursor(ModeReq::On),
            );
        }
    }

    // CSI n ~ keys
    let tilde: [(&[u32], u8); 12] = [
        (&[KEY_Insert, KEY_KP_Insert], 2),
        (&[KEY_Delete, KEY_KP_Delete], 3),
        (&[KEY_Prior, KEY_KP_Prior], 5),
        (&[KEY_Next, KEY_KP_Next], 6),
        (&[KEY_F5], 15),
        (&[KEY_F6], 17),
        (&[KEY_F7], 18),
        (&[KEY_F8], 19),
        (&[KEY_F9], 20),
        (&[KEY_F10], 21),
        (&[KEY_F11], 23),
        (&[KEY_F12], 24),
    ];
    for (syms, n) in tilde {
        for &sym in syms {
            for mods in modifier_combos() {
                let seq = format!("\x1b[{};{}~", n, modifier_code(mods));
                keys.push(KeyBinding::send(sym, ModMatch::Exact(mods), seq));
            }
            keys.push(KeyBinding::send(sym, ModMatch::Any, format!("\x1b[{}~", n)));
        }
    }

    // F1-F4: SS3 P..S, CSI 1;m P..S with modifiers
    for (sym, c) in [(KEY_F1, 'P'), (KEY_F2, 'Q'), (KEY_F3, 'R'), (KEY_F4, 'S')] {
        for mods in modifier_combos() {
            let seq = format!("\x1b[1;{}{}", modifier_code(mods), c);
            keys.push(KeyBinding::send(sym, ModMatch::Exact(mods), seq));
        }
        keys.push(KeyBinding::send(sym, ModMatch::Any, format!("\x1bO{}", c)));
    }

    keys.push(KeyBinding::send(KEY_ISO_Left_Tab, ModMatch::Any, "\x1b[Z"));
    keys.push(KeyBinding::send(KEY_Return, ModMatch::Exact(ModState::MOD1), "\x1b\r"));
    keys.push(KeyBinding::send(KEY_Return, ModMatch::Any, "\r"));
    keys.push(KeyBinding::send(KEY_BackSpace, ModMatch::Exact(ModState::MOD1), "\x1b\x7f"));
    keys.push(KeyBinding::send(KEY_BackSpace, ModMatch::Any, "\x7f"));
    keys
}

/// Wheel scrolls the child with ^Y / ^E
pub fn default_mouse() -> Vec<MouseBinding> {
    vec![
        MouseBinding {
            button: 4,
            mods: ModMatch::Any,
            action: Action::Send(vec![0x19]),
        },
        MouseBinding {
            button: 5,
            mods: ModMatch::Any,
            action: Action::Send(vec![0x05]),
        },
    ]
}

fn shortcut(spec: &str, op: Operation) -> Option<KeyBinding> {
    let parsed = ParsedKeybind::parse(spec);
    let Some(keysym) = keysym_from_key(&parsed.key) else {
        warn!("Ignoring keybind {:?}: unknown key {:?}", spec, parsed.key);
        return None;
    };
    let mut mods = ModState::empty();
    mods.set(ModState::CONTROL, parsed.ctrl);
    mods.set(ModState::SHIFT, parsed.shift);
    mods.set(ModState::MOD1, parsed.alt);
    mods.set(ModState::MOD4, parsed.super_key);
    Some(KeyBinding::invoke(keysym, mods, op))
}

fn keysym_from_key(key: &str) -> Option<u32> {
    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_graphic() {
            // Latin-1 keysyms equal their code points
            return Some(c.to_ascii_lowercase() as u32);
        }
    }
    let sym = match key.to_ascii_lowercase().as_str() {
        "pageup" | "pgup" => keysyms::KEY_Prior,
        "pagedown" | "pgdn" => keysyms::KEY_Next,
        "plus" => keysyms::KEY_plus,
        "minus" => keysyms::KEY_minus,
        "equal" => keysyms::KEY_equal,
        _ => xkb::keysym_from_name(key, xkb::KEYSYM_CASE_INSENSITIVE).raw(),
    };
    (sym != keysyms::KEY_NoSymbol).then_some(sym)
}

/// Shifted letters match their lowercase keysym
fn fold_case(keysym: u32) -> u32 {
    match keysym {
        0x41..=0x5a => keysym + 0x20,
        _ => keysym,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xkbcommon::xkb::keysyms::*;

    fn bindings() -> Bindings {
        Bindings::from_config(&KeybindConfig::default())
    }

    fn send(b: &[u8]) -> Option<Action> {
        Some(Action::Send(b.to_vec()))
    }

    const CTRL_SHIFT: ModState = ModState::CONTROL.union(ModState::SHIFT);

    #[test]
    fn test_shortcuts_first() {
        let b = bindings();
        let none = TermMode::empty();
        assert_eq!(
            b.key_action(KEY_C, "\x03", CTRL_SHIFT, none),
            Some(Action::Invoke(Operation::ClipCopy))
        );
        assert_eq!(
            b.key_action(KEY_Insert, "", ModState::SHIFT, none),
            Some(Action::Invoke(Operation::SelPaste))
        );
        assert_eq!(
            b.key_action(KEY_Prior, "", CTRL_SHIFT, none),
            Some(Action::Invoke(Operation::ZoomIn))
        );
        // Num lock does not break matching
        assert_eq!(
            b.key_action(KEY_V, "\x16", CTRL_SHIFT | ModState::MOD2, none),
            Some(Action::Invoke(Operation::ClipPaste))
        );
        // Plain ctrl+c is text
        assert_eq!(b.key_action(KEY_c, "\x03", ModState::CONTROL, none), send(b"\x03"));
    }

    #[test]
    fn test_cursor_keys_follow_mode() {
        let b = bindings();
        let none = ModState::empty();
        assert_eq!(b.key_action(KEY_Up, "", none, TermMode::empty()), send(b"\x1b[A"));
        assert_eq!(b.key_action(KEY_Up, "", none, TermMode::APPCURSOR), send(b"\x1bOA"));
        assert_eq!(
            b.key_action(KEY_Left, "", ModState::CONTROL, TermMode::APPCURSOR),
            send(b"\x1b[1;5D")
        );
        assert_eq!(
            b.key_action(KEY_End, "", ModState::SHIFT | ModState::MOD1, TermMode::empty()),
            send(b"\x1b[1;4F")
        );
    }

    #[test]
    fn test_keypad_follows_mode() {
        let b = bindings();
        let none = ModState::empty();
        assert_eq!(b.key_action(KEY_KP_5, "5", none, TermMode::empty()), send(b"5"));
        assert_eq!(b.key_action(KEY_KP_5, "5", none, TermMode::APPKEYPAD), send(b"\x1bOu"));
        assert_eq!(b.key_action(KEY_KP_Enter, "\r", none, TermMode::empty()), send(b"\r"));
        assert_eq!(
            b.key_action(KEY_KP_Enter, "\r", none, TermMode::APPKEYPAD),
            send(b"\x1bOM")
        );
    }

    #[test]
    fn test_function_and_editing_keys() {
        let b = bindings();
        let m = TermMode::empty();
        let none = ModState::empty();
        assert_eq!(b.key_action(KEY_F1, "", none, m), send(b"\x1bOP"));
        assert_eq!(b.key_action(KEY_F5, "", none, m), send(b"\x1b[15~"));
        assert_eq!(b.key_action(KEY_F5, "", ModState::CONTROL, m), send(b"\x1b[15;5~"));
        assert_eq!(b.key_action(KEY_Delete, "", none, m), send(b"\x1b[3~"));
        assert_eq!(b.key_action(KEY_ISO_Left_Tab, "", ModState::SHIFT, m), send(b"\x1b[Z"));
        assert_eq!(b.key_action(KEY_BackSpace, "\x08", none, m), send(b"\x7f"));
        assert_eq!(b.key_action(KEY_Return, "\r", ModState::MOD1, m), send(b"\x1b\r"));
    }

    #[test]
    fn test_alt_prefixes_escape() {
        let b = bindings();
        let m = TermMode::empty();
        assert_eq!(b.key_action(KEY_x, "x", ModState::MOD1, m), send(b"\x1bx"));
        assert_eq!(b.key_action(KEY_x, "x", ModState::empty(), m), send(b"x"));
        // Multi-byte text is not prefixed
        assert_eq!(b.key_action(0xe9, "é", ModState::MOD1, m), send("é".as_bytes()));
        assert_eq!(b.key_action(KEY_Shift_L, "", ModState::empty(), m), None);
    }

    #[test]
    fn test_mouse_wheel_shortcuts() {
        let b = bindings();
        assert_eq!(b.mouse_action(4, ModState::empty()), send(b"\x19"));
        assert_eq!(b.mouse_action(5, ModState::CONTROL), send(b"\x05"));
        assert_eq!(b.mouse_action(1, ModState::empty()), None);
    }

    #[test]
    fn test_config_keybind_parsing() {
        let config = KeybindConfig {
            copy: vec!["alt+y".into(), "bogus+nokey_xyz".into()],
            ..KeybindConfig::default()
        };
        let b = Bindings::from_config(&config);
        assert_eq!(
            b.key_action(KEY_y, "y", ModState::MOD1, TermMode::empty()),
            Some(Action::Invoke(Operation::ClipCopy))
        );
        assert_eq!(
            b.key_action(KEY_Home, "", CTRL_SHIFT, TermMode::empty()),
            Some(Action::Invoke(Operation::ZoomReset))
        );
    }
}
