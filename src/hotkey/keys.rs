//! Modifier key classes and the key code table behind them
//!
//! Key codes are X11 hardware key codes as delivered in raw XInput2 events.
//! Left and right variants of a modifier collapse into one class.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default key codes, matching an evdev-based X server on a PC keyboard
pub mod codes {
    /// Left Alt
    pub const ALT: &[u32] = &[64];
    /// Left and right Control
    pub const CTRL: &[u32] = &[37, 105];
    /// Left and right Shift
    pub const SHIFT: &[u32] = &[50, 62];
    /// Left and right Super
    pub const SUPER: &[u32] = &[133, 134];
    /// The `T` key, completes Ctrl+Alt+T
    pub const TERMINAL: u32 = 28;
}

/// Logical role of a physical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierClass {
    Alt,
    Ctrl,
    Shift,
    Super,
    /// Any key that is not one of the modifiers above
    Other,
}

impl std::fmt::Display for ModifierClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModifierClass::Alt => write!(f, "Alt"),
            ModifierClass::Ctrl => write!(f, "Ctrl"),
            ModifierClass::Shift => write!(f, "Shift"),
            ModifierClass::Super => write!(f, "Super"),
            ModifierClass::Other => write!(f, "Other"),
        }
    }
}

/// Errors raised while loading a keymap file
#[derive(Debug, thiserror::Error)]
pub enum KeymapError {
    #[error("failed to read keymap file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid keymap: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("key code {code} is assigned to both {first} and {second}")]
    Conflict {
        code: u32,
        first: ModifierClass,
        second: ModifierClass,
    },

    #[error("terminal key {code} is already a {class} key")]
    TerminalKeyIsModifier { code: u32, class: ModifierClass },
}

/// Table mapping key codes to modifier classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Keymap {
    pub alt_keys: Vec<u32>,
    pub ctrl_keys: Vec<u32>,
    pub shift_keys: Vec<u32>,
    pub super_keys: Vec<u32>,
    /// Non-modifier key that opens a terminal under Ctrl+Alt
    pub terminal_key: u32,
}

impl Default for Keymap {
    fn default() -> Self {
        Self {
            alt_keys: codes::ALT.to_vec(),
            ctrl_keys: codes::CTRL.to_vec(),
            shift_keys: codes::SHIFT.to_vec(),
            super_keys: codes::SUPER.to_vec(),
            terminal_key: codes::TERMINAL,
        }
    }
}

impl Keymap {
    /// Load a keymap from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, KeymapError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse and validate a JSON keymap
    pub fn from_json(json: &str) -> Result<Self, KeymapError> {
        let keymap: Keymap = serde_json::from_str(json)?;
        keymap.validate()?;
        Ok(keymap)
    }

    /// Reject key codes that belong to more than one class, and a terminal
    /// key that would never classify as `Other`
    pub fn validate(&self) -> Result<(), KeymapError> {
        let groups = self.groups();
        for (i, (first, keys)) in groups.iter().enumerate() {
            for (second, other) in &groups[i + 1..] {
                if let Some(code) = keys.iter().copied().find(|code| other.contains(code)) {
                    return Err(KeymapError::Conflict {
                        code,
                        first: *first,
                        second: *second,
                    });
                }
            }
        }

        match self.classify(self.terminal_key) {
            ModifierClass::Other => Ok(()),
            class => Err(KeymapError::TerminalKeyIsModifier {
                code: self.terminal_key,
                class,
            }),
        }
    }

    /// Classify a raw key code
    pub fn classify(&self, code: u32) -> ModifierClass {
        self.groups()
            .into_iter()
            .find(|(_, keys)| keys.contains(&code))
            .map(|(class, _)| class)
            .unwrap_or(ModifierClass::Other)
    }

    /// Whether `code` is the terminal key
    pub fn is_terminal_key(&self, code: u32) -> bool {
        code == self.terminal_key
    }

    fn groups(&self) -> [(ModifierClass, &[u32]); 4] {
        [
            (ModifierClass::Alt, self.alt_keys.as_slice()),
            (ModifierClass::Ctrl, self.ctrl_keys.as_slice()),
            (ModifierClass::Shift, self.shift_keys.as_slice()),
            (ModifierClass::Super, self.super_keys.as_slice()),
        ]
    }
}
