//! Hotkey module for global keyboard event listening
//!
//! Uses XInput2 raw events to observe key press/release on every (or one
//! selected) input device, and classifies key codes into modifier classes.

mod keys;
mod listener;

pub use keys::{Keymap, ModifierClass};
pub use listener::{HotkeyEvent, HotkeyListener, KeyDirection, KeyEvent};
