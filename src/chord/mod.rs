//! Chord detection
//!
//! Turns the ordered stream of raw key events into gesture signals. Four
//! chord families are recognised:
//! - Ctrl+Alt+terminal key: fires on the key press
//! - Alt+Shift: fires when either side is released
//! - Ctrl+Shift: fires when either side is released
//! - Super+Shift: armed and tracked, never fires

mod machine;

pub use machine::ChordMachine;
