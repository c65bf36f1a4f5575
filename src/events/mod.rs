//! Gesture signals emitted by the chord machine
//!
//! A signal is the decision that a chord completed. What happens next is
//! up to the action dispatcher.

/// Completed chord gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureSignal {
    /// Ctrl+Alt held exclusively, terminal key pressed
    TerminalOpen,

    /// Alt+Shift held exclusively, one of them released
    LayoutRotateCjk,

    /// Ctrl+Shift held exclusively, one of them released
    LayoutRotate,

    /// Super+Shift is armed by the machine but has no release check and no
    /// bound action yet
    #[allow(dead_code)]
    SuperShift,
}

impl std::fmt::Display for GestureSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GestureSignal::TerminalOpen => write!(f, "TERMINAL_OPEN"),
            GestureSignal::LayoutRotateCjk => write!(f, "LAYOUT_ROTATE_CJK"),
            GestureSignal::LayoutRotate => write!(f, "LAYOUT_ROTATE"),
            GestureSignal::SuperShift => write!(f, "SUPER_SHIFT"),
        }
    }
}
