//! Chord detection state machine
//!
//! Tracks how many physical keys of each modifier class are held and which
//! two-modifier chords are armed. A chord is armed once its two modifiers
//! are held with nothing else down, and stays armed until something
//! unrelated is pressed. Firing checks both the arm flag and the live
//! counts at the moment of the completing key event.

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::events::GestureSignal;
use crate::hotkey::{HotkeyEvent, KeyDirection, KeyEvent, Keymap, ModifierClass};

/// Two-modifier combinations the machine knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chord {
    AltShift,
    CtrlShift,
    SuperShift,
    CtrlAlt,
}

impl Chord {
    fn members(self) -> [ModifierClass; 2] {
        match self {
            Chord::AltShift => [ModifierClass::Alt, ModifierClass::Shift],
            Chord::CtrlShift => [ModifierClass::Ctrl, ModifierClass::Shift],
            Chord::SuperShift => [ModifierClass::Super, ModifierClass::Shift],
            Chord::CtrlAlt => [ModifierClass::Ctrl, ModifierClass::Alt],
        }
    }
}

/// Number of held physical keys per modifier class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierCounts {
    counts: [u32; 5],
}

impl ModifierCounts {
    fn slot(class: ModifierClass) -> usize {
        match class {
            ModifierClass::Alt => 0,
            ModifierClass::Ctrl => 1,
            ModifierClass::Shift => 2,
            ModifierClass::Super => 3,
            ModifierClass::Other => 4,
        }
    }

    /// Keys of `class` currently held
    pub fn get(&self, class: ModifierClass) -> u32 {
        self.counts[Self::slot(class)]
    }

    /// At least one key of `class` is held
    pub fn held(&self, class: ModifierClass) -> bool {
        self.get(class) > 0
    }

    fn press(&mut self, class: ModifierClass) {
        let slot = &mut self.counts[Self::slot(class)];
        *slot = slot.saturating_add(1);
    }

    /// Floors at zero so a release without a seen press is absorbed
    fn release(&mut self, class: ModifierClass) {
        let slot = &mut self.counts[Self::slot(class)];
        *slot = slot.saturating_sub(1);
    }

    /// Nothing outside the chord's two modifiers is held
    pub fn only(&self, chord: Chord) -> bool {
        let members = chord.members();
        [
            ModifierClass::Alt,
            ModifierClass::Ctrl,
            ModifierClass::Shift,
            ModifierClass::Super,
            ModifierClass::Other,
        ]
        .into_iter()
        .filter(|class| !members.contains(class))
        .all(|class| !self.held(class))
    }
}

/// Sticky arm flags, one per release-triggered chord
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArmFlags {
    pub alt_shift: bool,
    pub ctrl_shift: bool,
    pub super_shift: bool,
}

impl ArmFlags {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The chord automaton
pub struct ChordMachine {
    keymap: Keymap,
    counts: ModifierCounts,
    arms: ArmFlags,
}

impl ChordMachine {
    /// Create a machine with nothing held and nothing armed
    pub fn new(keymap: Keymap) -> Self {
        Self {
            keymap,
            counts: ModifierCounts::default(),
            arms: ArmFlags::default(),
        }
    }

    pub fn counts(&self) -> ModifierCounts {
        self.counts
    }

    pub fn arms(&self) -> ArmFlags {
        self.arms
    }

    /// Run the machine until the key event channel closes, forwarding
    /// every detected gesture to `signal_tx`
    pub async fn run(
        &mut self,
        mut key_rx: mpsc::Receiver<HotkeyEvent>,
        signal_tx: mpsc::Sender<GestureSignal>,
    ) {
        info!("chord machine started");

        while let Some(event) = key_rx.recv().await {
            match event {
                HotkeyEvent::Key(key) => {
                    let Some(signal) = self.handle(key) else {
                        continue;
                    };
                    info!(%signal, device = key.device, "gesture detected");
                    if signal_tx.send(signal).await.is_err() {
                        warn!("action dispatcher gone, stopping chord machine");
                        break;
                    }
                }
                HotkeyEvent::Button { device, button, pressed } => {
                    trace!(device, button, pressed, "raw button event ignored");
                }
            }
        }

        info!("chord machine stopped");
    }

    /// Classify a raw key event and feed it to [`step`](Self::step)
    pub fn handle(&mut self, key: KeyEvent) -> Option<GestureSignal> {
        let class = self.keymap.classify(key.code);
        trace!(?key.direction, code = key.code, %class, "key event");

        let signal = self.step(key.direction, class, key.code);

        debug!(
            counts = ?self.counts(),
            arms = ?self.arms(),
            "chord state updated"
        );
        signal
    }

    /// Apply one classified key event
    pub fn step(
        &mut self,
        direction: KeyDirection,
        class: ModifierClass,
        code: u32,
    ) -> Option<GestureSignal> {
        match direction {
            KeyDirection::Press => self.press(class, code),
            KeyDirection::Release => self.release(class),
        }
    }

    fn press(&mut self, class: ModifierClass, code: u32) -> Option<GestureSignal> {
        use ModifierClass::*;

        match class {
            Alt => {
                self.counts.press(Alt);
                self.arms.alt_shift |= self.counts.held(Shift) && self.counts.only(Chord::AltShift);
                self.arms.ctrl_shift = false;
                self.arms.super_shift = false;
                None
            }
            Ctrl => {
                self.counts.press(Ctrl);
                self.arms.alt_shift = false;
                self.arms.ctrl_shift |=
                    self.counts.held(Shift) && self.counts.only(Chord::CtrlShift);
                self.arms.super_shift = false;
                None
            }
            Shift => {
                self.counts.press(Shift);
                self.arms.alt_shift |= self.counts.held(Alt) && self.counts.only(Chord::AltShift);
                self.arms.ctrl_shift |=
                    self.counts.held(Ctrl) && self.counts.only(Chord::CtrlShift);
                self.arms.super_shift |=
                    self.counts.held(Super) && self.counts.only(Chord::SuperShift);
                None
            }
            Super => {
                self.counts.press(Super);
                self.arms.alt_shift = false;
                self.arms.ctrl_shift = false;
                self.arms.super_shift |=
                    self.counts.held(Shift) && self.counts.only(Chord::SuperShift);
                None
            }
            Other => {
                // Fires on press, against the counts before this key is added
                let signal = (self.keymap.is_terminal_key(code)
                    && self.counts.held(Ctrl)
                    && self.counts.held(Alt)
                    && self.counts.only(Chord::CtrlAlt))
                .then_some(GestureSignal::TerminalOpen);

                self.counts.press(Other);
                self.arms.clear();
                signal
            }
        }
    }

    fn release(&mut self, class: ModifierClass) -> Option<GestureSignal> {
        use ModifierClass::*;

        self.counts.release(class);
        match class {
            Alt => self.released_alt_shift(Alt, Shift),
            Ctrl => self.released_ctrl_shift(Ctrl, Shift),
            Shift => self
                .released_alt_shift(Shift, Alt)
                .or_else(|| self.released_ctrl_shift(Shift, Ctrl)),
            // Super+Shift is armed but never fires
            Super | Other => None,
        }
    }

    /// Alt+Shift completes when one side is fully released while the other
    /// is still held
    fn released_alt_shift(
        &self,
        released: ModifierClass,
        still_held: ModifierClass,
    ) -> Option<GestureSignal> {
        (self.arms.alt_shift
            && self.counts.held(still_held)
            && !self.counts.held(released)
            && self.counts.only(Chord::AltShift))
        .then_some(GestureSignal::LayoutRotateCjk)
    }

    fn released_ctrl_shift(
        &self,
        released: ModifierClass,
        still_held: ModifierClass,
    ) -> Option<GestureSignal> {
        (self.arms.ctrl_shift
            && self.counts.held(still_held)
            && !self.counts.held(released)
            && self.counts.only(Chord::CtrlShift))
        .then_some(GestureSignal::LayoutRotate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModifierClass::*;

    const SOME_KEY: u32 = 5;
    const TERMINAL_KEY: u32 = 28;

    fn create_machine() -> ChordMachine {
        ChordMachine::new(Keymap::default())
    }

    fn press(sm: &mut ChordMachine, class: ModifierClass) -> Option<GestureSignal> {
        sm.step(KeyDirection::Press, class, SOME_KEY)
    }

    fn release(sm: &mut ChordMachine, class: ModifierClass) -> Option<GestureSignal> {
        sm.step(KeyDirection::Release, class, SOME_KEY)
    }

    #[test]
    fn test_initial_state() {
        let sm = create_machine();
        assert_eq!(sm.counts(), ModifierCounts::default());
        assert_eq!(sm.arms(), ArmFlags::default());
    }

    #[test]
    fn test_counts_floor_at_zero() {
        let mut sm = create_machine();
        for class in [Alt, Ctrl, Shift, Super, Other] {
            assert_eq!(release(&mut sm, class), None);
            assert_eq!(sm.counts().get(class), 0);
        }
    }

    #[test]
    fn test_counts_track_prefix_floor() {
        // +1 / -1 per event, clamped at zero on every prefix
        let pattern = [false, false, true, true, true, false, true, false, false];
        for class in [Alt, Ctrl, Shift, Super, Other] {
            let mut sm = create_machine();
            let mut expected: u32 = 0;
            for &is_press in &pattern {
                if is_press {
                    press(&mut sm, class);
                    expected += 1;
                } else {
                    release(&mut sm, class);
                    expected = expected.saturating_sub(1);
                }
                assert_eq!(sm.counts().get(class), expected);
            }
        }
    }

    #[test]
    fn test_left_and_right_keys_share_a_count() {
        let mut sm = create_machine();
        sm.handle(KeyEvent::press(37));
        sm.handle(KeyEvent::press(105));
        assert_eq!(sm.counts().get(Ctrl), 2);
        sm.handle(KeyEvent::release(37));
        assert!(sm.counts().held(Ctrl));
    }

    #[test]
    fn test_ctrl_alt_without_shift_never_rotates() {
        let mut sm = create_machine();
        assert_eq!(press(&mut sm, Ctrl), None);
        assert_eq!(press(&mut sm, Alt), None);
        assert_eq!(release(&mut sm, Alt), None);
        assert!(!sm.arms().alt_shift);
    }

    #[test]
    fn test_alt_shift_fires_on_alt_release() {
        let mut sm = create_machine();
        assert_eq!(press(&mut sm, Shift), None);
        assert_eq!(press(&mut sm, Alt), None);
        assert_eq!(release(&mut sm, Alt), Some(GestureSignal::LayoutRotateCjk));
    }

    #[test]
    fn test_alt_shift_retriggers_while_armed() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        assert_eq!(release(&mut sm, Alt), Some(GestureSignal::LayoutRotateCjk));

        assert_eq!(press(&mut sm, Alt), None);
        assert_eq!(release(&mut sm, Alt), Some(GestureSignal::LayoutRotateCjk));
        assert!(sm.arms().alt_shift);
    }

    #[test]
    fn test_alt_shift_fires_on_shift_release() {
        let mut sm = create_machine();
        press(&mut sm, Alt);
        press(&mut sm, Shift);
        assert_eq!(release(&mut sm, Shift), Some(GestureSignal::LayoutRotateCjk));
    }

    #[test]
    fn test_other_key_disqualifies_arm() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        assert_eq!(sm.step(KeyDirection::Press, Other, SOME_KEY), None);
        assert_eq!(release(&mut sm, Alt), None);
    }

    #[test]
    fn test_rearm_after_disqualification() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        press(&mut sm, Other);
        release(&mut sm, Other);
        assert!(!sm.arms().alt_shift);

        // Alt is still held; a fresh Shift press restores a clean chord
        release(&mut sm, Shift);
        press(&mut sm, Shift);
        assert!(sm.arms().alt_shift);
        assert_eq!(release(&mut sm, Shift), Some(GestureSignal::LayoutRotateCjk));
    }

    #[test]
    fn test_ctrl_shift_fires_on_ctrl_release() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Ctrl);
        assert_eq!(release(&mut sm, Ctrl), Some(GestureSignal::LayoutRotate));
    }

    #[test]
    fn test_ctrl_shift_fires_on_shift_release() {
        let mut sm = create_machine();
        press(&mut sm, Ctrl);
        press(&mut sm, Shift);
        assert_eq!(release(&mut sm, Shift), Some(GestureSignal::LayoutRotate));
    }

    #[test]
    fn test_firing_checks_live_exclusivity() {
        let mut sm = create_machine();
        press(&mut sm, Ctrl);
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        assert_eq!(release(&mut sm, Shift), None);
    }

    #[test]
    fn test_extra_modifier_held_at_release_blocks_fire() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        assert!(sm.arms().alt_shift);
        // Super clears the Alt+Shift arm
        press(&mut sm, Super);
        release(&mut sm, Super);
        assert_eq!(release(&mut sm, Alt), None);
    }

    #[test]
    fn test_ctrl_press_disarms_alt_shift() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        assert_eq!(press(&mut sm, Ctrl), None);
        assert!(!sm.arms().alt_shift);
        assert_eq!(release(&mut sm, Ctrl), None);
        assert_eq!(release(&mut sm, Alt), None);
    }

    #[test]
    fn test_alt_press_disarms_ctrl_shift() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Ctrl);
        assert_eq!(press(&mut sm, Alt), None);
        assert!(!sm.arms().ctrl_shift);
        assert_eq!(release(&mut sm, Alt), None);
        assert_eq!(release(&mut sm, Ctrl), None);
    }

    #[test]
    fn test_super_press_disarms_alt_shift() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        assert_eq!(press(&mut sm, Super), None);
        assert!(!sm.arms().alt_shift);
        assert_eq!(release(&mut sm, Super), None);
        assert_eq!(release(&mut sm, Alt), None);
    }

    #[test]
    fn test_super_press_disarms_ctrl_shift() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Ctrl);
        assert!(sm.arms().ctrl_shift);
        assert_eq!(press(&mut sm, Super), None);
        assert!(!sm.arms().ctrl_shift);
        assert_eq!(release(&mut sm, Super), None);
        assert_eq!(release(&mut sm, Ctrl), None);
    }

    #[test]
    fn test_release_needs_other_side_still_held() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        assert_eq!(release(&mut sm, Alt), Some(GestureSignal::LayoutRotateCjk));
        // Shift goes up with Alt already gone
        assert_eq!(release(&mut sm, Shift), None);
    }

    #[test]
    fn test_terminal_fires_on_press() {
        let mut sm = create_machine();
        press(&mut sm, Ctrl);
        press(&mut sm, Alt);
        assert_eq!(
            sm.step(KeyDirection::Press, Other, TERMINAL_KEY),
            Some(GestureSignal::TerminalOpen)
        );
        assert_eq!(sm.counts().get(Other), 1);
        assert_eq!(sm.step(KeyDirection::Release, Other, TERMINAL_KEY), None);
    }

    #[test]
    fn test_terminal_blocked_by_shift() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Ctrl);
        press(&mut sm, Alt);
        assert_eq!(sm.step(KeyDirection::Press, Other, TERMINAL_KEY), None);
    }

    #[test]
    fn test_terminal_blocked_by_held_key() {
        let mut sm = create_machine();
        press(&mut sm, Ctrl);
        press(&mut sm, Alt);
        press(&mut sm, Other);
        assert_eq!(sm.step(KeyDirection::Press, Other, TERMINAL_KEY), None);
    }

    #[test]
    fn test_terminal_needs_terminal_key() {
        let mut sm = create_machine();
        press(&mut sm, Ctrl);
        press(&mut sm, Alt);
        assert_eq!(sm.step(KeyDirection::Press, Other, 27), None);
    }

    #[test]
    fn test_terminal_via_raw_codes() {
        let mut sm = create_machine();
        assert_eq!(sm.handle(KeyEvent::press(37)), None);
        assert_eq!(sm.handle(KeyEvent::press(64)), None);
        assert_eq!(sm.handle(KeyEvent::press(28)), Some(GestureSignal::TerminalOpen));
    }

    #[test]
    fn test_super_shift_arms_but_never_fires() {
        let mut sm = create_machine();
        press(&mut sm, Super);
        press(&mut sm, Shift);
        assert!(sm.arms().super_shift);
        assert_eq!(release(&mut sm, Shift), None);
        assert_eq!(release(&mut sm, Super), None);
    }

    #[test]
    fn test_other_press_clears_all_arms() {
        let mut sm = create_machine();
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        press(&mut sm, Ctrl);
        press(&mut sm, Super);
        press(&mut sm, Other);
        assert_eq!(sm.arms(), ArmFlags::default());
    }

    #[test]
    fn test_stray_release_does_not_corrupt_detection() {
        let mut sm = create_machine();
        release(&mut sm, Alt);
        release(&mut sm, Other);
        press(&mut sm, Shift);
        press(&mut sm, Alt);
        assert_eq!(release(&mut sm, Alt), Some(GestureSignal::LayoutRotateCjk));
    }

    #[test]
    fn test_run_forwards_signals() {
        tokio_test::block_on(async {
            let (key_tx, key_rx) = mpsc::channel(8);
            let (signal_tx, mut signal_rx) = mpsc::channel(8);

            for key in [KeyEvent::press(50), KeyEvent::press(64), KeyEvent::release(64)] {
                key_tx.send(HotkeyEvent::Key(key)).await.unwrap();
            }
            key_tx
                .send(HotkeyEvent::Button { device: 2, button: 1, pressed: true })
                .await
                .unwrap();
            drop(key_tx);

            let mut sm = create_machine();
            sm.run(key_rx, signal_tx).await;

            assert_eq!(signal_rx.recv().await, Some(GestureSignal::LayoutRotateCjk));
            assert_eq!(signal_rx.recv().await, None);
        });
    }
}
