//! C8: mode controller.
//!
//! Mouse/gamepad toggle. The right device edge-detects its dedicated C
//! button; the left device has no such button, so it watches for an L+ZL
//! hold of at least 1.2 s and latches at most one toggle per hold
//! (spec.md §4.8).

use std::time::{Duration, Instant};

use crate::constants::*;
use crate::frame::btn;
use crate::side::Side;

/// Minimum hold duration for the left-device mode-toggle chord.
pub const HOLD_CHORD_DURATION: Duration = Duration::from_millis(1200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mouse,
    Gamepad,
}

/// Tracks the active [`Mode`] and the state needed to detect both toggle
/// mechanisms. Owns no sink or backlog state itself; the driver applies the
/// release/zero side effects (spec.md §4.8) when [`ModeController::update`]
/// reports a transition.
#[derive(Debug)]
pub struct ModeController {
    mode: Mode,
    last_c: bool,
    hold_start: Option<Instant>,
    hold_latched: bool,
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            mode: Mode::Mouse,
            last_c: false,
            hold_start: None,
            hold_latched: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// True while the left-device mode-toggle chord (L+ZL) is currently
    /// held, regardless of whether it has latched yet. Used by the button
    /// dispatcher to suppress click emission during the hold (spec.md
    /// §4.7).
    pub fn chord_active(&self, frame: &[u8], side: Side) -> bool {
        match side {
            Side::Left => is_chord_held(frame, side),
            Side::Right => false,
        }
    }

    /// Feed one frame. Returns `true` if the mode flipped on this call.
    pub fn update(&mut self, frame: &[u8], side: Side, now: Instant) -> bool {
        match side {
            Side::Right => {
                let c = btn(frame, RIGHT_MISC_OFFSET, right_misc::C);
                let rising = c && !self.last_c;
                self.last_c = c;
                if rising {
                    self.flip();
                    true
                } else {
                    false
                }
            }
            Side::Left => {
                let held = is_chord_held(frame, side);
                if !held {
                    self.hold_start = None;
                    self.hold_latched = false;
                    return false;
                }
                let start = *self.hold_start.get_or_insert(now);
                if !self.hold_latched && now.duration_since(start) >= HOLD_CHORD_DURATION {
                    self.hold_latched = true;
                    self.flip();
                    return true;
                }
                false
            }
        }
    }

    fn flip(&mut self) {
        self.mode = match self.mode {
            Mode::Mouse => Mode::Gamepad,
            Mode::Gamepad => Mode::Mouse,
        };
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

fn is_chord_held(frame: &[u8], side: Side) -> bool {
    match side {
        Side::Left => {
            btn(frame, LEFT_FACE_OFFSET, left_face::L) && btn(frame, LEFT_FACE_OFFSET, left_face::ZL)
        }
        Side::Right => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn right_frame(misc: u8) -> Vec<u8> {
        let mut f = vec![0u8; 16];
        f[RIGHT_MISC_OFFSET] = misc;
        f
    }

    fn left_frame(face: u8) -> Vec<u8> {
        let mut f = vec![0u8; 16];
        f[LEFT_FACE_OFFSET] = face;
        f
    }

    #[test]
    fn right_device_toggles_on_rising_edge_only() {
        let mut ctrl = ModeController::new();
        let now = Instant::now();
        assert!(!ctrl.update(&right_frame(0x00), Side::Right, now));
        assert!(ctrl.update(&right_frame(right_misc::C), Side::Right, now));
        assert!(!ctrl.update(&right_frame(right_misc::C), Side::Right, now));
        assert!(!ctrl.update(&right_frame(0x00), Side::Right, now));
        assert_eq!(ctrl.mode(), Mode::Gamepad);
    }

    #[test]
    fn left_device_requires_full_hold_duration() {
        let mut ctrl = ModeController::new();
        let t0 = Instant::now();
        let chord = left_face::L | left_face::ZL;

        assert!(!ctrl.update(&left_frame(chord), Side::Left, t0));
        assert!(!ctrl.update(&left_frame(chord), Side::Left, t0 + Duration::from_millis(600)));
        assert!(ctrl.update(&left_frame(chord), Side::Left, t0 + Duration::from_millis(1250)));
        assert_eq!(ctrl.mode(), Mode::Gamepad);
    }

    #[test]
    fn left_device_chord_latches_once_per_hold() {
        let mut ctrl = ModeController::new();
        let t0 = Instant::now();
        let chord = left_face::L | left_face::ZL;

        ctrl.update(&left_frame(chord), Side::Left, t0);
        ctrl.update(&left_frame(chord), Side::Left, t0 + Duration::from_millis(1300));
        assert_eq!(ctrl.mode(), Mode::Gamepad);

        assert!(!ctrl.update(&left_frame(chord), Side::Left, t0 + Duration::from_millis(2000)));
        assert_eq!(ctrl.mode(), Mode::Gamepad);
    }

    #[test]
    fn left_device_releasing_before_duration_resets_hold() {
        let mut ctrl = ModeController::new();
        let t0 = Instant::now();
        let chord = left_face::L | left_face::ZL;

        ctrl.update(&left_frame(chord), Side::Left, t0);
        ctrl.update(&left_frame(0), Side::Left, t0 + Duration::from_millis(400));
        assert!(!ctrl.update(
            &left_frame(chord),
            Side::Left,
            t0 + Duration::from_millis(1300)
        ));
        assert_eq!(ctrl.mode(), Mode::Mouse);
    }

    #[test]
    fn chord_active_reports_left_hold_state() {
        let ctrl = ModeController::new();
        let chord = left_face::L | left_face::ZL;
        assert!(ctrl.chord_active(&left_frame(chord), Side::Left));
        assert!(!ctrl.chord_active(&left_frame(left_face::L), Side::Left));
        assert!(!ctrl.chord_active(&right_frame(0), Side::Right));
    }
}
