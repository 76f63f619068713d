//! C7: button dispatcher.
//!
//! Reads the raw face/misc bytes for the detected [`Side`] and mode, and
//! turns bit transitions into edge-triggered virtual button events. The
//! edge map is the single source of truth the mode controller's release
//! routine (§4.8) walks on every mode switch.

use std::collections::HashMap;

use crate::config::Config;
use crate::constants::*;
use crate::frame::btn;
use crate::side::Side;
use crate::sink::{GamepadButton, MouseButton, VirtualSink};

/// Last-emitted state for every logical button this session has touched.
/// Invariant (spec.md §3): on any mode switch every tracked button is
/// forced to released and synchronised, so nothing can stay latched.
#[derive(Debug, Default)]
pub struct ButtonEdgeMap {
    mouse: HashMap<MouseButton, bool>,
    gamepad: HashMap<GamepadButton, bool>,
}

impl ButtonEdgeMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_mouse(&mut self, sink: &mut dyn VirtualSink, button: MouseButton, pressed: bool) {
        let last = self.mouse.entry(button).or_insert(false);
        if *last != pressed {
            *last = pressed;
            sink.emit_mouse_button(button, pressed);
        }
    }

    fn set_gamepad(&mut self, sink: &mut dyn VirtualSink, button: GamepadButton, pressed: bool) {
        let last = self.gamepad.entry(button).or_insert(false);
        if *last != pressed {
            *last = pressed;
            sink.emit_gamepad_button(button, pressed);
        }
    }

    /// Force every tracked button to released, emitting a release event for
    /// anything currently pressed, then synchronise both sinks (spec.md
    /// §4.8, §7: button state safety on mode transitions).
    pub fn release_all(&mut self, sink: &mut dyn VirtualSink) {
        for (button, state) in self.mouse.iter_mut() {
            if *state {
                *state = false;
                sink.emit_mouse_button(*button, false);
            }
        }
        for (button, state) in self.gamepad.iter_mut() {
            if *state {
                *state = false;
                sink.emit_gamepad_button(*button, false);
            }
        }
        let _ = sink.sync_mouse();
        let _ = sink.sync_gamepad();
    }
}

/// Dispatch one decoded frame's buttons for the current side and mode.
/// `chord_active` suppresses left/right mouse clicks while the mode-toggle
/// chord (L+ZL) is held, so the toggle hold never latches a click
/// (spec.md §4.7).
pub fn dispatch_mouse(
    frame: &[u8],
    side: Side,
    edges: &mut ButtonEdgeMap,
    sink: &mut dyn VirtualSink,
    chord_active: bool,
) {
    match side {
        Side::Right => {
            let l = btn(frame, RIGHT_FACE_OFFSET, right_face::L);
            let zl = btn(frame, RIGHT_FACE_OFFSET, right_face::ZL);
            let r3 = btn(frame, RIGHT_MISC_OFFSET, right_misc::R3);
            if !chord_active {
                edges.set_mouse(sink, MouseButton::Left, l);
                edges.set_mouse(sink, MouseButton::Right, zl);
            }
            edges.set_mouse(sink, MouseButton::Middle, r3);
        }
        Side::Left => {
            let l = btn(frame, LEFT_FACE_OFFSET, left_face::L);
            let zl = btn(frame, LEFT_FACE_OFFSET, left_face::ZL);
            let l3 = btn(frame, LEFT_MISC_OFFSET, left_misc::L3);
            if !chord_active {
                edges.set_mouse(sink, MouseButton::Left, l);
                edges.set_mouse(sink, MouseButton::Right, zl);
            }
            edges.set_mouse(sink, MouseButton::Middle, l3);
        }
    }
    let _ = sink.sync_mouse();
}

/// Dispatch one decoded frame's buttons for gamepad mode. `L`/`ZL` on the
/// left device are reserved for the mode-toggle chord and never emitted
/// here (spec.md §4.7).
pub fn dispatch_gamepad(
    frame: &[u8],
    side: Side,
    edges: &mut ButtonEdgeMap,
    sink: &mut dyn VirtualSink,
    config: &Config,
) {
    match side {
        Side::Right => {
            let a = btn(frame, RIGHT_FACE_OFFSET, right_face::A);
            let x = btn(frame, RIGHT_FACE_OFFSET, right_face::X);
            let b = btn(frame, RIGHT_FACE_OFFSET, right_face::B);
            let y = btn(frame, RIGHT_FACE_OFFSET, right_face::Y);
            let sl = btn(frame, RIGHT_FACE_OFFSET, right_face::SL);
            let sr = btn(frame, RIGHT_FACE_OFFSET, right_face::SR);
            let plus = btn(frame, RIGHT_MISC_OFFSET, right_misc::PLUS);
            let home = btn(frame, RIGHT_MISC_OFFSET, right_misc::HOME);
            let r3 = btn(frame, RIGHT_MISC_OFFSET, right_misc::R3);

            edges.set_gamepad(sink, GamepadButton::South, a);
            if config.swap_xy_right {
                edges.set_gamepad(sink, GamepadButton::North, x);
                edges.set_gamepad(sink, GamepadButton::East, y);
            } else {
                edges.set_gamepad(sink, GamepadButton::East, x);
                edges.set_gamepad(sink, GamepadButton::North, y);
            }
            edges.set_gamepad(sink, GamepadButton::West, b);
            edges.set_gamepad(sink, GamepadButton::TL, sl);
            edges.set_gamepad(sink, GamepadButton::TR, sr);
            edges.set_gamepad(sink, GamepadButton::Start, plus);
            edges.set_gamepad(sink, GamepadButton::Select, home);
            edges.set_gamepad(sink, GamepadButton::ThumbL, r3);
        }
        Side::Left => {
            let dup = btn(frame, LEFT_FACE_OFFSET, left_face::DUP);
            let ddown = btn(frame, LEFT_FACE_OFFSET, left_face::DDOWN);
            let dleft = btn(frame, LEFT_FACE_OFFSET, left_face::DLEFT);
            let dright = btn(frame, LEFT_FACE_OFFSET, left_face::DRIGHT);
            let sl = btn(frame, LEFT_FACE_OFFSET, left_face::SL);
            let sr = btn(frame, LEFT_FACE_OFFSET, left_face::SR);
            let minus = btn(frame, LEFT_MISC_OFFSET, left_misc::MINUS);
            let capture = btn(frame, LEFT_MISC_OFFSET, left_misc::CAPTURE);
            let l3 = btn(frame, LEFT_MISC_OFFSET, left_misc::L3);

            edges.set_gamepad(sink, GamepadButton::North, dright);
            edges.set_gamepad(sink, GamepadButton::South, dleft);
            if config.swap_xy_left {
                edges.set_gamepad(sink, GamepadButton::East, dup);
                edges.set_gamepad(sink, GamepadButton::West, ddown);
            } else {
                edges.set_gamepad(sink, GamepadButton::East, ddown);
                edges.set_gamepad(sink, GamepadButton::West, dup);
            }
            edges.set_gamepad(sink, GamepadButton::TL, sl);
            edges.set_gamepad(sink, GamepadButton::TR, sr);
            edges.set_gamepad(sink, GamepadButton::Select, minus);
            edges.set_gamepad(sink, GamepadButton::Start, capture);
            edges.set_gamepad(sink, GamepadButton::ThumbL, l3);
        }
    }
    let _ = sink.sync_gamepad();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;

    fn right_frame(face: u8, misc: u8) -> Vec<u8> {
        let mut f = vec![0u8; 16];
        f[RIGHT_FACE_OFFSET] = face;
        f[RIGHT_MISC_OFFSET] = misc;
        f
    }

    #[test]
    fn mouse_right_left_click_edge_triggered() {
        let mut edges = ButtonEdgeMap::new();
        let mut sink = MockSink::new();
        let frame = right_frame(right_face::L, 0);
        dispatch_mouse(&frame, Side::Right, &mut edges, &mut sink, false);
        dispatch_mouse(&frame, Side::Right, &mut edges, &mut sink, false);
        let presses = sink
            .events
            .iter()
            .filter(|e| matches!(e, crate::sink::RecordedEvent::MouseButton(MouseButton::Left, true)))
            .count();
        assert_eq!(presses, 1);
    }

    #[test]
    fn mouse_chord_suppresses_clicks() {
        let mut edges = ButtonEdgeMap::new();
        let mut sink = MockSink::new();
        let frame = right_frame(right_face::L | right_face::ZL, 0);
        dispatch_mouse(&frame, Side::Right, &mut edges, &mut sink, true);
        let any_click = sink.events.iter().any(|e| {
            matches!(
                e,
                crate::sink::RecordedEvent::MouseButton(MouseButton::Left, _)
                    | crate::sink::RecordedEvent::MouseButton(MouseButton::Right, _)
            )
        });
        assert!(!any_click);
    }

    #[test]
    fn release_all_clears_pressed_buttons() {
        let mut edges = ButtonEdgeMap::new();
        let mut sink = MockSink::new();
        let frame = right_frame(right_face::L, 0);
        dispatch_mouse(&frame, Side::Right, &mut edges, &mut sink, false);
        sink.events.clear();
        edges.release_all(&mut sink);
        assert!(sink.events.contains(&crate::sink::RecordedEvent::MouseButton(
            MouseButton::Left,
            false
        )));
    }

    #[test]
    fn gamepad_right_default_swap_maps_x_to_north() {
        let mut edges = ButtonEdgeMap::new();
        let mut sink = MockSink::new();
        let config = Config::default();
        let frame = right_frame(right_face::X, 0);
        dispatch_gamepad(&frame, Side::Right, &mut edges, &mut sink, &config);
        assert!(sink.events.contains(&crate::sink::RecordedEvent::GamepadButton(
            GamepadButton::North,
            true
        )));
    }

    #[test]
    fn gamepad_left_reserves_l_zl() {
        let mut edges = ButtonEdgeMap::new();
        let mut sink = MockSink::new();
        let config = Config::default();
        let mut frame = vec![0u8; 16];
        frame[LEFT_FACE_OFFSET] = left_face::L | left_face::ZL;
        dispatch_gamepad(&frame, Side::Left, &mut edges, &mut sink, &config);
        let any_tl_tr = sink.events.iter().any(|e| {
            matches!(
                e,
                crate::sink::RecordedEvent::GamepadButton(GamepadButton::TL, true)
                    | crate::sink::RecordedEvent::GamepadButton(GamepadButton::TR, true)
            )
        });
        assert!(!any_tl_tr);
    }
}
