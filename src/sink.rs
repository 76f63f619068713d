//! C9: virtual input sink.
//!
//! Everything upstream (motion pump, stick mapper, button dispatcher) talks
//! to a [`VirtualSink`] trait instead of a concrete uinput device, so the
//! scenario tests in `tests/` can drive the whole pipeline against
//! [`MockSink`] without a real `/dev/uinput` (spec.md §8).

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, InputEvent, InputId, Key,
    RelativeAxisType, UinputAbsSetup,
};

use crate::error::DriverError;

/// Mouse buttons the right-device mouse mode can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl From<MouseButton> for Key {
    fn from(b: MouseButton) -> Key {
        match b {
            MouseButton::Left => Key::BTN_LEFT,
            MouseButton::Right => Key::BTN_RIGHT,
            MouseButton::Middle => Key::BTN_MIDDLE,
        }
    }
}

/// Gamepad buttons a single Joy-Con 2 half can emit in gamepad mode. Both
/// sides share one logical button set (spec.md §4.7); the caller maps the
/// side's physical buttons into this set before calling the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GamepadButton {
    South,
    East,
    West,
    North,
    TL,
    TR,
    Select,
    Start,
    Mode,
    ThumbL,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

impl From<GamepadButton> for Key {
    fn from(b: GamepadButton) -> Key {
        match b {
            GamepadButton::South => Key::BTN_SOUTH,
            GamepadButton::East => Key::BTN_EAST,
            GamepadButton::West => Key::BTN_WEST,
            GamepadButton::North => Key::BTN_NORTH,
            GamepadButton::TL => Key::BTN_TL,
            GamepadButton::TR => Key::BTN_TR,
            GamepadButton::Select => Key::BTN_SELECT,
            GamepadButton::Start => Key::BTN_START,
            GamepadButton::Mode => Key::BTN_MODE,
            GamepadButton::ThumbL => Key::BTN_THUMBL,
            GamepadButton::DpadUp => Key::BTN_DPAD_UP,
            GamepadButton::DpadDown => Key::BTN_DPAD_DOWN,
            GamepadButton::DpadLeft => Key::BTN_DPAD_LEFT,
            GamepadButton::DpadRight => Key::BTN_DPAD_RIGHT,
        }
    }
}

/// Everything the input pipeline emits, abstracted away from the concrete
/// uinput devices. Each `sync_*` call is the synchronisation boundary spec.md
/// §4.9 requires at the end of every logical emission unit.
pub trait VirtualSink: Send {
    fn emit_mouse_rel(&mut self, dx: i32, dy: i32);
    fn emit_wheel(&mut self, lores_steps: i32, hires_units: i32);
    fn emit_mouse_button(&mut self, button: MouseButton, pressed: bool);
    fn sync_mouse(&mut self) -> Result<(), DriverError>;

    fn emit_gamepad_button(&mut self, button: GamepadButton, pressed: bool);
    fn emit_gamepad_axes(&mut self, x: u16, y: u16);
    fn sync_gamepad(&mut self) -> Result<(), DriverError>;
}

/// Vendor/product pair distinct from any real device, so the kernel and
/// userspace input stacks never confuse these for a genuine Nintendo
/// product (spec.md §4.9).
const VIRTUAL_VENDOR: u16 = 0x2e8a;
const VIRTUAL_PRODUCT_MOUSE: u16 = 0xc001;
const VIRTUAL_PRODUCT_GAMEPAD: u16 = 0xc002;

/// Stick axis range the gamepad device advertises; matches the mapped
/// `[0, 65535]` range `stick::gamepad_axes` emits into (spec.md §4.9), not
/// the 12-bit wire range the raw samples arrive in.
const STICK_AXIS_MAX: i32 = 65535;
const STICK_AXIS_FLAT: i32 = 512;

/// Real sink backed by two uinput virtual devices (one relative mouse, one
/// absolute gamepad), built once at construction and driven by `side`'s MAC
/// so two drivers running side by side never collide on device identity.
pub struct UinputSink {
    mouse: VirtualDevice,
    mouse_events: Vec<InputEvent>,
    gamepad: VirtualDevice,
    gamepad_events: Vec<InputEvent>,
}

impl UinputSink {
    pub fn new(identity: &str) -> Result<Self, DriverError> {
        let mouse = build_mouse_device(identity).map_err(|e| DriverError::Sink(e.to_string()))?;
        let gamepad =
            build_gamepad_device(identity).map_err(|e| DriverError::Sink(e.to_string()))?;
        Ok(Self {
            mouse,
            mouse_events: Vec::new(),
            gamepad,
            gamepad_events: Vec::new(),
        })
    }
}

fn build_mouse_device(identity: &str) -> std::io::Result<VirtualDevice> {
    let mut keys = AttributeSet::new();
    keys.insert(Key::BTN_LEFT);
    keys.insert(Key::BTN_RIGHT);
    keys.insert(Key::BTN_MIDDLE);

    let mut rel_axes = AttributeSet::new();
    rel_axes.insert(RelativeAxisType::REL_X);
    rel_axes.insert(RelativeAxisType::REL_Y);
    rel_axes.insert(RelativeAxisType::REL_WHEEL);
    rel_axes.insert(RelativeAxisType::REL_WHEEL_HI_RES);

    VirtualDeviceBuilder::new()?
        .input_id(InputId::new(
            BusType::BUS_VIRTUAL,
            VIRTUAL_VENDOR,
            VIRTUAL_PRODUCT_MOUSE,
            1,
        ))
        .name(&format!("jc2drv mouse ({identity})"))
        .with_keys(&keys)?
        .with_relative_axes(&rel_axes)?
        .build()
}

fn build_gamepad_device(identity: &str) -> std::io::Result<VirtualDevice> {
    let mut keys = AttributeSet::new();
    for key in [
        Key::BTN_SOUTH,
        Key::BTN_EAST,
        Key::BTN_WEST,
        Key::BTN_NORTH,
        Key::BTN_TL,
        Key::BTN_TR,
        Key::BTN_SELECT,
        Key::BTN_START,
        Key::BTN_MODE,
        Key::BTN_THUMBL,
        Key::BTN_DPAD_UP,
        Key::BTN_DPAD_DOWN,
        Key::BTN_DPAD_LEFT,
        Key::BTN_DPAD_RIGHT,
    ] {
        keys.insert(key);
    }

    let axis_info = AbsInfo::new(32768, 0, STICK_AXIS_MAX, 0, STICK_AXIS_FLAT, 0);

    VirtualDeviceBuilder::new()?
        .input_id(InputId::new(
            BusType::BUS_VIRTUAL,
            VIRTUAL_VENDOR,
            VIRTUAL_PRODUCT_GAMEPAD,
            1,
        ))
        .name(&format!("jc2drv gamepad ({identity})"))
        .with_keys(&keys)?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisType::ABS_X, axis_info))?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisType::ABS_Y, axis_info))?
        .build()
}

impl VirtualSink for UinputSink {
    fn emit_mouse_rel(&mut self, dx: i32, dy: i32) {
        if dx != 0 {
            self.mouse_events.push(InputEvent::new(
                EventType::RELATIVE,
                RelativeAxisType::REL_X.0,
                dx,
            ));
        }
        if dy != 0 {
            self.mouse_events.push(InputEvent::new(
                EventType::RELATIVE,
                RelativeAxisType::REL_Y.0,
                dy,
            ));
        }
    }

    fn emit_wheel(&mut self, lores_steps: i32, hires_units: i32) {
        if lores_steps != 0 {
            self.mouse_events.push(InputEvent::new(
                EventType::RELATIVE,
                RelativeAxisType::REL_WHEEL.0,
                lores_steps,
            ));
        }
        if hires_units != 0 {
            self.mouse_events.push(InputEvent::new(
                EventType::RELATIVE,
                RelativeAxisType::REL_WHEEL_HI_RES.0,
                hires_units,
            ));
        }
    }

    fn emit_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        let key: Key = button.into();
        self.mouse_events.push(InputEvent::new(
            EventType::KEY,
            key.code(),
            pressed as i32,
        ));
    }

    fn sync_mouse(&mut self) -> Result<(), DriverError> {
        if self.mouse_events.is_empty() {
            return Ok(());
        }
        self.mouse
            .emit(&self.mouse_events)
            .map_err(|e| DriverError::Sink(e.to_string()))?;
        self.mouse_events.clear();
        Ok(())
    }

    fn emit_gamepad_button(&mut self, button: GamepadButton, pressed: bool) {
        let key: Key = button.into();
        self.gamepad_events.push(InputEvent::new(
            EventType::KEY,
            key.code(),
            pressed as i32,
        ));
    }

    fn emit_gamepad_axes(&mut self, x: u16, y: u16) {
        self.gamepad_events.push(InputEvent::new(
            EventType::ABSOLUTE,
            AbsoluteAxisType::ABS_X.0,
            x as i32,
        ));
        self.gamepad_events.push(InputEvent::new(
            EventType::ABSOLUTE,
            AbsoluteAxisType::ABS_Y.0,
            y as i32,
        ));
    }

    fn sync_gamepad(&mut self) -> Result<(), DriverError> {
        if self.gamepad_events.is_empty() {
            return Ok(());
        }
        self.gamepad
            .emit(&self.gamepad_events)
            .map_err(|e| DriverError::Sink(e.to_string()))?;
        self.gamepad_events.clear();
        Ok(())
    }
}

/// Recorded event, for assertions in scenario tests.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    MouseRel(i32, i32),
    Wheel(i32, i32),
    MouseButton(MouseButton, bool),
    MouseSync,
    GamepadButton(GamepadButton, bool),
    GamepadAxes(u16, u16),
    GamepadSync,
}

/// Test double that records every emission instead of touching `/dev/uinput`,
/// in the teacher's mock-backend style (`backend::mock_mouse`).
#[derive(Debug, Default)]
pub struct MockSink {
    pub events: Vec<RecordedEvent>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VirtualSink for MockSink {
    fn emit_mouse_rel(&mut self, dx: i32, dy: i32) {
        self.events.push(RecordedEvent::MouseRel(dx, dy));
    }

    fn emit_wheel(&mut self, lores_steps: i32, hires_units: i32) {
        self.events
            .push(RecordedEvent::Wheel(lores_steps, hires_units));
    }

    fn emit_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        self.events
            .push(RecordedEvent::MouseButton(button, pressed));
    }

    fn sync_mouse(&mut self) -> Result<(), DriverError> {
        self.events.push(RecordedEvent::MouseSync);
        Ok(())
    }

    fn emit_gamepad_button(&mut self, button: GamepadButton, pressed: bool) {
        self.events
            .push(RecordedEvent::GamepadButton(button, pressed));
    }

    fn emit_gamepad_axes(&mut self, x: u16, y: u16) {
        self.events.push(RecordedEvent::GamepadAxes(x, y));
    }

    fn sync_gamepad(&mut self) -> Result<(), DriverError> {
        self.events.push(RecordedEvent::GamepadSync);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_sink_records_mouse_motion_then_sync() {
        let mut sink = MockSink::new();
        sink.emit_mouse_rel(3, -2);
        sink.sync_mouse().unwrap();
        assert_eq!(
            sink.events,
            vec![RecordedEvent::MouseRel(3, -2), RecordedEvent::MouseSync]
        );
    }

    #[test]
    fn mock_sink_records_button_edges() {
        let mut sink = MockSink::new();
        sink.emit_mouse_button(MouseButton::Left, true);
        sink.emit_mouse_button(MouseButton::Left, false);
        assert_eq!(
            sink.events,
            vec![
                RecordedEvent::MouseButton(MouseButton::Left, true),
                RecordedEvent::MouseButton(MouseButton::Left, false),
            ]
        );
    }

    #[test]
    fn mock_sink_gamepad_axes_and_sync() {
        let mut sink = MockSink::new();
        sink.emit_gamepad_axes(2048, 2048);
        sink.emit_gamepad_button(GamepadButton::South, true);
        sink.sync_gamepad().unwrap();
        assert_eq!(
            sink.events,
            vec![
                RecordedEvent::GamepadAxes(2048, 2048),
                RecordedEvent::GamepadButton(GamepadButton::South, true),
                RecordedEvent::GamepadSync,
            ]
        );
    }
}
