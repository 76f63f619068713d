//! jc2drv: Joy-Con 2 BLE input driver
//!
//! Translates a live stream of GATT notification frames from a Joy-Con 2
//! into synchronized virtual-input events, either a relative mouse or an
//! Xbox-style gamepad, switchable at runtime.

pub mod ble;
pub mod buttons;
pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod frame;
pub mod mode;
pub mod motion;
pub mod side;
pub mod sink;
pub mod stick;
pub mod supervisor;

pub use config::Config;
pub use driver::JoyCon2Driver;
pub use error::DriverError;
pub use mode::Mode;
pub use side::Side;
pub use sink::{MockSink, UinputSink, VirtualSink};
