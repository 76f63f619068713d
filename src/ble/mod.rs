//! BLE transport: BlueZ D-Bus session management (C2) and the optical
//! sensor bring-up sequence that rides on top of it (C3).

pub mod bringup;
pub mod session;

pub use session::BleSession;
