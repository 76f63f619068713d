//! Wire constants for the Joy-Con 2 vendor GATT profile (spec.md §6.1).

use uuid::Uuid;

/// Nintendo Co., Ltd. company id for BLE manufacturer data.
pub const NINTENDO_COMPANY_ID: u16 = 0x0553;

/// Manufacturer-data prefix that identifies a Joy-Con 2 payload.
pub const JOYCON_DATA_PREFIX: [u8; 5] = [0x01, 0x00, 0x03, 0x7e, 0x05];

/// Side byte (offset 5 of the manufacturer-data payload) for a right Joy-Con 2.
pub const SIDE_BYTE_RIGHT: u8 = 0x66;
/// Side byte for a left Joy-Con 2.
pub const SIDE_BYTE_LEFT: u8 = 0x67;

/// Notify characteristic (controller -> host input reports).
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xab7de9be_89fe_49ad_828f_118f09df7fd2);

/// Control characteristic (host -> controller commands).
pub const CONTROL_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x649d4ac9_8eb7_4e6c_af44_1ea54fe5f005);

/// Vendor optical-enable frames, written to the control characteristic with
/// write-type "command" (write-without-response). Order matters.
pub const OPTICAL_INIT_FRAMES: [[u8; 12]; 2] = [
    [0x0c, 0x91, 0x01, 0x02, 0x00, 0x04, 0x00, 0x00, 0xff, 0x00, 0x00, 0x00],
    [0x0c, 0x91, 0x01, 0x04, 0x00, 0x04, 0x00, 0x00, 0xff, 0x00, 0x00, 0x00],
];

/// Offset of the optical slice within a notification frame.
pub const OPTICAL_OFFSET: usize = 0x0F;
/// Length of the optical slice.
pub const OPTICAL_LEN: usize = 5;

/// Right-device face-button byte offset and masks.
pub const RIGHT_FACE_OFFSET: usize = 4;
pub mod right_face {
    pub const Y: u8 = 0x01;
    pub const X: u8 = 0x02;
    pub const B: u8 = 0x04;
    pub const A: u8 = 0x08;
    pub const SR: u8 = 0x10;
    pub const SL: u8 = 0x20;
    pub const L: u8 = 0x40;
    pub const ZL: u8 = 0x80;
}

/// Right-device misc-button byte offset and masks.
pub const RIGHT_MISC_OFFSET: usize = 5;
pub mod right_misc {
    pub const PLUS: u8 = 0x02;
    pub const R3: u8 = 0x04;
    pub const HOME: u8 = 0x10;
    pub const C: u8 = 0x40;
}

/// Left-device misc-button byte offset and masks.
pub const LEFT_MISC_OFFSET: usize = 5;
pub mod left_misc {
    pub const MINUS: u8 = 0x01;
    pub const L3: u8 = 0x08;
    pub const CAPTURE: u8 = 0x20;
}

/// Left-device face/d-pad byte offset and masks.
pub const LEFT_FACE_OFFSET: usize = 6;
pub mod left_face {
    pub const DDOWN: u8 = 0x01;
    pub const DUP: u8 = 0x02;
    pub const DRIGHT: u8 = 0x04;
    pub const DLEFT: u8 = 0x08;
    pub const SR: u8 = 0x10;
    pub const SL: u8 = 0x20;
    pub const L: u8 = 0x40;
    pub const ZL: u8 = 0x80;
}

/// Stick triplet offsets, by side.
pub const LEFT_STICK_OFFSET: usize = 10;
pub const RIGHT_STICK_OFFSET: usize = 13;

/// Minimum plausible frame length (the optical slice ends at 0x13).
pub const MIN_FRAME_LEN: usize = OPTICAL_OFFSET + OPTICAL_LEN;
