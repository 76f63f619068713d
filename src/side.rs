//! C4: side/layout detection.
//!
//! A Joy-Con 2's byte offsets and button semantics depend on which physical
//! half of the controller it is; this module resolves that once per session
//! and hands out the fixed [`Layout`] the rest of the pipeline indexes with.

use crate::constants::*;

/// Which physical half of the controller is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Resolved byte offsets for a side, fixed for the lifetime of the session
/// once known (spec.md §3: "Once side transitions out of unknown, the
/// offset set is fixed for the session").
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub side: Side,
    pub face_offset: usize,
    pub misc_offset: usize,
    pub stick_offset: usize,
}

impl Layout {
    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Left => Layout {
                side,
                face_offset: LEFT_FACE_OFFSET,
                misc_offset: LEFT_MISC_OFFSET,
                stick_offset: LEFT_STICK_OFFSET,
            },
            Side::Right => Layout {
                side,
                face_offset: RIGHT_FACE_OFFSET,
                misc_offset: RIGHT_MISC_OFFSET,
                stick_offset: RIGHT_STICK_OFFSET,
            },
        }
    }
}

/// Decode the side byte out of a raw 24-byte Nintendo manufacturer-data
/// payload. The payload is only trusted if it carries the expected 5-byte
/// prefix (spec.md §4.4).
pub fn side_from_manufacturer_data(payload: &[u8]) -> Option<Side> {
    if payload.len() < 6 || payload[..5] != JOYCON_DATA_PREFIX {
        return None;
    }
    match payload[5] {
        SIDE_BYTE_RIGHT => Some(Side::Right),
        SIDE_BYTE_LEFT => Some(Side::Left),
        _ => None,
    }
}

/// Fallback heuristic when manufacturer data is unavailable: inspect the
/// first live frame. Bits populated at the left-device d-pad byte suggest
/// left; bits populated at the right-device face byte suggest right
/// (spec.md §4.4).
pub fn side_from_first_frame(frame: &[u8]) -> Option<Side> {
    let left_face_nonzero = frame.get(LEFT_FACE_OFFSET).copied().unwrap_or(0) != 0;
    let right_face_nonzero = frame.get(RIGHT_FACE_OFFSET).copied().unwrap_or(0) != 0;
    match (left_face_nonzero, right_face_nonzero) {
        (true, false) => Some(Side::Left),
        (false, true) => Some(Side::Right),
        _ => None,
    }
}
