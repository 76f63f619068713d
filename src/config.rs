//! Runtime configuration.
//!
//! Per spec.md's Non-goal on persisting calibration/configuration, the
//! driver never writes this file itself. It only optionally reads one that
//! the (out-of-scope) CLI front end points it at; everything here has a
//! documented in-code default so the driver runs with no file at all.

use serde::{Deserialize, Serialize};

/// Tunables spec.md's Open Questions say must be exposed rather than guessed,
/// plus the handful of constants the motion/stick pipeline already treats as
/// fixed in spec.md but which are reasonable to keep adjustable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compatibility swap for the right-device face buttons (X<->Y), see
    /// spec.md §4.7/§9.
    pub swap_xy_right: bool,

    /// Compatibility swap for the left-device rotated d-pad cluster.
    pub swap_xy_left: bool,

    /// Optical sensitivity multiplier applied before the ±200 clamp (§4.6).
    pub motion_sensitivity: f64,

    /// Invert the optical X axis before deadzoning.
    pub invert_optical_x: bool,

    /// Invert the optical Y axis before deadzoning.
    pub invert_optical_y: bool,

    /// Motion pump tick rate in Hz (spec.md default 120).
    pub pump_rate_hz: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            swap_xy_right: true,
            swap_xy_left: true,
            motion_sensitivity: 1.0,
            invert_optical_x: false,
            invert_optical_y: false,
            pump_rate_hz: 120.0,
        }
    }
}

impl Config {
    /// Parse a config from TOML text. The driver itself never calls this
    /// automatically; it is here for the CLI front end to use.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_sane() {
        let cfg = Config::default();
        assert!(cfg.motion_sensitivity > 0.0);
        assert!(cfg.pump_rate_hz > 0.0);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg = Config::from_toml("motion_sensitivity = 1.5\n").unwrap();
        assert_eq!(cfg.motion_sensitivity, 1.5);
        assert!(cfg.swap_xy_right);
    }
}
