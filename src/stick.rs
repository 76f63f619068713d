//! C5: stick calibrator and per-mode mapper.
//!
//! Startup median calibration feeds a slow recenter; from there the same
//! deflection vector is dispatched two ways depending on the active mode:
//! a continuous scroll-rate integrator in mouse mode, or rotated absolute
//! axes in gamepad mode (spec.md §4.5).

use crate::side::Side;

const RECENTER_RADIUS: f64 = 25.0;
const RECENTER_ALPHA: f64 = 0.02;

const MOUSE_CALIBRATION_SAMPLES: usize = 25;
const GAMEPAD_CALIBRATION_SAMPLES: usize = 5;

const WHEEL_DEADZONE: f64 = 70.0;
const WHEEL_SATURATION: f64 = 2048.0;
const WHEEL_MAX_RATE_LINES_PER_SEC: f64 = 20.0;
const WHEEL_CURVE_EXPONENT: f64 = 1.6;
const WHEEL_HIRES_UNITS_PER_LINE: f64 = 120.0;
const WHEEL_MAX_HIRES_PER_TICK: i32 = 3 * 120;
const WHEEL_MAX_LORES_PER_TICK: i32 = 3;
pub const DT_MIN: f64 = 1.0 / 240.0;
pub const DT_MAX: f64 = 1.0 / 10.0;

const AXIS_DEADZONE: f64 = 70.0;
const AXIS_SATURATION: f64 = 2048.0;
const AXIS_OUT_MIN: f64 = 0.0;
const AXIS_OUT_MAX: f64 = 65535.0;
const AXIS_OUT_CENTER: f64 = 32768.0;

/// Startup calibration state for one stick. Collects samples until the
/// mode-appropriate threshold is reached, then freezes to a median-derived
/// center that a later gentle recenter nudges (spec.md §3, §4.5).
#[derive(Debug, Clone)]
pub enum StickCalibration {
    Uncalibrated {
        samples_x: Vec<u16>,
        samples_y: Vec<u16>,
        threshold: usize,
    },
    Calibrated {
        cx: f64,
        cy: f64,
    },
}

impl StickCalibration {
    pub fn new(gamepad_mode: bool) -> Self {
        let threshold = if gamepad_mode {
            GAMEPAD_CALIBRATION_SAMPLES
        } else {
            MOUSE_CALIBRATION_SAMPLES
        };
        StickCalibration::Uncalibrated {
            samples_x: Vec::with_capacity(threshold),
            samples_y: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Feed one raw sample. While uncalibrated, accumulates towards the
    /// median; once calibrated, applies the recenter rule.
    pub fn observe(&mut self, x: u16, y: u16) {
        match self {
            StickCalibration::Uncalibrated {
                samples_x,
                samples_y,
                threshold,
            } => {
                samples_x.push(x);
                samples_y.push(y);
                if samples_x.len() >= *threshold {
                    let cx = median(samples_x);
                    let cy = median(samples_y);
                    *self = StickCalibration::Calibrated { cx, cy };
                }
            }
            StickCalibration::Calibrated { cx, cy } => {
                let within = (x as f64 - *cx).abs() <= RECENTER_RADIUS
                    && (y as f64 - *cy).abs() <= RECENTER_RADIUS;
                if within {
                    *cx = *cx * (1.0 - RECENTER_ALPHA) + x as f64 * RECENTER_ALPHA;
                    *cy = *cy * (1.0 - RECENTER_ALPHA) + y as f64 * RECENTER_ALPHA;
                }
            }
        }
    }

    pub fn center(&self) -> Option<(f64, f64)> {
        match self {
            StickCalibration::Calibrated { cx, cy } => Some((*cx, *cy)),
            StickCalibration::Uncalibrated { .. } => None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self, StickCalibration::Calibrated { .. })
    }
}

fn median(samples: &[u16]) -> f64 {
    let mut sorted: Vec<u16> = samples.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    }
}

/// Mouse-mode scroll integrator. Owns its own fractional accumulator,
/// independent of the motion backlog (spec.md §3: "only mouse mode writes
/// [the scroll accumulator]; mode transitions zero it").
#[derive(Debug, Default)]
pub struct ScrollIntegrator {
    wheel_accum: f64,
}

impl ScrollIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zero(&mut self) {
        self.wheel_accum = 0.0;
    }

    /// Advance the integrator by one frame given the stick's `dy` deflection
    /// from center and the inter-frame `dt` (already clamped to
    /// `[DT_MIN, DT_MAX]` by the caller, per spec.md §9's note to carry `dt`
    /// explicitly rather than cache it). Returns `(lores_steps, hires_units)`
    /// to emit this tick, or `None` if nothing crosses the deadzone.
    pub fn tick(&mut self, dy: f64, dt: f64) -> Option<(i32, i32)> {
        let dt = dt.clamp(DT_MIN, DT_MAX);
        let mag = dy.abs();
        if mag <= WHEEL_DEADZONE {
            return None;
        }
        let n = ((mag.min(WHEEL_SATURATION) - WHEEL_DEADZONE)
            / (WHEEL_SATURATION - WHEEL_DEADZONE))
            .clamp(0.0, 1.0);
        let rate = n.powf(WHEEL_CURVE_EXPONENT) * WHEEL_MAX_RATE_LINES_PER_SEC;
        let signed_rate = if dy < 0.0 { -rate } else { rate };
        self.wheel_accum += signed_rate * dt;

        let hires_raw = (self.wheel_accum * WHEEL_HIRES_UNITS_PER_LINE).round() as i32;
        let hires = hires_raw.clamp(-WHEEL_MAX_HIRES_PER_TICK, WHEEL_MAX_HIRES_PER_TICK);
        if hires == 0 {
            return None;
        }

        // Low-res steps are an independent readout of the same accumulator
        // (whole lines), not derived from the hi-res value, so a line can
        // register here well below the 60-hi-res-unit threshold above.
        let lores = self
            .wheel_accum
            .round()
            .clamp(-(WHEEL_MAX_LORES_PER_TICK as f64), WHEEL_MAX_LORES_PER_TICK as f64)
            as i32;

        self.wheel_accum -= hires as f64 / WHEEL_HIRES_UNITS_PER_LINE;

        Some((lores, hires))
    }
}

/// Map a calibrated stick sample to absolute gamepad axes, rotated by side
/// and with the final X axis inverted (spec.md §4.5).
pub fn gamepad_axes(x: u16, y: u16, cx: f64, cy: f64, side: Side) -> (u16, u16) {
    let mut dx = x as f64 - cx;
    let mut dy = cy - y as f64;

    if dx.abs() <= AXIS_DEADZONE {
        dx = 0.0;
    }
    if dy.abs() <= AXIS_DEADZONE {
        dy = 0.0;
    }

    let (rx, ry) = match side {
        Side::Left => (-dy, dx),
        Side::Right => (dy, -dx),
    };

    let rx = rx.clamp(-AXIS_SATURATION, AXIS_SATURATION);
    let ry = ry.clamp(-AXIS_SATURATION, AXIS_SATURATION);

    let map = |v: f64| -> f64 {
        let scale = (AXIS_OUT_MAX - AXIS_OUT_CENTER) / AXIS_SATURATION;
        (AXIS_OUT_CENTER + v * scale).clamp(AXIS_OUT_MIN, AXIS_OUT_MAX)
    };

    let ax = map(rx).round();
    let ay = map(ry).round();
    let ax_inverted = (AXIS_OUT_MAX - ax).clamp(AXIS_OUT_MIN, AXIS_OUT_MAX);

    (ax_inverted as u16, ay as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_reaches_median_after_threshold() {
        let mut cal = StickCalibration::new(true);
        for &(x, y) in &[(2000, 2000), (2004, 1996), (2002, 1998), (1998, 2002), (2000, 2000)] {
            cal.observe(x, y);
        }
        assert!(cal.is_calibrated());
        let (cx, cy) = cal.center().unwrap();
        assert_eq!(cx, 2000.0);
        assert_eq!(cy, 2000.0);
    }

    #[test]
    fn calibration_recenters_within_radius() {
        let mut cal = StickCalibration::Calibrated { cx: 2000.0, cy: 2000.0 };
        cal.observe(2010, 2000);
        let (cx, _) = cal.center().unwrap();
        assert!((cx - 2000.2).abs() < 1e-9);
    }

    #[test]
    fn calibration_does_not_recenter_outside_radius() {
        let mut cal = StickCalibration::Calibrated { cx: 2000.0, cy: 2000.0 };
        cal.observe(2100, 2000);
        let (cx, _) = cal.center().unwrap();
        assert_eq!(cx, 2000.0);
    }

    #[test]
    fn scroll_integrator_below_deadzone_emits_nothing() {
        let mut scroll = ScrollIntegrator::new();
        assert_eq!(scroll.tick(50.0, 1.0 / 120.0), None);
    }

    #[test]
    fn scroll_integrator_emits_monotone_with_duration() {
        let mut a = ScrollIntegrator::new();
        let mut b = ScrollIntegrator::new();
        let mut sum_a = 0i32;
        let mut sum_b = 0i32;
        for _ in 0..10 {
            if let Some((_, hr)) = a.tick(500.0, 1.0 / 120.0) {
                sum_a += hr;
            }
        }
        for _ in 0..30 {
            if let Some((_, hr)) = b.tick(500.0, 1.0 / 120.0) {
                sum_b += hr;
            }
        }
        assert!(sum_b >= sum_a);
    }

    #[test]
    fn scroll_integrator_emits_monotone_with_deflection() {
        let mut small = ScrollIntegrator::new();
        let mut large = ScrollIntegrator::new();
        let mut sum_small = 0i32;
        let mut sum_large = 0i32;
        for _ in 0..10 {
            if let Some((_, hr)) = small.tick(200.0, 1.0 / 120.0) {
                sum_small += hr;
            }
            if let Some((_, hr)) = large.tick(2000.0, 1.0 / 120.0) {
                sum_large += hr;
            }
        }
        assert!(sum_large >= sum_small);
    }

    #[test]
    fn gamepad_axes_centered_at_neutral() {
        let (ax, ay) = gamepad_axes(2000, 2000, 2000.0, 2000.0, Side::Right);
        assert_eq!(ax, 32768);
        assert_eq!(ay, 32768);
    }

    #[test]
    fn gamepad_axes_rotate_by_side() {
        let (ax_r, _) = gamepad_axes(3000, 2000, 2000.0, 2000.0, Side::Right);
        let (ax_l, _) = gamepad_axes(3000, 2000, 2000.0, 2000.0, Side::Left);
        assert_ne!(ax_r, ax_l);
    }

    #[test]
    fn gamepad_axes_respects_deadzone() {
        let (ax, ay) = gamepad_axes(2030, 1975, 2000.0, 2000.0, Side::Right);
        assert_eq!(ax, 32768);
        assert_eq!(ay, 32768);
    }
}
