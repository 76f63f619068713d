//! C6: motion processor and pump.
//!
//! Two halves cooperate on the same backlog: [`OpticalTracker`] turns raw
//! 16-bit optical counters into deadzoned, clamped deltas on every frame;
//! [`MotionBacklog`] accumulates those deltas and is drained at a fixed rate
//! by [`MotionPump`], which is the only thing allowed to write to the mouse
//! sink's relative axes (spec.md §4.6).

use std::time::{Duration, Instant};

use crate::frame::{delta16, read_optical};
use crate::sink::VirtualSink;

/// Below this magnitude a raw optical delta is treated as sensor noise.
const DEADZONE: i32 = 2;
/// Per-axis clamp applied to a single frame's contribution, after sensitivity.
const PER_FRAME_CLAMP: f64 = 200.0;
/// Idle threshold: no new motion for this long braked the backlog.
const IDLE_THRESHOLD: Duration = Duration::from_millis(60);
/// Multiplier applied to the backlog once idle.
const IDLE_BRAKE: f64 = 0.35;
/// Below this magnitude after braking, snap the accumulator to zero.
const BRAKE_SNAP: f64 = 1.0;
/// Below this per-axis magnitude the pump treats the backlog as empty.
const PUMP_IDLE_EPSILON: f64 = 0.1;

/// Tracks the previous 16-bit optical counters and turns each new frame into
/// a wrap-aware signed delta, honoring the "first frame establishes the
/// baseline and emits zero" rule (spec.md §4.6).
#[derive(Debug, Default)]
pub struct OpticalTracker {
    prev: Option<(u16, u16)>,
}

impl OpticalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset so the next frame re-establishes the baseline. Used on mode
    /// switch and on bring-up retries so a stale baseline never produces a
    /// spurious jump.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    /// Decode the optical slice from `frame` and return the wrap-aware delta
    /// since the previous call, or `None` if the frame is too short to
    /// contain the slice. The very first successful call always returns
    /// `Some((0, 0))`.
    pub fn step(&mut self, frame: &[u8]) -> Option<(i32, i32)> {
        let (x16, y16) = read_optical(frame)?;
        match self.prev {
            None => {
                self.prev = Some((x16, y16));
                Some((0, 0))
            }
            Some((px, py)) => {
                self.prev = Some((x16, y16));
                Some((delta16(x16, px), delta16(y16, py)))
            }
        }
    }
}

/// Per-axis processing applied to a raw optical delta before it is added to
/// the backlog: inversion, deadzone, sensitivity, clamp (spec.md §4.6).
pub fn process_delta(raw: i32, invert: bool, sensitivity: f64) -> f64 {
    if raw.abs() <= DEADZONE {
        return 0.0;
    }
    let signed = if invert { -raw } else { raw };
    let scaled = signed as f64 * sensitivity;
    scaled.clamp(-PER_FRAME_CLAMP, PER_FRAME_CLAMP)
}

/// Fractional accumulator of pending relative motion, drained by
/// [`MotionPump`]. Only mouse-mode frame handling and the pump itself touch
/// this; a mode switch zeroes it (spec.md §3).
#[derive(Debug)]
pub struct MotionBacklog {
    dx_accum: f64,
    dy_accum: f64,
    last_motion_ts: Instant,
}

impl MotionBacklog {
    pub fn new() -> Self {
        Self {
            dx_accum: 0.0,
            dy_accum: 0.0,
            last_motion_ts: Instant::now(),
        }
    }

    /// Add a frame's processed delta. Updates `last_motion_ts` only if
    /// either component is non-zero.
    pub fn add(&mut self, dx: f64, dy: f64) {
        if dx != 0.0 || dy != 0.0 {
            self.dx_accum += dx;
            self.dy_accum += dy;
            self.last_motion_ts = Instant::now();
        }
    }

    /// Zero the backlog, e.g. on mode switch (spec.md §4.8).
    pub fn zero(&mut self) {
        self.dx_accum = 0.0;
        self.dy_accum = 0.0;
    }

    pub fn snapshot(&self) -> (f64, f64) {
        (self.dx_accum, self.dy_accum)
    }
}

impl Default for MotionBacklog {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-rate drain task for [`MotionBacklog`]. Each tick applies idle
/// braking, computes a norm-preserving per-tick budget, emits an integer
/// `REL_X`/`REL_Y` pair plus a synchronisation marker, and subtracts exactly
/// what was emitted (spec.md §4.6).
pub struct MotionPump {
    period: Duration,
}

impl MotionPump {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            period: Duration::from_secs_f64(1.0 / rate_hz),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one tick against `backlog`, emitting through `sink` if there is
    /// anything to send. Returns the integer event emitted, if any.
    pub fn tick(&self, backlog: &mut MotionBacklog, sink: &mut dyn VirtualSink) -> Option<(i32, i32)> {
        let (mut ax, mut ay) = backlog.snapshot();

        if ax.abs() < PUMP_IDLE_EPSILON && ay.abs() < PUMP_IDLE_EPSILON {
            return None;
        }

        if backlog.last_motion_ts.elapsed() > IDLE_THRESHOLD {
            ax *= IDLE_BRAKE;
            ay *= IDLE_BRAKE;
            if ax.abs() < BRAKE_SNAP {
                ax = 0.0;
            }
            if ay.abs() < BRAKE_SNAP {
                ay = 0.0;
            }
            backlog.dx_accum = ax;
            backlog.dy_accum = ay;
        }

        let mag = (ax * ax + ay * ay).sqrt();
        if mag == 0.0 {
            return None;
        }

        let per = (mag * 0.25).clamp(1.0, 60.0);
        let out_dx = ax * per / mag;
        let out_dy = ay * per / mag;
        let ix = out_dx.round() as i32;
        let iy = out_dy.round() as i32;

        if ix == 0 && iy == 0 {
            return None;
        }

        sink.emit_mouse_rel(ix, iy);
        let _ = sink.sync_mouse();

        backlog.dx_accum -= ix as f64;
        backlog.dy_accum -= iy as f64;

        Some((ix, iy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;

    #[test]
    fn optical_tracker_first_frame_is_zero() {
        let mut t = OpticalTracker::new();
        let mut frame = vec![0u8; 0x14];
        frame[0x10] = 0x50;
        assert_eq!(t.step(&frame), Some((0, 0)));
    }

    #[test]
    fn optical_tracker_reports_delta() {
        let mut t = OpticalTracker::new();
        let mut frame = vec![0u8; 0x14];
        frame[0x10] = 0x10; // x16 lo
        t.step(&frame).unwrap();
        frame[0x10] = 0x20;
        assert_eq!(t.step(&frame), Some((16, 0)));
    }

    #[test]
    fn optical_tracker_handles_wrap() {
        let mut t = OpticalTracker::new();
        let mut frame = vec![0u8; 0x14];
        frame[0x10] = 0xF0;
        frame[0x11] = 0xFF;
        t.step(&frame).unwrap();
        frame[0x10] = 0x10;
        frame[0x11] = 0x00;
        assert_eq!(t.step(&frame), Some((32, 0)));
    }

    #[test]
    fn process_delta_deadzones_small_values() {
        assert_eq!(process_delta(2, false, 1.0), 0.0);
        assert_eq!(process_delta(-2, false, 1.0), 0.0);
        assert_ne!(process_delta(3, false, 1.0), 0.0);
    }

    #[test]
    fn process_delta_clamps_and_inverts() {
        assert_eq!(process_delta(10_000, false, 1.0), PER_FRAME_CLAMP);
        assert_eq!(process_delta(10_000, true, 1.0), -PER_FRAME_CLAMP);
    }

    #[test]
    fn scenario_right_device_mouse_motion() {
        let mut tracker = OpticalTracker::new();
        let mut backlog = MotionBacklog::new();
        let mut sink = MockSink::new();

        let frame_a = {
            let mut f = vec![0u8; 0x14];
            f[0x10] = 0x10;
            f
        };
        let frame_b = {
            let mut f = vec![0u8; 0x14];
            f[0x10] = 0x20;
            f
        };

        let (dx0, dy0) = tracker.step(&frame_a).unwrap();
        backlog.add(
            process_delta(dx0, false, 1.0),
            process_delta(dy0, false, 1.0),
        );
        let (dx1, dy1) = tracker.step(&frame_b).unwrap();
        backlog.add(
            process_delta(dx1, false, 1.0),
            process_delta(dy1, false, 1.0),
        );

        let pump = MotionPump::new(120.0);
        let mut total_x = 0;
        let mut total_y = 0;
        for _ in 0..5 {
            if let Some((ix, iy)) = pump.tick(&mut backlog, &mut sink) {
                total_x += ix;
                total_y += iy;
            }
        }

        assert_eq!(total_x, 16);
        assert_eq!(total_y, 0);
        let (rx, ry) = backlog.snapshot();
        assert!(rx.abs() < 1.0);
        assert!(ry.abs() < 1.0);
    }

    #[test]
    fn scenario_wrap_emits_positive_32() {
        let mut tracker = OpticalTracker::new();
        let mut backlog = MotionBacklog::new();
        let mut sink = MockSink::new();

        let mut frame = vec![0u8; 0x14];
        frame[0x10] = 0xF0;
        frame[0x11] = 0xFF;
        let (dx0, dy0) = tracker.step(&frame).unwrap();
        backlog.add(dx0 as f64, dy0 as f64);

        frame[0x10] = 0x10;
        frame[0x11] = 0x00;
        let (dx1, dy1) = tracker.step(&frame).unwrap();
        backlog.add(
            process_delta(dx1, false, 1.0),
            process_delta(dy1, false, 1.0),
        );

        let pump = MotionPump::new(120.0);
        let mut total_x = 0;
        for _ in 0..5 {
            if let Some((ix, _)) = pump.tick(&mut backlog, &mut sink) {
                total_x += ix;
            }
        }
        assert_eq!(total_x, 32);
    }

    #[test]
    fn zero_clears_backlog() {
        let mut backlog = MotionBacklog::new();
        backlog.add(10.0, -5.0);
        backlog.zero();
        assert_eq!(backlog.snapshot(), (0.0, 0.0));
    }
}
