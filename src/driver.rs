//! Top-level orchestrator: one BLE session, one controller, one pair of
//! virtual-input devices. Ties together every other component exactly
//! along the dataflow in spec.md §2: C2 feeds C4, which configures C1/C7;
//! C1's decode branches into C5/C6/C7, all feeding C9; C8 switches what
//! C5/C6/C7 do; C10 and C3 cooperate to heal stalls.

use std::time::Instant;

use log::{debug, info, warn};
use tokio::time::interval;

use crate::ble::bringup::{self, BringupLock};
use crate::ble::session::BleSession;
use crate::buttons::{self, ButtonEdgeMap};
use crate::config::Config;
use crate::error::DriverError;
use crate::frame::{self, optical_bytes_active};
use crate::mode::{Mode, ModeController};
use crate::motion::{process_delta, MotionBacklog, MotionPump, OpticalTracker};
use crate::side::{side_from_first_frame, side_from_manufacturer_data, Layout, Side};
use crate::sink::VirtualSink;
use crate::stick::{gamepad_axes, ScrollIntegrator, StickCalibration};
use crate::supervisor::{Supervisor, Telemetry, WatchdogAction};

/// Top-level driver for exactly one Joy-Con 2 (spec.md's single-controller
/// scope; combining two is explicitly out of scope, see spec.md §9).
pub struct JoyCon2Driver<S: VirtualSink> {
    session: BleSession,
    bringup_lock: BringupLock,
    config: Config,
    sink: S,

    side: Option<Side>,
    layout: Option<Layout>,

    mode_ctrl: ModeController,
    edges: ButtonEdgeMap,
    stick_cal: StickCalibration,
    scroll: ScrollIntegrator,
    optical_tracker: OpticalTracker,
    backlog: MotionBacklog,
    pump: MotionPump,
    supervisor: Supervisor,

    last_notification_ts: Instant,
    last_reinit_ts: Instant,
    last_opt_active_ts: Instant,
    last_frame_ts: Instant,
}

impl<S: VirtualSink> JoyCon2Driver<S> {
    /// Connect to `mac` and run bring-up once before returning a driver
    /// ready for [`JoyCon2Driver::run`].
    pub async fn connect(mac: &str, sink: S, config: Config) -> Result<Self, DriverError> {
        let mut session = BleSession::connect(mac).await?;
        let bringup_lock = bringup::new_lock();
        bringup::run(&mut session, &bringup_lock).await?;

        let side = match session.manufacturer_data().await {
            Some(payload) => side_from_manufacturer_data(&payload),
            None => None,
        };
        if let Some(s) = side {
            info!("side resolved from manufacturer data: {s:?}");
        }

        let now = Instant::now();
        Ok(Self {
            session,
            bringup_lock,
            layout: side.map(Layout::for_side),
            side,
            mode_ctrl: ModeController::new(),
            edges: ButtonEdgeMap::new(),
            stick_cal: StickCalibration::new(false),
            scroll: ScrollIntegrator::new(),
            optical_tracker: OpticalTracker::new(),
            backlog: MotionBacklog::new(),
            pump: MotionPump::new(config.pump_rate_hz),
            supervisor: Supervisor::new(),
            last_notification_ts: now,
            last_reinit_ts: now,
            last_opt_active_ts: now,
            last_frame_ts: now,
            config,
            sink,
        })
    }

    /// Run until the BLE session ends or bring-up is exhausted beyond
    /// recovery. The three logical tasks of spec.md §5 (notification
    /// handler, motion pump, supervisor) are modelled as one cooperative
    /// `select!` loop on a single executor rather than separate OS threads.
    pub async fn run(&mut self) -> Result<(), DriverError> {
        let mut pump_ticker = interval(self.pump.period());
        let mut supervisor_ticker = interval(crate::supervisor::SUPERVISOR_PERIOD);

        loop {
            tokio::select! {
                frame = self.session.recv_frame() => {
                    match frame {
                        Some(frame) => self.handle_frame(&frame),
                        None => {
                            warn!("notification stream ended");
                            return Ok(());
                        }
                    }
                }
                _ = pump_ticker.tick() => {
                    if self.mode_ctrl.mode() == Mode::Mouse {
                        self.pump.tick(&mut self.backlog, &mut self.sink);
                    }
                }
                _ = supervisor_ticker.tick() => {
                    self.run_supervisor_tick().await?;
                }
            }
        }
    }

    fn handle_frame(&mut self, raw: &[u8]) {
        let now = Instant::now();

        if self.side.is_none() {
            if let Some(side) = side_from_first_frame(raw) {
                info!("side resolved from first live frame: {side:?}");
                self.side = Some(side);
                self.layout = Some(Layout::for_side(side));
            } else {
                self.last_notification_ts = now;
                return;
            }
        }
        let side = self.side.expect("checked above");
        let layout = self.layout.expect("set alongside side");

        if let Some((x, y)) = frame::read_stick(raw, layout.stick_offset) {
            self.stick_cal.observe(x, y);
            match self.mode_ctrl.mode() {
                Mode::Mouse => {
                    if let Some((_, cy)) = self.stick_cal.center() {
                        let dt = now.duration_since(self.last_frame_ts).as_secs_f64();
                        if let Some((lores, hires)) = self.scroll.tick(y as f64 - cy, dt) {
                            self.sink.emit_wheel(lores, hires);
                            let _ = self.sink.sync_mouse();
                        }
                    }
                }
                Mode::Gamepad => {
                    if let Some((cx, cy)) = self.stick_cal.center() {
                        let (ax, ay) = gamepad_axes(x, y, cx, cy, side);
                        self.sink.emit_gamepad_axes(ax, ay);
                        let _ = self.sink.sync_gamepad();
                    }
                }
            }
        }

        let chord_active = self.mode_ctrl.chord_active(raw, side);
        match self.mode_ctrl.mode() {
            Mode::Mouse => {
                buttons::dispatch_mouse(raw, side, &mut self.edges, &mut self.sink, chord_active);
            }
            Mode::Gamepad => {
                buttons::dispatch_gamepad(raw, side, &mut self.edges, &mut self.sink, &self.config);
            }
        }

        if let Some((raw_dx, raw_dy)) = self.optical_tracker.step(raw) {
            if self.mode_ctrl.mode() == Mode::Mouse {
                let dx = process_delta(raw_dx, self.config.invert_optical_x, self.config.motion_sensitivity);
                let dy = process_delta(raw_dy, self.config.invert_optical_y, self.config.motion_sensitivity);
                self.backlog.add(dx, dy);
            }
        }
        if optical_bytes_active(raw) {
            self.last_opt_active_ts = now;
        }

        if self.mode_ctrl.update(raw, side, now) {
            self.on_mode_switch(now);
        }

        self.last_notification_ts = now;
        self.last_frame_ts = now;
    }

    fn on_mode_switch(&mut self, now: Instant) {
        let mode = self.mode_ctrl.mode();
        info!("mode switched to {mode:?}");
        self.edges.release_all(&mut self.sink);
        self.backlog.zero();
        self.scroll.zero();
        self.optical_tracker.reset();
        self.stick_cal = StickCalibration::new(mode == Mode::Gamepad);
        if mode == Mode::Gamepad {
            self.last_opt_active_ts = now;
        }
    }

    async fn run_supervisor_tick(&mut self) -> Result<(), DriverError> {
        let telemetry = Telemetry {
            now: Instant::now(),
            last_notification_ts: self.last_notification_ts,
            last_reinit_ts: self.last_reinit_ts,
            last_opt_active_ts: self.last_opt_active_ts,
            mode: self.mode_ctrl.mode(),
        };

        match self.supervisor.check(&telemetry) {
            WatchdogAction::None => {}
            WatchdogAction::NotificationStall | WatchdogAction::OpticalIdle => {
                debug!("supervisor triggering bring-up retry");
                bringup::run(&mut self.session, &self.bringup_lock).await?;
                self.last_reinit_ts = Instant::now();
            }
        }
        Ok(())
    }
}
