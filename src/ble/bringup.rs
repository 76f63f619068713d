//! C3: optical sensor bring-up.
//!
//! From a connected, GATT-discovered session, get the device emitting
//! frames with its optical block able to produce deltas. Retried under a
//! shared mutex (spec.md §3, §5: `bringup_lock`) so the supervisor and the
//! start-up path never interleave their retry sequences.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::ble::session::BleSession;
use crate::constants::OPTICAL_INIT_FRAMES;
use crate::error::DriverError;

/// `(attempt_delay, stop_start_cycle)` schedule tried in order until a
/// notification arrives (spec.md §4.3).
const ATTEMPT_SCHEDULE: [(f64, bool); 4] = [(0.10, false), (0.20, true), (0.35, true), (0.50, true)];

const CYCLE_STOP_SETTLE: Duration = Duration::from_millis(50);
const FIRST_NOTIFICATION_PROBE: Duration = Duration::from_secs(1);

/// Guards any sequence of start-notify + control writes + wait-for-notify
/// so the supervisor's retries and the start-up path's retries cannot
/// interleave (spec.md §5).
pub type BringupLock = Arc<Mutex<()>>;

pub fn new_lock() -> BringupLock {
    Arc::new(Mutex::new(()))
}

/// Run the bring-up attempt schedule. On success, notifications are
/// enabled and flowing; the caller should keep draining `session.recv_frame()`.
/// Optical bytes may legitimately stay zero until the sensor sees motion —
/// that is not treated as failure here, only the absence of any
/// notification at all is (spec.md §4.3).
pub async fn run(session: &mut BleSession, lock: &BringupLock) -> Result<(), DriverError> {
    let _guard = lock.lock().await;

    for (idx, &(delay_secs, cycle)) in ATTEMPT_SCHEDULE.iter().enumerate() {
        debug!("optical bring-up attempt {idx}: delay={delay_secs}s cycle={cycle}");

        if cycle {
            let _ = session.disable_notifications().await;
            tokio::time::sleep(CYCLE_STOP_SETTLE).await;
        }

        session.enable_notifications().await?;
        tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;

        for frame in OPTICAL_INIT_FRAMES {
            session.write_control(&frame).await?;
        }

        if timeout(FIRST_NOTIFICATION_PROBE, session.recv_frame())
            .await
            .ok()
            .flatten()
            .is_some()
        {
            info!("optical bring-up succeeded on attempt {idx}");
            return Ok(());
        }
    }

    warn!("optical bring-up exhausted its attempt schedule");
    Err(DriverError::BringupExhausted)
}
