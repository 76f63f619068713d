//! Driver error type.
//!
//! Every fault the core can hit is represented as a variant here rather than
//! inspected by message text, so the supervisor (see [`crate::supervisor`])
//! can decide retry policy from the error's *kind* per spec.

use thiserror::Error;

/// All errors the driver can produce.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The MAC address has no matching device object in the BlueZ object tree.
    #[error("device {0} not found on the BlueZ object tree")]
    DeviceNotFound(String),

    /// `ServicesResolved` never became true within the timeout.
    #[error("services did not resolve within {0:?}")]
    ServicesResolvedTimeout(std::time::Duration),

    /// The two vendor characteristics never appeared under the device path.
    #[error("GATT characteristic discovery timed out after {0:?}")]
    CharacteristicDiscoveryTimeout(std::time::Duration),

    /// A control write or notify-enable call did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    WriteTimeout {
        operation: &'static str,
        timeout: std::time::Duration,
    },

    /// No notification arrived for longer than the stall threshold.
    #[error("no notification for {0:?}")]
    NotificationStall(std::time::Duration),

    /// Notifications are flowing but the optical sensor looks inactive.
    #[error("optical sensor idle for {0:?}")]
    OpticalIdle(std::time::Duration),

    /// The full bring-up attempt schedule ran out without success.
    #[error("optical bring-up exhausted its attempt schedule")]
    BringupExhausted,

    /// A D-Bus call failed in a way that is not one of the transient cases
    /// the session manager is documented to swallow (spec §4.2/§7).
    #[error("D-Bus call failed: {0}")]
    Dbus(#[from] zbus::Error),

    /// Creating or writing to the virtual input device failed.
    #[error("virtual input sink error: {0}")]
    Sink(String),
}

impl DriverError {
    /// True for faults the supervisor or bring-up loop may retry; false for
    /// faults that should be surfaced to the caller immediately (spec §7).
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            DriverError::DeviceNotFound(_)
                | DriverError::ServicesResolvedTimeout(_)
                | DriverError::CharacteristicDiscoveryTimeout(_)
                | DriverError::BringupExhausted
        )
    }
}

/// A transient D-Bus error the session manager swallows rather than
/// propagates (spec §4.2: "In Progress"/"InProgress", "already connected").
pub fn is_transient(err: &zbus::Error) -> bool {
    let msg = err.to_string();
    msg.contains("In Progress")
        || msg.contains("InProgress")
        || msg.contains("already connected")
        || msg.contains("Already")
}
