//! C2: BLE session manager.
//!
//! Talks to BlueZ directly over its D-Bus object-manager interface rather
//! than through a cross-platform BLE abstraction: the device object,
//! characteristic objects, and notification values all live in the
//! `org.freedesktop.DBus.ObjectManager` tree `org.bluez` exposes on the
//! system bus.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::timeout;
use zbus::fdo::{ObjectManagerProxy, PropertiesProxy};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};
use zbus::{proxy, Connection};

use crate::constants::{CONTROL_CHARACTERISTIC_UUID, NINTENDO_COMPANY_ID, NOTIFY_CHARACTERISTIC_UUID};
use crate::error::{is_transient, DriverError};

const DEVICE1_INTERFACE: &str = "org.bluez.Device1";
const GATT_CHAR1_INTERFACE: &str = "org.bluez.GattCharacteristic1";

const SERVICES_RESOLVED_TIMEOUT: Duration = Duration::from_secs(8);
const CHARACTERISTIC_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);
const SERVICES_RESOLVED_POLL: Duration = Duration::from_millis(150);
const CHARACTERISTIC_POLL: Duration = Duration::from_millis(250);

const WRITE_TIMEOUT: Duration = Duration::from_millis(2500);
const NOTIFY_ENABLE_TIMEOUT: Duration = Duration::from_millis(2500);
const NOTIFY_DISABLE_TIMEOUT: Duration = Duration::from_millis(2000);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RECONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const RECONNECT_SETTLE: Duration = Duration::from_millis(250);

/// Inbound frame channel capacity. Generous: the notification handler
/// drains it synchronously every tick, this only buffers against a
/// scheduling hiccup.
const FRAME_CHANNEL_CAPACITY: usize = 64;

#[proxy(interface = "org.bluez.Device1", default_service = "org.bluez")]
trait Device1 {
    fn connect(&self) -> zbus::Result<()>;
    fn disconnect(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn services_resolved(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn set_trusted(&self, value: bool) -> zbus::Result<()>;
}

#[proxy(interface = "org.bluez.GattCharacteristic1", default_service = "org.bluez")]
trait GattCharacteristic1 {
    fn write_value(&self, value: Vec<u8>, options: HashMap<&str, Value<'_>>) -> zbus::Result<()>;
    fn start_notify(&self) -> zbus::Result<()>;
    fn stop_notify(&self) -> zbus::Result<()>;
}

/// Owns the live BlueZ objects for one Joy-Con 2 session: the device proxy,
/// both vendor characteristic proxies, and the background task forwarding
/// notification values into [`BleSession::recv_frame`].
pub struct BleSession {
    connection: Connection,
    mac: String,
    device_path: OwnedObjectPath,
    device: Device1Proxy<'static>,
    notify_char: Option<GattCharacteristic1Proxy<'static>>,
    notify_path: Option<OwnedObjectPath>,
    control_char: Option<GattCharacteristic1Proxy<'static>>,
    frame_rx: Option<mpsc::Receiver<Vec<u8>>>,
    notify_task: Option<tokio::task::JoinHandle<()>>,
}

impl BleSession {
    /// Discover the device object by MAC suffix, connect, wait for service
    /// resolution, and locate both vendor characteristics (spec.md §4.2).
    pub async fn connect(mac: &str) -> Result<Self, DriverError> {
        let connection = Connection::system().await?;
        let device_path = find_device_path(&connection, mac).await?;

        let device = Device1Proxy::builder(&connection)
            .path(device_path.clone())?
            .build()
            .await?;

        let _ = device.set_trusted(true).await;

        if let Err(e) = device.connect().await {
            if !is_transient(&e) {
                return Err(DriverError::Dbus(e));
            }
        }

        wait_services_resolved(&device).await?;

        let (notify_path, control_path) =
            discover_characteristics(&connection, &device_path).await?;

        let notify_char = GattCharacteristic1Proxy::builder(&connection)
            .path(notify_path.clone())?
            .build()
            .await?;
        let control_char = GattCharacteristic1Proxy::builder(&connection)
            .path(control_path)?
            .build()
            .await?;

        Ok(Self {
            connection,
            mac: mac.to_string(),
            device_path,
            device,
            notify_char: Some(notify_char),
            notify_path: Some(notify_path),
            control_char: Some(control_char),
            frame_rx: None,
            notify_task: None,
        })
    }

    /// Subscribe to `Value` property changes on the notify characteristic
    /// and start forwarding them as frames. Errors containing "In
    /// Progress"/"InProgress" are swallowed (spec.md §4.2).
    pub async fn enable_notifications(&mut self) -> Result<(), DriverError> {
        let notify_char = self
            .notify_char
            .as_ref()
            .expect("notify characteristic resolved during connect()");

        match timeout(NOTIFY_ENABLE_TIMEOUT, notify_char.start_notify()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if is_transient(&e) => {
                debug!("start_notify transient error ignored: {e}");
            }
            Ok(Err(e)) => return Err(DriverError::Dbus(e)),
            Err(_) => {
                return Err(DriverError::WriteTimeout {
                    operation: "start_notify",
                    timeout: NOTIFY_ENABLE_TIMEOUT,
                })
            }
        }

        let notify_path = self
            .notify_path
            .clone()
            .expect("notify path resolved during connect()");
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

        if let Some(handle) = self.notify_task.take() {
            handle.abort();
        }

        let properties = PropertiesProxy::builder(&self.connection)
            .path(notify_path)?
            .destination("org.bluez")?
            .build()
            .await?;
        let mut changes = properties.receive_properties_changed().await?;

        self.notify_task = Some(tokio::spawn(async move {
            while let Some(signal) = changes.next().await {
                let args = match signal.args() {
                    Ok(a) => a,
                    Err(e) => {
                        warn!("malformed PropertiesChanged signal: {e}");
                        continue;
                    }
                };
                if args.interface_name() != GATT_CHAR1_INTERFACE {
                    continue;
                }
                if let Some(value) = args.changed_properties().get("Value") {
                    if let Ok(bytes) = <Vec<u8>>::try_from(value.clone()) {
                        if tx.send(bytes).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }));

        self.frame_rx = Some(rx);
        Ok(())
    }

    pub async fn disable_notifications(&mut self) -> Result<(), DriverError> {
        if let Some(handle) = self.notify_task.take() {
            handle.abort();
        }
        if let Some(notify_char) = &self.notify_char {
            match timeout(NOTIFY_DISABLE_TIMEOUT, notify_char.stop_notify()).await {
                Ok(Ok(())) | Err(_) => {}
                Ok(Err(e)) if is_transient(&e) => {}
                Ok(Err(e)) => return Err(DriverError::Dbus(e)),
            }
        }
        self.frame_rx = None;
        Ok(())
    }

    /// Receive the next inbound frame. Returns `None` if notifications were
    /// never enabled or the background task has exited.
    pub async fn recv_frame(&mut self) -> Option<Vec<u8>> {
        self.frame_rx.as_mut()?.recv().await
    }

    /// Write `bytes` to the control characteristic with write-type
    /// `command` (write-without-response), per spec.md §4.2.
    pub async fn write_control(&self, bytes: &[u8]) -> Result<(), DriverError> {
        let control_char = self
            .control_char
            .as_ref()
            .expect("control characteristic resolved during connect()");
        let mut options = HashMap::new();
        options.insert("type", Value::from("command"));

        match timeout(
            WRITE_TIMEOUT,
            control_char.write_value(bytes.to_vec(), options),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Dbus(e)),
            Err(_) => Err(DriverError::WriteTimeout {
                operation: "write_control",
                timeout: WRITE_TIMEOUT,
            }),
        }
    }

    /// Disconnect, settle, reconnect, re-wait for service resolution, and
    /// rebind the characteristic proxies (spec.md §4.2).
    pub async fn cycle_connection(&mut self) -> Result<(), DriverError> {
        info!("cycling BLE connection for {}", self.mac);
        let _ = timeout(DISCONNECT_TIMEOUT, self.device.disconnect()).await;

        tokio::time::sleep(RECONNECT_SETTLE).await;

        match timeout(RECONNECT_TIMEOUT, self.device.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if is_transient(&e) => {}
            Ok(Err(e)) => return Err(DriverError::Dbus(e)),
            Err(_) => {
                return Err(DriverError::WriteTimeout {
                    operation: "reconnect",
                    timeout: RECONNECT_TIMEOUT,
                })
            }
        }

        wait_services_resolved(&self.device).await?;

        let (notify_path, control_path) =
            discover_characteristics(&self.connection, &self.device_path).await?;
        self.notify_char = Some(
            GattCharacteristic1Proxy::builder(&self.connection)
                .path(notify_path.clone())?
                .build()
                .await?,
        );
        self.notify_path = Some(notify_path);
        self.control_char = Some(
            GattCharacteristic1Proxy::builder(&self.connection)
                .path(control_path)?
                .build()
                .await?,
        );
        Ok(())
    }

    /// Snapshot the device's Nintendo manufacturer-data payload, used by
    /// the side detector (spec.md §4.4). `None` if the property is absent.
    pub async fn manufacturer_data(&self) -> Option<Vec<u8>> {
        let properties = PropertiesProxy::builder(&self.connection)
            .path(self.device_path.clone())
            .ok()?
            .destination("org.bluez")
            .ok()?
            .build()
            .await
            .ok()?;
        let value: OwnedValue = properties
            .get(DEVICE1_INTERFACE, "ManufacturerData")
            .await
            .ok()?;
        let map: HashMap<u16, OwnedValue> = value.try_into().ok()?;
        let entry = map.get(&NINTENDO_COMPANY_ID)?;
        <Vec<u8>>::try_from(entry.clone()).ok()
    }
}

async fn wait_services_resolved(device: &Device1Proxy<'_>) -> Result<(), DriverError> {
    let deadline = tokio::time::Instant::now() + SERVICES_RESOLVED_TIMEOUT;
    loop {
        if device.services_resolved().await.unwrap_or(false) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(DriverError::ServicesResolvedTimeout(SERVICES_RESOLVED_TIMEOUT));
        }
        tokio::time::sleep(SERVICES_RESOLVED_POLL).await;
    }
}

/// Find the device object whose path suffix is `dev_AA_BB_CC_DD_EE_FF`,
/// derived from `mac` by replacing colons with underscores (spec.md §4.2).
async fn find_device_path(connection: &Connection, mac: &str) -> Result<OwnedObjectPath, DriverError> {
    let suffix = format!("dev_{}", mac.replace(':', "_").to_uppercase());
    let om = ObjectManagerProxy::builder(connection)
        .path("/")?
        .destination("org.bluez")?
        .build()
        .await?;
    let objects = om.get_managed_objects().await?;
    for (path, interfaces) in objects.iter() {
        if interfaces.contains_key(DEVICE1_INTERFACE) && path.as_str().ends_with(&suffix) {
            return Ok(path.to_owned().into());
        }
    }
    Err(DriverError::DeviceNotFound(mac.to_string()))
}

/// Poll the managed-objects tree until both vendor characteristics appear
/// under `device_path`, matched by their `UUID` property (spec.md §4.2).
async fn discover_characteristics(
    connection: &Connection,
    device_path: &OwnedObjectPath,
) -> Result<(OwnedObjectPath, OwnedObjectPath), DriverError> {
    let notify_uuid = NOTIFY_CHARACTERISTIC_UUID.to_string();
    let control_uuid = CONTROL_CHARACTERISTIC_UUID.to_string();

    let om = ObjectManagerProxy::builder(connection)
        .path("/")?
        .destination("org.bluez")?
        .build()
        .await?;

    let deadline = tokio::time::Instant::now() + CHARACTERISTIC_DISCOVERY_TIMEOUT;
    loop {
        let objects = om.get_managed_objects().await?;
        let mut notify_path = None;
        let mut control_path = None;

        for (path, interfaces) in objects.iter() {
            if !path.as_str().starts_with(device_path.as_str()) {
                continue;
            }
            let Some(props) = interfaces.get(GATT_CHAR1_INTERFACE) else {
                continue;
            };
            let Some(uuid_value) = props.get("UUID") else {
                continue;
            };
            let Ok(uuid) = <String>::try_from(uuid_value.clone()) else {
                continue;
            };
            let uuid = uuid.to_lowercase();
            if uuid == notify_uuid {
                notify_path = Some(path.to_owned().into());
            } else if uuid == control_uuid {
                control_path = Some(path.to_owned().into());
            }
        }

        if let (Some(n), Some(c)) = (notify_path, control_path) {
            return Ok((n, c));
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(DriverError::CharacteristicDiscoveryTimeout(
                CHARACTERISTIC_DISCOVERY_TIMEOUT,
            ));
        }
        tokio::time::sleep(CHARACTERISTIC_POLL).await;
    }
}

#[allow(dead_code)]
fn device_path_suffix(mac: &str) -> String {
    format!("dev_{}", mac.replace(':', "_").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_path_suffix_formats_mac() {
        assert_eq!(
            device_path_suffix("aa:bb:cc:dd:ee:ff"),
            "dev_AA_BB_CC_DD_EE_FF"
        );
    }
}
