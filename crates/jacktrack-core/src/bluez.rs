//! [`BlePlatform`] over BlueZ via `bluer`.
//!
//! BlueZ has no runtime permission prompt and no system "turn Bluetooth on"
//! dialog, so the gate is always open and `suppress_system_alert` has no
//! effect. The adapter is powered on when the session starts.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, Address, Device, DiscoveryFilter, DiscoveryTransport, ErrorKind};
use futures::StreamExt;
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::is_valid_mac_address;
use crate::platform::{BlePlatform, PlatformError, PlatformResult};
use crate::types::{
    CharacteristicInfo, Permission, PeripheralRecord, ServiceInfo, ServiceTable, StartOptions,
};

/// Interval between checks of `ServicesResolved` after connecting.
const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// BlueZ-backed platform using the default adapter.
#[derive(Default)]
pub struct BluerPlatform {
    adapter: OnceCell<Adapter>,
    seen: Arc<Mutex<Vec<Address>>>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl BluerPlatform {
    /// Create a platform. Nothing touches D-Bus until `adapter_start`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn adapter(&self) -> PlatformResult<&Adapter> {
        self.adapter.get().ok_or_else(|| {
            PlatformError::AdapterUnavailable("adapter has not been started".to_string())
        })
    }

    fn device(&self, peripheral_id: &str) -> PlatformResult<Device> {
        let address = Some(peripheral_id)
            .filter(|id| is_valid_mac_address(id))
            .and_then(|id| Address::from_str(id).ok())
            .ok_or_else(|| PlatformError::InvalidAddress(peripheral_id.to_string()))?;
        self.adapter()?
            .device(address)
            .map_err(|err| device_error(peripheral_id, &err))
    }

    fn seen(&self) -> MutexGuard<'_, Vec<Address>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BluerPlatform {
    fn drop(&mut self) {
        if let Some(task) = self
            .scan_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

fn operation_error(err: &bluer::Error) -> PlatformError {
    PlatformError::Operation(err.to_string())
}

fn device_error(peripheral_id: &str, err: &bluer::Error) -> PlatformError {
    match err.kind {
        ErrorKind::NotFound | ErrorKind::DoesNotExist => {
            PlatformError::PeripheralNotFound(peripheral_id.to_string())
        }
        ErrorKind::InvalidAddress(_) => PlatformError::InvalidAddress(peripheral_id.to_string()),
        _ => operation_error(err),
    }
}

fn characteristic_properties(flags: &bluer::gatt::CharacteristicFlags) -> Vec<String> {
    [
        (flags.broadcast, "broadcast"),
        (flags.read, "read"),
        (flags.write_without_response, "write_without_response"),
        (flags.write, "write"),
        (flags.notify, "notify"),
        (flags.indicate, "indicate"),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .map(|(_, name)| name.to_string())
    .collect()
}

async fn read_services(device: &Device) -> bluer::Result<ServiceTable> {
    let mut services = Vec::new();
    for service in device.services().await? {
        let mut characteristics = Vec::new();
        for characteristic in service.characteristics().await? {
            characteristics.push(CharacteristicInfo {
                uuid: characteristic.uuid().await?.to_string(),
                properties: characteristic_properties(&characteristic.flags().await?),
            });
        }
        services.push(ServiceInfo {
            uuid: service.uuid().await?.to_string(),
            primary: service.primary().await?,
            characteristics,
        });
    }
    Ok(ServiceTable { services })
}

#[async_trait]
impl BlePlatform for BluerPlatform {
    fn requires_runtime_permissions(&self) -> bool {
        false
    }

    async fn request_permissions(
        &self,
        capabilities: &[Permission],
    ) -> PlatformResult<BTreeSet<Permission>> {
        Ok(capabilities.iter().copied().collect())
    }

    async fn adapter_start(&self, options: StartOptions) -> PlatformResult<()> {
        let adapter = self
            .adapter
            .get_or_try_init(|| async {
                let session = bluer::Session::new()
                    .await
                    .map_err(|e| PlatformError::AdapterUnavailable(e.to_string()))?;
                session
                    .default_adapter()
                    .await
                    .map_err(|e| PlatformError::AdapterUnavailable(e.to_string()))
            })
            .await?;

        adapter.set_powered(true).await.map_err(|e| operation_error(&e))?;
        info!(
            adapter = adapter.name(),
            suppress_system_alert = options.suppress_system_alert,
            "bluetooth adapter powered on"
        );
        Ok(())
    }

    async fn scan_for_peripherals(
        &self,
        service_filters: &[String],
        timeout_secs: u64,
        allow_duplicates: bool,
    ) -> PlatformResult<()> {
        let adapter = self.adapter()?.clone();

        let uuids = service_filters
            .iter()
            .map(|s| {
                bluer::Uuid::parse_str(s)
                    .map_err(|_| PlatformError::Operation(format!("invalid service UUID '{s}'")))
            })
            .collect::<PlatformResult<_>>()?;
        adapter
            .set_discovery_filter(DiscoveryFilter {
                uuids,
                transport: DiscoveryTransport::Le,
                duplicate_data: allow_duplicates,
                ..DiscoveryFilter::default()
            })
            .await
            .map_err(|e| operation_error(&e))?;

        if let Some(previous) = self
            .scan_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            previous.abort();
        }
        self.seen().clear();

        let seen = Arc::clone(&self.seen);
        let (started_tx, started_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let events = match adapter.discover_devices().await {
                Ok(events) => {
                    let _ = started_tx.send(Ok(()));
                    events
                }
                Err(err) => {
                    let _ = started_tx.send(Err(err));
                    return;
                }
            };
            tokio::pin!(events);
            let deadline = tokio::time::sleep(Duration::from_secs(timeout_secs));
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    () = &mut deadline => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            let mut seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
                            if !seen.contains(&address) {
                                debug!(%address, "peripheral discovered");
                                seen.push(address);
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            debug!("discovery stopped");
        });
        *self
            .scan_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);

        started_rx
            .await
            .map_err(|_| PlatformError::Operation("discovery task ended early".to_string()))?
            .map_err(|e| operation_error(&e))
    }

    async fn discovered_peripherals(&self) -> PlatformResult<Vec<PeripheralRecord>> {
        let adapter = self.adapter()?;
        let addresses = self.seen().clone();

        let mut peripherals = Vec::with_capacity(addresses.len());
        for address in addresses {
            let device = match adapter.device(address) {
                Ok(device) => device,
                Err(err) => {
                    warn!(%address, error = %err, "discovered peripheral vanished");
                    continue;
                }
            };
            let mut record = PeripheralRecord::new(address.to_string());
            record.name = device.name().await.ok().flatten();
            record.rssi = device.rssi().await.ok().flatten();
            peripherals.push(record);
        }
        Ok(peripherals)
    }

    async fn connect(&self, peripheral_id: &str) -> PlatformResult<()> {
        let device = self.device(peripheral_id)?;
        device
            .connect()
            .await
            .map_err(|err| device_error(peripheral_id, &err))
    }

    async fn retrieve_services(&self, peripheral_id: &str) -> PlatformResult<ServiceTable> {
        let device = self.device(peripheral_id)?;
        while !device
            .is_services_resolved()
            .await
            .map_err(|e| operation_error(&e))?
        {
            tokio::time::sleep(SERVICES_POLL_INTERVAL).await;
        }
        read_services(&device).await.map_err(|e| operation_error(&e))
    }

    async fn disconnect(&self, peripheral_id: &str) -> PlatformResult<()> {
        let device = self.device(peripheral_id)?;
        if device.is_connected().await.map_err(|e| operation_error(&e))? {
            device.disconnect().await.map_err(|e| operation_error(&e))?;
        }
        Ok(())
    }
}
