//! Scriptable in-memory BLE platform.
//!
//! Used by the unit tests and by the `mock-bluetooth` feature to run the
//! server on machines without a Bluetooth adapter. Every call is recorded so
//! tests can assert on side effects such as "the adapter was started once"
//! or "the link was torn down".

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::platform::{BlePlatform, PlatformError, PlatformResult};
use crate::types::{
    CharacteristicInfo, Permission, PeripheralRecord, ServiceInfo, ServiceTable, StartOptions,
};

/// A call made against [`MockPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// `request_permissions` with the requested capabilities.
    RequestPermissions(Vec<Permission>),
    /// `adapter_start`.
    AdapterStart(StartOptions),
    /// `scan_for_peripherals`.
    ScanForPeripherals {
        /// Radio-side ceiling passed by the session.
        timeout_secs: u64,
        /// Duplicate reporting flag.
        allow_duplicates: bool,
    },
    /// `discovered_peripherals`.
    DiscoveredPeripherals,
    /// `connect`.
    Connect(String),
    /// `retrieve_services`.
    RetrieveServices(String),
    /// `disconnect`.
    Disconnect(String),
}

#[derive(Default)]
struct MockState {
    runtime_permissions: bool,
    grantable: BTreeSet<Permission>,
    peripherals: Vec<PeripheralRecord>,
    services: HashMap<String, ServiceTable>,
    adapter_failure: Option<PlatformError>,
    scan_failure: Option<PlatformError>,
    connect_failures: HashMap<String, PlatformError>,
    service_failures: HashMap<String, PlatformError>,
    disconnect_failure: Option<PlatformError>,
    connect_delay: Option<Duration>,
    scanned: bool,
    linked: BTreeSet<String>,
    calls: Vec<PlatformCall>,
}

/// In-memory [`BlePlatform`].
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

/// A battery service with a single level characteristic.
fn battery_service() -> ServiceTable {
    ServiceTable {
        services: vec![ServiceInfo {
            uuid: "0000180f-0000-1000-8000-00805f9b34fb".to_string(),
            primary: true,
            characteristics: vec![CharacteristicInfo {
                uuid: "00002a19-0000-1000-8000-00805f9b34fb".to_string(),
                properties: vec!["read".to_string(), "notify".to_string()],
            }],
        }],
    }
}

impl MockPlatform {
    /// A platform with no peripherals and no runtime permission model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Two tagged balls: `AA:BB` named "Ball 1" and an unnamed `CC:DD`, both
    /// exposing a battery service.
    #[must_use]
    pub fn demo() -> Self {
        Self::new()
            .with_peripheral(PeripheralRecord::new("AA:BB").with_name("Ball 1").with_rssi(-58))
            .with_peripheral(PeripheralRecord::new("CC:DD").with_rssi(-71))
            .with_services("AA:BB", battery_service())
            .with_services("CC:DD", battery_service())
    }

    /// Require runtime permissions and grant only `grantable` when asked.
    #[must_use]
    pub fn with_runtime_permissions(self, grantable: impl IntoIterator<Item = Permission>) -> Self {
        {
            let mut state = self.lock();
            state.runtime_permissions = true;
            state.grantable = grantable.into_iter().collect();
        }
        self
    }

    /// Add a peripheral that scans will report.
    #[must_use]
    pub fn with_peripheral(self, peripheral: PeripheralRecord) -> Self {
        self.lock().peripherals.push(peripheral);
        self
    }

    /// Set the service table returned for `peripheral_id`.
    #[must_use]
    pub fn with_services(self, peripheral_id: &str, services: ServiceTable) -> Self {
        self.lock()
            .services
            .insert(peripheral_id.to_string(), services);
        self
    }

    /// Delay every `connect` by `delay`.
    #[must_use]
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.lock().connect_delay = Some(delay);
        self
    }

    /// Make `adapter_start` fail with `error`.
    #[must_use]
    pub fn fail_adapter_start(self, error: PlatformError) -> Self {
        self.lock().adapter_failure = Some(error);
        self
    }

    /// Make `scan_for_peripherals` fail with `error`.
    #[must_use]
    pub fn fail_scan(self, error: PlatformError) -> Self {
        self.lock().scan_failure = Some(error);
        self
    }

    /// Make `connect` to `peripheral_id` fail with `error`.
    #[must_use]
    pub fn fail_connect(self, peripheral_id: &str, error: PlatformError) -> Self {
        self.lock()
            .connect_failures
            .insert(peripheral_id.to_string(), error);
        self
    }

    /// Make `retrieve_services` for `peripheral_id` fail with `error`.
    #[must_use]
    pub fn fail_service_resolution(self, peripheral_id: &str, error: PlatformError) -> Self {
        self.lock()
            .service_failures
            .insert(peripheral_id.to_string(), error);
        self
    }

    /// Make every following `disconnect` fail with `error`.
    pub fn fail_disconnect(&self, error: PlatformError) {
        self.lock().disconnect_failure = Some(error);
    }

    /// Let `adapter_start` succeed again.
    pub fn clear_adapter_failure(&self) {
        self.lock().adapter_failure = None;
    }

    /// Replace the peripherals reported by the next scan.
    pub fn set_peripherals(&self, peripherals: Vec<PeripheralRecord>) {
        self.lock().peripherals = peripherals;
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    /// Number of `adapter_start` calls.
    #[must_use]
    pub fn adapter_start_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, PlatformCall::AdapterStart(_)))
            .count()
    }

    /// Whether a link to `peripheral_id` is currently up.
    #[must_use]
    pub fn is_linked(&self, peripheral_id: &str) -> bool {
        self.lock().linked.contains(peripheral_id)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: PlatformCall) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl BlePlatform for MockPlatform {
    fn requires_runtime_permissions(&self) -> bool {
        self.lock().runtime_permissions
    }

    async fn request_permissions(
        &self,
        capabilities: &[Permission],
    ) -> PlatformResult<BTreeSet<Permission>> {
        self.record(PlatformCall::RequestPermissions(capabilities.to_vec()));
        let state = self.lock();
        Ok(capabilities
            .iter()
            .copied()
            .filter(|p| state.grantable.contains(p))
            .collect())
    }

    async fn adapter_start(&self, options: StartOptions) -> PlatformResult<()> {
        self.record(PlatformCall::AdapterStart(options));
        match &self.lock().adapter_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn scan_for_peripherals(
        &self,
        _service_filters: &[String],
        timeout_secs: u64,
        allow_duplicates: bool,
    ) -> PlatformResult<()> {
        self.record(PlatformCall::ScanForPeripherals {
            timeout_secs,
            allow_duplicates,
        });
        let mut state = self.lock();
        if let Some(err) = &state.scan_failure {
            return Err(err.clone());
        }
        state.scanned = true;
        Ok(())
    }

    async fn discovered_peripherals(&self) -> PlatformResult<Vec<PeripheralRecord>> {
        self.record(PlatformCall::DiscoveredPeripherals);
        let state = self.lock();
        if state.scanned {
            Ok(state.peripherals.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn connect(&self, peripheral_id: &str) -> PlatformResult<()> {
        self.record(PlatformCall::Connect(peripheral_id.to_string()));
        let delay = self.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(err) = state.connect_failures.get(peripheral_id) {
            return Err(err.clone());
        }
        if !state.peripherals.iter().any(|p| p.id == peripheral_id) {
            return Err(PlatformError::PeripheralNotFound(peripheral_id.to_string()));
        }
        state.linked.insert(peripheral_id.to_string());
        Ok(())
    }

    async fn retrieve_services(&self, peripheral_id: &str) -> PlatformResult<ServiceTable> {
        self.record(PlatformCall::RetrieveServices(peripheral_id.to_string()));
        let state = self.lock();
        if let Some(err) = state.service_failures.get(peripheral_id) {
            return Err(err.clone());
        }
        if !state.linked.contains(peripheral_id) {
            return Err(PlatformError::Operation(format!(
                "{peripheral_id} is not connected"
            )));
        }
        Ok(state
            .services
            .get(peripheral_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn disconnect(&self, peripheral_id: &str) -> PlatformResult<()> {
        self.record(PlatformCall::Disconnect(peripheral_id.to_string()));
        let mut state = self.lock();
        if let Some(err) = &state.disconnect_failure {
            return Err(err.clone());
        }
        state.linked.remove(peripheral_id);
        Ok(())
    }
}
