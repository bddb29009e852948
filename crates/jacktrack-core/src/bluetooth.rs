//! Bluetooth Low Energy session for pairing tagged golf balls.
//!
//! A [`BleSession`] owns the four pieces of the BLE lifecycle:
//!
//! - [`PermissionGate`] - runtime capability grants
//! - [`AdapterSession`] - starting the platform stack exactly once
//! - [`DiscoveryPass`] - one fixed-window scan at a time
//! - [`ConnectionManager`] - the single tracked connection
//!
//! The session is shared behind an `Arc`; all operations take `&self` and
//! enforce their own ordering. `start` must complete before `scan` or
//! `connect`, and only one scan window may be open at a time.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::config::BleConfig;
use crate::platform::{BlePlatform, Clock, TokioClock};
use crate::types::{ConnectionState, PeripheralRecord, StartOptions};

pub mod adapter;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod permissions;

pub use adapter::{AdapterSession, AdapterState};
pub use connection::{Connection, ConnectionManager};
pub use discovery::{scan_window, DiscoveryPass};
pub use error::{ConnectError, SessionError, SessionResult};
pub use permissions::{Granted, PermissionGate};

/// The BLE session: permission gate, adapter, discovery and connection.
pub struct BleSession {
    gate: PermissionGate,
    adapter: AdapterSession,
    discovery: DiscoveryPass,
    connections: ConnectionManager,
}

impl BleSession {
    /// Create a session over `platform` using the tokio timer for scan windows.
    pub fn new(platform: Arc<dyn BlePlatform>, config: &BleConfig) -> Self {
        Self::with_clock(platform, Arc::new(TokioClock), config)
    }

    /// Create a session with an explicit scan-window clock.
    pub fn with_clock(
        platform: Arc<dyn BlePlatform>,
        clock: Arc<dyn Clock>,
        config: &BleConfig,
    ) -> Self {
        Self {
            gate: PermissionGate::new(Arc::clone(&platform)),
            adapter: AdapterSession::new(Arc::clone(&platform)),
            discovery: DiscoveryPass::new(Arc::clone(&platform), clock),
            connections: ConnectionManager::new(platform, config.connect_timeout()),
        }
    }

    /// Application start-up: ensure permissions, then start the adapter.
    ///
    /// # Errors
    ///
    /// Returns the first failure of either step.
    pub async fn initialize(&self, options: StartOptions) -> SessionResult<AdapterState> {
        self.ensure_permissions().await?;
        self.start(options).await
    }

    /// Request any missing runtime permissions.
    ///
    /// # Errors
    ///
    /// See [`PermissionGate::ensure_permissions`].
    pub async fn ensure_permissions(&self) -> SessionResult<Granted> {
        self.gate.ensure_permissions().await
    }

    /// Start the platform stack. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`AdapterSession::start`].
    pub async fn start(&self, options: StartOptions) -> SessionResult<AdapterState> {
        self.adapter.start(options).await
    }

    /// Readiness of the adapter.
    #[must_use]
    pub fn adapter_state(&self) -> AdapterState {
        self.adapter.state()
    }

    /// Run one discovery pass of `duration_ms` milliseconds.
    ///
    /// Checks run in order, and none of them touches the radio: the
    /// duration must be positive, permissions must be granted, the adapter
    /// must be ready, and no other window may be open.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`], [`SessionError::PermissionDenied`],
    /// [`SessionError::NotReady`], [`SessionError::ScanInProgress`], or a
    /// platform failure.
    #[instrument(skip(self))]
    pub async fn scan(
        &self,
        duration_ms: i64,
        allow_duplicates: bool,
    ) -> SessionResult<Vec<PeripheralRecord>> {
        let window = scan_window(duration_ms)?;
        self.gate.check().await?;
        self.adapter.ensure_ready()?;
        self.discovery.run(window, allow_duplicates).await
    }

    /// Returns `true` while a scan window is open.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.discovery.is_scanning()
    }

    /// Peripherals from the latest completed scan.
    pub async fn discovered(&self) -> Vec<PeripheralRecord> {
        self.discovery.snapshot().await
    }

    /// Connect to a peripheral from the latest scan and resolve its services.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] before `start`; [`ConnectError::NotFound`]
    /// if the id was not in the latest scan; otherwise see
    /// [`ConnectionManager::connect`].
    pub async fn connect(&self, peripheral_id: &str) -> SessionResult<Connection> {
        self.adapter.ensure_ready()?;
        let peripheral = self.discovery.find(peripheral_id).await.ok_or_else(|| {
            info!(peripheral_id, "connect requested for undiscovered peripheral");
            ConnectError::NotFound {
                peripheral_id: peripheral_id.to_string(),
            }
        })?;
        self.connections.connect(peripheral).await
    }

    /// Disconnect a peripheral. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::disconnect`].
    pub async fn disconnect(&self, peripheral_id: &str) -> SessionResult<()> {
        self.connections.disconnect(peripheral_id).await
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.connections.state().await
    }

    /// Id of the connected peripheral, if any.
    pub async fn connected_peripheral(&self) -> Option<String> {
        self.connections.connected_peripheral().await
    }

    /// The live connection and its service table, if any.
    pub async fn connection(&self) -> Option<Connection> {
        self.connections.connection().await
    }

    /// Follow connection state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.connections.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{MockPlatform, PlatformCall};
    use crate::platform::PlatformError;
    use crate::types::Permission;

    fn session(platform: &Arc<MockPlatform>) -> BleSession {
        BleSession::new(platform.clone(), &BleConfig::default())
    }

    #[tokio::test]
    async fn test_non_positive_duration_never_contacts_adapter() {
        let platform = Arc::new(MockPlatform::demo());
        let session = session(&platform);
        session.start(StartOptions::default()).await.unwrap();

        for duration in [0, -1, -5000] {
            assert!(matches!(
                session.scan(duration, true).await,
                Err(SessionError::InvalidArgument(_))
            ));
        }
        assert_eq!(platform.calls(), vec![PlatformCall::AdapterStart(StartOptions::default())]);
    }

    #[tokio::test]
    async fn test_invalid_argument_wins_over_not_ready() {
        let platform = Arc::new(MockPlatform::demo());
        let session = session(&platform);

        assert!(matches!(
            session.scan(0, true).await,
            Err(SessionError::InvalidArgument(_))
        ));
        assert_eq!(session.scan(100, true).await, Err(SessionError::NotReady));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connect_before_start_is_not_ready() {
        let platform = Arc::new(MockPlatform::demo());
        let session = session(&platform);

        assert_eq!(
            session.connect("AA:BB").await.unwrap_err(),
            SessionError::NotReady
        );
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scan_without_permissions_fails_fast() {
        let platform = Arc::new(MockPlatform::demo().with_runtime_permissions([]));
        let session = session(&platform);
        session.start(StartOptions::default()).await.unwrap();

        assert!(session.ensure_permissions().await.is_err());
        assert!(matches!(
            session.scan(5000, true).await,
            Err(SessionError::PermissionDenied { .. })
        ));
        assert!(!platform
            .calls()
            .iter()
            .any(|c| matches!(c, PlatformCall::ScanForPeripherals { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_runs_gate_then_adapter() {
        let platform =
            Arc::new(MockPlatform::demo().with_runtime_permissions(Permission::REQUIRED));
        let session = session(&platform);

        assert_eq!(
            session.initialize(StartOptions::default()).await.unwrap(),
            AdapterState::Ready
        );
        let calls = platform.calls();
        assert!(matches!(calls[0], PlatformCall::RequestPermissions(_)));
        assert!(matches!(calls[1], PlatformCall::AdapterStart(_)));
        assert!(session.scan(1000, false).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_golf_ball_pairing_scenario() {
        let platform = Arc::new(MockPlatform::demo());
        let session = session(&platform);
        let mut events = session.subscribe();

        session
            .start(StartOptions {
                suppress_system_alert: true,
            })
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let found = session.scan(5000, true).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(5000));

        let ids: Vec<(&str, Option<&str>)> = found
            .iter()
            .map(|p| (p.id.as_str(), p.name.as_deref()))
            .collect();
        assert_eq!(ids, vec![("AA:BB", Some("Ball 1")), ("CC:DD", None)]);

        assert_eq!(session.state().await, ConnectionState::Disconnected);
        session.connect("AA:BB").await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionState::Connecting {
                peripheral_id: "AA:BB".into()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionState::Connected {
                peripheral_id: "AA:BB".into()
            }
        );

        session.disconnect("AA:BB").await.unwrap();
        assert_eq!(events.recv().await.unwrap(), ConnectionState::Disconnected);

        let err = session.connect("ZZ:ZZ").await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Connect(ConnectError::NotFound {
                peripheral_id: "ZZ:ZZ".into()
            })
        );
        assert_eq!(session.state().await, ConnectionState::Disconnected);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_scan_is_rejected() {
        let platform = Arc::new(MockPlatform::demo());
        let session = Arc::new(session(&platform));
        session.start(StartOptions::default()).await.unwrap();

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.scan(5000, true).await }
        });
        tokio::task::yield_now().await;

        assert_eq!(
            session.scan(5000, true).await,
            Err(SessionError::ScanInProgress)
        );
        assert_eq!(first.await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_failure_leaves_session_disconnected() {
        let platform = Arc::new(
            MockPlatform::demo()
                .fail_service_resolution("AA:BB", PlatformError::Operation("gatt".into())),
        );
        let session = session(&platform);
        session.start(StartOptions::default()).await.unwrap();
        session.scan(1000, true).await.unwrap();

        assert!(matches!(
            session.connect("AA:BB").await,
            Err(SessionError::Connect(ConnectError::ServiceResolutionFailed { .. }))
        ));
        assert_eq!(session.state().await, ConnectionState::Disconnected);
        assert!(platform
            .calls()
            .contains(&PlatformCall::Disconnect("AA:BB".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lowercase_id_connects_and_disconnects() {
        let platform = Arc::new(MockPlatform::demo());
        let session = session(&platform);
        session.start(StartOptions::default()).await.unwrap();
        session.scan(1000, true).await.unwrap();

        let connection = session.connect("aa:bb").await.unwrap();
        assert_eq!(connection.peripheral.id, "AA:BB");
        assert_eq!(session.connected_peripheral().await.as_deref(), Some("AA:BB"));

        session.disconnect("aa:bb").await.unwrap();
        assert_eq!(session.state().await, ConnectionState::Disconnected);
        assert!(platform
            .calls()
            .contains(&PlatformCall::Disconnect("AA:BB".into())));
    }

    #[tokio::test]
    async fn test_disconnect_unknown_id_succeeds() {
        let platform = Arc::new(MockPlatform::demo());
        let session = session(&platform);

        session.disconnect("AA:BB").await.unwrap();
        assert_eq!(session.state().await, ConnectionState::Disconnected);
        assert_eq!(session.connected_peripheral().await, None);
    }
}
