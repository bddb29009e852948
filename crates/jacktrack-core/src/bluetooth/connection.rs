//! Connection manager for the single tracked peripheral.
//!
//! The manager is the only writer of [`ConnectionState`]. Every transition is
//! published on a broadcast channel so a presentation layer can follow along
//! without polling:
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected --disconnect--> Disconnected
//!                               |
//!                               +--err--> Failed --> Disconnected   (link torn down)
//! ```
//!
//! A connect whose caller goes away mid-attempt takes the error branch too,
//! from a background task: the link is torn down first, then the state is
//! released so the next attempt can proceed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::error::{ConnectError, SessionError, SessionResult};
use crate::platform::{BlePlatform, PlatformError};
use crate::types::{same_peripheral, ConnectionState, PeripheralRecord, ServiceTable};

const EVENT_CAPACITY: usize = 32;

/// A live connection with its resolved service table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Connection {
    /// The connected peripheral as last discovered.
    pub peripheral: PeripheralRecord,

    /// Services resolved right after the link came up.
    pub services: ServiceTable,

    /// When the connection was established (UTC).
    pub connected_at_utc: DateTime<Utc>,
}

#[derive(Default)]
struct Tracked {
    state: ConnectionState,
    connection: Option<Connection>,
}

fn publish(
    tracked: &mut Tracked,
    events: &broadcast::Sender<ConnectionState>,
    state: ConnectionState,
) {
    tracked.state = state.clone();
    // No subscribers is fine.
    let _ = events.send(state);
}

/// An attempt that has left `Connecting` behind it. Unless marked settled,
/// dropping it tears the link down and releases the state.
struct PendingAttempt {
    peripheral_id: String,
    platform: Arc<dyn BlePlatform>,
    tracked: Arc<RwLock<Tracked>>,
    events: broadcast::Sender<ConnectionState>,
    settled: bool,
}

impl Drop for PendingAttempt {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(peripheral_id = %self.peripheral_id, "connect abandoned outside a runtime");
            return;
        };

        let id = std::mem::take(&mut self.peripheral_id);
        let platform = Arc::clone(&self.platform);
        let tracked = Arc::clone(&self.tracked);
        let events = self.events.clone();
        runtime.spawn(async move {
            warn!(peripheral_id = %id, "connect abandoned, tearing down link");
            if let Err(err) = platform.disconnect(&id).await {
                warn!(peripheral_id = %id, error = %err, "failed to tear down link");
            }

            let mut tracked = tracked.write().await;
            let still_connecting = matches!(
                &tracked.state,
                ConnectionState::Connecting { peripheral_id } if *peripheral_id == id
            );
            if still_connecting {
                tracked.connection = None;
                publish(
                    &mut tracked,
                    &events,
                    ConnectionState::Failed {
                        peripheral_id: id,
                        reason: "connect abandoned".to_string(),
                    },
                );
                publish(&mut tracked, &events, ConnectionState::Disconnected);
            }
        });
    }
}

/// Connects to, and disconnects from, one peripheral at a time.
pub struct ConnectionManager {
    platform: Arc<dyn BlePlatform>,
    connect_timeout: Duration,
    tracked: Arc<RwLock<Tracked>>,
    events: broadcast::Sender<ConnectionState>,
}

impl ConnectionManager {
    /// Create a manager that gives each connect attempt `connect_timeout`.
    pub fn new(platform: Arc<dyn BlePlatform>, connect_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            platform,
            connect_timeout,
            tracked: Arc::new(RwLock::new(Tracked::default())),
            events,
        }
    }

    /// Receive every state transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.events.subscribe()
    }

    /// Current state.
    pub async fn state(&self) -> ConnectionState {
        self.tracked.read().await.state.clone()
    }

    /// Id of the connected peripheral, if any.
    pub async fn connected_peripheral(&self) -> Option<String> {
        match &self.tracked.read().await.state {
            ConnectionState::Connected { peripheral_id } => Some(peripheral_id.clone()),
            _ => None,
        }
    }

    /// The live connection, if any.
    pub async fn connection(&self) -> Option<Connection> {
        self.tracked.read().await.connection.clone()
    }

    /// Connect to `peripheral` and resolve its services.
    ///
    /// Both steps run under the connect timeout. Any failure after the link
    /// came up tears the link down before returning, so no half-open link
    /// is left behind. The same holds if the returned future is dropped
    /// before it completes.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectInProgress`] if another attempt is in flight
    /// - [`SessionError::AlreadyConnected`] if a different peripheral is connected
    /// - [`SessionError::Connect`] if the link or service resolution fails
    #[instrument(skip(self, peripheral), fields(peripheral_id = %peripheral.id))]
    pub async fn connect(&self, peripheral: PeripheralRecord) -> SessionResult<Connection> {
        let id = peripheral.id.clone();

        {
            let mut tracked = self.tracked.write().await;
            match &tracked.state {
                ConnectionState::Connecting { peripheral_id } => {
                    return Err(SessionError::ConnectInProgress {
                        peripheral_id: peripheral_id.clone(),
                    });
                }
                ConnectionState::Connected { peripheral_id }
                    if same_peripheral(peripheral_id, &id) =>
                {
                    if let Some(connection) = &tracked.connection {
                        info!("already connected");
                        return Ok(connection.clone());
                    }
                }
                ConnectionState::Connected { peripheral_id } => {
                    return Err(SessionError::AlreadyConnected {
                        peripheral_id: peripheral_id.clone(),
                    });
                }
                ConnectionState::Disconnected | ConnectionState::Failed { .. } => {}
            }
            self.transition(
                &mut tracked,
                ConnectionState::Connecting {
                    peripheral_id: id.clone(),
                },
            );
        }
        let mut attempt = PendingAttempt {
            peripheral_id: id.clone(),
            platform: Arc::clone(&self.platform),
            tracked: Arc::clone(&self.tracked),
            events: self.events.clone(),
            settled: false,
        };

        info!("connecting");
        let outcome = match tokio::time::timeout(self.connect_timeout, self.establish(&id)).await
        {
            Ok(result) => result,
            Err(_) => {
                self.tear_down(&id).await;
                Err(ConnectError::Timeout {
                    peripheral_id: id.clone(),
                    timeout_secs: self.connect_timeout.as_secs(),
                })
            }
        };

        let mut tracked = self.tracked.write().await;
        attempt.settled = true;
        match outcome {
            Ok(services) => {
                let connection = Connection {
                    peripheral,
                    services,
                    connected_at_utc: Utc::now(),
                };
                info!(
                    services = connection.services.services.len(),
                    characteristics = connection.services.characteristic_count(),
                    "connected"
                );
                tracked.connection = Some(connection.clone());
                self.transition(&mut tracked, ConnectionState::Connected { peripheral_id: id });
                Ok(connection)
            }
            Err(err) => {
                warn!(error = %err, "connect failed");
                self.transition(
                    &mut tracked,
                    ConnectionState::Failed {
                        peripheral_id: id,
                        reason: err.to_string(),
                    },
                );
                self.transition(&mut tracked, ConnectionState::Disconnected);
                Err(err.into())
            }
        }
    }

    /// Disconnect `peripheral_id`.
    ///
    /// Ids match without regard to case, as in [`DiscoveryPass::find`].
    /// Succeeds trivially if that peripheral is not connected.
    ///
    /// [`DiscoveryPass::find`]: super::discovery::DiscoveryPass::find
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectInProgress`] while connecting to that peripheral
    /// - [`SessionError::Platform`] if the platform fails to drop the link; the
    ///   state stays `Connected` so the call can be retried
    #[instrument(skip(self))]
    pub async fn disconnect(&self, peripheral_id: &str) -> SessionResult<()> {
        let mut tracked = self.tracked.write().await;
        match &tracked.state {
            ConnectionState::Connected { peripheral_id: current }
                if same_peripheral(current, peripheral_id) =>
            {
                let current = current.clone();
                self.platform.disconnect(&current).await?;
                tracked.connection = None;
                self.transition(&mut tracked, ConnectionState::Disconnected);
                info!("disconnected");
                Ok(())
            }
            ConnectionState::Connecting { peripheral_id: current }
                if same_peripheral(current, peripheral_id) =>
            {
                Err(SessionError::ConnectInProgress {
                    peripheral_id: current.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn establish(&self, id: &str) -> Result<ServiceTable, ConnectError> {
        self.platform.connect(id).await.map_err(|err| match err {
            PlatformError::PeripheralNotFound(_) => ConnectError::NotFound {
                peripheral_id: id.to_string(),
            },
            other => ConnectError::LinkFailed {
                peripheral_id: id.to_string(),
                reason: other.to_string(),
            },
        })?;

        match self.platform.retrieve_services(id).await {
            Ok(services) => Ok(services),
            Err(err) => {
                self.tear_down(id).await;
                Err(ConnectError::ServiceResolutionFailed {
                    peripheral_id: id.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn tear_down(&self, id: &str) {
        if let Err(err) = self.platform.disconnect(id).await {
            warn!(peripheral_id = %id, error = %err, "failed to tear down link");
        }
    }

    fn transition(&self, tracked: &mut Tracked, state: ConnectionState) {
        publish(tracked, &self.events, state);
    }
}
