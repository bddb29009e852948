//! Shared types and OpenAPI schemas.
//!
//! These are the values that cross the boundary between the BLE session and
//! its consumers: discovered peripherals, resolved service tables and the
//! connection state of the single tracked peripheral.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A peripheral seen during a discovery pass.
///
/// Records are immutable once returned. The next discovery pass supersedes
/// the whole set rather than merging into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "AA:BB:CC:DD:EE:FF",
    "name": "Ball 1",
    "rssi": -58
}))]
pub struct PeripheralRecord {
    /// Platform address, stable per device.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub id: String,

    /// Advertised local name, if any.
    #[schema(example = "Ball 1")]
    pub name: Option<String>,

    /// Signal strength in dBm at the time of discovery.
    #[schema(example = -58)]
    pub rssi: Option<i16>,
}

impl PeripheralRecord {
    /// Create a record with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            rssi: None,
        }
    }

    /// Set the advertised name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the signal strength.
    #[must_use]
    pub const fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Name to show for this peripheral, falling back to its id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether `id` names this peripheral. See [`same_peripheral`].
    #[must_use]
    pub fn has_id(&self, id: &str) -> bool {
        same_peripheral(&self.id, id)
    }
}

/// Compare two peripheral ids.
///
/// MAC addresses and UUIDs are hex, so case carries no meaning.
#[must_use]
pub fn same_peripheral(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// A GATT characteristic exposed by a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CharacteristicInfo {
    /// Characteristic UUID.
    #[schema(example = "00002a19-0000-1000-8000-00805f9b34fb")]
    pub uuid: String,

    /// Supported operations, e.g. `read`, `write`, `notify`.
    pub properties: Vec<String>,
}

/// A GATT service and its characteristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// Service UUID.
    #[schema(example = "0000180f-0000-1000-8000-00805f9b34fb")]
    pub uuid: String,

    /// Whether this is a primary service.
    pub primary: bool,

    /// Characteristics of this service.
    pub characteristics: Vec<CharacteristicInfo>,
}

/// The service/characteristic table resolved after a link is established.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceTable {
    /// Services in the order the platform reported them.
    pub services: Vec<ServiceInfo>,
}

impl ServiceTable {
    /// Total number of characteristics across all services.
    #[must_use]
    pub fn characteristic_count(&self) -> usize {
        self.services.iter().map(|s| s.characteristics.len()).sum()
    }
}

/// State of the single tracked connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No peripheral is connected or being connected.
    #[default]
    Disconnected,

    /// A connect attempt is in flight.
    Connecting {
        /// Peripheral being connected.
        peripheral_id: String,
    },

    /// Link established and services resolved.
    Connected {
        /// Connected peripheral.
        peripheral_id: String,
    },

    /// A connect attempt failed. Published to observers only; the manager
    /// settles in `Disconnected` right after.
    Failed {
        /// Peripheral whose connect attempt failed.
        peripheral_id: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

impl ConnectionState {
    /// Peripheral id this state refers to, if any.
    #[must_use]
    pub fn peripheral_id(&self) -> Option<&str> {
        match self {
            Self::Disconnected => None,
            Self::Connecting { peripheral_id }
            | Self::Connected { peripheral_id }
            | Self::Failed { peripheral_id, .. } => Some(peripheral_id),
        }
    }

    /// Returns `true` if a peripheral is connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting { peripheral_id } => write!(f, "connecting({peripheral_id})"),
            Self::Connected { peripheral_id } => write!(f, "connected({peripheral_id})"),
            Self::Failed {
                peripheral_id,
                reason,
            } => write!(f, "failed({peripheral_id}: {reason})"),
        }
    }
}

/// Runtime capabilities needed before BLE scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// Discover nearby peripherals.
    BluetoothScan,
    /// Connect to a peripheral.
    BluetoothConnect,
    /// Location access, required by some platforms to report scan results.
    AccessFineLocation,
}

impl Permission {
    /// Every capability the session needs.
    pub const REQUIRED: [Self; 3] = [
        Self::BluetoothScan,
        Self::BluetoothConnect,
        Self::AccessFineLocation,
    ];
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BluetoothScan => "BLUETOOTH_SCAN",
            Self::BluetoothConnect => "BLUETOOTH_CONNECT",
            Self::AccessFineLocation => "ACCESS_FINE_LOCATION",
        };
        f.write_str(name)
    }
}

/// Options for starting the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StartOptions {
    /// Do not let the platform show its own "turn Bluetooth on" dialog.
    #[schema(example = true)]
    pub suppress_system_alert: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            suppress_system_alert: true,
        }
    }
}
