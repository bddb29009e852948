//! Error types for the BLE session.

use thiserror::Error;

use crate::platform::PlatformError;
use crate::types::Permission;

/// Result type for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Failures of a connect attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The peripheral was not seen by the latest discovery pass, or the
    /// platform no longer knows it.
    #[error("Peripheral '{peripheral_id}' not found. Scan again and make sure the ball is awake and in range.")]
    NotFound {
        /// Requested peripheral.
        peripheral_id: String,
    },

    /// Link establishment and service resolution did not finish in time.
    #[error("Connecting to '{peripheral_id}' timed out after {timeout_secs} seconds")]
    Timeout {
        /// Requested peripheral.
        peripheral_id: String,
        /// Configured connect timeout.
        timeout_secs: u64,
    },

    /// The link came up but the service table could not be read.
    #[error("Failed to resolve services of '{peripheral_id}': {reason}")]
    ServiceResolutionFailed {
        /// Requested peripheral.
        peripheral_id: String,
        /// Platform-reported reason.
        reason: String,
    },

    /// The platform refused or dropped the link.
    #[error("Failed to connect to '{peripheral_id}': {reason}")]
    LinkFailed {
        /// Requested peripheral.
        peripheral_id: String,
        /// Platform-reported reason.
        reason: String,
    },
}

impl ConnectError {
    /// Peripheral the failed attempt targeted.
    #[must_use]
    pub fn peripheral_id(&self) -> &str {
        match self {
            Self::NotFound { peripheral_id }
            | Self::Timeout { peripheral_id, .. }
            | Self::ServiceResolutionFailed { peripheral_id, .. }
            | Self::LinkFailed { peripheral_id, .. } => peripheral_id,
        }
    }
}

/// Errors returned by [`BleSession`](super::BleSession) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Required runtime permissions were not granted.
    #[error("Bluetooth permissions not granted: {}", join_permissions(.missing))]
    PermissionDenied {
        /// Capabilities still missing.
        missing: Vec<Permission>,
    },

    /// The adapter has not been started.
    #[error("Bluetooth adapter is not started. Start the adapter before scanning or connecting.")]
    NotReady,

    /// A caller-supplied argument was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Another discovery pass is still inside its window.
    #[error("A scan is already in progress. Wait for it to finish before scanning again.")]
    ScanInProgress,

    /// Another connect attempt is in flight.
    #[error("A connection attempt to '{peripheral_id}' is already in progress")]
    ConnectInProgress {
        /// Peripheral currently being connected.
        peripheral_id: String,
    },

    /// A different peripheral is connected.
    #[error("Already connected to '{peripheral_id}'. Disconnect it before connecting another ball.")]
    AlreadyConnected {
        /// Peripheral currently connected.
        peripheral_id: String,
    },

    /// A connect attempt failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The platform stack reported an error outside a connect attempt.
    #[error("Bluetooth platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl SessionError {
    /// Returns `true` if retrying after waiting may succeed without any
    /// other action from the user.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ScanInProgress
                | Self::ConnectInProgress { .. }
                | Self::Connect(ConnectError::Timeout { .. })
        )
    }
}

fn join_permissions(permissions: &[Permission]) -> String {
    permissions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
