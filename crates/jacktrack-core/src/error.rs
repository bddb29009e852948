//! Unified error types for the JackTrack core library.
//!
//! This module provides a unified error type [`JackTrackError`] that covers all
//! failure modes across the system. Each module also has its own specific error
//! types (`SessionError`, `PlatformError`, `RoundError`, `StoreError`,
//! `ConfigError`) for internal use; they all convert into this one.
//!
//! # Example
//!
//! ```rust
//! use jacktrack_core::error::{JackTrackError, Result};
//!
//! fn require_holes(holes: u8) -> Result<()> {
//!     if holes != 9 && holes != 18 {
//!         return Err(JackTrackError::InvalidRound {
//!             field: "holes",
//!             message: "must be 9 or 18".into(),
//!         });
//!     }
//!     Ok(())
//! }
//! # assert!(require_holes(12).is_err());
//! ```

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::bluetooth::{ConnectError, SessionError};
use crate::platform::PlatformError;
use crate::types::Permission;

/// The unified error type for all JackTrack operations.
#[derive(Debug, Error)]
pub enum JackTrackError {
    // =========================================================================
    // BLUETOOTH SESSION ERRORS
    // =========================================================================
    /// Required runtime permissions were not granted.
    #[error("Bluetooth permissions not granted. Allow {} in system settings.", join(.0))]
    PermissionDenied(Vec<Permission>),

    /// The adapter has not been started.
    #[error("Bluetooth adapter is not started. Start the adapter before scanning or connecting.")]
    AdapterNotReady,

    /// A request argument was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Another discovery pass is running.
    #[error("A scan is already in progress. Wait for it to finish before scanning again.")]
    ScanInProgress,

    /// Another connect attempt is in flight.
    #[error("A connection attempt to '{0}' is already in progress")]
    ConnectInProgress(String),

    /// A different ball is connected.
    #[error("Already connected to '{0}'. Disconnect it before connecting another ball.")]
    AlreadyConnected(String),

    /// The peripheral is not known.
    #[error("Peripheral not found: '{0}'. Scan again and make sure the ball is awake and in range.")]
    PeripheralNotFound(String),

    /// Connect did not finish within the timeout.
    #[error("Connecting to '{peripheral_id}' timed out after {timeout_secs} seconds")]
    ConnectTimeout {
        /// Requested peripheral.
        peripheral_id: String,
        /// Timeout that expired.
        timeout_secs: u64,
    },

    /// Services of a linked peripheral could not be read.
    #[error("Failed to resolve services of '{peripheral_id}': {reason}")]
    ServiceResolutionFailed {
        /// Requested peripheral.
        peripheral_id: String,
        /// Platform-reported reason.
        reason: String,
    },

    /// The link could not be established.
    #[error("Failed to connect to '{peripheral_id}': {reason}")]
    LinkFailed {
        /// Requested peripheral.
        peripheral_id: String,
        /// Platform-reported reason.
        reason: String,
    },

    /// No usable Bluetooth adapter.
    #[error("No Bluetooth adapter available: {0}. Ensure Bluetooth hardware is present and bluetoothd is running.")]
    AdapterUnavailable(String),

    /// Any other platform stack failure.
    #[error("Bluetooth operation failed: {0}")]
    BluetoothOperationFailed(String),

    // =========================================================================
    // ROUND HISTORY ERRORS
    // =========================================================================
    /// No round with this id.
    #[error("Round not found: {0}")]
    RoundNotFound(Uuid),

    /// A round field is invalid.
    #[error("Invalid round: {field} {message}")]
    InvalidRound {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// A document could not be read or written.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A stored document is not in the expected format.
    #[error("Stored data is corrupt: {0}")]
    CorruptData(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for JackTrack operations.
pub type Result<T> = std::result::Result<T, JackTrackError>;

impl JackTrackError {
    /// Returns `true` if this error comes from the BLE session or platform.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_)
                | Self::AdapterNotReady
                | Self::ScanInProgress
                | Self::ConnectInProgress(_)
                | Self::AlreadyConnected(_)
                | Self::PeripheralNotFound(_)
                | Self::ConnectTimeout { .. }
                | Self::ServiceResolutionFailed { .. }
                | Self::LinkFailed { .. }
                | Self::AdapterUnavailable(_)
                | Self::BluetoothOperationFailed(_)
        )
    }

    /// Returns `true` if this error is related to round history.
    #[inline]
    #[must_use]
    pub const fn is_round_error(&self) -> bool {
        matches!(self, Self::RoundNotFound(_) | Self::InvalidRound { .. })
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(
            self,
            Self::PersistenceError(_) | Self::CorruptData(_) | Self::IoError(_)
        )
    }

    /// Subsystem the error came from, for log fields.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        if self.is_bluetooth_error() {
            "bluetooth"
        } else if self.is_round_error() {
            "rounds"
        } else if self.is_config_error() {
            "config"
        } else if self.is_io_error() {
            "storage"
        } else {
            "request"
        }
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ScanInProgress
                | Self::ConnectInProgress(_)
                | Self::ConnectTimeout { .. }
                | Self::PeripheralNotFound(_)
                | Self::LinkFailed { .. }
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidArgument(_) | Self::InvalidRound { .. } => 400,

            // 404 Not Found
            Self::PeripheralNotFound(_) | Self::RoundNotFound(_) | Self::ConfigNotFound(_) => 404,

            // 409 Conflict - another operation owns the resource
            Self::ScanInProgress | Self::ConnectInProgress(_) | Self::AlreadyConnected(_) => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 424 Failed Dependency - a prerequisite step has not happened
            Self::PermissionDenied(_) | Self::AdapterNotReady => 424,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::CorruptData(_) | Self::IoError(_) => 500,

            // 503 Service Unavailable - Bluetooth hardware or link issues
            Self::AdapterUnavailable(_)
            | Self::BluetoothOperationFailed(_)
            | Self::LinkFailed { .. }
            | Self::ServiceResolutionFailed { .. } => 503,

            // 504 Gateway Timeout - the peripheral did not answer in time
            Self::ConnectTimeout { .. } => 504,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::AdapterNotReady => "ADAPTER_NOT_READY",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::ScanInProgress => "SCAN_IN_PROGRESS",
            Self::ConnectInProgress(_) => "CONNECT_IN_PROGRESS",
            Self::AlreadyConnected(_) => "ALREADY_CONNECTED",
            Self::PeripheralNotFound(_) => "PERIPHERAL_NOT_FOUND",
            Self::ConnectTimeout { .. } => "CONNECT_TIMEOUT",
            Self::ServiceResolutionFailed { .. } => "SERVICE_RESOLUTION_FAILED",
            Self::LinkFailed { .. } => "LINK_FAILED",
            Self::AdapterUnavailable(_) => "ADAPTER_UNAVAILABLE",
            Self::BluetoothOperationFailed(_) => "BLUETOOTH_OPERATION_FAILED",
            Self::RoundNotFound(_) => "ROUND_NOT_FOUND",
            Self::InvalidRound { .. } => "INVALID_ROUND",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::CorruptData(_) => "CORRUPT_DATA",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

fn join(permissions: &[Permission]) -> String {
    permissions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<PlatformError> for JackTrackError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::AdapterUnavailable(reason) => Self::AdapterUnavailable(reason),
            PlatformError::PeripheralNotFound(id) => Self::PeripheralNotFound(id),
            PlatformError::InvalidAddress(address) => {
                Self::InvalidArgument(format!("invalid Bluetooth address '{address}'"))
            }
            PlatformError::Operation(reason) => Self::BluetoothOperationFailed(reason),
        }
    }
}

impl From<ConnectError> for JackTrackError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::NotFound { peripheral_id } => Self::PeripheralNotFound(peripheral_id),
            ConnectError::Timeout {
                peripheral_id,
                timeout_secs,
            } => Self::ConnectTimeout {
                peripheral_id,
                timeout_secs,
            },
            ConnectError::ServiceResolutionFailed {
                peripheral_id,
                reason,
            } => Self::ServiceResolutionFailed {
                peripheral_id,
                reason,
            },
            ConnectError::LinkFailed {
                peripheral_id,
                reason,
            } => Self::LinkFailed {
                peripheral_id,
                reason,
            },
        }
    }
}

impl From<SessionError> for JackTrackError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::PermissionDenied { missing } => Self::PermissionDenied(missing),
            SessionError::NotReady => Self::AdapterNotReady,
            SessionError::InvalidArgument(message) => Self::InvalidArgument(message),
            SessionError::ScanInProgress => Self::ScanInProgress,
            SessionError::ConnectInProgress { peripheral_id } => {
                Self::ConnectInProgress(peripheral_id)
            }
            SessionError::AlreadyConnected { peripheral_id } => {
                Self::AlreadyConnected(peripheral_id)
            }
            SessionError::Connect(e) => e.into(),
            SessionError::Platform(e) => e.into(),
        }
    }
}

impl From<crate::storage::StoreError> for JackTrackError {
    fn from(err: crate::storage::StoreError) -> Self {
        use crate::storage::StoreError;
        match err {
            StoreError::InvalidKey(key) => {
                Self::PersistenceError(format!("invalid storage key '{key}'"))
            }
            StoreError::ParseError { key, source } => {
                Self::CorruptData(format!("document '{key}': {source}"))
            }
            e @ (StoreError::ReadError { .. }
            | StoreError::WriteError { .. }
            | StoreError::CreateDirError { .. }
            | StoreError::SerializeError(_)) => Self::PersistenceError(e.to_string()),
        }
    }
}

impl From<crate::rounds::RoundError> for JackTrackError {
    fn from(err: crate::rounds::RoundError) -> Self {
        use crate::rounds::RoundError;
        match err {
            RoundError::NotFound(id) => Self::RoundNotFound(id),
            RoundError::Invalid { field, message } => Self::InvalidRound { field, message },
            RoundError::Store(e) => e.into(),
        }
    }
}

impl From<crate::config::ConfigError> for JackTrackError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path.into()),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {path}: {source}"))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::rounds::RoundError;
    use crate::storage::StoreError;
    use std::io::{Error as IoErr, ErrorKind};

    fn timeout() -> JackTrackError {
        JackTrackError::ConnectTimeout {
            peripheral_id: "AA:BB".into(),
            timeout_secs: 10,
        }
    }

    #[test]
    fn test_bluetooth_error_classification() {
        assert!(JackTrackError::AdapterNotReady.is_bluetooth_error());
        assert!(JackTrackError::ScanInProgress.is_bluetooth_error());
        assert!(timeout().is_bluetooth_error());
        assert!(JackTrackError::PermissionDenied(vec![Permission::BluetoothScan])
            .is_bluetooth_error());

        assert!(!JackTrackError::RoundNotFound(Uuid::nil()).is_bluetooth_error());
        assert!(!JackTrackError::InvalidArgument("x".into()).is_bluetooth_error());
    }

    #[test]
    fn test_round_and_config_classification() {
        assert!(JackTrackError::RoundNotFound(Uuid::nil()).is_round_error());
        assert!(JackTrackError::ConfigParseError("syntax".into()).is_config_error());
        assert!(!JackTrackError::AdapterNotReady.is_config_error());
    }

    #[test]
    fn test_io_error_classification() {
        assert!(JackTrackError::PersistenceError("disk full".into()).is_io_error());
        assert!(JackTrackError::CorruptData("bad".into()).is_io_error());
        assert!(JackTrackError::IoError(IoErr::new(ErrorKind::NotFound, "x")).is_io_error());
        assert!(!JackTrackError::ScanInProgress.is_io_error());
    }

    #[test]
    fn test_category_follows_classification() {
        assert_eq!(timeout().category(), "bluetooth");
        assert_eq!(JackTrackError::RoundNotFound(Uuid::nil()).category(), "rounds");
        assert_eq!(
            JackTrackError::ConfigValidationError("port".into()).category(),
            "config"
        );
        assert_eq!(JackTrackError::CorruptData("bad".into()).category(), "storage");
        assert_eq!(JackTrackError::InvalidArgument("x".into()).category(), "request");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(JackTrackError::ScanInProgress.is_recoverable());
        assert!(timeout().is_recoverable());
        assert!(JackTrackError::PeripheralNotFound("ZZ:ZZ".into()).is_recoverable());
        assert!(!JackTrackError::AdapterNotReady.is_recoverable());
        assert!(!JackTrackError::AdapterUnavailable("none".into()).is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(JackTrackError::InvalidArgument("x".into()).http_status_code(), 400);
        assert_eq!(
            JackTrackError::PeripheralNotFound("ZZ:ZZ".into()).http_status_code(),
            404
        );
        assert_eq!(JackTrackError::ScanInProgress.http_status_code(), 409);
        assert_eq!(
            JackTrackError::AlreadyConnected("AA:BB".into()).http_status_code(),
            409
        );
        assert_eq!(JackTrackError::AdapterNotReady.http_status_code(), 424);
        assert_eq!(
            JackTrackError::PermissionDenied(Vec::new()).http_status_code(),
            424
        );
        assert_eq!(
            JackTrackError::PersistenceError("x".into()).http_status_code(),
            500
        );
        assert_eq!(
            JackTrackError::LinkFailed {
                peripheral_id: "AA:BB".into(),
                reason: "refused".into()
            }
            .http_status_code(),
            503
        );
        assert_eq!(timeout().http_status_code(), 504);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(JackTrackError::ScanInProgress.error_code(), "SCAN_IN_PROGRESS");
        assert_eq!(timeout().error_code(), "CONNECT_TIMEOUT");
        assert_eq!(
            JackTrackError::RoundNotFound(Uuid::nil()).error_code(),
            "ROUND_NOT_FOUND"
        );
    }

    #[test]
    fn test_from_session_error() {
        let err: JackTrackError = SessionError::Connect(ConnectError::NotFound {
            peripheral_id: "ZZ:ZZ".into(),
        })
        .into();
        assert!(matches!(err, JackTrackError::PeripheralNotFound(ref id) if id == "ZZ:ZZ"));

        let err: JackTrackError = SessionError::NotReady.into();
        assert!(matches!(err, JackTrackError::AdapterNotReady));

        let err: JackTrackError =
            SessionError::Platform(PlatformError::InvalidAddress("nope".into())).into();
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_from_round_error() {
        let id = Uuid::new_v4();
        let err: JackTrackError = RoundError::NotFound(id).into();
        assert!(matches!(err, JackTrackError::RoundNotFound(found) if found == id));

        let err: JackTrackError = RoundError::Store(StoreError::InvalidKey("a/b".into())).into();
        assert!(err.is_io_error());
    }

    #[test]
    fn test_from_config_error() {
        let err: JackTrackError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "ble.scan_duration_ms".into(),
                message: "must be positive".into(),
            },
            ConfigError::ValidationError {
                field: "server.port".into(),
                message: "must not be 0".into(),
            },
        ])
        .into();
        let message = err.to_string();
        assert!(message.contains("ble.scan_duration_ms"));
        assert!(message.contains("server.port"));
        assert_eq!(err.http_status_code(), 422);
    }

    #[test]
    fn test_error_display_messages() {
        let err = JackTrackError::PermissionDenied(vec![
            Permission::BluetoothScan,
            Permission::BluetoothConnect,
        ]);
        assert!(err.to_string().contains("BLUETOOTH_SCAN, BLUETOOTH_CONNECT"));

        let err = JackTrackError::PeripheralNotFound("ZZ:ZZ".into());
        assert!(err.to_string().contains("ZZ:ZZ"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<JackTrackError>();
        assert_sync::<JackTrackError>();
    }
}
