//! Boundary with the platform BLE stack.
//!
//! The session never talks to a radio directly. Everything it needs from the
//! operating system goes through [`BlePlatform`], which keeps the session
//! logic testable against [`MockPlatform`](crate::mock::MockPlatform) and
//! lets the Linux build plug in BlueZ.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Permission, PeripheralRecord, ServiceTable, StartOptions};

/// Errors reported by a platform BLE implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// No usable Bluetooth adapter on this system.
    #[error("No Bluetooth adapter available: {0}")]
    AdapterUnavailable(String),

    /// The platform does not know the requested peripheral.
    #[error("Peripheral not found: {0}")]
    PeripheralNotFound(String),

    /// The peripheral address could not be parsed by the platform.
    #[error("Invalid peripheral address: {0}")]
    InvalidAddress(String),

    /// Any other failure reported by the stack.
    #[error("Bluetooth operation failed: {0}")]
    Operation(String),
}

/// Result type for platform calls.
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Operations the session needs from the platform BLE stack.
///
/// Calls are thin and stateless from the session's point of view: ordering,
/// exclusivity and state tracking all live in the session.
#[async_trait]
pub trait BlePlatform: Send + Sync {
    /// Whether this platform grants BLE capabilities at runtime.
    ///
    /// Platforms without a runtime permission model return `false` and the
    /// permission gate treats them as granted.
    fn requires_runtime_permissions(&self) -> bool;

    /// Ask the user for `capabilities` and return the ones granted.
    async fn request_permissions(
        &self,
        capabilities: &[Permission],
    ) -> PlatformResult<BTreeSet<Permission>>;

    /// Initialize the local Bluetooth stack.
    async fn adapter_start(&self, options: StartOptions) -> PlatformResult<()>;

    /// Begin scanning. Returns as soon as the scan is running; results are
    /// read with [`discovered_peripherals`](Self::discovered_peripherals).
    async fn scan_for_peripherals(
        &self,
        service_filters: &[String],
        timeout_secs: u64,
        allow_duplicates: bool,
    ) -> PlatformResult<()>;

    /// Peripherals seen since the last scan began.
    async fn discovered_peripherals(&self) -> PlatformResult<Vec<PeripheralRecord>>;

    /// Establish a link to `peripheral_id`.
    async fn connect(&self, peripheral_id: &str) -> PlatformResult<()>;

    /// Resolve the service/characteristic table of a linked peripheral.
    async fn retrieve_services(&self, peripheral_id: &str) -> PlatformResult<ServiceTable>;

    /// Tear down the link to `peripheral_id`.
    async fn disconnect(&self, peripheral_id: &str) -> PlatformResult<()>;
}

/// Time source for the scan window.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer.
///
/// Under `tokio::time::pause` the window elapses instantly, which is how the
/// tests drive multi-second scans.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
