//! Fixed-window discovery passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::error::{SessionError, SessionResult};
use crate::platform::{BlePlatform, Clock};
use crate::types::PeripheralRecord;

/// Validate a caller-supplied window length in milliseconds.
///
/// # Errors
///
/// Returns [`SessionError::InvalidArgument`] for zero or negative values.
pub fn scan_window(duration_ms: i64) -> SessionResult<Duration> {
    u64::try_from(duration_ms)
        .ok()
        .filter(|&ms| ms > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| {
            SessionError::InvalidArgument(format!(
                "scan duration must be a positive number of milliseconds (got {duration_ms})"
            ))
        })
}

/// Radio-side scan ceiling for a window, in whole seconds, rounded up.
fn platform_timeout_secs(window: Duration) -> u64 {
    let millis = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    millis.div_ceil(1000).max(1)
}

/// Runs one discovery pass at a time and keeps the latest snapshot.
pub struct DiscoveryPass {
    platform: Arc<dyn BlePlatform>,
    clock: Arc<dyn Clock>,
    scanning: AtomicBool,
    snapshot: RwLock<Vec<PeripheralRecord>>,
}

/// Releases the scan slot when the pass ends, including on cancellation.
struct ScanSlot<'a>(&'a AtomicBool);

impl Drop for ScanSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DiscoveryPass {
    /// Create a discovery pass runner.
    pub fn new(platform: Arc<dyn BlePlatform>, clock: Arc<dyn Clock>) -> Self {
        Self {
            platform,
            clock,
            scanning: AtomicBool::new(false),
            snapshot: RwLock::new(Vec::new()),
        }
    }

    /// Scan for `window` and return every peripheral seen during it.
    ///
    /// The window always runs to completion. The result replaces the
    /// previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ScanInProgress`] while another pass is open,
    /// or [`SessionError::Platform`] if the platform scan fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn run(
        &self,
        window: Duration,
        allow_duplicates: bool,
    ) -> SessionResult<Vec<PeripheralRecord>> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("rejecting scan, window still open");
            return Err(SessionError::ScanInProgress);
        }
        let _slot = ScanSlot(&self.scanning);

        let timeout_secs = platform_timeout_secs(window);
        info!(
            window_ms = window.as_millis(),
            allow_duplicates, "starting discovery pass"
        );
        self.platform
            .scan_for_peripherals(&[], timeout_secs, allow_duplicates)
            .await?;

        self.clock.sleep(window).await;

        let peripherals = self.platform.discovered_peripherals().await?;
        info!(count = peripherals.len(), "discovery pass complete");

        *self.snapshot.write().await = peripherals.clone();
        Ok(peripherals)
    }

    /// Returns `true` while a window is open.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Result of the latest completed pass.
    pub async fn snapshot(&self) -> Vec<PeripheralRecord> {
        self.snapshot.read().await.clone()
    }

    /// Look up a peripheral in the latest snapshot.
    pub async fn find(&self, peripheral_id: &str) -> Option<PeripheralRecord> {
        self.snapshot
            .read()
            .await
            .iter()
            .find(|p| p.has_id(peripheral_id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPlatform, PlatformCall};
    use crate::platform::TokioClock;

    fn pass(platform: &Arc<MockPlatform>) -> DiscoveryPass {
        DiscoveryPass::new(platform.clone(), Arc::new(TokioClock))
    }

    #[test]
    fn test_scan_window_rejects_non_positive() {
        for ms in [0, -1, -5000, i64::MIN] {
            assert!(matches!(
                scan_window(ms),
                Err(SessionError::InvalidArgument(_))
            ));
        }
        assert_eq!(scan_window(5000).unwrap(), Duration::from_millis(5000));
    }

    #[test]
    fn test_platform_timeout_rounds_up() {
        assert_eq!(platform_timeout_secs(Duration::from_millis(1)), 1);
        assert_eq!(platform_timeout_secs(Duration::from_millis(5000)), 5);
        assert_eq!(platform_timeout_secs(Duration::from_millis(5001)), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_waits_full_window() {
        let platform = Arc::new(MockPlatform::demo());
        let discovery = pass(&platform);

        let started = tokio::time::Instant::now();
        let found = discovery
            .run(Duration::from_millis(3000), true)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert_eq!(found.len(), 2);
        assert!(platform.calls().contains(&PlatformCall::ScanForPeripherals {
            timeout_secs: 3,
            allow_duplicates: true,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_pass_while_open_is_rejected() {
        let platform = Arc::new(MockPlatform::demo());
        let discovery = Arc::new(pass(&platform));

        let first = tokio::spawn({
            let discovery = Arc::clone(&discovery);
            async move { discovery.run(Duration::from_secs(5), false).await }
        });
        tokio::task::yield_now().await;
        assert!(discovery.is_scanning());

        let second = discovery.run(Duration::from_secs(5), false).await;
        assert_eq!(second, Err(SessionError::ScanInProgress));

        assert_eq!(first.await.unwrap().unwrap().len(), 2);
        assert!(!discovery.is_scanning());
        assert!(discovery.run(Duration::from_secs(1), false).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_is_superseded() {
        let platform = Arc::new(MockPlatform::demo());
        let discovery = pass(&platform);

        discovery.run(Duration::from_secs(1), true).await.unwrap();
        assert!(discovery.find("aa:bb").await.is_some());

        platform.set_peripherals(vec![PeripheralRecord::new("EE:FF")]);
        discovery.run(Duration::from_secs(1), true).await.unwrap();

        assert!(discovery.find("AA:BB").await.is_none());
        assert_eq!(discovery.snapshot().await, vec![PeripheralRecord::new("EE:FF")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_platform_failure_releases_slot() {
        let platform = Arc::new(MockPlatform::demo().fail_scan(
            crate::platform::PlatformError::Operation("radio busy".into()),
        ));
        let discovery = pass(&platform);

        let err = discovery.run(Duration::from_secs(1), true).await.unwrap_err();
        assert!(matches!(err, SessionError::Platform(_)));
        assert!(!discovery.is_scanning());
    }
}
