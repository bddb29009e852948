//! Lifecycle of the platform BLE stack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use super::error::{SessionError, SessionResult};
use crate::platform::BlePlatform;
use crate::types::StartOptions;

/// Readiness of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    /// `start` has not completed yet.
    Uninitialized,
    /// The stack is up; scan and connect are allowed.
    Ready,
}

/// Starts the platform stack once and tracks whether it is ready.
pub struct AdapterSession {
    platform: Arc<dyn BlePlatform>,
    ready: AtomicBool,
    starting: Mutex<()>,
}

impl AdapterSession {
    /// Create an adapter session for `platform`.
    pub fn new(platform: Arc<dyn BlePlatform>) -> Self {
        Self {
            platform,
            ready: AtomicBool::new(false),
            starting: Mutex::new(()),
        }
    }

    /// Start the underlying stack.
    ///
    /// Idempotent: once ready, further calls return immediately without
    /// touching the platform. Concurrent callers wait for the first one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Platform`] if the stack fails to start. The
    /// adapter stays uninitialized and `start` may be retried.
    #[instrument(skip(self), level = "debug")]
    pub async fn start(&self, options: StartOptions) -> SessionResult<AdapterState> {
        if self.is_ready() {
            debug!("adapter already started");
            return Ok(AdapterState::Ready);
        }

        let _starting = self.starting.lock().await;
        if self.is_ready() {
            return Ok(AdapterState::Ready);
        }

        self.platform.adapter_start(options).await?;
        self.ready.store(true, Ordering::Release);
        info!(
            suppress_system_alert = options.suppress_system_alert,
            "bluetooth adapter started"
        );
        Ok(AdapterState::Ready)
    }

    /// Current readiness.
    #[must_use]
    pub fn state(&self) -> AdapterState {
        if self.is_ready() {
            AdapterState::Ready
        } else {
            AdapterState::Uninitialized
        }
    }

    /// Returns `true` once `start` has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Fail with [`SessionError::NotReady`] unless started.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] before `start` has completed.
    pub fn ensure_ready(&self) -> SessionResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(SessionError::NotReady)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPlatform;
    use crate::platform::PlatformError;

    #[tokio::test]
    async fn test_start_twice_initializes_once() {
        let platform = Arc::new(MockPlatform::new());
        let adapter = AdapterSession::new(platform.clone());

        assert_eq!(adapter.state(), AdapterState::Uninitialized);
        assert_eq!(
            adapter.start(StartOptions::default()).await.unwrap(),
            AdapterState::Ready
        );
        assert_eq!(
            adapter.start(StartOptions::default()).await.unwrap(),
            AdapterState::Ready
        );
        assert_eq!(platform.adapter_start_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_start_initializes_once() {
        let platform = Arc::new(MockPlatform::new());
        let adapter = Arc::new(AdapterSession::new(platform.clone()));

        let a = tokio::spawn({
            let adapter = Arc::clone(&adapter);
            async move { adapter.start(StartOptions::default()).await }
        });
        let b = tokio::spawn({
            let adapter = Arc::clone(&adapter);
            async move { adapter.start(StartOptions::default()).await }
        });

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(platform.adapter_start_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_start_can_be_retried() {
        let platform = Arc::new(
            MockPlatform::new()
                .fail_adapter_start(PlatformError::AdapterUnavailable("powered off".into())),
        );
        let adapter = AdapterSession::new(platform.clone());

        let err = adapter.start(StartOptions::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::Platform(_)));
        assert_eq!(adapter.ensure_ready(), Err(SessionError::NotReady));

        platform.clear_adapter_failure();
        assert!(adapter.start(StartOptions::default()).await.is_ok());
        assert_eq!(platform.adapter_start_count(), 2);
    }
}
