//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use jacktrack_core::{
    BlePlatform, BleSession, BlobStore, Config, FileBlobStore, RoundHistory, SettingsStore,
};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// State handle passed to every handler.
pub type SharedState = AppState;

/// Shared application state. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    session: Arc<BleSession>,
    rounds: RwLock<RoundHistory>,
    settings: RwLock<SettingsStore>,
    started_at: Instant,
}

impl AppState {
    /// Build state over an explicit platform and document store.
    ///
    /// # Errors
    ///
    /// Returns an error if stored rounds or settings cannot be loaded.
    pub fn new(
        config: Config,
        platform: Arc<dyn BlePlatform>,
        store: Arc<dyn BlobStore>,
    ) -> jacktrack_core::Result<Self> {
        let session = Arc::new(BleSession::new(platform, &config.ble));
        let rounds = RoundHistory::load(Arc::clone(&store))?;
        let settings = SettingsStore::load(store)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                session,
                rounds: RwLock::new(rounds),
                settings: RwLock::new(settings),
                started_at: Instant::now(),
            }),
        })
    }

    /// Build state with a file store under `config.storage.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if stored rounds or settings cannot be loaded.
    pub fn with_file_store(
        config: Config,
        platform: Arc<dyn BlePlatform>,
    ) -> jacktrack_core::Result<Self> {
        let store = Arc::new(FileBlobStore::new(config.storage.data_dir.clone()));
        Self::new(config, platform, store)
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The BLE session.
    #[must_use]
    pub fn session(&self) -> &BleSession {
        &self.inner.session
    }

    /// Get read access to the round history.
    pub async fn rounds(&self) -> RwLockReadGuard<'_, RoundHistory> {
        self.inner.rounds.read().await
    }

    /// Get write access to the round history.
    pub async fn rounds_mut(&self) -> RwLockWriteGuard<'_, RoundHistory> {
        self.inner.rounds.write().await
    }

    /// Get read access to settings.
    pub async fn settings(&self) -> RwLockReadGuard<'_, SettingsStore> {
        self.inner.settings.read().await
    }

    /// Get write access to settings.
    pub async fn settings_mut(&self) -> RwLockWriteGuard<'_, SettingsStore> {
        self.inner.settings.write().await
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use jacktrack_core::{MemoryBlobStore, MockPlatform};

    use super::*;

    /// State over the demo mock platform and an in-memory store.
    pub fn demo_state() -> (AppState, Arc<MockPlatform>) {
        let platform = Arc::new(MockPlatform::demo());
        let state = AppState::new(
            Config::default(),
            platform.clone(),
            Arc::new(MemoryBlobStore::new()),
        )
        .unwrap();
        (state, platform)
    }
}
