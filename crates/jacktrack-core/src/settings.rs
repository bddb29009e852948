//! User settings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::storage::{load_document, save_document, BlobStore, StoreResult, SETTINGS_KEY};

/// Application settings. Missing fields take their defaults when loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Settings {
    /// Dark colour scheme.
    pub dark_mode: bool,
    /// Push notifications.
    pub notifications: bool,
    /// Haptic feedback.
    pub vibration: bool,
    /// Sync rounds automatically.
    pub auto_sync: bool,
    /// Reduce radio activity to save battery.
    pub battery_optimization: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dark_mode: false,
            notifications: true,
            vibration: true,
            auto_sync: true,
            battery_optimization: false,
        }
    }
}

/// Partial update to [`Settings`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"dark_mode": true}))]
pub struct SettingsPatch {
    /// New dark mode value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark_mode: Option<bool>,
    /// New notifications value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<bool>,
    /// New vibration value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibration: Option<bool>,
    /// New auto sync value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_sync: Option<bool>,
    /// New battery optimization value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_optimization: Option<bool>,
}

impl SettingsPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply(&self, settings: &mut Settings) {
        let fields = [
            (&mut settings.dark_mode, self.dark_mode),
            (&mut settings.notifications, self.notifications),
            (&mut settings.vibration, self.vibration),
            (&mut settings.auto_sync, self.auto_sync),
            (&mut settings.battery_optimization, self.battery_optimization),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
    }
}

/// Settings backed by a [`BlobStore`].
pub struct SettingsStore {
    store: Arc<dyn BlobStore>,
    current: Settings,
}

impl SettingsStore {
    /// Load settings, falling back to defaults when none are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored document cannot be read or parsed.
    pub fn load(store: Arc<dyn BlobStore>) -> StoreResult<Self> {
        let current = load_document(store.as_ref(), SETTINGS_KEY)?.unwrap_or_default();
        Ok(Self { store, current })
    }

    /// Current settings.
    #[must_use]
    pub fn get(&self) -> Settings {
        self.current
    }

    /// Apply `patch` and save the full settings object.
    ///
    /// # Errors
    ///
    /// Returns a store error; the in-memory settings are unchanged on error.
    pub fn update(&mut self, patch: &SettingsPatch) -> StoreResult<Settings> {
        let mut next = self.current;
        patch.apply(&mut next);
        self.replace(next)
    }

    /// Replace every setting and save.
    ///
    /// # Errors
    ///
    /// Returns a store error; the in-memory settings are unchanged on error.
    pub fn replace(&mut self, settings: Settings) -> StoreResult<Settings> {
        save_document(self.store.as_ref(), SETTINGS_KEY, &settings)?;
        self.current = settings;
        debug!(?settings, "settings saved");
        Ok(settings)
    }

    /// Delete stored settings and return to defaults.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn reset(&mut self) -> StoreResult<Settings> {
        self.store.remove(SETTINGS_KEY)?;
        self.current = Settings::default();
        Ok(self.current)
    }
}
