//! Runtime permission gate.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::error::{SessionError, SessionResult};
use crate::platform::BlePlatform;
use crate::types::Permission;

/// Outcome of a successful [`PermissionGate::ensure_permissions`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Granted {
    /// Capabilities held by the process.
    pub permissions: Vec<Permission>,

    /// Whether this call asked the platform, which may have shown a dialog.
    pub prompted: bool,
}

/// Requests the capabilities BLE scanning needs and remembers the answer.
pub struct PermissionGate {
    platform: Arc<dyn BlePlatform>,
    granted: RwLock<BTreeSet<Permission>>,
    prompt: Mutex<()>,
}

impl PermissionGate {
    /// Create a gate for `platform`.
    pub fn new(platform: Arc<dyn BlePlatform>) -> Self {
        Self {
            platform,
            granted: RwLock::new(BTreeSet::new()),
            prompt: Mutex::new(()),
        }
    }

    /// Make sure every [`Permission::REQUIRED`] capability is held.
    ///
    /// Only missing capabilities are requested, so a second call after a
    /// full grant does not prompt again.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::PermissionDenied`] listing what is still
    /// missing, or [`SessionError::Platform`] if the request itself failed.
    pub async fn ensure_permissions(&self) -> SessionResult<Granted> {
        let _prompt = self.prompt.lock().await;

        if !self.platform.requires_runtime_permissions() {
            let mut granted = self.granted.write().await;
            granted.extend(Permission::REQUIRED);
            return Ok(Granted {
                permissions: granted.iter().copied().collect(),
                prompted: false,
            });
        }

        let missing = self.missing().await;
        if missing.is_empty() {
            debug!("bluetooth permissions already granted");
            return Ok(Granted {
                permissions: self.granted.read().await.iter().copied().collect(),
                prompted: false,
            });
        }

        info!(requested = ?missing, "requesting bluetooth permissions");
        let newly_granted = self.platform.request_permissions(&missing).await?;

        let mut granted = self.granted.write().await;
        granted.extend(newly_granted);
        let still_missing: Vec<Permission> = Permission::REQUIRED
            .into_iter()
            .filter(|p| !granted.contains(p))
            .collect();

        if still_missing.is_empty() {
            info!("bluetooth permissions granted");
            Ok(Granted {
                permissions: granted.iter().copied().collect(),
                prompted: true,
            })
        } else {
            warn!(missing = ?still_missing, "bluetooth permissions denied");
            Err(SessionError::PermissionDenied {
                missing: still_missing,
            })
        }
    }

    /// Fail fast unless every required capability is held.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::PermissionDenied`] with the missing set.
    pub async fn check(&self) -> SessionResult<()> {
        if !self.platform.requires_runtime_permissions() {
            return Ok(());
        }
        let missing = self.missing().await;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SessionError::PermissionDenied { missing })
        }
    }

    async fn missing(&self) -> Vec<Permission> {
        let granted = self.granted.read().await;
        Permission::REQUIRED
            .into_iter()
            .filter(|p| !granted.contains(p))
            .collect()
    }
}
