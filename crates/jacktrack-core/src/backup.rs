//! Export, import and wipe of all stored data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::rounds::{RoundHistory, RoundRecord, RoundResult};
use crate::settings::{Settings, SettingsStore};

/// Snapshot of every stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Backup {
    /// When the snapshot was taken.
    pub exported_at: DateTime<Utc>,
    /// Round history.
    #[serde(default)]
    pub games: Vec<RoundRecord>,
    /// Settings.
    #[serde(default)]
    pub settings: Settings,
}

/// Snapshot the current rounds and settings.
#[must_use]
pub fn export(rounds: &RoundHistory, settings: &SettingsStore) -> Backup {
    Backup {
        exported_at: Utc::now(),
        games: rounds.all().to_vec(),
        settings: settings.get(),
    }
}

/// Replace rounds and settings with the contents of `backup`.
///
/// Rounds are validated before anything is written. If the settings cannot
/// be saved, the previous rounds are written back so neither document
/// changes.
///
/// # Errors
///
/// Returns a validation error or a store error.
pub fn import(
    backup: Backup,
    rounds: &mut RoundHistory,
    settings: &mut SettingsStore,
) -> RoundResult<()> {
    let count = backup.games.len();
    let previous = rounds.all().to_vec();
    rounds.replace_all(backup.games)?;
    if let Err(err) = settings.replace(backup.settings) {
        if let Err(restore) = rounds.replace_all(previous) {
            warn!(error = %restore, "failed to restore rounds after import failure");
        }
        return Err(err.into());
    }
    info!(
        rounds = count,
        exported_at = %backup.exported_at,
        "backup imported"
    );
    Ok(())
}

/// Delete every stored document and reset in-memory state.
///
/// # Errors
///
/// Returns the first store error.
pub fn delete_all(rounds: &mut RoundHistory, settings: &mut SettingsStore) -> RoundResult<()> {
    rounds.clear()?;
    settings.reset()?;
    warn!("all stored data deleted");
    Ok(())
}
