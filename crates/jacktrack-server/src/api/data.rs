//! Data management API endpoints: backup export, import and wipe.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use jacktrack_core::backup::{self, Backup};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the data management router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", delete(delete_all))
        .route("/export", get(export_data))
        .route("/import", post(import_data))
}

/// Import result.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"imported_rounds": 4}))]
pub struct ImportResponse {
    /// Rounds now stored.
    #[schema(example = 4)]
    pub imported_rounds: usize,
}

/// Export everything.
#[utoipa::path(
    get,
    path = "/api/data/export",
    tag = "data",
    operation_id = "exportData",
    summary = "Export a backup",
    description = "Returns every round and the settings in one document that \
        can be passed back to the import endpoint.",
    responses(
        (status = 200, description = "Backup created", body = Backup)
    )
)]
pub async fn export_data(State(state): State<SharedState>) -> Json<Backup> {
    let rounds = state.rounds().await;
    let settings = state.settings().await;
    Json(backup::export(&rounds, &settings))
}

/// Replace everything with a backup.
#[utoipa::path(
    post,
    path = "/api/data/import",
    tag = "data",
    operation_id = "importData",
    summary = "Import a backup",
    description = "Replaces all rounds and settings. Rounds are validated first; \
        an invalid backup changes nothing.",
    request_body = Backup,
    responses(
        (status = 200, description = "Backup imported", body = ImportResponse),
        (status = 400, description = "Invalid backup", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn import_data(
    State(state): State<SharedState>,
    body: Result<Json<Backup>, JsonRejection>,
) -> ApiResult<Json<ImportResponse>> {
    let Json(data) = body?;
    let mut rounds = state.rounds_mut().await;
    let mut settings = state.settings_mut().await;
    backup::import(data, &mut rounds, &mut settings)?;

    Ok(Json(ImportResponse {
        imported_rounds: rounds.all().len(),
    }))
}

/// Delete everything.
#[utoipa::path(
    delete,
    path = "/api/data",
    tag = "data",
    operation_id = "deleteAllData",
    summary = "Delete all data",
    description = "Removes every stored round and resets settings to defaults. \
        Cannot be undone.",
    responses(
        (status = 204, description = "All data deleted")
    )
)]
pub async fn delete_all(State(state): State<SharedState>) -> ApiResult<StatusCode> {
    let mut rounds = state.rounds_mut().await;
    let mut settings = state.settings_mut().await;
    backup::delete_all(&mut rounds, &mut settings)?;
    Ok(StatusCode::NO_CONTENT)
}
