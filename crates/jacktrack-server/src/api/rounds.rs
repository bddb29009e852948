//! Round history API endpoints.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use jacktrack_core::{RoundDraft, RoundFilter, RoundRecord, RoundStats, RoundStatus};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the rounds router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_rounds).post(add_round))
        .route("/stats", get(get_stats))
        .route("/{id}", put(update_round).delete(delete_round))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing rounds.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoundsQuery {
    /// Only return rounds with this status. Omit or pass `all` for every round.
    #[param(example = "completed")]
    pub status: Option<String>,
}

impl RoundsQuery {
    fn filter(&self) -> ApiResult<RoundFilter> {
        match self.status.as_deref() {
            None | Some("all") => Ok(RoundFilter::All),
            Some(value) => value
                .parse::<RoundStatus>()
                .map(RoundFilter::Status)
                .map_err(|message| ApiError::BadRequest {
                    error_code: "invalid_status_filter".to_string(),
                    message,
                }),
        }
    }
}

/// Round list response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoundsResponse {
    /// Matching rounds, oldest first.
    pub rounds: Vec<RoundRecord>,

    /// Number of matching rounds.
    #[schema(example = 3)]
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// List rounds.
#[utoipa::path(
    get,
    path = "/api/rounds",
    tag = "rounds",
    operation_id = "listRounds",
    summary = "List rounds",
    description = "Returns the round history, optionally filtered by status \
        (`completed`, `in-progress` or `upcoming`).",
    params(RoundsQuery),
    responses(
        (status = 200, description = "Rounds retrieved", body = RoundsResponse),
        (status = 400, description = "Unknown status filter", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn list_rounds(
    State(state): State<SharedState>,
    query: Result<Query<RoundsQuery>, QueryRejection>,
) -> ApiResult<Json<RoundsResponse>> {
    let Query(query) = query?;
    let filter = query.filter()?;
    let rounds = state.rounds().await.list(filter);

    Ok(Json(RoundsResponse {
        total: rounds.len(),
        rounds,
    }))
}

/// Record a new round.
#[utoipa::path(
    post,
    path = "/api/rounds",
    tag = "rounds",
    operation_id = "addRound",
    summary = "Add a round",
    request_body = RoundDraft,
    responses(
        (status = 201, description = "Round added", body = RoundRecord),
        (status = 400, description = "Invalid round", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn add_round(
    State(state): State<SharedState>,
    body: Result<Json<RoundDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RoundRecord>)> {
    let Json(draft) = body?;
    let record = state.rounds_mut().await.add(draft)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Aggregate statistics.
#[utoipa::path(
    get,
    path = "/api/rounds/stats",
    tag = "rounds",
    operation_id = "getRoundStats",
    summary = "Get round statistics",
    description = "Rounds played, average score and best score over completed rounds.",
    responses(
        (status = 200, description = "Statistics computed", body = RoundStats)
    )
)]
pub async fn get_stats(State(state): State<SharedState>) -> Json<RoundStats> {
    Json(state.rounds().await.stats())
}

/// Replace a round.
#[utoipa::path(
    put,
    path = "/api/rounds/{id}",
    tag = "rounds",
    operation_id = "updateRound",
    summary = "Update a round",
    params(("id" = Uuid, Path, description = "Round id")),
    request_body = RoundDraft,
    responses(
        (status = 200, description = "Round updated", body = RoundRecord),
        (status = 400, description = "Invalid round", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Round not found", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn update_round(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    body: Result<Json<RoundDraft>, JsonRejection>,
) -> ApiResult<Json<RoundRecord>> {
    let Json(draft) = body?;
    let record = state.rounds_mut().await.update(id, draft)?;
    Ok(Json(record))
}

/// Delete a round.
#[utoipa::path(
    delete,
    path = "/api/rounds/{id}",
    tag = "rounds",
    operation_id = "deleteRound",
    summary = "Delete a round",
    params(("id" = Uuid, Path, description = "Round id")),
    responses(
        (status = 204, description = "Round deleted"),
        (status = 404, description = "Round not found", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn delete_round(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.rounds_mut().await.remove(id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use super::*;
    use crate::api::create_router;
    use crate::state::test_support::demo_state;

    fn server() -> TestServer {
        let (state, _) = demo_state();
        TestServer::new(create_router(state)).unwrap()
    }

    fn round(course: &str, score: u16, status: &str) -> Value {
        json!({
            "course": course,
            "date": "2024-01-15",
            "players": 4,
            "score": score,
            "par": 72,
            "holes": 18,
            "duration": "4h 32m",
            "weather": "Sunny, 72°F",
            "status": status
        })
    }

    #[tokio::test]
    async fn test_add_list_and_stats() {
        let server = server();
        for (course, score, status) in [
            ("Pebble Creek Golf Club", 89, "completed"),
            ("Augusta National", 92, "completed"),
            ("Torrey Pines", 0, "upcoming"),
        ] {
            server
                .post("/api/rounds")
                .json(&round(course, score, status))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let all = server.get("/api/rounds").await.json::<Value>();
        assert_eq!(all["total"], 3);

        let upcoming = server
            .get("/api/rounds")
            .add_query_param("status", "upcoming")
            .await
            .json::<Value>();
        assert_eq!(upcoming["total"], 1);
        assert_eq!(upcoming["rounds"][0]["course"], "Torrey Pines");

        let stats = server.get("/api/rounds/stats").await.json::<Value>();
        assert_eq!(stats["rounds_played"], 2);
        assert_eq!(stats["average_score"], 91);
        assert_eq!(stats["best_score"], 89);
    }

    #[tokio::test]
    async fn test_invalid_round_is_bad_request() {
        let server = server();
        let mut body = round("Pebble Creek", 89, "completed");
        body["holes"] = json!(12);

        let response = server.post("/api/rounds").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "invalid_round");
    }

    #[tokio::test]
    async fn test_unknown_status_filter_is_bad_request() {
        let server = server();
        server
            .get("/api/rounds")
            .add_query_param("status", "finished")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let server = server();
        let created = server
            .post("/api/rounds")
            .json(&round("Oakmont", 0, "in-progress"))
            .await
            .json::<Value>();
        let id = created["id"].as_str().unwrap().to_string();

        let updated = server
            .put(&format!("/api/rounds/{id}"))
            .json(&round("Oakmont", 84, "completed"))
            .await;
        updated.assert_status_ok();
        assert_eq!(updated.json::<Value>()["status"], "completed");

        server
            .delete(&format!("/api/rounds/{id}"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let response = server.delete(&format!("/api/rounds/{id}")).await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"], "round_not_found");
    }
}
