use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::mission::{Mission, MissionFilter};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/missions", get(list_missions))
        .route("/missions/:id", get(get_mission))
        .route("/missions/:id/control", patch(control_mission))
        .route("/missions/:id/progress", patch(update_progress))
}

#[derive(Deserialize)]
pub struct ControlRequest {
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub acting_user_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ProgressRequest {
    pub step: usize,
}

async fn list_missions(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<MissionFilter>,
) -> Json<Vec<Mission>> {
    Json(state.stores.missions.list_missions(&filter))
}

async fn get_mission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Mission>, AppError> {
    Ok(Json(state.stores.missions.get_mission(id)?))
}

async fn control_mission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ControlRequest>,
) -> Result<Json<Mission>, AppError> {
    let mission = state.mission_control.control(
        id,
        &payload.action,
        payload.reason,
        payload.acting_user_id,
    )?;

    Ok(Json(mission))
}

async fn update_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProgressRequest>,
) -> Result<Json<Mission>, AppError> {
    let mission = state.mission_control.advance_progress(id, payload.step)?;
    Ok(Json(mission))
}
