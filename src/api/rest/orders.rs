use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::queue::enqueue_order;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::mission::{Mission, MissionFilter};
use crate::models::order::{DeliveryOrder, NewOrder, OrderStatus};
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        // `:id` takes either the order UUID or its tracking code.
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/tracking", get(get_tracking))
        .route("/orders/:id/status", patch(update_order_status))
        .route("/orders/:id/assign", post(assign_order))
        .route("/assignments", get(list_assignments))
}

#[derive(Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub acting_user_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: DeliveryOrder,
    pub tracking_events: Vec<TrackingEvent>,
    pub mission: Option<Mission>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrder>,
) -> Result<Json<DeliveryOrder>, AppError> {
    let order = state.dispatcher.submit_order(payload)?;
    enqueue_order(&state, order.id).await?;

    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderQuery>,
) -> Json<Vec<DeliveryOrder>> {
    Json(state.stores.orders.list_orders(query.status))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Result<Json<OrderDetail>, AppError> {
    let order = match identifier.parse::<Uuid>() {
        Ok(id) => state.stores.orders.get_order(id)?,
        Err(_) => state.stores.orders.find_by_tracking_code(&identifier)?,
    };

    let mut tracking_events = state.stores.events.tracking_events(order.id);
    tracking_events.reverse();

    let mission = state
        .stores
        .missions
        .active_mission_for_order(order.id)
        .or_else(|| {
            state
                .stores
                .missions
                .list_missions(&MissionFilter::default())
                .into_iter()
                .find(|mission| mission.order_id == order.id)
        });

    Ok(Json(OrderDetail {
        order,
        tracking_events,
        mission,
    }))
}

async fn get_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TrackingEvent>>, AppError> {
    state.stores.orders.get_order(id)?;
    Ok(Json(state.stores.events.tracking_events(id)))
}

/// Operator cancellation or failure. Aborts the order's open mission, if any.
async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<DeliveryOrder>, AppError> {
    let order = state.mission_control.close_order(
        id,
        payload.status,
        payload.reason,
        payload.acting_user_id,
    )?;

    Ok(Json(order))
}

async fn assign_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Assignment>, AppError> {
    let assignment = state.dispatcher.dispatch(id)?;
    Ok(Json(assignment))
}

async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<Assignment>> {
    Json(state.dispatcher.assignments())
}
