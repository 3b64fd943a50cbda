use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::event::{FleetEvent, Topic};
use crate::state::AppState;

/// Optional narrowing of the event stream. Both filters must match when
/// both are given.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub order_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
}

impl WsQuery {
    pub fn accepts(&self, event: &FleetEvent) -> bool {
        self.order_id
            .is_none_or(|order_id| event.is_on(Topic::Order(order_id)))
            && self
                .vehicle_id
                .is_none_or(|vehicle_id| event.is_on(Topic::Vehicle(vehicle_id)))
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: WsQuery) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.stores.events.subscribe());

    let topics: Vec<String> = query
        .order_id
        .map(Topic::Order)
        .into_iter()
        .chain(query.vehicle_id.map(Topic::Vehicle))
        .map(|topic| topic.to_string())
        .collect();
    info!(?topics, "websocket client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(next) = events.next().await {
            let event = match next {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging; events dropped");
                    continue;
                }
            };

            if !query.accepts(&event) {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize fleet event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    // Whichever side ends first takes the other down with it.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::WsQuery;
    use crate::models::event::{FleetEvent, PositionUpdate};
    use crate::models::vehicle::{GeoPoint, VehicleStatus};

    fn position(vehicle_id: Uuid) -> FleetEvent {
        FleetEvent::PositionUpdate(PositionUpdate {
            vehicle_id,
            location: GeoPoint::new(40.7, -74.0),
            battery: 80.0,
            status: VehicleStatus::Available,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn unfiltered_query_accepts_everything() {
        assert!(WsQuery::default().accepts(&position(Uuid::new_v4())));
    }

    #[test]
    fn vehicle_filter_drops_other_vehicles() {
        let vehicle_id = Uuid::new_v4();
        let query = WsQuery {
            order_id: None,
            vehicle_id: Some(vehicle_id),
        };

        assert!(query.accepts(&position(vehicle_id)));
        assert!(!query.accepts(&position(Uuid::new_v4())));
    }

    #[test]
    fn order_filter_drops_fleet_wide_position_updates() {
        let query = WsQuery {
            order_id: Some(Uuid::new_v4()),
            vehicle_id: None,
        };

        assert!(!query.accepts(&position(Uuid::new_v4())));
    }
}
