use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;
use crate::models::vehicle::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackingEventKind {
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

impl TrackingEventKind {
    /// Event kind recorded when an order reaches `status`. `Pending` has no
    /// event: orders are created pending and never return to it.
    pub fn for_status(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Pending => None,
            OrderStatus::Assigned => Some(Self::Assigned),
            OrderStatus::PickedUp => Some(Self::PickedUp),
            OrderStatus::InTransit => Some(Self::InTransit),
            OrderStatus::Delivered => Some(Self::Delivered),
            OrderStatus::Cancelled => Some(Self::Cancelled),
            OrderStatus::Failed => Some(Self::Failed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: TrackingEventKind,
    pub description: String,
    pub location: String,
    pub point: Option<GeoPoint>,
    pub timestamp: DateTime<Utc>,
}
