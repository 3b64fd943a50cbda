//! Live-update payloads fanned out to subscribers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::assignment::Assignment;
use crate::models::mission::{ControlAction, MissionStatus};
use crate::models::order::OrderStatus;
use crate::models::vehicle::{GeoPoint, VehicleStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Fleet,
    Order(Uuid),
    Vehicle(Uuid),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Fleet => f.write_str("fleet"),
            Topic::Order(id) => write!(f, "order:{id}"),
            Topic::Vehicle(id) => write!(f, "vehicle:{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub vehicle_id: Uuid,
    pub location: GeoPoint,
    pub battery: f64,
    pub status: VehicleStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlertKind {
    LowBattery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleAlert {
    pub vehicle_id: Uuid,
    pub kind: AlertKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChange {
    pub order_id: Uuid,
    pub tracking_code: String,
    pub status: OrderStatus,
    pub vehicle_id: Option<Uuid>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionUpdate {
    pub mission_id: Uuid,
    pub order_id: Uuid,
    pub vehicle_id: Uuid,
    pub status: MissionStatus,
    pub current_step: usize,
    pub total_steps: usize,
    pub action: Option<ControlAction>,
    pub acting_user_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    PositionUpdate(PositionUpdate),
    Alert(VehicleAlert),
    OrderStatusChanged(OrderStatusChange),
    MissionUpdate(MissionUpdate),
    Assignment(Assignment),
}

impl FleetEvent {
    pub fn topics(&self) -> Vec<Topic> {
        match self {
            FleetEvent::PositionUpdate(update) => {
                vec![Topic::Fleet, Topic::Vehicle(update.vehicle_id)]
            }
            FleetEvent::Alert(alert) => vec![Topic::Fleet, Topic::Vehicle(alert.vehicle_id)],
            FleetEvent::OrderStatusChanged(change) => {
                let mut topics = vec![Topic::Fleet, Topic::Order(change.order_id)];
                topics.extend(change.vehicle_id.map(Topic::Vehicle));
                topics
            }
            FleetEvent::MissionUpdate(update) => vec![
                Topic::Fleet,
                Topic::Order(update.order_id),
                Topic::Vehicle(update.vehicle_id),
            ],
            FleetEvent::Assignment(assignment) => vec![
                Topic::Fleet,
                Topic::Order(assignment.order_id),
                Topic::Vehicle(assignment.vehicle_id),
            ],
        }
    }

    pub fn is_on(&self, topic: Topic) -> bool {
        self.topics().contains(&topic)
    }
}
