use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::vehicle::GeoPoint;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Urgency {
    #[default]
    Standard,
    Priority,
    Urgent,
}

impl Urgency {
    pub fn fee_multiplier(self) -> f64 {
        match self {
            Urgency::Standard => 1.0,
            Urgency::Priority => 1.5,
            Urgency::Urgent => 2.0,
        }
    }

    pub fn delivery_window_minutes(self) -> i64 {
        match self {
            Urgency::Standard => 35,
            Urgency::Priority => 20,
            Urgency::Urgent => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub id: Uuid,
    pub tracking_code: String,
    pub customer_id: Uuid,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: GeoPoint,
    pub dropoff_address: String,
    pub package_weight_kg: f64,
    pub package_description: String,
    pub delivery_instructions: Option<String>,
    pub urgency: Urgency,
    pub distance_km: f64,
    pub delivery_fee: f64,
    pub status: OrderStatus,
    pub assigned_vehicle: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub estimated_delivery: DateTime<Utc>,
    pub actual_delivery: Option<DateTime<Utc>>,
}

/// Customer-supplied fields of a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: GeoPoint,
    pub dropoff_address: String,
    pub package_weight_kg: f64,
    pub package_description: String,
    #[serde(default)]
    pub delivery_instructions: Option<String>,
    #[serde(default)]
    pub urgency: Urgency,
}

/// Status change applied through the order store.
#[derive(Debug, Clone)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
    pub assigned_vehicle: Option<Uuid>,
    pub actual_delivery: Option<DateTime<Utc>>,
}

impl OrderStatusUpdate {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status,
            assigned_vehicle: None,
            actual_delivery: None,
        }
    }
}
