use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance_to_pickup_km: f64,
    pub battery_percent: f64,
    pub distance_component: f64,
    pub battery_component: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub vehicle_id: Uuid,
    pub mission_id: Uuid,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub assigned_at: DateTime<Utc>,
}
