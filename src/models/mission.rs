use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::vehicle::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaypointKind {
    Start,
    Waypoint,
    Pickup,
    Delivery,
    End,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    #[serde(flatten)]
    pub point: GeoPoint,
    pub kind: WaypointKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MissionStatus {
    Assigned,
    InProgress,
    Paused,
    Completed,
    Aborted,
}

impl MissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Aborted)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Pause,
    Resume,
    Abort,
}

impl FromStr for ControlAction {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(ControlAction::Pause),
            "resume" => Ok(ControlAction::Resume),
            "abort" => Ok(ControlAction::Abort),
            _ => Err(AppError::InvalidAction(format!(
                "unknown action {raw:?}, expected pause/resume/abort"
            ))),
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Abort => "abort",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    pub order_id: Uuid,
    pub vehicle_id: Uuid,
    pub route: Vec<Waypoint>,
    pub current_step: usize,
    pub total_steps: usize,
    pub estimated_duration_min: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub actual_duration_min: Option<i64>,
    pub status: MissionStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MissionFilter {
    pub status: Option<MissionStatus>,
    pub vehicle_id: Option<Uuid>,
}

impl MissionFilter {
    pub fn matches(&self, mission: &Mission) -> bool {
        self.status.is_none_or(|status| mission.status == status)
            && self.vehicle_id.is_none_or(|id| mission.vehicle_id == id)
    }
}
