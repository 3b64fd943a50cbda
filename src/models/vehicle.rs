use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VehicleStatus {
    Available,
    Delivering,
    /// Holding a paused mission; not eligible for new work.
    Reserved,
    Charging,
    Maintenance,
    Offline,
}

impl VehicleStatus {
    /// Statuses owned by a mission; only mission operations may leave them.
    pub fn is_mission_held(self) -> bool {
        matches!(self, VehicleStatus::Delivering | VehicleStatus::Reserved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub home: GeoPoint,
    pub location: Option<GeoPoint>,
    pub battery: f64,
    pub capacity_kg: f64,
    pub status: VehicleStatus,
    pub operator_id: Option<Uuid>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    /// Last reported position, or home base for a vehicle that never moved.
    pub fn position(&self) -> GeoPoint {
        self.location.unwrap_or(self.home)
    }
}

/// Partial vehicle update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct VehicleUpdate {
    pub name: Option<String>,
    pub model: Option<String>,
    pub capacity_kg: Option<f64>,
    pub location: Option<GeoPoint>,
    pub battery: Option<f64>,
    pub status: Option<VehicleStatus>,
    pub operator_id: Option<Uuid>,
}

/// One position/battery sample, newest kept per vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub vehicle_id: Uuid,
    pub location: GeoPoint,
    pub battery: f64,
    pub status: VehicleStatus,
    pub recorded_at: DateTime<Utc>,
}
