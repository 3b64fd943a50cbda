use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::mission::Mission;
use crate::models::vehicle::{GeoPoint, TelemetryRecord, Vehicle, VehicleStatus, VehicleUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vehicles", post(create_vehicle).get(list_vehicles))
        .route(
            "/vehicles/:id",
            get(get_vehicle)
                .put(update_vehicle_details)
                .delete(deactivate_vehicle),
        )
        .route("/vehicles/:id/status", patch(update_vehicle_status))
        .route("/vehicles/:id/location", patch(update_vehicle_location))
        .route("/vehicles/:id/telemetry", get(vehicle_telemetry))
        .route("/fleet/status", get(fleet_status))
}

#[derive(Deserialize)]
pub struct CreateVehicleRequest {
    pub name: String,
    #[serde(default)]
    pub model: String,
    pub capacity_kg: f64,
    pub home: GeoPoint,
    #[serde(default)]
    pub operator_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: VehicleStatus,
}

#[derive(Deserialize)]
pub struct UpdateVehicleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub capacity_kg: Option<f64>,
    #[serde(default)]
    pub operator_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct TelemetryQuery {
    #[serde(default = "default_telemetry_limit")]
    pub limit: usize,
}

fn default_telemetry_limit() -> usize {
    20
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
    #[serde(default)]
    pub battery: Option<f64>,
}

#[derive(Serialize)]
pub struct VehicleDetail {
    #[serde(flatten)]
    pub vehicle: Vehicle,
    pub active_mission: Option<Mission>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct FleetStatistics {
    pub total: usize,
    pub available: usize,
    pub delivering: usize,
    pub reserved: usize,
    pub charging: usize,
    pub maintenance: usize,
    pub offline: usize,
}

impl FleetStatistics {
    pub fn from_vehicles<'a>(vehicles: impl IntoIterator<Item = &'a Vehicle>) -> Self {
        let mut stats = Self::default();
        for vehicle in vehicles.into_iter().filter(|vehicle| vehicle.is_active) {
            stats.total += 1;
            match vehicle.status {
                VehicleStatus::Available => stats.available += 1,
                VehicleStatus::Delivering => stats.delivering += 1,
                VehicleStatus::Reserved => stats.reserved += 1,
                VehicleStatus::Charging => stats.charging += 1,
                VehicleStatus::Maintenance => stats.maintenance += 1,
                VehicleStatus::Offline => stats.offline += 1,
            }
        }
        stats
    }
}

#[derive(Serialize)]
pub struct FleetStatusResponse {
    pub vehicles: Vec<Vehicle>,
    pub statistics: FleetStatistics,
}

async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateVehicleRequest>,
) -> Result<Json<Vehicle>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if !payload.capacity_kg.is_finite() || payload.capacity_kg <= 0.0 {
        return Err(AppError::BadRequest("capacity_kg must be > 0".to_string()));
    }

    if !payload.home.is_valid() {
        return Err(AppError::BadRequest("home is not a valid coordinate".to_string()));
    }

    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        model: payload.model,
        home: payload.home,
        location: Some(payload.home),
        battery: 100.0,
        capacity_kg: payload.capacity_kg,
        status: VehicleStatus::Available,
        operator_id: payload.operator_id,
        is_active: true,
        updated_at: Utc::now(),
    };

    state.stores.fleet.insert_vehicle(vehicle.clone())?;
    tracing::info!(vehicle_id = %vehicle.id, name = %vehicle.name, "vehicle registered");
    Ok(Json(vehicle))
}

async fn list_vehicles(State(state): State<Arc<AppState>>) -> Json<Vec<Vehicle>> {
    Json(state.stores.fleet.list_vehicles())
}

async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VehicleDetail>, AppError> {
    let vehicle = state.stores.fleet.get_vehicle(id)?;
    let active_mission = state.stores.missions.active_mission_for_vehicle(id);

    Ok(Json(VehicleDetail {
        vehicle,
        active_mission,
    }))
}

async fn update_vehicle_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVehicleRequest>,
) -> Result<Json<Vehicle>, AppError> {
    let name = match payload.name {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::BadRequest("name cannot be empty".to_string()));
        }
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };
    if payload
        .capacity_kg
        .is_some_and(|capacity| !capacity.is_finite() || capacity <= 0.0)
    {
        return Err(AppError::BadRequest("capacity_kg must be > 0".to_string()));
    }

    let vehicle = state.stores.fleet.update_vehicle(
        id,
        VehicleUpdate {
            name,
            model: payload.model,
            capacity_kg: payload.capacity_kg,
            operator_id: payload.operator_id,
            ..VehicleUpdate::default()
        },
    )?;

    Ok(Json(vehicle))
}

/// Manual status change. The held-by-mission check and the write happen
/// under the same vehicle lock, so a reservation cannot slip in between.
async fn update_vehicle_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Vehicle>, AppError> {
    if payload.status.is_mission_held() {
        return Err(AppError::BadRequest(format!(
            "{:?} is set by missions, not by hand",
            payload.status
        )));
    }

    let updated = state.stores.fleet.modify_vehicle(id, &mut |vehicle: &mut Vehicle| {
        if vehicle.status.is_mission_held() {
            return false;
        }
        vehicle.status = payload.status;
        true
    })?;

    updated
        .map(Json)
        .ok_or_else(|| AppError::Conflict(format!("vehicle {id} is held by a mission")))
}

async fn update_vehicle_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Vehicle>, AppError> {
    if !payload.location.is_valid() {
        return Err(AppError::BadRequest("location is not a valid coordinate".to_string()));
    }
    if payload.battery.is_some_and(|battery| !(0.0..=100.0).contains(&battery)) {
        return Err(AppError::BadRequest("battery must be within 0..=100".to_string()));
    }

    let vehicle = state.stores.fleet.update_vehicle(
        id,
        VehicleUpdate {
            location: Some(payload.location),
            battery: payload.battery,
            ..VehicleUpdate::default()
        },
    )?;
    state.stores.fleet.record_telemetry(TelemetryRecord {
        vehicle_id: id,
        location: payload.location,
        battery: vehicle.battery,
        status: vehicle.status,
        recorded_at: state.clock.now(),
    });

    Ok(Json(vehicle))
}

async fn vehicle_telemetry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<TelemetryQuery>,
) -> Result<Json<Vec<TelemetryRecord>>, AppError> {
    state.stores.fleet.get_vehicle(id)?;
    Ok(Json(state.stores.fleet.telemetry(id, query.limit)))
}

/// Soft delete; history keeps referencing the vehicle.
async fn deactivate_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, AppError> {
    let vehicle = state.stores.fleet.deactivate_vehicle(id)?;

    tracing::info!(vehicle_id = %id, "vehicle deactivated");
    Ok(Json(vehicle))
}

async fn fleet_status(State(state): State<Arc<AppState>>) -> Json<FleetStatusResponse> {
    let vehicles: Vec<Vehicle> = state
        .stores
        .fleet
        .list_vehicles()
        .into_iter()
        .filter(|vehicle| vehicle.is_active)
        .collect();
    let statistics = FleetStatistics::from_vehicles(&vehicles);

    Json(FleetStatusResponse {
        vehicles,
        statistics,
    })
}
