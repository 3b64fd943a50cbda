//! Collaborator contracts the dispatch core is written against.
//!
//! Every read returns an owned copy, so callers work on point-in-time
//! snapshots and never hold a live reference into shared state.

pub mod memory;

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::FleetEvent;
use crate::models::mission::{Mission, MissionFilter};
use crate::models::order::{DeliveryOrder, OrderStatus, OrderStatusUpdate};
use crate::models::tracking::{TrackingEvent, TrackingEventKind};
use crate::models::vehicle::{GeoPoint, TelemetryRecord, Vehicle, VehicleStatus, VehicleUpdate};

pub use memory::InMemoryStore;

pub trait FleetStore: Send + Sync {
    fn insert_vehicle(&self, vehicle: Vehicle) -> Result<(), AppError>;

    fn get_vehicle(&self, id: Uuid) -> Result<Vehicle, AppError>;

    fn list_vehicles(&self) -> Vec<Vehicle>;

    /// Active, `Available` vehicles with at least the given capacity and
    /// battery.
    fn list_candidate_vehicles(&self, min_capacity_kg: f64, min_battery: f64) -> Vec<Vehicle>;

    /// Atomically flips an active `Available` vehicle to `Delivering`.
    /// Returns `false` when the vehicle is no longer claimable.
    fn reserve_vehicle(&self, id: Uuid) -> Result<bool, AppError>;

    fn update_vehicle(&self, id: Uuid, update: VehicleUpdate) -> Result<Vehicle, AppError>;

    /// Runs `apply` on the live record under the vehicle's lock, so the
    /// read and the write see no interleaved writer. Returns the updated copy
    /// when `apply` reports a change.
    fn modify_vehicle(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut Vehicle) -> bool,
    ) -> Result<Option<Vehicle>, AppError>;

    /// Compare-and-set on the vehicle status.
    fn transition_vehicle(
        &self,
        id: Uuid,
        from: VehicleStatus,
        to: VehicleStatus,
    ) -> Result<bool, AppError>;

    /// Returns the vehicle to `Available`.
    fn release_vehicle(&self, id: Uuid) -> Result<Vehicle, AppError>;

    /// Soft delete. Fails with `Conflict` while a mission holds the vehicle.
    fn deactivate_vehicle(&self, id: Uuid) -> Result<Vehicle, AppError>;

    /// Appends to the vehicle's bounded telemetry history.
    fn record_telemetry(&self, record: TelemetryRecord);

    /// Up to `limit` samples, newest first.
    fn telemetry(&self, id: Uuid, limit: usize) -> Vec<TelemetryRecord>;
}

pub trait OrderStore: Send + Sync {
    /// Fails with `Conflict` when the tracking code is already taken.
    fn create_order(&self, order: DeliveryOrder) -> Result<(), AppError>;

    fn get_order(&self, id: Uuid) -> Result<DeliveryOrder, AppError>;

    fn find_by_tracking_code(&self, code: &str) -> Result<DeliveryOrder, AppError>;

    fn list_orders(&self, status: Option<OrderStatus>) -> Vec<DeliveryOrder>;

    /// Applies `update` if the order is not terminal and its current status
    /// is one of `expected` (any status when `expected` is empty).
    fn update_order_status(
        &self,
        id: Uuid,
        expected: &[OrderStatus],
        update: OrderStatusUpdate,
    ) -> Result<DeliveryOrder, AppError>;
}

pub trait MissionStore: Send + Sync {
    fn create_mission(&self, mission: Mission) -> Result<(), AppError>;

    fn get_mission(&self, id: Uuid) -> Result<Mission, AppError>;

    fn update_mission(&self, mission: Mission) -> Result<(), AppError>;

    fn list_missions(&self, filter: &MissionFilter) -> Vec<Mission>;

    fn active_mission_for_vehicle(&self, vehicle_id: Uuid) -> Option<Mission>;

    fn active_mission_for_order(&self, order_id: Uuid) -> Option<Mission>;
}

pub trait EventSink: Send + Sync {
    fn append_tracking_event(
        &self,
        order_id: Uuid,
        kind: TrackingEventKind,
        description: String,
        location: String,
        point: Option<GeoPoint>,
    ) -> Result<TrackingEvent, AppError>;

    /// Oldest first.
    fn tracking_events(&self, order_id: Uuid) -> Vec<TrackingEvent>;

    /// Best-effort fan-out; dropped when nobody listens.
    fn publish(&self, event: FleetEvent);

    fn subscribe(&self) -> broadcast::Receiver<FleetEvent>;

    /// Live subscriptions, one per connected stream client.
    fn subscriber_count(&self) -> usize;
}

/// The store handles injected into every engine component.
#[derive(Clone)]
pub struct Stores {
    pub fleet: Arc<dyn FleetStore>,
    pub orders: Arc<dyn OrderStore>,
    pub missions: Arc<dyn MissionStore>,
    pub events: Arc<dyn EventSink>,
}

impl Stores {
    pub fn in_memory(event_buffer_size: usize) -> Self {
        let store = Arc::new(InMemoryStore::new(event_buffer_size));
        Self {
            fleet: store.clone(),
            orders: store.clone(),
            missions: store.clone(),
            events: store,
        }
    }
}
