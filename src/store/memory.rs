use std::collections::VecDeque;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::FleetEvent;
use crate::models::mission::{Mission, MissionFilter};
use crate::models::order::{DeliveryOrder, OrderStatus, OrderStatusUpdate};
use crate::models::tracking::{TrackingEvent, TrackingEventKind};
use crate::models::vehicle::{GeoPoint, TelemetryRecord, Vehicle, VehicleStatus, VehicleUpdate};
use crate::store::{EventSink, FleetStore, MissionStore, OrderStore};

/// Samples kept per vehicle; older ones are dropped.
pub const TELEMETRY_HISTORY_LIMIT: usize = 120;

pub struct InMemoryStore {
    vehicles: DashMap<Uuid, Vehicle>,
    telemetry: DashMap<Uuid, VecDeque<TelemetryRecord>>,
    orders: DashMap<Uuid, DeliveryOrder>,
    tracking_codes: DashMap<String, Uuid>,
    missions: DashMap<Uuid, Mission>,
    tracking: DashMap<Uuid, Vec<TrackingEvent>>,
    events_tx: broadcast::Sender<FleetEvent>,
}

impl InMemoryStore {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            vehicles: DashMap::new(),
            telemetry: DashMap::new(),
            orders: DashMap::new(),
            tracking_codes: DashMap::new(),
            missions: DashMap::new(),
            tracking: DashMap::new(),
            events_tx,
        }
    }
}

fn vehicle_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("vehicle {id} not found"))
}

impl FleetStore for InMemoryStore {
    fn insert_vehicle(&self, vehicle: Vehicle) -> Result<(), AppError> {
        match self.vehicles.entry(vehicle.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "vehicle {} already exists",
                vehicle.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(vehicle);
                Ok(())
            }
        }
    }

    fn get_vehicle(&self, id: Uuid) -> Result<Vehicle, AppError> {
        self.vehicles
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| vehicle_not_found(id))
    }

    fn list_vehicles(&self) -> Vec<Vehicle> {
        let mut vehicles: Vec<Vehicle> = self
            .vehicles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        vehicles.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        vehicles
    }

    fn list_candidate_vehicles(&self, min_capacity_kg: f64, min_battery: f64) -> Vec<Vehicle> {
        self.vehicles
            .iter()
            .filter_map(|entry| {
                let vehicle = entry.value();
                let eligible = vehicle.is_active
                    && vehicle.status == VehicleStatus::Available
                    && vehicle.battery >= min_battery
                    && vehicle.capacity_kg >= min_capacity_kg;

                if eligible {
                    Some(vehicle.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    fn reserve_vehicle(&self, id: Uuid) -> Result<bool, AppError> {
        let mut vehicle = self.vehicles.get_mut(&id).ok_or_else(|| vehicle_not_found(id))?;

        if !vehicle.is_active || vehicle.status != VehicleStatus::Available {
            return Ok(false);
        }

        vehicle.status = VehicleStatus::Delivering;
        vehicle.updated_at = Utc::now();
        Ok(true)
    }

    fn update_vehicle(&self, id: Uuid, update: VehicleUpdate) -> Result<Vehicle, AppError> {
        let mut vehicle = self.vehicles.get_mut(&id).ok_or_else(|| vehicle_not_found(id))?;

        if let Some(name) = update.name {
            vehicle.name = name;
        }
        if let Some(model) = update.model {
            vehicle.model = model;
        }
        if let Some(capacity_kg) = update.capacity_kg {
            vehicle.capacity_kg = capacity_kg;
        }
        if let Some(location) = update.location {
            vehicle.location = Some(location);
        }
        if let Some(battery) = update.battery {
            vehicle.battery = battery.clamp(0.0, 100.0);
        }
        if let Some(status) = update.status {
            vehicle.status = status;
        }
        if let Some(operator_id) = update.operator_id {
            vehicle.operator_id = Some(operator_id);
        }
        vehicle.updated_at = Utc::now();

        Ok(vehicle.clone())
    }

    fn modify_vehicle(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut Vehicle) -> bool,
    ) -> Result<Option<Vehicle>, AppError> {
        let mut vehicle = self.vehicles.get_mut(&id).ok_or_else(|| vehicle_not_found(id))?;

        if !apply(&mut vehicle) {
            return Ok(None);
        }
        vehicle.updated_at = Utc::now();
        Ok(Some(vehicle.clone()))
    }

    fn transition_vehicle(
        &self,
        id: Uuid,
        from: VehicleStatus,
        to: VehicleStatus,
    ) -> Result<bool, AppError> {
        let mut vehicle = self.vehicles.get_mut(&id).ok_or_else(|| vehicle_not_found(id))?;

        if vehicle.status != from {
            return Ok(false);
        }

        vehicle.status = to;
        vehicle.updated_at = Utc::now();
        Ok(true)
    }

    fn release_vehicle(&self, id: Uuid) -> Result<Vehicle, AppError> {
        let mut vehicle = self.vehicles.get_mut(&id).ok_or_else(|| vehicle_not_found(id))?;

        vehicle.status = VehicleStatus::Available;
        vehicle.updated_at = Utc::now();
        Ok(vehicle.clone())
    }

    fn deactivate_vehicle(&self, id: Uuid) -> Result<Vehicle, AppError> {
        let mut vehicle = self.vehicles.get_mut(&id).ok_or_else(|| vehicle_not_found(id))?;

        if vehicle.status.is_mission_held() {
            return Err(AppError::Conflict(format!(
                "cannot deactivate vehicle {id} while it is {:?}",
                vehicle.status
            )));
        }

        vehicle.is_active = false;
        vehicle.updated_at = Utc::now();
        Ok(vehicle.clone())
    }

    fn record_telemetry(&self, record: TelemetryRecord) {
        let mut history = self.telemetry.entry(record.vehicle_id).or_default();
        if history.len() == TELEMETRY_HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(record);
    }

    fn telemetry(&self, id: Uuid, limit: usize) -> Vec<TelemetryRecord> {
        self.telemetry
            .get(&id)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

impl OrderStore for InMemoryStore {
    fn create_order(&self, order: DeliveryOrder) -> Result<(), AppError> {
        match self.tracking_codes.entry(order.tracking_code.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "tracking code {} already in use",
                order.tracking_code
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order.id);
                self.orders.insert(order.id, order);
                Ok(())
            }
        }
    }

    fn get_order(&self, id: Uuid) -> Result<DeliveryOrder, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    fn find_by_tracking_code(&self, code: &str) -> Result<DeliveryOrder, AppError> {
        let id = self
            .tracking_codes
            .get(code)
            .map(|entry| *entry.value())
            .ok_or_else(|| AppError::NotFound(format!("order {code} not found")))?;
        self.get_order(id)
    }

    fn list_orders(&self, status: Option<OrderStatus>) -> Vec<DeliveryOrder> {
        let mut orders: Vec<DeliveryOrder> = self
            .orders
            .iter()
            .filter(|entry| status.is_none_or(|status| entry.value().status == status))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        orders
    }

    fn update_order_status(
        &self,
        id: Uuid,
        expected: &[OrderStatus],
        update: OrderStatusUpdate,
    ) -> Result<DeliveryOrder, AppError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        if order.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "order {id} is already {:?}",
                order.status
            )));
        }
        if !expected.is_empty() && !expected.contains(&order.status) {
            return Err(AppError::InvalidTransition(format!(
                "order {id} is {:?}, expected one of {expected:?}",
                order.status
            )));
        }

        order.status = update.status;
        if let Some(vehicle_id) = update.assigned_vehicle {
            order.assigned_vehicle = Some(vehicle_id);
        }
        if let Some(delivered_at) = update.actual_delivery {
            order.actual_delivery = Some(delivered_at);
        }

        Ok(order.clone())
    }
}

impl MissionStore for InMemoryStore {
    fn create_mission(&self, mission: Mission) -> Result<(), AppError> {
        let clash = self.missions.iter().any(|entry| {
            let existing = entry.value();
            !existing.status.is_terminal()
                && (existing.order_id == mission.order_id
                    || existing.vehicle_id == mission.vehicle_id)
        });
        if clash {
            return Err(AppError::invariant(format!(
                "order {} or vehicle {} already has an open mission",
                mission.order_id, mission.vehicle_id
            )));
        }

        self.missions.insert(mission.id, mission);
        Ok(())
    }

    fn get_mission(&self, id: Uuid) -> Result<Mission, AppError> {
        self.missions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("mission {id} not found")))
    }

    fn update_mission(&self, mission: Mission) -> Result<(), AppError> {
        let mut slot = self
            .missions
            .get_mut(&mission.id)
            .ok_or_else(|| AppError::NotFound(format!("mission {} not found", mission.id)))?;
        *slot = mission;
        Ok(())
    }

    fn list_missions(&self, filter: &MissionFilter) -> Vec<Mission> {
        let mut missions: Vec<Mission> = self
            .missions
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        missions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        missions
    }

    fn active_mission_for_vehicle(&self, vehicle_id: Uuid) -> Option<Mission> {
        self.missions
            .iter()
            .find(|entry| {
                entry.value().vehicle_id == vehicle_id && !entry.value().status.is_terminal()
            })
            .map(|entry| entry.value().clone())
    }

    fn active_mission_for_order(&self, order_id: Uuid) -> Option<Mission> {
        self.missions
            .iter()
            .find(|entry| {
                entry.value().order_id == order_id && !entry.value().status.is_terminal()
            })
            .map(|entry| entry.value().clone())
    }
}

impl EventSink for InMemoryStore {
    fn append_tracking_event(
        &self,
        order_id: Uuid,
        kind: TrackingEventKind,
        description: String,
        location: String,
        point: Option<GeoPoint>,
    ) -> Result<TrackingEvent, AppError> {
        if !self.orders.contains_key(&order_id) {
            return Err(AppError::NotFound(format!("order {order_id} not found")));
        }

        let event = TrackingEvent {
            id: Uuid::new_v4(),
            order_id,
            kind,
            description,
            location,
            point,
            timestamp: Utc::now(),
        };

        self.tracking
            .entry(order_id)
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    fn tracking_events(&self, order_id: Uuid) -> Vec<TrackingEvent> {
        self.tracking
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn publish(&self, event: FleetEvent) {
        let _ = self.events_tx.send(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.events_tx.subscribe()
    }

    fn subscriber_count(&self) -> usize {
        self.events_tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{InMemoryStore, TELEMETRY_HISTORY_LIMIT};
    use crate::models::vehicle::{GeoPoint, TelemetryRecord, Vehicle, VehicleStatus};
    use crate::store::FleetStore;

    fn vehicle(status: VehicleStatus, battery: f64, capacity_kg: f64) -> Vehicle {
        Vehicle {
            id: Uuid::new_v4(),
            name: "drone".to_string(),
            model: "X4".to_string(),
            home: GeoPoint::new(40.7128, -74.0060),
            location: None,
            battery,
            capacity_kg,
            status,
            operator_id: None,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn reserve_claims_a_vehicle_only_once() {
        let store = InMemoryStore::new(16);
        let drone = vehicle(VehicleStatus::Available, 90.0, 5.0);
        let id = drone.id;
        store.insert_vehicle(drone).unwrap();

        assert!(store.reserve_vehicle(id).unwrap());
        assert!(!store.reserve_vehicle(id).unwrap());
        assert_eq!(store.get_vehicle(id).unwrap().status, VehicleStatus::Delivering);
    }

    #[test]
    fn candidates_respect_capacity_battery_and_status() {
        let store = InMemoryStore::new(16);
        let eligible = vehicle(VehicleStatus::Available, 30.0, 3.0);
        let weak = vehicle(VehicleStatus::Available, 29.9, 10.0);
        let small = vehicle(VehicleStatus::Available, 100.0, 1.0);
        let busy = vehicle(VehicleStatus::Delivering, 100.0, 10.0);
        let mut retired = vehicle(VehicleStatus::Available, 100.0, 10.0);
        retired.is_active = false;

        let eligible_id = eligible.id;
        for v in [eligible, weak, small, busy, retired] {
            store.insert_vehicle(v).unwrap();
        }

        let candidates = store.list_candidate_vehicles(2.5, 30.0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, eligible_id);
    }

    #[test]
    fn transition_is_compare_and_set() {
        let store = InMemoryStore::new(16);
        let drone = vehicle(VehicleStatus::Delivering, 50.0, 5.0);
        let id = drone.id;
        store.insert_vehicle(drone).unwrap();

        assert!(!store
            .transition_vehicle(id, VehicleStatus::Available, VehicleStatus::Charging)
            .unwrap());
        assert_eq!(store.get_vehicle(id).unwrap().status, VehicleStatus::Delivering);
    }

    #[test]
    fn modify_reports_only_real_changes() {
        let store = InMemoryStore::new(16);
        let drone = vehicle(VehicleStatus::Available, 50.0, 5.0);
        let id = drone.id;
        store.insert_vehicle(drone).unwrap();

        assert!(store.modify_vehicle(id, &mut |_| false).unwrap().is_none());
        let changed = store
            .modify_vehicle(id, &mut |vehicle: &mut Vehicle| {
                vehicle.battery = 42.0;
                true
            })
            .unwrap()
            .unwrap();
        assert_eq!(changed.battery, 42.0);
        assert!(store.modify_vehicle(Uuid::new_v4(), &mut |_| true).is_err());
    }

    #[test]
    fn telemetry_history_is_bounded_and_newest_first() {
        let store = InMemoryStore::new(16);
        let id = Uuid::new_v4();

        for battery in 0..TELEMETRY_HISTORY_LIMIT + 5 {
            store.record_telemetry(TelemetryRecord {
                vehicle_id: id,
                location: GeoPoint::new(40.7, -74.0),
                battery: battery as f64,
                status: VehicleStatus::Available,
                recorded_at: Utc::now(),
            });
        }

        let all = store.telemetry(id, usize::MAX);
        assert_eq!(all.len(), TELEMETRY_HISTORY_LIMIT);
        assert_eq!(all[0].battery, (TELEMETRY_HISTORY_LIMIT + 4) as f64);
        assert_eq!(all.last().unwrap().battery, 5.0);
        assert!(store.telemetry(Uuid::new_v4(), 10).is_empty());
    }
}
