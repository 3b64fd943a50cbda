//! Mission lifecycle.
//!
//! ```text
//! Assigned --advance(1)--> InProgress --advance(final)--> Completed
//! InProgress --pause--> Paused --resume--> InProgress
//! {Assigned, InProgress, Paused} --abort--> Aborted
//! ```
//!
//! Every operation on a mission runs under that mission's lock, so a
//! concurrent pause and abort cannot both apply.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::route::{estimated_duration_minutes, generate_route, RouteSteps};
use crate::error::AppError;
use crate::models::event::{FleetEvent, MissionUpdate, OrderStatusChange};
use crate::models::mission::{ControlAction, Mission, MissionStatus};
use crate::models::order::{DeliveryOrder, OrderStatus, OrderStatusUpdate};
use crate::models::tracking::TrackingEventKind;
use crate::models::vehicle::{GeoPoint, Vehicle, VehicleStatus, VehicleUpdate};
use crate::observability::metrics::Metrics;
use crate::store::Stores;

const CONTROL_CENTER: &str = "Control Center";
const SYSTEM: &str = "System";
/// Re-reads an order gets while an assignment is mid-flight.
const CLOSE_ATTEMPTS: usize = 8;

/// Builds the mission for a freshly assigned order, starting wherever the
/// vehicle currently is.
pub fn plan_mission(
    order: &DeliveryOrder,
    vehicle: &Vehicle,
    steps: RouteSteps,
    now: DateTime<Utc>,
) -> Mission {
    let route = generate_route(vehicle.position(), order.pickup, order.dropoff, steps);
    let estimated_duration_min = estimated_duration_minutes(&route);

    Mission {
        id: Uuid::new_v4(),
        order_id: order.id,
        vehicle_id: vehicle.id,
        total_steps: route.len(),
        route,
        current_step: 0,
        estimated_duration_min,
        start_time: None,
        end_time: None,
        actual_duration_min: None,
        status: MissionStatus::Assigned,
        failure_reason: None,
        created_at: now,
    }
}

pub fn describe_status(status: OrderStatus, vehicle_name: &str) -> String {
    match status {
        OrderStatus::Assigned => format!("Assigned to drone {vehicle_name}"),
        OrderStatus::PickedUp => format!("Package picked up by {vehicle_name}"),
        OrderStatus::InTransit => format!("Package in transit via {vehicle_name}"),
        OrderStatus::Delivered => format!("Package delivered successfully by {vehicle_name}"),
        OrderStatus::Cancelled => "Delivery cancelled".to_string(),
        OrderStatus::Failed => "Delivery failed".to_string(),
        OrderStatus::Pending => "Awaiting a drone".to_string(),
    }
}

/// Order status implied by reaching `step` of `total_steps`, if it differs
/// from `current`.
fn derive_order_status(
    step: usize,
    total_steps: usize,
    current: OrderStatus,
) -> Option<OrderStatus> {
    let derived = if step >= total_steps {
        OrderStatus::Delivered
    } else if step + 1 == total_steps {
        OrderStatus::InTransit
    } else if step >= 1 && current == OrderStatus::Assigned {
        OrderStatus::PickedUp
    } else {
        current
    };

    (derived != current).then_some(derived)
}

fn whole_minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = (end - start).num_seconds().max(0);
    (seconds + 59) / 60
}

pub struct MissionControl {
    stores: Stores,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl MissionControl {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        Self {
            stores,
            clock,
            metrics,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, mission_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(mission_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `op` under the mission's lock. Unknown and finished missions are
    /// turned away before a lock exists, and the lock entry is dropped once
    /// the mission is finished, so the table only holds open missions.
    fn with_mission_lock<T>(
        &self,
        mission_id: Uuid,
        op: impl FnOnce() -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mission = self.stores.missions.get_mission(mission_id)?;
        if mission.status.is_terminal() {
            return Err(already_finished(&mission));
        }

        let lock = self.lock_for(mission_id);
        let outcome = match lock.lock() {
            Ok(_guard) => op(),
            Err(_) => Err(AppError::Internal(format!("mission {mission_id} lock poisoned"))),
        };

        let finished = self
            .stores
            .missions
            .get_mission(mission_id)
            .map_or(true, |mission| mission.status.is_terminal());
        if finished {
            self.locks.remove(&mission_id);
        }
        outcome
    }

    /// Moves a mission to waypoint `step` and applies the derived order,
    /// vehicle and mission effects.
    pub fn advance_progress(&self, mission_id: Uuid, step: usize) -> Result<Mission, AppError> {
        self.with_mission_lock(mission_id, || self.advance_locked(mission_id, step))
    }

    fn advance_locked(&self, mission_id: Uuid, step: usize) -> Result<Mission, AppError> {
        let mut mission = self.stores.missions.get_mission(mission_id)?;

        if !matches!(
            mission.status,
            MissionStatus::Assigned | MissionStatus::InProgress
        ) {
            return Err(AppError::InvalidTransition(format!(
                "mission {mission_id} is {:?} and cannot advance",
                mission.status
            )));
        }
        if step < mission.current_step {
            return Err(AppError::InvalidProgress(format!(
                "step {step} is behind current step {}",
                mission.current_step
            )));
        }
        if step > mission.total_steps {
            return Err(AppError::InvalidProgress(format!(
                "step {step} exceeds total steps {}",
                mission.total_steps
            )));
        }

        let vehicle = self.vehicle_of(&mission)?;
        let order = self.order_of(&mission)?;
        let now = self.clock.now();

        mission.current_step = step;
        mission.status = MissionStatus::InProgress;
        let started_at = *mission.start_time.get_or_insert(now);

        let finished = step == mission.total_steps;
        if finished {
            mission.status = MissionStatus::Completed;
            mission.end_time = Some(now);
            mission.actual_duration_min = Some(whole_minutes_between(started_at, now));
        }

        self.stores.missions.update_mission(mission.clone())?;

        if let Some(next) = derive_order_status(step, mission.total_steps, order.status) {
            let point = mission
                .route
                .get(step)
                .or(mission.route.last())
                .map(|waypoint| waypoint.point);
            let update = OrderStatusUpdate {
                status: next,
                assigned_vehicle: None,
                actual_delivery: (next == OrderStatus::Delivered).then_some(now),
            };
            self.change_order_status(
                &order,
                &[],
                update,
                describe_status(next, &vehicle.name),
                vehicle.name.clone(),
                point,
                now,
            )?;
        }

        if finished {
            self.stores.fleet.update_vehicle(
                vehicle.id,
                VehicleUpdate {
                    location: Some(vehicle.home),
                    status: Some(VehicleStatus::Available),
                    ..VehicleUpdate::default()
                },
            )?;
            self.metrics
                .missions_finished_total
                .with_label_values(&["completed"])
                .inc();

            info!(
                mission_id = %mission.id,
                order_id = %mission.order_id,
                vehicle_id = %vehicle.id,
                duration_min = mission.actual_duration_min.unwrap_or_default(),
                "mission completed"
            );
        }

        self.publish_mission_update(&mission, None, None, now);
        Ok(mission)
    }

    /// Applies an operator action. `action` is parsed here so that unknown
    /// actions surface as `InvalidAction`.
    pub fn control(
        &self,
        mission_id: Uuid,
        action: &str,
        reason: Option<String>,
        acting_user_id: Option<Uuid>,
    ) -> Result<Mission, AppError> {
        let action: ControlAction = action.parse()?;

        self.with_mission_lock(mission_id, || {
            self.control_locked(mission_id, action, reason, acting_user_id)
        })
    }

    fn control_locked(
        &self,
        mission_id: Uuid,
        action: ControlAction,
        reason: Option<String>,
        acting_user_id: Option<Uuid>,
    ) -> Result<Mission, AppError> {
        let mut mission = self.stores.missions.get_mission(mission_id)?;
        if mission.status.is_terminal() {
            return Err(already_finished(&mission));
        }

        let vehicle = self.vehicle_of(&mission)?;
        let now = self.clock.now();

        match action {
            ControlAction::Pause => {
                require_status(&mission, MissionStatus::InProgress, action)?;
                mission.status = MissionStatus::Paused;
                self.stores.missions.update_mission(mission.clone())?;
                self.hand_over_vehicle(
                    &vehicle,
                    VehicleStatus::Delivering,
                    VehicleStatus::Reserved,
                )?;
            }
            ControlAction::Resume => {
                require_status(&mission, MissionStatus::Paused, action)?;
                mission.status = MissionStatus::InProgress;
                self.stores.missions.update_mission(mission.clone())?;
                self.hand_over_vehicle(
                    &vehicle,
                    VehicleStatus::Reserved,
                    VehicleStatus::Delivering,
                )?;
            }
            ControlAction::Abort => {
                let description = reason
                    .as_deref()
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or("Mission aborted by operator")
                    .to_string();
                self.abort_mission(
                    &mut mission,
                    &vehicle,
                    OrderStatus::Cancelled,
                    reason,
                    description,
                    CONTROL_CENTER.to_string(),
                    now,
                )?;
            }
        }

        info!(
            mission_id = %mission.id,
            vehicle_id = %vehicle.id,
            action = %action,
            acting_user_id = ?acting_user_id,
            status = ?mission.status,
            "mission control applied"
        );

        self.publish_mission_update(&mission, Some(action), acting_user_id, now);
        Ok(mission)
    }

    /// Moves an order to `Cancelled` or `Failed` on behalf of an operator.
    /// An open mission is aborted with it and its vehicle released; a pending
    /// order is closed only if no assignment claims it first.
    pub fn close_order(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        reason: Option<String>,
        acting_user_id: Option<Uuid>,
    ) -> Result<DeliveryOrder, AppError> {
        if !matches!(status, OrderStatus::Cancelled | OrderStatus::Failed) {
            return Err(AppError::BadRequest(format!(
                "orders can only be set to Cancelled or Failed, not {status:?}"
            )));
        }

        let description = reason
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Order status updated to {status:?}"));

        for _ in 0..CLOSE_ATTEMPTS {
            let order = self.stores.orders.get_order(order_id)?;
            if order.status.is_terminal() {
                return Err(AppError::InvalidTransition(format!(
                    "order {order_id} is already {:?}",
                    order.status
                )));
            }

            if let Some(mission) = self.stores.missions.active_mission_for_order(order_id) {
                self.with_mission_lock(mission.id, || {
                    let mut mission = self.stores.missions.get_mission(mission.id)?;
                    if mission.status.is_terminal() {
                        return Err(already_finished(&mission));
                    }
                    let vehicle = self.vehicle_of(&mission)?;
                    let now = self.clock.now();
                    self.abort_mission(
                        &mut mission,
                        &vehicle,
                        status,
                        reason.clone(),
                        description.clone(),
                        vehicle.name.clone(),
                        now,
                    )?;
                    self.publish_mission_update(
                        &mission,
                        Some(ControlAction::Abort),
                        acting_user_id,
                        now,
                    );
                    Ok(())
                })?;
                info!(
                    %order_id,
                    ?status,
                    acting_user_id = ?acting_user_id,
                    "order closed with its mission"
                );
                return self.stores.orders.get_order(order_id);
            }

            if order.status == OrderStatus::Pending {
                match self.change_order_status(
                    &order,
                    &[OrderStatus::Pending],
                    OrderStatusUpdate::to(status),
                    description.clone(),
                    SYSTEM.to_string(),
                    None,
                    self.clock.now(),
                ) {
                    Ok(()) => {
                        info!(
                            %order_id,
                            ?status,
                            acting_user_id = ?acting_user_id,
                            "pending order closed"
                        );
                        return self.stores.orders.get_order(order_id);
                    }
                    Err(AppError::InvalidTransition(_)) => {}
                    Err(err) => return Err(err),
                }
            }

            // An assignment is between claiming the order and creating its mission.
            std::thread::yield_now();
        }

        Err(AppError::Conflict(format!("order {order_id} is being assigned; retry")))
    }

    /// Finishes an open mission as `Aborted`, frees its vehicle and moves
    /// the order to `order_status`. Caller holds the mission lock.
    #[allow(clippy::too_many_arguments)]
    fn abort_mission(
        &self,
        mission: &mut Mission,
        vehicle: &Vehicle,
        order_status: OrderStatus,
        reason: Option<String>,
        description: String,
        location: String,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let order = self.order_of(mission)?;
        if order.status.is_terminal() {
            return Err(AppError::invariant(format!(
                "open mission {} belongs to {:?} order {}",
                mission.id, order.status, order.id
            )));
        }

        mission.status = MissionStatus::Aborted;
        mission.end_time = Some(now);
        mission.failure_reason = reason;
        self.stores.missions.update_mission(mission.clone())?;
        self.stores.fleet.release_vehicle(vehicle.id)?;

        self.change_order_status(
            &order,
            &[],
            OrderStatusUpdate::to(order_status),
            description,
            location,
            Some(vehicle.position()),
            now,
        )?;

        self.metrics
            .missions_finished_total
            .with_label_values(&["aborted"])
            .inc();
        Ok(())
    }

    fn vehicle_of(&self, mission: &Mission) -> Result<Vehicle, AppError> {
        match self.stores.fleet.get_vehicle(mission.vehicle_id) {
            Ok(vehicle) => Ok(vehicle),
            Err(AppError::NotFound(_)) => Err(AppError::invariant(format!(
                "mission {} references missing vehicle {}",
                mission.id, mission.vehicle_id
            ))),
            Err(err) => Err(err),
        }
    }

    fn order_of(&self, mission: &Mission) -> Result<DeliveryOrder, AppError> {
        match self.stores.orders.get_order(mission.order_id) {
            Ok(order) => Ok(order),
            Err(AppError::NotFound(_)) => Err(AppError::invariant(format!(
                "mission {} references missing order {}",
                mission.id, mission.order_id
            ))),
            Err(err) => Err(err),
        }
    }

    /// Moves a mission-held vehicle between `Delivering` and `Reserved`.
    fn hand_over_vehicle(
        &self,
        vehicle: &Vehicle,
        from: VehicleStatus,
        to: VehicleStatus,
    ) -> Result<(), AppError> {
        if self.stores.fleet.transition_vehicle(vehicle.id, from, to)? {
            Ok(())
        } else {
            Err(AppError::invariant(format!(
                "vehicle {} left {from:?} while its mission was locked",
                vehicle.id
            )))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn change_order_status(
        &self,
        order: &DeliveryOrder,
        expected: &[OrderStatus],
        update: OrderStatusUpdate,
        description: String,
        location: String,
        point: Option<GeoPoint>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let status = update.status;
        let updated = self.stores.orders.update_order_status(order.id, expected, update)?;

        let Some(kind) = TrackingEventKind::for_status(status) else {
            warn!(order_id = %order.id, ?status, "no tracking event kind for status");
            return Ok(());
        };
        self.stores
            .events
            .append_tracking_event(order.id, kind, description.clone(), location, point)?;

        self.stores
            .events
            .publish(FleetEvent::OrderStatusChanged(OrderStatusChange {
                order_id: updated.id,
                tracking_code: updated.tracking_code.clone(),
                status,
                vehicle_id: updated.assigned_vehicle,
                message: description,
                timestamp: now,
            }));

        info!(order_id = %order.id, from = ?order.status, to = ?status, "order status changed");
        Ok(())
    }

    fn publish_mission_update(
        &self,
        mission: &Mission,
        action: Option<ControlAction>,
        acting_user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) {
        self.stores
            .events
            .publish(FleetEvent::MissionUpdate(MissionUpdate {
                mission_id: mission.id,
                order_id: mission.order_id,
                vehicle_id: mission.vehicle_id,
                status: mission.status,
                current_step: mission.current_step,
                total_steps: mission.total_steps,
                action,
                acting_user_id,
                timestamp: now,
            }));
    }
}

fn already_finished(mission: &Mission) -> AppError {
    AppError::InvalidTransition(format!(
        "mission {} is already {:?}",
        mission.id, mission.status
    ))
}

fn require_status(
    mission: &Mission,
    expected: MissionStatus,
    action: ControlAction,
) -> Result<(), AppError> {
    if mission.status == expected {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "cannot {action} mission {} while {:?}",
            mission.id, mission.status
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::{derive_order_status, whole_minutes_between, MissionControl};
    use crate::clock::SystemClock;
    use crate::error::AppError;
    use crate::models::mission::{Mission, MissionStatus};
    use crate::models::order::OrderStatus;
    use crate::observability::metrics::Metrics;
    use crate::store::Stores;

    fn control() -> MissionControl {
        MissionControl::new(
            Stores::in_memory(16),
            Arc::new(SystemClock),
            Metrics::new(),
        )
    }

    fn finished_mission(status: MissionStatus) -> Mission {
        Mission {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            route: Vec::new(),
            current_step: 0,
            total_steps: 0,
            estimated_duration_min: 1,
            start_time: None,
            end_time: None,
            actual_duration_min: None,
            status,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unknown_missions_leave_no_lock_behind() {
        let missions = control();

        for _ in 0..50 {
            let abort = missions.control(Uuid::new_v4(), "abort", None, None);
            assert!(matches!(abort, Err(AppError::NotFound(_))));
            let advance = missions.advance_progress(Uuid::new_v4(), 1);
            assert!(matches!(advance, Err(AppError::NotFound(_))));
        }

        assert_eq!(missions.locks.len(), 0);
    }

    #[test]
    fn finished_missions_leave_no_lock_behind() {
        let missions = control();
        for status in [MissionStatus::Aborted, MissionStatus::Completed] {
            let mission = finished_mission(status);
            let id = mission.id;
            missions.stores.missions.create_mission(mission).unwrap();

            for _ in 0..10 {
                let resume = missions.control(id, "resume", None, None);
                assert!(matches!(resume, Err(AppError::InvalidTransition(_))));
                let advance = missions.advance_progress(id, 1);
                assert!(matches!(advance, Err(AppError::InvalidTransition(_))));
            }
        }

        assert_eq!(missions.locks.len(), 0);
    }

    #[test]
    fn first_step_picks_up_the_package() {
        assert_eq!(
            derive_order_status(1, 22, OrderStatus::Assigned),
            Some(OrderStatus::PickedUp)
        );
        assert_eq!(derive_order_status(5, 22, OrderStatus::PickedUp), None);
    }

    #[test]
    fn penultimate_step_is_in_transit_and_final_is_delivered() {
        assert_eq!(
            derive_order_status(21, 22, OrderStatus::PickedUp),
            Some(OrderStatus::InTransit)
        );
        assert_eq!(derive_order_status(21, 22, OrderStatus::InTransit), None);
        assert_eq!(
            derive_order_status(22, 22, OrderStatus::InTransit),
            Some(OrderStatus::Delivered)
        );
    }

    #[test]
    fn jumping_to_the_final_step_delivers_directly() {
        assert_eq!(
            derive_order_status(22, 22, OrderStatus::Assigned),
            Some(OrderStatus::Delivered)
        );
    }

    #[test]
    fn step_zero_changes_nothing() {
        assert_eq!(derive_order_status(0, 22, OrderStatus::Assigned), None);
    }

    #[test]
    fn partial_minutes_round_up() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 8, 12, 1).unwrap();
        assert_eq!(whole_minutes_between(start, end), 13);
        assert_eq!(whole_minutes_between(start, start), 0);
    }
}
