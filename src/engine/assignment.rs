use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::distr::Alphanumeric;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::mission::{describe_status, plan_mission};
use crate::engine::pricing::{estimate_delivery_deadline, estimate_fee};
use crate::engine::route::RouteSteps;
use crate::engine::scoring::{rank_candidates, MIN_DISPATCH_BATTERY};
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::assignment::{Assignment, ScoreBreakdown};
use crate::models::event::{FleetEvent, OrderStatusChange};
use crate::models::order::{DeliveryOrder, NewOrder, OrderStatus, OrderStatusUpdate};
use crate::models::tracking::TrackingEventKind;
use crate::models::vehicle::Vehicle;
use crate::observability::metrics::Metrics;
use crate::state::AppState;
use crate::store::Stores;

const TRACKING_CODE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub route_steps: RouteSteps,
    /// How many fresh snapshots `dispatch` takes after losing a vehicle claim.
    pub max_reservation_attempts: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            route_steps: RouteSteps::default(),
            max_reservation_attempts: 16,
        }
    }
}

pub struct Dispatcher {
    stores: Stores,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    settings: DispatchSettings,
    assignments: DashMap<Uuid, Assignment>,
}

impl Dispatcher {
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            stores,
            clock,
            metrics,
            settings,
            assignments: DashMap::new(),
        }
    }

    /// Validates and prices a new order and stores it as `Pending`.
    pub fn submit_order(&self, request: NewOrder) -> Result<DeliveryOrder, AppError> {
        validate_new_order(&request)?;

        let now = self.clock.now();
        let distance_km = haversine_km(&request.pickup, &request.dropoff);
        let delivery_fee = estimate_fee(distance_km, request.urgency, request.package_weight_kg);
        let estimated_delivery = estimate_delivery_deadline(now, request.urgency);

        for _ in 0..TRACKING_CODE_ATTEMPTS {
            let order = DeliveryOrder {
                id: Uuid::new_v4(),
                tracking_code: generate_tracking_code(now),
                customer_id: request.customer_id,
                pickup: request.pickup,
                pickup_address: request.pickup_address.trim().to_string(),
                dropoff: request.dropoff,
                dropoff_address: request.dropoff_address.trim().to_string(),
                package_weight_kg: request.package_weight_kg,
                package_description: request.package_description.trim().to_string(),
                delivery_instructions: request
                    .delivery_instructions
                    .clone()
                    .filter(|text| !text.trim().is_empty()),
                urgency: request.urgency,
                distance_km,
                delivery_fee,
                status: OrderStatus::Pending,
                assigned_vehicle: None,
                created_at: now,
                estimated_delivery,
                actual_delivery: None,
            };

            match self.stores.orders.create_order(order.clone()) {
                Ok(()) => {
                    info!(
                        order_id = %order.id,
                        tracking_code = %order.tracking_code,
                        distance_km = order.distance_km,
                        fee = order.delivery_fee,
                        "order created"
                    );
                    return Ok(order);
                }
                Err(AppError::Conflict(_)) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(AppError::Internal(
            "could not allocate a unique tracking code".to_string(),
        ))
    }

    /// One assignment attempt against a fresh fleet snapshot.
    pub fn assign_order(&self, order_id: Uuid) -> Result<Assignment, AppError> {
        let order = self.stores.orders.get_order(order_id)?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::InvalidTransition(format!(
                "order {order_id} is {:?}, only pending orders can be assigned",
                order.status
            )));
        }

        let candidates = self
            .stores
            .fleet
            .list_candidate_vehicles(order.package_weight_kg, MIN_DISPATCH_BATTERY);
        let (vehicle, score, breakdown) = rank_candidates(&candidates, &order)
            .into_iter()
            .next()
            .ok_or(AppError::NoCapacity(order.id))?;

        if !self.stores.fleet.reserve_vehicle(vehicle.id)? {
            return Err(AppError::ReservationConflict(vehicle.id));
        }

        self.commit_assignment(&order, vehicle, score, breakdown)
            .inspect_err(|_| {
                if let Err(release_err) = self.stores.fleet.release_vehicle(vehicle.id) {
                    error!(
                        vehicle_id = %vehicle.id,
                        error = %release_err,
                        "failed to release vehicle after aborted assignment"
                    );
                }
            })
    }

    /// Assigns an order, retrying with a fresh snapshot whenever another
    /// assignment wins the vehicle first.
    pub fn dispatch(&self, order_id: Uuid) -> Result<Assignment, AppError> {
        let mut attempt = 1;
        loop {
            match self.assign_order(order_id) {
                Err(AppError::ReservationConflict(vehicle_id))
                    if attempt < self.settings.max_reservation_attempts =>
                {
                    debug!(%order_id, %vehicle_id, attempt, "lost vehicle claim; retrying");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// Tries to place every pending order, oldest first. Returns how many
    /// were assigned.
    pub fn retry_pending(&self) -> usize {
        let mut pending = self.stores.orders.list_orders(Some(OrderStatus::Pending));
        if pending.is_empty() {
            return 0;
        }
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut assigned = 0;
        for order in pending {
            let start = Instant::now();
            match self.dispatch(order.id) {
                Ok(_) => {
                    self.metrics
                        .record_assignment("success", start.elapsed().as_secs_f64());
                    assigned += 1;
                }
                Err(err) if err.is_retryable() => {
                    self.metrics
                        .record_assignment("deferred", start.elapsed().as_secs_f64());
                }
                // Assigned or cancelled through another path since listing.
                Err(AppError::InvalidTransition(_)) => {}
                Err(err) => {
                    self.metrics
                        .record_assignment("error", start.elapsed().as_secs_f64());
                    warn!(order_id = %order.id, error = %err, "pending order retry failed");
                }
            }
        }
        assigned
    }

    pub fn assignments(&self) -> Vec<Assignment> {
        let mut assignments: Vec<Assignment> = self
            .assignments
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at).then(a.id.cmp(&b.id)));
        assignments
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    fn commit_assignment(
        &self,
        order: &DeliveryOrder,
        vehicle: &Vehicle,
        score: f64,
        breakdown: ScoreBreakdown,
    ) -> Result<Assignment, AppError> {
        let now = self.clock.now();

        let updated_order = self.stores.orders.update_order_status(
            order.id,
            &[OrderStatus::Pending],
            OrderStatusUpdate {
                status: OrderStatus::Assigned,
                assigned_vehicle: Some(vehicle.id),
                actual_delivery: None,
            },
        )?;

        let mission = plan_mission(order, vehicle, self.settings.route_steps, now);
        self.stores.missions.create_mission(mission.clone())?;

        let description = describe_status(OrderStatus::Assigned, &vehicle.name);
        self.stores.events.append_tracking_event(
            order.id,
            TrackingEventKind::Assigned,
            description.clone(),
            vehicle.name.clone(),
            Some(vehicle.position()),
        )?;

        let assignment = Assignment {
            id: Uuid::new_v4(),
            order_id: order.id,
            vehicle_id: vehicle.id,
            mission_id: mission.id,
            score,
            score_breakdown: breakdown,
            assigned_at: now,
        };
        self.assignments.insert(assignment.id, assignment.clone());

        self.stores
            .events
            .publish(FleetEvent::Assignment(assignment.clone()));
        self.stores
            .events
            .publish(FleetEvent::OrderStatusChanged(OrderStatusChange {
                order_id: order.id,
                tracking_code: updated_order.tracking_code,
                status: OrderStatus::Assigned,
                vehicle_id: Some(vehicle.id),
                message: description,
                timestamp: now,
            }));

        info!(
            order_id = %order.id,
            vehicle_id = %vehicle.id,
            mission_id = %mission.id,
            score,
            waypoints = mission.total_steps,
            "order assigned"
        );

        Ok(assignment)
    }
}

fn validate_new_order(request: &NewOrder) -> Result<(), AppError> {
    if request.pickup_address.trim().is_empty() {
        return Err(AppError::BadRequest("pickup_address cannot be empty".to_string()));
    }
    if request.dropoff_address.trim().is_empty() {
        return Err(AppError::BadRequest("dropoff_address cannot be empty".to_string()));
    }
    if request.package_description.trim().is_empty() {
        return Err(AppError::BadRequest(
            "package_description cannot be empty".to_string(),
        ));
    }
    if !request.package_weight_kg.is_finite() || request.package_weight_kg <= 0.0 {
        return Err(AppError::BadRequest("package_weight_kg must be > 0".to_string()));
    }
    if !request.pickup.is_valid() {
        return Err(AppError::BadRequest("pickup is not a valid coordinate".to_string()));
    }
    if !request.dropoff.is_valid() {
        return Err(AppError::BadRequest("dropoff is not a valid coordinate".to_string()));
    }
    Ok(())
}

/// `DD<epoch millis><4 uppercase alphanumerics>`.
fn generate_tracking_code(now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect();
    format!("DD{}{}", now.timestamp_millis(), suffix.to_ascii_uppercase())
}

pub async fn run_assignment_engine(state: Arc<AppState>, mut order_rx: mpsc::Receiver<Uuid>) {
    info!("assignment engine started");

    while let Some(order_id) = order_rx.recv().await {
        state.metrics.orders_in_queue.dec();

        let start = Instant::now();
        match state.dispatcher.dispatch(order_id) {
            Ok(_) => {
                state
                    .metrics
                    .record_assignment("success", start.elapsed().as_secs_f64());
            }
            Err(err) if err.is_retryable() => {
                state
                    .metrics
                    .record_assignment("deferred", start.elapsed().as_secs_f64());
                warn!(%order_id, error = %err, "order left pending for retry");
            }
            Err(err) => {
                state
                    .metrics
                    .record_assignment("error", start.elapsed().as_secs_f64());
                error!(%order_id, error = %err, "failed to process order");
            }
        }
    }

    warn!("assignment engine stopped: queue channel closed");
}
