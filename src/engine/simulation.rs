//! Periodic fleet simulation standing in for real telemetry.
//!
//! Each tick jitters positions, drains or recharges batteries and moves
//! vehicles in and out of `Charging`. Mission steps are never advanced
//! here; progress comes from `PATCH /missions/:id/progress`.
//!
//! A vehicle is read, stepped and written back under its store lock, so a
//! tick never overwrites a release or a telemetry report that landed after
//! the fleet listing.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::models::event::{AlertKind, FleetEvent, PositionUpdate, VehicleAlert};
use crate::models::vehicle::{GeoPoint, TelemetryRecord, Vehicle, VehicleStatus};
use crate::observability::metrics::Metrics;
use crate::state::AppState;
use crate::store::Stores;

/// Uniform samples in `[0, 1)`.
pub trait RandomSource: Send {
    fn next_unit(&mut self) -> f64;
}

pub struct StdRandom(StdRng);

impl StdRandom {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self(StdRng::from_os_rng())
    }
}

impl RandomSource for StdRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.random::<f64>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min_lat: 40.5,
            max_lat: 41.0,
            min_lng: -74.3,
            max_lng: -73.7,
        }
    }
}

impl BoundingBox {
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }

    pub fn clamp(&self, point: GeoPoint) -> GeoPoint {
        GeoPoint {
            lat: point.lat.clamp(self.min_lat, self.max_lat),
            lng: point.lng.clamp(self.min_lng, self.max_lng),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationSettings {
    pub tick: Duration,
    pub bounds: BoundingBox,
    /// Full width of the per-axis random walk, in degrees.
    pub position_jitter_deg: f64,
    pub max_drain_percent: f64,
    pub max_recharge_percent: f64,
    pub low_watermark: f64,
    pub high_watermark: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            bounds: BoundingBox::default(),
            position_jitter_deg: 0.001,
            max_drain_percent: 2.0,
            max_recharge_percent: 2.0,
            low_watermark: 20.0,
            high_watermark: 80.0,
        }
    }
}

impl SimulationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick: Duration::from_secs(config.sim_tick_secs),
            bounds: BoundingBox {
                min_lat: config.sim_bounds_min_lat,
                max_lat: config.sim_bounds_max_lat,
                min_lng: config.sim_bounds_min_lng,
                max_lng: config.sim_bounds_max_lng,
            },
            low_watermark: config.battery_low_watermark,
            high_watermark: config.battery_high_watermark,
            ..Self::default()
        }
    }
}

/// Outcome of simulating one vehicle for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleStep {
    pub location: GeoPoint,
    pub battery: f64,
    pub transition: Option<(VehicleStatus, VehicleStatus)>,
    pub low_battery: bool,
}

/// Pure per-vehicle step. Returns `None` for vehicles the simulation leaves
/// alone (inactive, reserved, in maintenance, offline).
///
/// Positions inside the operating area stay inside it. A vehicle based
/// elsewhere jitters around where it is.
pub fn step_vehicle(
    vehicle: &Vehicle,
    settings: &SimulationSettings,
    rng: &mut dyn RandomSource,
) -> Option<VehicleStep> {
    if !vehicle.is_active {
        return None;
    }

    let mut location = vehicle.position();
    let mut battery = vehicle.battery;
    let mut transition = None;
    let mut low_battery = false;

    match vehicle.status {
        VehicleStatus::Available | VehicleStatus::Delivering => {
            let jitter = settings.position_jitter_deg;
            let moved = GeoPoint {
                lat: location.lat + (rng.next_unit() - 0.5) * jitter,
                lng: location.lng + (rng.next_unit() - 0.5) * jitter,
            };
            location = if settings.bounds.contains(location) {
                settings.bounds.clamp(moved)
            } else {
                moved
            };

            if vehicle.status == VehicleStatus::Delivering {
                battery = (battery - rng.next_unit() * settings.max_drain_percent).max(0.0);
            }

            if battery < settings.low_watermark {
                if vehicle.status == VehicleStatus::Available {
                    transition = Some((VehicleStatus::Available, VehicleStatus::Charging));
                    low_battery = true;
                } else if vehicle.battery >= settings.low_watermark {
                    // Stays Delivering until its mission releases it.
                    low_battery = true;
                }
            }
        }
        VehicleStatus::Charging => {
            battery = (battery + rng.next_unit() * settings.max_recharge_percent).min(100.0);
            if battery >= settings.high_watermark {
                transition = Some((VehicleStatus::Charging, VehicleStatus::Available));
            }
        }
        VehicleStatus::Reserved | VehicleStatus::Maintenance | VehicleStatus::Offline => {
            return None;
        }
    }

    Some(VehicleStep {
        location,
        battery,
        transition,
        low_battery,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub updated: usize,
    pub alerts: usize,
    pub charging_started: usize,
    pub charging_finished: usize,
}

pub struct FleetSimulator<R: RandomSource> {
    stores: Stores,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    settings: SimulationSettings,
    rng: R,
}

impl<R: RandomSource> FleetSimulator<R> {
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        settings: SimulationSettings,
        rng: R,
    ) -> Self {
        Self {
            stores,
            clock,
            metrics,
            settings,
            rng,
        }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let now = self.clock.now();

        let ids: Vec<_> = self
            .stores
            .fleet
            .list_vehicles()
            .into_iter()
            .map(|vehicle| vehicle.id)
            .collect();

        for id in ids {
            let mut step = None;
            let updated = self.stores.fleet.modify_vehicle(id, &mut |vehicle: &mut Vehicle| {
                let Some(next) = step_vehicle(vehicle, &self.settings, &mut self.rng) else {
                    return false;
                };
                vehicle.location = Some(next.location);
                vehicle.battery = next.battery;
                if let Some((_, to)) = next.transition {
                    vehicle.status = to;
                }
                step = Some(next);
                true
            });

            let (vehicle, step) = match (updated, step) {
                (Ok(Some(vehicle)), Some(step)) => (vehicle, step),
                (Ok(_), _) => continue,
                (Err(err), _) => {
                    warn!(vehicle_id = %id, error = %err, "failed to persist telemetry");
                    continue;
                }
            };

            match step.transition {
                Some((_, VehicleStatus::Charging)) => {
                    report.charging_started += 1;
                    debug!(vehicle_id = %id, battery = step.battery, "vehicle sent to charge");
                }
                Some(_) => {
                    report.charging_finished += 1;
                    info!(vehicle_id = %id, battery = step.battery, "vehicle recharged");
                }
                None => {}
            }

            if step.low_battery {
                let message = format!(
                    "Drone {} has low battery ({}%)",
                    vehicle.name,
                    step.battery.floor()
                );
                warn!(vehicle_id = %id, battery = step.battery, "low battery");
                self.metrics.low_battery_alerts_total.inc();
                self.stores.events.publish(FleetEvent::Alert(VehicleAlert {
                    vehicle_id: id,
                    kind: AlertKind::LowBattery,
                    message,
                    timestamp: now,
                }));
                report.alerts += 1;
            }

            self.metrics
                .vehicle_battery_percent
                .with_label_values(&[&id.to_string()])
                .set(step.battery);

            self.stores.fleet.record_telemetry(TelemetryRecord {
                vehicle_id: id,
                location: step.location,
                battery: step.battery,
                status: vehicle.status,
                recorded_at: now,
            });
            self.stores
                .events
                .publish(FleetEvent::PositionUpdate(PositionUpdate {
                    vehicle_id: id,
                    location: step.location,
                    battery: step.battery,
                    status: vehicle.status,
                    timestamp: now,
                }));
            report.updated += 1;
        }

        report
    }
}

/// Ticks the simulation and, after each tick, retries pending orders.
pub async fn run_simulation<R: RandomSource + 'static>(
    state: Arc<AppState>,
    mut simulator: FleetSimulator<R>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(simulator.settings().tick);
    info!(tick = ?simulator.settings().tick, "fleet simulation started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("fleet simulation shutting down");
                break;
            }
            _ = ticker.tick() => {
                let report = simulator.tick();
                debug!(
                    updated = report.updated,
                    alerts = report.alerts,
                    charging_started = report.charging_started,
                    charging_finished = report.charging_finished,
                    "simulation tick"
                );

                let assigned = state.dispatcher.retry_pending();
                if assigned > 0 {
                    info!(assigned, "pending orders assigned after tick");
                }
            }
        }
    }
}
