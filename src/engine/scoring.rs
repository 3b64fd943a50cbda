use std::cmp::Ordering;

use crate::geo::haversine_km;
use crate::models::assignment::ScoreBreakdown;
use crate::models::order::DeliveryOrder;
use crate::models::vehicle::{Vehicle, VehicleStatus};

pub const MIN_DISPATCH_BATTERY: f64 = 30.0;

const DISTANCE_WEIGHT: f64 = 0.7;
const BATTERY_WEIGHT: f64 = 0.3;

/// Lower is better.
pub fn compute_score(vehicle: &Vehicle, order: &DeliveryOrder) -> (f64, ScoreBreakdown) {
    let distance_km = haversine_km(&vehicle.position(), &order.pickup);

    let breakdown = ScoreBreakdown {
        distance_to_pickup_km: distance_km,
        battery_percent: vehicle.battery,
        distance_component: distance_km * DISTANCE_WEIGHT,
        battery_component: (100.0 - vehicle.battery) * BATTERY_WEIGHT,
    };

    let score = weighted_score(&breakdown);
    (score, breakdown)
}

fn weighted_score(breakdown: &ScoreBreakdown) -> f64 {
    breakdown.distance_component + breakdown.battery_component
}

pub fn is_eligible(vehicle: &Vehicle, order: &DeliveryOrder) -> bool {
    vehicle.is_active
        && vehicle.status == VehicleStatus::Available
        && vehicle.battery >= MIN_DISPATCH_BATTERY
        && vehicle.capacity_kg >= order.package_weight_kg
}

/// Eligible candidates ranked best first; ties go to the lower vehicle id.
pub fn rank_candidates<'a>(
    candidates: &'a [Vehicle],
    order: &DeliveryOrder,
) -> Vec<(&'a Vehicle, f64, ScoreBreakdown)> {
    let mut ranked: Vec<_> = candidates
        .iter()
        .filter(|vehicle| is_eligible(vehicle, order))
        .map(|vehicle| {
            let (score, breakdown) = compute_score(vehicle, order);
            (vehicle, score, breakdown)
        })
        .collect();

    ranked.sort_by(|a, b| match a.1.total_cmp(&b.1) {
        Ordering::Equal => a.0.id.cmp(&b.0.id),
        other => other,
    });
    ranked
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{compute_score, rank_candidates};
    use crate::models::order::{DeliveryOrder, OrderStatus, Urgency};
    use crate::models::vehicle::{GeoPoint, Vehicle, VehicleStatus};

    fn vehicle(id_seed: u128, lat: f64, lng: f64, battery: f64, capacity_kg: f64) -> Vehicle {
        Vehicle {
            id: Uuid::from_u128(id_seed),
            name: format!("drone-{id_seed}"),
            model: "X4".to_string(),
            home: GeoPoint { lat, lng },
            location: None,
            battery,
            capacity_kg,
            status: VehicleStatus::Available,
            operator_id: None,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    fn order(weight_kg: f64, lat: f64, lng: f64) -> DeliveryOrder {
        let now = Utc::now();
        DeliveryOrder {
            id: Uuid::new_v4(),
            tracking_code: "DD1TEST".to_string(),
            customer_id: Uuid::new_v4(),
            pickup: GeoPoint { lat, lng },
            pickup_address: "pickup".to_string(),
            dropoff: GeoPoint {
                lat: lat + 0.01,
                lng: lng + 0.01,
            },
            dropoff_address: "dropoff".to_string(),
            package_weight_kg: weight_kg,
            package_description: "parcel".to_string(),
            delivery_instructions: None,
            urgency: Urgency::Standard,
            distance_km: 1.4,
            delivery_fee: 6.0,
            status: OrderStatus::Pending,
            assigned_vehicle: None,
            created_at: now,
            estimated_delivery: now,
            actual_delivery: None,
        }
    }

    #[test]
    fn score_combines_distance_and_battery() {
        let pickup_order = order(1.0, 40.7128, -74.0060);
        let at_pickup = vehicle(1, 40.7128, -74.0060, 80.0, 5.0);

        let (score, breakdown) = compute_score(&at_pickup, &pickup_order);
        assert!(breakdown.distance_to_pickup_km < 1e-9);
        assert!((score - 6.0).abs() < 1e-9);
    }

    #[test]
    fn closer_vehicle_wins_when_other_factors_match() {
        let pickup_order = order(1.0, 40.7128, -74.0060);
        let fleet = vec![
            vehicle(1, 40.80, -73.90, 90.0, 5.0),
            vehicle(2, 40.7130, -74.0062, 90.0, 5.0),
        ];

        let ranked = rank_candidates(&fleet, &pickup_order);
        assert_eq!(ranked[0].0.id, Uuid::from_u128(2));
    }

    #[test]
    fn fuller_battery_breaks_a_distance_tie() {
        let pickup_order = order(1.0, 40.7128, -74.0060);
        let fleet = vec![
            vehicle(1, 40.72, -74.0, 50.0, 5.0),
            vehicle(2, 40.72, -74.0, 95.0, 5.0),
        ];

        let ranked = rank_candidates(&fleet, &pickup_order);
        assert_eq!(ranked[0].0.id, Uuid::from_u128(2));
    }

    #[test]
    fn identical_scores_fall_back_to_vehicle_id() {
        let pickup_order = order(1.0, 40.7128, -74.0060);
        let fleet = vec![
            vehicle(9, 40.72, -74.0, 70.0, 5.0),
            vehicle(3, 40.72, -74.0, 70.0, 5.0),
        ];

        let ranked = rank_candidates(&fleet, &pickup_order);
        assert_eq!(ranked[0].0.id, Uuid::from_u128(3));
        assert_eq!(ranked[1].0.id, Uuid::from_u128(9));
    }

    #[test]
    fn weak_or_small_vehicles_are_never_ranked() {
        let pickup_order = order(2.5, 40.7128, -74.0060);
        let mut fleet = vec![
            vehicle(1, 40.7128, -74.0060, 29.0, 10.0),
            vehicle(2, 40.7128, -74.0060, 100.0, 2.0),
            vehicle(3, 40.7128, -74.0060, 100.0, 10.0),
            vehicle(4, 41.0, -73.8, 31.0, 2.5),
        ];
        fleet[2].status = VehicleStatus::Charging;

        let ranked = rank_candidates(&fleet, &pickup_order);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.id, Uuid::from_u128(4));
    }
}
