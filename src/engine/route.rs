//! Straight-line mission routes: base → pickup → delivery → base.
//!
//! Intermediate points are interpolated linearly in lat/lng rather than along
//! the great circle; over delivery distances the difference is negligible.

use crate::geo::{haversine_km, interpolate};
use crate::models::mission::{Waypoint, WaypointKind};
use crate::models::vehicle::GeoPoint;

pub const AVERAGE_SPEED_KM_PER_MIN: f64 = 0.5;

/// Number of interpolated points on each leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSteps {
    pub to_pickup: usize,
    pub to_delivery: usize,
    pub to_base: usize,
}

impl Default for RouteSteps {
    fn default() -> Self {
        Self {
            to_pickup: 5,
            to_delivery: 8,
            to_base: 5,
        }
    }
}

impl RouteSteps {
    /// Length of a route built with these steps.
    pub fn route_len(&self) -> usize {
        self.to_pickup + self.to_delivery + self.to_base + 4
    }
}

pub fn generate_route(
    start: GeoPoint,
    pickup: GeoPoint,
    delivery: GeoPoint,
    steps: RouteSteps,
) -> Vec<Waypoint> {
    let mut route = Vec::with_capacity(steps.route_len());

    route.push(waypoint(start, WaypointKind::Start));
    push_leg(&mut route, start, pickup, steps.to_pickup);
    route.push(waypoint(pickup, WaypointKind::Pickup));
    push_leg(&mut route, pickup, delivery, steps.to_delivery);
    route.push(waypoint(delivery, WaypointKind::Delivery));
    push_leg(&mut route, delivery, start, steps.to_base);
    route.push(waypoint(start, WaypointKind::End));

    route
}

pub fn route_distance_km(route: &[Waypoint]) -> f64 {
    route
        .windows(2)
        .map(|pair| haversine_km(&pair[0].point, &pair[1].point))
        .sum()
}

/// Whole minutes at the assumed average speed, never less than one.
pub fn estimated_duration_minutes(route: &[Waypoint]) -> u32 {
    let minutes = (route_distance_km(route) / AVERAGE_SPEED_KM_PER_MIN).ceil();
    (minutes as u32).max(1)
}

fn waypoint(point: GeoPoint, kind: WaypointKind) -> Waypoint {
    Waypoint { point, kind }
}

fn push_leg(route: &mut Vec<Waypoint>, from: GeoPoint, to: GeoPoint, steps: usize) {
    let divisions = (steps + 1) as f64;
    route.extend((1..=steps).map(|i| {
        let fraction = i as f64 / divisions;
        waypoint(interpolate(&from, &to, fraction), WaypointKind::Waypoint)
    }));
}

#[cfg(test)]
mod tests {
    use super::{estimated_duration_minutes, generate_route, route_distance_km, RouteSteps};
    use crate::geo::haversine_km;
    use crate::models::mission::WaypointKind;
    use crate::models::vehicle::GeoPoint;

    const BASE: GeoPoint = GeoPoint::new(40.7000, -74.0200);
    const PICKUP: GeoPoint = GeoPoint::new(40.7128, -74.0060);
    const DELIVERY: GeoPoint = GeoPoint::new(40.7589, -73.9851);

    #[test]
    fn default_route_has_22_points_and_returns_to_base() {
        let route = generate_route(BASE, PICKUP, DELIVERY, RouteSteps::default());

        assert_eq!(route.len(), 22);
        assert_eq!(route.first().unwrap().point, BASE);
        assert_eq!(route.last().unwrap().point, BASE);
        assert_eq!(route.first().unwrap().kind, WaypointKind::Start);
        assert_eq!(route.last().unwrap().kind, WaypointKind::End);
    }

    #[test]
    fn pickup_and_delivery_sit_after_their_legs() {
        let route = generate_route(BASE, PICKUP, DELIVERY, RouteSteps::default());

        assert_eq!(route[6].kind, WaypointKind::Pickup);
        assert_eq!(route[6].point, PICKUP);
        assert_eq!(route[15].kind, WaypointKind::Delivery);
        assert_eq!(route[15].point, DELIVERY);

        let interpolated = route
            .iter()
            .filter(|wp| wp.kind == WaypointKind::Waypoint)
            .count();
        assert_eq!(interpolated, 18);
    }

    #[test]
    fn interpolated_points_are_evenly_spaced() {
        let steps = RouteSteps {
            to_pickup: 3,
            to_delivery: 0,
            to_base: 0,
        };
        let start = GeoPoint::new(0.0, 0.0);
        let pickup = GeoPoint::new(4.0, 8.0);
        let route = generate_route(start, pickup, pickup, steps);

        assert_eq!(route.len(), steps.route_len());
        assert_eq!(route[1].point, GeoPoint::new(1.0, 2.0));
        assert_eq!(route[2].point, GeoPoint::new(2.0, 4.0));
        assert_eq!(route[3].point, GeoPoint::new(3.0, 6.0));
    }

    #[test]
    fn route_distance_covers_the_round_trip() {
        let route = generate_route(BASE, PICKUP, DELIVERY, RouteSteps::default());
        let direct = haversine_km(&BASE, &PICKUP)
            + haversine_km(&PICKUP, &DELIVERY)
            + haversine_km(&DELIVERY, &BASE);

        assert!((route_distance_km(&route) - direct).abs() < 0.05);
    }

    #[test]
    fn duration_is_at_least_one_minute() {
        let route = generate_route(PICKUP, PICKUP, PICKUP, RouteSteps::default());
        assert_eq!(route_distance_km(&route), 0.0);
        assert_eq!(estimated_duration_minutes(&route), 1);
    }

    #[test]
    fn duration_uses_thirty_km_per_hour() {
        let route = generate_route(BASE, PICKUP, DELIVERY, RouteSteps::default());
        let expected = (route_distance_km(&route) / 0.5).ceil() as u32;
        assert_eq!(estimated_duration_minutes(&route), expected);
    }
}
