use crate::models::vehicle::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    // Rounding can push the term a hair outside [0, 1], which makes asin NaN.
    let haversine =
        (sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng).clamp(0.0, 1.0);
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Point at `fraction` of the way from `from` to `to`, linear in lat/lng.
pub fn interpolate(from: &GeoPoint, to: &GeoPoint, fraction: f64) -> GeoPoint {
    GeoPoint {
        lat: from.lat + (to.lat - from.lat) * fraction,
        lng: from.lng + (to.lng - from.lng) * fraction,
    }
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, interpolate};
    use crate::models::vehicle::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn near_duplicate_points_never_produce_nan() {
        let a = GeoPoint::new(40.712_800_000_000_1, -74.006);
        let b = GeoPoint::new(40.7128, -74.006_000_000_000_1);
        let distance = haversine_km(&a, &b);
        assert!(distance.is_finite());
        assert!(distance < 1e-6);
    }

    #[test]
    fn distance_is_symmetric() {
        let nyc = GeoPoint::new(40.7128, -74.0060);
        let midtown = GeoPoint::new(40.7589, -73.9851);
        assert_eq!(haversine_km(&nyc, &midtown), haversine_km(&midtown, &nyc));
    }

    #[test]
    fn one_degree_of_latitude_at_equator_is_about_111_km() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let distance = haversine_km(&a, &b);
        assert!((distance - 111.19).abs() < 1.1);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn interpolation_hits_midpoint() {
        let mid = interpolate(&GeoPoint::new(0.0, 10.0), &GeoPoint::new(2.0, 20.0), 0.5);
        assert_eq!(mid, GeoPoint::new(1.0, 15.0));
    }
}
