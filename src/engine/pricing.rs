use chrono::{DateTime, Duration, Utc};

use crate::models::order::Urgency;

const BASE_FEE: f64 = 5.0;
const FEE_PER_KM: f64 = 0.5;
const FEE_PER_KG: f64 = 0.2;

/// Delivery fee, rounded to cents.
pub fn estimate_fee(distance_km: f64, urgency: Urgency, weight_kg: f64) -> f64 {
    let fee = (BASE_FEE + distance_km * FEE_PER_KM + weight_kg * FEE_PER_KG)
        * urgency.fee_multiplier();
    (fee * 100.0).round() / 100.0
}

pub fn estimate_delivery_deadline(now: DateTime<Utc>, urgency: Urgency) -> DateTime<Utc> {
    now + Duration::minutes(urgency.delivery_window_minutes())
}
