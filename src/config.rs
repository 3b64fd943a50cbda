use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub order_queue_size: usize,
    pub event_buffer_size: usize,
    pub sim_enabled: bool,
    pub sim_tick_secs: u64,
    pub sim_seed: Option<u64>,
    /// Operating area the simulation keeps vehicles inside.
    pub sim_bounds_min_lat: f64,
    pub sim_bounds_max_lat: f64,
    pub sim_bounds_min_lng: f64,
    pub sim_bounds_max_lng: f64,
    pub battery_low_watermark: f64,
    pub battery_high_watermark: f64,
    pub max_reservation_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            order_queue_size: 1024,
            event_buffer_size: 1024,
            sim_enabled: true,
            sim_tick_secs: 5,
            sim_seed: None,
            sim_bounds_min_lat: 40.5,
            sim_bounds_max_lat: 41.0,
            sim_bounds_min_lng: -74.3,
            sim_bounds_max_lng: -73.7,
            battery_low_watermark: 20.0,
            battery_high_watermark: 80.0,
            max_reservation_attempts: 16,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", defaults.order_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            sim_enabled: parse_or_default("SIM_ENABLED", defaults.sim_enabled)?,
            sim_tick_secs: parse_or_default("SIM_TICK_SECS", defaults.sim_tick_secs)?,
            sim_seed: parse_optional("SIM_SEED")?,
            sim_bounds_min_lat: parse_or_default(
                "SIM_BOUNDS_MIN_LAT",
                defaults.sim_bounds_min_lat,
            )?,
            sim_bounds_max_lat: parse_or_default(
                "SIM_BOUNDS_MAX_LAT",
                defaults.sim_bounds_max_lat,
            )?,
            sim_bounds_min_lng: parse_or_default(
                "SIM_BOUNDS_MIN_LNG",
                defaults.sim_bounds_min_lng,
            )?,
            sim_bounds_max_lng: parse_or_default(
                "SIM_BOUNDS_MAX_LNG",
                defaults.sim_bounds_max_lng,
            )?,
            battery_low_watermark: parse_or_default(
                "BATTERY_LOW_WATERMARK",
                defaults.battery_low_watermark,
            )?,
            battery_high_watermark: parse_or_default(
                "BATTERY_HIGH_WATERMARK",
                defaults.battery_high_watermark,
            )?,
            max_reservation_attempts: parse_or_default(
                "MAX_RESERVATION_ATTEMPTS",
                defaults.max_reservation_attempts,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.battery_low_watermark >= self.battery_high_watermark {
            return Err(AppError::Internal(format!(
                "BATTERY_LOW_WATERMARK ({}) must be below BATTERY_HIGH_WATERMARK ({})",
                self.battery_low_watermark, self.battery_high_watermark
            )));
        }
        if self.sim_tick_secs == 0 {
            return Err(AppError::Internal("SIM_TICK_SECS must be > 0".to_string()));
        }
        if self.sim_bounds_min_lat >= self.sim_bounds_max_lat
            || self.sim_bounds_min_lng >= self.sim_bounds_max_lng
        {
            return Err(AppError::Internal(
                "SIM_BOUNDS_MIN_* must be below SIM_BOUNDS_MAX_*".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
