use galley_shared::{CabinClass, Masked};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub cabin: CabinConfig,
    #[serde(default)]
    pub reservation: ReservationConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub seat: SeatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub database: String,
    pub username: String,
    pub password: Masked<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CabinConfig {
    pub class: CabinClass,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeatConfig {
    #[serde(default = "default_seat_id_file")]
    pub id_file: String,
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self { id_file: default_seat_id_file() }
    }
}

fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_max_attempts() -> u32 { 8 }
fn default_initial_backoff_ms() -> u64 { 50 }
fn default_max_backoff_ms() -> u64 { 2_000 }
fn default_attempt_timeout_ms() -> u64 { 10_000 }
fn default_reconnect_delay_ms() -> u64 { 5_000 }
fn default_heartbeat_ms() -> u64 { 600 }
fn default_seat_id_file() -> String { ".galley-seat-id".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `GALLEY__CABIN__CLASS=business`
            .add_source(
                config::Environment::with_prefix("GALLEY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(raw: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = from_toml(
            r#"
            [store]
            base_url = "http://gateway:4984"
            database = "flight"
            username = "seatuser"
            password = "hunter2"

            [cabin]
            class = "business"
            "#,
        );

        assert_eq!(config.cabin.class, CabinClass::Business);
        assert_eq!(config.store.request_timeout_ms, 10_000);
        assert_eq!(config.reservation.max_attempts, 8);
        assert_eq!(config.feed.reconnect_delay_ms, 5_000);
        assert_eq!(config.seat.id_file, ".galley-seat-id");
        assert!(!format!("{:?}", config.store).contains("hunter2"));
    }
}
