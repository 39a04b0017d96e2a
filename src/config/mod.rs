//! Configuration module for Warden.

mod app_config;
mod helpers;

pub use app_config::{AppConfig, SlaConfig, TelegramConfig};
pub use helpers::{deserialize_duration_from_seconds, deserialize_time_of_day};
