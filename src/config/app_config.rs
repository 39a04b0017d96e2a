use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::helpers::deserialize_duration_from_seconds;
use crate::calendar::WorkingWindow;

const WEEKDAY_WINDOW_START: NaiveTime = crate::calendar::time_of_day(7, 0);
const WEEKDAY_WINDOW_END: NaiveTime = crate::calendar::time_of_day(23, 0);
const WEEKEND_WINDOW_START: NaiveTime = crate::calendar::time_of_day(10, 0);
const WEEKEND_WINDOW_END: NaiveTime = crate::calendar::time_of_day(19, 0);

/// Provides the default value for shutdown_timeout_secs.
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default value for sla_minutes.
fn default_sla_minutes() -> i64 {
    60
}

/// Provides the default announcement thresholds.
fn default_thresholds() -> Vec<i64> {
    vec![15, 10, 5]
}

/// Provides the default weekday working window.
fn default_weekday_window() -> WorkingWindow {
    WorkingWindow { start: WEEKDAY_WINDOW_START, end: WEEKDAY_WINDOW_END }
}

/// Provides the default weekend working window.
fn default_weekend_window() -> WorkingWindow {
    WorkingWindow { start: WEEKEND_WINDOW_START, end: WEEKEND_WINDOW_END }
}

/// Provides the default calendar timezone.
fn default_calendar_timezone() -> Tz {
    chrono_tz::Europe::Moscow
}

/// Provides the default value for poll_interval_secs.
fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default Telegram Bot API base URL.
fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// Provides the default value for long_poll_timeout_secs.
fn default_long_poll_timeout() -> Duration {
    Duration::from_secs(25)
}

/// Application configuration for Warden.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Database URL for the SQLite ticket store.
    pub database_url: String,

    /// SLA clock configuration.
    #[serde(default)]
    pub sla: SlaConfig,

    /// Telegram transport configuration.
    pub telegram: TelegramConfig,

    /// The maximum time in seconds to wait for graceful shutdown.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout_secs: Duration,
}

/// Configuration of the working calendar and the deadline clock.
#[derive(Debug, Deserialize, Clone)]
pub struct SlaConfig {
    /// The SLA budget in working minutes.
    #[serde(default = "default_sla_minutes")]
    pub sla_minutes: i64,

    /// Remaining-minute marks to announce, in descending order.
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<i64>,

    /// Working window applied Monday through Friday.
    #[serde(default = "default_weekday_window")]
    pub weekday_window: WorkingWindow,

    /// Working window applied Saturday and Sunday.
    #[serde(default = "default_weekend_window")]
    pub weekend_window: WorkingWindow,

    /// The IANA timezone the calendar arithmetic is performed in.
    #[serde(default = "default_calendar_timezone")]
    pub calendar_timezone: Tz,

    /// The interval in seconds between monitor poll cycles.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_poll_interval"
    )]
    pub poll_interval_secs: Duration,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            sla_minutes: default_sla_minutes(),
            thresholds: default_thresholds(),
            weekday_window: default_weekday_window(),
            weekend_window: default_weekend_window(),
            calendar_timezone: default_calendar_timezone(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Configuration of the Telegram transport.
#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    /// Bot API token.
    pub bot_token: String,

    /// The chat that receives SLA warnings, breach notices and reports.
    pub notification_chat_id: i64,

    /// Bot API base URL, overridable for tests.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// The long-polling timeout in seconds for `getUpdates`.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_long_poll_timeout"
    )]
    pub long_poll_timeout_secs: Duration,
}

impl AppConfig {
    /// Creates a new `AppConfig` by reading from the configuration directory,
    /// with `WARDEN__`-prefixed environment overrides layered on top.
    ///
    /// The configuration is validated before it is returned; the process must
    /// refuse to start rather than run with undefined calendar semantics.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir_str = config_dir.unwrap_or("configs");
        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/app.yaml", config_dir_str)))
            .add_source(Environment::with_prefix("WARDEN").separator("__"))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sla.validate()?;
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Message("telegram.bot_token must not be empty".into()));
        }
        Ok(())
    }
}

impl SlaConfig {
    /// Validates the SLA budget, thresholds and working windows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sla_minutes < 1 {
            return Err(ConfigError::Message(format!(
                "sla.sla_minutes must be positive, got {}",
                self.sla_minutes
            )));
        }
        if self.poll_interval_secs.is_zero() {
            return Err(ConfigError::Message("sla.poll_interval_secs must be positive".into()));
        }
        for (name, window) in
            [("weekday_window", &self.weekday_window), ("weekend_window", &self.weekend_window)]
        {
            if window.start >= window.end {
                return Err(ConfigError::Message(format!(
                    "sla.{name} is empty: start {} must precede end {}",
                    window.start, window.end
                )));
            }
        }
        for threshold in &self.thresholds {
            if *threshold < 1 || *threshold >= self.sla_minutes {
                return Err(ConfigError::Message(format!(
                    "sla.thresholds entry {threshold} must lie strictly between 0 and sla_minutes ({})",
                    self.sla_minutes
                )));
            }
        }
        if self.thresholds.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(ConfigError::Message(
                "sla.thresholds must be strictly descending".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> tempfile::TempDir {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("app.yaml"), content).unwrap();
        temp_dir
    }

    #[test]
    fn test_app_config_from_file_with_defaults() {
        let temp_dir = write_config(
            r#"
            database_url: "sqlite::memory:"
            telegram:
              bot_token: "token"
              notification_chat_id: -100123
            "#,
        );

        let config = AppConfig::new(Some(temp_dir.path().to_str().unwrap())).unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.telegram.notification_chat_id, -100123);
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert_eq!(config.sla.sla_minutes, 60);
        assert_eq!(config.sla.thresholds, vec![15, 10, 5]);
        assert_eq!(config.sla.calendar_timezone, chrono_tz::Europe::Moscow);
        assert_eq!(config.sla.poll_interval_secs, Duration::from_secs(30));
        assert_eq!(config.sla.weekday_window.start, WEEKDAY_WINDOW_START);
        assert_eq!(config.sla.weekend_window.end, WEEKEND_WINDOW_END);
        assert_eq!(config.shutdown_timeout_secs, Duration::from_secs(30));
    }

    #[test]
    fn test_app_config_with_explicit_sla_section() {
        let temp_dir = write_config(
            r#"
            database_url: "sqlite::memory:"
            sla:
              sla_minutes: 120
              thresholds: [30, 10]
              weekday_window: { start: "09:00", end: "18:00" }
              weekend_window: { start: "11:00", end: "15:00" }
              calendar_timezone: "Europe/Berlin"
              poll_interval_secs: 5
            telegram:
              bot_token: "token"
              notification_chat_id: 42
            shutdown_timeout_secs: 10
            "#,
        );

        let config = AppConfig::new(Some(temp_dir.path().to_str().unwrap())).unwrap();

        assert_eq!(config.sla.sla_minutes, 120);
        assert_eq!(config.sla.thresholds, vec![30, 10]);
        assert_eq!(config.sla.calendar_timezone, chrono_tz::Europe::Berlin);
        assert_eq!(
            config.sla.weekday_window.start,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
        assert_eq!(config.sla.poll_interval_secs, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout_secs, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_timezone_is_rejected() {
        let temp_dir = write_config(
            r#"
            database_url: "sqlite::memory:"
            sla:
              calendar_timezone: "Mars/Olympus_Mons"
            telegram:
              bot_token: "token"
              notification_chat_id: 42
            "#,
        );

        assert!(AppConfig::new(Some(temp_dir.path().to_str().unwrap())).is_err());
    }

    #[test]
    fn test_non_descending_thresholds_are_rejected() {
        let config = SlaConfig { thresholds: vec![5, 10, 15], ..Default::default() };
        assert!(config.validate().is_err());

        let config = SlaConfig { thresholds: vec![15, 15, 5], ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_outside_budget_is_rejected() {
        let config = SlaConfig { thresholds: vec![60], ..Default::default() };
        assert!(config.validate().is_err());

        let config = SlaConfig { thresholds: vec![0], ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_window_is_rejected() {
        let window = WorkingWindow {
            start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        };
        let config = SlaConfig { weekend_window: window, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_sla_budget_is_rejected() {
        let config = SlaConfig { sla_minutes: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_bot_token_is_rejected() {
        let temp_dir = write_config(
            r#"
            database_url: "sqlite::memory:"
            telegram:
              bot_token: ""
              notification_chat_id: 42
            "#,
        );

        assert!(AppConfig::new(Some(temp_dir.path().to_str().unwrap())).is_err());
    }
}
