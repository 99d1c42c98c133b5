// Worker configuration with layered sources (file, env)

use cadence_core::trigger::TriggerSpec;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main settings structure for the worker binary
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub worker: WorkerOptions,
    pub schedule: ScheduleOptions,
    pub scheduler: SchedulerOptions,
    pub observability: ObservabilityOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerOptions {
    /// Also fire the greeting once right after startup
    #[serde(default)]
    pub run_immediately: bool,
    /// Address the greeting notification would go to
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleOptions {
    pub interval_hours: u32,
    /// Wall-clock firing time, "HH:MM"
    pub time_of_day: String,
    /// IANA timezone identifier the firing time is evaluated in
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerOptions {
    pub drain_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityOptions {
    pub log_level: String,
}

impl Settings {
    /// Load configuration with layered precedence: defaults -> local -> env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.schedule.interval_hours == 0 {
            return Err("schedule.interval_hours must be greater than 0".to_string());
        }
        self.parse_time_of_day()?;
        self.parse_timezone()?;
        if self.scheduler.drain_timeout_seconds == 0 {
            return Err("scheduler.drain_timeout_seconds must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Build the daily trigger described by the schedule section
    pub fn trigger(&self) -> Result<TriggerSpec, String> {
        let (hour, minute) = self.parse_time_of_day()?;
        let timezone = self.parse_timezone()?;
        TriggerSpec::daily(self.schedule.interval_hours, hour, minute, timezone)
            .map_err(|e| e.to_string())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.drain_timeout_seconds)
    }

    fn parse_time_of_day(&self) -> Result<(u32, u32), String> {
        let text = &self.schedule.time_of_day;
        let (hour, minute) = text
            .split_once(':')
            .ok_or_else(|| format!("schedule.time_of_day must be HH:MM, got '{text}'"))?;
        let hour: u32 = hour
            .parse()
            .map_err(|_| format!("schedule.time_of_day has a bad hour: '{text}'"))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| format!("schedule.time_of_day has a bad minute: '{text}'"))?;
        if hour > 23 || minute > 59 {
            return Err(format!("schedule.time_of_day out of range: '{text}'"));
        }
        Ok((hour, minute))
    }

    fn parse_timezone(&self) -> Result<Tz, String> {
        Tz::from_str(&self.schedule.timezone)
            .map_err(|_| format!("schedule.timezone is not resolvable: '{}'", self.schedule.timezone))
    }
}
