//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Engine tuning can also come from a TOML file named by
//! `TICKETFLOW_CONFIG`; environment variables override the file.

pub mod secrets;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::sla::{BusinessCalendar, MonitorConfig};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let engine = match std::env::var("TICKETFLOW_CONFIG") {
            Ok(path) => EngineConfig::load(Path::new(&path))?,
            Err(_) => EngineConfig::default(),
        };

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            engine: engine.with_env_overrides()?,
        })
    }
}

/// Engine tuning. Every key is optional and defaults as documented.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Seconds between SLA sweeps. Default 300.
    pub sweep_interval_secs: u64,
    /// Minutes ahead of `due_at` a ticket counts as at risk. Default 30.
    pub warning_horizon_minutes: i64,
    /// Business window as `HH:MM-HH:MM`. Default `09:00-17:00`.
    pub business_hours: String,
    /// Per-request webhook timeout in seconds. Default 10.
    pub webhook_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            warning_horizon_minutes: 30,
            business_hours: "09:00-17:00".to_string(),
            webhook_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read engine config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `SLA_SWEEP_INTERVAL_SECS`, `SLA_WARNING_HORIZON_MINUTES`,
    /// `BUSINESS_HOURS` and `WEBHOOK_TIMEOUT_SECS` when set.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = optional_var("SLA_SWEEP_INTERVAL_SECS")? {
            self.sweep_interval_secs = v;
        }
        if let Some(v) = optional_var("SLA_WARNING_HORIZON_MINUTES")? {
            self.warning_horizon_minutes = v;
        }
        if let Some(v) = optional_var("BUSINESS_HOURS")? {
            self.business_hours = v;
        }
        if let Some(v) = optional_var("WEBHOOK_TIMEOUT_SECS")? {
            self.webhook_timeout_secs = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep interval must be positive".to_string()));
        }
        if self.warning_horizon_minutes < 0 {
            return Err(Error::Config(
                "warning horizon must not be negative".to_string(),
            ));
        }
        if self.webhook_timeout_secs == 0 {
            return Err(Error::Config("webhook timeout must be positive".to_string()));
        }
        self.calendar()?;
        Ok(())
    }

    pub fn calendar(&self) -> Result<BusinessCalendar> {
        BusinessCalendar::parse(&self.business_hours)
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
            warning_horizon: chrono::Duration::minutes(self.warning_horizon_minutes),
        }
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
