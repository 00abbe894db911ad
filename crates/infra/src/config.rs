//! Engine configuration.
//!
//! Defaults mirror the production settings; `from_env` overrides any of them
//! from `FORECAST_*` / `AWS_*` variables. Missing variables keep the default,
//! unparseable ones are an error.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

use vendorflow_forecast::SelectionPolicy;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Location and credentials of the managed forecasting backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBackendSettings {
    pub region: Option<String>,
    /// Role the backend assumes to read uploaded data.
    pub role_arn: Option<String>,
    /// Object-store bucket for prepared datasets.
    pub bucket: Option<String>,
}

impl Default for ManagedBackendSettings {
    fn default() -> Self {
        Self {
            region: Some("us-east-1".to_string()),
            role_arn: None,
            bucket: Some("vendorflow-forecast-data".to_string()),
        }
    }
}

impl ManagedBackendSettings {
    /// All three settings must be present for the backend to be usable.
    pub fn is_configured(&self) -> bool {
        [&self.region, &self.role_arn, &self.bucket]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// Polling cadence and per-stage deadlines of the managed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimeouts {
    pub poll_interval: Duration,
    pub import: Duration,
    pub predictor: Duration,
    pub forecast: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            import: Duration::from_secs(60 * 60),
            predictor: Duration::from_secs(2 * 60 * 60),
            forecast: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastConfig {
    /// Minimum history length for the managed backend.
    pub min_managed_points: usize,
    /// Process-wide cap on in-flight managed jobs.
    pub max_concurrent_managed_jobs: usize,
    /// Delete managed resources as soon as a run finishes.
    pub auto_cleanup: bool,
    /// Age after which the sweeper deletes leftover managed resources.
    pub retention: Duration,
    /// How often the background sweeper runs.
    pub sweep_interval: Duration,
    /// Bound on the managed branch of a hybrid run.
    pub hybrid_wait: Duration,
    pub timeouts: PipelineTimeouts,
    pub managed: ManagedBackendSettings,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_managed_points: 60,
            max_concurrent_managed_jobs: 5,
            auto_cleanup: true,
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
            hybrid_wait: Duration::from_secs(60 * 60),
            timeouts: PipelineTimeouts::default(),
            managed: ManagedBackendSettings::default(),
        }
    }
}

impl ForecastConfig {
    pub fn with_min_managed_points(mut self, points: usize) -> Self {
        self.min_managed_points = points;
        self
    }

    pub fn with_max_concurrent_managed_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_managed_jobs = max;
        self
    }

    pub fn with_auto_cleanup(mut self, enabled: bool) -> Self {
        self.auto_cleanup = enabled;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_hybrid_wait(mut self, wait: Duration) -> Self {
        self.hybrid_wait = wait;
        self
    }

    pub fn with_timeouts(mut self, timeouts: PipelineTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_managed(mut self, managed: ManagedBackendSettings) -> Self {
        self.managed = managed;
        self
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            managed_min_points: self.min_managed_points,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (tests, alternative sources).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = parse(&lookup, "FORECAST_MIN_DATA_POINTS")? {
            cfg.min_managed_points = v;
        }
        if let Some(v) = parse::<usize, _>(&lookup, "FORECAST_MAX_CONCURRENT_JOBS")? {
            if v > Semaphore::MAX_PERMITS {
                return Err(ConfigError::Invalid {
                    key: "FORECAST_MAX_CONCURRENT_JOBS",
                    value: v.to_string(),
                    reason: format!("at most {} concurrent jobs", Semaphore::MAX_PERMITS),
                });
            }
            cfg.max_concurrent_managed_jobs = v;
        }
        if let Some(v) = parse_bool(&lookup, "FORECAST_AUTO_CLEANUP")? {
            cfg.auto_cleanup = v;
        }
        if let Some(days) = parse::<u64, _>(&lookup, "FORECAST_RETENTION_DAYS")? {
            let secs = days.checked_mul(SECS_PER_DAY).ok_or_else(|| ConfigError::Invalid {
                key: "FORECAST_RETENTION_DAYS",
                value: days.to_string(),
                reason: "retention overflows".to_string(),
            })?;
            cfg.retention = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "FORECAST_SWEEP_INTERVAL_SECS")? {
            cfg.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "FORECAST_HYBRID_WAIT_SECS")? {
            cfg.hybrid_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "FORECAST_POLL_INTERVAL_SECS")? {
            cfg.timeouts.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "FORECAST_IMPORT_TIMEOUT_SECS")? {
            cfg.timeouts.import = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "FORECAST_PREDICTOR_TIMEOUT_SECS")? {
            cfg.timeouts.predictor = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "FORECAST_FORECAST_TIMEOUT_SECS")? {
            cfg.timeouts.forecast = Duration::from_secs(secs);
        }

        if let Some(region) = lookup("AWS_REGION") {
            cfg.managed.region = Some(region);
        }
        if let Some(role) = lookup("AWS_FORECAST_ROLE_ARN") {
            cfg.managed.role_arn = Some(role);
        }
        if let Some(bucket) = lookup("AWS_S3_BUCKET") {
            cfg.managed.bucket = Some(bucket);
        }

        Ok(cfg)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn parse_bool<F>(lookup: &F, key: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_production_settings() {
        let cfg = ForecastConfig::default();
        assert_eq!(cfg.min_managed_points, 60);
        assert_eq!(cfg.max_concurrent_managed_jobs, 5);
        assert!(cfg.auto_cleanup);
        assert_eq!(cfg.timeouts.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.timeouts.predictor, Duration::from_secs(7200));
        assert!(!cfg.managed.is_configured());
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = ForecastConfig::from_lookup(lookup(&[
            ("FORECAST_MIN_DATA_POINTS", "90"),
            ("FORECAST_MAX_CONCURRENT_JOBS", "2"),
            ("FORECAST_AUTO_CLEANUP", "false"),
            ("FORECAST_RETENTION_DAYS", "1"),
            ("FORECAST_POLL_INTERVAL_SECS", "5"),
            ("AWS_FORECAST_ROLE_ARN", "arn:aws:iam::123:role/forecast"),
        ]))
        .unwrap();
        assert_eq!(cfg.min_managed_points, 90);
        assert_eq!(cfg.max_concurrent_managed_jobs, 2);
        assert!(!cfg.auto_cleanup);
        assert_eq!(cfg.retention, Duration::from_secs(86_400));
        assert_eq!(cfg.timeouts.poll_interval, Duration::from_secs(5));
        assert!(cfg.managed.is_configured());
        assert_eq!(cfg.selection_policy().managed_min_points, 90);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = ForecastConfig::from_lookup(lookup(&[("FORECAST_MAX_CONCURRENT_JOBS", "many")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "FORECAST_MAX_CONCURRENT_JOBS",
                ..
            }
        ));
        assert!(ForecastConfig::from_lookup(lookup(&[("FORECAST_AUTO_CLEANUP", "maybe")])).is_err());
    }

    #[test]
    fn values_that_parse_but_do_not_fit_are_rejected() {
        let err = ForecastConfig::from_lookup(lookup(&[("FORECAST_RETENTION_DAYS", "300000000000000")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "FORECAST_RETENTION_DAYS",
                ..
            }
        ));

        let too_many = (Semaphore::MAX_PERMITS + 1).to_string();
        let err = ForecastConfig::from_lookup(lookup(&[("FORECAST_MAX_CONCURRENT_JOBS", too_many.as_str())]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "FORECAST_MAX_CONCURRENT_JOBS",
                ..
            }
        ));

        let most = Semaphore::MAX_PERMITS.to_string();
        let cfg = ForecastConfig::from_lookup(lookup(&[("FORECAST_MAX_CONCURRENT_JOBS", most.as_str())])).unwrap();
        assert_eq!(cfg.max_concurrent_managed_jobs, Semaphore::MAX_PERMITS);
    }

    #[test]
    fn blank_backend_settings_are_not_configured() {
        let settings = ManagedBackendSettings {
            role_arn: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!settings.is_configured());
    }
}
