// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: TOML file plus `WQ_*` environment overlay (spec
//! §4 "Configuration", SPEC_FULL.md ambient-stack supplement).
//!
//! Every tunable the spec enumerates in §4's "Configuration (enumerated)"
//! list has a field here. Parsing never panics: a bad value is a
//! [`ConfigError`], never a default silently swallowing a typo.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use wq_core::PriorityClass;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(String, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(String, toml::de::Error),
    #[error("invalid tenant id {0:?}: {1}")]
    InvalidTenant(String, wq_core::TenantIdError),
    #[error("invalid rate/burst configuration: {0}")]
    InvalidRate(String),
    #[error("invalid bulk operation limit: {0}")]
    InvalidBulkLimit(String),
    #[error("invalid environment variable {0}: {1}")]
    InvalidEnvVar(&'static str, String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub global_rate: f64,
    pub global_burst: f64,
    pub default_tenant_rate: f64,
    pub default_tenant_burst: f64,
    pub refill_interval_ms: u64,
    pub key_ttl_sec: u64,
    pub dry_run: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global_rate: 1_000.0,
            global_burst: 2_000.0,
            default_tenant_rate: 100.0,
            default_tenant_burst: 200.0,
            refill_interval_ms: 100,
            key_ttl_sec: 300,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FairnessSettings {
    pub weights: HashMap<String, f64>,
    pub min_guarantee_share: f64,
    pub max_wait_time_ms: u64,
    pub emergency_floor: f64,
    pub adaptive_window_sec: u64,
    pub burst_multiplier: f64,
}

impl Default for FairnessSettings {
    fn default() -> Self {
        Self {
            weights: HashMap::new(),
            min_guarantee_share: 0.1,
            max_wait_time_ms: 5_000,
            emergency_floor: 1.0,
            adaptive_window_sec: 10,
            burst_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub window_size: usize,
    pub min_samples: u32,
    pub failure_rate_threshold: f64,
    pub cooldown_sec: u64,
    pub pause_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            window_size: 20,
            min_samples: 10,
            failure_rate_threshold: 0.5,
            cooldown_sec: 30,
            pause_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub count: usize,
    pub claim_timeout_ms: u64,
    pub heartbeat_ttl_sec: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 4,
            claim_timeout_ms: 200,
            heartbeat_ttl_sec: 30,
            max_retries: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemediationSettings {
    pub bulk_op_limit: usize,
    pub pattern_cache_size: usize,
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self { bulk_op_limit: 1_000, pattern_cache_size: 256 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// `memory` or `redis://...`. Any other URL scheme is rejected at
    /// startup rather than silently falling back to in-memory.
    pub backend: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { backend: "memory".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreSettings,
    pub rate_limit: RateLimitSettings,
    pub fairness: FairnessSettings,
    pub breaker: BreakerSettings,
    pub worker: WorkerSettings,
    pub remediation: RemediationSettings,
    /// Emit structured JSON logs instead of the default human-readable
    /// format (SPEC_FULL.md ambient-stack supplement 1).
    pub json_logs: bool,
    /// Global mode (`Scope::Global`) vs. a fixed single-tenant namespace;
    /// multi-tenant deployments run one daemon per tenant or leave this
    /// unset and namespace at the store layer.
    pub tenant: Option<String>,
    pub reaper_sweep_interval_sec: u64,
    pub drain_timeout_sec: u64,
}

impl Config {
    /// Load from a TOML file if present, then apply `WQ_*` environment
    /// overrides (teacher's env.rs centralizes env access the same way;
    /// here the overlay happens once at startup instead of per-call,
    /// since every setting below is read once to build the daemon).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
                toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.display().to_string(), e))?
            }
            None => Config::default(),
        };
        config.apply_env_overlay()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overlay(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("WQ_STORE_BACKEND") {
            self.store.backend = v;
        }
        if let Ok(v) = std::env::var("WQ_TENANT") {
            self.tenant = Some(v);
        }
        if let Ok(v) = std::env::var("WQ_JSON_LOGS") {
            self.json_logs = parse_bool("WQ_JSON_LOGS", &v)?;
        }
        if let Ok(v) = std::env::var("WQ_WORKER_COUNT") {
            self.worker.count = parse_usize("WQ_WORKER_COUNT", &v)?;
        }
        if let Ok(v) = std::env::var("WQ_GLOBAL_RATE") {
            self.rate_limit.global_rate = parse_f64("WQ_GLOBAL_RATE", &v)?;
        }
        if let Ok(v) = std::env::var("WQ_BULK_OP_LIMIT") {
            self.remediation.bulk_op_limit = parse_usize("WQ_BULK_OP_LIMIT", &v)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(tenant) = &self.tenant {
            wq_core::TenantId::parse(tenant.clone())
                .map_err(|e| ConfigError::InvalidTenant(tenant.clone(), e))?;
        }
        if self.rate_limit.global_rate <= 0.0 || self.rate_limit.global_burst <= 0.0 {
            return Err(ConfigError::InvalidRate("global rate/burst must be positive".to_string()));
        }
        if self.remediation.bulk_op_limit == 0 {
            return Err(ConfigError::InvalidBulkLimit("bulk_op_limit must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn scope(&self) -> wq_core::Scope {
        match &self.tenant {
            Some(t) => wq_core::TenantId::parse(t.clone()).map(wq_core::Scope::Tenant).unwrap_or(wq_core::Scope::Global),
            None => wq_core::Scope::Global,
        }
    }

    pub fn fairness_weights(&self) -> HashMap<PriorityClass, f64> {
        self.fairness
            .weights
            .iter()
            .map(|(k, v)| (k.parse::<PriorityClass>().unwrap_or(PriorityClass::Normal), *v))
            .collect()
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_millis(self.worker.claim_timeout_ms)
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.worker.heartbeat_ttl_sec)
    }

    pub fn breaker_pause(&self) -> Duration {
        Duration::from_millis(self.breaker.pause_ms)
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidEnvVar(var, raw.to_string()))
}

fn parse_usize(var: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidEnvVar(var, raw.to_string()))
}

fn parse_f64(var: &'static str, raw: &str) -> Result<f64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidEnvVar(var, raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn invalid_tenant_is_rejected() {
        let mut config = Config::default();
        config.tenant = Some("x".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_bulk_limit_is_rejected() {
        let mut config = Config::default();
        config.remediation.bulk_op_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wqd.toml");
        std::fs::write(&path, "[worker]\ncount = 8\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.worker.count, 8);
    }
}
