use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::emotion::FALLBACK_TTL_MS;

// ============================================================================
// Top-level config
// ============================================================================

/// Read-only configuration snapshot, supplied once at construction.
///
/// Every section is optional; an empty file (or no file at all) means no
/// rate limits and fallback TTLs everywhere.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LumiConfig {
    /// Per-emotion minimum re-fire interval
    pub rate_limits: HashMap<String, RateLimit>,
    /// Per-emotion defaults (TTL)
    pub emotion_profiles: HashMap<String, EmotionProfile>,
    pub orchestrator: OrchestratorConfig,
}

impl LumiConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: LumiConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, return
    /// defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(n) = env_u64("LUMIWINK_SLEEP_AFTER_MS") {
            self.orchestrator.sleep_after_ms = n;
        }
        if let Some(n) = env_u64("LUMIWINK_REFLECT_DELAY_MS") {
            self.orchestrator.reflect_delay_ms = n;
        }
        if let Some(n) = env_u64("LUMIWINK_WATCHDOG_INTERVAL_MS") {
            self.orchestrator.watchdog_interval_ms = n;
        }
    }

    /// Minimum spacing between activations of `name`. Zero when unset.
    pub fn min_interval(&self, name: &str) -> Duration {
        self.rate_limits
            .get(name)
            .map(|r| Duration::from_millis(r.min_interval_ms))
            .unwrap_or(Duration::ZERO)
    }

    /// Configured TTL for `name`, or [`FALLBACK_TTL_MS`].
    pub fn default_ttl_ms(&self, name: &str) -> u64 {
        self.emotion_profiles
            .get(name)
            .and_then(|p| p.ttl_ms)
            .unwrap_or(FALLBACK_TTL_MS)
    }

    /// Watchdog polling period.
    ///
    /// Never longer than the shortest configured TTL, never below 10ms.
    pub fn watchdog_interval(&self) -> Duration {
        let shortest_ttl = self
            .emotion_profiles
            .values()
            .filter_map(|p| p.ttl_ms)
            .min()
            .unwrap_or(u64::MAX);
        let ms = self
            .orchestrator
            .watchdog_interval_ms
            .min(shortest_ttl)
            .max(10);
        Duration::from_millis(ms)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmotionProfile {
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Idle time without user activity before an empty room puts the device to sleep
    pub sleep_after_ms: u64,
    /// Delay of the reflect → idle hop after speech finishes
    pub reflect_delay_ms: u64,
    /// Wall-clock period of the idle "calm" heartbeat
    pub heartbeat_period_secs: u64,
    /// Cadence of the periodic tick
    pub tick_interval_ms: u64,
    pub watchdog_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sleep_after_ms: 300_000,
            reflect_delay_ms: 600,
            heartbeat_period_secs: 30,
            tick_interval_ms: 200,
            watchdog_interval_ms: 200,
        }
    }
}

impl OrchestratorConfig {
    pub fn sleep_after(&self) -> Duration {
        Duration::from_millis(self.sleep_after_ms)
    }

    pub fn reflect_delay(&self) -> Duration {
        Duration::from_millis(self.reflect_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

// ============================================================================
// Tests
// ============================================================================
