//! Store configuration with layered sources.
//!
//! Loading flow:
//! 1. Start with compiled [`StoreConfig::default()`]
//! 2. If a JSON file is given and exists, deep-merge it over the defaults
//! 3. Apply `SNPDB_*` environment overrides (highest priority)

use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// Connection and worker settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// How long the worker waits on its queue before re-checking shutdown.
    pub poll_interval_ms: u64,
    /// `PRAGMA busy_timeout` for every connection.
    pub busy_timeout_ms: u64,
    /// `PRAGMA journal_mode` for write connections.
    pub journal_mode: String,
    /// `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
    /// Name given to worker threads.
    pub thread_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_owned(),
            foreign_keys: false,
            thread_name: "snpdb-worker".to_owned(),
        }
    }
}

impl StoreConfig {
    /// Poll interval as a [`Duration`], kept within [`POLL_INTERVAL_MS`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(*POLL_INTERVAL_MS.start(), *POLL_INTERVAL_MS.end()),
        )
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        apply_env_overrides(&mut config);
        config
    }

    /// Defaults, then `path` deep-merged when it exists, then environment.
    pub fn load(path: &Path) -> Result<Self> {
        let defaults = serde_json::to_value(Self::default()).map_err(config_error)?;

        let merged = if path.exists() {
            debug!(?path, "loading store config from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content).map_err(config_error)?;
            deep_merge(defaults, user)
        } else {
            debug!(?path, "store config not found, using defaults");
            defaults
        };

        let mut config: Self = serde_json::from_value(merged).map_err(config_error)?;
        config.enforce_ranges();
        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Clamp numeric fields into their accepted ranges and reset an unknown
    /// journal mode, warning for each value changed.
    fn enforce_ranges(&mut self) {
        self.poll_interval_ms = clamp_field("pollIntervalMs", self.poll_interval_ms, &POLL_INTERVAL_MS);
        self.busy_timeout_ms = clamp_field("busyTimeoutMs", self.busy_timeout_ms, &BUSY_TIMEOUT_MS);
        match parse_journal_mode(&self.journal_mode) {
            Some(mode) => self.journal_mode = mode,
            None => {
                warn!(key = "journalMode", value = %self.journal_mode, "invalid journal mode, using default");
                self.journal_mode = Self::default().journal_mode;
            }
        }
    }
}

/// Accepted `pollIntervalMs` / `SNPDB_POLL_INTERVAL_MS` values.
pub const POLL_INTERVAL_MS: RangeInclusive<u64> = 1..=60_000;

/// Accepted `busyTimeoutMs` / `SNPDB_BUSY_TIMEOUT_MS` values.
pub const BUSY_TIMEOUT_MS: RangeInclusive<u64> = 0..=600_000;

fn clamp_field(key: &str, value: u64, range: &RangeInclusive<u64>) -> u64 {
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        warn!(key, value, clamped, "config value out of range, clamping");
    }
    clamped
}

fn config_error(err: serde_json::Error) -> StoreError {
    StoreError::Config(err.to_string())
}

/// Recursive merge of `source` over `target`.
///
/// Objects merge per key, everything else is replaced, and nulls in `source`
/// keep the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Journal modes `SQLite` accepts.
const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];

/// Apply `SNPDB_*` overrides. Invalid values are ignored with a warning.
pub fn apply_env_overrides(config: &mut StoreConfig) {
    if let Some(v) = read_env_u64("SNPDB_POLL_INTERVAL_MS", &POLL_INTERVAL_MS) {
        config.poll_interval_ms = v;
    }
    if let Some(v) = read_env_u64("SNPDB_BUSY_TIMEOUT_MS", &BUSY_TIMEOUT_MS) {
        config.busy_timeout_ms = v;
    }
    if let Ok(v) = std::env::var("SNPDB_JOURNAL_MODE") {
        match parse_journal_mode(&v) {
            Some(mode) => config.journal_mode = mode,
            None => warn!(key = "SNPDB_JOURNAL_MODE", value = %v, "invalid journal mode env var, ignoring"),
        }
    }
    if let Some(v) = read_env_bool("SNPDB_FOREIGN_KEYS") {
        config.foreign_keys = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a boolean: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` within `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Upper-cased journal mode, if `SQLite` knows it.
pub fn parse_journal_mode(val: &str) -> Option<String> {
    let mode = val.trim().to_uppercase();
    JOURNAL_MODES.contains(&mode.as_str()).then_some(mode)
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, range: &RangeInclusive<u64>) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, *range.start(), *range.end());
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
