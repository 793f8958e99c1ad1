// =============================================================================
// Runtime Configuration — Engine timing, phase graph and category table
// =============================================================================
//
// Every tunable number of the simulator lives here: tick interval, the
// random duration ranges of each timed phase, the expiring low-water mark,
// the dwell and cooldown delays and the signal category table.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// Validation is separate from loading: `EngineConfig::validate` rejects a
// table or range the engine could never honour, and the engine refuses to
// start with one.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

// =============================================================================
// Errors
// =============================================================================

/// A configuration that cannot drive the engine.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("signal category table is empty")]
    EmptyCategories,

    #[error("category `{label}`: {reason}")]
    InvalidCategory { label: String, reason: String },

    #[error("duration range `{name}` is invalid: [{min}, {max})")]
    InvalidDuration { name: &'static str, min: u32, max: u32 },

    #[error("tick interval must be > 0 ms")]
    ZeroTickInterval,

    #[error("time format `{0}` is not a valid strftime pattern")]
    InvalidTimeFormat(String),
}

/// Reject a strftime pattern chrono cannot render.
pub fn validate_time_format(pattern: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidTimeFormat(pattern.to_string()));
    }
    Ok(())
}

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_analysis() -> Option<DurationRange> {
    Some(DurationRange::new(14, 120))
}

fn default_entry_window() -> DurationRange {
    DurationRange::new(25, 50)
}

fn default_awaiting_entry() -> Option<DurationRange> {
    Some(DurationRange::new(10, 20))
}

fn default_low_water_mark_secs() -> u32 {
    6
}

fn default_dwell_secs() -> u64 {
    5
}

fn default_manual_cooldown_secs() -> u64 {
    25
}

fn default_rearm_delay_secs() -> u64 {
    1
}

fn default_min_spread() -> f64 {
    0.5
}

fn default_categories() -> Vec<SignalCategory> {
    vec![
        SignalCategory::new("early cashout", 1.5, 2.2, 3.1),
        SignalCategory::new("positive entry", 2.8, 6.0, 11.0),
        SignalCategory::new("high risk", 1.5, 4.0, 6.8),
    ]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_history_key() -> String {
    "aviator_history".to_string()
}

fn default_user_key() -> String {
    "aviator_user".to_string()
}

fn default_time_format() -> String {
    "%H:%M".to_string()
}

// =============================================================================
// DurationRange
// =============================================================================

/// Whole-second duration drawn uniformly from `[min_secs, max_secs)`.
/// `min_secs == max_secs` pins the duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRange {
    pub min_secs: u32,
    pub max_secs: u32,
}

impl DurationRange {
    pub const fn new(min_secs: u32, max_secs: u32) -> Self {
        Self { min_secs, max_secs }
    }

    pub const fn fixed(secs: u32) -> Self {
        Self::new(secs, secs)
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.min_secs == 0 || self.min_secs > self.max_secs {
            return Err(ConfigError::InvalidDuration {
                name,
                min: self.min_secs,
                max: self.max_secs,
            });
        }
        Ok(())
    }
}

// =============================================================================
// SignalCategory
// =============================================================================

/// One row of the category table.
///
/// The lower bound is drawn from `[low_min, low_max)`, the upper bound from
/// `[lower + min_spread, ceiling)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCategory {
    pub label: String,
    pub low_min: f64,
    pub low_max: f64,
    pub ceiling: f64,
    #[serde(default = "default_min_spread")]
    pub min_spread: f64,
}

impl SignalCategory {
    pub fn new(label: impl Into<String>, low_min: f64, low_max: f64, ceiling: f64) -> Self {
        Self {
            label: label.into(),
            low_min,
            low_max,
            ceiling,
            min_spread: default_min_spread(),
        }
    }

    /// Checks that the upper-bound range is never inverted, which is what
    /// makes `lower < upper` hold for every draw.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidCategory {
            label: self.label.clone(),
            reason: reason.to_string(),
        };

        if self.label.trim().is_empty() {
            return Err(invalid("label is empty"));
        }
        let all_finite = [self.low_min, self.low_max, self.ceiling, self.min_spread]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(invalid("bounds must be finite"));
        }
        if self.low_min <= 0.0 || self.low_min > self.low_max {
            return Err(invalid("low range must satisfy 0 < low_min <= low_max"));
        }
        if self.min_spread <= 0.0 {
            return Err(invalid("min_spread must be > 0"));
        }
        if self.low_max + self.min_spread > self.ceiling {
            return Err(invalid("low_max + min_spread exceeds ceiling"));
        }
        Ok(())
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Phase graph, timing and category table for the signal engine.
///
/// `analysis = None` removes the `Analyzing` phase (manual-only engine);
/// `awaiting_entry = None` makes the entry window go straight to `Complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between ticks in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Duration of the `Analyzing` countdown. `None` disables the phase.
    #[serde(default = "default_analysis")]
    pub analysis: Option<DurationRange>,

    /// Duration of the `Ready` entry window.
    #[serde(default = "default_entry_window")]
    pub entry_window: DurationRange,

    /// Duration of the `AwaitingEntry` countdown. `None` disables the phase.
    #[serde(default = "default_awaiting_entry")]
    pub awaiting_entry: Option<DurationRange>,

    /// Promote `Ready` to an explicit `Expiring` phase inside the low-water
    /// band instead of only raising the `is_expiring` flag.
    #[serde(default)]
    pub expiring_phase: bool,

    /// Remaining seconds at or below which the entry window is expiring.
    #[serde(default = "default_low_water_mark_secs")]
    pub low_water_mark_secs: u32,

    /// How long `Complete` holds before the engine resets to `Idle`.
    #[serde(default = "default_dwell_secs")]
    pub dwell_secs: u64,

    /// Cooldown after a manual trigger during which further triggers are
    /// ignored.
    #[serde(default = "default_manual_cooldown_secs")]
    pub manual_cooldown_secs: u64,

    /// Delay between returning to `Idle` and re-arming the analysis countdown.
    #[serde(default = "default_rearm_delay_secs")]
    pub rearm_delay_secs: u64,

    /// Signal categories. Must not be empty.
    #[serde(default = "default_categories")]
    pub categories: Vec<SignalCategory>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            analysis: default_analysis(),
            entry_window: default_entry_window(),
            awaiting_entry: default_awaiting_entry(),
            expiring_phase: false,
            low_water_mark_secs: default_low_water_mark_secs(),
            dwell_secs: default_dwell_secs(),
            manual_cooldown_secs: default_manual_cooldown_secs(),
            rearm_delay_secs: default_rearm_delay_secs(),
            categories: default_categories(),
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        if let Some(range) = &self.analysis {
            range.validate("analysis")?;
        }
        self.entry_window.validate("entry_window")?;
        if let Some(range) = &self.awaiting_entry {
            range.validate("awaiting_entry")?;
        }
        if self.categories.is_empty() {
            return Err(ConfigError::EmptyCategories);
        }
        for category in &self.categories {
            category.validate()?;
        }
        Ok(())
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the simulator process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Directory holding the persisted slots.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Slot holding the signal history.
    #[serde(default = "default_history_key")]
    pub history_key: String,

    /// Slot holding the registration record.
    #[serde(default = "default_user_key")]
    pub user_key: String,

    /// strftime pattern for the history time-of-day column.
    #[serde(default = "default_time_format")]
    pub time_format: String,

    /// Fixed RNG seed. `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            data_dir: default_data_dir(),
            history_key: default_history_key(),
            user_key: default_user_key(),
            time_format: default_time_format(),
            seed: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            categories = config.engine.categories.len(),
            autonomous = config.engine.analysis.is_some(),
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Copy of this configuration with `SIGNAL_*` env and CLI overrides
    /// applied. `self` is left as loaded.
    pub fn with_overrides(&self, data_dir: Option<PathBuf>) -> Self {
        let mut effective = self.clone();
        effective.apply_env();
        if let Some(dir) = data_dir {
            effective.data_dir = dir;
        }
        effective
    }

    /// Apply `SIGNAL_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(ms) = env_parse::<u64>("SIGNAL_TICK_MS") {
            self.engine.tick_interval_ms = ms;
        }
        if let Some(seed) = env_parse::<u64>("SIGNAL_SEED") {
            self.seed = Some(seed);
        }
        if let Ok(dir) = std::env::var("SIGNAL_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir.trim());
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.engine.tick_interval_ms, 1000);
        assert_eq!(cfg.engine.analysis, Some(DurationRange::new(14, 120)));
        assert_eq!(cfg.engine.entry_window, DurationRange::new(25, 50));
        assert_eq!(cfg.engine.low_water_mark_secs, 6);
        assert_eq!(cfg.engine.dwell_secs, 5);
        assert_eq!(cfg.engine.manual_cooldown_secs, 25);
        assert_eq!(cfg.engine.categories.len(), 3);
        assert_eq!(cfg.history_key, "aviator_history");
        assert_eq!(cfg.user_key, "aviator_user");
        assert!(cfg.seed.is_none());
    }

    #[test]
    fn default_engine_config_validates() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "engine": { "analysis": null, "dwell_secs": 3 }, "seed": 7 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.engine.analysis.is_none());
        assert_eq!(cfg.engine.dwell_secs, 3);
        assert_eq!(cfg.engine.manual_cooldown_secs, 25);
        assert_eq!(cfg.seed, Some(7));
    }

    #[test]
    fn category_without_spread_gets_default_spread() {
        let json = r#"{ "label": "x", "low_min": 1.0, "low_max": 2.0, "ceiling": 4.0 }"#;
        let category: SignalCategory = serde_json::from_str(json).unwrap();
        assert!((category.min_spread - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_category_table_is_rejected() {
        let cfg = EngineConfig {
            categories: Vec::new(),
            ..EngineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyCategories));
    }

    #[test]
    fn unreachable_upper_range_is_rejected() {
        let cfg = EngineConfig {
            categories: vec![SignalCategory::new("tight", 1.5, 3.0, 3.2)],
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidCategory { label, .. }) if label == "tight"
        ));
    }

    #[test]
    fn inverted_low_range_is_rejected() {
        let category = SignalCategory::new("inverted", 3.0, 2.0, 9.0);
        assert!(category.validate().is_err());
    }

    #[test]
    fn zero_duration_is_rejected() {
        let cfg = EngineConfig {
            entry_window: DurationRange::new(0, 5),
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidDuration { name: "entry_window", .. })
        ));
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let cfg = EngineConfig {
            tick_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTickInterval));
    }

    #[test]
    fn time_format_patterns_are_checked() {
        assert_eq!(validate_time_format("%H:%M"), Ok(()));
        assert_eq!(validate_time_format("%d/%m %H:%M:%S"), Ok(()));
        assert_eq!(
            validate_time_format("%Q"),
            Err(ConfigError::InvalidTimeFormat("%Q".to_string()))
        );
    }

    #[test]
    fn cli_data_dir_override_leaves_loaded_config_untouched() {
        let loaded = RuntimeConfig::default();
        let effective = loaded.with_overrides(Some(PathBuf::from("/tmp/override-slots")));

        assert_eq!(effective.data_dir, PathBuf::from("/tmp/override-slots"));
        assert_eq!(loaded, RuntimeConfig::default());
        assert_eq!(loaded.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("signal-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runtime_config.json");

        let mut cfg = RuntimeConfig::default();
        cfg.seed = Some(42);
        cfg.engine.expiring_phase = true;
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("missing-{}.json", uuid::Uuid::new_v4()));
        assert!(RuntimeConfig::load(path).is_err());
    }
}
