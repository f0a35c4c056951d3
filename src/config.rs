//! Hierarchical configuration: base → environment overlay → restaurant
//! overlay, merged as plain TOML documents before being deserialized into
//! the typed [`AppConfig`]. Mirrors the teacher crate's
//! `PerfConfig::load`/`from_env` pattern (serde + `toml`, `Default` for
//! anything a layer omits), but layers three files instead of one.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdBound {
    pub bound: f64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaborThresholds {
    pub status: Vec<ThresholdBound>,
    pub grade: Vec<ThresholdBound>,
}

impl Default for LaborThresholds {
    fn default() -> Self {
        Self {
            status: vec![
                ThresholdBound { bound: 20.0, label: "EXCELLENT".into() },
                ThresholdBound { bound: 25.0, label: "GOOD".into() },
                ThresholdBound { bound: 30.0, label: "WARNING".into() },
                ThresholdBound { bound: 35.0, label: "CRITICAL".into() },
                ThresholdBound { bound: f64::MAX, label: "SEVERE".into() },
            ],
            grade: vec![
                ThresholdBound { bound: 18.0, label: "A+".into() },
                ThresholdBound { bound: 20.0, label: "A".into() },
                ThresholdBound { bound: 23.0, label: "B+".into() },
                ThresholdBound { bound: 25.0, label: "B".into() },
                ThresholdBound { bound: 28.0, label: "C+".into() },
                ThresholdBound { bound: 30.0, label: "C".into() },
                ThresholdBound { bound: 33.0, label: "D+".into() },
                ThresholdBound { bound: 35.0, label: "D".into() },
                ThresholdBound { bound: f64::MAX, label: "F".into() },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningRates {
    pub early_observations: f64,
    pub mature_observations: f64,
}

impl Default for LearningRates {
    fn default() -> Self {
        Self { early_observations: 0.3, mature_observations: 0.2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityThresholds {
    pub min_confidence: f64,
    pub min_observations: u32,
}

impl Default for ReliabilityThresholds {
    fn default() -> Self {
        Self { min_confidence: 0.6, min_observations: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternLearningConfig {
    pub learning_rates: LearningRates,
    pub reliability_thresholds: ReliabilityThresholds,
}

impl Default for PatternLearningConfig {
    fn default() -> Self {
        Self {
            learning_rates: LearningRates::default(),
            reliability_thresholds: ReliabilityThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShiftsConfig {
    pub cutoff_hour: u32,
    pub manager_job_keywords: Vec<String>,
}

impl Default for ShiftsConfig {
    fn default() -> Self {
        Self { cutoff_hour: 14, manager_job_keywords: vec!["manager".to_string()] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OvertimeConfig {
    pub weekly_threshold_hours: f64,
    pub multiplier: f64,
}

impl Default for OvertimeConfig {
    fn default() -> Self {
        Self { weekly_threshold_hours: 40.0, multiplier: 1.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoClockoutConfig {
    pub default_hourly_rate: f64,
    /// Keyed "RESTAURANT:ROLE:DAY_CATEGORY" -> expected end time "HH:MM".
    /// DAY_CATEGORY is "weekday" or "sunday".
    pub shift_schedules: std::collections::HashMap<String, String>,
}

impl Default for AutoClockoutConfig {
    fn default() -> Self {
        Self { default_hourly_rate: 15.0, shift_schedules: std::collections::HashMap::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_workers: usize,
    pub soft_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_workers: 1, soft_timeout_secs: 60 }
    }
}

/// Root configuration tree, merged base → environment → restaurant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub thresholds: ThresholdsSection,
    pub pattern_learning: PatternLearningConfig,
    pub shifts: ShiftsConfig,
    pub overtime: OvertimeConfig,
    pub auto_clockout: AutoClockoutConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ThresholdsSection {
    pub labor: LaborThresholds,
}

impl AppConfig {
    /// Loads and merges base + optional environment overlay + optional
    /// restaurant overlay. Missing overlay files are treated as empty
    /// layers, not errors; a malformed file that exists is a
    /// `PipelineError::Config`.
    pub fn load_layered(
        base_path: &Path,
        environment: Option<&str>,
        restaurant: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut merged = serde_json::Value::Object(Default::default());
        merge_layer(&mut merged, base_path)?;

        if let Some(env) = environment {
            let env_path = base_path.with_file_name(format!("{env}.toml"));
            merge_layer(&mut merged, &env_path)?;
        }
        if let Some(restaurant) = restaurant {
            let restaurant_path = base_path.with_file_name(format!("{restaurant}.toml"));
            merge_layer(&mut merged, &restaurant_path)?;
        }

        let config: AppConfig = serde_json::from_value(merged)
            .map_err(|e| anyhow::anyhow!(crate::error::PipelineError::Config(e.to_string())))?;
        Ok(config)
    }
}

fn merge_layer(target: &mut serde_json::Value, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!(crate::error::PipelineError::Config(e.to_string())))?;
    let layer: toml::Value = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!(crate::error::PipelineError::Config(e.to_string())))?;
    let layer_json = serde_json::to_value(layer)
        .map_err(|e| anyhow::anyhow!(crate::error::PipelineError::Config(e.to_string())))?;
    deep_merge(target, layer_json);
    Ok(())
}

fn deep_merge(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                deep_merge(base_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.shifts.cutoff_hour, 14);
        assert_eq!(cfg.overtime.weekly_threshold_hours, 40.0);
        assert_eq!(cfg.overtime.multiplier, 1.5);
        assert_eq!(cfg.auto_clockout.default_hourly_rate, 15.0);
        assert_eq!(cfg.pattern_learning.reliability_thresholds.min_confidence, 0.6);
        assert_eq!(cfg.pattern_learning.reliability_thresholds.min_observations, 4);
    }

    #[test]
    fn missing_overlay_files_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.toml");
        std::fs::write(&base, "[shifts]\ncutoff_hour = 14\n").unwrap();
        let cfg = AppConfig::load_layered(&base, Some("staging"), Some("sdr")).unwrap();
        assert_eq!(cfg.shifts.cutoff_hour, 14);
    }

    #[test]
    fn restaurant_overlay_wins_over_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.toml");
        std::fs::write(&base, "[overtime]\nweekly_threshold_hours = 40\n").unwrap();
        let restaurant_path = dir.path().join("sdr.toml");
        std::fs::write(&restaurant_path, "[overtime]\nweekly_threshold_hours = 35\n").unwrap();
        let cfg = AppConfig::load_layered(&base, None, Some("sdr")).unwrap();
        assert_eq!(cfg.overtime.weekly_threshold_hours, 35.0);
    }
}
