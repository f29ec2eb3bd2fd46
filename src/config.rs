use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Serialize;

use crate::rlm::quality::Thresholds;
use crate::rlm::segment::SegmentBounds;

/// Engine knobs. Read once at startup; a session never sees them change.
#[derive(Debug, Clone, Serialize)]
pub struct RlmConfig {
    pub max_iterations: u32,
    pub max_depth: u32,
    pub early_stop_threshold: f64,
    pub min_accuracy_threshold: f64,
    /// Contexts longer than this (in chars) use the exploration strategy.
    pub split_threshold: usize,
    pub segment_target_size: usize,
    pub segment_max_size: usize,
    pub segment_min_size: usize,
    pub oracle_timeout_secs: u64,
    /// Gate exploration `FINAL:` proposals like direct ones.
    pub vet_exploration_final: bool,
    pub log_to_file: bool,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Default for RlmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_depth: 1,
            early_stop_threshold: 0.8,
            min_accuracy_threshold: 0.7,
            split_threshold: 10_000,
            segment_target_size: 2_500,
            segment_max_size: 5_000,
            segment_min_size: 500,
            oracle_timeout_secs: 120,
            vet_exploration_final: true,
            log_to_file: true,
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("Invalid value for {key}: {other:?} (expected true/false)"),
        },
    }
}

impl RlmConfig {
    /// Load from the process environment (after `.env` has been applied).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let config = Self {
            max_iterations: parsed(&lookup, "MAX_ITERATIONS", d.max_iterations)?,
            max_depth: parsed(&lookup, "MAX_DEPTH", d.max_depth)?,
            early_stop_threshold: parsed(&lookup, "EARLY_STOP_THRESHOLD", d.early_stop_threshold)?,
            min_accuracy_threshold: parsed(&lookup, "MIN_ACCURACY_THRESHOLD", d.min_accuracy_threshold)?,
            split_threshold: parsed(&lookup, "SPLIT_THRESHOLD", d.split_threshold)?,
            segment_target_size: parsed(&lookup, "SEGMENT_TARGET_SIZE", d.segment_target_size)?,
            segment_max_size: parsed(&lookup, "SEGMENT_MAX_SIZE", d.segment_max_size)?,
            segment_min_size: parsed(&lookup, "SEGMENT_MIN_SIZE", d.segment_min_size)?,
            oracle_timeout_secs: parsed(&lookup, "ORACLE_TIMEOUT_SECS", d.oracle_timeout_secs)?,
            vet_exploration_final: flag(&lookup, "VET_EXPLORATION_FINAL", d.vet_exploration_final)?,
            log_to_file: flag(&lookup, "LOG_TO_FILE", d.log_to_file)?,
            log_dir: lookup("LOG_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(d.log_dir),
            log_level: lookup("LOG_LEVEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(d.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_iterations > 0, "MAX_ITERATIONS must be at least 1");
        ensure!(
            self.segment_min_size < self.segment_target_size
                && self.segment_target_size < self.segment_max_size,
            "Segment sizes must satisfy min < target < max (got {} / {} / {})",
            self.segment_min_size,
            self.segment_target_size,
            self.segment_max_size
        );
        for (name, value) in [
            ("EARLY_STOP_THRESHOLD", self.early_stop_threshold),
            ("MIN_ACCURACY_THRESHOLD", self.min_accuracy_threshold),
        ] {
            ensure!((0.0..=1.0).contains(&value), "{name} must be within [0, 1] (got {value})");
        }
        ensure!(self.oracle_timeout_secs > 0, "ORACLE_TIMEOUT_SECS must be at least 1");
        Ok(())
    }

    pub fn segment_bounds(&self) -> SegmentBounds {
        SegmentBounds {
            target: self.segment_target_size,
            max: self.segment_max_size,
            min: self.segment_min_size,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_accuracy: self.min_accuracy_threshold,
            early_stop: self.early_stop_threshold,
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<RlmConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RlmConfig::from_lookup(move |k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = load(&[]).unwrap();
        assert_eq!(c.max_iterations, 5);
        assert_eq!(c.max_depth, 1);
        assert_eq!(c.split_threshold, 10_000);
        assert_eq!(c.segment_bounds(), SegmentBounds::default());
        assert!(c.vet_exploration_final);
        assert_eq!(c.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_overrides() {
        let c = load(&[
            ("MAX_ITERATIONS", "8"),
            ("EARLY_STOP_THRESHOLD", "0.9"),
            ("VET_EXPLORATION_FINAL", "false"),
            ("LOG_DIR", "/tmp/rlm"),
            ("SEGMENT_MIN_SIZE", " "),
        ])
        .unwrap();
        assert_eq!(c.max_iterations, 8);
        assert_eq!(c.thresholds().early_stop, 0.9);
        assert!(!c.vet_exploration_final);
        assert_eq!(c.log_dir, PathBuf::from("/tmp/rlm"));
        assert_eq!(c.segment_min_size, 500);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("MAX_ITERATIONS", "five")]).is_err());
        assert!(load(&[("MAX_ITERATIONS", "0")]).is_err());
        assert!(load(&[("MIN_ACCURACY_THRESHOLD", "1.5")]).is_err());
        assert!(load(&[("SEGMENT_MIN_SIZE", "3000")]).is_err());
        assert!(load(&[("LOG_TO_FILE", "maybe")]).is_err());
    }
}
