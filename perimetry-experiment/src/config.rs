use std::path::{Path, PathBuf};
use std::time::Duration;

use perimetry_core::{PerimetryError, Result};
use serde::{Deserialize, Serialize};

use crate::threshold::StaircaseParams;

/// Run parameters fixed at construction.
///
/// Loadable from TOML; missing keys fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Directory holding the numbered run folders.
    pub log_root: PathBuf,
    pub min_threshold: f32,
    pub max_threshold: f32,
    pub threshold_step: f32,
    pub display_duration_ms: u64,
    /// Inclusive bounds of the uniform inter-trial delay.
    pub cooldown_range_ms: (u64, u64),
    /// Labels written to the run-info sink.
    pub stimulus_label: String,
    pub canvas_label: String,
    /// Credit an unanswered trial as a hit when the display window ended
    /// inside the response limit. Off by default: without a trigger press the
    /// trial times out.
    pub credit_unanswered_within_limit: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from("data"),
            min_threshold: 0.4,
            max_threshold: 1.0,
            threshold_step: 0.2,
            display_duration_ms: 500,
            cooldown_range_ms: (100, 500),
            stimulus_label: "Stimulus".to_string(),
            canvas_label: "Canvas".to_string(),
            credit_unanswered_within_limit: false,
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PerimetryError::InvalidConfig(msg));

        for (name, value) in [
            ("min_threshold", self.min_threshold),
            ("max_threshold", self.max_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} {value} outside [0, 1]"));
            }
        }
        if self.min_threshold > self.max_threshold {
            return invalid(format!(
                "min_threshold {} exceeds max_threshold {}",
                self.min_threshold, self.max_threshold
            ));
        }
        if !self.threshold_step.is_finite() || self.threshold_step <= 0.0 {
            return invalid(format!(
                "threshold_step {} must be positive",
                self.threshold_step
            ));
        }
        if self.display_duration_ms == 0 {
            return invalid("display_duration_ms must be positive".to_string());
        }
        let (lo, hi) = self.cooldown_range_ms;
        if lo > hi {
            return invalid(format!("cooldown_range_ms ({lo}, {hi}) is inverted"));
        }
        Ok(())
    }

    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_duration_ms)
    }

    pub fn staircase(&self) -> StaircaseParams {
        StaircaseParams {
            min: self.min_threshold,
            max: self.max_threshold,
            step: self.threshold_step,
        }
    }
}
