use super::traits::{ConfigManifest, ConfigSection, FieldManifest};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};

/// Tuning of the adaptive operator selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Time horizon; `None` uses the run's `max_generation`.
    pub horizon: Option<usize>,
    /// Reward for offspring fitter than their parents.
    pub success_reward: f64,
    /// Reward for any valid offspring.
    pub offspring_reward: f64,
    /// The candidate set is reset every `horizon / reset_divisor` updates.
    pub reset_divisor: usize,
    /// Starting and maximum mutation strength in adaptive runs.
    pub temperature: f64,
    /// Per-update factor applied while offspring keep improving.
    pub cooling: f64,
    /// Per-update factor applied while they do not.
    pub warming: f64,
    /// Cooling bounces back above `temperature * min_temperature_ratio`.
    pub min_temperature_ratio: f64,
    /// Fraction of calls producing fitter offspring that triggers cooling.
    pub exploit_success_rate: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            horizon: None,
            success_reward: 0.7,
            offspring_reward: 0.3,
            reset_divisor: 4,
            temperature: 0.85,
            cooling: 0.95,
            warming: 1.05,
            min_temperature_ratio: 0.15,
            exploit_success_rate: 0.2,
        }
    }
}

impl ConfigSection for SelectorConfig {
    fn section_name() -> &'static str {
        "selector"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.horizon == Some(0) {
            return Err(EvoError::Configuration(
                "Selector horizon must be positive".to_string(),
            ));
        }
        if self.success_reward < 0.0 || self.offspring_reward < 0.0 {
            return Err(EvoError::Configuration(
                "Selector rewards cannot be negative".to_string(),
            ));
        }
        if self.reset_divisor == 0 {
            return Err(EvoError::Configuration(
                "reset_divisor must be at least 1".to_string(),
            ));
        }
        if !(self.temperature > 0.0 && self.temperature <= 1.0) {
            return Err(EvoError::Configuration(
                "Selector temperature must be in (0, 1]".to_string(),
            ));
        }
        if !(self.cooling > 0.0 && self.cooling < 1.0) || self.warming < 1.0 {
            return Err(EvoError::Configuration(
                "cooling must be in (0, 1) and warming at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("min_temperature_ratio", self.min_temperature_ratio),
            ("exploit_success_rate", self.exploit_success_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EvoError::Configuration(format!("{} must be in [0, 1]", name)));
            }
        }
        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        use serde_json::json;
        ConfigManifest {
            section: "Selector".to_string(),
            fields: vec![
                FieldManifest::new("horizon", "integer", json!(null), (Some(1.0), None), "Bandit horizon, defaults to max_generation"),
                FieldManifest::new("success_reward", "float", json!(0.7), (Some(0.0), None), "Weight of offspring fitter than their parents"),
                FieldManifest::new("offspring_reward", "float", json!(0.3), (Some(0.0), None), "Weight of valid offspring"),
                FieldManifest::new("reset_divisor", "integer", json!(4), (Some(1.0), None), "Full candidate reset every horizon/reset_divisor updates"),
                FieldManifest::new("temperature", "float", json!(0.85), (Some(0.0), Some(1.0)), "Initial mutation strength of adaptive runs"),
                FieldManifest::new("cooling", "float", json!(0.95), (Some(0.0), Some(1.0)), "Strength factor while offspring improve"),
                FieldManifest::new("warming", "float", json!(1.05), (Some(1.0), None), "Strength factor while offspring stall"),
                FieldManifest::new("min_temperature_ratio", "float", json!(0.15), (Some(0.0), Some(1.0)), "Lowest strength, as a fraction of temperature"),
                FieldManifest::new("exploit_success_rate", "float", json!(0.2), (Some(0.0), Some(1.0)), "Success rate above which strength is lowered"),
            ],
        }
    }
}
