use super::traits::{ConfigManifest, ConfigSection, FieldManifest};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Survivors kept after each generation.
    pub mu: usize,
    /// Offspring collected per generation.
    pub lambda: usize,
    pub max_generation: usize,
    pub seed: u64,
    /// Mutation strength handed to the operators.
    pub strength: f64,
    pub tournament_size: usize,
    /// Generations an individual may survive; `None` disables culling.
    pub lifespan: Option<u64>,
    /// Best individuals exempted from culling.
    pub top_n: usize,
    /// Operator calls allowed per requested offspring.
    pub max_attempts_factor: usize,
    pub operator_selection: OperatorSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorSelection {
    Uniform,
    Adaptive,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            mu: 10,
            lambda: 20,
            max_generation: 100,
            seed: 42,
            strength: 1.0,
            tournament_size: 2,
            lifespan: None,
            top_n: 0,
            max_attempts_factor: 50,
            operator_selection: OperatorSelection::Uniform,
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.mu == 0 {
            return Err(EvoError::Configuration(
                "Population size (mu) must be at least 1".to_string(),
            ));
        }
        if self.lambda == 0 {
            return Err(EvoError::Configuration(
                "Offspring size (lambda) must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(EvoError::Configuration(
                "Strength must be between 0 and 1".to_string(),
            ));
        }
        if self.tournament_size == 0 {
            return Err(EvoError::Configuration(
                "Tournament size must be at least 1".to_string(),
            ));
        }
        if self.max_attempts_factor == 0 {
            return Err(EvoError::Configuration(
                "max_attempts_factor must be at least 1".to_string(),
            ));
        }
        if self.top_n > self.mu {
            return Err(EvoError::Configuration(format!(
                "top_n ({}) cannot exceed mu ({})",
                self.top_n, self.mu
            )));
        }
        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        use serde_json::json;
        ConfigManifest {
            section: "Evolution".to_string(),
            fields: vec![
                FieldManifest::new("mu", "integer", json!(10), (Some(1.0), None), "Number of individuals surviving each generation"),
                FieldManifest::new("lambda", "integer", json!(20), (Some(1.0), None), "Number of offspring generated each generation"),
                FieldManifest::new("max_generation", "integer", json!(100), (Some(0.0), None), "Stop after this many generations"),
                FieldManifest::new("seed", "integer", json!(42), (Some(0.0), None), "Seed of the random source"),
                FieldManifest::new("strength", "float", json!(1.0), (Some(0.0), Some(1.0)), "Mutation strength, from no-op (0) to uniform redraw (1)"),
                FieldManifest::new("tournament_size", "integer", json!(2), (Some(1.0), None), "Individuals competing for each parent slot"),
                FieldManifest::new("lifespan", "integer", json!(null), (Some(1.0), None), "Maximum apparent age before culling"),
                FieldManifest::new("top_n", "integer", json!(0), (Some(0.0), None), "Champions spared by age-based culling"),
                FieldManifest::new("max_attempts_factor", "integer", json!(50), (Some(1.0), None), "Operator calls allowed per requested offspring"),
                FieldManifest::new("operator_selection", "enum", json!("Uniform"), (None, None), "Uniform or Adaptive (bandit) operator choice"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EvolutionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_strength() {
        let config = EvolutionConfig {
            strength: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EvoError::Configuration(_))));
    }

    #[test]
    fn test_rejects_top_n_above_mu() {
        let config = EvolutionConfig {
            mu: 3,
            top_n: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
