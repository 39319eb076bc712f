use super::{evolution::EvolutionConfig, selector::SelectorConfig, traits::ConfigSection};
use crate::error::EvoError;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix of environment variables overriding file settings,
/// e.g. `GRAMMAREVO_EVOLUTION__MU=30`.
pub const ENV_PREFIX: &str = "GRAMMAREVO";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub evolution: EvolutionConfig,
    pub selector: SelectorConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), EvoError> {
        self.evolution.validate()?;
        self.selector.validate()?;
        Ok(())
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, EvoError> {
        let config: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Load a TOML file layered over the defaults, then apply `GRAMMAREVO_*`
    /// environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvoError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EvoError::Configuration(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let config: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        *self.write_lock()? = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvoError> {
        let config = self.get()?;
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| EvoError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn get(&self) -> Result<AppConfig, EvoError> {
        self.config
            .read()
            .map(|config| config.clone())
            .map_err(|_| EvoError::Configuration("Config lock poisoned".to_string()))
    }

    /// Apply `f` and keep the result only if it validates.
    pub fn update<F>(&self, f: F) -> Result<(), EvoError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.write_lock()?;
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }

    /// JSON description of every tunable field, grouped by section.
    pub fn manifest_json(&self) -> Result<String, EvoError> {
        let config = self.get()?;
        let manifests = vec![config.evolution.to_manifest(), config.selector.to_manifest()];
        Ok(serde_json::to_string_pretty(&manifests)?)
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, AppConfig>, EvoError> {
        self.config
            .write()
            .map_err(|_| EvoError::Configuration("Config lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorSelection;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [evolution]
            mu = 30
            operator_selection = "Adaptive"
            "#,
        )
        .unwrap();
        assert_eq!(config.evolution.mu, 30);
        assert_eq!(config.evolution.lambda, 20);
        assert_eq!(config.evolution.operator_selection, OperatorSelection::Adaptive);
        assert_eq!(config.selector.reset_divisor, 4);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");

        let manager = ConfigManager::new();
        manager
            .update(|c| {
                c.evolution.lambda = 7;
                c.selector.success_reward = 0.9;
            })
            .unwrap();
        manager.save_to_file(&path).unwrap();

        let reloaded = ConfigManager::new();
        reloaded.load_from_file(&path).unwrap();
        let config = reloaded.get().unwrap();
        assert_eq!(config.evolution.lambda, 7);
        assert!((config.selector.success_reward - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let manager = ConfigManager::new();
        assert!(manager.update(|c| c.evolution.mu = 0).is_err());
        assert_eq!(manager.get().unwrap().evolution.mu, 10);
    }

    #[test]
    fn test_manifest_lists_sections() {
        let json = ConfigManager::new().manifest_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["section"], "Evolution");
        assert_eq!(value[1]["section"], "Selector");
        assert!(json.contains("reset_divisor"));
    }

    #[test]
    fn test_missing_file() {
        let manager = ConfigManager::new();
        assert!(matches!(
            manager.load_from_file("/nonexistent/grammarevo.toml"),
            Err(EvoError::Configuration(_))
        ));
    }
}
