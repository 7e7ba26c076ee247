use anyhow::{Context, Result};
use cache_coordinator::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub coordinator: CoordinatorConfig,
    /// Items in the demo history source
    pub demo_items: usize,
    /// Pages warmed on each side of the page being read
    pub preload_radius: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            demo_items: 500,
            preload_radius: 1,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {:?}", path))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        config.coordinator.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("cachectl-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "demo_items": 42 }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.demo_items, 42);
        assert_eq!(config.preload_radius, 1);
        assert_eq!(config.coordinator.page_size, 50);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Config::from_file(Path::new("/nonexistent/cachectl.json")).is_err());
    }
}
