//! TOML config files for the `packweight` binary.

use packweight_core::WeightConfig;
use std::path::Path;

/// Load config from a TOML file, falling back to defaults.
pub fn load(path: &Path) -> WeightConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match parse(&content) {
            Ok(config) => {
                tracing::info!("Loaded weight config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse {}: {}; using defaults",
                    path.display(),
                    e
                );
                WeightConfig::default()
            }
        },
        Err(_) => {
            tracing::info!("No config at {}; using defaults", path.display());
            WeightConfig::default()
        }
    }
}

/// Parse and sanitize a TOML document.
pub fn parse(content: &str) -> Result<WeightConfig, toml::de::Error> {
    toml::from_str::<WeightConfig>(content).map(WeightConfig::sanitized)
}

/// Render a config as TOML (for generating a default config file).
pub fn to_toml(config: &WeightConfig) -> String {
    toml::to_string_pretty(config).unwrap_or_default()
}
