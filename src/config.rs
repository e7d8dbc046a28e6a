//! Runtime configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial (or
//! empty) file is valid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyzer::{FftOrder, PathBuilder, DEFAULT_FLOOR_DB, DEFAULT_PATH_STRIDE};

/// Highest accepted render refresh rate.
const MAX_REFRESH_HZ: f32 = 240.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported fft size {0} (expected 2048, 4096 or 8192)")]
    InvalidFftSize(usize),
    #[error("refresh rate {0} Hz out of range (0, 240]")]
    InvalidRefreshRate(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    pub refresh_hz: f32,
    pub floor_db: f32,
    pub path_stride: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: FftOrder::default().size(),
            refresh_hz: 60.0,
            floor_db: DEFAULT_FLOOR_DB,
            path_stride: DEFAULT_PATH_STRIDE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest block the processor is prepared for.
    pub block_size: usize,
    pub noise_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            noise_seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqConfig {
    pub analyzer: AnalyzerConfig,
    pub engine: EngineConfig,
}

impl EqConfig {
    /// Reads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: EqConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fft_order()?;
        let hz = self.analyzer.refresh_hz;
        if !(hz > 0.0 && hz <= MAX_REFRESH_HZ) {
            return Err(ConfigError::InvalidRefreshRate(hz));
        }
        Ok(())
    }

    pub fn fft_order(&self) -> Result<FftOrder, ConfigError> {
        FftOrder::from_size(self.analyzer.fft_size)
            .ok_or(ConfigError::InvalidFftSize(self.analyzer.fft_size))
    }

    pub fn path_builder(&self) -> PathBuilder {
        PathBuilder::new(self.analyzer.path_stride.max(1), self.analyzer.floor_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = EqConfig::from_json("{}").expect("empty config");
        assert_eq!(config, EqConfig::default());
        assert_eq!(config.analyzer.fft_size, 2048);
        assert_eq!(config.engine.block_size, 512);
        assert_eq!(config.fft_order().expect("order"), FftOrder::Order2048);
    }

    #[test]
    fn test_partial_sections_fill_in() {
        let config = EqConfig::from_json(r#"{"analyzer":{"fft_size":8192}}"#).expect("config");
        assert_eq!(config.fft_order().expect("order"), FftOrder::Order8192);
        assert_eq!(config.analyzer.refresh_hz, 60.0);
        assert_eq!(config.path_builder().stride(), 2);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EqConfig::from_json(r#"{"analyzer":{"fft_size":1000}}"#),
            Err(ConfigError::InvalidFftSize(1000))
        ));
        assert!(matches!(
            EqConfig::from_json(r#"{"analyzer":{"refresh_hz":0}}"#),
            Err(ConfigError::InvalidRefreshRate(_))
        ));
        assert!(matches!(
            EqConfig::from_json(r#"{"analyzer":{"refresh_hz":500}}"#),
            Err(ConfigError::InvalidRefreshRate(_))
        ));
        assert!(matches!(EqConfig::from_json("[1,"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("stereo_eq_no_such_config.json");
        assert!(matches!(EqConfig::load(&path), Err(ConfigError::Io(_))));
    }
}
