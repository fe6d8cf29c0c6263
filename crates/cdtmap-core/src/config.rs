use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CdtMapError, Result};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3:8b";
pub const DEFAULT_RESULTS_FILE: &str = "test_results.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdtMapConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub sampling: SamplingOptions,
    #[serde(default)]
    pub harness: HarnessConfig,
    #[serde(default)]
    pub results: ResultsConfig,
}

impl CdtMapConfig {
    /// Read a JSON config file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CdtMapConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Overlay `OLLAMA_HOST`, `CDTMAP_MODEL` and `CDTMAP_RESULTS` when set.
    pub fn apply_env(mut self) -> Self {
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.ollama.host = host;
        }
        if let Ok(model) = std::env::var("CDTMAP_MODEL") {
            self.ollama.model = model;
        }
        if let Ok(path) = std::env::var("CDTMAP_RESULTS") {
            self.results.path = PathBuf::from(path);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.harness.runs_per_test == 0 {
            return Err(CdtMapError::Config("runs_per_test must be at least 1".into()));
        }
        if self.harness.max_workers == 0 {
            return Err(CdtMapError::Config("max_workers must be at least 1".into()));
        }
        if self.ollama.timeout_secs == 0 {
            return Err(CdtMapError::Config("timeout_secs must be at least 1".into()));
        }
        if self.ollama.model.trim().is_empty() {
            return Err(CdtMapError::Config("model must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Ask the endpoint to constrain output to JSON.
    #[serde(default)]
    pub json_mode: bool,
}

impl OllamaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 30,
            json_mode: false,
        }
    }
}

/// Sampling parameters tuned for repeatable answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub seed: i64,
    #[serde(default)]
    pub num_predict: Option<u32>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            seed: 42,
            num_predict: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub runs_per_test: u32,
    pub max_workers: usize,
    #[serde(default)]
    pub warmup_runs: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            runs_per_test: 3,
            max_workers: 12,
            warmup_runs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsConfig {
    pub path: PathBuf,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_RESULTS_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CdtMapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ollama.model, "llama3:8b");
        assert_eq!(config.harness.runs_per_test, 3);
        assert_eq!(config.sampling.temperature, 0.0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: CdtMapConfig =
            serde_json::from_str(r#"{"ollama": {"host": "http://gpu:11434", "model": "phi:latest", "timeout_secs": 10}}"#)
                .unwrap();
        assert_eq!(config.ollama.model, "phi:latest");
        assert!(!config.ollama.json_mode);
        assert_eq!(config.harness.max_workers, 12);
        assert_eq!(config.results.path, PathBuf::from("test_results.json"));
    }

    #[test]
    fn test_zero_runs_rejected() {
        let mut config = CdtMapConfig::default();
        config.harness.runs_per_test = 0;
        assert!(matches!(config.validate(), Err(CdtMapError::Config(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = CdtMapConfig::default();
        config.harness.max_workers = 0;
        assert!(config.validate().is_err());
    }
}
