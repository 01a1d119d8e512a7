// Pipeline configuration: defaults, TOML file loading, backend order

use crate::consts;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Which detection backend to construct, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    VisionModel,
    CloudText,
    Local,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vision-model" | "vision" => Ok(Self::VisionModel),
            "cloud-text" | "cloud" => Ok(Self::CloudText),
            "local" | "local-ocr" => Ok(Self::Local),
            other => Err(format!(
                "unknown backend '{other}' (expected vision-model, cloud-text or local)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Backends tried in order until one yields enough candidates.
    pub backend_order: Vec<BackendKind>,
    /// Similarity at or above which two candidates merge into one cluster.
    pub merge_threshold: f64,
    /// Candidates one attempt must yield to stop the fallback chain early.
    pub min_sufficient: usize,
    /// Cap on the ranked result list.
    pub max_results: usize,
    pub backend_timeout_secs: u64,
    pub overall_deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend_order: vec![
                BackendKind::VisionModel,
                BackendKind::CloudText,
                BackendKind::Local,
            ],
            merge_threshold: consts::DEFAULT_MERGE_THRESHOLD,
            min_sufficient: consts::DEFAULT_MIN_SUFFICIENT,
            max_results: consts::DEFAULT_MAX_RESULTS,
            backend_timeout_secs: consts::DEFAULT_BACKEND_TIMEOUT_SECS,
            overall_deadline_secs: consts::DEFAULT_OVERALL_DEADLINE_SECS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl PipelineConfig {
    /// Load from a TOML file; keys that are absent keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
