//! Model and training configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{LmError, Result};

/// How layers run work over independent batch rows.
///
/// Chosen once at construction and handed to each layer; there is no
/// process-wide switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Serial,
    /// Batch rows on the rayon thread pool.
    Parallel,
}

impl FromStr for Backend {
    type Err = LmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "serial" | "cpu" => Ok(Backend::Serial),
            "parallel" | "rayon" => Ok(Backend::Parallel),
            other => Err(LmError::InvalidConfig(format!("unknown backend `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub wordvec_size: usize,
    pub hidden_size: usize,
    /// Carry LSTM state across forward calls (truncated BPTT).
    pub stateful: bool,
    /// Target id excluded from the loss average.
    pub ignore_label: Option<i32>,
    pub backend: Backend,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            vocab_size: 10_000,
            wordvec_size: 100,
            hidden_size: 100,
            stateful: true,
            ignore_label: None,
            backend: Backend::Serial,
            seed: 0,
        }
    }
}

impl ModelConfig {
    pub fn new(vocab_size: usize, wordvec_size: usize, hidden_size: usize) -> Self {
        ModelConfig { vocab_size, wordvec_size, hidden_size, ..Default::default() }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }

    pub fn with_ignore_label(mut self, ignore_label: Option<i32>) -> Self {
        self.ignore_label = ignore_label;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("vocab_size", self.vocab_size),
            ("wordvec_size", self.wordvec_size),
            ("hidden_size", self.hidden_size),
        ] {
            if v == 0 {
                return Err(LmError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.vocab_size > i32::MAX as usize {
            return Err(LmError::InvalidConfig("vocab_size exceeds i32 id range".into()));
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LmError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ModelConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub time_size: usize,
    /// Joint gradient-norm bound; `None` disables clipping.
    pub max_grad: Option<f32>,
    /// Iterations between perplexity reports; 0 reports once per epoch.
    pub eval_interval: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig { batch_size: 20, time_size: 35, max_grad: Some(0.25), eval_interval: 20 }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.time_size == 0 {
            return Err(LmError::InvalidConfig("batch_size and time_size must be positive".into()));
        }
        if let Some(g) = self.max_grad {
            if !(g > 0.0) {
                return Err(LmError::InvalidConfig(format!("max_grad must be positive, got {g}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ModelConfig::default();
        assert_eq!((c.vocab_size, c.wordvec_size, c.hidden_size), (10_000, 100, 100));
        assert!(c.stateful);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(ModelConfig::new(0, 4, 4).validate().is_err());
        assert!(TrainConfig { time_size: 0, ..Default::default() }.validate().is_err());
        assert!(TrainConfig { max_grad: Some(0.0), ..Default::default() }.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: ModelConfig = serde_json::from_str(r#"{"vocab_size": 50, "backend": "parallel"}"#).unwrap();
        assert_eq!(c.vocab_size, 50);
        assert_eq!(c.hidden_size, 100);
        assert_eq!(c.backend, Backend::Parallel);
    }

    #[test]
    fn backend_parses_from_cli_strings() {
        assert_eq!("Rayon".parse::<Backend>().unwrap(), Backend::Parallel);
        assert!("gpu".parse::<Backend>().is_err());
    }
}
