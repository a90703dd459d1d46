//! Ensemble configuration, loadable from JSON.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "initial_num_universes": 200, "training_setting": "incremental",
//!   "incremental_strategy": "deprecate", "model": { "dim": 100 } }
//! ```

use std::path::{Path, PathBuf};

use paraverse_core::sampling::UniverseSampler;
use paraverse_kge::{MarginTrainer, TrainingConfig, TransEFactory};
use serde::{Deserialize, Serialize};

use crate::aggregate::MissingEmbeddingHandling;
use crate::error::{Error, Result};
use crate::eval::{IncrementalStrategy, TrainingSetting};
use crate::factory::{HyperparameterRanges, UniverseFactory};

/// Whether the training data is fixed or changes between evaluations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    #[default]
    Static,
    Incremental,
}

/// Per-universe model and trainer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Embedding dimension.
    pub dim: usize,
    /// 1 for L1 energies, 2 for L2.
    pub p_norm: u32,
    pub batch_size: usize,
    pub negative_samples: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dim: 50,
            p_norm: 1,
            batch_size: 100,
            negative_samples: 1,
        }
    }
}

impl ModelConfig {
    pub fn factory(&self) -> Result<TransEFactory> {
        TransEFactory::with_p_norm(self.dim, self.p_norm).map_err(Error::Training)
    }

    pub fn training(&self) -> TrainingConfig {
        TrainingConfig::default()
            .with_batch_size(self.batch_size)
            .with_negative_samples(self.negative_samples)
    }
}

/// Settings of one ensemble run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Universes to generate unless early stopping halts first.
    pub initial_num_universes: usize,
    pub ranges: HyperparameterRanges,
    pub missing_embedding_handling: MissingEmbeddingHandling,
    /// Checkpoint every this many universes (0 disables).
    pub save_steps: usize,
    /// Where checkpoints go; `None` disables checkpointing.
    pub checkpoint_dir: Option<PathBuf>,
    /// Validate every this many universes (0 disables).
    pub valid_steps: usize,
    pub training_setting: TrainingMode,
    pub incremental_strategy: IncrementalStrategy,
    /// Suffix of checkpoint file names.
    pub training_identifier: String,
    /// Seed of universe 0; universe `u` uses `seed + u`.
    pub seed: u64,
    /// Validation rounds without improvement before stopping.
    pub patience: usize,
    pub model: ModelConfig,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            initial_num_universes: 5000,
            ranges: HyperparameterRanges::default(),
            missing_embedding_handling: MissingEmbeddingHandling::default(),
            save_steps: 5,
            checkpoint_dir: Some(PathBuf::from("./checkpoint/")),
            valid_steps: 5,
            training_setting: TrainingMode::default(),
            incremental_strategy: IncrementalStrategy::default(),
            training_identifier: String::new(),
            seed: 42,
            patience: 10,
            model: ModelConfig::default(),
        }
    }
}

impl EnsembleConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ranges.validate()?;
        if self.patience == 0 {
            return Err(Error::InvalidConfig("patience must be positive".into()));
        }
        if self.model.dim == 0 {
            return Err(Error::InvalidConfig("model.dim must be positive".into()));
        }
        if !matches!(self.model.p_norm, 1 | 2) {
            return Err(Error::InvalidConfig(format!(
                "model.p_norm must be 1 or 2, got {}",
                self.model.p_norm
            )));
        }
        Ok(())
    }

    /// A TransE universe factory over `sampler`, seeded from these settings.
    pub fn universe_factory<S: UniverseSampler>(
        &self,
        sampler: S,
    ) -> Result<UniverseFactory<S, TransEFactory, MarginTrainer>> {
        UniverseFactory::new(
            sampler,
            self.model.factory()?,
            MarginTrainer::new(self.model.training()),
            self.ranges.clone(),
            self.seed,
        )
    }

    /// The evaluation regime these settings describe.
    pub fn setting(&self) -> TrainingSetting {
        match self.training_setting {
            TrainingMode::Static => TrainingSetting::Static,
            TrainingMode::Incremental => TrainingSetting::Incremental(self.incremental_strategy),
        }
    }

    pub fn with_initial_num_universes(mut self, n: usize) -> Self {
        self.initial_num_universes = n;
        self
    }

    pub fn with_ranges(mut self, ranges: HyperparameterRanges) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn with_missing_embedding_handling(mut self, handling: MissingEmbeddingHandling) -> Self {
        self.missing_embedding_handling = handling;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.checkpoint_dir = dir;
        self
    }

    pub fn with_steps(mut self, valid_steps: usize, save_steps: usize) -> Self {
        self.valid_steps = valid_steps;
        self.save_steps = save_steps;
        self
    }

    pub fn with_setting(mut self, setting: TrainingSetting) -> Self {
        match setting {
            TrainingSetting::Static => self.training_setting = TrainingMode::Static,
            TrainingSetting::Incremental(strategy) => {
                self.training_setting = TrainingMode::Incremental;
                self.incremental_strategy = strategy;
            }
        }
        self
    }

    pub fn with_training_identifier(mut self, id: impl Into<String>) -> Self {
        self.training_identifier = id.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EnsembleConfig::default();
        assert_eq!(c.initial_num_universes, 5000);
        assert_eq!(c.save_steps, 5);
        assert_eq!(c.valid_steps, 5);
        assert_eq!(c.seed, 42);
        assert_eq!(c.patience, 10);
        assert_eq!(c.setting(), TrainingSetting::Static);
        assert_eq!(c.missing_embedding_handling, MissingEmbeddingHandling::LastRank);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c: EnsembleConfig = serde_json::from_str(
            r#"{"training_setting":"incremental","incremental_strategy":"deprecate",
                "missing_embedding_handling":"null_vector","model":{"dim":8}}"#,
        )
        .unwrap();
        assert_eq!(
            c.setting(),
            TrainingSetting::Incremental(IncrementalStrategy::Deprecate)
        );
        assert_eq!(c.missing_embedding_handling, MissingEmbeddingHandling::NullVector);
        assert_eq!(c.model.dim, 8);
        assert_eq!(c.model.batch_size, 100);
        assert_eq!(c.initial_num_universes, 5000);
    }

    #[test]
    fn test_from_json_file_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"model":{"p_norm":3}}"#).unwrap();
        assert!(matches!(
            EnsembleConfig::from_json_file(&path),
            Err(Error::InvalidConfig(_))
        ));
        std::fs::write(&path, r#"{"ranges":{"min_margin":5,"max_margin":2}}"#).unwrap();
        assert!(EnsembleConfig::from_json_file(&path).is_err());
    }

    #[test]
    fn test_with_setting_roundtrip() {
        let setting = TrainingSetting::Incremental(IncrementalStrategy::Normal);
        assert_eq!(EnsembleConfig::default().with_setting(setting).setting(), setting);
    }
}
