//! The training loop and the public face of a parallel-universe ensemble.

use std::path::{Path, PathBuf};

use paraverse_core::sampling::UniverseSampler;
use paraverse_core::{IdKind, Triple, UniverseId};
use paraverse_kge::evaluation::{RankMetrics, RankingEvaluator};
use paraverse_kge::{EmbeddingSpace, ModelFactory, Trainer};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::aggregate::ScoreAggregator;
use crate::cache::CacheKey;
use crate::checkpoint::{Checkpoint, CheckpointRef};
use crate::config::EnsembleConfig;
use crate::controller::{EarlyStopping, Verdict};
use crate::error::Result;
use crate::eval::{ClassificationReport, EvalMode, EvalState, EvaluationDriver, LabelledTriples};
use crate::factory::{TrainedUniverse, UniverseFactory};
use crate::store::EnsembleStore;

/// Queries and known facts for validation rounds.
#[derive(Debug, Clone, Copy)]
pub struct Validation<'a> {
    pub queries: &'a [Triple],
    /// Filter set for ranking.
    pub evaluator: &'a RankingEvaluator,
}

/// What a call to [`Ensemble::train_universes`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainSummary {
    /// Universes added by this call.
    pub trained: usize,
    pub stopped_early: bool,
    pub best_hit10: f64,
    /// Checkpoints written, oldest first.
    pub checkpoints: Vec<PathBuf>,
}

/// A growing ensemble of frozen universes with its evaluation state.
#[derive(Debug, Clone)]
pub struct Ensemble<M> {
    config: EnsembleConfig,
    store: EnsembleStore<M>,
    eval: EvalState,
    early_stopping: EarlyStopping,
    driver: EvaluationDriver,
}

impl<M> Ensemble<M>
where
    M: EmbeddingSpace + Serialize + DeserializeOwned,
{
    /// An empty ensemble over a vocabulary of `ent_tot` entities and
    /// `rel_tot` relations.
    pub fn new(config: EnsembleConfig, ent_tot: usize, rel_tot: usize) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: EnsembleStore::new(ent_tot, rel_tot),
            eval: EvalState::new(ent_tot),
            early_stopping: EarlyStopping::new(config.patience),
            driver: driver_for(&config),
            config,
        })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn store(&self) -> &EnsembleStore<M> {
        &self.store
    }

    pub fn eval_state(&self) -> &EvalState {
        &self.eval
    }

    pub fn early_stopping(&self) -> &EarlyStopping {
        &self.early_stopping
    }

    pub fn next_universe_id(&self) -> UniverseId {
        self.store.next_universe_id()
    }

    /// Register an already trained universe.
    pub fn add_universe(&mut self, universe: TrainedUniverse<M>) -> Result<UniverseId> {
        self.store.add(universe)
    }

    /// Build and add up to `n` universes.
    ///
    /// With `validation`, every `valid_steps`-th universe triggers a
    /// validation round: an improvement in Hits@10 is checkpointed, and
    /// `patience` rounds without one end the loop. Independently, every
    /// `save_steps`-th universe is checkpointed. Checkpoints are only
    /// written when a checkpoint directory is configured.
    pub fn train_universes<S, F, T>(
        &mut self,
        n: usize,
        factory: &mut UniverseFactory<S, F, T>,
        validation: Option<Validation<'_>>,
        mut on_universe: impl FnMut(UniverseId),
    ) -> Result<TrainSummary>
    where
        S: UniverseSampler,
        F: ModelFactory<Model = M>,
        T: Trainer<M>,
    {
        let mut summary = TrainSummary::default();

        for step in 1..=n {
            let id = self.store.next_universe_id();
            let universe = factory.build(id)?;
            self.store.add(universe)?;
            summary.trained += 1;
            on_universe(id);

            if let Some(v) = validation.filter(|_| is_due(step, self.config.valid_steps)) {
                let deleted = factory.sampler().deleted_triples();
                let hit10 = self.validate(v.queries, v.evaluator, &deleted).hits_at_10;
                match self.early_stopping.observe(hit10) {
                    Verdict::Improved => {
                        tracing::info!(universe = id, hit10, "New best validation Hits@10");
                        summary.checkpoints.extend(self.save_checkpoint()?);
                    }
                    Verdict::NoImprovement => {
                        tracing::info!(
                            universe = id,
                            hit10,
                            best = self.early_stopping.best_hit10,
                            bad_counts = self.early_stopping.bad_counts,
                            "No validation improvement"
                        );
                    }
                    Verdict::Exhausted => {
                        tracing::info!(universe = id, best = self.early_stopping.best_hit10, "Early stopping");
                        summary.stopped_early = true;
                        break;
                    }
                }
            }

            if is_due(step, self.config.save_steps) {
                summary.checkpoints.extend(self.save_checkpoint()?);
            }
        }

        summary.best_hit10 = self.early_stopping.best_hit10;
        Ok(summary)
    }

    /// A validation pass; updates the cache but not early stopping.
    pub fn validate(
        &mut self,
        queries: &[Triple],
        evaluator: &RankingEvaluator,
        deleted: &[Triple],
    ) -> RankMetrics {
        self.driver
            .link_prediction(EvalMode::Valid, queries, evaluator, &self.store, &mut self.eval, deleted)
    }

    /// Filtered link prediction on test queries.
    pub fn link_prediction(
        &mut self,
        queries: &[Triple],
        evaluator: &RankingEvaluator,
        deleted: &[Triple],
    ) -> RankMetrics {
        self.driver
            .link_prediction(EvalMode::Test, queries, evaluator, &self.store, &mut self.eval, deleted)
    }

    pub fn triple_classification(
        &self,
        valid: &LabelledTriples,
        test: &LabelledTriples,
        deleted: &[Triple],
    ) -> Option<ClassificationReport> {
        self.driver
            .triple_classification(valid, test, &self.store, deleted)
    }

    /// Energy of one fully-bound triple over the active universes.
    pub fn predict_triple(&self, triple: &Triple, deleted: &[Triple]) -> f32 {
        let active = self.driver.active_set(&self.store, deleted);
        self.driver
            .aggregator()
            .predict_triple(&self.store, triple, &active)
    }

    /// Energies of every candidate for a partially-bound query, folding in
    /// any universe not yet cached.
    pub fn score_batch(&mut self, key: CacheKey, deleted: &[Triple]) -> Vec<f32> {
        let active = self.driver.active_set(&self.store, deleted);
        self.driver
            .aggregator()
            .score_batch(&self.store, &mut self.eval.cache, key, active)
    }

    /// Share of the vocabulary no universe has embedded.
    pub fn unembedded_ratio(&self, kind: IdKind) -> f64 {
        self.store.membership().unembedded_ratio(kind)
    }

    /// Append every universe of `other`. Its caches are dropped; merged
    /// universes are folded in by the next evaluation pass.
    pub fn merge(&mut self, other: Ensemble<M>) -> Result<()> {
        self.store.merge(other.store)
    }

    /// Write a checkpoint into `dir`.
    pub fn checkpoint_save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        self.checkpoint_ref()
            .write_to_dir(dir, &self.config.training_identifier)
    }

    /// Resume from a checkpoint.
    ///
    /// The checkpoint's ranges, model settings and universe count replace
    /// those of `config`; everything else in `config` applies.
    pub fn checkpoint_load(path: impl AsRef<Path>, mut config: EnsembleConfig) -> Result<Self> {
        let ckpt: Checkpoint<M> = Checkpoint::read(path)?;
        config.ranges = ckpt.ranges;
        config.initial_num_universes = ckpt.initial_num_universes;
        if let Some(model) = ckpt.model_config {
            config.model = model;
        }
        config.validate()?;

        let mut early_stopping = ckpt.early_stopping;
        early_stopping.patience = config.patience;
        let eval = ckpt
            .eval
            .unwrap_or_else(|| EvalState::new(ckpt.store.num_entities()));
        Ok(Self {
            store: ckpt.store,
            eval,
            early_stopping,
            driver: driver_for(&config),
            config,
        })
    }

    fn checkpoint_ref(&self) -> CheckpointRef<'_, M> {
        CheckpointRef {
            initial_num_universes: self.config.initial_num_universes,
            model: self.store.space(0).map_or("empty", |space| space.name()),
            model_config: &self.config.model,
            store: &self.store,
            ranges: &self.config.ranges,
            early_stopping: &self.early_stopping,
            eval: Some(&self.eval),
        }
    }

    fn save_checkpoint(&self) -> Result<Option<PathBuf>> {
        match &self.config.checkpoint_dir {
            Some(dir) => self.checkpoint_save(dir).map(Some),
            None => Ok(None),
        }
    }
}

fn driver_for(config: &EnsembleConfig) -> EvaluationDriver {
    EvaluationDriver::new(
        config.setting(),
        ScoreAggregator::new(config.missing_embedding_handling),
    )
}

fn is_due(step: usize, every: usize) -> bool {
    every > 0 && step % every == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::HyperparameterRanges;
    use paraverse_core::sampling::BalancedSampler;
    use paraverse_core::KnowledgeGraph;
    use paraverse_kge::TransE;

    fn chain(n: u32) -> Vec<Triple> {
        (0..n).map(|i| Triple::new(i, i % 2, (i + 1) % n)).collect()
    }

    fn config(dir: Option<PathBuf>) -> EnsembleConfig {
        EnsembleConfig::default()
            .with_ranges(HyperparameterRanges {
                min_triples: 4,
                max_triples: 8,
                const_num_epochs: Some(5),
                ..Default::default()
            })
            .with_model(crate::config::ModelConfig {
                dim: 8,
                ..Default::default()
            })
            .with_checkpoint_dir(dir)
            .with_steps(2, 3)
    }

    #[test]
    fn test_is_due() {
        assert!(is_due(5, 5));
        assert!(!is_due(4, 5));
        assert!(!is_due(5, 0));
    }

    #[test]
    fn test_train_without_validation_saves_every_save_steps() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(Some(dir.path().to_path_buf())).with_training_identifier("unit");
        let kg = KnowledgeGraph::from_triples(12, 2, chain(12)).unwrap();
        let mut factory = cfg.universe_factory(BalancedSampler::new(kg)).unwrap();
        let mut ensemble: Ensemble<TransE> = Ensemble::new(cfg, 12, 2).unwrap();

        let mut seen = Vec::new();
        let summary = ensemble
            .train_universes(7, &mut factory, None, |id| seen.push(id))
            .unwrap();

        assert_eq!(summary.trained, 7);
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
        assert!(!summary.stopped_early);
        assert_eq!(summary.checkpoints.len(), 2);
        assert!(summary.checkpoints[1].ends_with("pu_TransE_learned_spaces-6_unit.json"));
        assert!(summary.checkpoints.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(None);
        let kg = KnowledgeGraph::from_triples(12, 2, chain(12)).unwrap();
        let mut factory = cfg.universe_factory(BalancedSampler::new(kg)).unwrap();
        let mut ensemble: Ensemble<TransE> = Ensemble::new(cfg.clone(), 12, 2).unwrap();
        ensemble.train_universes(3, &mut factory, None, |_| {}).unwrap();
        ensemble.validate(&chain(12)[..4], &RankingEvaluator::new(), &[]);

        let path = ensemble.checkpoint_save(dir.path()).unwrap();
        let loaded: Ensemble<TransE> = Ensemble::checkpoint_load(&path, cfg).unwrap();
        assert_eq!(loaded.store(), ensemble.store());
        assert_eq!(loaded.eval_state(), ensemble.eval_state());
        assert_eq!(loaded.early_stopping(), ensemble.early_stopping());
    }
}
