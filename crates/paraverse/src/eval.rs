//! Evaluation passes over the ensemble.
//!
//! A pass first decides which universes to visit, folds them into the score
//! cache for every query of the split, and only then reads estimates.
//!
//! - **Static**: the cache is kept across passes. Each mode (test/valid)
//!   has a watermark; a pass visits only universes added since the last
//!   pass of that mode, then moves the watermark to `next_universe_id`.
//! - **Incremental**: training data changes between passes, so the cache is
//!   cleared and every universe is revisited. With the `Deprecate` strategy,
//!   universes containing a since-deleted triple are skipped.

use std::collections::BTreeSet;

use paraverse_core::{Triple, UniverseId};
use paraverse_kge::classification::{self, Threshold};
use paraverse_kge::evaluation::{RankMetrics, RankingEvaluator};
use paraverse_kge::{Direction, EmbeddingSpace};
use serde::{Deserialize, Serialize};

use crate::aggregate::ScoreAggregator;
use crate::cache::{CacheKey, ScoreCache};
use crate::membership::MembershipIndex;
use crate::store::EnsembleStore;

/// How incremental passes treat universes touched by deletions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementalStrategy {
    /// Keep every universe.
    #[default]
    Normal,
    /// Skip universes that contain a deleted triple.
    Deprecate,
}

/// Whether training data is fixed or streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrainingSetting {
    #[default]
    Static,
    Incremental(IncrementalStrategy),
}

/// Which split a pass serves; each has its own watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalMode {
    Test,
    Valid,
}

impl std::fmt::Display for EvalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Test => f.write_str("test"),
            Self::Valid => f.write_str("valid"),
        }
    }
}

/// Universes already folded into the cache, per mode (static setting).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermarks {
    pub tested: UniverseId,
    pub validated: UniverseId,
}

impl Watermarks {
    pub fn get(&self, mode: EvalMode) -> UniverseId {
        match mode {
            EvalMode::Test => self.tested,
            EvalMode::Valid => self.validated,
        }
    }

    fn set(&mut self, mode: EvalMode, value: UniverseId) {
        match mode {
            EvalMode::Test => self.tested = value,
            EvalMode::Valid => self.validated = value,
        }
    }
}

/// Evaluation state that survives checkpoints.
///
/// The cache is shared by test and valid passes: folding is a min, so the
/// extra entries of one split never change the estimates of the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalState {
    pub cache: ScoreCache,
    #[serde(default)]
    pub watermarks: Watermarks,
}

impl EvalState {
    pub fn new(num_entities: usize) -> Self {
        Self {
            cache: ScoreCache::new(num_entities),
            watermarks: Watermarks::default(),
        }
    }
}

/// Universes containing at least one deleted triple.
///
/// `deleted` is in global ids.
pub fn deprecated_universes(deleted: &[Triple], membership: &MembershipIndex) -> BTreeSet<UniverseId> {
    deleted
        .iter()
        .flat_map(|t| membership.intersect(t.head, t.relation, Some(t.tail)))
        .collect()
}

/// Result of triple classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationReport {
    /// Threshold fit on the validation triples.
    pub threshold: Threshold,
    /// Accuracy of that threshold on the test triples.
    pub test_accuracy: f64,
}

/// Positive triples with their corrupted negatives.
#[derive(Debug, Clone, Default)]
pub struct LabelledTriples {
    pub positive: Vec<Triple>,
    pub negative: Vec<Triple>,
}

/// Runs evaluation passes under one setting and aggregation policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationDriver {
    setting: TrainingSetting,
    aggregator: ScoreAggregator,
}

impl EvaluationDriver {
    pub fn new(setting: TrainingSetting, aggregator: ScoreAggregator) -> Self {
        Self {
            setting,
            aggregator,
        }
    }

    pub fn setting(&self) -> TrainingSetting {
        self.setting
    }

    pub fn aggregator(&self) -> &ScoreAggregator {
        &self.aggregator
    }

    /// Universes a pass of `mode` should fold.
    ///
    /// Incremental passes clear the cache here.
    pub fn prepare_pass<M: EmbeddingSpace>(
        &self,
        mode: EvalMode,
        store: &EnsembleStore<M>,
        state: &mut EvalState,
        deleted: &[Triple],
    ) -> Vec<UniverseId> {
        let next = store.next_universe_id();
        match self.setting {
            TrainingSetting::Static => {
                store.active_universes(state.watermarks.get(mode)..next, &BTreeSet::new())
            }
            TrainingSetting::Incremental(strategy) => {
                state.cache.clear();
                let deprecated = match strategy {
                    IncrementalStrategy::Normal => BTreeSet::new(),
                    IncrementalStrategy::Deprecate => {
                        deprecated_universes(deleted, store.membership())
                    }
                };
                if !deprecated.is_empty() {
                    tracing::info!(deprecated = deprecated.len(), "Deprecated universes");
                }
                store.active_universes(0..next, &deprecated)
            }
        }
    }

    /// Universes a fully-bound prediction may use.
    pub fn active_set<M: EmbeddingSpace>(
        &self,
        store: &EnsembleStore<M>,
        deleted: &[Triple],
    ) -> BTreeSet<UniverseId> {
        let deprecated = match self.setting {
            TrainingSetting::Incremental(IncrementalStrategy::Deprecate) => {
                deprecated_universes(deleted, store.membership())
            }
            _ => BTreeSet::new(),
        };
        store
            .active_universes(0..store.next_universe_id(), &deprecated)
            .into_iter()
            .collect()
    }

    /// Fold every visited universe into the cache for both sides of every
    /// query. Returns the number of folds.
    pub fn populate<M: EmbeddingSpace>(
        &self,
        mode: EvalMode,
        queries: &[Triple],
        store: &EnsembleStore<M>,
        state: &mut EvalState,
        deleted: &[Triple],
    ) -> usize {
        let universes = self.prepare_pass(mode, store, state, deleted);
        let membership = store.membership();

        let mut folds = 0;
        for q in queries {
            for &u in &universes {
                if membership.covers(u, q.head, q.relation) {
                    let key = CacheKey::tails_of(q.head, q.relation);
                    folds += self.aggregator.fold_universe(store, &mut state.cache, key, u) as usize;
                }
                if membership.covers(u, q.tail, q.relation) {
                    let key = CacheKey::heads_of(q.tail, q.relation);
                    folds += self.aggregator.fold_universe(store, &mut state.cache, key, u) as usize;
                }
            }
        }

        if self.setting == TrainingSetting::Static {
            state.watermarks.set(mode, store.next_universe_id());
        }
        tracing::debug!(
            %mode,
            universes = universes.len(),
            queries = queries.len(),
            folds,
            "Populated score cache"
        );
        folds
    }

    /// Filtered link prediction over `queries`.
    pub fn link_prediction<M: EmbeddingSpace>(
        &self,
        mode: EvalMode,
        queries: &[Triple],
        evaluator: &RankingEvaluator,
        store: &EnsembleStore<M>,
        state: &mut EvalState,
        deleted: &[Triple],
    ) -> RankMetrics {
        self.populate(mode, queries, store, state, deleted);

        let cache = &state.cache;
        let ranks = evaluator.rank_all(queries, |q, direction| {
            let key = match direction {
                Direction::HeadBatch => CacheKey::heads_of(q.tail, q.relation),
                Direction::TailBatch => CacheKey::tails_of(q.head, q.relation),
            };
            self.aggregator.estimate_all(cache, &key)
        });
        let metrics = RankMetrics::from_ranks(&ranks);
        tracing::info!(%mode, summary = %metrics.summary(), "Link prediction");
        metrics
    }

    /// Fit a threshold on `valid`, report accuracy on `test`.
    ///
    /// `None` when the validation set is empty.
    pub fn triple_classification<M: EmbeddingSpace>(
        &self,
        valid: &LabelledTriples,
        test: &LabelledTriples,
        store: &EnsembleStore<M>,
        deleted: &[Triple],
    ) -> Option<ClassificationReport> {
        let active = self.active_set(store, deleted);
        let energies = |triples: &[Triple]| -> Vec<f32> {
            triples
                .iter()
                .map(|t| self.aggregator.predict_triple(store, t, &active))
                .collect()
        };

        let threshold = classification::best_threshold(
            &energies(&valid.positive),
            &energies(&valid.negative),
        )?;
        let test_accuracy = classification::accuracy(
            threshold.threshold,
            &energies(&test.positive),
            &energies(&test.negative),
        );
        tracing::info!(
            threshold = threshold.threshold,
            valid_accuracy = threshold.accuracy,
            test_accuracy,
            "Triple classification"
        );
        Some(ClassificationReport {
            threshold,
            test_accuracy,
        })
    }
}
