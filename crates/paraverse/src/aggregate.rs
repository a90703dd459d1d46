//! Combining per-universe energies into one global estimate.
//!
//! Every universe only knows its own entities. For a query `(h, r, ?)` the
//! ensemble asks each universe that contains both `h` and `r` for the
//! energies of all *its* entities and keeps, per global candidate, the
//! smallest energy seen ("min-fold"). Min is idempotent and commutative, so
//! refolding a universe or folding in any order gives the same cache.
//!
//! Candidates that no folded universe contains stay at `+inf`. What happens
//! to them depends on [`MissingEmbeddingHandling`]:
//!
//! | Policy | Unscored candidate gets |
//! |--------|--------------------------|
//! | `LastRank` | `+inf`, ranked behind everything |
//! | `NullVector` | the best energy any folded universe gives with a zero vector on the open side |
//!
//! A fully-bound triple `(h, r, t)` is scored exactly as candidate `t` of
//! the tail query `(h, r, ?)`: the minimum over universes containing `h`,
//! `r` and `t`, falling back like any other candidate.

use std::collections::BTreeSet;

use paraverse_core::{EntityId, Triple, UniverseId};
use paraverse_kge::{Direction, EmbeddingSpace};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, ScoreCache};
use crate::store::EnsembleStore;

/// What an unscored candidate is worth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingEmbeddingHandling {
    /// Leave it at `+inf`.
    #[default]
    LastRank,
    /// Use the best null-vector energy of the query.
    NullVector,
}

/// Min-fold aggregation under a missing-embedding policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreAggregator {
    handling: MissingEmbeddingHandling,
}

impl ScoreAggregator {
    pub fn new(handling: MissingEmbeddingHandling) -> Self {
        Self { handling }
    }

    pub fn handling(&self) -> MissingEmbeddingHandling {
        self.handling
    }

    /// Fold one universe's batch energies for `key` into the cache.
    ///
    /// Returns `false` (and leaves the cache alone) when the universe lacks
    /// the fixed entity or the relation.
    pub fn fold_universe<M: EmbeddingSpace>(
        &self,
        store: &EnsembleStore<M>,
        cache: &mut ScoreCache,
        key: CacheKey,
        universe: UniverseId,
    ) -> bool {
        let remap = store.remapper();
        let (Some(space), Some(entity), Some(relation)) = (
            store.space(universe),
            remap.to_local_entity(universe, key.entity),
            remap.to_local_relation(universe, key.relation),
        ) else {
            return false;
        };

        let batch = space.predict_batch(entity, relation, key.direction);
        let entry = cache.entry(key);
        for (global, local) in remap.entities(universe) {
            if let Some(&energy) = batch.get(local as usize) {
                entry.fold(global, energy);
            }
        }
        if self.handling == MissingEmbeddingHandling::NullVector {
            entry.fold_null(space.score_null(entity, relation, key.direction));
        }

        tracing::trace!(
            universe,
            entity = key.entity,
            relation = key.relation,
            direction = %key.direction,
            "folded universe"
        );
        true
    }

    /// Global estimates of `key` for the given candidates.
    ///
    /// Queries that were never folded read as all unscored.
    pub fn estimate(&self, cache: &ScoreCache, key: &CacheKey, candidates: &[EntityId]) -> Vec<f32> {
        let Some(entry) = cache.get(key) else {
            return vec![f32::INFINITY; candidates.len()];
        };
        let fallback = self.fallback(entry.null_fallback());
        candidates
            .iter()
            .map(|&c| {
                let s = entry.get(c);
                if s == f32::INFINITY {
                    fallback
                } else {
                    s
                }
            })
            .collect()
    }

    /// Global estimates of `key` for every entity of the vocabulary.
    pub fn estimate_all(&self, cache: &ScoreCache, key: &CacheKey) -> Vec<f32> {
        let Some(entry) = cache.get(key) else {
            return vec![f32::INFINITY; cache.num_entities()];
        };
        let fallback = self.fallback(entry.null_fallback());
        entry
            .scores()
            .iter()
            .map(|&s| if s == f32::INFINITY { fallback } else { s })
            .collect()
    }

    /// Fold every relevant universe among `universes`, then estimate all
    /// candidates.
    pub fn score_batch<M: EmbeddingSpace>(
        &self,
        store: &EnsembleStore<M>,
        cache: &mut ScoreCache,
        key: CacheKey,
        universes: impl IntoIterator<Item = UniverseId>,
    ) -> Vec<f32> {
        let covering = store.covering(key.entity, key.relation);
        for universe in universes {
            if covering.contains(&universe) {
                self.fold_universe(store, cache, key, universe);
            }
        }
        self.estimate_all(cache, &key)
    }

    /// Energy of a fully-bound triple over the `active` universes.
    ///
    /// `+inf` when no active universe holds `h` and `r` (or, under
    /// `LastRank`, none holds all three).
    pub fn predict_triple<M: EmbeddingSpace>(
        &self,
        store: &EnsembleStore<M>,
        triple: &Triple,
        active: &BTreeSet<UniverseId>,
    ) -> f32 {
        let remap = store.remapper();
        let membership = store.membership();
        let Triple {
            head,
            relation,
            tail,
        } = *triple;

        let mut best = f32::INFINITY;
        for u in membership.intersect(head, relation, Some(tail)) {
            if !active.contains(&u) {
                continue;
            }
            if let (Some(space), Some(h), Some(r), Some(t)) = (
                store.space(u),
                remap.to_local_entity(u, head),
                remap.to_local_relation(u, relation),
                remap.to_local_entity(u, tail),
            ) {
                best = best.min(space.score(h, r, t));
            }
        }
        if best < f32::INFINITY || self.handling == MissingEmbeddingHandling::LastRank {
            return best;
        }

        let mut null = f32::INFINITY;
        for u in membership.intersect(head, relation, None) {
            if !active.contains(&u) {
                continue;
            }
            if let (Some(space), Some(h), Some(r)) = (
                store.space(u),
                remap.to_local_entity(u, head),
                remap.to_local_relation(u, relation),
            ) {
                null = null.min(space.score_null(h, r, Direction::TailBatch));
            }
        }
        null
    }

    fn fallback(&self, null: f32) -> f32 {
        match self.handling {
            MissingEmbeddingHandling::LastRank => f32::INFINITY,
            MissingEmbeddingHandling::NullVector => null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{TrainedUniverse, UniverseParams};
    use ndarray::Array2;
    use paraverse_core::sampling::Subgraph;
    use paraverse_kge::{Norm, TransE};

    /// One-dimensional L1 TransE: E(h, r, t) = |h + r - t|.
    fn line_universe(global: &[Triple], entity_pos: &[f32], relation_pos: &[f32]) -> TrainedUniverse<TransE> {
        let subgraph = Subgraph::from_global(global);
        assert_eq!(subgraph.num_entities(), entity_pos.len());
        let col = |xs: &[f32]| Array2::from_shape_vec((xs.len(), 1), xs.to_vec()).unwrap();
        TrainedUniverse {
            model: TransE::from_embeddings(col(entity_pos), col(relation_pos), Norm::L1).unwrap(),
            subgraph,
            params: UniverseParams::default(),
        }
    }

    /// Universe 0: {1, 2, 3}, universe 1: {1, 3, 4}; relation 5 in both.
    fn two_universes() -> EnsembleStore<TransE> {
        let mut store = EnsembleStore::new(6, 6);
        // locals 1→0, 2→1, 3→2
        store
            .add(line_universe(
                &[Triple::new(1, 5, 2), Triple::new(1, 5, 3)],
                &[0.0, 0.4, 0.6],
                &[0.1],
            ))
            .unwrap();
        // locals 1→0, 3→1, 4→2
        store
            .add(line_universe(
                &[Triple::new(1, 5, 3), Triple::new(3, 5, 4)],
                &[1.0, 0.9, 1.7],
                &[0.1],
            ))
            .unwrap();
        store
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_partial_coverage_last_rank() {
        let store = two_universes();
        let agg = ScoreAggregator::new(MissingEmbeddingHandling::LastRank);
        let mut cache = ScoreCache::new(6);

        let scores = agg.score_batch(&store, &mut cache, CacheKey::tails_of(1, 5), 0..2);
        assert!(close(scores[1], 0.1));
        assert!(close(scores[2], 0.3));
        // both universes know 3: min(0.5, 0.2)
        assert!(close(scores[3], 0.2));
        assert!(close(scores[4], 0.6));
        assert_eq!(scores[0], f32::INFINITY);
        assert_eq!(scores[5], f32::INFINITY);
    }

    #[test]
    fn test_partial_coverage_null_vector() {
        let store = two_universes();
        let agg = ScoreAggregator::new(MissingEmbeddingHandling::NullVector);
        let mut cache = ScoreCache::new(6);

        let scores = agg.score_batch(&store, &mut cache, CacheKey::tails_of(1, 5), 0..2);
        // null energies |h + r|: 0.1 and 1.1
        assert!(close(scores[0], 0.1));
        assert!(close(scores[5], 0.1));
        assert!(close(scores[3], 0.2));
    }

    #[test]
    fn test_fold_skips_uncovering_universe() {
        let store = two_universes();
        let agg = ScoreAggregator::default();
        let mut cache = ScoreCache::new(6);
        // entity 2 is not in universe 1
        assert!(!agg.fold_universe(&store, &mut cache, CacheKey::tails_of(2, 5), 1));
        assert!(cache.is_empty());
        assert!(!agg.fold_universe(&store, &mut cache, CacheKey::tails_of(1, 5), 7));
    }

    #[test]
    fn test_refold_is_idempotent() {
        let store = two_universes();
        let agg = ScoreAggregator::new(MissingEmbeddingHandling::NullVector);
        let key = CacheKey::heads_of(3, 5);

        let mut once = ScoreCache::new(6);
        agg.fold_universe(&store, &mut once, key, 0);
        let mut twice = once.clone();
        agg.fold_universe(&store, &mut twice, key, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_estimate_unknown_query() {
        let agg = ScoreAggregator::new(MissingEmbeddingHandling::NullVector);
        let cache = ScoreCache::new(3);
        let key = CacheKey::tails_of(0, 0);
        assert_eq!(agg.estimate(&cache, &key, &[0, 2]), vec![f32::INFINITY; 2]);
        assert_eq!(agg.estimate_all(&cache, &key).len(), 3);
    }

    #[test]
    fn test_predict_triple_matches_tail_batch() {
        let store = two_universes();
        let all: BTreeSet<UniverseId> = (0..2).collect();
        for handling in [MissingEmbeddingHandling::LastRank, MissingEmbeddingHandling::NullVector] {
            let agg = ScoreAggregator::new(handling);
            let mut cache = ScoreCache::new(6);
            let batch = agg.score_batch(&store, &mut cache, CacheKey::tails_of(1, 5), 0..2);
            for t in 0..6 {
                let single = agg.predict_triple(&store, &Triple::new(1, 5, t), &all);
                assert!(
                    single == batch[t as usize] || close(single, batch[t as usize]),
                    "{handling:?} candidate {t}: {single} vs {}",
                    batch[t as usize]
                );
            }
        }
    }

    #[test]
    fn test_predict_triple_respects_active_set() {
        let store = two_universes();
        let agg = ScoreAggregator::default();
        let only_first = BTreeSet::from([0]);
        assert!(close(agg.predict_triple(&store, &Triple::new(1, 5, 3), &only_first), 0.5));
        assert_eq!(
            agg.predict_triple(&store, &Triple::new(1, 5, 4), &only_first),
            f32::INFINITY
        );
        assert_eq!(
            agg.predict_triple(&store, &Triple::new(1, 5, 3), &BTreeSet::new()),
            f32::INFINITY
        );
    }
}
