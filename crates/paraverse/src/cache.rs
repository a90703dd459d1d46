//! Running minima of candidate energies per partially-bound query.
//!
//! A query `(entity, relation, direction)` fixes one side of a triple; its
//! entry holds one energy per global candidate entity (the best any folded
//! universe produced so far) plus the best null-vector energy. Everything
//! starts at `+inf`, meaning "no universe has scored this yet".
//!
//! ```text
//!   CacheKey { entity: h, relation: r, direction: TailBatch }
//!        └─> scores[t] = min over folded universes of E_u(h, r, t)
//!            null_fallback = min over folded universes of E_u(h, r, 0)
//! ```

use std::collections::HashMap;

use paraverse_core::{EntityId, RelationId};
use paraverse_kge::Direction;
use serde::{Deserialize, Serialize, Serializer};

/// A partially-bound query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// The fixed entity: head for tail batches, tail for head batches.
    pub entity: EntityId,
    pub relation: RelationId,
    pub direction: Direction,
}

impl CacheKey {
    pub fn new(entity: EntityId, relation: RelationId, direction: Direction) -> Self {
        Self {
            entity,
            relation,
            direction,
        }
    }

    /// `(h, r, ?)`.
    pub fn tails_of(head: EntityId, relation: RelationId) -> Self {
        Self::new(head, relation, Direction::TailBatch)
    }

    /// `(?, r, t)`.
    pub fn heads_of(tail: EntityId, relation: RelationId) -> Self {
        Self::new(tail, relation, Direction::HeadBatch)
    }
}

/// Best energies for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScores {
    scores: Vec<f32>,
    null_fallback: f32,
}

impl CandidateScores {
    fn new(num_entities: usize) -> Self {
        Self {
            scores: vec![f32::INFINITY; num_entities],
            null_fallback: f32::INFINITY,
        }
    }

    /// Energies by global candidate id.
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// Energy of one candidate; `+inf` if unscored or out of range.
    pub fn get(&self, candidate: EntityId) -> f32 {
        self.scores
            .get(candidate as usize)
            .copied()
            .unwrap_or(f32::INFINITY)
    }

    pub fn null_fallback(&self) -> f32 {
        self.null_fallback
    }

    /// Keep the smaller of the cached and the new energy.
    pub fn fold(&mut self, candidate: EntityId, energy: f32) {
        if let Some(slot) = self.scores.get_mut(candidate as usize) {
            if energy < *slot {
                *slot = energy;
            }
        }
    }

    pub fn fold_null(&mut self, energy: f32) {
        if energy < self.null_fallback {
            self.null_fallback = energy;
        }
    }
}

/// All query entries, normalized into one map.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "SparseCache")]
pub struct ScoreCache {
    num_entities: usize,
    entries: HashMap<CacheKey, CandidateScores>,
}

impl ScoreCache {
    /// An empty cache for a vocabulary of `num_entities` candidates.
    pub fn new(num_entities: usize) -> Self {
        Self {
            num_entities,
            entries: HashMap::new(),
        }
    }

    pub fn num_entities(&self) -> usize {
        self.num_entities
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CandidateScores> {
        self.entries.get(key)
    }

    /// The entry for `key`, created all-`+inf` on first use.
    pub fn entry(&mut self, key: CacheKey) -> &mut CandidateScores {
        let n = self.num_entities;
        self.entries
            .entry(key)
            .or_insert_with(|| CandidateScores::new(n))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// On disk only finite energies are written, since JSON has no infinity and
// most candidates of most queries are never scored.

#[derive(Serialize, Deserialize)]
struct SparseEntry {
    key: CacheKey,
    scores: Vec<(EntityId, f32)>,
    #[serde(default)]
    null_fallback: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct SparseCache {
    num_entities: usize,
    entries: Vec<SparseEntry>,
}

impl Serialize for ScoreCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut keys: Vec<&CacheKey> = self.entries.keys().collect();
        keys.sort();
        let entries = keys
            .into_iter()
            .map(|key| {
                let entry = &self.entries[key];
                SparseEntry {
                    key: *key,
                    scores: entry
                        .scores
                        .iter()
                        .enumerate()
                        .filter(|(_, s)| s.is_finite())
                        .map(|(i, &s)| (i as EntityId, s))
                        .collect(),
                    null_fallback: Some(entry.null_fallback).filter(|s| s.is_finite()),
                }
            })
            .collect();
        SparseCache {
            num_entities: self.num_entities,
            entries,
        }
        .serialize(serializer)
    }
}

impl TryFrom<SparseCache> for ScoreCache {
    type Error = String;

    fn try_from(sparse: SparseCache) -> std::result::Result<Self, String> {
        let mut cache = ScoreCache::new(sparse.num_entities);
        for SparseEntry {
            key,
            scores,
            null_fallback,
        } in sparse.entries
        {
            let entry = cache.entry(key);
            for (candidate, score) in scores {
                if candidate as usize >= sparse.num_entities {
                    return Err(format!(
                        "cached candidate {candidate} outside {} entities",
                        sparse.num_entities
                    ));
                }
                entry.fold(candidate, score);
            }
            if let Some(null) = null_fallback {
                entry.fold_null(null);
            }
        }
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_unscored() {
        let mut cache = ScoreCache::new(3);
        let key = CacheKey::tails_of(0, 1);
        assert!(cache.get(&key).is_none());

        let entry = cache.entry(key);
        assert_eq!(entry.scores(), &[f32::INFINITY; 3]);
        assert_eq!(entry.null_fallback(), f32::INFINITY);
        assert_eq!(entry.get(99), f32::INFINITY);
    }

    #[test]
    fn test_fold_keeps_minimum() {
        let mut cache = ScoreCache::new(3);
        let entry = cache.entry(CacheKey::heads_of(2, 0));
        entry.fold(1, 0.5);
        entry.fold(1, 0.7);
        entry.fold(1, 0.2);
        entry.fold(7, 0.0);
        entry.fold_null(1.5);
        entry.fold_null(2.5);
        assert_eq!(entry.get(1), 0.2);
        assert_eq!(entry.null_fallback(), 1.5);
    }

    #[test]
    fn test_sparse_json_roundtrip() {
        let mut cache = ScoreCache::new(4);
        cache.entry(CacheKey::tails_of(0, 0)).fold(3, 0.25);
        cache.entry(CacheKey::heads_of(1, 0)).fold_null(2.0);

        let json = serde_json::to_string(&cache).unwrap();
        assert!(!json.contains("inf"));
        let back: ScoreCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cache);
    }

    #[test]
    fn test_out_of_range_candidate_rejected() {
        let json = r#"{"num_entities":2,"entries":[{"key":{"entity":0,"relation":0,"direction":"tail_batch"},"scores":[[5,0.1]]}]}"#;
        assert!(serde_json::from_str::<ScoreCache>(json).is_err());
    }
}
