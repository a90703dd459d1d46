//! Universe-level model contracts.
//!
//! Models are abstracted at the model level, not the tensor level: each
//! implementation keeps its own parameter storage and exposes plain `f32`
//! energies over universe-local ids.

use crate::error::Result;
use paraverse_core::LocalId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a partially-bound query is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Tail and relation known, scan over heads: `(?, r, t)`.
    HeadBatch,
    /// Head and relation known, scan over tails: `(h, r, ?)`.
    TailBatch,
}

impl Direction {
    /// Both directions, head batch first.
    pub const ALL: [Direction; 2] = [Direction::HeadBatch, Direction::TailBatch];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeadBatch => f.write_str("head_batch"),
            Self::TailBatch => f.write_str("tail_batch"),
        }
    }
}

/// A trained embedding space over one universe.
///
/// All ids are local to the universe. Energies follow the margin-based
/// convention: **lower is more plausible**.
pub trait EmbeddingSpace: Send + Sync {
    // =========================================================================
    // Metadata
    // =========================================================================

    /// Model name (e.g., "TransE").
    fn name(&self) -> &'static str;

    /// Number of local entities.
    fn num_entities(&self) -> usize;

    /// Number of local relations.
    fn num_relations(&self) -> usize;

    // =========================================================================
    // Scoring
    // =========================================================================

    /// Energy of one fully-bound local triple.
    fn score(&self, head: LocalId, relation: LocalId, tail: LocalId) -> f32;

    /// Energy with a zero vector standing in for the open side.
    ///
    /// `entity` is the fixed side: the tail for [`Direction::HeadBatch`],
    /// the head for [`Direction::TailBatch`].
    fn score_null(&self, entity: LocalId, relation: LocalId, direction: Direction) -> f32;

    /// Energies of the fixed `(entity, relation)` against every local entity.
    ///
    /// The result is indexed by local id and has length
    /// [`num_entities`](Self::num_entities). The default implementation calls
    /// [`score`](Self::score) per candidate; models with a vectorized kernel
    /// should override it.
    fn predict_batch(&self, entity: LocalId, relation: LocalId, direction: Direction) -> Vec<f32> {
        (0..self.num_entities() as LocalId)
            .map(|candidate| match direction {
                Direction::HeadBatch => self.score(candidate, relation, entity),
                Direction::TailBatch => self.score(entity, relation, candidate),
            })
            .collect()
    }
}

/// Builds fresh, untrained models sized to a universe.
pub trait ModelFactory {
    /// Model produced by this factory.
    type Model: EmbeddingSpace;

    /// Construct a model with randomly initialized parameters.
    fn build<R: Rng + ?Sized>(
        &self,
        num_entities: usize,
        num_relations: usize,
        rng: &mut R,
    ) -> Result<Self::Model>;

    /// Short description of the fixed model parameters, for logs.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Energy = |h - t| + r, enough to check the default batch path.
    struct Toy;

    impl EmbeddingSpace for Toy {
        fn name(&self) -> &'static str {
            "Toy"
        }
        fn num_entities(&self) -> usize {
            4
        }
        fn num_relations(&self) -> usize {
            1
        }
        fn score(&self, head: LocalId, relation: LocalId, tail: LocalId) -> f32 {
            (head as f32 - tail as f32).abs() + relation as f32
        }
        fn score_null(&self, entity: LocalId, _relation: LocalId, _direction: Direction) -> f32 {
            entity as f32
        }
    }

    #[test]
    fn test_default_predict_batch_orientation() {
        let toy = Toy;
        assert_eq!(toy.predict_batch(1, 0, Direction::TailBatch), vec![1.0, 0.0, 1.0, 2.0]);
        assert_eq!(toy.predict_batch(3, 0, Direction::HeadBatch), vec![3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::HeadBatch.to_string(), "head_batch");
        assert_eq!(Direction::TailBatch.to_string(), "tail_batch");
    }
}
