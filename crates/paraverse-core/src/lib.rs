//! Integer-id knowledge graph substrate for parallel-universe ensembles.
//!
//! Everything in this crate speaks *global* ids: dense `u32` indices into the
//! fixed entity and relation vocabularies of one dataset. Universes (small
//! sampled sub-graphs) get their own compact *local* id spaces; the mapping
//! between the two lives in [`sampling::Subgraph`] and, once a universe is
//! trained, in the ensemble's remapper.
//!
//! ```text
//!   global graph (ent_tot, rel_tot)
//!        │  UniverseSampler::compile_universe(triple_count, balance)
//!        ▼
//!   Subgraph { entity_remap[local] = global, relation_remap[local] = global,
//!              triples in local ids }
//! ```
//!
//! # Example
//!
//! ```rust
//! use paraverse_core::{KnowledgeGraph, Triple};
//!
//! let mut kg = KnowledgeGraph::new(4, 1);
//! kg.add_triple(Triple::new(0, 0, 1)).unwrap();
//! kg.add_triple(Triple::new(1, 0, 2)).unwrap();
//!
//! assert_eq!(kg.triple_count(), 2);
//! assert_eq!(kg.out_triples(1).count(), 1);
//! ```

mod error;
mod graph;

pub mod formats;
pub mod sampling;

pub use error::{Error, Result};
pub use graph::KnowledgeGraph;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Global entity id, dense in `[0, ent_tot)`.
pub type EntityId = u32;
/// Global relation id, dense in `[0, rel_tot)`.
pub type RelationId = u32;
/// Universe id, dense in `[0, next_universe_id)` and never reused.
pub type UniverseId = u32;
/// Id valid only inside one universe's embedding space.
pub type LocalId = u32;

/// A (head, relation, tail) fact over integer ids.
///
/// Whether the ids are global or universe-local depends on where the triple
/// came from; a [`sampling::Subgraph`] stores local triples, a
/// [`KnowledgeGraph`] global ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    /// Head entity (subject).
    pub head: EntityId,
    /// Relation (predicate).
    pub relation: RelationId,
    /// Tail entity (object).
    pub tail: EntityId,
}

impl Triple {
    /// Create a triple from head, relation, tail.
    pub const fn new(head: EntityId, relation: RelationId, tail: EntityId) -> Self {
        Self {
            head,
            relation,
            tail,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.head, self.relation, self.tail)
    }
}

/// Which side of a vocabulary an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    /// Entity ids.
    Entity,
    /// Relation ids.
    Relation,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => f.write_str("entity"),
            Self::Relation => f.write_str("relation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_display() {
        let t = Triple::new(1, 5, 2);
        assert_eq!(t.to_string(), "(1, 5, 2)");
    }

    #[test]
    fn test_triple_ordering_is_head_first() {
        let mut ts = vec![Triple::new(2, 0, 0), Triple::new(1, 9, 9), Triple::new(1, 0, 3)];
        ts.sort();
        assert_eq!(ts[0], Triple::new(1, 0, 3));
        assert_eq!(ts[2], Triple::new(2, 0, 0));
    }
}
