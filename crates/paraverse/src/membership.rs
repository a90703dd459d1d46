//! Which universes contain each global entity and relation.

use std::collections::BTreeSet;

use paraverse_core::{EntityId, IdKind, RelationId, UniverseId};
use serde::{Deserialize, Serialize};

static EMPTY: BTreeSet<UniverseId> = BTreeSet::new();

/// Global id → set of universes containing it.
///
/// Sized to the vocabulary at construction; unknown or out-of-range ids read
/// as the empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipIndex {
    entities: Vec<BTreeSet<UniverseId>>,
    relations: Vec<BTreeSet<UniverseId>>,
}

impl MembershipIndex {
    pub fn new(ent_tot: usize, rel_tot: usize) -> Self {
        Self {
            entities: vec![BTreeSet::new(); ent_tot],
            relations: vec![BTreeSet::new(); rel_tot],
        }
    }

    /// Entity vocabulary size.
    pub fn num_entities(&self) -> usize {
        self.entities.len()
    }

    /// Relation vocabulary size.
    pub fn num_relations(&self) -> usize {
        self.relations.len()
    }

    /// Record that `universe` contains entity `id`. Out-of-range ids are ignored.
    pub fn add_entity(&mut self, id: EntityId, universe: UniverseId) {
        if let Some(set) = self.entities.get_mut(id as usize) {
            set.insert(universe);
        }
    }

    /// Record that `universe` contains relation `id`. Out-of-range ids are ignored.
    pub fn add_relation(&mut self, id: RelationId, universe: UniverseId) {
        if let Some(set) = self.relations.get_mut(id as usize) {
            set.insert(universe);
        }
    }

    pub fn entity_universes(&self, id: EntityId) -> &BTreeSet<UniverseId> {
        self.entities.get(id as usize).unwrap_or(&EMPTY)
    }

    pub fn relation_universes(&self, id: RelationId) -> &BTreeSet<UniverseId> {
        self.relations.get(id as usize).unwrap_or(&EMPTY)
    }

    /// Universes containing `entity_a`, `relation` and (if given) `entity_b`.
    ///
    /// Symmetric in the two entities.
    pub fn intersect(
        &self,
        entity_a: EntityId,
        relation: RelationId,
        entity_b: Option<EntityId>,
    ) -> BTreeSet<UniverseId> {
        let relation_set = self.relation_universes(relation);
        let mut out: BTreeSet<UniverseId> = self
            .entity_universes(entity_a)
            .intersection(relation_set)
            .copied()
            .collect();
        if let Some(b) = entity_b {
            let b_set = self.entity_universes(b);
            out.retain(|u| b_set.contains(u));
        }
        out
    }

    /// Whether `universe` holds both `entity` and `relation`.
    pub fn covers(&self, universe: UniverseId, entity: EntityId, relation: RelationId) -> bool {
        self.entity_universes(entity).contains(&universe)
            && self.relation_universes(relation).contains(&universe)
    }

    /// Share of global ids that no universe contains.
    pub fn unembedded_ratio(&self, kind: IdKind) -> f64 {
        let sets = match kind {
            IdKind::Entity => &self.entities,
            IdKind::Relation => &self.relations,
        };
        if sets.is_empty() {
            return 0.0;
        }
        sets.iter().filter(|s| s.is_empty()).count() as f64 / sets.len() as f64
    }

    /// Union `other` in, shifting its universe ids by `offset`.
    pub(crate) fn union_shifted(&mut self, other: &MembershipIndex, offset: UniverseId) {
        for (mine, theirs) in self.entities.iter_mut().zip(&other.entities) {
            mine.extend(theirs.iter().map(|u| u + offset));
        }
        for (mine, theirs) in self.relations.iter_mut().zip(&other.relations) {
            mine.extend(theirs.iter().map(|u| u + offset));
        }
    }

    /// Largest universe id referenced anywhere, if any.
    pub(crate) fn max_universe(&self) -> Option<UniverseId> {
        self.entities
            .iter()
            .chain(&self.relations)
            .filter_map(|s| s.last().copied())
            .max()
    }
}
