//! Global ↔ local id tables, one pair per universe.

use std::collections::BTreeMap;

use paraverse_core::sampling::Subgraph;
use paraverse_core::{EntityId, IdKind, LocalId, RelationId, UniverseId};
use serde::{Deserialize, Serialize};

/// Id tables of a single universe: global id → local id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseIds {
    /// Global entity → local entity.
    pub entities: BTreeMap<EntityId, LocalId>,
    /// Global relation → local relation.
    pub relations: BTreeMap<RelationId, LocalId>,
}

impl UniverseIds {
    fn table(&self, kind: IdKind) -> &BTreeMap<u32, LocalId> {
        match kind {
            IdKind::Entity => &self.entities,
            IdKind::Relation => &self.relations,
        }
    }

    fn table_mut(&mut self, kind: IdKind) -> &mut BTreeMap<u32, LocalId> {
        match kind {
            IdKind::Entity => &mut self.entities,
            IdKind::Relation => &mut self.relations,
        }
    }
}

/// Per-universe translation between global and local ids.
///
/// Absent entries mean "not in this universe"; lookups return `None`. Entries
/// are never removed. The local → global direction is derived on demand from
/// [`entities`](Self::entities) / [`relations`](Self::relations).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRemapper {
    universes: Vec<UniverseIds>,
}

impl IdRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of universes with a table (registered or padded).
    pub fn len(&self) -> usize {
        self.universes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.universes.is_empty()
    }

    /// Record `global ↦ local` for `universe`. Re-registering is a no-op.
    pub fn register(&mut self, universe: UniverseId, global: u32, local: LocalId, kind: IdKind) {
        self.ensure(universe);
        self.universes[universe as usize]
            .table_mut(kind)
            .entry(global)
            .or_insert(local);
    }

    /// Register every id of a sampled sub-graph.
    pub fn register_subgraph(&mut self, universe: UniverseId, subgraph: &Subgraph) {
        self.ensure(universe);
        for (local, &global) in subgraph.entity_remap.iter().enumerate() {
            self.register(universe, global, local as LocalId, IdKind::Entity);
        }
        for (local, &global) in subgraph.relation_remap.iter().enumerate() {
            self.register(universe, global, local as LocalId, IdKind::Relation);
        }
    }

    /// Make sure `universe` has a (possibly empty) table.
    pub(crate) fn ensure(&mut self, universe: UniverseId) {
        let needed = universe as usize + 1;
        if self.universes.len() < needed {
            self.universes.resize_with(needed, UniverseIds::default);
        }
    }

    pub fn to_local(&self, universe: UniverseId, global: u32, kind: IdKind) -> Option<LocalId> {
        self.universes
            .get(universe as usize)?
            .table(kind)
            .get(&global)
            .copied()
    }

    pub fn to_local_entity(&self, universe: UniverseId, global: EntityId) -> Option<LocalId> {
        self.to_local(universe, global, IdKind::Entity)
    }

    pub fn to_local_relation(&self, universe: UniverseId, global: RelationId) -> Option<LocalId> {
        self.to_local(universe, global, IdKind::Relation)
    }

    /// `(global, local)` entity pairs of a universe, by global id.
    pub fn entities(&self, universe: UniverseId) -> impl Iterator<Item = (EntityId, LocalId)> + '_ {
        self.pairs(universe, IdKind::Entity)
    }

    /// `(global, local)` relation pairs of a universe, by global id.
    pub fn relations(
        &self,
        universe: UniverseId,
    ) -> impl Iterator<Item = (RelationId, LocalId)> + '_ {
        self.pairs(universe, IdKind::Relation)
    }

    /// The tables of one universe.
    pub fn universe(&self, universe: UniverseId) -> Option<&UniverseIds> {
        self.universes.get(universe as usize)
    }

    /// Pad with empty tables up to `len` universes.
    pub(crate) fn ensure_len(&mut self, len: UniverseId) {
        if len > 0 {
            self.ensure(len - 1);
        }
    }

    /// Append `other`'s tables as universes `offset..offset + other.len()`.
    pub(crate) fn append_shifted(&mut self, offset: UniverseId, other: IdRemapper) {
        self.universes.resize_with(offset as usize, UniverseIds::default);
        self.universes.extend(other.universes);
    }

    fn pairs(&self, universe: UniverseId, kind: IdKind) -> impl Iterator<Item = (u32, LocalId)> + '_ {
        self.universes
            .get(universe as usize)
            .into_iter()
            .flat_map(move |ids| ids.table(kind).iter().map(|(&g, &l)| (g, l)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paraverse_core::Triple;

    #[test]
    fn test_register_and_lookup() {
        let mut remap = IdRemapper::new();
        remap.register(1, 40, 0, IdKind::Entity);
        remap.register(1, 7, 0, IdKind::Relation);

        assert_eq!(remap.len(), 2);
        assert_eq!(remap.to_local_entity(1, 40), Some(0));
        assert_eq!(remap.to_local_relation(1, 7), Some(0));
        // absent id, empty universe, unknown universe
        assert_eq!(remap.to_local_entity(1, 41), None);
        assert_eq!(remap.to_local_entity(0, 40), None);
        assert_eq!(remap.to_local_entity(9, 40), None);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut remap = IdRemapper::new();
        remap.register(0, 3, 2, IdKind::Entity);
        remap.register(0, 3, 2, IdKind::Entity);
        assert_eq!(remap.entities(0).collect::<Vec<_>>(), vec![(3, 2)]);
    }

    #[test]
    fn test_register_subgraph() {
        let sub = Subgraph::from_global(&[Triple::new(9, 4, 7), Triple::new(7, 2, 3)]);
        let mut remap = IdRemapper::new();
        remap.register_subgraph(0, &sub);

        assert_eq!(remap.entities(0).collect::<Vec<_>>(), vec![(3, 2), (7, 1), (9, 0)]);
        assert_eq!(remap.relations(0).collect::<Vec<_>>(), vec![(2, 1), (4, 0)]);
    }

    #[test]
    fn test_append_shifted() {
        let mut a = IdRemapper::new();
        a.register(0, 1, 0, IdKind::Entity);
        let mut b = IdRemapper::new();
        b.register(0, 5, 0, IdKind::Entity);
        b.register(1, 6, 0, IdKind::Entity);

        a.append_shifted(3, b);
        assert_eq!(a.len(), 5);
        assert_eq!(a.to_local_entity(3, 5), Some(0));
        assert_eq!(a.to_local_entity(4, 6), Some(0));
        assert_eq!(a.entities(2).count(), 0);
    }
}
