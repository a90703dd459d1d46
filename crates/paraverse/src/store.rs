//! The append-only collection of trained universes.

use std::collections::BTreeSet;
use std::ops::{Deref, Range};

use paraverse_core::{EntityId, Error as CoreError, IdKind, RelationId, UniverseId};
use paraverse_kge::EmbeddingSpace;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::factory::{TrainedUniverse, UniverseParams};
use crate::membership::MembershipIndex;
use crate::remap::IdRemapper;

/// A trained model whose parameters can no longer change.
///
/// Only shared access is handed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frozen<M>(M);

impl<M> Frozen<M> {
    pub fn new(model: M) -> Self {
        Self(model)
    }

    pub fn get(&self) -> &M {
        &self.0
    }
}

impl<M> Deref for Frozen<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.0
    }
}

/// Trained universes with their id tables and membership index.
///
/// Universe ids are dense in `0..next_universe_id` and never reused; the
/// only way in is [`add`](Self::add) (or [`merge`](Self::merge)), which
/// updates the counter, the model list, the remapper and the membership
/// index together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleStore<M> {
    next_universe_id: UniverseId,
    spaces: Vec<Frozen<M>>,
    #[serde(default)]
    params: Vec<UniverseParams>,
    remapper: IdRemapper,
    membership: MembershipIndex,
}

impl<M: EmbeddingSpace> EnsembleStore<M> {
    /// An empty store over a fixed vocabulary.
    pub fn new(ent_tot: usize, rel_tot: usize) -> Self {
        Self {
            next_universe_id: 0,
            spaces: Vec::new(),
            params: Vec::new(),
            remapper: IdRemapper::new(),
            membership: MembershipIndex::new(ent_tot, rel_tot),
        }
    }

    /// Freeze and register a trained universe under the next id.
    ///
    /// Every global id is checked against the vocabulary before anything is
    /// recorded, so a rejected universe leaves the store untouched.
    pub fn add(&mut self, universe: TrainedUniverse<M>) -> Result<UniverseId> {
        let TrainedUniverse {
            subgraph,
            model,
            params,
        } = universe;

        for &e in &subgraph.entity_remap {
            self.check_id(e, IdKind::Entity)?;
        }
        for &r in &subgraph.relation_remap {
            self.check_id(r, IdKind::Relation)?;
        }
        if model.num_entities() != subgraph.num_entities()
            || model.num_relations() != subgraph.num_relations()
        {
            return Err(Error::InvalidConfig(format!(
                "model sized {}x{} for a universe of {} entities and {} relations",
                model.num_entities(),
                model.num_relations(),
                subgraph.num_entities(),
                subgraph.num_relations()
            )));
        }

        let id = self.next_universe_id;
        self.remapper.register_subgraph(id, &subgraph);
        for &e in &subgraph.entity_remap {
            self.membership.add_entity(e, id);
        }
        for &r in &subgraph.relation_remap {
            self.membership.add_relation(r, id);
        }
        self.spaces.push(Frozen::new(model));
        self.params.resize_with(id as usize, UniverseParams::default);
        self.params.push(params);
        self.next_universe_id += 1;

        tracing::debug!(universe = id, entities = subgraph.num_entities(), "Registered universe");
        Ok(id)
    }

    /// Append every universe of `other`, shifting its ids past ours.
    pub fn merge(&mut self, other: EnsembleStore<M>) -> Result<()> {
        let ours = (self.membership.num_entities(), self.membership.num_relations());
        let theirs = (other.membership.num_entities(), other.membership.num_relations());
        if ours != theirs {
            return Err(Error::VocabularyMismatch { ours, theirs });
        }

        let offset = self.next_universe_id;
        self.membership.union_shifted(&other.membership, offset);
        self.remapper.append_shifted(offset, other.remapper);
        self.remapper.ensure_len(self.next_universe_id + other.next_universe_id);
        self.spaces.extend(other.spaces);
        // older checkpoints carry no hyperparameter records
        self.params.resize_with(offset as usize, UniverseParams::default);
        self.params.extend(other.params);
        self.params.resize_with(self.spaces.len(), UniverseParams::default);
        self.next_universe_id += other.next_universe_id;

        tracing::info!(
            offset,
            added = other.next_universe_id,
            total = self.next_universe_id,
            "Merged ensembles"
        );
        Ok(())
    }

    /// Check the tables agree with the universe counter.
    pub fn validate(&self) -> Result<()> {
        let n = self.next_universe_id as usize;
        if self.spaces.len() != n {
            return Err(Error::CorruptCheckpoint(format!(
                "{} embedding spaces for {n} universes",
                self.spaces.len()
            )));
        }
        if self.remapper.len() != n {
            return Err(Error::CorruptCheckpoint(format!(
                "{} id tables for {n} universes",
                self.remapper.len()
            )));
        }
        if !self.params.is_empty() && self.params.len() != n {
            return Err(Error::CorruptCheckpoint(format!(
                "{} hyperparameter records for {n} universes",
                self.params.len()
            )));
        }
        if let Some(max) = self.membership.max_universe() {
            if max as usize >= n {
                return Err(Error::CorruptCheckpoint(format!(
                    "membership references universe {max} of {n}"
                )));
            }
        }
        for (universe, space) in (0..).zip(&self.spaces) {
            let entities = self.remapper.entities(universe).map(|(_, local)| local).max();
            let relations = self.remapper.relations(universe).map(|(_, local)| local).max();
            if entities.is_some_and(|l| l as usize >= space.num_entities())
                || relations.is_some_and(|l| l as usize >= space.num_relations())
            {
                return Err(Error::CorruptCheckpoint(format!(
                    "universe {universe} maps past its model ({} entities, {} relations)",
                    space.num_entities(),
                    space.num_relations()
                )));
            }
        }
        Ok(())
    }

    fn check_id(&self, id: u32, kind: IdKind) -> Result<()> {
        let total = match kind {
            IdKind::Entity => self.membership.num_entities(),
            IdKind::Relation => self.membership.num_relations(),
        };
        if id as usize >= total {
            return Err(CoreError::IdOutOfRange { kind, id, total }.into());
        }
        Ok(())
    }
}

impl<M> EnsembleStore<M> {
    pub fn next_universe_id(&self) -> UniverseId {
        self.next_universe_id
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    pub fn num_entities(&self) -> usize {
        self.membership.num_entities()
    }

    pub fn num_relations(&self) -> usize {
        self.membership.num_relations()
    }

    /// The frozen model of a universe.
    pub fn space(&self, universe: UniverseId) -> Option<&Frozen<M>> {
        self.spaces.get(universe as usize)
    }

    /// Hyperparameters a universe was trained with, if recorded.
    pub fn params(&self, universe: UniverseId) -> Option<&UniverseParams> {
        self.params.get(universe as usize)
    }

    pub fn remapper(&self) -> &IdRemapper {
        &self.remapper
    }

    pub fn membership(&self) -> &MembershipIndex {
        &self.membership
    }

    /// Universes in `range` that are not deprecated.
    pub fn active_universes(
        &self,
        range: Range<UniverseId>,
        deprecated: &BTreeSet<UniverseId>,
    ) -> Vec<UniverseId> {
        let end = range.end.min(self.next_universe_id);
        (range.start..end)
            .filter(|u| !deprecated.contains(u))
            .collect()
    }

    /// Universes holding both `entity` and `relation`.
    pub fn covering(&self, entity: EntityId, relation: RelationId) -> BTreeSet<UniverseId> {
        self.membership.intersect(entity, relation, None)
    }
}
