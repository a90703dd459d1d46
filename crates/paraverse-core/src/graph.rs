use crate::{EntityId, Error, IdKind, RelationId, Result, Triple};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashSet};

/// A knowledge graph over a fixed integer vocabulary.
///
/// Uses petgraph's directed graph internally; node `i` is entity `i`, and
/// every edge carries the index of its triple. Triples are never physically
/// removed: [`delete_triple`](Self::delete_triple) marks them deleted so that
/// streaming updates can be replayed against an append-only edge list.
///
/// # Example
///
/// ```rust
/// use paraverse_core::{KnowledgeGraph, Triple};
///
/// let mut kg = KnowledgeGraph::new(3, 2);
/// kg.add_triple(Triple::new(0, 1, 2)).unwrap();
/// assert!(kg.contains(&Triple::new(0, 1, 2)));
///
/// kg.delete_triple(&Triple::new(0, 1, 2));
/// assert!(!kg.contains(&Triple::new(0, 1, 2)));
/// assert_eq!(kg.deleted_triples().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    /// Vocabulary sizes.
    ent_tot: usize,
    rel_tot: usize,

    /// Entity graph; edge weight = index into `triples`.
    graph: DiGraph<(), usize>,

    /// All triples ever added, in insertion order.
    triples: Vec<Triple>,

    /// Live (not deleted) triples, for O(1) membership.
    live: HashSet<Triple>,

    /// Triples removed by streaming updates.
    deleted: BTreeSet<Triple>,
}

impl KnowledgeGraph {
    /// Create an empty graph over `ent_tot` entities and `rel_tot` relations.
    pub fn new(ent_tot: usize, rel_tot: usize) -> Self {
        let mut graph = DiGraph::with_capacity(ent_tot, 0);
        for _ in 0..ent_tot {
            graph.add_node(());
        }
        Self {
            ent_tot,
            rel_tot,
            graph,
            triples: Vec::new(),
            live: HashSet::new(),
            deleted: BTreeSet::new(),
        }
    }

    /// Build a graph from triples, validating every id.
    pub fn from_triples(
        ent_tot: usize,
        rel_tot: usize,
        triples: impl IntoIterator<Item = Triple>,
    ) -> Result<Self> {
        let mut kg = Self::new(ent_tot, rel_tot);
        for triple in triples {
            kg.add_triple(triple)?;
        }
        Ok(kg)
    }

    /// Add a triple. Returns `false` if it was already live.
    ///
    /// Re-adding a deleted triple reinstates it.
    pub fn add_triple(&mut self, triple: Triple) -> Result<bool> {
        self.check_entity(triple.head)?;
        self.check_entity(triple.tail)?;
        if triple.relation as usize >= self.rel_tot {
            return Err(Error::IdOutOfRange {
                kind: IdKind::Relation,
                id: triple.relation,
                total: self.rel_tot,
            });
        }

        if self.live.contains(&triple) {
            return Ok(false);
        }
        if self.deleted.remove(&triple) {
            self.live.insert(triple);
            return Ok(true);
        }

        let idx = self.triples.len();
        self.graph.add_edge(
            NodeIndex::new(triple.head as usize),
            NodeIndex::new(triple.tail as usize),
            idx,
        );
        self.triples.push(triple);
        self.live.insert(triple);
        Ok(true)
    }

    /// Mark a triple deleted. Returns `false` if it was not live.
    pub fn delete_triple(&mut self, triple: &Triple) -> bool {
        if self.live.remove(triple) {
            self.deleted.insert(*triple);
            true
        } else {
            false
        }
    }

    /// Whether a triple is present and not deleted.
    pub fn contains(&self, triple: &Triple) -> bool {
        self.live.contains(triple)
    }

    /// Triples deleted since construction.
    pub fn deleted_triples(&self) -> &BTreeSet<Triple> {
        &self.deleted
    }

    /// Live triples in insertion order.
    pub fn triples(&self) -> impl Iterator<Item = &Triple> + '_ {
        self.triples.iter().filter(move |t| self.live.contains(*t))
    }

    /// Number of live triples.
    pub fn triple_count(&self) -> usize {
        self.live.len()
    }

    /// Entity vocabulary size.
    pub fn entity_count(&self) -> usize {
        self.ent_tot
    }

    /// Relation vocabulary size.
    pub fn relation_count(&self) -> usize {
        self.rel_tot
    }

    /// Live triples with `entity` as head.
    pub fn out_triples(&self, entity: EntityId) -> impl Iterator<Item = &Triple> + '_ {
        self.adjacent(entity, Direction::Outgoing)
    }

    /// Live triples with `entity` as tail.
    pub fn in_triples(&self, entity: EntityId) -> impl Iterator<Item = &Triple> + '_ {
        self.adjacent(entity, Direction::Incoming)
    }

    /// Live triples with `entity` as head (`as_head`) or as tail.
    pub fn incident_triples(
        &self,
        entity: EntityId,
        as_head: bool,
    ) -> impl Iterator<Item = &Triple> + '_ {
        let dir = if as_head {
            Direction::Outgoing
        } else {
            Direction::Incoming
        };
        self.adjacent(entity, dir)
    }

    /// Number of distinct relations with at least one live triple.
    pub fn relations_in_use(&self) -> usize {
        self.live
            .iter()
            .map(|t| t.relation)
            .collect::<HashSet<RelationId>>()
            .len()
    }

    fn adjacent(&self, entity: EntityId, dir: Direction) -> impl Iterator<Item = &Triple> + '_ {
        let node = ((entity as usize) < self.ent_tot).then(|| NodeIndex::new(entity as usize));
        node.into_iter()
            .flat_map(move |n| self.graph.edges_directed(n, dir))
            .map(move |e| &self.triples[*e.weight()])
            .filter(move |t| self.live.contains(*t))
    }

    fn check_entity(&self, id: EntityId) -> Result<()> {
        if id as usize >= self.ent_tot {
            return Err(Error::IdOutOfRange {
                kind: IdKind::Entity,
                id,
                total: self.ent_tot,
            });
        }
        Ok(())
    }
}
