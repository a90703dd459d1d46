//! Universe sampling.
//!
//! A universe is a small connected-ish slice of the training graph. The
//! ensemble only depends on the [`UniverseSampler`] contract: given a target
//! triple count and a head/tail balance, produce a [`Subgraph`] whose triples
//! are expressed in fresh local ids together with the local→global remaps.
//!
//! # Key Types
//!
//! - [`UniverseSampler`] - The sampling contract
//! - [`Subgraph`] - A sampled universe in local ids
//! - [`BalancedSampler`] - Random-walk expansion over a [`KnowledgeGraph`]

use crate::{EntityId, Error, KnowledgeGraph, LocalId, RelationId, Result, Triple};
use rand::Rng;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A sampled universe: local triples plus remaps back to global ids.
///
/// `entity_remap[local] == global` and likewise for relations; local ids are
/// dense in `[0, num_entities)` / `[0, num_relations)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subgraph {
    /// Local entity id -> global entity id.
    pub entity_remap: Vec<EntityId>,
    /// Local relation id -> global relation id.
    pub relation_remap: Vec<RelationId>,
    /// Training triples in local ids.
    pub triples: Vec<Triple>,
}

impl Subgraph {
    /// Compact global triples into a fresh local id space.
    ///
    /// Local ids are assigned in first-seen order (head before tail).
    pub fn from_global(global: &[Triple]) -> Self {
        let mut entity_local: HashMap<EntityId, LocalId> = HashMap::new();
        let mut relation_local: HashMap<RelationId, LocalId> = HashMap::new();
        let mut sub = Self::default();

        for t in global {
            let h = local_id(&mut entity_local, &mut sub.entity_remap, t.head);
            let r = local_id(&mut relation_local, &mut sub.relation_remap, t.relation);
            let tl = local_id(&mut entity_local, &mut sub.entity_remap, t.tail);
            sub.triples.push(Triple::new(h, r, tl));
        }
        sub
    }

    /// Number of entities in the universe.
    pub fn num_entities(&self) -> usize {
        self.entity_remap.len()
    }

    /// Number of relations in the universe.
    pub fn num_relations(&self) -> usize {
        self.relation_remap.len()
    }

    /// Map a local triple back to global ids.
    pub fn to_global(&self, t: &Triple) -> Triple {
        Triple::new(
            self.entity_remap[t.head as usize],
            self.relation_remap[t.relation as usize],
            self.entity_remap[t.tail as usize],
        )
    }
}

fn local_id<K: std::hash::Hash + Eq + Copy>(
    lookup: &mut HashMap<K, LocalId>,
    remap: &mut Vec<K>,
    global: K,
) -> LocalId {
    *lookup.entry(global).or_insert_with(|| {
        remap.push(global);
        (remap.len() - 1) as LocalId
    })
}

/// Contract for building universes out of a training graph.
pub trait UniverseSampler {
    /// Sample a sub-graph of about `triple_count` triples.
    ///
    /// `balance` is the probability of expanding from a frontier entity along
    /// an edge where it is the head (the rest expand along edges where it is
    /// the tail). All randomness must come from `rng` so universes are
    /// reproducible from their seed.
    fn compile_universe<R: Rng + ?Sized>(
        &mut self,
        triple_count: usize,
        balance: f64,
        rng: &mut R,
    ) -> Result<Subgraph>;

    /// Triples deleted from the training data since the universes were
    /// built. Used to deprecate stale universes in incremental evaluation.
    fn deleted_triples(&self) -> Vec<Triple> {
        Vec::new()
    }
}

/// Random-walk expansion sampler.
///
/// Starts from a random live triple and grows outward: each step picks a
/// frontier entity and, with probability `balance`, one of its unused
/// outgoing triples (else an incoming one). Exhausted entities leave the
/// frontier; when the frontier empties a new random seed triple is drawn.
///
/// # Example
///
/// ```rust
/// use paraverse_core::{KnowledgeGraph, Triple};
/// use paraverse_core::sampling::{BalancedSampler, UniverseSampler};
/// use rand::SeedableRng;
///
/// let kg = KnowledgeGraph::from_triples(4, 1, [
///     Triple::new(0, 0, 1),
///     Triple::new(1, 0, 2),
///     Triple::new(2, 0, 3),
/// ]).unwrap();
///
/// let mut sampler = BalancedSampler::new(kg);
/// let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
/// let sub = sampler.compile_universe(2, 0.5, &mut rng).unwrap();
///
/// assert_eq!(sub.triples.len(), 2);
/// assert_eq!(sub.num_relations(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct BalancedSampler {
    graph: KnowledgeGraph,
}

impl BalancedSampler {
    /// Create a sampler over a training graph.
    pub fn new(graph: KnowledgeGraph) -> Self {
        Self { graph }
    }

    /// The underlying training graph.
    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Mutable access for streaming inserts and deletions.
    pub fn graph_mut(&mut self) -> &mut KnowledgeGraph {
        &mut self.graph
    }

    fn pick_seed<R: Rng + ?Sized>(
        live: &[Triple],
        taken: &HashSet<Triple>,
        rng: &mut R,
    ) -> Option<Triple> {
        // scan from a random offset so a nearly-full universe stays O(n)
        let start = rng.gen_range(0..live.len());
        live.iter()
            .cycle()
            .skip(start)
            .take(live.len())
            .find(|t| !taken.contains(*t))
            .copied()
    }
}

impl UniverseSampler for BalancedSampler {
    fn compile_universe<R: Rng + ?Sized>(
        &mut self,
        triple_count: usize,
        balance: f64,
        rng: &mut R,
    ) -> Result<Subgraph> {
        if !(0.0..=1.0).contains(&balance) {
            return Err(Error::Sampling(format!("balance {balance} outside [0, 1]")));
        }
        let live: Vec<Triple> = self.graph.triples().copied().collect();
        if live.is_empty() {
            return Err(Error::Sampling("training graph has no live triples".into()));
        }

        let target = triple_count.clamp(1, live.len());
        let mut taken: HashSet<Triple> = HashSet::with_capacity(target);
        let mut picked: Vec<Triple> = Vec::with_capacity(target);
        let mut frontier: Vec<EntityId> = Vec::new();
        let mut on_frontier: BTreeSet<EntityId> = BTreeSet::new();

        while picked.len() < target {
            if frontier.is_empty() {
                let Some(seed) = Self::pick_seed(&live, &taken, rng) else {
                    break;
                };
                taken.insert(seed);
                picked.push(seed);
                for e in [seed.head, seed.tail] {
                    if on_frontier.insert(e) {
                        frontier.push(e);
                    }
                }
                continue;
            }

            let slot = rng.gen_range(0..frontier.len());
            let entity = frontier[slot];
            let preferred = rng.gen_bool(balance);

            // try the preferred side first, then the other before retiring the entity
            let mut chosen = None;
            for as_head in [preferred, !preferred] {
                let candidates: Vec<Triple> = self
                    .graph
                    .incident_triples(entity, as_head)
                    .filter(|t| !taken.contains(*t))
                    .copied()
                    .collect();
                if !candidates.is_empty() {
                    let t = candidates[rng.gen_range(0..candidates.len())];
                    chosen = Some((t, if as_head { t.tail } else { t.head }));
                    break;
                }
            }

            let Some((t, next)) = chosen else {
                frontier.swap_remove(slot);
                continue;
            };
            taken.insert(t);
            picked.push(t);
            if on_frontier.insert(next) {
                frontier.push(next);
            }
        }

        let sub = Subgraph::from_global(&picked);
        tracing::debug!(
            requested = triple_count,
            triples = sub.triples.len(),
            entities = sub.num_entities(),
            relations = sub.num_relations(),
            balance,
            "Compiled universe sub-graph"
        );
        Ok(sub)
    }

    fn deleted_triples(&self) -> Vec<Triple> {
        self.graph.deleted_triples().iter().copied().collect()
    }
}
