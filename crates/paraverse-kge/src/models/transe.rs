//! TransE: Relations as Translations.
//!
//! TransE ([Bordes et al. 2013](https://papers.nips.cc/paper/2013/hash/1cecc7a77928ca8133fa24680a88d2f9-Abstract.html))
//! interprets relations as translations in embedding space:
//!
//! ```text
//! h + r ≈ t  (if the triple is true)
//! ```
//!
//! # Energy
//!
//! E = ||h + r - t||ₚ, lower = more plausible.
//!
//! # Training
//!
//! See [`MarginTrainer`](crate::MarginTrainer): margin ranking loss with
//! corrupted heads/tails,
//!
//! ```text
//! L = max(0, margin + E(h, r, t) - E(h', r, t'))
//! ```

use crate::error::{Error, Result};
use crate::model::{Direction, EmbeddingSpace, ModelFactory};
use crate::scoring::Norm;
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut2, Axis};
use paraverse_core::LocalId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// TransE model over dense local ids.
///
/// Row `i` of each matrix is the embedding of local id `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransE {
    /// Residual norm.
    norm: Norm,
    /// Entity embeddings, shape `(num_entities, dim)`.
    entity_embeddings: Array2<f32>,
    /// Relation embeddings, shape `(num_relations, dim)`.
    relation_embeddings: Array2<f32>,
}

impl TransE {
    /// Create a randomly initialized model.
    ///
    /// Parameters are drawn uniformly from `±6/√dim` and entity rows are
    /// L2-normalized.
    pub fn new<R: Rng + ?Sized>(
        num_entities: usize,
        num_relations: usize,
        dim: usize,
        norm: Norm,
        rng: &mut R,
    ) -> Self {
        let bound = 6.0 / (dim.max(1) as f32).sqrt();
        let mut draw = |rows: usize| {
            Array2::from_shape_simple_fn((rows, dim), || rng.gen_range(-bound..=bound))
        };
        let entity_embeddings = draw(num_entities);
        let relation_embeddings = draw(num_relations);

        let mut model = Self {
            norm,
            entity_embeddings,
            relation_embeddings,
        };
        model.normalize_entities();
        model
    }

    /// Create from pre-trained embedding matrices.
    pub fn from_embeddings(
        entity_embeddings: Array2<f32>,
        relation_embeddings: Array2<f32>,
        norm: Norm,
    ) -> Result<Self> {
        let dim = entity_embeddings.ncols();
        if relation_embeddings.ncols() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                actual: relation_embeddings.ncols(),
            });
        }
        Ok(Self {
            norm,
            entity_embeddings,
            relation_embeddings,
        })
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.entity_embeddings.ncols()
    }

    /// Residual norm.
    pub fn norm(&self) -> Norm {
        self.norm
    }

    /// Embedding of a local entity. Panics if out of range.
    pub fn entity(&self, id: LocalId) -> ArrayView1<'_, f32> {
        self.entity_embeddings.row(id as usize)
    }

    /// Embedding of a local relation. Panics if out of range.
    pub fn relation(&self, id: LocalId) -> ArrayView1<'_, f32> {
        self.relation_embeddings.row(id as usize)
    }

    /// Both parameter matrices, mutably (entities, relations).
    pub(crate) fn parameters_mut(&mut self) -> (ArrayViewMut2<'_, f32>, ArrayViewMut2<'_, f32>) {
        (
            self.entity_embeddings.view_mut(),
            self.relation_embeddings.view_mut(),
        )
    }

    /// Project entity rows back onto the unit L2 sphere.
    pub(crate) fn normalize_entities(&mut self) {
        for mut row in self.entity_embeddings.axis_iter_mut(Axis(0)) {
            let n = row.dot(&row).sqrt();
            if n > 1e-8 {
                row.mapv_inplace(|x| x / n);
            }
        }
    }
}

impl EmbeddingSpace for TransE {
    fn name(&self) -> &'static str {
        "TransE"
    }

    fn num_entities(&self) -> usize {
        self.entity_embeddings.nrows()
    }

    fn num_relations(&self) -> usize {
        self.relation_embeddings.nrows()
    }

    fn score(&self, head: LocalId, relation: LocalId, tail: LocalId) -> f32 {
        self.norm
            .energy(self.entity(head), self.relation(relation), self.entity(tail))
    }

    fn score_null(&self, entity: LocalId, relation: LocalId, direction: Direction) -> f32 {
        let e = self.entity(entity);
        let r = self.relation(relation);
        match direction {
            // || h + r - 0 ||
            Direction::TailBatch => self.norm.reduce(e.iter().zip(r.iter()).map(|(h, r)| h + r)),
            // || 0 + r - t ||
            Direction::HeadBatch => self.norm.reduce(r.iter().zip(e.iter()).map(|(r, t)| r - t)),
        }
    }

    fn predict_batch(&self, entity: LocalId, relation: LocalId, direction: Direction) -> Vec<f32> {
        let e = self.entity(entity);
        let r = self.relation(relation);
        // every candidate c scores || q - c || for the direction's anchor q
        let anchor: Array1<f32> = match direction {
            Direction::TailBatch => &e + &r,
            Direction::HeadBatch => &e - &r,
        };
        self.entity_embeddings
            .outer_iter()
            .map(|c| self.norm.reduce(anchor.iter().zip(c.iter()).map(|(q, c)| q - c)))
            .collect()
    }
}

/// Builds [`TransE`] models of a fixed width and norm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransEFactory {
    /// Embedding dimension.
    pub dim: usize,
    /// Residual norm.
    pub norm: Norm,
}

impl TransEFactory {
    /// Create a factory.
    pub fn new(dim: usize, norm: Norm) -> Self {
        Self { dim, norm }
    }

    /// Create a factory from the conventional `p_norm` integer.
    pub fn with_p_norm(dim: usize, p_norm: u32) -> Result<Self> {
        let norm = Norm::from_p(p_norm)
            .ok_or_else(|| Error::Validation(format!("p_norm must be 1 or 2, got {p_norm}")))?;
        Ok(Self::new(dim, norm))
    }
}

impl ModelFactory for TransEFactory {
    type Model = TransE;

    fn build<R: Rng + ?Sized>(
        &self,
        num_entities: usize,
        num_relations: usize,
        rng: &mut R,
    ) -> Result<TransE> {
        if self.dim == 0 {
            return Err(Error::Validation("embedding dimension must be positive".into()));
        }
        if num_entities == 0 || num_relations == 0 {
            return Err(Error::Validation(format!(
                "cannot size a model for {num_entities} entities and {num_relations} relations"
            )));
        }
        Ok(TransE::new(num_entities, num_relations, self.dim, self.norm, rng))
    }

    fn describe(&self) -> String {
        format!("TransE(dim={}, p_norm={})", self.dim, self.norm.p())
    }
}
