//! Per-universe training.
//!
//! A universe is trained once, right after it is sampled, and then frozen.
//! The ensemble only needs the [`Trainer`] contract; [`MarginTrainer`] is the
//! reference SGD loop for [`TransE`]:
//!
//! 1. Shuffle the local triples, walk them in batches
//! 2. For each positive (h, r, t) corrupt the head or the tail
//! 3. Loss = max(0, margin + E(h, r, t) - E(h', r, t'))
//! 4. Step both triples along the norm's subgradient
//! 5. Project entity embeddings back onto the unit sphere after each epoch
//!
//! # Example
//!
//! ```rust
//! use paraverse_core::Triple;
//! use paraverse_kge::{MarginTrainer, ModelFactory, Norm, TrainParams, Trainer, TrainingConfig, TransEFactory};
//! use rand::SeedableRng;
//!
//! let triples = vec![Triple::new(0, 0, 1), Triple::new(1, 0, 2)];
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
//! let mut model = TransEFactory::new(8, Norm::L1).build(3, 1, &mut rng).unwrap();
//!
//! let trainer = MarginTrainer::new(TrainingConfig::default().with_batch_size(2));
//! let params = TrainParams::new(5, 0.01, 1.0);
//! let report = trainer.train(&mut model, &triples, &params, &mut rng).unwrap();
//! assert_eq!(report.loss_history.len(), 5);
//! ```

use crate::error::{Error, Result};
use crate::model::EmbeddingSpace;
use crate::models::TransE;
use paraverse_core::Triple;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Trainer settings that stay fixed across universes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Positive triples per batch (default: 100).
    pub batch_size: usize,
    /// Corrupted triples per positive (default: 1).
    pub negative_samples: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            negative_samples: 1,
        }
    }
}

impl TrainingConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_negative_samples(mut self, n: usize) -> Self {
        self.negative_samples = n;
        self
    }
}

/// Hyperparameters drawn per universe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainParams {
    /// Passes over the universe's triples.
    pub epochs: usize,
    /// SGD step size.
    pub learning_rate: f32,
    /// Margin of the ranking loss.
    pub margin: f32,
}

impl TrainParams {
    pub fn new(epochs: usize, learning_rate: f32, margin: f32) -> Self {
        Self {
            epochs,
            learning_rate,
            margin,
        }
    }
}

/// Outcome of one training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    /// Mean loss per epoch.
    pub loss_history: Vec<f32>,
}

impl TrainingReport {
    /// Mean loss of the last epoch, if any epoch ran.
    pub fn final_loss(&self) -> Option<f32> {
        self.loss_history.last().copied()
    }
}

/// Trains a freshly built model in place.
pub trait Trainer<M: EmbeddingSpace> {
    /// Fit `model` to `triples` (universe-local ids).
    ///
    /// All randomness must come from `rng`.
    fn train<R: Rng + ?Sized>(
        &self,
        model: &mut M,
        triples: &[Triple],
        params: &TrainParams,
        rng: &mut R,
    ) -> Result<TrainingReport>;
}

/// Margin ranking loss with plain SGD.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarginTrainer {
    config: TrainingConfig,
}

impl MarginTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn validate(&self, model: &TransE, triples: &[Triple], params: &TrainParams) -> Result<()> {
        if triples.is_empty() {
            return Err(Error::Validation("no triples to train on".into()));
        }
        if self.config.batch_size == 0 || self.config.negative_samples == 0 {
            return Err(Error::Validation(
                "batch_size and negative_samples must be positive".into(),
            ));
        }
        if !(params.learning_rate.is_finite() && params.learning_rate > 0.0) {
            return Err(Error::Validation(format!(
                "learning rate must be positive, got {}",
                params.learning_rate
            )));
        }
        let (ne, nr) = (model.num_entities(), model.num_relations());
        if let Some(t) = triples.iter().find(|t| {
            t.head as usize >= ne || t.tail as usize >= ne || t.relation as usize >= nr
        }) {
            return Err(Error::Validation(format!(
                "triple {t} outside a model of {ne} entities and {nr} relations"
            )));
        }
        Ok(())
    }
}

/// Replace the head or the tail with a different random entity.
fn corrupt<R: Rng + ?Sized>(t: Triple, num_entities: usize, rng: &mut R) -> Triple {
    let n = num_entities as u32;
    let pick = |original: u32, rng: &mut R| {
        let c = rng.gen_range(0..n);
        if c == original {
            (c + 1) % n
        } else {
            c
        }
    };
    if rng.gen_bool(0.5) {
        Triple::new(pick(t.head, rng), t.relation, t.tail)
    } else {
        Triple::new(t.head, t.relation, pick(t.tail, rng))
    }
}

/// `h + r - t` into `out`.
fn residual(model: &TransE, t: Triple, out: &mut [f32]) {
    let h = model.entity(t.head);
    let r = model.relation(t.relation);
    let tl = model.entity(t.tail);
    for (i, o) in out.iter_mut().enumerate() {
        *o = h[i] + r[i] - tl[i];
    }
}

impl Trainer<TransE> for MarginTrainer {
    fn train<R: Rng + ?Sized>(
        &self,
        model: &mut TransE,
        triples: &[Triple],
        params: &TrainParams,
        rng: &mut R,
    ) -> Result<TrainingReport> {
        self.validate(model, triples, params)?;

        let dim = model.dim();
        let norm = model.norm();
        let num_entities = model.num_entities();
        let lr = params.learning_rate;

        let mut pos_res = vec![0.0f32; dim];
        let mut neg_res = vec![0.0f32; dim];
        let mut pos_grad = vec![0.0f32; dim];
        let mut neg_grad = vec![0.0f32; dim];

        let mut order: Vec<usize> = (0..triples.len()).collect();
        let mut report = TrainingReport {
            loss_history: Vec::with_capacity(params.epochs),
        };

        for epoch in 0..params.epochs {
            order.shuffle(rng);
            let mut epoch_loss = 0.0f32;
            let mut terms = 0usize;

            for batch in order.chunks(self.config.batch_size) {
                for &idx in batch {
                    let pos = triples[idx];
                    for _ in 0..self.config.negative_samples {
                        let neg = corrupt(pos, num_entities, rng);

                        residual(model, pos, &mut pos_res);
                        residual(model, neg, &mut neg_res);
                        let loss = (params.margin + norm.reduce(pos_res.iter().copied())
                            - norm.reduce(neg_res.iter().copied()))
                        .max(0.0);
                        epoch_loss += loss;
                        terms += 1;
                        if loss <= 0.0 {
                            continue;
                        }

                        norm.gradient(&pos_res, &mut pos_grad);
                        norm.gradient(&neg_res, &mut neg_grad);

                        let (mut ents, mut rels) = model.parameters_mut();
                        let (ph, pr, pt) =
                            (pos.head as usize, pos.relation as usize, pos.tail as usize);
                        let (nh, nr, nt) =
                            (neg.head as usize, neg.relation as usize, neg.tail as usize);
                        for i in 0..dim {
                            // pull the positive together
                            ents[[ph, i]] -= lr * pos_grad[i];
                            rels[[pr, i]] -= lr * pos_grad[i];
                            ents[[pt, i]] += lr * pos_grad[i];
                            // push the negative apart
                            ents[[nh, i]] += lr * neg_grad[i];
                            rels[[nr, i]] += lr * neg_grad[i];
                            ents[[nt, i]] -= lr * neg_grad[i];
                        }
                    }
                }
            }

            model.normalize_entities();

            let avg_loss = epoch_loss / terms.max(1) as f32;
            if !avg_loss.is_finite() {
                return Err(Error::Training(format!(
                    "loss diverged at epoch {epoch} (lr = {lr}, margin = {})",
                    params.margin
                )));
            }
            tracing::trace!(epoch, loss = avg_loss, "epoch finished");
            report.loss_history.push(avg_loss);
        }

        tracing::debug!(
            epochs = params.epochs,
            triples = triples.len(),
            final_loss = report.final_loss(),
            "universe trained"
        );
        Ok(report)
    }
}
