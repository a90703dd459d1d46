//! Universe construction: sample a sub-graph, draw hyperparameters, train.
//!
//! Every universe is reproducible from its id alone. The factory reseeds a
//! [`ChaCha8Rng`] with `initial_seed + universe_id` and draws, in order:
//!
//! 1. triple count, uniform in `[min_triples, max_triples)`
//! 2. balance, uniform in `[min_balance, max_balance]`, rounded to 2 decimals
//! 3. the sub-graph itself (sampler)
//! 4. margin, integer uniform in `[min_margin, max_margin)`
//! 5. epochs, `const_num_epochs` or uniform in `[min_num_epochs, max_num_epochs)`
//! 6. learning rate, uniform in `[min_lr, max_lr]`, rounded to the number of
//!    decimals written in `min_lr`
//! 7. initial model parameters, then training

use paraverse_core::sampling::{Subgraph, UniverseSampler};
use paraverse_core::UniverseId;
use paraverse_kge::{ModelFactory, TrainParams, Trainer};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_min_balance() -> f64 {
    0.25
}

fn default_max_balance() -> f64 {
    0.5
}

/// Ranges the per-universe hyperparameters are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterRanges {
    pub min_margin: u32,
    pub max_margin: u32,
    pub min_lr: f64,
    pub max_lr: f64,
    pub min_num_epochs: usize,
    pub max_num_epochs: usize,
    /// Overrides the epoch range when set.
    #[serde(default)]
    pub const_num_epochs: Option<usize>,
    pub min_triples: usize,
    pub max_triples: usize,
    #[serde(default = "default_min_balance")]
    pub min_balance: f64,
    #[serde(default = "default_max_balance")]
    pub max_balance: f64,
}

impl Default for HyperparameterRanges {
    fn default() -> Self {
        Self {
            min_margin: 1,
            max_margin: 4,
            min_lr: 0.01,
            max_lr: 0.1,
            min_num_epochs: 50,
            max_num_epochs: 200,
            const_num_epochs: None,
            min_triples: 500,
            max_triples: 2000,
            min_balance: default_min_balance(),
            max_balance: default_max_balance(),
        }
    }
}

impl HyperparameterRanges {
    /// Reject ranges that cannot be sampled.
    pub fn validate(&self) -> Result<()> {
        if self.min_margin >= self.max_margin {
            return Err(Error::InvalidRange(format!(
                "margin [{}, {}) is empty",
                self.min_margin, self.max_margin
            )));
        }
        if !(self.min_lr.is_finite() && self.max_lr.is_finite())
            || self.min_lr <= 0.0
            || self.min_lr > self.max_lr
        {
            return Err(Error::InvalidRange(format!(
                "learning rate [{}, {}] must be positive and ordered",
                self.min_lr, self.max_lr
            )));
        }
        match self.const_num_epochs {
            Some(0) => {
                return Err(Error::InvalidRange("const_num_epochs must be positive".into()));
            }
            Some(_) => {}
            None if self.min_num_epochs == 0 || self.min_num_epochs >= self.max_num_epochs => {
                return Err(Error::InvalidRange(format!(
                    "epochs [{}, {}) is empty or starts at zero",
                    self.min_num_epochs, self.max_num_epochs
                )));
            }
            None => {}
        }
        if self.min_triples == 0 || self.min_triples >= self.max_triples {
            return Err(Error::InvalidRange(format!(
                "triple count [{}, {}) is empty or starts at zero",
                self.min_triples, self.max_triples
            )));
        }
        if !(0.0..=1.0).contains(&self.min_balance)
            || !(0.0..=1.0).contains(&self.max_balance)
            || self.min_balance > self.max_balance
        {
            return Err(Error::InvalidRange(format!(
                "balance [{}, {}] must be ordered within [0, 1]",
                self.min_balance, self.max_balance
            )));
        }
        Ok(())
    }
}

/// Hyperparameters actually drawn for one universe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniverseParams {
    /// Seed the universe was built from.
    pub seed: u64,
    /// Requested sub-graph size.
    pub triple_count: usize,
    /// Head/tail expansion balance.
    pub balance: f64,
    pub margin: u32,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Sub-graph actually sampled.
    pub num_triples: usize,
    pub num_entities: usize,
    pub num_relations: usize,
}

/// A freshly trained universe, not yet registered anywhere.
#[derive(Debug, Clone)]
pub struct TrainedUniverse<M> {
    /// Local triples and local → global remaps.
    pub subgraph: Subgraph,
    /// Trained model over the sub-graph's local ids.
    pub model: M,
    /// Drawn hyperparameters.
    pub params: UniverseParams,
}

/// Round to `decimals` places.
pub fn round_to(x: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (x * scale).round() / scale
}

/// Decimal places written in `x` (`0.01` → 2, `0.005` → 3, `1.0` → 0).
pub fn decimal_places(x: f64) -> u32 {
    let text = x.to_string();
    text.split_once('.')
        .map_or(0, |(_, fraction)| fraction.len() as u32)
}

/// Builds universes from a sampler, a model factory and a trainer.
///
/// # Example
///
/// ```rust
/// use paraverse::factory::{HyperparameterRanges, UniverseFactory};
/// use paraverse_core::sampling::BalancedSampler;
/// use paraverse_core::{KnowledgeGraph, Triple};
/// use paraverse_kge::{MarginTrainer, Norm, TransEFactory};
///
/// let kg = KnowledgeGraph::from_triples(6, 1, (0..5).map(|i| Triple::new(i, 0, i + 1))).unwrap();
/// let ranges = HyperparameterRanges {
///     min_triples: 2,
///     max_triples: 4,
///     const_num_epochs: Some(3),
///     ..Default::default()
/// };
/// let mut factory = UniverseFactory::new(
///     BalancedSampler::new(kg),
///     TransEFactory::new(4, Norm::L1),
///     MarginTrainer::default(),
///     ranges,
///     42,
/// )
/// .unwrap();
///
/// let universe = factory.build(0).unwrap();
/// assert!(universe.params.triple_count >= 2 && universe.params.triple_count < 4);
/// assert_eq!(universe.params.epochs, 3);
/// ```
#[derive(Debug, Clone)]
pub struct UniverseFactory<S, F, T> {
    sampler: S,
    model_factory: F,
    trainer: T,
    ranges: HyperparameterRanges,
    initial_seed: u64,
}

impl<S, F, T> UniverseFactory<S, F, T>
where
    S: UniverseSampler,
    F: ModelFactory,
    T: Trainer<F::Model>,
{
    /// Create a factory; invalid ranges are rejected here.
    pub fn new(
        sampler: S,
        model_factory: F,
        trainer: T,
        ranges: HyperparameterRanges,
        initial_seed: u64,
    ) -> Result<Self> {
        ranges.validate()?;
        Ok(Self {
            sampler,
            model_factory,
            trainer,
            ranges,
            initial_seed,
        })
    }

    pub fn ranges(&self) -> &HyperparameterRanges {
        &self.ranges
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Mutable sampler, for streaming updates to the training graph.
    pub fn sampler_mut(&mut self) -> &mut S {
        &mut self.sampler
    }

    pub fn model_factory(&self) -> &F {
        &self.model_factory
    }

    /// Seed used for universe `id`.
    pub fn seed_for(&self, id: UniverseId) -> u64 {
        self.initial_seed.wrapping_add(id as u64)
    }

    /// Draw size and balance, then sample a sub-graph.
    pub fn sample_universe<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<(Subgraph, UniverseParams)> {
        let r = &self.ranges;
        let triple_count = rng.gen_range(r.min_triples..r.max_triples);
        let balance = round_to(rng.gen_range(r.min_balance..=r.max_balance), 2);

        let subgraph = self
            .sampler
            .compile_universe(triple_count, balance, rng)
            .map_err(Error::Sampling)?;

        let params = UniverseParams {
            triple_count,
            balance,
            num_triples: subgraph.triples.len(),
            num_entities: subgraph.num_entities(),
            num_relations: subgraph.num_relations(),
            ..Default::default()
        };
        Ok((subgraph, params))
    }

    /// Draw training hyperparameters, build a fresh model and train it.
    pub fn train<R: Rng + ?Sized>(
        &self,
        subgraph: &Subgraph,
        params: &mut UniverseParams,
        rng: &mut R,
    ) -> Result<F::Model> {
        let r = &self.ranges;
        params.margin = rng.gen_range(r.min_margin..r.max_margin);
        params.epochs = match r.const_num_epochs {
            Some(epochs) => epochs,
            None => rng.gen_range(r.min_num_epochs..r.max_num_epochs),
        };
        params.learning_rate = round_to(
            rng.gen_range(r.min_lr..=r.max_lr),
            decimal_places(r.min_lr),
        );

        let mut model = self
            .model_factory
            .build(subgraph.num_entities(), subgraph.num_relations(), rng)
            .map_err(Error::Training)?;
        let train_params = TrainParams::new(
            params.epochs,
            params.learning_rate as f32,
            params.margin as f32,
        );
        let report = self
            .trainer
            .train(&mut model, &subgraph.triples, &train_params, rng)
            .map_err(Error::Training)?;

        tracing::debug!(final_loss = report.final_loss(), "universe model fitted");
        Ok(model)
    }

    /// Build universe `id` from its seed.
    pub fn build(&mut self, id: UniverseId) -> Result<TrainedUniverse<F::Model>> {
        let seed = self.seed_for(id);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let (subgraph, mut params) = self.sample_universe(&mut rng)?;
        params.seed = seed;
        let model = self.train(&subgraph, &mut params, &mut rng)?;

        tracing::info!(
            universe = id,
            seed,
            triples = params.num_triples,
            entities = params.num_entities,
            relations = params.num_relations,
            balance = params.balance,
            epochs = params.epochs,
            learning_rate = params.learning_rate,
            margin = params.margin,
            model = %self.model_factory.describe(),
            "Trained universe"
        );

        Ok(TrainedUniverse {
            subgraph,
            model,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paraverse_core::sampling::BalancedSampler;
    use paraverse_core::{KnowledgeGraph, Triple};
    use paraverse_kge::{MarginTrainer, Norm, TransEFactory};

    fn small_ranges() -> HyperparameterRanges {
        HyperparameterRanges {
            min_num_epochs: 2,
            max_num_epochs: 4,
            min_triples: 3,
            max_triples: 8,
            ..Default::default()
        }
    }

    fn factory(
        ranges: HyperparameterRanges,
    ) -> Result<UniverseFactory<BalancedSampler, TransEFactory, MarginTrainer>> {
        let mut triples = Vec::new();
        for i in 0..12u32 {
            triples.push(Triple::new(i, i % 2, (i + 1) % 12));
        }
        let kg = KnowledgeGraph::from_triples(12, 2, triples).unwrap();
        UniverseFactory::new(
            BalancedSampler::new(kg),
            TransEFactory::new(4, Norm::L1),
            MarginTrainer::default(),
            ranges,
            7,
        )
    }

    #[test]
    fn test_default_ranges_are_valid() {
        assert!(HyperparameterRanges::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let bad = [
            HyperparameterRanges { min_margin: 4, max_margin: 4, ..Default::default() },
            HyperparameterRanges { min_lr: 0.2, max_lr: 0.1, ..Default::default() },
            HyperparameterRanges { min_lr: 0.0, ..Default::default() },
            HyperparameterRanges { min_num_epochs: 9, max_num_epochs: 3, ..Default::default() },
            HyperparameterRanges { const_num_epochs: Some(0), ..Default::default() },
            HyperparameterRanges { min_triples: 10, max_triples: 10, ..Default::default() },
            HyperparameterRanges { max_balance: 1.5, ..Default::default() },
        ];
        for ranges in bad {
            assert!(matches!(factory(ranges), Err(Error::InvalidRange(_))));
        }
        // a fixed epoch count makes the epoch range irrelevant
        let fixed = HyperparameterRanges {
            min_num_epochs: 9,
            max_num_epochs: 3,
            const_num_epochs: Some(5),
            ..small_ranges()
        };
        assert!(factory(fixed).is_ok());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(decimal_places(0.01), 2);
        assert_eq!(decimal_places(0.005), 3);
        assert_eq!(decimal_places(1.0), 0);
        assert!((round_to(0.04567, 2) - 0.05).abs() < 1e-12);
        assert!((round_to(0.333333, 2) - 0.33).abs() < 1e-12);
    }

    #[test]
    fn test_drawn_params_respect_ranges() {
        let mut f = factory(small_ranges()).unwrap();
        for id in 0..5 {
            let u = f.build(id).unwrap();
            let p = &u.params;
            assert_eq!(p.seed, 7 + id as u64);
            assert!((3..8).contains(&p.triple_count));
            assert!((0.25..=0.5).contains(&p.balance));
            assert!((round_to(p.balance, 2) - p.balance).abs() < 1e-12);
            assert!((1..4).contains(&p.margin));
            assert!((2..4).contains(&p.epochs));
            assert!((0.01..=0.1).contains(&p.learning_rate));
            assert!((round_to(p.learning_rate, 2) - p.learning_rate).abs() < 1e-12);
            assert_eq!(p.num_entities, u.subgraph.num_entities());
        }
    }

    #[test]
    fn test_build_is_reproducible_per_id() {
        let mut a = factory(small_ranges()).unwrap();
        let mut b = factory(small_ranges()).unwrap();
        let _ = b.build(0).unwrap();

        let ua = a.build(3).unwrap();
        let ub = b.build(3).unwrap();
        assert_eq!(ua.params, ub.params);
        assert_eq!(ua.subgraph, ub.subgraph);
        assert_eq!(ua.model, ub.model);
    }
}
