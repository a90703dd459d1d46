//! Parallel-universe ensembles of knowledge graph embeddings.
//!
//! Instead of embedding a whole knowledge graph at once, `paraverse` trains
//! many small embedding models ("universes"), each on a randomly sampled
//! sub-graph with randomly drawn hyperparameters, and answers queries by
//! combining whichever universes know the entities involved.
//!
//! ```text
//!   UniverseFactory ── build(id) ──▶ EnsembleStore::add
//!        (sample, draw, train)        (freeze, remap, index)
//!                                           │
//!   EvaluationDriver ── populate ──▶ ScoreAggregator ──▶ ScoreCache
//!        (static / incremental)        (min-fold)          (per query)
//!                                           │
//!   EarlyStopping ◀── Hits@10 ─── RankingEvaluator
//! ```
//!
//! Energies follow the margin convention: lower is more plausible, and
//! `+inf` means no universe could score the candidate.
//!
//! # Example
//!
//! ```rust
//! use paraverse::factory::HyperparameterRanges;
//! use paraverse::{Ensemble, EnsembleConfig};
//! use paraverse_core::sampling::BalancedSampler;
//! use paraverse_core::{KnowledgeGraph, Triple};
//! use paraverse_kge::evaluation::RankingEvaluator;
//! use paraverse_kge::TransE;
//!
//! let triples: Vec<Triple> = (0..9).map(|i| Triple::new(i, 0, i + 1)).collect();
//! let kg = KnowledgeGraph::from_triples(10, 1, triples.clone()).unwrap();
//!
//! let config = EnsembleConfig::default()
//!     .with_ranges(HyperparameterRanges {
//!         min_triples: 3,
//!         max_triples: 6,
//!         const_num_epochs: Some(10),
//!         ..Default::default()
//!     })
//!     .with_checkpoint_dir(None);
//! let mut factory = config.universe_factory(BalancedSampler::new(kg)).unwrap();
//! let mut ensemble: Ensemble<TransE> = Ensemble::new(config, 10, 1).unwrap();
//!
//! ensemble.train_universes(4, &mut factory, None, |_| {}).unwrap();
//! let metrics = ensemble.link_prediction(&triples[..3], &RankingEvaluator::new(), &[]);
//! assert_eq!(metrics.num_ranks, 6);
//! ```

mod error;

pub mod aggregate;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod ensemble;
pub mod eval;
pub mod factory;
pub mod membership;
pub mod remap;
pub mod store;

pub use aggregate::{MissingEmbeddingHandling, ScoreAggregator};
pub use cache::{CacheKey, ScoreCache};
pub use config::{EnsembleConfig, ModelConfig, TrainingMode};
pub use controller::{EarlyStopping, Verdict};
pub use ensemble::{Ensemble, TrainSummary, Validation};
pub use error::{Error, Result};
pub use eval::{EvalMode, EvaluationDriver, IncrementalStrategy, TrainingSetting};
pub use factory::{HyperparameterRanges, TrainedUniverse, UniverseFactory};
pub use membership::MembershipIndex;
pub use remap::IdRemapper;
pub use store::EnsembleStore;
