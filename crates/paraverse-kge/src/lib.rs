//! Single-universe knowledge graph embeddings.
//!
//! The ensemble in `paraverse` treats one trained universe as an opaque
//! **energy function** over universe-local ids: lower energy means a more
//! plausible triple (margin-based convention). This crate defines that
//! contract and the collaborators around it:
//!
//! | Contract | Reference implementation |
//! |----------|--------------------------|
//! | [`EmbeddingSpace`] | [`TransE`] (ndarray) |
//! | [`ModelFactory`] | [`TransEFactory`] |
//! | [`Trainer`] | [`MarginTrainer`] (SGD, margin ranking loss) |
//! | rank evaluation | [`evaluation::RankingEvaluator`] |
//!
//! ## TransE as an energy
//!
//! ```text
//!   E(h, r, t) = || h + r - t ||_p
//! ```
//!
//! A true triple sits near zero. Batched queries fix one side and scan every
//! local entity on the other, returning one energy per local id.
//!
//! ## Null-vector scoring
//!
//! For candidates a universe has never seen, the ensemble may substitute a
//! zero vector for the missing entity:
//!
//! ```text
//!   tail batch: E(h, r, 0) = || h + r ||_p
//!   head batch: E(0, r, t) = || r - t ||_p
//! ```
//!
//! ## Example
//!
//! ```rust
//! use paraverse_kge::{Direction, EmbeddingSpace, ModelFactory, Norm, TransEFactory};
//! use rand::SeedableRng;
//!
//! let factory = TransEFactory::new(8, Norm::L1);
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
//! let model = factory.build(5, 2, &mut rng).unwrap();
//!
//! let energies = model.predict_batch(0, 1, Direction::TailBatch);
//! assert_eq!(energies.len(), 5);
//! assert!((energies[3] - model.score(0, 1, 3)).abs() < 1e-5);
//! ```

mod error;
mod model;
mod scoring;

pub mod classification;
pub mod evaluation;
pub mod models;
pub mod training;

pub use error::{Error, Result};
pub use model::{Direction, EmbeddingSpace, ModelFactory};
pub use models::{TransE, TransEFactory};
pub use scoring::Norm;
pub use training::{MarginTrainer, TrainParams, Trainer, TrainingConfig};
