//! Paraverse CLI - grow and evaluate parallel-universe embedding ensembles.
//!
//! # Usage
//!
//! ```bash
//! # Train universes on an OpenKE dataset directory
//! paraverse train data/FB15K237 --universes 200 --checkpoint-dir ckpt/
//!
//! # Link prediction (and optionally triple classification) from a checkpoint
//! paraverse test data/FB15K237 ckpt/pu_TransE_learned_spaces-200_.json --classification
//!
//! # Combine ensembles trained separately
//! paraverse merge out/ a.json b.json --identifier combined
//!
//! # Inspect a checkpoint
//! paraverse stats ckpt/pu_TransE_learned_spaces-200_.json
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `paraverse=info`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use paraverse::eval::LabelledTriples;
use paraverse::{
    Ensemble, EnsembleConfig, IncrementalStrategy, MissingEmbeddingHandling, TrainingSetting,
    Validation,
};
use paraverse_core::formats::openke::OpenKeDataset;
use paraverse_core::sampling::BalancedSampler;
use paraverse_core::{IdKind, Triple};
use paraverse_kge::classification::corrupt_triples;
use paraverse_kge::evaluation::RankingEvaluator;
use paraverse_kge::TransE;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "paraverse")]
#[command(about = "Parallel-universe knowledge graph embeddings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct EnsembleArgs {
    /// JSON config file (absent keys keep their defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Score for entities no relevant universe knows
    #[arg(long)]
    missing: Option<Missing>,

    /// Static or incremental evaluation
    #[arg(long)]
    setting: Option<Setting>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train universes on an OpenKE dataset
    Train {
        /// Dataset directory (entity2id.txt, relation2id.txt, train2id.txt, ...)
        data: PathBuf,

        #[command(flatten)]
        ensemble: EnsembleArgs,

        /// Universes to train (default: initial_num_universes)
        #[arg(short, long)]
        universes: Option<usize>,

        /// Continue from this checkpoint
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Checkpoint directory
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Disable checkpointing
        #[arg(long, conflicts_with = "checkpoint_dir")]
        no_checkpoint: bool,

        /// Seed of universe 0
        #[arg(long)]
        seed: Option<u64>,

        /// Suffix of checkpoint file names
        #[arg(long)]
        identifier: Option<String>,
    },

    /// Evaluate a checkpoint on the test split
    Test {
        /// Dataset directory
        data: PathBuf,

        /// Checkpoint file
        checkpoint: PathBuf,

        #[command(flatten)]
        ensemble: EnsembleArgs,

        /// Also run triple classification
        #[arg(long)]
        classification: bool,
    },

    /// Merge checkpoints into one ensemble
    Merge {
        /// Directory for the merged checkpoint
        output: PathBuf,

        /// Checkpoints, in order; the first is the base
        #[arg(required = true, num_args = 2..)]
        checkpoints: Vec<PathBuf>,

        /// Suffix of the merged checkpoint's file name
        #[arg(long, default_value = "merged")]
        identifier: String,
    },

    /// Show statistics about a checkpoint
    Stats {
        /// Checkpoint file
        checkpoint: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Missing {
    /// Rank behind every scored entity
    LastRank,
    /// Best null-vector energy of the query
    NullVector,
}

#[derive(Clone, Copy, ValueEnum)]
enum Setting {
    /// Fixed training data; caches persist between passes
    Static,
    /// Changing training data; every pass starts fresh
    Incremental,
    /// Incremental, skipping universes that hold deleted triples
    Deprecate,
}

fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paraverse=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data,
            ensemble,
            universes,
            resume,
            checkpoint_dir,
            no_checkpoint,
            seed,
            identifier,
        } => {
            let mut config = ensemble.load()?;
            if no_checkpoint {
                config.checkpoint_dir = None;
            } else if checkpoint_dir.is_some() {
                config.checkpoint_dir = checkpoint_dir;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(id) = identifier {
                config.training_identifier = id;
            }
            cmd_train(&data, config, universes, resume.as_deref())
        }
        Commands::Test {
            data,
            checkpoint,
            ensemble,
            classification,
        } => cmd_test(&data, &checkpoint, ensemble.load()?, classification),
        Commands::Merge {
            output,
            checkpoints,
            identifier,
        } => cmd_merge(&output, &checkpoints, &identifier),
        Commands::Stats { checkpoint } => cmd_stats(&checkpoint),
    }
}

impl EnsembleArgs {
    fn load(&self) -> Result<EnsembleConfig> {
        let mut config = match &self.config {
            Some(path) => EnsembleConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EnsembleConfig::default(),
        };
        if let Some(missing) = self.missing {
            config.missing_embedding_handling = match missing {
                Missing::LastRank => MissingEmbeddingHandling::LastRank,
                Missing::NullVector => MissingEmbeddingHandling::NullVector,
            };
        }
        if let Some(setting) = self.setting {
            config = config.with_setting(match setting {
                Setting::Static => TrainingSetting::Static,
                Setting::Incremental => TrainingSetting::Incremental(IncrementalStrategy::Normal),
                Setting::Deprecate => TrainingSetting::Incremental(IncrementalStrategy::Deprecate),
            });
        }
        Ok(config)
    }
}

fn load_dataset(dir: &Path) -> Result<OpenKeDataset> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", dir.display()));

    let ds = OpenKeDataset::load(dir)
        .with_context(|| format!("Failed to load dataset {}", dir.display()))?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    Ok(ds)
}

fn load_ensemble(path: &Path, config: EnsembleConfig) -> Result<Ensemble<TransE>> {
    Ensemble::checkpoint_load(path, config)
        .with_context(|| format!("Failed to load checkpoint {}", path.display()))
}

fn filter_set(ds: &OpenKeDataset) -> RankingEvaluator {
    let mut evaluator = RankingEvaluator::new();
    evaluator.add_known_triples(ds.all_triples().copied());
    evaluator
}

fn cmd_train(
    data: &Path,
    config: EnsembleConfig,
    universes: Option<usize>,
    resume: Option<&Path>,
) -> Result<()> {
    let ds = load_dataset(data)?;
    let mut ensemble = match resume {
        Some(path) => load_ensemble(path, config)?,
        None => Ensemble::new(config, ds.ent_tot, ds.rel_tot)?,
    };
    if (ensemble.store().num_entities(), ensemble.store().num_relations())
        != (ds.ent_tot, ds.rel_tot)
    {
        bail!(
            "checkpoint vocabulary {}x{} does not match dataset {}x{}",
            ensemble.store().num_entities(),
            ensemble.store().num_relations(),
            ds.ent_tot,
            ds.rel_tot
        );
    }

    let graph = ds.train_graph().context("Invalid training split")?;
    let mut factory = ensemble
        .config()
        .universe_factory(BalancedSampler::new(graph))?;
    let n = universes.unwrap_or(ensemble.config().initial_num_universes);

    let evaluator = filter_set(&ds);
    let validation = (!ds.valid.is_empty()).then_some(Validation {
        queries: &ds.valid,
        evaluator: &evaluator,
    });

    let start = Instant::now();
    let pb = ProgressBar::new(n as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} universes ({elapsed})") {
        pb.set_style(style);
    }
    let summary = ensemble.train_universes(n, &mut factory, validation, |_| pb.inc(1))?;
    pb.finish_and_clear();

    println!("Training Summary");
    println!("================");
    println!("Universes trained: {}", summary.trained);
    println!("Total universes:   {}", ensemble.next_universe_id());
    println!("Best valid Hits@10: {:.4}", summary.best_hit10);
    println!("Stopped early:     {}", summary.stopped_early);
    println!("Elapsed:           {:.2?}", start.elapsed());

    if let Some(dir) = ensemble.config().checkpoint_dir.clone() {
        let path = ensemble.checkpoint_save(&dir)?;
        println!("Checkpoint:        {}", path.display());
    }
    Ok(())
}

fn cmd_test(data: &Path, checkpoint: &Path, config: EnsembleConfig, classification: bool) -> Result<()> {
    let ds = load_dataset(data)?;
    let seed = config.seed;
    let mut ensemble = load_ensemble(checkpoint, config)?;
    if ds.test.is_empty() {
        bail!("dataset {} has no test split", data.display());
    }

    let evaluator = filter_set(&ds);
    let metrics = ensemble.link_prediction(&ds.test, &evaluator, &[]);

    println!("Link Prediction");
    println!("===============");
    println!("Mean Reciprocal Rank: {:.4}", metrics.mrr);
    println!("Mean Rank:            {:.1}", metrics.mr);
    println!("Hits@10:              {:.4}", metrics.hits_at_10);
    println!("Hits@3:               {:.4}", metrics.hits_at_3);
    println!("Hits@1:               {:.4}", metrics.hits_at_1);

    if classification {
        let known: HashSet<Triple> = ds.all_triples().copied().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut labelled = |triples: &[Triple]| LabelledTriples {
            positive: triples.to_vec(),
            negative: corrupt_triples(triples, &known, ds.ent_tot, &mut rng),
        };
        let valid = labelled(&ds.valid);
        let test = labelled(&ds.test);

        match ensemble.triple_classification(&valid, &test, &[]) {
            Some(report) => {
                println!();
                println!("Triple Classification");
                println!("=====================");
                println!("Threshold: {:.4}", report.threshold.threshold);
                println!("Accuracy:  {:.4}", report.test_accuracy);
            }
            None => bail!("triple classification needs a validation split"),
        }
    }
    Ok(())
}

fn cmd_merge(output: &Path, checkpoints: &[PathBuf], identifier: &str) -> Result<()> {
    let config = EnsembleConfig::default().with_training_identifier(identifier);
    let (base, rest) = checkpoints
        .split_first()
        .context("no checkpoints given")?;

    let mut ensemble = load_ensemble(base, config.clone())?;
    for path in rest {
        let other = load_ensemble(path, config.clone())?;
        ensemble
            .merge(other)
            .with_context(|| format!("Failed to merge {}", path.display()))?;
    }

    let path = ensemble.checkpoint_save(output)?;
    println!("Merged {} checkpoints ({} universes)", checkpoints.len(), ensemble.next_universe_id());
    println!("Saved to {}", path.display());
    Ok(())
}

fn cmd_stats(checkpoint: &Path) -> Result<()> {
    let ensemble = load_ensemble(checkpoint, EnsembleConfig::default())?;
    let store = ensemble.store();

    let n = store.next_universe_id();
    let (mut triples, mut entities) = (0usize, 0usize);
    for u in 0..n {
        if let Some(p) = store.params(u) {
            triples += p.num_triples;
            entities += p.num_entities;
        }
    }
    let avg = |total: usize| if n == 0 { 0.0 } else { total as f64 / n as f64 };

    println!("Ensemble Statistics");
    println!("===================");
    println!("Universes:            {n}");
    println!("Entities:             {}", store.num_entities());
    println!("Relations:            {}", store.num_relations());
    println!("Avg triples/universe: {:.1}", avg(triples));
    println!("Avg entities/universe: {:.1}", avg(entities));
    println!(
        "Unembedded entities:  {:.2}%",
        100.0 * ensemble.unembedded_ratio(IdKind::Entity)
    );
    println!(
        "Unembedded relations: {:.2}%",
        100.0 * ensemble.unembedded_ratio(IdKind::Relation)
    );
    println!("Best valid Hits@10:   {:.4}", ensemble.early_stopping().best_hit10);
    Ok(())
}
