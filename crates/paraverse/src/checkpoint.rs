//! Ensemble checkpoints as single JSON documents.
//!
//! A checkpoint holds everything needed to resume: the store (models, id
//! tables, membership), the model settings and hyperparameter ranges,
//! early-stopping progress and the evaluation cache with its watermarks.
//! Sections added after the first layout are optional on read, so older
//! files still load; missing required sections fail with
//! [`Error::Serialization`].

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use paraverse_core::UniverseId;
use paraverse_kge::EmbeddingSpace;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::controller::EarlyStopping;
use crate::error::{Error, Result};
use crate::eval::EvalState;
use crate::factory::HyperparameterRanges;
use crate::store::EnsembleStore;

/// File name for a checkpoint taken at `next_universe_id`.
pub fn file_name(model: &str, next_universe_id: UniverseId, identifier: &str) -> String {
    format!("pu_{model}_learned_spaces-{next_universe_id}_{identifier}.json")
}

/// Borrowed view of a live ensemble, for writing without cloning.
#[derive(Debug, Serialize)]
pub struct CheckpointRef<'a, M> {
    pub initial_num_universes: usize,
    pub model: &'a str,
    pub model_config: &'a ModelConfig,
    pub store: &'a EnsembleStore<M>,
    pub ranges: &'a HyperparameterRanges,
    pub early_stopping: &'a EarlyStopping,
    pub eval: Option<&'a EvalState>,
}

impl<M: Serialize> CheckpointRef<'_, M> {
    /// Write into `dir` under [`file_name`]; returns the full path.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>, identifier: &str) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name(
            self.model,
            self.store.next_universe_id(),
            identifier,
        ));
        self.write(&path)?;
        Ok(path)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        tracing::info!(
            path = %path.display(),
            universes = self.store.next_universe_id(),
            "Saved checkpoint"
        );
        Ok(())
    }
}

/// An owned, decoded checkpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Checkpoint<M> {
    pub initial_num_universes: usize,
    pub model: String,
    #[serde(default)]
    pub model_config: Option<ModelConfig>,
    pub store: EnsembleStore<M>,
    pub ranges: HyperparameterRanges,
    #[serde(default)]
    pub early_stopping: EarlyStopping,
    #[serde(default)]
    pub eval: Option<EvalState>,
}

impl<M: DeserializeOwned + EmbeddingSpace> Checkpoint<M> {
    /// Decode a checkpoint file and check its tables agree.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let checkpoint: Self = serde_json::from_reader(reader)?;
        checkpoint.store.validate()?;
        if let Some(eval) = &checkpoint.eval {
            if eval.cache.num_entities() != checkpoint.store.num_entities() {
                return Err(Error::CorruptCheckpoint(format!(
                    "score cache over {} entities, store over {}",
                    eval.cache.num_entities(),
                    checkpoint.store.num_entities()
                )));
            }
        }
        tracing::info!(
            path = %path.display(),
            universes = checkpoint.store.next_universe_id(),
            "Loaded checkpoint"
        );
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{TrainedUniverse, UniverseParams};
    use ndarray::Array2;
    use paraverse_core::sampling::Subgraph;
    use paraverse_core::Triple;
    use paraverse_kge::{Norm, TransE};

    fn write_empty(path: &Path, extra: &str) {
        let store: EnsembleStore<TransE> = EnsembleStore::new(3, 1);
        let json = format!(
            r#"{{"initial_num_universes":5,"model":"TransE","store":{},"ranges":{}{extra}}}"#,
            serde_json::to_string(&store).unwrap(),
            serde_json::to_string(&HyperparameterRanges::default()).unwrap(),
        );
        fs::write(path, json).unwrap();
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            file_name("TransE", 25, "fb15k"),
            "pu_TransE_learned_spaces-25_fb15k.json"
        );
    }

    #[test]
    fn test_older_layout_loads_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        write_empty(&path, "");

        let ckpt: Checkpoint<TransE> = Checkpoint::read(&path).unwrap();
        assert_eq!(ckpt.early_stopping, EarlyStopping::default());
        assert!(ckpt.eval.is_none());
        assert_eq!(ckpt.store.next_universe_id(), 0);
    }

    #[test]
    fn test_missing_required_section_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"initial_num_universes":5,"model":"TransE"}"#).unwrap();
        assert!(matches!(
            Checkpoint::<TransE>::read(&path),
            Err(Error::Serialization(_))
        ));
    }

    fn one_universe(global: &[Triple]) -> EnsembleStore<TransE> {
        let subgraph = Subgraph::from_global(global);
        let model = TransE::from_embeddings(
            Array2::zeros((subgraph.num_entities(), 2)),
            Array2::zeros((subgraph.num_relations(), 2)),
            Norm::L1,
        )
        .unwrap();
        let mut store = EnsembleStore::new(3, 1);
        store
            .add(TrainedUniverse {
                subgraph,
                model,
                params: UniverseParams::default(),
            })
            .unwrap();
        store
    }

    #[test]
    fn test_model_smaller_than_its_id_table_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swapped.json");
        let mut wide = serde_json::to_value(one_universe(&[
            Triple::new(0, 0, 1),
            Triple::new(1, 0, 2),
        ]))
        .unwrap();
        let narrow = serde_json::to_value(one_universe(&[Triple::new(0, 0, 1)])).unwrap();
        wide["spaces"] = narrow["spaces"].clone();
        let json = format!(
            r#"{{"initial_num_universes":5,"model":"TransE","store":{wide},"ranges":{}}}"#,
            serde_json::to_string(&HyperparameterRanges::default()).unwrap(),
        );
        fs::write(&path, json).unwrap();

        assert!(matches!(
            Checkpoint::<TransE>::read(&path),
            Err(Error::CorruptCheckpoint(_))
        ));
    }

    #[test]
    fn test_cache_vocabulary_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let eval = serde_json::to_string(&EvalState::new(7)).unwrap();
        write_empty(&path, &format!(r#","eval":{eval}"#));
        assert!(matches!(
            Checkpoint::<TransE>::read(&path),
            Err(Error::CorruptCheckpoint(_))
        ));
    }
}
