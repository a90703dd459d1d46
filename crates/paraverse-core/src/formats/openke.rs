//! OpenKE benchmark layout.
//!
//! A dataset directory holds:
//!
//! ```text
//! entity2id.txt    <count>\n<name>\t<id>...
//! relation2id.txt  <count>\n<name>\t<id>...
//! train2id.txt     <count>\n<head> <tail> <relation>...
//! valid2id.txt     (same as train2id.txt)
//! test2id.txt      (same as train2id.txt)
//! ```
//!
//! Note the column order of the triple files: head, **tail**, relation.
//! Only the leading count of the vocabulary files is read; names are not
//! needed for id-level evaluation.

use crate::{Error, KnowledgeGraph, Result, Triple};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Train/valid/test splits over one vocabulary.
#[derive(Debug, Clone)]
pub struct OpenKeDataset {
    /// Entity vocabulary size.
    pub ent_tot: usize,
    /// Relation vocabulary size.
    pub rel_tot: usize,
    /// Training triples.
    pub train: Vec<Triple>,
    /// Validation triples (empty if `valid2id.txt` is absent).
    pub valid: Vec<Triple>,
    /// Test triples (empty if `test2id.txt` is absent).
    pub test: Vec<Triple>,
}

impl OpenKeDataset {
    /// Load a dataset directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let ent_tot = read_total(dir.join("entity2id.txt"))?;
        let rel_tot = read_total(dir.join("relation2id.txt"))?;
        let train = read_triples(dir.join("train2id.txt"))?;

        let optional = |name: &str| -> Result<Vec<Triple>> {
            let path = dir.join(name);
            if path.exists() {
                read_triples(path)
            } else {
                Ok(Vec::new())
            }
        };
        let valid = optional("valid2id.txt")?;
        let test = optional("test2id.txt")?;

        tracing::info!(
            dir = %dir.display(),
            ent_tot,
            rel_tot,
            train = train.len(),
            valid = valid.len(),
            test = test.len(),
            "Loaded OpenKE dataset"
        );

        Ok(Self {
            ent_tot,
            rel_tot,
            train,
            valid,
            test,
        })
    }

    /// Training graph with every id validated against the vocabulary.
    pub fn train_graph(&self) -> Result<KnowledgeGraph> {
        KnowledgeGraph::from_triples(self.ent_tot, self.rel_tot, self.train.iter().copied())
    }

    /// Every triple of every split, used for filtered ranking.
    pub fn all_triples(&self) -> impl Iterator<Item = &Triple> + '_ {
        self.train.iter().chain(&self.valid).chain(&self.test)
    }
}

/// Read the leading count of a vocabulary file.
pub fn read_total(path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let mut first = String::new();
    reader.read_line(&mut first)?;
    parse_number(first.trim(), path, 1)
}

/// Read a `<count>` + `head tail relation` triple file.
pub fn read_triples(path: impl AsRef<Path>) -> Result<Vec<Triple>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let declared = match lines.next() {
        Some(line) => parse_number(line?.trim(), path, 1)?,
        None => return Ok(Vec::new()),
    };

    let mut triples = Vec::with_capacity(declared);
    for (i, line) in lines.enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let lineno = i + 2;
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 3 {
            return Err(parse_error(path, lineno, "expected `head tail relation`"));
        }
        let head = parse_number(cols[0], path, lineno)? as u32;
        let tail = parse_number(cols[1], path, lineno)? as u32;
        let relation = parse_number(cols[2], path, lineno)? as u32;
        triples.push(Triple::new(head, relation, tail));
    }

    if triples.len() != declared {
        tracing::warn!(
            file = %path.display(),
            declared,
            found = triples.len(),
            "Triple count header does not match file contents"
        );
    }
    Ok(triples)
}

fn parse_number(raw: &str, path: &Path, line: usize) -> Result<usize> {
    raw.parse::<usize>()
        .map_err(|e| parse_error(path, line, &format!("`{raw}`: {e}")))
}

fn parse_error(path: &Path, line: usize, message: &str) -> Error {
    Error::Parse {
        file: path.display().to_string(),
        line,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_dataset(dir: &Path) {
        fs::write(dir.join("entity2id.txt"), "4\na\t0\nb\t1\nc\t2\nd\t3\n").unwrap();
        fs::write(dir.join("relation2id.txt"), "1\nr\t0\n").unwrap();
        fs::write(dir.join("train2id.txt"), "3\n0 1 0\n1 2 0\n2 3 0\n").unwrap();
        fs::write(dir.join("test2id.txt"), "1\n0 2 0\n").unwrap();
    }

    #[test]
    fn test_load_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());

        let ds = OpenKeDataset::load(dir.path()).unwrap();
        assert_eq!(ds.ent_tot, 4);
        assert_eq!(ds.rel_tot, 1);
        assert_eq!(ds.train.len(), 3);
        assert!(ds.valid.is_empty());
        // head tail relation column order
        assert_eq!(ds.test, vec![Triple::new(0, 0, 2)]);
        assert_eq!(ds.all_triples().count(), 4);

        let kg = ds.train_graph().unwrap();
        assert_eq!(kg.triple_count(), 3);
    }

    #[test]
    fn test_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "1\n0 x 0\n").unwrap();

        match read_triples(&path) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
