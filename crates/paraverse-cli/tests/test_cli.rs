use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

/// A 12-entity ring under two alternating relations, OpenKE layout.
fn write_dataset(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let rows = |triples: &[(u32, u32, u32)]| {
        let mut s = format!("{}\n", triples.len());
        for (h, t, r) in triples {
            s.push_str(&format!("{h} {t} {r}\n"));
        }
        s
    };
    let train: Vec<(u32, u32, u32)> = (0..12).map(|i| (i, (i + 1) % 12, i % 2)).collect();
    fs::write(dir.join("entity2id.txt"), "12\n")?;
    fs::write(dir.join("relation2id.txt"), "2\n")?;
    fs::write(dir.join("train2id.txt"), rows(&train))?;
    fs::write(dir.join("valid2id.txt"), rows(&[(0, 1, 0), (3, 4, 1)]))?;
    fs::write(dir.join("test2id.txt"), rows(&[(6, 7, 0), (9, 10, 1)]))?;
    Ok(())
}

fn write_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(
        path,
        r#"{
            "ranges": { "min_margin": 1, "max_margin": 3, "min_lr": 0.01, "max_lr": 0.05,
                        "min_num_epochs": 5, "max_num_epochs": 10,
                        "min_triples": 4, "max_triples": 8 },
            "valid_steps": 2,
            "save_steps": 0,
            "model": { "dim": 8, "batch_size": 4 }
        }"#,
    )?;
    Ok(())
}

fn train(data: &Path, config: &Path, ckpt: &Path, seed: &str, id: &str) -> Command {
    let mut cmd = Command::cargo_bin("paraverse").unwrap();
    cmd.arg("train")
        .arg(data)
        .arg("--config")
        .arg(config)
        .arg("--universes")
        .arg("4")
        .arg("--checkpoint-dir")
        .arg(ckpt)
        .arg("--seed")
        .arg(seed)
        .arg("--identifier")
        .arg(id);
    cmd
}

#[test]
fn test_cli_train_test_stats() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    write_dataset(tmp.path())?;
    let config = tmp.path().join("config.json");
    write_config(&config)?;
    let ckpt_dir = tmp.path().join("ckpt");

    train(tmp.path(), &config, &ckpt_dir, "42", "cli")
        .assert()
        .success()
        .stdout(predicate::str::contains("Universes trained: 4"));

    let ckpt = ckpt_dir.join("pu_TransE_learned_spaces-4_cli.json");
    assert!(ckpt.exists());

    let mut cmd = Command::cargo_bin("paraverse")?;
    cmd.arg("test")
        .arg(tmp.path())
        .arg(&ckpt)
        .arg("--missing")
        .arg("null-vector")
        .arg("--classification");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Mean Reciprocal Rank:"))
        .stdout(predicate::str::contains("Hits@10:"))
        .stdout(predicate::str::contains("Accuracy:"));

    let mut cmd = Command::cargo_bin("paraverse")?;
    cmd.arg("stats").arg(&ckpt);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Universes:            4"))
        .stdout(predicate::str::contains("Entities:             12"));

    Ok(())
}

#[test]
fn test_cli_merge() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    write_dataset(tmp.path())?;
    let config = tmp.path().join("config.json");
    write_config(&config)?;
    let ckpt_dir = tmp.path().join("ckpt");

    train(tmp.path(), &config, &ckpt_dir, "1", "a").assert().success();
    train(tmp.path(), &config, &ckpt_dir, "100", "b").assert().success();

    let out = tmp.path().join("merged");
    let mut cmd = Command::cargo_bin("paraverse")?;
    cmd.arg("merge")
        .arg(&out)
        .arg(ckpt_dir.join("pu_TransE_learned_spaces-4_a.json"))
        .arg(ckpt_dir.join("pu_TransE_learned_spaces-4_b.json"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("8 universes"));
    assert!(out.join("pu_TransE_learned_spaces-8_merged.json").exists());

    Ok(())
}

#[test]
fn test_cli_missing_dataset_fails() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let mut cmd = Command::cargo_bin("paraverse")?;
    cmd.arg("train").arg(tmp.path().join("nope")).arg("--no-checkpoint");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load dataset"));
    Ok(())
}
