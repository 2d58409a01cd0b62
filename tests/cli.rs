//! CLI integration tests for paper-scout.
//!
//! Only offline commands run end to end; anything that needs a model is
//! checked for its configuration error.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CATALOG: &str = r#"[
    {"source": "paper", "id": "2401.00001", "title": "Dense Retrieval for Open QA", "summary": "dual encoder retrieval"},
    {"source": "paper", "id": "2401.00002", "title": "Diffusion Sampling Tricks"},
    {"source": "code", "id": "org/retriever", "title": "org/retriever", "summary": "retrieval toolkit"}
]"#;

fn scout_cmd() -> Command {
    let mut cmd = Command::cargo_bin("paper-scout").unwrap_or_else(|_| unreachable!());
    cmd.env_remove("OPENAI_API_KEY")
        .env_remove("SCOUT_API_KEY")
        .env_remove("SCOUT_CATALOG")
        .env_remove("PAPER_SCOUT_LOG");
    cmd
}

fn catalog_dir() -> (TempDir, String) {
    let dir = TempDir::new().unwrap_or_else(|_| unreachable!());
    let path = dir.path().join("catalog.json");
    fs::write(&path, CATALOG).unwrap_or_else(|_| unreachable!());
    let path = path.to_string_lossy().into_owned();
    (dir, path)
}

#[test]
fn test_help_lists_commands() {
    scout_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("interview"))
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("init-prompts"));
}

#[test]
fn test_plan_text() {
    scout_cmd()
        .args(["plan", "rag", "-s", "paper,code", "-l", "70", "-w", "past_week"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Query: rag"))
        .stdout(predicate::str::contains("model-weights").not());
}

#[test]
fn test_plan_json_is_array() {
    let output = scout_cmd()
        .args(["--format", "json", "plan", "diffusion", "-s", "all", "-l", "40"])
        .output()
        .unwrap_or_else(|_| unreachable!());
    assert!(output.status.success());
    let specs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap_or_default();
    let limits: Vec<u64> = specs
        .as_array()
        .map(|a| a.iter().filter_map(|s| s["limit"].as_u64()).collect())
        .unwrap_or_default();
    assert_eq!(limits.len(), 4);
    assert_eq!(limits.iter().sum::<u64>(), 40);
}

#[test]
fn test_plan_rejects_unknown_window() {
    scout_cmd()
        .args(["plan", "rag", "-w", "eventually"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("eventually"));
}

#[test]
fn test_search_without_filter_needs_no_key() {
    let (_dir, catalog) = catalog_dir();
    scout_cmd()
        .args(["search", "-c", &catalog, "retrieval", "-s", "all", "--no-filter"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dense Retrieval for Open QA"))
        .stdout(predicate::str::contains("org/retriever"))
        .stdout(predicate::str::contains("Diffusion").not());
}

#[test]
fn test_analyze_without_key_fails() {
    let (_dir, catalog) = catalog_dir();
    scout_cmd()
        .args(["analyze", "-c", &catalog, "2401.00001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no API key configured"));
}

#[test]
fn test_analyze_unknown_id_fails_before_config() {
    let (_dir, catalog) = catalog_dir();
    scout_cmd()
        .args(["analyze", "-c", &catalog, "9999.99999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("9999.99999"));
}

#[test]
fn test_init_prompts_writes_files() {
    let dir = TempDir::new().unwrap_or_else(|_| unreachable!());
    scout_cmd()
        .args(["init-prompts", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    let count = fs::read_dir(dir.path()).map(Iterator::count).unwrap_or_default();
    assert!(count > 0);
}
