// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Command-line behaviour against fixture pipelines

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn promptflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("promptflow").unwrap();
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "promptflow=warn");
    cmd
}

#[test]
fn compile_prints_the_interchange_form() {
    let dir = TempDir::new().unwrap();
    let output = promptflow(dir.path())
        .arg("compile")
        .arg(fixture("hello.ptbk.md"))
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["title"], "👋 Hello");
    assert_eq!(
        json["pipelineUrl"],
        "https://promptflow.dev/samples/hello.ptbk.md"
    );
    assert_eq!(json["tasks"][0]["resultingParameterName"], "greeting");
}

#[test]
fn compile_writes_yaml_to_a_file() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("hello.yaml");

    promptflow(dir.path())
        .arg("compile")
        .arg(fixture("hello.ptbk.md"))
        .args(["--format", "yaml", "-o"])
        .arg(&target)
        .assert()
        .success();

    let yaml = std::fs::read_to_string(&target).unwrap();
    assert!(yaml.contains("pipelineUrl: https://promptflow.dev/samples/hello.ptbk.md"));
}

#[test]
fn compile_reports_missing_files() {
    let dir = TempDir::new().unwrap();
    promptflow(dir.path())
        .args(["compile", "missing.ptbk.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn validate_accepts_a_good_pipeline() {
    let dir = TempDir::new().unwrap();
    promptflow(dir.path())
        .arg("validate")
        .arg(fixture("hello.ptbk.md"))
        .assert()
        .success()
        .stdout(predicate::str::contains("All pipelines are valid"));
}

#[test]
fn verbose_validate_shows_the_execution_order() {
    let dir = TempDir::new().unwrap();
    promptflow(dir.path())
        .args(["validate", "-v"])
        .arg(fixture("hello.ptbk.md"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Order: greet"));
}

#[test]
fn validate_rejects_circular_parameters_in_a_directory() {
    let dir = TempDir::new().unwrap();
    for name in ["hello.ptbk.md", "circular.ptbk.md"] {
        std::fs::copy(fixture(name), dir.path().join(name)).unwrap();
    }

    promptflow(dir.path())
        .args(["validate", "."])
        .assert()
        .failure()
        .stdout(predicate::str::contains("circular.ptbk.md"))
        .stderr(predicate::str::contains("1 pipeline(s) failed validation"));
}

#[test]
fn run_prints_outputs_and_writes_a_report() {
    let dir = TempDir::new().unwrap();
    let report = dir.path().join("report.json");

    promptflow(dir.path())
        .arg("run")
        .arg(fixture("hello.ptbk.md"))
        .args(["-i", "name=Ada", "--report"])
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello Ada!"))
        .stdout(predicate::str::contains("Pipeline completed successfully"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["isSuccessful"], true);
    assert_eq!(json["outputParameters"]["greeting"], "Hello Ada!");
    assert_eq!(json["tasks"][0]["status"], "SUCCEEDED");
}

#[test]
fn run_fails_without_required_inputs() {
    let dir = TempDir::new().unwrap();
    promptflow(dir.path())
        .arg("run")
        .arg(fixture("hello.ptbk.md"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pipeline failed"));
}

#[test]
fn run_rejects_malformed_inputs() {
    let dir = TempDir::new().unwrap();
    promptflow(dir.path())
        .arg("run")
        .arg(fixture("hello.ptbk.md"))
        .args(["-i", "name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected NAME=VALUE"));
}

#[test]
fn graph_renders_mermaid() {
    let dir = TempDir::new().unwrap();
    promptflow(dir.path())
        .arg("graph")
        .arg(fixture("hello.ptbk.md"))
        .args(["--format", "mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("flowchart TD"));
}

#[test]
fn cached_runs_fill_the_cache() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("promptflow.toml"),
        "[cache]\nenabled = true\ndirectory = \"cache\"\n",
    )
    .unwrap();

    for _ in 0..2 {
        promptflow(dir.path())
            .arg("run")
            .arg(fixture("hello.ptbk.md"))
            .args(["-i", "name=Ada"])
            .assert()
            .success();
    }

    promptflow(dir.path())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:  1"));

    promptflow(dir.path())
        .args(["cache", "clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleared"));

    promptflow(dir.path())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:  0"));
}

#[test]
fn explicit_config_must_exist() {
    let dir = TempDir::new().unwrap();
    promptflow(dir.path())
        .args(["--config", "nowhere.toml", "graph"])
        .arg(fixture("hello.ptbk.md"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}
