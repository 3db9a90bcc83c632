//! Binary-level tests, exercised over the stub backend.

use assert_cmd::Command;
use predicates::prelude::*;

fn annlink() -> Command {
    Command::cargo_bin("annlink").unwrap()
}

fn model_file(suffix: &str) -> tempfile::NamedTempFile {
    tempfile::Builder::new().suffix(suffix).tempfile().unwrap()
}

#[test]
fn help_lists_subcommands() {
    annlink()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("bench"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn inspect_reports_network_zero_as_json() {
    let model = model_file(".armnn");
    annlink()
        .args(["inspect", "--backend", "stub", "--format", "json"])
        .arg(model.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"network_id\": 0"))
        .stdout(predicate::str::contains("input_tensor"))
        .stdout(predicate::str::contains("output_tensor"));
}

#[test]
fn inspect_rejects_unknown_extension() {
    let model = model_file(".pb");
    annlink()
        .args(["inspect", "--backend", "stub"])
        .arg(model.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains(".armnn, .tflite or .onnx"));
}

#[test]
fn bench_reports_per_sample_time() {
    let model = model_file(".tflite");
    annlink()
        .args(["bench", "--backend", "stub", "--iterations", "4"])
        .arg(model.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ms per sample (4 iterations)"));
}

#[test]
fn bench_rejects_save_cache_without_cache_path() {
    let model = model_file(".tflite");
    annlink()
        .args(["bench", "--backend", "stub", "--iterations", "1", "--save-cache"])
        .arg(model.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("cache_path must be specified"));
}

#[test]
fn bench_creates_missing_tuning_file() {
    let model = model_file(".tflite");
    let dir = tempfile::tempdir().unwrap();
    let tuning = dir.path().join("gpu.tune");
    annlink()
        .args(["bench", "--backend", "stub", "--iterations", "1", "--tuning-level", "2"])
        .args(["--tuning-file"])
        .arg(&tuning)
        .arg(model.path())
        .assert()
        .success();
    // Created empty up front, then filled by the tuning flush at shutdown.
    assert!(!std::fs::read(&tuning).unwrap().is_empty());
}

#[test]
fn run_writes_raw_f32_output() {
    let model = model_file(".onnx");
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("embedding.f32");
    annlink()
        .args(["run", "--backend", "stub", "--output"])
        .arg(&output)
        .arg(model.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1x512"));
    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(bytes.len(), 512 * 4);
}

#[test]
fn run_rejects_wrong_sized_input() {
    let model = model_file(".onnx");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("short.f32");
    std::fs::write(&input, [0u8; 12]).unwrap();
    annlink()
        .args(["run", "--backend", "stub", "--input"])
        .arg(&input)
        .arg(model.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("f32 values"));
}

#[test]
fn config_init_writes_loadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    annlink()
        .args(["config", "init", "--output"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("input_tensor"));
    assert!(content.contains("tuning_level"));

    // A second init without --force refuses to overwrite.
    annlink()
        .args(["config", "init", "--output"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}
