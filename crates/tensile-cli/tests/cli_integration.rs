//! Integration tests for the tensile CLI.
//!
//! Run with: `cargo test --package tensile-cli --test cli_integration`

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

/// Helper to run the tensile CLI with given arguments.
fn run_tensile(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tensile"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("TENSILE_MIN_STEPS")
        .env_remove("TENSILE_MAX_STEPS")
        .env_remove("TENSILE_THRESHOLD")
        .env_remove("TENSILE_SEED")
        .args(args)
        .output()
        .expect("Failed to execute tensile command")
}

/// Square 1-2-3-4 with a tail 4-5 and an isolate 9.
fn write_graph(dir: &Path) -> PathBuf {
    let path = dir.join("graph.json");
    fs::write(
        &path,
        r#"{
    "directed": false,
    "nodes": [9],
    "edges": [[1, 2], [2, 3], [3, 4], [4, 1], [4, 5]]
}"#,
    )
    .unwrap();
    path
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn algorithms_lists_builtin_names() {
    let dir = TempDir::new().unwrap();
    let output = run_tensile(dir.path(), &["algorithms"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["circle", "positional-adding", "random-box", "spring"] {
        assert!(stdout.lines().any(|l| l == name), "missing {name}");
    }
}

#[test]
fn spring_layout_prints_every_node() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(dir.path());
    let output = run_tensile(dir.path(), &["layout", graph.to_str().unwrap()]);
    let json = stdout_json(&output);

    let positions = json["positions"].as_object().unwrap();
    assert_eq!(positions.len(), 6);
    for id in ["1", "2", "3", "4", "5", "9"] {
        let xy = positions[id].as_array().unwrap();
        assert_eq!(xy.len(), 2);
        assert!(xy[0].as_f64().unwrap().is_finite());
    }
    assert!(json["steps"].as_u64().unwrap() >= 100);
    assert!(json["converged"].is_boolean());
}

#[test]
fn layout_honours_config_file_and_env() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(dir.path());
    let config = dir.path().join("params.json");
    fs::write(&config, r#"{ "min_steps": 20, "max_steps": 500 }"#).unwrap();
    let out_file = dir.path().join("out.json");

    let output = Command::new(env!("CARGO_BIN_EXE_tensile"))
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env("TENSILE_MAX_STEPS", "20")
        .env("TENSILE_SEED", "3")
        .args([
            "layout",
            graph.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--output",
            out_file.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: Value = serde_json::from_str(&fs::read_to_string(&out_file).unwrap()).unwrap();
    assert_eq!(json["steps"].as_u64(), Some(20));
}

#[test]
fn circle_layout_has_no_run_statistics() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(dir.path());
    let output = run_tensile(
        dir.path(),
        &["layout", graph.to_str().unwrap(), "--algorithm", "circle"],
    );
    let json = stdout_json(&output);
    assert_eq!(json["positions"].as_object().unwrap().len(), 6);
    assert!(json.get("steps").is_none());
}

#[test]
fn unknown_algorithm_fails() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(dir.path());
    let output = run_tensile(
        dir.path(),
        &["layout", graph.to_str().unwrap(), "--algorithm", "hyperbolic"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown algorithm"));
}

#[test]
fn invalid_config_is_rejected_before_layout() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(dir.path());
    let config = dir.path().join("params.json");
    fs::write(&config, r#"{ "layout": { "step_time": 0.0 } }"#).unwrap();
    let output = run_tensile(
        dir.path(),
        &["layout", graph.to_str().unwrap(), "--config", config.to_str().unwrap()],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("step_time"));
}

#[test]
fn simulate_prints_one_line_per_tick() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(dir.path());
    let out_file = dir.path().join("sim.json");
    let output = run_tensile(
        dir.path(),
        &[
            "simulate",
            graph.to_str().unwrap(),
            "--ticks",
            "5",
            "--interval-ms",
            "1",
            "--output",
            out_file.to_str().unwrap(),
        ],
    );
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("1\t"));

    let json: Value = serde_json::from_str(&fs::read_to_string(&out_file).unwrap()).unwrap();
    assert_eq!(json["positions"].as_object().unwrap().len(), 6);
}

#[test]
fn missing_graph_file_fails_with_context() {
    let dir = TempDir::new().unwrap();
    let output = run_tensile(dir.path(), &["layout", "nope.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read graph"));
}
