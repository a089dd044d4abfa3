use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const LINE_NETWORK: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"name": "Main St"},
     "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [2.0, 0.0]]}},
    {"type": "Feature", "properties": {"name": "Center"},
     "geometry": {"type": "Point", "coordinates": [1.0, 0.0]}}
  ]
}"#;

#[allow(deprecated)]
fn geonet(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("geonet").expect("binary");
    cmd.current_dir(workdir)
        .env_remove("GEONET_QUEUE_WORKERS")
        .env_remove("GEONET_EXTRACT_CONCURRENCY")
        .arg("--quiet")
        .arg("--config")
        .arg(workdir.join("geonet.toml"))
        .arg("--state")
        .arg(workdir.join("state.json"))
        .arg("--blobs")
        .arg(workdir.join("blobs"));
    cmd
}

fn run_json(workdir: &Path, args: &[&str]) -> Value {
    let output = geonet(workdir).args(args).output().expect("command run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn extract_line(workdir: &Path) -> u64 {
    fs::write(workdir.join("line.geojson"), LINE_NETWORK).unwrap();
    let summary = run_json(
        workdir,
        &[
            "extract",
            "line.geojson",
            "--name",
            "Main St",
            "--export",
            "network.geojson",
        ],
    );
    assert_eq!(summary["nodes"], 3);
    assert_eq!(summary["edges"], 2);
    summary["network"].as_u64().unwrap()
}

#[test]
fn extract_persists_state_and_exports_geojson() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    extract_line(root);

    assert!(root.join("state.json").exists());
    let exported: Value =
        serde_json::from_str(&fs::read_to_string(root.join("network.geojson")).unwrap()).unwrap();
    let features = exported["features"].as_array().unwrap();
    assert_eq!(features.len(), 5);
    assert!(features
        .iter()
        .any(|f| f["properties"]["name"] == "Center" && f["properties"]["node_id"].is_u64()));
}

#[test]
fn rank_and_gcc_read_the_saved_network() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    let network = extract_line(root).to_string();

    let ranked = run_json(
        root,
        &["rank", "--network", &network, "--measure", "betweenness", "--limit", "1"],
    );
    let ranking = ranked["ranking"].as_array().unwrap();
    assert_eq!(ranking.len(), 1);
    let center = ranking[0]["node"].as_u64().unwrap();

    let whole = run_json(root, &["gcc", "--network", &network]);
    assert_eq!(whole["size"], 3);

    let split = run_json(
        root,
        &["gcc", "--network", &network, "--exclude", &center.to_string()],
    );
    assert_eq!(split["size"], 1);
}

#[test]
fn unknown_measure_fails_before_any_work() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    let network = extract_line(root).to_string();

    geonet(root)
        .args(["rank", "--network", &network, "--measure", "fastest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fastest"));
}

#[test]
fn analyze_lists_types_and_rejects_bad_modes() {
    let temp = tempdir().unwrap();
    let root = temp.path();

    let types = run_json(root, &["analyze", "list"]);
    assert_eq!(types.as_array().unwrap().len(), 6);

    geonet(root)
        .args([
            "analyze",
            "run",
            "network_recovery",
            "--inputs",
            r#"{"node_failure_simulation": 1, "recovery_mode": "fastest"}"#,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown recovery mode"));

    geonet(root)
        .args(["analyze", "run", "flood"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown analysis type"));
}

#[test]
fn analyze_schema_describes_task_results() {
    let temp = tempdir().unwrap();
    let schema = run_json(temp.path(), &["analyze", "schema"]);
    let properties = schema["task_result"]["properties"].as_object().unwrap();
    for field in ["task_type", "outputs", "error", "completed_unix_ms"] {
        assert!(properties.contains_key(field), "{field}");
    }
    assert!(schema["centrality_measure"].to_string().contains("betweenness"));
}

#[test]
fn analyze_run_reports_accumulated_errors() {
    let temp = tempdir().unwrap();
    let root = temp.path();

    let result = run_json(
        root,
        &[
            "analyze",
            "run",
            "flood_network_failure",
            "--inputs",
            r#"{"network": 42}"#,
        ],
    );
    assert!(result["completed_unix_ms"].is_u64());
    let error = result["error"].as_str().unwrap();
    assert!(error.starts_with("Network 42 not found, Missing input: flood_simulation"));
}

#[test]
fn convert_creates_dataset_and_conversion_record() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::write(root.join("line.geojson"), LINE_NETWORK).unwrap();
    fs::write(root.join("notes.txt"), "field notes").unwrap();

    let output = run_json(
        root,
        &[
            "convert",
            "line.geojson",
            "notes.txt",
            "--name",
            "Streets",
            "--category",
            "transportation",
        ],
    );
    assert_eq!(output["dataset"]["name"], "Streets");
    assert_eq!(output["conversion"]["task_type"], "conversion");
    assert!(output["conversion"]["error"].is_null());
    assert_eq!(output["conversion"]["outputs"]["skipped"][0], "notes.txt");
    assert_eq!(
        output["conversion"]["outputs"]["vectors"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
}
