//! Integration tests for the hemato binary.
//!
//! These tests verify end-to-end behavior including:
//! - Table loading and subject listing
//! - Filtering with exclusions and warnings
//! - Metadata-grouped aggregation
//! - Table merging

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TABLE: &str = "\
subject_id,blood_source,analysis_date,PLT_Value,PLT_LowLimit,PLT_HighLimit
A,Serum,2024-01-01 09:00:00,250,100,400
B,Blood,2024-01-01 09:00:00,300,100,400
1,Serum,2024-01-01 08:00:00,10,1,100
2,Serum,2024-01-01 08:30:00,20,1,100
3,Serum,2024-01-01 09:00:00,30,1,100
4,Serum,2024-01-01 09:30:00,50,1,100
1,Serum,2024-01-02 08:00:00,12,1,100
";

const METADATA: &str = "\
animal_id,treatment,sex
1,control,F
2,control,M
3,treated,F
4,treated,M
";

/// Helper to create a test data directory with a table and metadata file
fn setup_test_dir() -> TempDir {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("table.csv"), TABLE).unwrap();
    fs::write(temp_dir.path().join("meta.csv"), METADATA).unwrap();
    temp_dir
}

fn table(dir: &Path) -> PathBuf {
    dir.join("table.csv")
}

/// Helper to get the CLI binary, isolated from any user config
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hemato").expect("Failed to find hemato binary");
    cmd.env("XDG_CONFIG_HOME", dir.join("config"))
        .env("HOME", dir)
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Blood panel cohort filtering and aggregation",
        ));
}

#[test]
fn test_subjects_lists_sources() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("subjects")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("6 subjects, 7 records"))
        .stdout(predicate::str::contains("1  Serum (2 dates)"))
        .stdout(predicate::str::contains("B  Blood (1 date)"));
}

#[test]
fn test_filter_warns_subjects_without_valid_data() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("filter")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .args(["--subjects", "A,B", "--source", "Serum", "--family", "PLT FAMILY"])
        .assert()
        .success()
        .stdout(predicate::str::contains("250  [100, 400]"))
        .stdout(predicate::str::contains("B: no data"))
        .stdout(predicate::str::contains(
            "Subject IDs #A,B have no Serum samples.",
        ));
}

#[test]
fn test_filter_trims_subject_ids() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("filter")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .args(["--subjects", " 1 , 2,", "--source", "Serum", "--family", "plt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(2 subjects)"))
        .stdout(predicate::str::contains("Not in table").not());
}

#[test]
fn test_aggregate_default_subjects_follow_metadata_rows() {
    let temp_dir = setup_test_dir();
    fs::write(
        temp_dir.path().join("meta.csv"),
        "animal_id,treatment\n3,treated\n1,control\n",
    )
    .unwrap();

    let output = cli(temp_dir.path())
        .arg("aggregate")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .arg("--metadata")
        .arg(temp_dir.path().join("meta.csv"))
        .args(["--source", "Serum", "--family", "plt", "--group", "treatment", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        value["aggregation"]["groups"],
        serde_json::json!(["treated", "control"])
    );
}

#[test]
fn test_filter_respects_warning_policy_config() {
    let temp_dir = setup_test_dir();
    let config_dir = temp_dir.path().join("config").join("hemato");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        "[filter]\nwarning_policy = \"all_analytes\"\n",
    )
    .unwrap();

    cli(temp_dir.path())
        .arg("filter")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .args(["--subjects", "A,B", "--source", "Serum", "--family", "plt"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Subject ID #B has no Serum samples.",
        ));
}

#[test]
fn test_filter_exclusion_removes_date() {
    let temp_dir = setup_test_dir();
    let output = cli(temp_dir.path())
        .arg("filter")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .args(["--subjects", "1", "--source", "Serum", "--family", "plt"])
        .args(["--exclude", "1@2024-01-02", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let plt = &value["result"]["series"][1];
    assert_eq!(plt["analyte"], "PLT");
    let points = plt["subjects"][0]["points"].as_array().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["value"], 10.0);
}

#[test]
fn test_filter_unknown_family_fails() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("filter")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .args(["--subjects", "A", "--source", "Serum", "--family", "LIVER FAMILY"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown feature family: LIVER FAMILY"));
}

#[test]
fn test_filter_without_subjects_fails() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("filter")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .args(["--source", "Serum", "--family", "plt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Selection contains no subject ids"));
}

#[test]
fn test_missing_table_fails() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("subjects")
        .arg("--table")
        .arg(temp_dir.path().join("nope.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_aggregate_timeseries_medians() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("aggregate")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .arg("--metadata")
        .arg(temp_dir.path().join("meta.csv"))
        .args(["--source", "Serum", "--family", "PLT FAMILY"])
        .args(["--group", "treatment", "--mode", "timeseries"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-01-01"))
        .stdout(predicate::str::contains("control: 15.000 ± 5.000 (n=2)"))
        .stdout(predicate::str::contains("treated: 40.000 ± 10.000 (n=2)"))
        .stdout(predicate::str::contains("treated: no data"));
}

#[test]
fn test_aggregate_global_json() {
    let temp_dir = setup_test_dir();
    let output = cli(temp_dir.path())
        .arg("aggregate")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .arg("--metadata")
        .arg(temp_dir.path().join("meta.csv"))
        .args(["--subjects", "1,2,A", "--source", "Serum", "--family", "plt"])
        .args(["--group", "treatment", "--group", "sex", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let aggregation = &value["aggregation"];
    assert_eq!(aggregation["mode"], "global");
    assert_eq!(aggregation["groups"], serde_json::json!(["control_F", "control_M"]));
    assert_eq!(aggregation["dropped_subjects"], serde_json::json!(["A"]));

    let stats = aggregation["statistics"].as_array().unwrap();
    let control_f_plt = stats
        .iter()
        .find(|s| s["analyte"] == "PLT" && s["group"] == "control_F")
        .unwrap();
    assert_eq!(control_f_plt["summary"]["kind"], "computed");
    assert_eq!(control_f_plt["summary"]["center"], 11.0);

    let control_f_mpv = stats
        .iter()
        .find(|s| s["analyte"] == "MPV" && s["group"] == "control_F")
        .unwrap();
    assert_eq!(control_f_mpv["summary"]["kind"], "no_data");
}

#[test]
fn test_aggregate_without_group_fails() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("aggregate")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .arg("--metadata")
        .arg(temp_dir.path().join("meta.csv"))
        .args(["--source", "Serum", "--family", "plt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("At least one grouping column is required"));
}

#[test]
fn test_dates_with_exclusion() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("dates")
        .arg("--table")
        .arg(table(temp_dir.path()))
        .args(["--subject", "1", "--source", "Serum", "--exclude", "1@2024-01-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Selected sample dates:\n  2024-01-02\nRemoved sample dates:\n  2024-01-01",
        ));
}

#[test]
fn test_merge_appends_without_dedup() {
    let temp_dir = setup_test_dir();
    let merged = temp_dir.path().join("merged.csv");

    for expected_total in ["(7 total)", "(14 total)"] {
        cli(temp_dir.path())
            .arg("merge")
            .arg("--table")
            .arg(&merged)
            .arg("--input")
            .arg(table(temp_dir.path()))
            .assert()
            .success()
            .stdout(predicate::str::contains(expected_total));
    }

    cli(temp_dir.path())
        .arg("subjects")
        .arg("--table")
        .arg(&merged)
        .assert()
        .success()
        .stdout(predicate::str::contains("6 subjects, 14 records"));
}
