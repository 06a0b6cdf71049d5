//! Integration tests for the ergsheet binary.
//!
//! These tests drive the CLI end to end against JSON workbook snapshots:
//! - Summary text and JSON output
//! - ERG/MRC export layout and file contents
//! - Library write-back
//! - Error reporting for malformed sheets

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a test directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the CLI binary
fn cli() -> Command {
    Command::cargo_bin("ergsheet").expect("Failed to find ergsheet binary")
}

/// A row of `width` cells with `values` placed from column `col`
fn row(width: usize, cells: &[(usize, Value)]) -> Value {
    let mut values = vec![Value::Null; width];
    for (col, value) in cells {
        values[*col] = value.clone();
    }
    Value::Array(values)
}

fn config_sheet(ftp: f64) -> Value {
    json!({
        "title": "config",
        "rows": [
            ["User Profile", null],
            ["Functional Threshold Power", ftp]
        ],
        "merges": [{"row": 0, "first_col": 0, "last_col": 1}]
    })
}

/// Course sheet: Header, Insert Before, Insert After and one Course section
fn course_sheet(
    title: &str,
    header: [Value; 4],
    before: &[(&str, Value)],
    data: &[[Value; 4]],
) -> Value {
    const WIDTH: usize = 15;
    let mut rows = vec![
        row(
            WIDTH,
            &[
                (0, json!("Header")),
                (5, json!("Insert Before")),
                (8, json!("Insert After")),
                (11, json!("Course")),
            ],
        ),
        row(
            WIDTH,
            &[
                (0, json!("Name")),
                (1, json!("Category")),
                (2, json!("Repeat")),
                (3, json!("Comments")),
                (5, json!("Name")),
                (6, json!("Blend Seconds")),
                (8, json!("Name")),
                (9, json!("Blend Seconds")),
                (11, json!("Time")),
                (12, json!("Power")),
                (13, json!("Ramp-to Power")),
                (14, json!("Exclude from last repeat")),
            ],
        ),
    ];
    for i in 0..data.len().max(1) {
        let mut cells = Vec::new();
        if i == 0 {
            cells.extend(header.iter().cloned().enumerate());
        }
        if let Some((name, blend)) = before.get(i) {
            cells.push((5, json!(name)));
            cells.push((6, blend.clone()));
        }
        if let Some(values) = data.get(i) {
            cells.extend(values.iter().cloned().enumerate().map(|(c, v)| (11 + c, v)));
        }
        rows.push(row(WIDTH, &cells));
    }

    json!({
        "title": title,
        "rows": rows,
        "merges": [
            {"row": 0, "first_col": 0, "last_col": 3},
            {"row": 0, "first_col": 5, "last_col": 6},
            {"row": 0, "first_col": 8, "last_col": 9},
            {"row": 0, "first_col": 11, "last_col": 14}
        ]
    })
}

/// Warmup (ramp then steady) and Threshold (repeated twice, Warmup before it)
fn standard_sheets() -> Vec<Value> {
    vec![
        config_sheet(250.0),
        course_sheet(
            "Warmup",
            [json!("Warmup"), json!("Warmup"), Value::Null, json!("easy")],
            &[],
            &[
                [json!(5), json!(100), json!(200), Value::Null],
                [json!(5), json!(200), Value::Null, Value::Null],
            ],
        ),
        course_sheet(
            "Threshold",
            [json!("Threshold"), json!("Sweet Spot"), json!("2"), Value::Null],
            &[("Warmup", json!(30))],
            &[
                [json!(10), json!(300), Value::Null, Value::Null],
                [json!(5), json!(150), Value::Null, json!("x")],
            ],
        ),
    ]
}

/// Write the snapshot and an empty config file; returns (workbook, config)
fn write_workbook(dir: &Path, sheets: Vec<Value>) -> (PathBuf, PathBuf) {
    let workbook = dir.join("collection.json");
    fs::write(&workbook, json!({ "sheets": sheets }).to_string())
        .expect("Failed to write workbook");
    let config = dir.join("config.toml");
    fs::write(&config, "").expect("Failed to write config");
    (workbook, config)
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Trainer course workbook to ERG/MRC converter",
        ));
}

#[test]
fn test_summary_lists_linked_courses() {
    let temp_dir = setup_test_dir();
    let (workbook, config) = write_workbook(temp_dir.path(), standard_sheets());

    cli()
        .arg("--config")
        .arg(&config)
        .arg("summary")
        .arg(&workbook)
        .assert()
        .success()
        .stdout(predicate::str::contains("CourseCollection(collection, 2 Courses)"))
        .stdout(predicate::str::contains("\tWarmup : Warmup-10', Comments : easy"))
        .stdout(predicate::str::contains("\tSweet Spot : Threshold-36', Comments : "))
        .stdout(predicate::str::contains("\t\t30\"@200W->300W"));
}

#[test]
fn test_summary_with_stats_and_filter() {
    let temp_dir = setup_test_dir();
    let (workbook, config) = write_workbook(temp_dir.path(), standard_sheets());

    cli()
        .arg("--config")
        .arg(&config)
        .arg("summary")
        .arg(&workbook)
        .arg("--stats")
        .arg("--include")
        .arg("thr*")
        .assert()
        .success()
        .stdout(predicate::str::contains("Threshold, time=35,"))
        .stdout(predicate::str::contains("tss="))
        .stdout(predicate::str::contains("Warmup :").not());
}

#[test]
fn test_summary_limit() {
    let temp_dir = setup_test_dir();
    let (workbook, config) = write_workbook(temp_dir.path(), standard_sheets());

    cli()
        .arg("--config")
        .arg(&config)
        .arg("summary")
        .arg(&workbook)
        .arg("--limit")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("\tWarmup : Warmup-10'"))
        .stdout(predicate::str::contains("Threshold").not());
}

#[test]
fn test_summary_json() {
    let temp_dir = setup_test_dir();
    let (workbook, config) = write_workbook(temp_dir.path(), standard_sheets());

    let output = cli()
        .arg("--config")
        .arg(&config)
        .arg("summary")
        .arg(&workbook)
        .arg("--json")
        .output()
        .expect("Failed to run summary");
    assert!(output.status.success());

    let courses: Value = serde_json::from_slice(&output.stdout).expect("Invalid JSON output");
    let courses = courses.as_array().expect("Expected an array");
    assert_eq!(courses.len(), 2);
    assert_eq!(courses[1]["name"], "Threshold");
    assert_eq!(courses[1]["category"], "Sweet Spot");
    assert_eq!(courses[0]["stats"]["duration"], 10.0);
    assert!(courses[1]["stats"]["tss"].is_u64());
    // Warmup (2) + blend (1) + 2 repeats minus the excluded tail (3)
    assert_eq!(courses[1]["segments"].as_array().map(Vec::len), Some(6));
}

#[test]
fn test_export_writes_erg_files() {
    let temp_dir = setup_test_dir();
    let (workbook, config) = write_workbook(temp_dir.path(), standard_sheets());
    let out = temp_dir.path().join("out");

    cli()
        .arg("--config")
        .arg(&config)
        .arg("export")
        .arg(&workbook)
        .arg("--dst")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 2 courses"));

    assert!(out.join("Warmup").join("Warmup.erg").exists());
    let erg = fs::read_to_string(out.join("Sweet Spot").join("Threshold.erg"))
        .expect("Failed to read export");
    let lines: Vec<&str> = erg.lines().collect();

    assert_eq!(lines[0], "[COURSE HEADER]");
    assert_eq!(lines[1], "VERSION = 2");
    assert_eq!(lines[2], "UNITS = ENGLISH");
    assert!(lines[3].starts_with("DESCRIPTION = Sweet Spot time=35 "));
    assert_eq!(lines[4], "FILE NAME = Threshold.erg");
    assert_eq!(lines[5], "FTP = 360");
    assert_eq!(lines[6], "MINUTES WATTS");
    assert_eq!(lines[7], "[END COURSE HEADER]");
    assert_eq!(lines[8], "[COURSE DATA]");
    assert_eq!(
        &lines[9..15],
        &["0\t100", "5\t200", "5\t200", "10\t200", "10\t200", "10.5\t300"]
    );
    assert_eq!(lines.last(), Some(&"[END COURSE DATA]"));
    // Six segments, two points each
    assert_eq!(lines.len(), 9 + 12 + 1);
}

#[test]
fn test_export_mrc_with_exclude_filter() {
    let temp_dir = setup_test_dir();
    let (workbook, config) = write_workbook(temp_dir.path(), standard_sheets());
    let out = temp_dir.path().join("out");

    cli()
        .arg("--config")
        .arg(&config)
        .arg("export")
        .arg(&workbook)
        .arg("--dst")
        .arg(&out)
        .arg("--format")
        .arg("mrc")
        .arg("--exclude")
        .arg("threshold")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 1 courses"));

    let mrc = fs::read_to_string(out.join("Warmup").join("Warmup.mrc"))
        .expect("Failed to read export");
    assert!(mrc.contains("MINUTES PERCENT"));
    assert!(mrc.contains("0\t40\n5\t80\n"));
    assert!(!out.join("Sweet Spot").exists());
}

#[test]
fn test_unknown_format_fails() {
    let temp_dir = setup_test_dir();
    let (workbook, config) = write_workbook(temp_dir.path(), standard_sheets());

    cli()
        .arg("--config")
        .arg(&config)
        .arg("export")
        .arg(&workbook)
        .arg("--dst")
        .arg(temp_dir.path().join("out"))
        .arg("--format")
        .arg("fit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown export format"));
}

#[test]
fn test_missing_sections_reported() {
    let temp_dir = setup_test_dir();
    let broken = json!({
        "title": "Broken",
        "rows": [
            ["Header", null],
            ["Name", "Category"],
            ["Lonely", "Warmup"]
        ],
        "merges": [{"row": 0, "first_col": 0, "last_col": 1}]
    });
    let (workbook, config) = write_workbook(temp_dir.path(), vec![config_sheet(250.0), broken]);

    cli()
        .arg("--config")
        .arg(&config)
        .arg("summary")
        .arg(&workbook)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Sheet 'Broken' is missing required sections"))
        .stderr(predicate::str::contains("Insert Before, Insert After"));
}

#[test]
fn test_unknown_link_target_reported() {
    let temp_dir = setup_test_dir();
    let sheets = vec![
        config_sheet(250.0),
        course_sheet(
            "Solo",
            [json!("Solo"), json!("Anaerobic"), Value::Null, Value::Null],
            &[("Ghost", Value::Null)],
            &[[json!(1), json!(400), Value::Null, Value::Null]],
        ),
    ];
    let (workbook, config) = write_workbook(temp_dir.path(), sheets);

    cli()
        .arg("--config")
        .arg(&config)
        .arg("summary")
        .arg(&workbook)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown course 'Ghost'"))
        .stderr(predicate::str::contains("Known courses: Solo"));
}

#[test]
fn test_library_write_back() {
    let temp_dir = setup_test_dir();
    let (workbook, config) = write_workbook(temp_dir.path(), standard_sheets());
    let csv_path = temp_dir.path().join("library.csv");

    cli()
        .arg("--config")
        .arg(&config)
        .arg("library")
        .arg(&workbook)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 updated, 2 added"));

    let csv = fs::read_to_string(&csv_path).expect("Failed to read library");
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("Name,Tag,Category,time,"));
    assert!(lines.next().unwrap().starts_with("Warmup,ERG,Warmup,10,"));
    assert!(lines.next().unwrap().starts_with("Threshold,ERG,Sweet Spot,35,"));

    // The snapshot now carries the library sheet
    let snapshot: Value =
        serde_json::from_str(&fs::read_to_string(&workbook).unwrap()).expect("Invalid snapshot");
    let titles: Vec<&str> = snapshot["sheets"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["title"].as_str())
        .collect();
    assert!(titles.contains(&"Library"));

    // Second run updates rows in place
    cli()
        .arg("--config")
        .arg(&config)
        .arg("library")
        .arg(&workbook)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 updated, 0 added"));
    assert_eq!(fs::read_to_string(&csv_path).unwrap().lines().count(), 3);
}

#[test]
fn test_regions_listing() {
    let temp_dir = setup_test_dir();
    let (workbook, config) = write_workbook(temp_dir.path(), standard_sheets());

    cli()
        .arg("--config")
        .arg(&config)
        .arg("regions")
        .arg(&workbook)
        .arg("--sheet")
        .arg("Threshold")
        .assert()
        .success()
        .stdout(predicate::str::contains("Threshold (4 regions)"))
        .stdout(predicate::str::contains("rows 2-3, cols 1-4: name, category, repeat, comments"))
        .stdout(predicate::str::contains("Insert Before"))
        .stdout(predicate::str::contains("Warmup (").not());
}
