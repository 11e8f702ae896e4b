//! Integration tests for the CLI binary
//!
//! Only commands that never reach the network are run here.

use std::process::{Command, Output};

fn osm_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_osm-cli"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("OSM_CONFIG")
        .output()
        .unwrap()
}

#[test]
fn query_preview_prints_building_query() {
    let output = osm_cli(&[
        "query-preview",
        "--bbox",
        "40.60,22.93,40.61,22.95",
        "--include",
        "house,apartments",
    ]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("[out:json]"));
    assert!(stdout.contains("way[\"building\"]"));
    assert!(stdout.contains("relation[\"building\"]"));
    assert!(stdout.contains("house|apartments"));
    assert!(stdout.trim_end().ends_with("out geom;"));
}

#[test]
fn boundary_search_preview_keeps_greek_name() {
    let output = osm_cli(&[
        "boundaries",
        "search",
        "Θεσσαλονίκη",
        "--levels",
        "7",
        "--preview",
    ]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("[\"boundary\"=\"administrative\"]"));
    assert!(stdout.contains("[\"admin_level\"=\"7\"]"));
    assert!(stdout.contains("Θεσσαλονίκη"));
}

#[test]
fn unsafe_search_is_rejected_before_any_request() {
    let output = osm_cli(&["boundaries", "search", "<script>alert(1)</script>", "--preview"]);
    assert!(!output.status.success());
}

#[test]
fn malformed_bbox_is_a_usage_error() {
    let output = osm_cli(&["query-preview", "--bbox", "40.60,22.93"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn missing_subcommand_fails() {
    assert!(!osm_cli(&[]).status.success());
}
