//! Integration tests for `apm init`.

use predicates::prelude::*;

mod common;
use common::TestProject;

#[test]
fn test_init_creates_manifest_and_sample_workflow() {
    let project = TestProject::new();

    project
        .apm()
        .args(["init", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized APM project 'demo'"));

    assert!(project.exists("apm.yml"));
    assert!(project.exists("hello-world.prompt.md"));
    let manifest = project.read("apm.yml");
    assert!(manifest.contains("name: demo"));
    assert!(manifest.contains("version: 0.1.0"));
}

#[test]
fn test_init_refuses_overwrite() {
    let project = TestProject::with_manifest();

    project
        .apm()
        .args(["init", "demo"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--force"));

    // original manifest untouched
    assert!(project.read("apm.yml").contains("test-project"));
}

#[test]
fn test_init_force_overwrites() {
    let project = TestProject::with_manifest();

    project.apm().args(["init", "demo", "--force"]).assert().success();
    assert!(project.read("apm.yml").contains("name: demo"));
}

#[test]
fn test_init_output_parses_as_manifest() {
    let project = TestProject::new();
    project.apm().args(["init", "demo"]).assert().success();

    // the generated project immediately supports list
    project
        .apm()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"));
}
