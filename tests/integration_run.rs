//! Integration tests for `apm run`, `apm preview`, and `apm list`.

#![cfg(unix)]

use predicates::prelude::*;

mod common;
use common::TestProject;

fn project_with_script(script: &str) -> TestProject {
    let project = TestProject::new();
    project.write(
        "apm.yml",
        &format!("name: p\nversion: 1.0.0\nscripts:\n  start: \"{script}\"\n"),
    );
    project
}

#[test]
fn test_list_scripts() {
    let project = project_with_script("echo hello");
    project
        .apm()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("echo hello"));
}

#[test]
fn test_list_no_scripts() {
    let project = TestProject::with_manifest();
    project
        .apm()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No scripts"));
}

#[test]
fn test_run_passes_through_exit_code() {
    let project = project_with_script("exit 3");
    project.apm().args(["run", "start"]).assert().code(3);

    let project = project_with_script("true");
    project.apm().args(["run", "start"]).assert().success();
}

#[test]
fn test_run_substitutes_prompt_file() {
    let project = project_with_script("cat hello.prompt.md");
    project.write(
        "hello.prompt.md",
        "---\ninput:\n  - name\n---\nHello ${input:name}!\n",
    );

    project
        .apm()
        .args(["run", "start", "--param", "name=world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello world!"));
}

#[test]
fn test_run_missing_parameter() {
    let project = project_with_script("cat hello.prompt.md");
    project.write("hello.prompt.md", "Hello ${input:name}!\n");

    project
        .apm()
        .args(["run", "start"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("name"))
        .stderr(predicate::str::contains("--param"));
}

#[test]
fn test_run_unknown_script() {
    let project = project_with_script("true");
    project
        .apm()
        .args(["run", "missing"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_preview_shows_substitution_without_running() {
    let project = project_with_script("definitely-not-a-binary hello.prompt.md");
    project.write("hello.prompt.md", "Deploy ${input:region} now.\n");

    project
        .apm()
        .args(["preview", "start", "--param", "region=eu"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deploy eu now."))
        .stdout(predicate::str::contains("command:"));
}
