//! Shared fixtures for integration tests.

// Each test binary uses a different subset of the fixture API.
#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary project directory plus a configured `apm` command.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// Empty project directory, no manifest.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp project"),
        }
    }

    /// Project with a minimal valid manifest.
    pub fn with_manifest() -> Self {
        let project = Self::new();
        project.write("apm.yml", "name: test-project\nversion: 1.0.0\n");
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file below the project root, creating parents.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().expect("has parent")).expect("create parents");
        fs::write(path, content).expect("write fixture file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.dir.path().join(rel)).expect("read project file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.dir.path().join(rel).exists()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// An `apm` command running in the project directory with a clean
    /// token environment.
    pub fn apm(&self) -> Command {
        let mut cmd = Command::cargo_bin("apm").expect("apm binary");
        cmd.current_dir(self.dir.path())
            .env_remove("APM_GITHUB_TOKEN")
            .env_remove("GITHUB_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }
}

/// A valid instruction primitive body for fixtures.
pub fn instruction_fixture(description: &str, apply_to: &str, body: &str) -> String {
    format!("---\ndescription: {description}\napplyTo: \"{apply_to}\"\n---\n{body}")
}
