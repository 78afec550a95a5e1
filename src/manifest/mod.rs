//! Manifest (apm.yml) parsing and validation.
//!
//! The manifest is the single per-package configuration file. It names
//! the package, declares scripts and dependencies, and configures
//! compilation. Unknown top-level keys are preserved in an extras map and
//! ignored by the core, so newer manifests remain loadable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_ANALYSIS_DEPTH, DEFAULT_OUTPUT_FILENAME, MANIFEST_FILENAME};
use crate::core::ApmError;
use crate::utils::fs::atomic_write_str;

/// Parsed apm.yml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Package name. Required, non-empty.
    pub name: String,

    /// Package version. Required, non-empty; the value is otherwise
    /// opaque to the core.
    pub version: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Package author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Named scripts: raw command strings executed by the script runner.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,

    /// Dependency lists.
    #[serde(default)]
    pub dependencies: Dependencies,

    /// Compilation configuration; defaults fill missing fields.
    #[serde(default)]
    pub compilation: CompilationConfig,

    /// Unknown top-level keys, preserved but ignored.
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_yaml::Value>,
}

/// `dependencies:` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    /// Ordered list of `"<owner>/<repo>[#<ref>]"` strings.
    #[serde(default)]
    pub apm: Vec<String>,

    /// Opaque MCP registry identifiers, not interpreted by the core.
    #[serde(default)]
    pub mcp: Vec<String>,
}

impl Dependencies {
    /// True when both dependency lists are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apm.is_empty() && self.mcp.is_empty()
    }
}

/// `compilation:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationConfig {
    /// Output file name emitted at each placement directory.
    #[serde(default = "default_output")]
    pub output: String,

    /// Chatmode primitive to prepend to the root output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chatmode: Option<String>,

    /// Rewrite relative Markdown links against the output directory.
    #[serde(default = "default_true")]
    pub resolve_links: bool,

    /// Inject `memory/constitution.md` at the root output when present.
    #[serde(default = "default_true")]
    pub constitution: bool,

    /// Placement overrides.
    #[serde(default)]
    pub placement: PlacementConfig,

    /// Optimizer weights.
    #[serde(default)]
    pub optimization: OptimizationWeights,
}

impl Default for CompilationConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            chatmode: None,
            resolve_links: true,
            constitution: true,
            placement: PlacementConfig::default(),
            optimization: OptimizationWeights::default(),
        }
    }
}

/// `compilation.placement:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Directory names pruned from analysis in addition to the built-in
    /// set (`.git`, `apm_modules`, `node_modules`).
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Delete previously emitted output files that no longer receive a
    /// placement.
    #[serde(default)]
    pub clean_orphaned: bool,

    /// Maximum directory depth considered for placement.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            clean_orphaned: false,
            max_depth: default_max_depth(),
        }
    }
}

/// Weights for the placement objective. Coverage stays a hard
/// constraint; these only rank candidates among coverage-complete sets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OptimizationWeights {
    /// Tie-break weight for coverage among complete solutions.
    #[serde(default = "default_coverage_weight")]
    pub coverage_weight: f64,

    /// Penalty per irrelevant file inheriting an instruction.
    #[serde(default = "default_pollution_weight")]
    pub pollution_weight: f64,

    /// Reward for deeper placements, closer to matching files.
    #[serde(default = "default_locality_weight")]
    pub locality_weight: f64,

    /// Penalty per directory level, capped at depth 8.
    #[serde(default = "default_depth_penalty")]
    pub depth_penalty: f64,
}

impl Default for OptimizationWeights {
    fn default() -> Self {
        Self {
            coverage_weight: default_coverage_weight(),
            pollution_weight: default_pollution_weight(),
            locality_weight: default_locality_weight(),
            depth_penalty: default_depth_penalty(),
        }
    }
}

fn default_output() -> String {
    DEFAULT_OUTPUT_FILENAME.to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_max_depth() -> usize {
    DEFAULT_ANALYSIS_DEPTH
}

const fn default_coverage_weight() -> f64 {
    1.0
}

const fn default_pollution_weight() -> f64 {
    0.8
}

const fn default_locality_weight() -> f64 {
    0.3
}

const fn default_depth_penalty() -> f64 {
    0.1
}

impl Manifest {
    /// Parse manifest text, validating required fields.
    ///
    /// # Errors
    ///
    /// [`ApmError::MalformedManifest`] naming the first offending field.
    pub fn parse(content: &str, file: &Path) -> Result<Self, ApmError> {
        let manifest: Self =
            serde_yaml::from_str(content).map_err(|e| ApmError::MalformedManifest {
                file: file.display().to_string(),
                reason: e.to_string(),
            })?;
        manifest.validate(file)?;
        Ok(manifest)
    }

    /// Load a manifest from `dir/apm.yml`.
    ///
    /// # Errors
    ///
    /// [`ApmError::MissingManifest`] when the file does not exist,
    /// [`ApmError::MalformedManifest`] when it fails to parse.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ApmError> {
        let path = dir.join(MANIFEST_FILENAME);
        if !path.is_file() {
            return Err(ApmError::MissingManifest {
                dir: dir.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content, &path)
    }

    /// Serialize and atomically write this manifest to `dir/apm.yml`.
    pub fn save_to_dir(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let path = dir.join(MANIFEST_FILENAME);
        let yaml = serde_yaml::to_string(self)?;
        atomic_write_str(&path, &yaml)?;
        Ok(path)
    }

    fn validate(&self, file: &Path) -> Result<(), ApmError> {
        if self.name.trim().is_empty() {
            return Err(ApmError::MalformedManifest {
                file: file.display().to_string(),
                reason: "field 'name' must be non-empty".to_string(),
            });
        }
        if self.version.trim().is_empty() {
            return Err(ApmError::MalformedManifest {
                file: file.display().to_string(),
                reason: "field 'version' must be non-empty".to_string(),
            });
        }
        for (script, command) in &self.scripts {
            if command.trim().is_empty() {
                return Err(ApmError::MalformedManifest {
                    file: file.display().to_string(),
                    reason: format!("field 'scripts.{script}' must be non-empty"),
                });
            }
        }
        Ok(())
    }
}
