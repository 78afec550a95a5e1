//! Dependency resolution.
//!
//! Resolution is a bounded breadth-first traversal over manifest
//! `dependencies.apm` lists. Each entry parses to a [`DependencySpec`];
//! nodes are keyed `owner/repo`, the first encountered ref wins (later
//! divergent requests warn), and the finished graph is checked for
//! cycles and ordered leaves-first for installation.
//!
//! Manifest access goes through the [`ManifestSource`] trait so the
//! builder can be driven by the network fetcher in production and by
//! stubs in tests. Nodes at the same BFS level are loaded concurrently
//! through a bounded pool; everything else is sequential, and the
//! resulting graph is independent of completion order.

pub mod graph;

pub use graph::DependencyGraph;

use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_MAX_PARALLEL, MAX_GRAPH_DEPTH, MAX_GRAPH_NODES};
use crate::core::ApmError;
use crate::manifest::Manifest;

/// One parsed `dependencies.apm` entry: `<owner>/<repo>[#<ref>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencySpec {
    pub owner: String,
    pub repo: String,
    /// Branch, tag, or commit; `None` selects the default branch.
    pub reference: Option<String>,
}

impl DependencySpec {
    /// Parse and validate a spec string.
    ///
    /// # Errors
    ///
    /// [`ApmError::InvalidDependency`] for anything that is not
    /// `owner/repo` with optional `#ref`, or when an identifier carries
    /// characters outside `[A-Za-z0-9._-]`.
    pub fn parse(spec: &str) -> Result<Self, ApmError> {
        let invalid = |reason: &str| ApmError::InvalidDependency {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let (path, reference) = match spec.split_once('#') {
            Some((path, r)) => {
                let r = r.trim();
                if r.is_empty() {
                    return Err(invalid("ref after '#' is empty"));
                }
                (path.trim(), Some(r.to_string()))
            }
            None => (spec.trim(), None),
        };

        let Some((owner, repo)) = path.split_once('/') else {
            return Err(invalid("expected '<owner>/<repo>'"));
        };
        if repo.contains('/') {
            return Err(invalid("expected exactly one '/' separator"));
        }
        if !is_valid_identifier(owner) {
            return Err(invalid("owner contains invalid characters"));
        }
        if !is_valid_identifier(repo) {
            return Err(invalid("repository contains invalid characters"));
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            reference,
        })
    }

    /// Canonical node key: `owner/repo`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Some(r) => write!(f, "{}/{}#{r}", self.owner, self.repo),
            None => write!(f, "{}/{}", self.owner, self.repo),
        }
    }
}

/// Identifier hygiene for owner and repository names.
///
/// Alphanumerics, hyphens, underscores, and dots; no leading or trailing
/// dot or hyphen, no `..`. Anything else could smuggle path or URL
/// segments into fetch targets.
fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.len() <= 100
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !identifier.starts_with('.')
        && !identifier.starts_with('-')
        && !identifier.ends_with('.')
        && !identifier.ends_with('-')
        && !identifier.contains("..")
}

/// Provider of manifests (and resolved SHAs) for graph construction.
///
/// Implementations may be called concurrently for specs at the same BFS
/// level and use interior mutability for any caching.
pub trait ManifestSource {
    /// Resolve `spec` and return its commit SHA and parsed manifest.
    async fn load(&self, spec: &DependencySpec) -> Result<(String, Manifest), ApmError>;
}

/// A fully resolved dependency node.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub spec: DependencySpec,
    pub resolved_sha: String,
    pub manifest: Manifest,
    /// Distance from the root manifest (direct dependencies are 1).
    pub depth: usize,
}

/// Non-fatal observations made during resolution.
#[derive(Debug, Clone)]
pub enum ResolutionWarning {
    /// Two manifests requested the same package at different refs; the
    /// first-encountered ref was kept.
    VersionOverride {
        package: String,
        kept: Option<String>,
        ignored: Option<String>,
    },
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionOverride {
                package,
                kept,
                ignored,
            } => {
                let kept = kept.as_deref().unwrap_or("default branch");
                let ignored = ignored.as_deref().unwrap_or("default branch");
                write!(
                    f,
                    "version override for {package}: keeping '{kept}', ignoring '{ignored}'"
                )
            }
        }
    }
}

/// The resolved graph, ready for installation.
#[derive(Debug)]
pub struct ResolvedGraph {
    /// Nodes in install order: leaves first, ties by first-seen order.
    pub install_order: Vec<ResolvedNode>,
    /// Version override and similar warnings.
    pub warnings: Vec<ResolutionWarning>,
}

impl ResolvedGraph {
    /// True when the root manifest declared no APM dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.install_order.is_empty()
    }
}

/// Bounded BFS graph builder.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder {
    max_depth: usize,
    max_nodes: usize,
    max_parallel: usize,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self {
            max_depth: MAX_GRAPH_DEPTH,
            max_nodes: MAX_GRAPH_NODES,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

impl GraphBuilder {
    /// Builder with the default depth, node, and parallelism limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with custom depth and node limits (used by tests).
    #[must_use]
    pub const fn with_limits(max_depth: usize, max_nodes: usize) -> Self {
        Self {
            max_depth,
            max_nodes,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    /// Override the per-level fetch parallelism.
    #[must_use]
    pub fn with_parallelism(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Resolve the full transitive graph below `root`.
    ///
    /// Specs at the same BFS depth are loaded concurrently (bounded by
    /// the configured parallelism); node insertion and warning emission
    /// follow manifest order, so the result is deterministic.
    ///
    /// # Errors
    ///
    /// [`ApmError::InvalidDependency`] for malformed specs,
    /// [`ApmError::DependencyExplosion`] when limits are exceeded,
    /// [`ApmError::CircularDependency`] for cycles, plus whatever the
    /// manifest source surfaces.
    pub async fn build<S: ManifestSource>(
        &self,
        root: &Manifest,
        source: &S,
    ) -> Result<ResolvedGraph, ApmError> {
        const ROOT_KEY: &str = ".";

        let mut graph = DependencyGraph::new();
        graph.ensure_node(ROOT_KEY);

        let mut nodes: HashMap<String, ResolvedNode> = HashMap::new();
        let mut warnings = Vec::new();

        let mut level: VecDeque<(DependencySpec, String)> = root
            .dependencies
            .apm
            .iter()
            .map(|raw| DependencySpec::parse(raw).map(|s| (s, ROOT_KEY.to_string())))
            .collect::<Result<_, _>>()?;
        let mut depth = 1;

        while !level.is_empty() {
            if depth > self.max_depth {
                let (spec, _) = &level[0];
                return Err(ApmError::DependencyExplosion {
                    reason: format!("dependency '{spec}' exceeds the depth limit"),
                    max_depth: self.max_depth,
                    max_nodes: self.max_nodes,
                });
            }

            // Record edges and pick the specs to load, manifest order.
            let mut to_load: Vec<DependencySpec> = Vec::new();
            for (spec, parent) in &level {
                let key = spec.key();
                graph.add_dependency(parent, &key);

                let first_request = nodes
                    .get(&key)
                    .map(|n| n.spec.reference.clone())
                    .or_else(|| {
                        to_load.iter().find(|s| s.key() == key).map(|s| s.reference.clone())
                    });
                match first_request {
                    None => to_load.push(spec.clone()),
                    Some(kept) if kept != spec.reference => {
                        warn!("Version override for {key}: first-encountered ref wins");
                        warnings.push(ResolutionWarning::VersionOverride {
                            package: key,
                            kept,
                            ignored: spec.reference.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }

            if nodes.len() + to_load.len() > self.max_nodes {
                return Err(ApmError::DependencyExplosion {
                    reason: format!("node count exceeds {}", self.max_nodes),
                    max_depth: self.max_depth,
                    max_nodes: self.max_nodes,
                });
            }

            // Concurrent region: load this level through a bounded pool.
            let mut loaded: HashMap<String, (String, Manifest)> =
                futures::stream::iter(to_load.iter().cloned())
                    .map(move |spec| async move {
                        debug!("Resolving {spec} (depth {depth})");
                        let result = source.load(&spec).await?;
                        Ok::<_, ApmError>((spec.key(), result))
                    })
                    .buffer_unordered(self.max_parallel)
                    .collect::<Vec<_>>()
                    .await
                    .into_iter()
                    .collect::<Result<_, _>>()?;

            // Insert nodes and queue children in manifest order.
            let mut next: VecDeque<(DependencySpec, String)> = VecDeque::new();
            for spec in to_load {
                let key = spec.key();
                let (resolved_sha, manifest) =
                    loaded.remove(&key).expect("every loaded spec has a result");

                for raw in &manifest.dependencies.apm {
                    next.push_back((DependencySpec::parse(raw)?, key.clone()));
                }

                nodes.insert(
                    key,
                    ResolvedNode {
                        spec,
                        resolved_sha,
                        manifest,
                        depth,
                    },
                );
            }

            level = next;
            depth += 1;
        }

        let order = graph.install_order()?;
        let install_order = order
            .into_iter()
            .filter(|key| key != ROOT_KEY)
            .map(|key| nodes.remove(&key).expect("ordered node was resolved"))
            .collect();

        Ok(ResolvedGraph {
            install_order,
            warnings,
        })
    }
}
