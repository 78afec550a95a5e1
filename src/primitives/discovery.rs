//! Recursive primitive discovery.
//!
//! Discovery takes a set of package roots (the project itself plus each
//! installed dependency) and scans two scopes per root:
//!
//! - the `.apm/` and `.github/` subtrees, for all four primitive kinds
//! - the bare root, for `*.prompt.md` workflows at depth ≤ 2
//!
//! Files elsewhere in a package never become primitives, so a
//! dependency's own `src/` or `docs/` tree cannot leak suffixed files
//! into the collection. Each candidate is parsed and validated; a
//! single malformed file never aborts discovery. Hidden directories
//! inside the scanned scopes are skipped, and symlinks are never
//! followed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{Primitive, PrimitiveCollection, PrimitiveKind, ValidationWarning, build_primitive};
use crate::constants::{MODULES_DIR, PRUNED_DIRS};
use crate::markdown::parse_document;
use crate::utils::is_hidden_name;

/// Subtrees of a package root scanned for every primitive kind.
const PRIMITIVE_SUBTREES: &[&str] = &[".apm", ".github"];

/// Maximum file depth for root-level workflow discovery.
const ROOT_WORKFLOW_DEPTH: usize = 2;

/// Where a discovery root comes from. Local primitives shadow dependency
/// primitives with the same root-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveOrigin {
    /// The project's own tree.
    Local,
    /// An installed dependency, keyed `owner/repo`.
    Dependency(String),
}

/// One package root to scan.
#[derive(Debug, Clone)]
pub struct DiscoveryRoot {
    /// Package root directory.
    pub dir: PathBuf,
    /// Origin used for shadowing decisions.
    pub origin: PrimitiveOrigin,
}

/// Result of a discovery pass.
#[derive(Debug, Default)]
pub struct Discovered {
    /// All valid primitives, sorted per kind.
    pub collection: PrimitiveCollection,
    /// Non-fatal problems, in walk order.
    pub warnings: Vec<ValidationWarning>,
}

/// Build the standard root set for a project: the project root itself,
/// then one root per installed dependency under `apm_modules/`.
///
/// Dependency roots are ordered by path so discovery is deterministic
/// regardless of install order.
#[must_use]
pub fn project_roots(project_dir: &Path) -> Vec<DiscoveryRoot> {
    let mut roots = vec![DiscoveryRoot {
        dir: project_dir.to_path_buf(),
        origin: PrimitiveOrigin::Local,
    }];

    let modules = project_dir.join(MODULES_DIR);
    let mut dependency_dirs = Vec::new();
    if let Ok(owners) = std::fs::read_dir(&modules) {
        for owner in owners.filter_map(Result::ok) {
            if !owner.path().is_dir() {
                continue;
            }
            let owner_name = owner.file_name().to_string_lossy().into_owned();
            if is_hidden_name(&owner_name) {
                continue;
            }
            if let Ok(repos) = std::fs::read_dir(owner.path()) {
                for repo in repos.filter_map(Result::ok) {
                    if repo.path().is_dir() {
                        let repo_name = repo.file_name().to_string_lossy().into_owned();
                        dependency_dirs.push((format!("{owner_name}/{repo_name}"), repo.path()));
                    }
                }
            }
        }
    }
    dependency_dirs.sort();

    roots.extend(dependency_dirs.into_iter().map(|(key, dir)| DiscoveryRoot {
        dir,
        origin: PrimitiveOrigin::Dependency(key),
    }));
    roots
}

/// Discover primitives under the given roots.
///
/// Roots are processed in order; [`PrimitiveOrigin::Local`] roots must
/// come first for shadowing to apply.
#[must_use]
pub fn discover(roots: &[DiscoveryRoot]) -> Discovered {
    let mut discovered = Discovered::default();
    let mut seen: HashSet<(PrimitiveKind, PathBuf)> = HashSet::new();

    for root in roots {
        scan_root(root, &mut seen, &mut discovered);
    }

    discovered.collection.sort();
    discovered
}

fn scan_root(
    root: &DiscoveryRoot,
    seen: &mut HashSet<(PrimitiveKind, PathBuf)>,
    out: &mut Discovered,
) {
    if !root.dir.is_dir() {
        return;
    }

    for subtree in PRIMITIVE_SUBTREES {
        scan_primitive_subtree(root, &root.dir.join(subtree), seen, out);
    }
    scan_root_workflows(root, seen, out);
}

/// Scan a `.apm/`-style subtree for all four primitive kinds.
fn scan_primitive_subtree(
    root: &DiscoveryRoot,
    subtree: &Path,
    seen: &mut HashSet<(PrimitiveKind, PathBuf)>,
    out: &mut Discovered,
) {
    if !subtree.is_dir() {
        return;
    }

    let walker = WalkDir::new(subtree)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(prune_dirs);

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let Some(kind) = PrimitiveKind::from_file_name(&file_name) else {
            continue;
        };
        collect(root, kind, entry.path(), seen, out);
    }
}

/// Scan the bare package root for `*.prompt.md` workflows at depth ≤ 2.
///
/// Hidden directories are skipped here; workflows kept inside `.apm/`
/// are picked up by the subtree scan instead.
fn scan_root_workflows(
    root: &DiscoveryRoot,
    seen: &mut HashSet<(PrimitiveKind, PathBuf)>,
    out: &mut Discovered,
) {
    let walker = WalkDir::new(&root.dir)
        .max_depth(ROOT_WORKFLOW_DEPTH)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(prune_dirs);

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().ends_with(".prompt.md") {
            continue;
        }
        collect(root, PrimitiveKind::Workflow, entry.path(), seen, out);
    }
}

/// Directory filter shared by both scopes: keep the walk root, drop
/// hidden and always-pruned directories below it.
fn prune_dirs(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !(PRUNED_DIRS.contains(&name.as_ref()) || is_hidden_name(&name))
}

fn collect(
    root: &DiscoveryRoot,
    kind: PrimitiveKind,
    path: &Path,
    seen: &mut HashSet<(PrimitiveKind, PathBuf)>,
    out: &mut Discovered,
) {
    let rel = path.strip_prefix(&root.dir).unwrap_or(path).to_path_buf();

    if seen.contains(&(kind, rel.clone())) {
        debug!(
            "Shadowed {} primitive at {} (local copy wins)",
            kind,
            path.display()
        );
        return;
    }

    match parse_and_build(kind, path) {
        Ok(primitive) => {
            seen.insert((kind, rel));
            out.collection.push(primitive);
        }
        Err(warning) => {
            warn!("Skipping {}: {}", warning.file.display(), warning.reason);
            out.warnings.push(warning);
        }
    }
}

fn parse_and_build(kind: PrimitiveKind, path: &Path) -> Result<Primitive, ValidationWarning> {
    let content = std::fs::read_to_string(path).map_err(|e| ValidationWarning {
        file: path.to_path_buf(),
        reason: format!("unreadable file: {e}"),
    })?;

    let doc = parse_document(&content, path).map_err(|e| ValidationWarning {
        file: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    build_primitive(kind, &doc, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const INSTRUCTION: &str =
        "---\ndescription: docs style\napplyTo: \"docs/**/*.md\"\n---\nUse present tense.\n";

    #[test]
    fn test_discovers_all_kinds() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, ".apm/instructions/style.instructions.md", INSTRUCTION);
        write(
            root,
            ".apm/chatmodes/main.chatmode.md",
            "---\ndescription: persona\n---\nBe precise.\n",
        );
        write(root, ".apm/context/arch.context.md", "Background.\n");
        write(root, "hello.prompt.md", "Say hello to ${input:name}.\n");

        let found = discover(&project_roots(root));
        assert_eq!(found.collection.instructions.len(), 1);
        assert_eq!(found.collection.chatmodes.len(), 1);
        assert_eq!(found.collection.contexts.len(), 1);
        assert_eq!(found.collection.workflows.len(), 1);
        assert!(found.warnings.is_empty());
    }

    #[test]
    fn test_invalid_file_warns_and_continues() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, ".apm/instructions/good.instructions.md", INSTRUCTION);
        write(
            root,
            ".apm/instructions/bad.instructions.md",
            "---\ndescription: no pattern\n---\nbody\n",
        );

        let found = discover(&project_roots(root));
        assert_eq!(found.collection.instructions.len(), 1);
        assert_eq!(found.warnings.len(), 1);
        assert!(found.warnings[0].reason.contains("applyTo"));
    }

    #[test]
    fn test_scans_apm_and_github_subtrees_only() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, ".apm/a.context.md", "a\n");
        write(root, ".github/b.context.md", "b\n");
        write(root, ".secret/c.context.md", "c\n");

        let found = discover(&project_roots(root));
        assert_eq!(found.collection.contexts.len(), 2);
    }

    #[test]
    fn test_primitives_outside_apm_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/style.instructions.md", INSTRUCTION);
        write(root, "src/notes.context.md", "Not a primitive here.\n");
        write(
            root,
            "src/persona.chatmode.md",
            "---\ndescription: persona\n---\nBody.\n",
        );

        let found = discover(&project_roots(root));
        assert!(found.collection.is_empty());
        assert!(found.warnings.is_empty());
    }

    #[test]
    fn test_root_workflows_bounded_to_depth_two() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "top.prompt.md", "depth one\n");
        write(root, "prompts/hello.prompt.md", "depth two\n");
        write(root, "prompts/deep/far.prompt.md", "depth three\n");

        let found = discover(&project_roots(root));
        let names: Vec<_> =
            found.collection.workflows.iter().map(|w| w.name.clone()).collect();
        assert_eq!(names, vec!["hello", "top"]);
    }

    #[test]
    fn test_dependency_scoped_to_its_apm_tree() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "apm_modules/acme/ctx/.apm/instructions/dep.instructions.md",
            INSTRUCTION,
        );
        write(
            root,
            "apm_modules/acme/ctx/src/evil.instructions.md",
            INSTRUCTION,
        );
        write(root, "apm_modules/acme/ctx/docs/guide/x.prompt.md", "deep\n");
        write(root, "apm_modules/acme/ctx/hello.prompt.md", "shallow\n");

        let found = discover(&project_roots(root));
        assert_eq!(found.collection.instructions.len(), 1);
        assert!(
            found.collection.instructions[0]
                .source_path
                .to_string_lossy()
                .contains(".apm")
        );
        // docs/guide/x.prompt.md is depth 3 within the dependency root
        assert_eq!(found.collection.workflows.len(), 1);
        assert_eq!(found.collection.workflows[0].name, "hello");
    }

    #[test]
    fn test_local_shadows_dependency() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, ".apm/instructions/style.instructions.md", INSTRUCTION);
        write(
            root,
            "apm_modules/acme/ctx/.apm/instructions/style.instructions.md",
            "---\ndescription: dependency copy\napplyTo: \"**/*.md\"\n---\nShadowed.\n",
        );

        let found = discover(&project_roots(root));
        assert_eq!(found.collection.instructions.len(), 1);
        assert_eq!(found.collection.instructions[0].description, "docs style");
    }

    #[test]
    fn test_deterministic_ordering() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, ".apm/instructions/zeta.instructions.md", INSTRUCTION);
        write(root, ".apm/instructions/alpha.instructions.md", INSTRUCTION);

        let found = discover(&project_roots(root));
        let names: Vec<_> =
            found.collection.instructions.iter().map(|i| i.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_empty_project() {
        let dir = tempdir().unwrap();
        let found = discover(&project_roots(dir.path()));
        assert!(found.collection.is_empty());
        assert!(found.warnings.is_empty());
    }
}
