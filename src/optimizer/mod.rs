//! Context-optimization placement.
//!
//! For each instruction the optimizer chooses the directories that will
//! receive a compiled output file, subject to a hard coverage constraint
//! (every file matching the instruction's `applyTo` pattern must have a
//! placement on its ancestor chain) while minimizing context pollution
//! (irrelevant files inheriting the instruction).
//!
//! Strategy selection is a three-tier heuristic over a distribution
//! score measuring how spread out a pattern's matches are:
//!
//! - score < 0.3 → `SinglePoint` at the lowest common ancestor
//! - 0.3 ≤ score ≤ 0.7 → `SelectiveMulti` greedy cover
//! - score > 0.7 → `Distributed` at the project root
//!
//! Coverage is re-verified after every strategy; a gap escalates toward
//! the root and is retagged `RootFallback`. All candidate sets are
//! materialized as sorted lists and ties break on the lexicographically
//! smaller path, so the result is a deterministic function of its
//! inputs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::analysis::DirectoryAnalysisCache;
use crate::core::ApmError;
use crate::manifest::OptimizationWeights;
use crate::pattern::ApplyToPattern;
use crate::primitives::Instruction;

/// How a placement set was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyTag {
    /// Single output at the lowest common ancestor of all match sites.
    SinglePoint,
    /// Greedy minimal cover across several directories.
    SelectiveMulti,
    /// Matches are spread project-wide; one output at the root.
    Distributed,
    /// Coverage escalation reached the root.
    RootFallback,
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SinglePoint => "single-point",
            Self::SelectiveMulti => "selective-multi",
            Self::Distributed => "distributed",
            Self::RootFallback => "root-fallback",
        };
        f.write_str(s)
    }
}

/// Placement result for one instruction.
#[derive(Debug, Clone)]
pub struct InstructionPlacement {
    /// Index into the instruction list handed to [`optimize`].
    pub instruction_index: usize,
    /// The instruction's `applyTo` pattern.
    pub pattern: String,
    /// Chosen directories, root-relative, sorted. Empty when the pattern
    /// matched no files.
    pub directories: Vec<PathBuf>,
    /// Strategy used; `None` when the pattern matched nothing.
    pub strategy: Option<StrategyTag>,
    /// Distribution score that drove strategy selection.
    pub distribution_score: f64,
    /// Number of project files matching the pattern.
    pub matching_files: usize,
    /// Coverage ratio; 1.0 by construction.
    pub coverage_ratio: f64,
    /// Irrelevant files inheriting the instruction across placements.
    pub pollution: usize,
}

/// An instruction placed at a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedInstruction {
    /// The instruction's `applyTo` pattern (section grouping key).
    pub pattern: String,
    /// Index into the instruction list.
    pub instruction_index: usize,
}

/// Complete placement result for a compile.
#[derive(Debug, Clone, Default)]
pub struct PlacementMap {
    /// Directory → instructions placed there, in discovery order.
    pub by_directory: BTreeMap<PathBuf, Vec<PlacedInstruction>>,
    /// Per-instruction decisions and metrics, in discovery order.
    pub per_instruction: Vec<InstructionPlacement>,
}

impl PlacementMap {
    /// True when nothing was placed anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_directory.is_empty()
    }
}

/// Solve placement for every instruction.
///
/// # Errors
///
/// [`ApmError::InvalidGlob`] when a pattern fails to compile, and
/// [`ApmError::CoverageViolation`] if a file remains uncovered after
/// root fallback (an internal invariant violation).
pub fn optimize(
    instructions: &[Instruction],
    cache: &DirectoryAnalysisCache,
    weights: &OptimizationWeights,
) -> Result<PlacementMap, ApmError> {
    let mut map = PlacementMap::default();

    for (index, instruction) in instructions.iter().enumerate() {
        let pattern = ApplyToPattern::new(&instruction.apply_to)?;
        let placement = place_instruction(index, &pattern, cache, weights)?;

        for dir in &placement.directories {
            map.by_directory.entry(dir.clone()).or_default().push(PlacedInstruction {
                pattern: placement.pattern.clone(),
                instruction_index: index,
            });
        }
        map.per_instruction.push(placement);
    }

    Ok(map)
}

fn place_instruction(
    index: usize,
    pattern: &ApplyToPattern,
    cache: &DirectoryAnalysisCache,
    weights: &OptimizationWeights,
) -> Result<InstructionPlacement, ApmError> {
    let matching_files: Vec<&PathBuf> =
        cache.files().iter().filter(|f| pattern.matches(f)).collect();

    if matching_files.is_empty() {
        debug!("Pattern '{}' matches no files; no placement", pattern);
        return Ok(InstructionPlacement {
            instruction_index: index,
            pattern: pattern.as_str().to_string(),
            directories: Vec::new(),
            strategy: None,
            distribution_score: 0.0,
            matching_files: 0,
            coverage_ratio: 1.0,
            pollution: 0,
        });
    }

    let matching_dirs = dirs_of(&matching_files);
    let score = distribution_score(&matching_dirs, cache);

    let (mut directories, mut strategy) = if score < 0.3 {
        (vec![lowest_common_ancestor(&matching_dirs)], StrategyTag::SinglePoint)
    } else if score <= 0.7 {
        (
            greedy_cover(&matching_files, &matching_dirs, cache, weights),
            StrategyTag::SelectiveMulti,
        )
    } else {
        (vec![PathBuf::new()], StrategyTag::Distributed)
    };
    directories.sort();
    directories.dedup();

    // Coverage is a hard constraint: escalate toward the root until every
    // matching file has a placement on its ancestor chain.
    loop {
        let uncovered: Vec<&PathBuf> = matching_files
            .iter()
            .filter(|f| !directories.iter().any(|d| dir_covers(d, f)))
            .copied()
            .collect();
        if uncovered.is_empty() {
            break;
        }

        let escalation = lowest_common_ancestor(&dirs_of(&uncovered));
        if escalation.as_os_str().is_empty() {
            directories = vec![PathBuf::new()];
            strategy = StrategyTag::RootFallback;
            break;
        }
        debug!(
            "Pattern '{}': escalating coverage to {}",
            pattern,
            escalation.display()
        );
        directories.push(escalation);
        directories.sort();
        directories.dedup();
    }

    // Must be impossible to fail at this point; re-check the invariant.
    if let Some(missed) =
        matching_files.iter().find(|f| !directories.iter().any(|d| dir_covers(d, f)))
    {
        return Err(ApmError::CoverageViolation {
            file: missed.display().to_string(),
            pattern: pattern.as_str().to_string(),
        });
    }

    let pollution = directories
        .iter()
        .map(|d| placement_pollution(d, &matching_files, cache))
        .sum();

    Ok(InstructionPlacement {
        instruction_index: index,
        pattern: pattern.as_str().to_string(),
        directories,
        strategy: Some(strategy),
        distribution_score: score,
        matching_files: matching_files.len(),
        coverage_ratio: 1.0,
        pollution,
    })
}

/// Sorted, deduplicated parent directories of a file set.
fn dirs_of(files: &[&PathBuf]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = files
        .iter()
        .map(|f| f.parent().map(Path::to_path_buf).unwrap_or_default())
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

/// Distribution score of a pattern's match sites.
///
/// `base_ratio × (1 + depth_variance × 0.5)` where `base_ratio` is the
/// fraction of file-bearing directories containing a match.
fn distribution_score(matching_dirs: &[PathBuf], cache: &DirectoryAnalysisCache) -> f64 {
    let total = cache.total_dirs_with_files().max(1);
    #[allow(clippy::cast_precision_loss)]
    let base_ratio = matching_dirs.len() as f64 / total as f64;

    let depths: Vec<f64> = matching_dirs
        .iter()
        .map(|d| {
            #[allow(clippy::cast_precision_loss)]
            let depth = cache.get(d).map_or_else(|| d.components().count(), |a| a.depth) as f64;
            depth
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let n = depths.len() as f64;
    let mean = depths.iter().sum::<f64>() / n;
    let variance = depths.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

    base_ratio * (1.0 + variance * 0.5)
}

/// True when an output at `dir` is visible to `file` via directory
/// ancestry. The empty path is the project root and covers everything.
fn dir_covers(dir: &Path, file: &Path) -> bool {
    dir.as_os_str().is_empty() || file.starts_with(dir)
}

/// Lowest common ancestor of a sorted path list, by component prefix.
fn lowest_common_ancestor(dirs: &[PathBuf]) -> PathBuf {
    let Some(first) = dirs.first() else {
        return PathBuf::new();
    };

    let mut common: Vec<&std::ffi::OsStr> = first.iter().collect();
    for dir in &dirs[1..] {
        let components: Vec<&std::ffi::OsStr> = dir.iter().collect();
        let keep =
            common.iter().zip(components.iter()).take_while(|(a, b)| a == b).count();
        common.truncate(keep);
        if common.is_empty() {
            break;
        }
    }

    common.iter().collect()
}

/// Irrelevant files that would inherit the instruction from `dir`.
fn placement_pollution(
    dir: &Path,
    matching_files: &[&PathBuf],
    cache: &DirectoryAnalysisCache,
) -> usize {
    let total = cache.get(dir).map_or(0, |a| a.recursive_files);
    let matched_under = matching_files.iter().filter(|f| dir_covers(dir, f)).count();
    total.saturating_sub(matched_under)
}

/// Greedy minimal cover for `SelectiveMulti`.
///
/// Candidates are every matching directory plus each of its ancestors up
/// to the root. Each round picks the candidate with the highest weighted
/// score (coverage gain rewarded, pollution penalized, locality
/// rewarded, depth penalized up to level 8); score ties choose the
/// lexicographically smaller path.
fn greedy_cover(
    matching_files: &[&PathBuf],
    matching_dirs: &[PathBuf],
    cache: &DirectoryAnalysisCache,
    weights: &OptimizationWeights,
) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    for dir in matching_dirs {
        let mut current = dir.clone();
        loop {
            candidates.push(current.clone());
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
        // parent() of a single component yields "", which the loop above
        // pushes before terminating
    }
    candidates.push(PathBuf::new());
    candidates.sort();
    candidates.dedup();

    let mut uncovered: Vec<&PathBuf> = matching_files.to_vec();
    let mut selected: Vec<PathBuf> = Vec::new();

    while !uncovered.is_empty() {
        let mut best: Option<(&PathBuf, f64)> = None;

        for candidate in &candidates {
            if selected.contains(candidate) {
                continue;
            }
            let gain = uncovered.iter().filter(|f| dir_covers(candidate, f)).count();
            if gain == 0 {
                continue;
            }
            let pollution = placement_pollution(candidate, matching_files, cache);
            let depth = cache
                .get(candidate)
                .map_or_else(|| candidate.components().count(), |a| a.depth);

            #[allow(clippy::cast_precision_loss)]
            let score = weights.coverage_weight * gain as f64
                - weights.pollution_weight * pollution as f64
                + weights.locality_weight * depth as f64
                - weights.depth_penalty * depth.min(8) as f64;

            // Candidates are iterated in sorted order, so a strictly
            // better score is required to displace an earlier path.
            let better = match best {
                None => true,
                Some((_, best_score)) => score > best_score,
            };
            if better {
                best = Some((candidate, score));
            }
        }

        let Some((choice, _)) = best else {
            // No candidate covers the remainder; the caller's coverage
            // escalation handles it.
            break;
        };
        let choice = choice.clone();
        uncovered.retain(|f| !dir_covers(&choice, f));
        selected.push(choice);
    }

    selected.sort();
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DirectoryAnalysisCache;
    use crate::manifest::PlacementConfig;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn instruction(apply_to: &str) -> Instruction {
        Instruction {
            name: "test".to_string(),
            description: "test".to_string(),
            apply_to: apply_to.to_string(),
            author: None,
            version: None,
            body: "Body.\n".to_string(),
            source_path: PathBuf::from(".apm/instructions/test.instructions.md"),
        }
    }

    fn optimize_one(root: &Path, apply_to: &str) -> PlacementMap {
        let cache = DirectoryAnalysisCache::build(root, &PlacementConfig::default());
        optimize(
            &[instruction(apply_to)],
            &cache,
            &OptimizationWeights::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_scenario_single_docs_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md");
        write(root, "docs/b.md");
        write(root, "src/main.py");

        let map = optimize_one(root, "docs/**/*.md");
        let dirs: Vec<_> = map.by_directory.keys().cloned().collect();
        assert_eq!(dirs, vec![PathBuf::from("docs")]);
        assert_eq!(map.per_instruction[0].matching_files, 2);
        assert_eq!(map.per_instruction[0].pollution, 0);
    }

    #[test]
    fn test_scenario_distributed_to_root() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md");
        write(root, "docs/b.md");
        write(root, "src/main.py");
        write(root, "src/a.py");
        write(root, "lib/b.py");
        write(root, "tools/c.py");
        write(root, "scripts/d.py");

        let map = optimize_one(root, "**/*.py");
        let dirs: Vec<_> = map.by_directory.keys().cloned().collect();
        assert_eq!(dirs, vec![PathBuf::new()]);
        assert_eq!(
            map.per_instruction[0].strategy,
            Some(StrategyTag::Distributed)
        );
        assert!(map.per_instruction[0].distribution_score > 0.7);
    }

    #[test]
    fn test_scenario_selective_multi_disjoint_subtrees() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "frontend/components/x.tsx");
        write(root, "src/components/y.tsx");
        write(root, "src/utils/z.ts");
        write(root, "docs/readme.md");

        let map = optimize_one(root, "**/*.tsx");
        let dirs: Vec<_> = map.by_directory.keys().cloned().collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("frontend/components"),
                PathBuf::from("src/components")
            ]
        );
        assert_eq!(
            map.per_instruction[0].strategy,
            Some(StrategyTag::SelectiveMulti)
        );
        assert_eq!(map.per_instruction[0].pollution, 0);
    }

    #[test]
    fn test_zero_matches_no_placement() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "src/main.rs");

        let map = optimize_one(root, "**/*.go");
        assert!(map.is_empty());
        assert!(map.per_instruction[0].directories.is_empty());
        assert!(map.per_instruction[0].strategy.is_none());
    }

    #[test]
    fn test_root_only_matches_place_at_root() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "README.md");
        write(root, "CHANGELOG.md");
        write(root, "src/main.rs");

        let map = optimize_one(root, "*.md");
        // README.md and CHANGELOG.md live at the root; the root must be a
        // placement so they inherit the instruction
        assert!(map.by_directory.contains_key(&PathBuf::new()));
    }

    #[test]
    fn test_single_deep_directory_single_point() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "a/f.txt");
        write(root, "b/f.txt");
        write(root, "c/f.txt");
        write(root, "d/nested/deep/only.sql");

        let map = optimize_one(root, "**/*.sql");
        let dirs: Vec<_> = map.by_directory.keys().cloned().collect();
        assert_eq!(dirs, vec![PathBuf::from("d/nested/deep")]);
        assert_eq!(
            map.per_instruction[0].strategy,
            Some(StrategyTag::SinglePoint)
        );
    }

    #[test]
    fn test_coverage_invariant_holds() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "a/x.md");
        write(root, "a/b/y.md");
        write(root, "c/z.md");
        write(root, "d/w.txt");

        let cache = DirectoryAnalysisCache::build(root, &PlacementConfig::default());
        let map = optimize(
            &[instruction("**/*.md")],
            &cache,
            &OptimizationWeights::default(),
        )
        .unwrap();

        let placements = &map.per_instruction[0].directories;
        for file in cache.files().iter().filter(|f| {
            f.extension().is_some_and(|e| e == "md")
        }) {
            assert!(
                placements.iter().any(|d| dir_covers(d, file)),
                "{} uncovered",
                file.display()
            );
        }
    }

    #[test]
    fn test_determinism() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "m/a.md");
        write(root, "n/b.md");
        write(root, "o/c.txt");

        let first = optimize_one(root, "**/*.md");
        let second = optimize_one(root, "**/*.md");
        assert_eq!(
            first.by_directory.keys().collect::<Vec<_>>(),
            second.by_directory.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_invalid_glob_aborts() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.md");
        let cache = DirectoryAnalysisCache::build(dir.path(), &PlacementConfig::default());
        let err = optimize(
            &[instruction("[broken")],
            &cache,
            &OptimizationWeights::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ApmError::InvalidGlob { .. }));
    }

    #[test]
    fn test_lowest_common_ancestor() {
        assert_eq!(
            lowest_common_ancestor(&[PathBuf::from("a/b/c"), PathBuf::from("a/b/d")]),
            PathBuf::from("a/b")
        );
        assert_eq!(
            lowest_common_ancestor(&[PathBuf::from("a/b"), PathBuf::from("c/d")]),
            PathBuf::new()
        );
        assert_eq!(
            lowest_common_ancestor(&[PathBuf::from("a/b")]),
            PathBuf::from("a/b")
        );
        assert_eq!(lowest_common_ancestor(&[]), PathBuf::new());
    }

    #[test]
    fn test_multiple_instructions_share_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md");
        write(root, "docs/b.rst");
        write(root, "src/x.py");

        let cache = DirectoryAnalysisCache::build(root, &PlacementConfig::default());
        let map = optimize(
            &[instruction("docs/**/*.md"), instruction("docs/**/*.rst")],
            &cache,
            &OptimizationWeights::default(),
        )
        .unwrap();

        let placed = &map.by_directory[&PathBuf::from("docs")];
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].instruction_index, 0);
        assert_eq!(placed[1].instruction_index, 1);
    }
}
