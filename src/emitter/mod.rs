//! Compiled output rendering.
//!
//! For every directory in the placement map the emitter renders one
//! output file (default `AGENTS.md`): an optional constitution block and
//! chatmode preamble at the project root, then one section per `applyTo`
//! pattern containing the placed instruction bodies in discovery order.
//! Writes are atomic and idempotent: recompiling an unchanged workspace
//! produces byte-identical files.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::constants::{CONSTITUTION_BEGIN, CONSTITUTION_END, CONSTITUTION_PATH, PRUNED_DIRS};
use crate::core::ApmError;
use crate::manifest::PlacementConfig;
use crate::optimizer::PlacementMap;
use crate::primitives::{Chatmode, Instruction};
use crate::utils::fs::atomic_write_str;
use crate::utils::{is_hidden_name, normalize_slashes, relative_from};

/// Emitter configuration, resolved from the manifest and CLI flags.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Output file name emitted at each placement directory.
    pub output_name: String,
    /// Rewrite relative Markdown links against the output directory.
    pub resolve_links: bool,
    /// Inject `memory/constitution.md` at the root when present.
    pub constitution: bool,
    /// Chatmode to prepend to the root output.
    pub chatmode: Option<String>,
    /// Delete previously emitted files with no current placement.
    pub clean_orphaned: bool,
}

/// What a compile pass did on disk.
#[derive(Debug, Default)]
pub struct EmitResult {
    /// Files written (created or changed).
    pub written: Vec<PathBuf>,
    /// Files whose content was already up to date.
    pub unchanged: Vec<PathBuf>,
    /// Orphaned files deleted.
    pub deleted: Vec<PathBuf>,
}

/// Render and write every output file for `placements`.
///
/// # Errors
///
/// [`ApmError::ChatmodeNotFound`] when a configured chatmode is not in
/// the collection; IO errors from reading the constitution or writing
/// outputs.
pub fn emit(
    project_root: &Path,
    placements: &PlacementMap,
    instructions: &[Instruction],
    chatmodes: &[Chatmode],
    options: &EmitOptions,
    placement_config: &PlacementConfig,
) -> Result<EmitResult, ApmError> {
    let chatmode = match &options.chatmode {
        Some(name) => Some(
            chatmodes.iter().find(|c| c.name == *name).ok_or_else(|| {
                ApmError::ChatmodeNotFound {
                    name: name.clone(),
                }
            })?,
        ),
        None => None,
    };

    let constitution = if options.constitution {
        load_constitution(project_root)?
    } else {
        None
    };

    // The root gets a file when it has placements or any global preamble.
    let mut directories: Vec<PathBuf> = placements.by_directory.keys().cloned().collect();
    if (constitution.is_some() || chatmode.is_some())
        && !directories.iter().any(|d| d.as_os_str().is_empty())
    {
        directories.push(PathBuf::new());
    }
    directories.sort();

    let mut result = EmitResult::default();
    for dir in &directories {
        let output_path = project_root.join(dir).join(&options.output_name);
        let is_root = dir.as_os_str().is_empty();

        let content = render_file(
            project_root,
            dir,
            placements,
            instructions,
            if is_root { chatmode } else { None },
            if is_root { constitution.as_ref() } else { None },
            &output_path,
            options,
        );

        let existing = std::fs::read_to_string(&output_path).ok();
        if existing.as_deref() == Some(content.as_str()) {
            debug!("Up to date: {}", output_path.display());
            result.unchanged.push(output_path);
        } else {
            atomic_write_str(&output_path, &content).map_err(|e| ApmError::Other {
                message: e.to_string(),
            })?;
            info!("Wrote {}", output_path.display());
            result.written.push(output_path);
        }
    }

    if options.clean_orphaned {
        clean_orphans(project_root, &directories, options, placement_config, &mut result)?;
    }

    Ok(result)
}

/// Constitution bytes and their 12-hex-digit SHA-256 prefix.
#[derive(Debug, Clone)]
struct Constitution {
    hash: String,
    contents: String,
}

fn load_constitution(project_root: &Path) -> Result<Option<Constitution>, ApmError> {
    let path = project_root.join(CONSTITUTION_PATH);
    if !path.is_file() {
        // Absence is not an error; the block is simply omitted.
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    let digest = Sha256::digest(&bytes);
    let hash = hex::encode(digest)[..12].to_string();
    Ok(Some(Constitution {
        hash,
        contents: String::from_utf8_lossy(&bytes).into_owned(),
    }))
}

/// Render the constitution block, reusing the existing block bytes when
/// the recorded hash is unchanged.
fn constitution_block(constitution: &Constitution, output_path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(output_path) {
        if let Some(block) = extract_block(&existing) {
            if block.contains(&format!("hash: {} ", constitution.hash)) {
                return block;
            }
        }
    }

    let mut contents = constitution.contents.clone();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    format!(
        "{CONSTITUTION_BEGIN}\nhash: {} path: {CONSTITUTION_PATH}\n{contents}{CONSTITUTION_END}\n",
        constitution.hash
    )
}

/// Extract an existing constitution block, markers included.
fn extract_block(content: &str) -> Option<String> {
    let begin = content.find(CONSTITUTION_BEGIN)?;
    let end_marker = content[begin..].find(CONSTITUTION_END)?;
    let end = begin + end_marker + CONSTITUTION_END.len();
    let mut block = content[begin..end].to_string();
    block.push('\n');
    Some(block)
}

#[allow(clippy::too_many_arguments)]
fn render_file(
    project_root: &Path,
    dir: &Path,
    placements: &PlacementMap,
    instructions: &[Instruction],
    chatmode: Option<&Chatmode>,
    constitution: Option<&Constitution>,
    output_path: &Path,
    options: &EmitOptions,
) -> String {
    let output_dir = project_root.join(dir);
    let mut parts: Vec<String> = Vec::new();

    if let Some(c) = constitution {
        parts.push(constitution_block(c, output_path).trim_end().to_string());
    }

    if let Some(c) = chatmode {
        let body = if options.resolve_links {
            resolve_links(&c.body, c.source_path.parent().unwrap_or(project_root), &output_dir)
        } else {
            c.body.clone()
        };
        parts.push(body.trim_end().to_string());
    }

    if let Some(placed) = placements.by_directory.get(dir) {
        // Group by pattern, preserving first-seen order.
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for p in placed {
            match groups.iter_mut().find(|(pattern, _)| *pattern == p.pattern) {
                Some((_, members)) => members.push(p.instruction_index),
                None => groups.push((&p.pattern, vec![p.instruction_index])),
            }
        }

        for (pattern, members) in groups {
            let mut section = format!("## Files matching `{pattern}`\n");
            for index in members {
                let instruction = &instructions[index];
                let body = if options.resolve_links {
                    resolve_links(
                        &instruction.body,
                        instruction.source_path.parent().unwrap_or(project_root),
                        &output_dir,
                    )
                } else {
                    instruction.body.clone()
                };
                section.push('\n');
                section.push_str(body.trim_end());
                section.push('\n');
            }
            parts.push(section.trim_end().to_string());
        }
    }

    let mut content = parts.join("\n\n");
    content.push('\n');
    content
}

/// Rewrite relative Markdown links to be relative to the emitted file.
///
/// `[text](target)` targets are resolved against the primitive's source
/// directory, then re-expressed relative to the output directory.
/// Absolute URLs, in-page anchors, and absolute paths pass through.
fn resolve_links(body: &str, source_dir: &Path, output_dir: &Path) -> String {
    let link_re = Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").expect("static regex");

    link_re
        .replace_all(body, |caps: &regex::Captures<'_>| {
            let text = &caps[1];
            let target = &caps[2];
            if target.contains("://")
                || target.starts_with('#')
                || target.starts_with('/')
                || target.starts_with("mailto:")
            {
                return caps[0].to_string();
            }

            let (path_part, anchor) = match target.split_once('#') {
                Some((p, a)) => (p, Some(a)),
                None => (target, None),
            };
            if path_part.is_empty() {
                return caps[0].to_string();
            }

            let absolute = normalize_path(&source_dir.join(path_part));
            let relative = relative_from(&absolute, &normalize_path(output_dir));
            let mut rewritten = normalize_slashes(&relative);
            if let Some(anchor) = anchor {
                rewritten.push('#');
                rewritten.push_str(anchor);
            }
            format!("[{text}]({rewritten})")
        })
        .into_owned()
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other),
        }
    }
    result
}

/// Delete previously emitted output files with no current placement.
fn clean_orphans(
    project_root: &Path,
    current: &[PathBuf],
    options: &EmitOptions,
    placement_config: &PlacementConfig,
    result: &mut EmitResult,
) -> Result<(), ApmError> {
    let walker = WalkDir::new(project_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() || entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !(PRUNED_DIRS.contains(&name.as_ref())
                || is_hidden_name(&name)
                || placement_config.ignore.iter().any(|i| i == name.as_ref()))
        });

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy() != options.output_name.as_str() {
            continue;
        }
        let dir = entry
            .path()
            .parent()
            .and_then(|p| p.strip_prefix(project_root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if !current.contains(&dir) {
            std::fs::remove_file(entry.path())?;
            info!("Removed orphaned {}", entry.path().display());
            result.deleted.push(entry.path().to_path_buf());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DirectoryAnalysisCache;
    use crate::manifest::OptimizationWeights;
    use crate::optimizer::optimize;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn instruction(root: &Path, apply_to: &str, body: &str) -> Instruction {
        Instruction {
            name: "style".to_string(),
            description: "style".to_string(),
            apply_to: apply_to.to_string(),
            author: None,
            version: None,
            body: body.to_string(),
            source_path: root.join(".apm/instructions/style.instructions.md"),
        }
    }

    fn options() -> EmitOptions {
        EmitOptions {
            output_name: "AGENTS.md".to_string(),
            resolve_links: true,
            constitution: true,
            chatmode: None,
            clean_orphaned: false,
        }
    }

    fn compile_and_emit(
        root: &Path,
        instructions: &[Instruction],
        options: &EmitOptions,
    ) -> EmitResult {
        let config = PlacementConfig::default();
        let cache = DirectoryAnalysisCache::build(root, &config);
        let placements =
            optimize(instructions, &cache, &OptimizationWeights::default()).unwrap();
        emit(root, &placements, instructions, &[], options, &config).unwrap()
    }

    #[test]
    fn test_scenario_single_point_section() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md", "x");
        write(root, "docs/b.md", "x");
        write(root, "src/main.py", "x");

        let instructions = vec![instruction(root, "docs/**/*.md", "Use present tense.\n")];
        compile_and_emit(root, &instructions, &options());

        let out = fs::read_to_string(root.join("docs/AGENTS.md")).unwrap();
        assert_eq!(
            out,
            "## Files matching `docs/**/*.md`\n\nUse present tense.\n"
        );
        assert!(!root.join("AGENTS.md").exists());
        assert!(!root.join("src/AGENTS.md").exists());
    }

    #[test]
    fn test_constitution_block_at_root() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "a.py", "x");
        write(root, "b.py", "x");
        write(root, "memory/constitution.md", "Principles: be kind.\n");

        let instructions = vec![instruction(root, "*.py", "Use type hints.\n")];
        compile_and_emit(root, &instructions, &options());

        let out = fs::read_to_string(root.join("AGENTS.md")).unwrap();
        assert!(out.starts_with(CONSTITUTION_BEGIN));
        let digest = Sha256::digest(b"Principles: be kind.\n");
        let hash = &hex::encode(digest)[..12];
        let second_line = out.lines().nth(1).unwrap();
        assert_eq!(second_line, format!("hash: {hash} path: memory/constitution.md"));
        assert!(out.contains("Principles: be kind."));
        assert!(out.contains(CONSTITUTION_END));
    }

    #[test]
    fn test_compile_idempotent() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md", "x");
        write(root, "src/b.py", "x");
        write(root, "memory/constitution.md", "Principles.\n");

        let instructions = vec![instruction(root, "docs/**/*.md", "Tense.\n")];
        let opts = options();
        let first = compile_and_emit(root, &instructions, &opts);
        assert!(!first.written.is_empty());
        let bytes_before = fs::read(root.join("docs/AGENTS.md")).unwrap();

        let second = compile_and_emit(root, &instructions, &opts);
        assert!(second.written.is_empty());
        assert!(second.deleted.is_empty());
        let bytes_after = fs::read(root.join("docs/AGENTS.md")).unwrap();
        assert_eq!(bytes_before, bytes_after);
    }

    #[test]
    fn test_sections_grouped_by_pattern() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md", "x");
        write(root, "src/b.py", "x");

        let mut one = instruction(root, "docs/**/*.md", "First rule.\n");
        one.name = "one".into();
        let mut two = instruction(root, "docs/**/*.md", "Second rule.\n");
        two.name = "two".into();

        compile_and_emit(root, &[one, two], &options());
        let out = fs::read_to_string(root.join("docs/AGENTS.md")).unwrap();
        assert_eq!(out.matches("## Files matching").count(), 1);
        let first = out.find("First rule.").unwrap();
        let second = out.find("Second rule.").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_link_rewriting() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md", "x");
        write(root, "src/b.py", "x");

        let body = "See [the diagram](assets/arch.png) and [site](https://example.com) and [top](#top).\n";
        let instructions = vec![instruction(root, "docs/**/*.md", body)];
        compile_and_emit(root, &instructions, &options());

        let out = fs::read_to_string(root.join("docs/AGENTS.md")).unwrap();
        // instruction lives in .apm/instructions/; emitted file in docs/
        assert!(out.contains("(../.apm/instructions/assets/arch.png)"));
        assert!(out.contains("(https://example.com)"));
        assert!(out.contains("(#top)"));
    }

    #[test]
    fn test_links_verbatim_when_disabled() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md", "x");
        write(root, "src/b.py", "x");

        let body = "See [the diagram](assets/arch.png).\n";
        let instructions = vec![instruction(root, "docs/**/*.md", body)];
        let opts = EmitOptions {
            resolve_links: false,
            ..options()
        };
        compile_and_emit(root, &instructions, &opts);

        let out = fs::read_to_string(root.join("docs/AGENTS.md")).unwrap();
        assert!(out.contains("(assets/arch.png)"));
    }

    #[test]
    fn test_orphan_cleanup() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md", "x");
        write(root, "src/b.py", "x");
        write(root, "stale/AGENTS.md", "old output\n");
        fs::create_dir_all(root.join("stale")).unwrap();

        let instructions = vec![instruction(root, "docs/**/*.md", "Rule.\n")];
        let opts = EmitOptions {
            clean_orphaned: true,
            ..options()
        };
        let result = compile_and_emit(root, &instructions, &opts);
        assert_eq!(result.deleted.len(), 1);
        assert!(!root.join("stale/AGENTS.md").exists());
        assert!(root.join("docs/AGENTS.md").exists());
    }

    #[test]
    fn test_chatmode_prepended_at_root() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "a.py", "x");
        write(root, "b.py", "x");

        let chatmode = Chatmode {
            name: "architect".to_string(),
            description: "persona".to_string(),
            apply_to: None,
            author: None,
            version: None,
            body: "You are a careful architect.\n".to_string(),
            source_path: root.join(".apm/chatmodes/architect.chatmode.md"),
        };
        let instructions = vec![instruction(root, "*.py", "Hints.\n")];
        let config = PlacementConfig::default();
        let cache = DirectoryAnalysisCache::build(root, &config);
        let placements =
            optimize(&instructions, &cache, &OptimizationWeights::default()).unwrap();
        let opts = EmitOptions {
            chatmode: Some("architect".to_string()),
            ..options()
        };
        emit(root, &placements, &instructions, &[chatmode], &opts, &config).unwrap();

        let out = fs::read_to_string(root.join("AGENTS.md")).unwrap();
        let persona = out.find("careful architect").unwrap();
        let section = out.find("## Files matching").unwrap();
        assert!(persona < section);
    }

    #[test]
    fn test_missing_chatmode_is_error() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "a.py", "x");

        let instructions = vec![instruction(root, "*.py", "Hints.\n")];
        let config = PlacementConfig::default();
        let cache = DirectoryAnalysisCache::build(root, &config);
        let placements =
            optimize(&instructions, &cache, &OptimizationWeights::default()).unwrap();
        let opts = EmitOptions {
            chatmode: Some("ghost".to_string()),
            ..options()
        };
        let err =
            emit(root, &placements, &instructions, &[], &opts, &config).unwrap_err();
        assert!(matches!(err, ApmError::ChatmodeNotFound { .. }));
    }

    #[test]
    fn test_trailing_newline_and_lf() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "docs/a.md", "x");
        write(root, "src/b.py", "x");

        let instructions = vec![instruction(root, "docs/**/*.md", "Rule.")];
        compile_and_emit(root, &instructions, &options());
        let out = fs::read_to_string(root.join("docs/AGENTS.md")).unwrap();
        assert!(out.ends_with('\n'));
        assert!(!out.ends_with("\n\n"));
        assert!(!out.contains('\r'));
    }
}
