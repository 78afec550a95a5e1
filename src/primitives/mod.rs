//! Typed context primitives.
//!
//! A primitive is a Markdown-with-frontmatter file classified by suffix:
//!
//! | Suffix | Kind |
//! |--------|------|
//! | `.chatmode.md` | [`Chatmode`] |
//! | `.instructions.md` | [`Instruction`] |
//! | `.context.md`, `.memory.md` | [`Context`] |
//! | `.prompt.md` | [`Workflow`] |
//!
//! Validation is per kind; a file that fails validation is skipped with a
//! [`ValidationWarning`] and never aborts discovery.

pub mod discovery;

pub use discovery::{DiscoveryRoot, PrimitiveOrigin, discover, project_roots};

use std::fmt;
use std::path::{Path, PathBuf};

use crate::markdown::ParsedDocument;

/// Primitive kind tag, ordered for deterministic collection output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveKind {
    /// Persona/voice definition, optionally scoped by `applyTo`.
    Chatmode,
    /// Rule with a mandatory `applyTo` glob; drives placement.
    Instruction,
    /// Free-form background material.
    Context,
    /// Parameterized prompt executed by scripts.
    Workflow,
}

impl PrimitiveKind {
    /// Classify a file name by suffix. Returns `None` for ordinary files.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".chatmode.md") {
            Some(Self::Chatmode)
        } else if name.ends_with(".instructions.md") {
            Some(Self::Instruction)
        } else if name.ends_with(".context.md") || name.ends_with(".memory.md") {
            Some(Self::Context)
        } else if name.ends_with(".prompt.md") {
            Some(Self::Workflow)
        } else {
            None
        }
    }

    /// The suffix stripped when deriving a default name from a file stem.
    #[must_use]
    const fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Chatmode => &[".chatmode.md"],
            Self::Instruction => &[".instructions.md"],
            Self::Context => &[".context.md", ".memory.md"],
            Self::Workflow => &[".prompt.md"],
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Chatmode => "chatmode",
            Self::Instruction => "instruction",
            Self::Context => "context",
            Self::Workflow => "workflow",
        };
        f.write_str(s)
    }
}

/// A chatmode primitive.
#[derive(Debug, Clone)]
pub struct Chatmode {
    pub name: String,
    pub description: String,
    /// Optional scope glob; chatmodes without one apply project-wide.
    pub apply_to: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub body: String,
    pub source_path: PathBuf,
}

/// An instruction primitive. `apply_to` is always non-empty.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub name: String,
    pub description: String,
    pub apply_to: String,
    pub author: Option<String>,
    pub version: Option<String>,
    pub body: String,
    pub source_path: PathBuf,
}

/// A context primitive (`.context.md` or `.memory.md`).
#[derive(Debug, Clone)]
pub struct Context {
    pub name: String,
    pub description: Option<String>,
    pub body: String,
    pub source_path: PathBuf,
}

/// A workflow (prompt) primitive.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub description: Option<String>,
    pub mode: Option<String>,
    /// Ordered parameter names substituted via `${input:NAME}`.
    pub input: Vec<String>,
    /// MCP server identifiers the workflow expects.
    pub mcp: Vec<String>,
    pub body: String,
    pub source_path: PathBuf,
}

/// Tagged primitive variant.
#[derive(Debug, Clone)]
pub enum Primitive {
    Chatmode(Chatmode),
    Instruction(Instruction),
    Context(Context),
    Workflow(Workflow),
}

impl Primitive {
    /// Kind tag of this primitive.
    #[must_use]
    pub const fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Chatmode(_) => PrimitiveKind::Chatmode,
            Self::Instruction(_) => PrimitiveKind::Instruction,
            Self::Context(_) => PrimitiveKind::Context,
            Self::Workflow(_) => PrimitiveKind::Workflow,
        }
    }

    /// Primitive name (frontmatter `name` or derived from the file stem).
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Chatmode(p) => &p.name,
            Self::Instruction(p) => &p.name,
            Self::Context(p) => &p.name,
            Self::Workflow(p) => &p.name,
        }
    }

    /// Absolute path the primitive was parsed from.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        match self {
            Self::Chatmode(p) => &p.source_path,
            Self::Instruction(p) => &p.source_path,
            Self::Context(p) => &p.source_path,
            Self::Workflow(p) => &p.source_path,
        }
    }
}

/// A non-fatal problem found while discovering primitives.
///
/// Warnings are collected and reported; strict mode (`compile
/// --validate`) upgrades their presence to a command failure.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// File the warning applies to.
    pub file: PathBuf,
    /// What was wrong.
    pub reason: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.reason)
    }
}

/// Discovered primitives, one ordered list per kind.
///
/// Lists are sorted by `(kind, relative source path)` bytewise so every
/// downstream consumer sees a deterministic order.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveCollection {
    pub chatmodes: Vec<Chatmode>,
    pub instructions: Vec<Instruction>,
    pub contexts: Vec<Context>,
    pub workflows: Vec<Workflow>,
}

impl PrimitiveCollection {
    /// Total primitive count across kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chatmodes.len() + self.instructions.len() + self.contexts.len() + self.workflows.len()
    }

    /// True when nothing was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a chatmode by name.
    #[must_use]
    pub fn find_chatmode(&self, name: &str) -> Option<&Chatmode> {
        self.chatmodes.iter().find(|c| c.name == name)
    }

    /// Find a workflow whose source file name matches `file_name`.
    #[must_use]
    pub fn find_workflow_by_file(&self, file_name: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| {
            w.source_path.file_name().is_some_and(|f| f.to_string_lossy() == file_name)
        })
    }

    fn push(&mut self, primitive: Primitive) {
        match primitive {
            Primitive::Chatmode(p) => self.chatmodes.push(p),
            Primitive::Instruction(p) => self.instructions.push(p),
            Primitive::Context(p) => self.contexts.push(p),
            Primitive::Workflow(p) => self.workflows.push(p),
        }
    }

    fn sort(&mut self) {
        self.chatmodes.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        self.instructions.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        self.contexts.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        self.workflows.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    }
}

/// Derive a primitive name from its file name by stripping the kind
/// suffix.
fn derived_name(kind: PrimitiveKind, file_name: &str) -> String {
    for suffix in kind.suffixes() {
        if let Some(stem) = file_name.strip_suffix(suffix) {
            return stem.to_string();
        }
    }
    file_name.to_string()
}

/// Validate a parsed document as `kind` and build the primitive.
///
/// Returns the warning to record when a required field is missing or
/// empty.
pub(crate) fn build_primitive(
    kind: PrimitiveKind,
    doc: &ParsedDocument,
    source_path: &Path,
) -> Result<Primitive, ValidationWarning> {
    let file_name = source_path.file_name().map(|f| f.to_string_lossy().into_owned());
    let file_name = file_name.as_deref().unwrap_or_default();
    let fm = &doc.frontmatter;
    let name = fm
        .get_non_empty_str("name")
        .map_or_else(|| derived_name(kind, file_name), str::to_string);

    let body_empty = doc.body.trim().is_empty();
    let warn = |reason: &str| ValidationWarning {
        file: source_path.to_path_buf(),
        reason: reason.to_string(),
    };

    match kind {
        PrimitiveKind::Chatmode => {
            let Some(description) = fm.get_non_empty_str("description") else {
                return Err(warn("chatmode requires a non-empty 'description'"));
            };
            if body_empty {
                return Err(warn("chatmode requires a non-empty body"));
            }
            Ok(Primitive::Chatmode(Chatmode {
                name,
                description: description.to_string(),
                apply_to: fm.get_non_empty_str("applyTo").map(str::to_string),
                author: fm.get_non_empty_str("author").map(str::to_string),
                version: fm.get_non_empty_str("version").map(str::to_string),
                body: doc.body.clone(),
                source_path: source_path.to_path_buf(),
            }))
        }
        PrimitiveKind::Instruction => {
            let Some(description) = fm.get_non_empty_str("description") else {
                return Err(warn("instruction requires a non-empty 'description'"));
            };
            let Some(apply_to) = fm.get_non_empty_str("applyTo") else {
                return Err(warn("instruction requires a non-empty 'applyTo' pattern"));
            };
            if body_empty {
                return Err(warn("instruction requires a non-empty body"));
            }
            Ok(Primitive::Instruction(Instruction {
                name,
                description: description.to_string(),
                apply_to: apply_to.to_string(),
                author: fm.get_non_empty_str("author").map(str::to_string),
                version: fm.get_non_empty_str("version").map(str::to_string),
                body: doc.body.clone(),
                source_path: source_path.to_path_buf(),
            }))
        }
        PrimitiveKind::Context => {
            if body_empty {
                return Err(warn("context requires a non-empty body"));
            }
            Ok(Primitive::Context(Context {
                name,
                description: fm.get_non_empty_str("description").map(str::to_string),
                body: doc.body.clone(),
                source_path: source_path.to_path_buf(),
            }))
        }
        PrimitiveKind::Workflow => {
            if body_empty {
                return Err(warn("workflow requires a non-empty body"));
            }
            Ok(Primitive::Workflow(Workflow {
                name,
                description: fm.get_non_empty_str("description").map(str::to_string),
                mode: fm.get_non_empty_str("mode").map(str::to_string),
                input: fm.get_str_list("input"),
                mcp: fm.get_str_list("mcp"),
                body: doc.body.clone(),
                source_path: source_path.to_path_buf(),
            }))
        }
    }
}
