//! Script parameter substitution.
//!
//! Manifest scripts are raw command strings. Before execution the
//! runner substitutes `${input:NAME}` placeholders: in the command
//! itself, and inside the workflow body referenced by the command's
//! `*.prompt.md` token. The substituted body is materialized as a
//! temporary prompt file and the token rewritten to point at it; the
//! command is then handed to the host shell unchanged. Any placeholder
//! left without a value fails with `MissingParameter` before anything
//! runs.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::ApmError;
use crate::manifest::Manifest;
use crate::primitives::PrimitiveCollection;

/// A script ready to execute.
#[derive(Debug)]
pub struct PreparedScript {
    /// Script name from the manifest.
    pub name: String,
    /// Command line after substitution, for the host shell.
    pub command: String,
    /// Substituted workflow body, when the command references one.
    pub prompt_body: Option<String>,
    /// Temp file backing the rewritten prompt token. Held so the file
    /// outlives the child process; dropped on scope exit.
    pub temp_prompt: Option<tempfile::TempPath>,
}

/// Parse repeated `--param key=value` pairs.
///
/// # Errors
///
/// [`ApmError::Other`] for entries without `=`.
pub fn parse_params(pairs: &[String]) -> Result<BTreeMap<String, String>, ApmError> {
    let mut params = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ApmError::Other {
                message: format!("invalid --param '{pair}': expected key=value"),
            });
        };
        params.insert(key.trim().to_string(), value.to_string());
    }
    Ok(params)
}

fn placeholder_regex() -> Regex {
    Regex::new(r"\$\{input:([A-Za-z0-9_-]+)\}").expect("static regex")
}

/// Substitute placeholders in `text`, failing on the first one without a
/// supplied value.
fn substitute(
    text: &str,
    params: &BTreeMap<String, String>,
    script: &str,
) -> Result<String, ApmError> {
    let re = placeholder_regex();

    if let Some(missing) =
        re.captures_iter(text).map(|c| c[1].to_string()).find(|name| !params.contains_key(name))
    {
        return Err(ApmError::MissingParameter {
            script: script.to_string(),
            name: missing,
        });
    }

    Ok(re
        .replace_all(text, |caps: &regex::Captures<'_>| params[&caps[1]].clone())
        .into_owned())
}

/// Resolve a script, substitute parameters, and materialize the prompt.
///
/// # Errors
///
/// [`ApmError::ScriptNotFound`] for unknown script names,
/// [`ApmError::MissingParameter`] for unfilled placeholders, IO errors
/// from temp-file creation.
pub fn prepare_script(
    project_dir: &Path,
    manifest: &Manifest,
    primitives: &PrimitiveCollection,
    name: &str,
    params: &BTreeMap<String, String>,
) -> Result<PreparedScript, ApmError> {
    let Some(raw_command) = manifest.scripts.get(name) else {
        return Err(ApmError::ScriptNotFound {
            name: name.to_string(),
        });
    };

    let mut command = substitute(raw_command, params, name)?;
    let mut prompt_body = None;
    let mut temp_prompt = None;

    if let Some(token) = command
        .split_whitespace()
        .find(|t| t.ends_with(".prompt.md"))
        .map(str::to_string)
    {
        let body = workflow_body(project_dir, primitives, &token)?;
        let substituted = substitute(&body, params, name)?;

        let temp = tempfile::Builder::new()
            .prefix("apm-")
            .suffix(".prompt.md")
            .tempfile()
            .map_err(ApmError::IoError)?;
        std::fs::write(temp.path(), &substituted)?;
        let temp_path = temp.into_temp_path();

        command = command.replace(&token, &temp_path.to_string_lossy());
        prompt_body = Some(substituted);
        temp_prompt = Some(temp_path);
    }

    Ok(PreparedScript {
        name: name.to_string(),
        command,
        prompt_body,
        temp_prompt,
    })
}

/// Load the workflow body a command token refers to: a project-relative
/// path first, then any discovered workflow with that file name.
fn workflow_body(
    project_dir: &Path,
    primitives: &PrimitiveCollection,
    token: &str,
) -> Result<String, ApmError> {
    let direct = project_dir.join(token);
    if direct.is_file() {
        let content = std::fs::read_to_string(&direct)?;
        let doc = crate::markdown::parse_document(&content, &direct)?;
        return Ok(doc.body);
    }

    let file_name = Path::new(token)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| token.to_string());
    if let Some(workflow) = primitives.find_workflow_by_file(&file_name) {
        return Ok(workflow.body.clone());
    }

    Err(ApmError::Other {
        message: format!("workflow file '{token}' not found in project or dependencies"),
    })
}
