//! Error handling for APM.
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** for precise handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! [`ApmError`] enumerates every failure mode in the §7 taxonomy; each
//! variant names the offending artifact (file, package, pattern).
//! [`ErrorContext`] wraps an error with an optional suggestion and details
//! for colored terminal display. Errors are returned as values throughout
//! the core; commands convert them at the top level with
//! [`user_friendly_error`].

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for APM operations.
///
/// Variants carry enough context to name the offending artifact in the
/// message. Validation warnings are deliberately *not* errors; see
/// [`crate::primitives::ValidationWarning`].
#[derive(Error, Debug)]
pub enum ApmError {
    /// Manifest file failed to parse or violated the schema.
    #[error("Invalid manifest in {file}: {reason}")]
    MalformedManifest {
        /// Path to the manifest that failed.
        file: String,
        /// First offending field path or parse error.
        reason: String,
    },

    /// Manifest file (apm.yml) not found where one is required.
    #[error("Manifest file apm.yml not found in {dir}")]
    MissingManifest {
        /// Directory that was expected to contain apm.yml.
        dir: String,
    },

    /// YAML frontmatter between `---` delimiters did not parse.
    #[error("Malformed frontmatter in {file}: {reason}")]
    MalformedFrontmatter {
        /// Path to the primitive file.
        file: String,
        /// Underlying YAML parse error.
        reason: String,
    },

    /// An `applyTo` glob pattern could not be compiled.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob {
        /// The offending pattern text.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Directory has a manifest but no primitives or workflows.
    #[error("'{dir}' is not a usable APM package: no .apm/ content and no workflow files")]
    EmptyPackage {
        /// The package directory.
        dir: String,
    },

    /// A fetched or local directory does not satisfy the package shape.
    #[error("'{path}' is not an APM package: {reason}")]
    NotAnApmPackage {
        /// Path that failed validation.
        path: String,
        /// Shape requirement that was violated.
        reason: String,
    },

    /// Transient network failure (retried before surfacing).
    #[error("Network error during {operation}: {reason}")]
    NetworkError {
        /// The network operation that failed.
        operation: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Authentication is required but no token is available.
    #[error("Authentication required to access {resource}")]
    AuthRequired {
        /// The repository or URL that denied access.
        resource: String,
    },

    /// The requested branch, tag, or commit does not exist.
    #[error("Reference '{reference}' not found in {package}")]
    RefNotFound {
        /// Package key `owner/repo`.
        package: String,
        /// The requested ref.
        reference: String,
    },

    /// Downloaded archive was empty, truncated, or unreadable.
    #[error("Corrupt archive for {package}: {reason}")]
    ArchiveCorrupt {
        /// Package key `owner/repo`.
        package: String,
        /// What made the archive unusable.
        reason: String,
    },

    /// Dependency cycle detected during graph construction.
    #[error("Circular dependency detected: {chain}")]
    CircularDependency {
        /// The cycle rendered as `a/b → c/d → a/b`.
        chain: String,
    },

    /// The dependency graph exceeded the depth or node limit.
    #[error("Dependency graph too large: {reason} (limits: depth {max_depth}, nodes {max_nodes})")]
    DependencyExplosion {
        /// Which bound was exceeded.
        reason: String,
        /// Configured depth limit.
        max_depth: usize,
        /// Configured node limit.
        max_nodes: usize,
    },

    /// A `dependencies.apm` entry is not `owner/repo[#ref]`.
    #[error("Invalid dependency specification '{spec}': {reason}")]
    InvalidDependency {
        /// The raw spec string.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A matching file remained uncovered after root fallback.
    ///
    /// This is an internal invariant violation: root fallback guarantees
    /// coverage by construction.
    #[error("Internal error: file '{file}' not covered for pattern '{pattern}' after root fallback")]
    CoverageViolation {
        /// The uncovered file.
        file: String,
        /// The instruction pattern.
        pattern: String,
    },

    /// A `${input:NAME}` placeholder had no supplied value.
    #[error("Missing parameter '{name}' for script '{script}'")]
    MissingParameter {
        /// The script being run or previewed.
        script: String,
        /// The placeholder name with no value.
        name: String,
    },

    /// The named script is not defined in the manifest.
    #[error("Script '{name}' not found in apm.yml")]
    ScriptNotFound {
        /// Requested script name.
        name: String,
    },

    /// The configured chatmode was not discovered.
    #[error("Chatmode '{name}' not found among discovered primitives")]
    ChatmodeNotFound {
        /// Requested chatmode name.
        name: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error outside manifest/frontmatter contexts.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON error (lock file, provider API payloads).
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Other error.
    #[error("{message}")]
    Other {
        /// Generic error message.
        message: String,
    },
}

impl ApmError {
    /// Process exit code for this error per the CLI contract.
    ///
    /// Network and auth failures during install exit 2; the coverage
    /// invariant violation uses the internal-error code; everything else
    /// is a user-visible failure (1).
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NetworkError { .. }
            | Self::AuthRequired { .. }
            | Self::RefNotFound { .. }
            | Self::ArchiveCorrupt { .. } => 2,
            Self::CoverageViolation { .. } => 70,
            _ => 1,
        }
    }
}

/// Wrapper that adds a suggestion and details to an [`ApmError`] for
/// terminal display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error.
    pub error: ApmError,
    /// Optional actionable suggestion, shown in green.
    pub suggestion: Option<String>,
    /// Optional additional details, shown in yellow.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with no suggestion or details.
    #[must_use]
    pub const fn new(error: ApmError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add an actionable suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add explanatory details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details, and suggestion to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }

    /// Process exit code of the wrapped error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with tailored suggestions.
///
/// Recognizes [`ApmError`] variants and attaches remediation hints; other
/// errors pass through with their message intact.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let apm_error = match error.downcast::<ApmError>() {
        Ok(e) => e,
        Err(other) => {
            return ErrorContext::new(ApmError::Other {
                message: format!("{other:#}"),
            });
        }
    };

    let ctx = ErrorContext::new(apm_error);
    let (suggestion, details): (Option<String>, Option<String>) = match &ctx.error {
        ApmError::MissingManifest { .. } => (
            Some("Run 'apm init' to create a starter apm.yml".to_string()),
            Some("Every APM project needs an apm.yml at its root".to_string()),
        ),
        ApmError::AuthRequired { .. } => (
            Some(format!(
                "Set {} (or {}) to a token with read access to the repository",
                crate::constants::PACKAGE_TOKEN_VAR,
                crate::constants::HOSTING_TOKEN_VAR
            )),
            Some("Private dependencies require bearer-token authentication".to_string()),
        ),
        ApmError::NetworkError { .. } => (
            Some("Check your internet connection and retry".to_string()),
            None,
        ),
        ApmError::RefNotFound { .. } => (
            Some(
                "Verify the branch, tag, or commit exists; omit '#ref' to use the default branch"
                    .to_string(),
            ),
            None,
        ),
        ApmError::CircularDependency { .. } => (
            Some("Break the cycle by removing one of the listed dependencies".to_string()),
            None,
        ),
        ApmError::DependencyExplosion { .. } => (
            Some("Reduce the dependency tree, or split shared packages to flatten it".to_string()),
            None,
        ),
        ApmError::MalformedManifest { .. } => (
            Some("Fix the named field in apm.yml and retry".to_string()),
            None,
        ),
        ApmError::MissingParameter { name, .. } => {
            (Some(format!("Pass --param {name}=<value>")), None)
        }
        ApmError::InvalidGlob { .. } => (
            None,
            Some(
                "Patterns use POSIX globbing plus '**' for recursive segments; brace alternation is unsupported"
                    .to_string(),
            ),
        ),
        _ => (None, None),
    };

    let ctx = match suggestion {
        Some(s) => ctx.with_suggestion(s),
        None => ctx,
    };
    match details {
        Some(d) => ctx.with_details(d),
        None => ctx,
    }
}
