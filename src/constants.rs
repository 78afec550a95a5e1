//! Shared constants for file names, environment variables, and limits.

/// Manifest file name expected at every package root.
pub const MANIFEST_FILENAME: &str = "apm.yml";

/// Directory that holds installed dependencies.
pub const MODULES_DIR: &str = "apm_modules";

/// Lock-state file written inside [`MODULES_DIR`] after install.
pub const LOCKFILE_NAME: &str = ".apm-lock";

/// Directory that holds a package's context primitives.
pub const PRIMITIVES_DIR: &str = ".apm";

/// Default compiled output file name.
pub const DEFAULT_OUTPUT_FILENAME: &str = "AGENTS.md";

/// Project-relative path of the optional constitution file.
pub const CONSTITUTION_PATH: &str = "memory/constitution.md";

/// Dedicated token variable for private dependency fetches.
pub const PACKAGE_TOKEN_VAR: &str = "APM_GITHUB_TOKEN";

/// General hosting token, used when [`PACKAGE_TOKEN_VAR`] is unset.
pub const HOSTING_TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Override for the hosting provider API base URL (used by tests).
pub const API_URL_VAR: &str = "APM_API_URL";

/// Default hosting provider API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Maximum dependency graph depth before resolution is aborted.
pub const MAX_GRAPH_DEPTH: usize = 10;

/// Maximum dependency graph node count before resolution is aborted.
pub const MAX_GRAPH_NODES: usize = 256;

/// Default number of concurrent archive fetches during install.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default maximum directory depth considered by the analysis cache.
pub const DEFAULT_ANALYSIS_DEPTH: usize = 12;

/// Total per-request timeout for fetcher HTTP calls, in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 60;

/// DNS/connect timeout for fetcher HTTP calls, in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Number of retries for transient network failures.
pub const NETWORK_RETRIES: usize = 3;

/// Initial backoff delay between network retries, in milliseconds.
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Directory names always pruned from project walks.
pub const PRUNED_DIRS: &[&str] = &[".git", "apm_modules", "node_modules"];

/// Opening marker of the constitution block in compiled output.
pub const CONSTITUTION_BEGIN: &str = "<!-- SPEC-KIT CONSTITUTION: BEGIN -->";

/// Closing marker of the constitution block in compiled output.
pub const CONSTITUTION_END: &str = "<!-- SPEC-KIT CONSTITUTION: END -->";
