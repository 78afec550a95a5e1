//! APM - Agent Package Manager
//!
//! APM turns a repository into an AI-native workspace: it resolves and
//! installs reusable collections of AI context primitives from remote
//! version-controlled sources, compiles those primitives plus local ones
//! into agent-facing `AGENTS.md` files, and executes named scripts that
//! invoke AI runtime CLIs with parameterized prompt files.
//!
//! # Architecture
//!
//! APM follows a manifest/lockfile model:
//! - `apm.yml` names the package and declares scripts, dependencies, and
//!   compilation settings
//! - `apm_modules/` holds installed dependencies, one directory per
//!   `owner/repo`
//! - `apm_modules/.apm-lock` records resolved commit SHAs for
//!   reproducible installs
//!
//! # Core Modules
//!
//! - [`analysis`] - per-directory file statistics feeding placement
//! - [`cli`] - command-line interface implementation
//! - [`core`] - error taxonomy and user-facing error contexts
//! - [`emitter`] - AGENTS.md rendering and orphan cleanup
//! - [`fetcher`] - remote archive download and extraction
//! - [`installer`] - install orchestration and lock file maintenance
//! - [`lockfile`] - lock-state model (`.apm-lock`)
//! - [`manifest`] - apm.yml parsing and validation
//! - [`markdown`] - frontmatter splitting
//! - [`optimizer`] - instruction placement (the context optimizer)
//! - [`package`] - APM package shape validation
//! - [`pattern`] - `applyTo` glob matching
//! - [`primitives`] - typed primitive model and discovery
//! - [`resolver`] - dependency graph construction and ordering
//! - [`scripts`] - script parameter substitution
//! - [`utils`] - filesystem and path helpers
//!
//! # Example
//!
//! ```yaml
//! # apm.yml
//! name: my-project
//! version: 1.0.0
//! scripts:
//!   start: "codex hello-world.prompt.md"
//! dependencies:
//!   apm:
//!     - org/context-pack#v1.2.0
//! ```
//!
//! ```bash
//! # Install dependencies into apm_modules/
//! apm install
//!
//! # Compile primitives into placed AGENTS.md files
//! apm compile
//!
//! # Run a manifest script
//! apm run start --param name=world
//! ```

pub mod analysis;
pub mod cli;
pub mod constants;
pub mod core;
pub mod emitter;
pub mod fetcher;
pub mod installer;
pub mod lockfile;
pub mod manifest;
pub mod markdown;
pub mod optimizer;
pub mod package;
pub mod pattern;
pub mod primitives;
pub mod resolver;
pub mod scripts;
pub mod utils;
