//! Per-repository ignore flag, commit author and commit message.
//!
//! Each value is resolved through a fixed precedence chain where the first
//! non-empty source wins and a constant closes the chain.

use crate::constants::{DEFAULT_REGISTRY, FALLBACK_AUTHOR, FALLBACK_MESSAGE};
use crate::git;
use crate::manifest::{Manifest, RepoConfig};
use crate::runner::CommandRunner;
use std::path::Path;

/// Sweep-wide settings from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOptions {
    pub registry: String,
    pub force: bool,
    pub message: Option<String>,
    pub author: Option<String>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            force: false,
            message: None,
            author: None,
        }
    }
}

/// Everything one repository's update needs, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub registry: String,
    pub force: bool,
    pub message: String,
    pub author: String,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn resolve_ignore(dir: &Path) -> bool {
    RepoConfig::load(dir).is_some_and(|config| config.ignore)
}

/// CLI, then repository config, then git identity, then manifest, then [`FALLBACK_AUTHOR`].
pub fn resolve_author(runner: &dyn CommandRunner, dir: &Path, cli: Option<&str>) -> String {
    non_empty(cli)
        .or_else(|| RepoConfig::load(dir)?.author?.to_git())
        .or_else(|| git::identity(runner, dir))
        .or_else(|| Manifest::load(dir)?.author?.to_git())
        .unwrap_or_else(|| FALLBACK_AUTHOR.to_string())
}

/// CLI, then repository config, then [`FALLBACK_MESSAGE`].
pub fn resolve_message(dir: &Path, cli: Option<&str>) -> String {
    non_empty(cli)
        .or_else(|| non_empty(RepoConfig::load(dir)?.message.as_deref()))
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

pub fn resolve_policy(
    runner: &dyn CommandRunner,
    dir: &Path,
    options: &SweepOptions,
) -> ExecutionPolicy {
    ExecutionPolicy {
        registry: options.registry.clone(),
        force: options.force,
        message: resolve_message(dir, options.message.as_deref()),
        author: resolve_author(runner, dir, options.author.as_deref()),
    }
}
