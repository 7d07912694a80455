//! Discovery of repositories under a root and the sequential sweep over them.

use crate::constants::MANIFEST_FILE;
use crate::git;
use crate::policy::{self, SweepOptions};
use crate::repo::{self, RepoTarget, Tools, UpdateCallbacks, UpdateResult};
use crate::runner::CommandRunner;
use anyhow::Context;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What the sweep covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Every repository below a container directory, descending one extra
    /// level into subdirectories that are not repositories themselves.
    Path(PathBuf),
    /// A single repository.
    From(PathBuf),
    /// A single repository; same behavior as `From`.
    Only(PathBuf),
}

impl Mode {
    pub fn dir(&self) -> &Path {
        match self {
            Mode::Path(dir) | Mode::From(dir) | Mode::Only(dir) => dir,
        }
    }
}

/// Drops repeated paths (first occurrence wins), then sorts.
pub fn dedupe_sorted<I>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = HashSet::new();
    let mut unique: Vec<PathBuf> = paths
        .into_iter()
        .filter(|path| seen.insert(path.clone()))
        .collect();
    unique.sort();
    unique
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Immediate, non-hidden subdirectories of `root`.
pub fn list_subdirectories(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("Failed to list directory {}", root.display()))?;
    let dirs = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && !is_hidden(p));
    Ok(dedupe_sorted(dirs))
}

/// Directories one level below `dir` that contain a package manifest.
pub fn find_nested_packages(dir: &Path) -> Vec<PathBuf> {
    let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy()))
        .join("*")
        .join(MANIFEST_FILE);
    let Ok(paths) = glob::glob(&pattern.to_string_lossy()) else {
        warn!(dir = %dir.display(), "invalid glob pattern");
        return Vec::new();
    };
    let parents = paths
        .filter_map(Result::ok)
        .filter_map(|manifest| manifest.parent().map(Path::to_path_buf))
        .filter(|p| !is_hidden(p));
    dedupe_sorted(parents)
}

/// A discovered directory and the repository root it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub top_level: Option<PathBuf>,
}

/// Walks `root` for repository candidates.
///
/// Subdirectories that are not repositories are searched one level deeper for
/// package manifests. Candidates are deduplicated by repository root, keeping
/// the first directory seen for each, and returned sorted by path.
pub fn discover(runner: &dyn CommandRunner, root: &Path) -> anyhow::Result<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for dir in list_subdirectories(root)? {
        match git::top_level(runner, &dir) {
            Ok(top_level) => candidates.push(Candidate {
                path: dir,
                top_level: Some(top_level),
            }),
            Err(err) if err.is_not_a_repository() => {
                debug!(dir = %dir.display(), "not a repository, looking one level down");
                for nested in find_nested_packages(&dir) {
                    let top_level = match git::top_level(runner, &nested) {
                        Ok(top) => Some(top),
                        Err(err) if err.is_not_a_repository() => None,
                        Err(err) => {
                            warn!(dir = %nested.display(), "skipping: {}", err);
                            continue;
                        }
                    };
                    candidates.push(Candidate {
                        path: nested,
                        top_level,
                    });
                }
            }
            Err(err) => warn!(dir = %dir.display(), "skipping: {}", err),
        }
    }

    let mut roots = HashSet::new();
    let mut unique: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| match &c.top_level {
            Some(top) => roots.insert(top.canonicalize().unwrap_or_else(|_| top.clone())),
            None => true,
        })
        .collect();
    unique.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(unique)
}

/// Resolves the targets a mode covers, in the order they will be processed.
pub fn plan(runner: &dyn CommandRunner, mode: &Mode) -> anyhow::Result<Vec<RepoTarget>> {
    match mode {
        Mode::Path(root) => Ok(discover(runner, root)?
            .into_iter()
            .map(|c| RepoTarget::resolve(runner, &c.path, c.top_level))
            .collect()),
        Mode::From(dir) | Mode::Only(dir) => Ok(vec![RepoTarget::inspect(runner, dir)]),
    }
}

/// Updates each eligible target in order; the rest are reported as skipped.
///
/// A failing repository never stops the sweep.
pub fn update_targets<F, C>(
    targets: &[RepoTarget],
    options: &SweepOptions,
    tools: &Tools<'_>,
    make_callbacks: F,
) -> Vec<UpdateResult>
where
    F: Fn(&RepoTarget) -> C,
    C: UpdateCallbacks,
{
    targets
        .iter()
        .map(|target| {
            let callbacks = make_callbacks(target);
            match target.eligibility() {
                Ok(()) => {
                    let policy = policy::resolve_policy(tools.runner, &target.path, options);
                    repo::update(&target.path, policy, tools, &callbacks)
                }
                Err(reason) => {
                    info!(repo = %target.path.display(), "skipped: {}", reason);
                    let result = UpdateResult::skipped(&target.path, reason);
                    callbacks.on_complete(&result);
                    result
                }
            }
        })
        .collect()
}

/// Plans and runs a whole sweep.
pub fn run<F, C>(
    mode: &Mode,
    options: &SweepOptions,
    tools: &Tools<'_>,
    make_callbacks: F,
) -> anyhow::Result<Vec<UpdateResult>>
where
    F: Fn(&RepoTarget) -> C,
    C: UpdateCallbacks,
{
    let targets = plan(tools.runner, mode)?;
    Ok(update_targets(&targets, options, tools, make_callbacks))
}
