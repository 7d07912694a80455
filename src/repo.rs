// Repository targets, the per-repository update pipeline, result types

use crate::constants::{DEFAULT_REPO_NAME, LOCK_FILE, MANIFEST_FILE};
use crate::git;
use crate::npm::{self, BumpInvocation, InstallOptions};
use crate::policy::{self, ExecutionPolicy};
use crate::runner::{CommandError, CommandRunner, Shell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStep {
    Started,
    Pulling,
    Cleaning,
    Installing,
    Bumping,
    Staging,
    Committing,
    Pushing,
    PushingTags,
    Completed,
}

impl fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateStep::Started => "start",
            UpdateStep::Pulling => "pull",
            UpdateStep::Cleaning => "clean",
            UpdateStep::Installing => "install",
            UpdateStep::Bumping => "bump",
            UpdateStep::Staging => "add",
            UpdateStep::Committing => "commit",
            UpdateStep::Pushing => "push",
            UpdateStep::PushingTags => "push tags",
            UpdateStep::Completed => "done",
        };
        f.write_str(name)
    }
}

/// Progress hooks for one repository update.
pub trait UpdateCallbacks {
    fn on_update_start(&self, _repo_name: &str) {}
    fn on_step(&self, step: &UpdateStep);
    fn on_step_execute(&self, _step: &UpdateStep) {}
    fn on_complete(&self, result: &UpdateResult);
    fn on_completion_status(&self, _success: bool, _error: Option<&str>) {}
}

/// External collaborators the pipeline drives.
pub struct Tools<'a> {
    pub runner: &'a dyn CommandRunner,
    pub shell: &'a dyn Shell,
    pub bump: &'a BumpInvocation,
}

#[derive(Debug)]
pub struct UpdateResult {
    pub path: PathBuf,
    pub outcome: UpdateOutcome,
    pub duration: Duration,
}

impl UpdateResult {
    pub fn skipped(path: &Path, reason: SkipReason) -> Self {
        Self {
            path: path.to_path_buf(),
            outcome: UpdateOutcome::Skipped(reason),
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, UpdateOutcome::Success(_))
    }
}

#[derive(Debug)]
struct UpdateError {
    source: anyhow::Error,
    step: UpdateStep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSuccess {
    /// False when the pipeline found nothing to commit.
    pub committed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFailure {
    pub error: String,
    pub step: UpdateStep,
}

/// Why a discovered directory never reached the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotARepository,
    NotTopLevel { top_level: PathBuf },
    Ignored,
    UnknownDefaultBranch,
    OffDefaultBranch { current: String, default: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotARepository => write!(f, "not a git repository"),
            SkipReason::NotTopLevel { top_level } => {
                write!(f, "inside repository {}", top_level.display())
            }
            SkipReason::Ignored => write!(f, "ignored by configuration"),
            SkipReason::UnknownDefaultBranch => write!(f, "default branch unknown"),
            SkipReason::OffDefaultBranch { current, default } => {
                write!(f, "on '{current}', default is '{default}'")
            }
        }
    }
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Success(UpdateSuccess),
    Skipped(SkipReason),
    Failed(UpdateFailure),
}

/// A directory believed to hold a repository, with the facts the gate needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    pub path: PathBuf,
    pub top_level: Option<PathBuf>,
    pub current_branch: Option<String>,
    pub default_branch: Option<String>,
    pub ignore: bool,
}

impl RepoTarget {
    /// Resolves the top-level of `path`, then the remaining facts.
    pub fn inspect(runner: &dyn CommandRunner, path: &Path) -> Self {
        let top_level = match git::top_level(runner, path) {
            Ok(top) => Some(top),
            Err(err) => {
                if !err.is_not_a_repository() {
                    warn!(path = %path.display(), "cannot resolve repository root: {}", err);
                }
                None
            }
        };
        Self::resolve(runner, path, top_level)
    }

    /// Fills in the ignore flag and branches. Branch queries are skipped when
    /// the gate would reject the target anyway.
    pub fn resolve(runner: &dyn CommandRunner, path: &Path, top_level: Option<PathBuf>) -> Self {
        let mut target = Self {
            path: path.to_path_buf(),
            top_level,
            current_branch: None,
            default_branch: None,
            ignore: false,
        };
        if !target.is_top_level() {
            return target;
        }

        target.ignore = policy::resolve_ignore(path);
        if target.ignore {
            return target;
        }

        target.current_branch = git::current_branch(runner, path).ok();
        target.default_branch = git::default_branch(runner, path);
        target
    }

    pub fn is_top_level(&self) -> bool {
        self.top_level
            .as_deref()
            .is_some_and(|top| same_path(top, &self.path))
    }

    /// `Ok` only for a repository root on its default branch that is not ignored.
    pub fn eligibility(&self) -> Result<(), SkipReason> {
        let Some(top_level) = &self.top_level else {
            return Err(SkipReason::NotARepository);
        };
        if !self.is_top_level() {
            return Err(SkipReason::NotTopLevel {
                top_level: top_level.clone(),
            });
        }
        if self.ignore {
            return Err(SkipReason::Ignored);
        }
        let Some(default) = &self.default_branch else {
            return Err(SkipReason::UnknownDefaultBranch);
        };
        match &self.current_branch {
            Some(current) if current == default => Ok(()),
            current => Err(SkipReason::OffDefaultBranch {
                current: current.clone().unwrap_or_else(|| "HEAD".to_string()),
                default: default.clone(),
            }),
        }
    }
}

/// Compares canonical forms; git prints `/` separators even on Windows.
pub fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Directory name of `path`, resolved first so `.` and `..` name the real directory.
pub fn repo_name(path: &Path) -> String {
    let resolved = path.canonicalize().ok();
    resolved
        .as_deref()
        .unwrap_or(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_REPO_NAME)
        .to_string()
}

fn at_step<T, E>(step: UpdateStep, result: Result<T, E>) -> Result<T, UpdateError>
where
    E: Into<anyhow::Error>,
{
    result.map_err(|e| UpdateError {
        source: e.into(),
        step,
    })
}

/// Logs a failed repository with its step and exit code. Never propagates.
fn report_failure(path: &Path, err: &UpdateError) {
    let code = err
        .source
        .downcast_ref::<CommandError>()
        .and_then(CommandError::code);
    error!(
        repo = %path.display(),
        step = %err.step,
        code = ?code,
        "{:#}",
        err.source
    );
}

/// Runs the full pipeline for one repository. Failures end up in the result.
pub fn update(
    path: &Path,
    policy: ExecutionPolicy,
    tools: &Tools<'_>,
    callbacks: &dyn UpdateCallbacks,
) -> UpdateResult {
    let start = Instant::now();
    callbacks.on_update_start(&repo_name(path));

    let outcome = match do_update(path, &policy, tools, callbacks) {
        Ok(success) => {
            callbacks.on_completion_status(true, None);
            UpdateOutcome::Success(success)
        }
        Err(err) => {
            report_failure(path, &err);
            let error = format!("{:#}", err.source);
            callbacks.on_completion_status(false, Some(&error));
            UpdateOutcome::Failed(UpdateFailure {
                error,
                step: err.step,
            })
        }
    };

    let result = UpdateResult {
        path: path.to_path_buf(),
        outcome,
        duration: start.elapsed(),
    };
    callbacks.on_complete(&result);
    result
}

fn do_update(
    path: &Path,
    policy: &ExecutionPolicy,
    tools: &Tools<'_>,
    callbacks: &dyn UpdateCallbacks,
) -> Result<UpdateSuccess, UpdateError> {
    let runner = tools.runner;
    let enter = |step: UpdateStep| {
        callbacks.on_step(&step);
        callbacks.on_step_execute(&step);
        step
    };

    callbacks.on_step(&UpdateStep::Started);
    info!(repo = %path.display(), "updating");

    let step = enter(UpdateStep::Pulling);
    at_step(step, git::pull(runner, path))?;

    let step = enter(UpdateStep::Cleaning);
    at_step(step, runner.run(path, &npm::clean(tools.shell)))?;

    let step = enter(UpdateStep::Installing);
    let install = npm::install(&InstallOptions {
        save: true,
        registry: policy.registry.clone(),
        force: policy.force,
    });
    at_step(step, runner.run(path, &install))?;

    let step = enter(UpdateStep::Bumping);
    at_step(
        step,
        runner.run(path, &tools.bump.command(&policy.registry, policy.force)),
    )?;

    let step = enter(UpdateStep::Staging);
    let staged: Vec<&str> = [MANIFEST_FILE, LOCK_FILE]
        .into_iter()
        .filter(|file| path.join(file).exists())
        .collect();
    at_step(step, git::add(runner, path, &staged))?;

    let step = enter(UpdateStep::Committing);
    let committed = match git::commit(runner, path, &policy.message, &policy.author) {
        Ok(()) => true,
        Err(err) if err.is_nothing_to_commit() => {
            info!(repo = %path.display(), "nothing to commit");
            false
        }
        Err(err) => return at_step(step, Err(err)),
    };

    let step = enter(UpdateStep::Pushing);
    at_step(step, git::push(runner, path))?;

    let step = enter(UpdateStep::PushingTags);
    at_step(step, git::push_tags(runner, path))?;

    callbacks.on_step(&UpdateStep::Completed);
    Ok(UpdateSuccess { committed })
}
