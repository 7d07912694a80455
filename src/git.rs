//! Git command wrappers.
//!
//! This module answers topology questions about a directory (top-level,
//! current and default branch) and wraps the git operations the update
//! pipeline performs. Every call goes through a [`CommandRunner`].

use crate::constants::{GIT, REMOTE};
use crate::runner::{CommandError, CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};
use tracing::debug;

fn spec(operation: &str, args: &[&str]) -> CommandSpec {
    CommandSpec::new(operation, GIT, args.iter().copied())
}

/// Runs git and returns trimmed stdout.
pub fn run_git(
    runner: &dyn CommandRunner,
    repo: &Path,
    operation: &str,
    args: &[&str],
) -> Result<String, CommandError> {
    run(runner, repo, spec(operation, args))
}

fn run(runner: &dyn CommandRunner, repo: &Path, spec: CommandSpec) -> Result<String, CommandError> {
    runner
        .run(repo, &spec)
        .map(|output| output.stdout.trim().to_string())
}

pub fn validate_branch_name(branch: &str) -> anyhow::Result<()> {
    if branch.contains('\0') || branch.contains('\n') || branch.is_empty() {
        anyhow::bail!("Invalid branch name: {:?}", branch);
    }
    Ok(())
}

/// Root of the repository containing `dir`.
///
/// Outside any repository the error satisfies [`CommandError::is_not_a_repository`].
pub fn top_level(runner: &dyn CommandRunner, dir: &Path) -> Result<PathBuf, CommandError> {
    run_git(runner, dir, "git-toplevel", &["rev-parse", "--show-toplevel"]).map(PathBuf::from)
}

pub fn current_branch(runner: &dyn CommandRunner, repo: &Path) -> Result<String, CommandError> {
    run_git(
        runner,
        repo,
        "git-current-branch",
        &["rev-parse", "--abbrev-ref", "HEAD"],
    )
}

/// Branch the remote considers primary, or `None` when it cannot be determined.
///
/// Tries the cached `refs/remotes/origin/HEAD` first, then asks the remote.
pub fn default_branch(runner: &dyn CommandRunner, repo: &Path) -> Option<String> {
    if let Some(branch) = cached_default_branch(repo) {
        return Some(branch);
    }

    match run(
        runner,
        repo,
        spec("git-remote-show", &["remote", "show", REMOTE]).networked(),
    ) {
        Ok(output) => parse_remote_head(&output),
        Err(err) => {
            debug!(repo = %repo.display(), "default branch unknown: {}", err);
            None
        }
    }
}

/// Reads `<git-dir>/refs/remotes/origin/HEAD` without spawning git.
pub fn cached_default_branch(repo: &Path) -> Option<String> {
    let head = git_dir(repo)?
        .join("refs")
        .join("remotes")
        .join(REMOTE)
        .join("HEAD");
    let content = std::fs::read_to_string(head).ok()?;
    let prefix = format!("ref: refs/remotes/{REMOTE}/");
    let branch = content.trim().strip_prefix(&prefix)?;
    validate_branch_name(branch).ok()?;
    Some(branch.to_string())
}

/// `.git` is a directory in ordinary clones and a `gitdir:` pointer file in
/// worktrees and submodules.
fn git_dir(repo: &Path) -> Option<PathBuf> {
    let dot_git = repo.join(".git");
    if dot_git.is_dir() {
        return Some(dot_git);
    }
    let pointer = std::fs::read_to_string(&dot_git).ok()?;
    let target = pointer.trim().strip_prefix("gitdir:")?.trim();
    Some(repo.join(target))
}

/// Extracts the branch from the `HEAD branch: <name>` line of `git remote show`.
pub fn parse_remote_head(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("HEAD branch:"))
        .map(str::trim)
        .filter(|branch| *branch != "(unknown)" && validate_branch_name(branch).is_ok())
        .map(str::to_string)
}

/// True only when both the current and the default branch are known and equal.
pub fn is_on_default_branch(runner: &dyn CommandRunner, repo: &Path) -> bool {
    match (current_branch(runner, repo), default_branch(runner, repo)) {
        (Ok(current), Some(default)) => current == default,
        _ => false,
    }
}

fn config_value(runner: &dyn CommandRunner, repo: &Path, key: &str) -> Option<String> {
    // `git config` exits 1 for unset keys
    run_git(runner, repo, "git-config", &["config", key])
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Configured `user.name` and `user.email` as `"Name <email>"`, if both are set.
pub fn identity(runner: &dyn CommandRunner, repo: &Path) -> Option<String> {
    let name = config_value(runner, repo, "user.name")?;
    let email = config_value(runner, repo, "user.email")?;
    Some(format!("{name} <{email}>"))
}

pub fn pull(runner: &dyn CommandRunner, repo: &Path) -> Result<(), CommandError> {
    run(runner, repo, spec("git-pull", &["pull"]).networked())?;
    Ok(())
}

pub fn add(runner: &dyn CommandRunner, repo: &Path, paths: &[&str]) -> Result<(), CommandError> {
    let args: Vec<&str> = ["add", "--"].into_iter().chain(paths.iter().copied()).collect();
    run_git(runner, repo, "git-add", &args)?;
    Ok(())
}

pub fn commit(
    runner: &dyn CommandRunner,
    repo: &Path,
    message: &str,
    author: &str,
) -> Result<(), CommandError> {
    let author = format!("--author={author}");
    run_git(runner, repo, "git-commit", &["commit", "-m", message, author.as_str()])?;
    Ok(())
}

pub fn push(runner: &dyn CommandRunner, repo: &Path) -> Result<(), CommandError> {
    run(runner, repo, spec("git-push", &["push"]).networked())?;
    Ok(())
}

pub fn push_tags(runner: &dyn CommandRunner, repo: &Path) -> Result<(), CommandError> {
    run(runner, repo, spec("git-push-tags", &["push", "--tags"]).networked())?;
    Ok(())
}
