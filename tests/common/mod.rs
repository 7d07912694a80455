//! Test infrastructure for dep-sweep integration tests.
#![allow(dead_code)]

use anyhow::Result;
use dep_sweep::constants::MANIFEST_FILE;
use dep_sweep::git::run_git;
use dep_sweep::npm::BumpInvocation;
use dep_sweep::repo::{RepoTarget, Tools, UpdateCallbacks, UpdateResult, UpdateStep};
use dep_sweep::runner::{
    CommandError, CommandOutput, CommandRunner, CommandSpec, PosixShell, RunnerOptions, Shell,
    ShellRunner, no_op_logger,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const MANIFEST: &str = r#"{
  "name": "fixture",
  "version": "1.0.0",
  "dependencies": { "left-pad": "^1.3.0" }
}
"#;

/// Runner for test setup: real git, no ssh-agent, output discarded.
pub fn real_runner() -> ShellRunner {
    ShellRunner::new(
        Box::new(PosixShell { ssh_agent: false }),
        no_op_logger,
        RunnerOptions::default(),
    )
}

pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    Ok(run_git(&real_runner(), dir, "test-git", args)?)
}

/// Initializes `path` as a repository on `master` with a committed manifest.
pub fn init_repo(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    git(path, &["init", "-b", "master"])?;
    git(path, &["config", "user.email", "test@example.com"])?;
    git(path, &["config", "user.name", "Test User"])?;

    std::fs::write(path.join(MANIFEST_FILE), MANIFEST)?;
    git(path, &["add", MANIFEST_FILE])?;
    git(path, &["commit", "-m", "Initial commit"])?;
    Ok(())
}

/// Creates a bare repository and makes it `origin` of `path`.
pub fn add_remote(path: &Path) -> Result<TempDir> {
    let remote = TempDir::new()?;
    git(remote.path(), &["init", "--bare", "-b", "master"])?;
    let url = remote.path().to_string_lossy().to_string();
    git(path, &["remote", "add", "origin", url.as_str()])?;
    git(path, &["push", "-u", "origin", "master"])?;
    Ok(remote)
}

/// A temporary git repository for testing.
/// Automatically cleaned up when dropped.
pub struct TestRepo {
    _temp_dir: TempDir,
    _remote: Option<TempDir>,
    path: PathBuf,
}

impl TestRepo {
    /// Creates a repository with an initial commit and no remote.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("repo");
        init_repo(&path)?;

        Ok(Self {
            _temp_dir: temp_dir,
            _remote: None,
            path,
        })
    }

    /// Creates a repository tracking a local bare remote.
    pub fn with_remote() -> Result<Self> {
        let mut repo = Self::new()?;
        repo._remote = Some(add_remote(&repo.path)?);
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remote_path(&self) -> Option<&Path> {
        self._remote.as_ref().map(TempDir::path)
    }

    pub fn write_manifest(&self, contents: &str) -> Result<()> {
        std::fs::write(self.path.join(MANIFEST_FILE), contents)?;
        Ok(())
    }

    pub fn head(&self) -> Result<String> {
        git(&self.path, &["rev-parse", "HEAD"])
    }

    pub fn remote_head(&self) -> Result<String> {
        let remote = self
            .remote_path()
            .ok_or_else(|| anyhow::anyhow!("repository has no remote"))?;
        git(remote, &["rev-parse", "master"])
    }

    pub fn commit_count(&self) -> Result<usize> {
        Ok(git(&self.path, &["rev-list", "--count", "HEAD"])?.parse()?)
    }
}

/// Runs git for real and records every command; everything else (npm and the
/// bump self-invocation) succeeds without running. Operations can be made to
/// fail, optionally only inside one directory.
pub struct RecordingRunner {
    real: ShellRunner,
    calls: RefCell<Vec<(PathBuf, CommandSpec)>>,
    failures: RefCell<Vec<(String, Option<PathBuf>, i32, String)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            real: real_runner(),
            calls: RefCell::new(Vec::new()),
            failures: RefCell::new(Vec::new()),
        }
    }

    pub fn fail(&self, operation: &str, code: i32, stderr: &str) {
        self.failures
            .borrow_mut()
            .push((operation.to_string(), None, code, stderr.to_string()));
    }

    pub fn fail_in(&self, dir: &Path, operation: &str, code: i32, stderr: &str) {
        self.failures.borrow_mut().push((
            operation.to_string(),
            Some(dir.to_path_buf()),
            code,
            stderr.to_string(),
        ));
    }

    pub fn shell(&self) -> &dyn Shell {
        self.real.shell()
    }

    /// Operation names in call order.
    pub fn operations(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|(_, spec)| spec.operation.clone())
            .collect()
    }

    /// Operation names run inside `dir`, in call order.
    pub fn operations_in(&self, dir: &Path) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|(cwd, _)| cwd == dir)
            .map(|(_, spec)| spec.operation.clone())
            .collect()
    }

    pub fn spec(&self, operation: &str) -> Option<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .find(|(_, spec)| spec.operation == operation)
            .map(|(_, spec)| spec.clone())
    }

    fn scripted_failure(&self, cwd: &Path, operation: &str) -> Option<CommandError> {
        self.failures
            .borrow()
            .iter()
            .find(|(op, dir, _, _)| op == operation && dir.as_deref().is_none_or(|d| d == cwd))
            .map(|(op, _, code, stderr)| CommandError::exit(op, *code, String::new(), stderr.clone()))
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cwd: &Path, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls
            .borrow_mut()
            .push((cwd.to_path_buf(), spec.clone()));

        if let Some(err) = self.scripted_failure(cwd, &spec.operation) {
            return Err(err);
        }
        if spec.program == "git" {
            self.real.run(cwd, spec)
        } else {
            Ok(CommandOutput::default())
        }
    }
}

pub fn test_bump() -> BumpInvocation {
    BumpInvocation::new("dep-sweep")
}

pub fn tools<'a>(runner: &'a RecordingRunner, bump: &'a BumpInvocation) -> Tools<'a> {
    Tools {
        runner,
        shell: runner.shell(),
        bump,
    }
}

/// Records the steps and results reported through the callbacks.
#[derive(Clone, Default)]
pub struct CountingCallbacks {
    pub steps: Arc<Mutex<Vec<UpdateStep>>>,
    pub completed: Arc<Mutex<Vec<PathBuf>>>,
}

impl CountingCallbacks {
    pub fn steps(&self) -> Vec<UpdateStep> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn completed(&self) -> Vec<PathBuf> {
        self.completed.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn for_target(&self) -> impl Fn(&RepoTarget) -> CountingCallbacks + '_ {
        move |_: &RepoTarget| self.clone()
    }
}

impl UpdateCallbacks for CountingCallbacks {
    fn on_step(&self, step: &UpdateStep) {
        self.steps.lock().unwrap().push(step.clone());
    }

    fn on_complete(&self, result: &UpdateResult) {
        self.completed.lock().unwrap().push(result.path.clone());
    }
}
