//! External command execution.
//!
//! Every git and npm invocation goes through [`CommandRunner`]. The real
//! implementation, [`ShellRunner`], composes the platform-specific command line
//! through a [`Shell`] strategy, streams output lines to a [`LineLogger`] and
//! returns the captured text once the child exits.

use crate::constants::{MAX_BUFFER_BYTES, NOTHING_TO_COMMIT_CODE, NOT_A_REPOSITORY_CODE};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Callback receiving each meaningful output line of a running command.
pub type LineLogger = fn(operation: &str, line: &str);

/// Forwards output lines to the tracing `cmd` span of the running command.
pub fn verbose_logger(operation: &str, line: &str) {
    debug!(op = operation, "{}", line);
}

pub fn no_op_logger(_operation: &str, _line: &str) {}

/// One external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Diagnostic channel name, e.g. `git-pull`.
    pub operation: String,
    pub program: String,
    pub args: Vec<String>,
    /// Talks to a remote over the network (pull/push/remote queries).
    pub network: bool,
}

impl CommandSpec {
    pub fn new<I, S>(operation: &str, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation: operation.to_string(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            network: false,
        }
    }

    #[must_use]
    pub fn networked(mut self) -> Self {
        self.network = true;
        self
    }

    /// Human readable command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{operation}: failed to start: {source}")]
    Spawn {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} exited with code {code}: {message}")]
    Exit {
        operation: String,
        code: i32,
        message: String,
        stdout: String,
        stderr: String,
    },

    #[error("{operation}: output exceeded {limit} bytes")]
    BufferExceeded { operation: String, limit: usize },
}

impl CommandError {
    /// Builds an exit error whose message is stderr, or stdout when stderr is empty.
    pub fn exit(operation: &str, code: i32, stdout: String, stderr: String) -> Self {
        let message = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        CommandError::Exit {
            operation: operation.to_string(),
            code,
            message,
            stdout,
            stderr,
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            CommandError::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            CommandError::Exit { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// git's "not a git repository" signal (exit 128).
    pub fn is_not_a_repository(&self) -> bool {
        match self {
            CommandError::Exit { code, message, .. } => {
                *code == NOT_A_REPOSITORY_CODE
                    && message.to_lowercase().contains("not a git repository")
            }
            _ => false,
        }
    }

    /// `git commit` found no staged changes (exit 1).
    pub fn is_nothing_to_commit(&self) -> bool {
        match self {
            CommandError::Exit {
                code,
                stdout,
                stderr,
                ..
            } => {
                *code == NOTHING_TO_COMMIT_CODE
                    && [stdout, stderr].iter().any(|text| {
                        text.contains("nothing to commit")
                            || text.contains("nothing added to commit")
                            || text.contains("no changes added to commit")
                    })
            }
            _ => false,
        }
    }

    pub fn is_benign(&self) -> bool {
        self.is_not_a_repository() || self.is_nothing_to_commit()
    }
}

/// Seam through which all external commands are executed.
pub trait CommandRunner {
    fn run(&self, cwd: &Path, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Host OS family, detected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Posix,
    Windows,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    /// Returns the shell dialect for this platform.
    pub fn shell(self, ssh_agent: bool) -> Box<dyn Shell> {
        match self {
            Platform::Posix => Box::new(PosixShell { ssh_agent }),
            Platform::Windows => Box::new(WindowsShell),
        }
    }
}

/// Turns a [`CommandSpec`] into an OS process invocation.
pub trait Shell: Send + Sync {
    fn compose(&self, spec: &CommandSpec) -> Command;

    /// Command that deletes the given paths, succeeding when they are absent.
    fn remove_paths(&self, operation: &str, paths: &[&str]) -> CommandSpec;
}

/// Loads nvm (and `.nvmrc`) before running `"$0" "$@"`.
const NVM_SCRIPT: &str = r#"export NVM_DIR="${NVM_DIR:-$HOME/.nvm}"
if [ -s "$NVM_DIR/nvm.sh" ]; then
  . "$NVM_DIR/nvm.sh" >/dev/null 2>&1
  if [ -f .nvmrc ]; then nvm use >/dev/null 2>&1; fi
fi
exec "$0" "$@""#;

/// Adds the user's keys to the agent started for this one command.
const SSH_ADD: &str = "ssh-add -q </dev/null >/dev/null 2>&1 || true\n";

/// POSIX dialect: `sh -c` with nvm sourcing, optionally under a per-command `ssh-agent`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixShell {
    pub ssh_agent: bool,
}

impl Shell for PosixShell {
    fn compose(&self, spec: &CommandSpec) -> Command {
        let mut command = if spec.network && self.ssh_agent {
            // ssh-agent exits together with its child command
            let mut command = Command::new("ssh-agent");
            command.arg("sh").arg("-c").arg(format!("{SSH_ADD}{NVM_SCRIPT}"));
            command
        } else {
            let mut command = Command::new("sh");
            command.arg("-c").arg(NVM_SCRIPT);
            command
        };
        command.arg(&spec.program).args(&spec.args);
        command
    }

    fn remove_paths(&self, operation: &str, paths: &[&str]) -> CommandSpec {
        CommandSpec::new(operation, "rm", ["-rf"].into_iter().chain(paths.iter().copied()))
    }
}

/// Windows dialect: parameters passed straight to `cmd /C`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsShell;

impl Shell for WindowsShell {
    fn compose(&self, spec: &CommandSpec) -> Command {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(&spec.program).args(&spec.args);
        command
    }

    fn remove_paths(&self, operation: &str, paths: &[&str]) -> CommandSpec {
        let targets = paths.join(", ");
        CommandSpec::new(
            operation,
            "powershell",
            [
                "-NoProfile".to_string(),
                "-Command".to_string(),
                format!("Remove-Item -Recurse -Force -ErrorAction SilentlyContinue {targets}"),
            ],
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Per-stream ceiling on captured bytes.
    pub max_buffer: usize,
    /// Variables set on every child process.
    pub env: Vec<(String, String)>,
    /// Let the child write straight to this terminal instead of capturing.
    pub inherit_stdio: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_buffer: MAX_BUFFER_BYTES,
            env: vec![
                ("NO_COLOR".to_string(), "1".to_string()),
                ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
            ],
            inherit_stdio: false,
        }
    }
}

/// Runs commands as child processes of this one.
pub struct ShellRunner {
    shell: Box<dyn Shell>,
    logger: LineLogger,
    options: RunnerOptions,
}

impl ShellRunner {
    pub fn new(shell: Box<dyn Shell>, logger: LineLogger, options: RunnerOptions) -> Self {
        Self {
            shell,
            logger,
            options,
        }
    }

    pub fn shell(&self) -> &dyn Shell {
        self.shell.as_ref()
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, cwd: &Path, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let span = tracing::debug_span!("cmd", op = %spec.operation);
        let _guard = span.enter();

        let spawn_err = |source| CommandError::Spawn {
            operation: spec.operation.clone(),
            source,
        };
        // only for echo filtering: cmd.exe refuses verbatim `\\?\` paths
        let canonical = cwd.canonicalize().map_err(spawn_err)?;
        debug!(cwd = %cwd.display(), "{}", spec.display());

        let mut command = self.command(cwd, spec);

        if self.options.inherit_stdio {
            let status = command.status().map_err(spawn_err)?;
            let code = status.code().unwrap_or(-1);
            return if status.success() {
                Ok(CommandOutput {
                    code,
                    ..CommandOutput::default()
                })
            } else {
                Err(CommandError::exit(&spec.operation, code, String::new(), String::new()))
            };
        }

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let echoes = [cwd, canonical.as_path()];
        let (stdout, stderr) = std::thread::scope(|scope| {
            // the span guard only covers this thread
            let out = scope.spawn(|| span.in_scope(|| self.drain(stdout, &spec.operation, &echoes)));
            let err = self.drain(stderr, &spec.operation, &echoes);
            (out.join().unwrap_or_default(), err)
        });

        let status = child.wait().map_err(spawn_err)?;

        if stdout.overflowed || stderr.overflowed {
            return Err(CommandError::BufferExceeded {
                operation: spec.operation.clone(),
                limit: self.options.max_buffer,
            });
        }

        let code = status.code().unwrap_or(-1);
        if status.success() {
            Ok(CommandOutput {
                code,
                stdout: stdout.text,
                stderr: stderr.text,
            })
        } else {
            Err(CommandError::exit(
                &spec.operation,
                code,
                stdout.text,
                stderr.text,
            ))
        }
    }
}

#[derive(Debug, Default)]
struct Captured {
    text: String,
    overflowed: bool,
}

impl ShellRunner {
    /// The child runs in `cwd` as given, never in its canonical form.
    fn command(&self, cwd: &Path, spec: &CommandSpec) -> Command {
        let mut command = self.shell.compose(spec);
        command.current_dir(cwd).envs(
            self.options
                .env
                .iter()
                .map(|(k, v)| (OsString::from(k), OsString::from(v))),
        );
        command
    }

    /// Reads a pipe to the end. Past the ceiling, lines are still drained so the
    /// child never blocks, but they are no longer kept. Invalid UTF-8 is replaced.
    fn drain<R: Read>(&self, pipe: Option<R>, operation: &str, cwds: &[&Path]) -> Captured {
        let mut captured = Captured::default();
        let Some(pipe) = pipe else {
            return captured;
        };

        let mut reader = BufReader::new(pipe);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!("stopped reading {operation} output: {err}");
                    break;
                }
            }
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim_end_matches(['\n', '\r']);
            if !cwds.iter().any(|cwd| is_noise(line, cwd)) {
                (self.logger)(operation, line);
            }
            if captured.overflowed {
                continue;
            }
            if captured.text.len() + line.len() + 1 > self.options.max_buffer {
                captured.overflowed = true;
                continue;
            }
            captured.text.push_str(line);
            captured.text.push('\n');
        }
        captured
    }
}

/// Blank lines and lines that only echo the working directory carry no information.
pub fn is_noise(line: &str, cwd: &Path) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || Path::new(trimmed) == cwd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit(code: i32, stdout: &str, stderr: &str) -> CommandError {
        CommandError::exit("test", code, stdout.to_string(), stderr.to_string())
    }

    #[test]
    fn test_not_a_repository_requires_code_and_signature() {
        let err = exit(
            128,
            "",
            "fatal: not a git repository (or any of the parent directories): .git",
        );
        assert!(err.is_not_a_repository());
        assert!(err.is_benign());

        assert!(!exit(128, "", "fatal: unable to access remote").is_not_a_repository());
        assert!(!exit(1, "", "fatal: not a git repository").is_not_a_repository());
    }

    #[test]
    fn test_nothing_to_commit_detected_on_stdout() {
        let err = exit(1, "On branch main\nnothing to commit, working tree clean\n", "");
        assert!(err.is_nothing_to_commit());
        assert!(!exit(1, "", "error: pathspec did not match").is_nothing_to_commit());
        assert!(!exit(2, "nothing to commit", "").is_nothing_to_commit());
    }

    #[test]
    fn test_exit_message_prefers_stderr() {
        let err = exit(3, "out", "  err  ");
        assert_eq!(err.message(), "err");
        assert_eq!(err.code(), Some(3));

        let err = exit(3, "only stdout\n", "");
        assert_eq!(err.message(), "only stdout");
    }

    #[test]
    fn test_is_noise_filters_blank_and_cwd_echo() {
        let cwd = Path::new("/work/repo");
        assert!(is_noise("   ", cwd));
        assert!(is_noise("", cwd));
        assert!(is_noise("/work/repo", cwd));
        assert!(is_noise("  /work/repo  ", cwd));
        assert!(!is_noise("added 12 packages", cwd));
        assert!(!is_noise("/work/repo/package.json", cwd));
    }

    #[test]
    fn test_posix_shell_wraps_network_commands_in_ssh_agent() {
        let shell = PosixShell { ssh_agent: true };
        let spec = CommandSpec::new("git-pull", "git", ["pull"]).networked();
        let command = shell.compose(&spec);
        assert_eq!(command.get_program(), "ssh-agent");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args[0], "sh");
        assert_eq!(args[1], "-c");
        assert_eq!(args[3], "git");
        assert_eq!(args[4], "pull");

        let local = CommandSpec::new("git-add", "git", ["add", "."]);
        assert_eq!(shell.compose(&local).get_program(), "sh");

        let no_agent = PosixShell { ssh_agent: false };
        assert_eq!(no_agent.compose(&spec).get_program(), "sh");
    }

    #[test]
    fn test_windows_shell_passes_parameters_directly() {
        let spec = CommandSpec::new("npm-install", "npm", ["install", "--force"]).networked();
        let command = WindowsShell.compose(&spec);
        assert_eq!(command.get_program(), "cmd");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, ["/C", "npm", "install", "--force"]);
    }

    #[test]
    fn test_remove_paths_per_dialect() {
        let posix = PosixShell::default().remove_paths("clean", &["node_modules", "package-lock.json"]);
        assert_eq!(posix.program, "rm");
        assert_eq!(posix.args, ["-rf", "node_modules", "package-lock.json"]);

        let windows = WindowsShell.remove_paths("clean", &["node_modules", "package-lock.json"]);
        assert_eq!(windows.program, "powershell");
        assert!(windows.args[2].ends_with("node_modules, package-lock.json"));
    }

    #[test]
    fn test_platform_selects_dialect() {
        let spec = CommandSpec::new("x", "git", ["status"]);
        assert_eq!(Platform::Posix.shell(false).compose(&spec).get_program(), "sh");
        assert_eq!(Platform::Windows.shell(false).compose(&spec).get_program(), "cmd");
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_captures_output_and_exit_codes() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ShellRunner::new(
            Box::new(PosixShell::default()),
            no_op_logger,
            RunnerOptions::default(),
        );

        let ok = runner
            .run(dir.path(), &CommandSpec::new("echo", "echo", ["hello"]))
            .unwrap();
        assert_eq!(ok.code, 0);
        assert_eq!(ok.stdout, "hello\n");

        let err = runner
            .run(dir.path(), &CommandSpec::new("fail", "sh", ["-c", "echo boom >&2; exit 7"]))
            .unwrap_err();
        assert_eq!(err.code(), Some(7));
        assert_eq!(err.message(), "boom");
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_enforces_buffer_ceiling() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ShellRunner::new(
            Box::new(PosixShell::default()),
            no_op_logger,
            RunnerOptions {
                max_buffer: 16,
                ..RunnerOptions::default()
            },
        );

        let err = runner
            .run(
                dir.path(),
                &CommandSpec::new("loud", "sh", ["-c", "for i in 1 2 3 4 5 6 7 8; do echo line-$i; done"]),
            )
            .unwrap_err();
        assert!(matches!(err, CommandError::BufferExceeded { limit: 16, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_inherited_stdio_reports_exit_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ShellRunner::new(
            Box::new(PosixShell::default()),
            no_op_logger,
            RunnerOptions {
                inherit_stdio: true,
                ..RunnerOptions::default()
            },
        );

        let ok = runner
            .run(dir.path(), &CommandSpec::new("true", "true", Vec::<String>::new()))
            .unwrap();
        assert_eq!(ok, CommandOutput::default());

        let err = runner
            .run(dir.path(), &CommandSpec::new("false", "sh", ["-c", "exit 3"]))
            .unwrap_err();
        assert_eq!(err.code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_keeps_reading_past_invalid_utf8() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ShellRunner::new(
            Box::new(PosixShell::default()),
            no_op_logger,
            RunnerOptions::default(),
        );

        let ok = runner
            .run(
                dir.path(),
                &CommandSpec::new("bytes", "sh", ["-c", r"printf 'before\n\377\nafter\n'"]),
            )
            .unwrap();
        assert_eq!(ok.stdout, "before\n\u{FFFD}\nafter\n");

        // the child must not be cut off mid-write
        let ok = runner
            .run(
                dir.path(),
                &CommandSpec::new("bytes", "sh", ["-c", r"printf '\377\n'; seq 1 200000"]),
            )
            .unwrap();
        assert_eq!(ok.code, 0);
        assert_eq!(ok.stdout.lines().count(), 200_001);
        assert!(ok.stdout.ends_with("200000\n"));
    }

    static LOGGED: std::sync::Mutex<Vec<(String, String)>> = std::sync::Mutex::new(Vec::new());

    fn capturing_logger(operation: &str, line: &str) {
        LOGGED
            .lock()
            .unwrap()
            .push((operation.to_string(), line.to_string()));
    }

    fn logged(operation: &str) -> Vec<String> {
        LOGGED
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, line)| line.clone())
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_streams_both_pipes_without_noise() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ShellRunner::new(
            Box::new(PosixShell::default()),
            capturing_logger,
            RunnerOptions::default(),
        );

        let ok = runner
            .run(
                dir.path(),
                &CommandSpec::new(
                    "npm-install-streamed",
                    "sh",
                    ["-c", "echo out-line; echo; pwd; echo err-line >&2; echo '   ' >&2"],
                ),
            )
            .unwrap();

        let mut lines = logged("npm-install-streamed");
        lines.sort();
        assert_eq!(lines, ["err-line", "out-line"]);
        // filtering only affects the stream, not the captured text
        assert!(ok.stdout.starts_with("out-line\n\n"));
    }

    #[test]
    fn test_command_runs_in_directory_as_given() {
        let runner = ShellRunner::new(Box::new(WindowsShell), no_op_logger, RunnerOptions::default());
        let cwd = Path::new(r"C:\work\repo");
        let command = runner.command(cwd, &CommandSpec::new("git-toplevel", "git", ["status"]));
        assert_eq!(command.get_current_dir(), Some(cwd));
        let prompt = std::ffi::OsStr::new("GIT_TERMINAL_PROMPT");
        assert!(
            command
                .get_envs()
                .any(|(key, value)| key == prompt && value == Some(std::ffi::OsStr::new("0")))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_filters_cwd_echo_through_symlink() {
        let dir = tempfile::TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let runner = ShellRunner::new(
            Box::new(PosixShell::default()),
            capturing_logger,
            RunnerOptions::default(),
        );
        let ok = runner
            .run(&link, &CommandSpec::new("pwd-through-link", "sh", ["-c", "pwd -P; echo done"]))
            .unwrap();

        assert!(ok.stdout.ends_with("done\n"));
        assert_eq!(logged("pwd-through-link"), ["done"]);
    }

    #[test]
    fn test_shell_runner_rejects_missing_directory() {
        let runner = ShellRunner::new(
            Box::new(PosixShell::default()),
            no_op_logger,
            RunnerOptions::default(),
        );
        let err = runner
            .run(
                Path::new("/definitely/not/here"),
                &CommandSpec::new("echo", "echo", ["x"]),
            )
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
