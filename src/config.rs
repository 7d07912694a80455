//! Runtime configuration derived from CLI arguments, and logging setup.

use crate::constants::LOG_ENV;
use crate::runner::{self, LineLogger, Platform, RunnerOptions, ShellRunner};
use tracing_subscriber::EnvFilter;

/// Runtime configuration derived from CLI arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// Controls the verbosity level of CLI output.
    pub verbosity: Verbosity,
    /// Host OS family, resolved once at startup.
    pub platform: Platform,
    /// Run network commands under a per-command `ssh-agent` (POSIX only).
    pub ssh_agent: bool,
    /// `DEP_SWEEP_LOG` picked the diagnostic channels.
    pub log_filter: bool,
}

impl Config {
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Returns the line logger for command output.
    ///
    /// Config only picks the callback; the runner decides when to call it and the
    /// tracing filter decides which channels are shown.
    #[must_use]
    pub fn line_logger(&self) -> LineLogger {
        if self.is_verbose() || self.log_filter {
            runner::verbose_logger
        } else {
            runner::no_op_logger
        }
    }

    /// Builds the process runner for this platform.
    #[must_use]
    pub fn runner(&self) -> ShellRunner {
        ShellRunner::new(
            self.platform.shell(self.ssh_agent),
            self.line_logger(),
            RunnerOptions::default(),
        )
    }
}

/// Verbosity level for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Tracing filter setup, built once in `main` and installed as the global subscriber.
///
/// Directives from `DEP_SWEEP_LOG` win over the verbosity default. Command output is
/// logged inside a `cmd` span whose `op` field names the operation, so a single
/// channel can be enabled with e.g. `dep_sweep[cmd{op=git-pull}]=debug`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    directives: String,
    from_env: bool,
}

impl LogConfig {
    pub fn new(verbosity: Verbosity, env_directives: Option<String>) -> Self {
        match env_directives.filter(|d| !d.trim().is_empty()) {
            Some(directives) => Self {
                directives,
                from_env: true,
            },
            None => Self {
                directives: Self::default_directives(verbosity).to_string(),
                from_env: false,
            },
        }
    }

    pub fn from_env(verbosity: Verbosity) -> Self {
        Self::new(verbosity, std::env::var(LOG_ENV).ok())
    }

    fn default_directives(verbosity: Verbosity) -> &'static str {
        match verbosity {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "dep_sweep=debug",
        }
    }

    pub fn directives(&self) -> &str {
        &self.directives
    }

    /// Whether the directives came from `DEP_SWEEP_LOG`.
    pub fn is_from_env(&self) -> bool {
        self.from_env
    }

    /// Falls back to `warn` when the directives do not parse.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.directives).unwrap_or_else(|_| EnvFilter::new("warn"))
    }

    /// Installs the subscriber. Safe to call more than once.
    pub fn init(&self) {
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(self.filter())
            .with_target(false)
            .try_init();
    }
}
