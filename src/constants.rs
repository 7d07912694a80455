//! Application-wide constants.
//!
//! Centralized configuration values to avoid magic numbers throughout the codebase.

/// Public npm registry used when `--registry` is not given.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Commit author used when no CLI value, config, git identity or manifest author exists.
pub const FALLBACK_AUTHOR: &str = "dep-sweep <dep-sweep@users.noreply.github.com>";

/// Commit message used when neither the CLI nor the repository config provides one.
pub const FALLBACK_MESSAGE: &str = "chore(deps): update dependencies";

/// Repository-local configuration file.
pub const CONFIG_FILE: &str = ".dep-sweep.json";

/// Package manifest and lockfile names.
pub const MANIFEST_FILE: &str = "package.json";
pub const LOCK_FILE: &str = "package-lock.json";
pub const MODULES_DIR: &str = "node_modules";

/// External programs.
pub const GIT: &str = "git";
pub const NPM: &str = "npm";

/// Remote consulted for the default branch and used for push.
pub const REMOTE: &str = "origin";

/// Exit code git uses for "not a git repository" and other fatal conditions.
pub const NOT_A_REPOSITORY_CODE: i32 = 128;

/// Exit code git uses when `commit` finds nothing to record.
pub const NOTHING_TO_COMMIT_CODE: i32 = 1;

/// Upper bound on captured bytes per stream for one command (10 MiB).
pub const MAX_BUFFER_BYTES: usize = 10 * 1024 * 1024;

/// Environment variable holding tracing filter directives.
pub const LOG_ENV: &str = "DEP_SWEEP_LOG";

/// Environment variable that can replace `--path`.
pub const PATH_ENV: &str = "DEP_SWEEP_PATH";

/// Progress bar tick interval in milliseconds.
pub const PROGRESS_TICK_MS: u64 = 80;

/// Maximum number of completed repositories to show in the workspace progress display.
pub const MAX_VISIBLE_COMPLETIONS: usize = 5;

/// Default name used when a repository name cannot be determined from its path.
pub const DEFAULT_REPO_NAME: &str = "repository";
