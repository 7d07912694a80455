//! Command-line interface.

use crate::config::Verbosity;
use crate::constants::{DEFAULT_REGISTRY, PATH_ENV};
use crate::manifest::DependencyKind;
use crate::policy::SweepOptions;
use crate::workspace::Mode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "dep-sweep",
    version,
    about = "Refresh npm dependencies across many git repositories, commit and push"
)]
pub struct Cli {
    /// Only print the final count and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print every step and command output line
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Update, commit and push every repository under a directory
    Sweep(SweepArgs),
    /// Move the dependencies of the package in a directory to their latest versions
    Bump(BumpArgs),
}

#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Directory whose subdirectories hold the repositories
    #[arg(long, env = PATH_ENV)]
    pub path: Option<PathBuf>,

    /// Update only the repository in this directory
    #[arg(long, conflicts_with = "only")]
    pub from: Option<PathBuf>,

    /// Update only the repository in this directory
    #[arg(long)]
    pub only: Option<PathBuf>,

    #[command(flatten)]
    pub install: InstallArgs,

    /// Commit message
    #[arg(long, short)]
    pub message: Option<String>,

    /// Commit author, "Name <email>"
    #[arg(long)]
    pub author: Option<String>,

    /// Do not ask for confirmation before pushing
    #[arg(long, short)]
    pub yes: bool,

    /// Do not start an ssh-agent around pull and push
    #[arg(long)]
    pub no_ssh_agent: bool,
}

impl SweepArgs {
    /// `--from` and `--only` select a single repository; otherwise the path
    /// (or the current directory) is swept.
    pub fn mode(&self, cwd: PathBuf) -> Mode {
        if let Some(dir) = &self.from {
            Mode::From(dir.clone())
        } else if let Some(dir) = &self.only {
            Mode::Only(dir.clone())
        } else {
            Mode::Path(self.path.clone().unwrap_or(cwd))
        }
    }

    pub fn options(&self) -> SweepOptions {
        SweepOptions {
            registry: self.install.registry.clone(),
            force: self.install.force,
            message: self.message.clone(),
            author: self.author.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// npm registry URL
    #[arg(long, default_value = DEFAULT_REGISTRY)]
    pub registry: String,

    /// Pass --force to npm install
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct BumpArgs {
    /// Package directory (defaults to the current directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    #[arg(long)]
    pub save_prod: bool,

    #[arg(long)]
    pub save_dev: bool,

    #[arg(long)]
    pub save_optional: bool,

    #[arg(long)]
    pub save_bundle: bool,

    #[arg(long)]
    pub save_peer: bool,

    #[command(flatten)]
    pub install: InstallArgs,
}

impl BumpArgs {
    /// Selected categories; prod and dev when none is given.
    pub fn kinds(&self) -> Vec<DependencyKind> {
        let selected: Vec<DependencyKind> = [
            (self.save_prod, DependencyKind::Prod),
            (self.save_dev, DependencyKind::Dev),
            (self.save_optional, DependencyKind::Optional),
            (self.save_bundle, DependencyKind::Bundle),
            (self.save_peer, DependencyKind::Peer),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect();

        if selected.is_empty() {
            vec![DependencyKind::Prod, DependencyKind::Dev]
        } else {
            selected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dep-sweep").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_sweep_defaults_to_path_mode_in_cwd() {
        let cli = parse(&["sweep"]);
        let Command::Sweep(args) = cli.command else {
            panic!("expected sweep");
        };
        // DEP_SWEEP_PATH may be set in the environment running the tests
        if std::env::var_os(PATH_ENV).is_none() {
            assert_eq!(args.mode(PathBuf::from("/cwd")), Mode::Path(PathBuf::from("/cwd")));
        }
        let options = args.options();
        assert_eq!(options.registry, DEFAULT_REGISTRY);
        assert!(!options.force);
        assert_eq!(options.message, None);
    }

    #[test]
    fn test_sweep_single_repository_modes() {
        let Command::Sweep(args) = parse(&["sweep", "--from", "/r"]).command else {
            panic!("expected sweep");
        };
        assert_eq!(args.mode(PathBuf::from("/cwd")), Mode::From(PathBuf::from("/r")));

        let Command::Sweep(args) = parse(&["sweep", "--only", "/r"]).command else {
            panic!("expected sweep");
        };
        assert_eq!(args.mode(PathBuf::from("/cwd")), Mode::Only(PathBuf::from("/r")));
    }

    #[test]
    fn test_sweep_modes_are_exclusive() {
        let result = Cli::try_parse_from(["dep-sweep", "sweep", "--from", "/a", "--only", "/b"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sweep_options_from_flags() {
        let Command::Sweep(args) = parse(&[
            "sweep",
            "--registry",
            "https://npm.example.com/",
            "--force",
            "--message",
            "deps",
            "--author",
            "A <a@example.com>",
        ])
        .command
        else {
            panic!("expected sweep");
        };
        let options = args.options();
        assert_eq!(options.registry, "https://npm.example.com/");
        assert!(options.force);
        assert_eq!(options.message.as_deref(), Some("deps"));
        assert_eq!(options.author.as_deref(), Some("A <a@example.com>"));
    }

    #[test]
    fn test_bump_defaults_to_prod_and_dev() {
        let Command::Bump(args) = parse(&["bump"]).command else {
            panic!("expected bump");
        };
        assert_eq!(args.kinds(), [DependencyKind::Prod, DependencyKind::Dev]);
    }

    #[test]
    fn test_bump_selected_kinds() {
        let Command::Bump(args) = parse(&["bump", "--save-optional", "--save-bundle"]).command
        else {
            panic!("expected bump");
        };
        assert_eq!(args.kinds(), [DependencyKind::Optional, DependencyKind::Bundle]);
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["-q", "bump"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["bump", "-v"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["bump"]).verbosity(), Verbosity::Normal);
        assert!(Cli::try_parse_from(["dep-sweep", "-q", "-v", "bump"]).is_err());
    }
}
