use anyhow::Context;
use clap::Parser;
use dep_sweep::cli::{BumpArgs, Cli, Command, SweepArgs};
use dep_sweep::config::{Config, LogConfig};
use dep_sweep::npm::{self, BumpInvocation, InstallOptions};
use dep_sweep::output;
use dep_sweep::repo::{RepoTarget, Tools, repo_name};
use dep_sweep::runner::Platform;
use dep_sweep::workspace::{self, Mode};
use dialoguer::Confirm;
use std::io::IsTerminal;
use std::time::Instant;
use tracing::error;

fn main() {
    let cli = Cli::parse();
    let log = LogConfig::from_env(cli.verbosity());
    log.init();

    if let Err(err) = run(&cli, &log) {
        // per-repository failures never get here; this is a setup problem
        error!("{:#}", err);
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli, log: &LogConfig) -> anyhow::Result<()> {
    let mut config = Config {
        verbosity: cli.verbosity(),
        platform: Platform::detect(),
        ssh_agent: true,
        log_filter: log.is_from_env(),
    };

    match &cli.command {
        Command::Sweep(args) => {
            config.ssh_agent = !args.no_ssh_agent;
            sweep(args, &config)
        }
        Command::Bump(args) => bump(args, &config),
    }
}

fn sweep(args: &SweepArgs, config: &Config) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let mode = args.mode(cwd);
    let options = args.options();
    let runner = config.runner();
    let bump = BumpInvocation::current();
    let tools = Tools {
        runner: &runner,
        shell: runner.shell(),
        bump: &bump,
    };

    output::print_working_dir(mode.dir(), config);
    let start = Instant::now();
    let targets = workspace::plan(&runner, &mode)?;
    let eligible = targets.iter().filter(|t| t.eligibility().is_ok()).count();

    let results = match mode {
        Mode::Path(_) => {
            output::print_workspace_start(targets.len(), eligible, config);
            if eligible > 0 && !args.yes && !confirm(eligible)? {
                return Ok(());
            }

            let progress = output::WorkspaceProgress::new(targets.len(), config);
            let results = workspace::update_targets(&targets, &options, &tools, |target| {
                progress.tracker(&repo_name(&target.path))
            });
            progress.finish();
            results
        }
        Mode::From(_) | Mode::Only(_) => {
            workspace::update_targets(&targets, &options, &tools, |_: &RepoTarget| {
                output::SingleRepoProgress::new(config)
            })
        }
    };

    output::print_summary(&results, start.elapsed(), config);
    Ok(())
}

/// Asks before pushing to many remotes; only when a person is at the terminal.
fn confirm(eligible: usize) -> anyhow::Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(format!("Update, commit and push {eligible} repositories?"))
        .default(true)
        .interact()
        .context("Failed to read confirmation")
}

fn bump(args: &BumpArgs, config: &Config) -> anyhow::Result<()> {
    let dir = match &args.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let runner = config.runner();
    let options = InstallOptions {
        save: true,
        registry: args.install.registry.clone(),
        force: args.install.force,
    };

    let count = npm::bump(&runner, &dir, &args.kinds(), &options)
        .with_context(|| format!("Failed to bump dependencies in {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), commands = count, "bump finished");
    Ok(())
}
