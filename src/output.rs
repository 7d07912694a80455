//! Terminal feedback for a sweep: the single-repository spinner, the workspace
//! progress board and the closing summary.
//!
//! Quiet mode prints only the final count and errors. Verbose mode replaces the
//! progress bars with a line per step on stderr.

use crate::config::Config;
use crate::constants::{MAX_VISIBLE_COMPLETIONS, PROGRESS_TICK_MS};
use crate::repo::{UpdateCallbacks, UpdateOutcome, UpdateResult, UpdateStep, repo_name};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Callbacks that report nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoOpCallbacks;

impl UpdateCallbacks for NoOpCallbacks {
    fn on_step(&self, _step: &UpdateStep) {}
    fn on_complete(&self, _result: &UpdateResult) {}
}

/// Step-by-step echo on stderr, active only in verbose mode.
#[derive(Debug, Clone, Copy)]
struct Echo {
    enabled: bool,
}

impl Echo {
    fn new(config: &Config) -> Self {
        Self {
            enabled: config.is_verbose(),
        }
    }

    fn header(self, repo_name: &str) {
        if self.enabled {
            eprintln!("\n{}", format!("[{repo_name}]").white().bold());
        }
    }

    fn step(self, step: &UpdateStep) {
        if self.enabled {
            eprintln!("  {} {}", "→".dimmed(), step.to_string().dimmed());
        }
    }

    fn status(self, success: bool, error: Option<&str>) {
        if !self.enabled {
            return;
        }
        match (success, error) {
            (true, _) => eprintln!("  {} done", "✓".green()),
            (false, Some(err)) => eprintln!("  {} {}", "✗".red(), err),
            (false, None) => eprintln!("  {} failed", "✗".red()),
        }
    }
}

fn outcome_symbol(outcome: &UpdateOutcome) -> colored::ColoredString {
    match outcome {
        UpdateOutcome::Success(_) => "✓".green(),
        UpdateOutcome::Skipped(_) => "-".yellow(),
        UpdateOutcome::Failed(_) => "✗".red(),
    }
}

/// One line describing how a repository ended.
fn outcome_line(name: &str, outcome: &UpdateOutcome) -> String {
    let detail = match outcome {
        UpdateOutcome::Success(success) if success.committed => "updated".to_string(),
        UpdateOutcome::Success(_) => "already current".to_string(),
        UpdateOutcome::Skipped(reason) => format!("skipped: {reason}"),
        UpdateOutcome::Failed(failure) => format!("failed at {}: {}", failure.step, failure.error),
    };
    format!("{} {} {}", outcome_symbol(outcome), name, detail)
}

fn step_label(step: &UpdateStep) -> &'static str {
    match step {
        UpdateStep::Started => "Starting update...",
        UpdateStep::Pulling => "Pulling changes from origin...",
        UpdateStep::Cleaning => "Removing node_modules and lockfile...",
        UpdateStep::Installing => "Installing dependencies...",
        UpdateStep::Bumping => "Bumping dependency versions...",
        UpdateStep::Staging => "Staging manifest and lockfile...",
        UpdateStep::Committing => "Committing...",
        UpdateStep::Pushing => "Pushing commits...",
        UpdateStep::PushingTags => "Pushing tags...",
        UpdateStep::Completed => "Completed",
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Spinner for a single-repository run (`--from`/`--only`).
pub struct SingleRepoProgress {
    spinner: Option<ProgressBar>,
    echo: Echo,
}

impl SingleRepoProgress {
    /// No spinner is drawn in quiet or verbose mode.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let spinner = (!config.is_quiet() && !config.is_verbose()).then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(spinner_style());
            spinner.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
            spinner
        });
        Self {
            spinner,
            echo: Echo::new(config),
        }
    }
}

impl UpdateCallbacks for SingleRepoProgress {
    fn on_update_start(&self, repo_name: &str) {
        self.echo.header(repo_name);
    }

    fn on_step(&self, step: &UpdateStep) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(step_label(step));
        }
    }

    fn on_step_execute(&self, step: &UpdateStep) {
        self.echo.step(step);
    }

    fn on_complete(&self, result: &UpdateResult) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(outcome_line(&repo_name(&result.path), &result.outcome));
        }
    }

    fn on_completion_status(&self, success: bool, error: Option<&str>) {
        self.echo.status(success, error);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    updated: usize,
    skipped: usize,
    failed: usize,
}

impl Tally {
    fn add(&mut self, outcome: &UpdateOutcome) {
        match outcome {
            UpdateOutcome::Success(_) => self.updated += 1,
            UpdateOutcome::Skipped(_) => self.skipped += 1,
            UpdateOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn seen(&self) -> usize {
        self.updated + self.skipped + self.failed
    }

    /// Status text next to the bar; empty while everything succeeds.
    fn status(&self) -> String {
        let mut parts = Vec::new();
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed).red().to_string());
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped).yellow().to_string());
        }
        parts.join(" · ")
    }
}

/// Finished repositories, most recent last, bounded by [`MAX_VISIBLE_COMPLETIONS`].
#[derive(Debug, Default)]
struct Board {
    recent: VecDeque<String>,
    tally: Tally,
}

impl Board {
    fn push(&mut self, name: &str, outcome: &UpdateOutcome) {
        self.tally.add(outcome);
        self.recent
            .push_back(format!("{} {}", outcome_symbol(outcome), name));
        while self.recent.len() > MAX_VISIBLE_COMPLETIONS {
            self.recent.pop_front();
        }
    }

    /// Lines for `slots` display rows; entries that do not fit collapse into
    /// a leading "earlier" line.
    fn lines(&self, slots: usize) -> Vec<String> {
        if slots == 0 {
            return Vec::new();
        }
        let seen = self.tally.seen();
        let shown = if seen > slots {
            slots - 1
        } else {
            seen.min(self.recent.len())
        };

        let mut lines = Vec::with_capacity(slots);
        if seen > shown {
            lines.push(format!("... {} earlier", seen - shown).dimmed().to_string());
        }
        let skip = self.recent.len().saturating_sub(shown);
        lines.extend(self.recent.iter().skip(skip).cloned());
        lines
    }
}

/// Progress bar for a workspace sweep plus a short list of finished repositories.
#[derive(Clone)]
pub struct WorkspaceProgress {
    _multi: Arc<MultiProgress>,
    bar: ProgressBar,
    slots: Vec<ProgressBar>,
    board: Arc<Mutex<Board>>,
    echo: Echo,
}

impl WorkspaceProgress {
    /// Bars are hidden in quiet or verbose mode.
    #[must_use]
    pub fn new(total: usize, config: &Config) -> Self {
        let multi = Arc::new(MultiProgress::new());
        let hidden = config.is_quiet() || config.is_verbose();

        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            let bar = multi.add(ProgressBar::new(total as u64));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:40.cyan/blue} {pos}/{len} repositories {spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█░"),
            );
            bar.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
            bar
        };

        let slot_style = ProgressStyle::default_spinner()
            .template("  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let slots = if hidden {
            Vec::new()
        } else {
            (0..MAX_VISIBLE_COMPLETIONS)
                .map(|_| {
                    let slot = multi.add(ProgressBar::new_spinner());
                    slot.set_style(slot_style.clone());
                    slot
                })
                .collect()
        };

        Self {
            _multi: multi,
            bar,
            slots,
            board: Arc::new(Mutex::new(Board::default())),
            echo: Echo::new(config),
        }
    }

    pub fn tracker(&self, repo_name: &str) -> RepoTracker {
        RepoTracker {
            name: repo_name.to_string(),
            progress: self.clone(),
        }
    }

    fn show_step(&self, repo_name: &str, step: &UpdateStep) {
        self.bar
            .set_message(format!("{}: {}", repo_name, step_label(step)));
    }

    fn record(&self, repo_name: &str, outcome: &UpdateOutcome) {
        self.bar.inc(1);
        let mut board = self.board.lock().unwrap_or_else(PoisonError::into_inner);
        board.push(repo_name, outcome);
        self.bar.set_message(board.tally.status());

        let lines = board.lines(self.slots.len());
        for (i, slot) in self.slots.iter().enumerate() {
            slot.set_message(lines.get(i).cloned().unwrap_or_default());
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
        for slot in &self.slots {
            slot.finish_and_clear();
        }
    }
}

/// Callbacks for one repository of a workspace sweep.
#[derive(Clone)]
pub struct RepoTracker {
    name: String,
    progress: WorkspaceProgress,
}

impl UpdateCallbacks for RepoTracker {
    fn on_update_start(&self, repo_name: &str) {
        self.progress.echo.header(repo_name);
    }

    fn on_step(&self, step: &UpdateStep) {
        self.progress.show_step(&self.name, step);
    }

    fn on_step_execute(&self, step: &UpdateStep) {
        self.progress.echo.step(step);
    }

    fn on_complete(&self, result: &UpdateResult) {
        self.progress.record(&self.name, &result.outcome);
    }

    fn on_completion_status(&self, success: bool, error: Option<&str>) {
        self.progress.echo.status(success, error);
    }
}

pub fn print_working_dir(path: &Path, config: &Config) {
    if !config.is_quiet() {
        println!(
            "{} {}",
            "Sweeping".cyan(),
            path.display().to_string().white().bold()
        );
    }
}

pub fn print_workspace_start(total: usize, eligible: usize, config: &Config) {
    if config.is_quiet() {
        return;
    }
    if total == 0 {
        println!("{}", "No repositories found".yellow().bold());
    } else {
        println!(
            "{}",
            format!("{total} repositories found, {eligible} eligible").dimmed()
        );
    }
}

pub fn print_summary(results: &[UpdateResult], duration: Duration, config: &Config) {
    let summary = Summary::of(results);
    if config.is_quiet() {
        summary.print_quiet();
    } else {
        summary.print(duration);
    }
}

/// Results grouped by outcome, each group in sweep order.
struct Summary<'a> {
    updated: Vec<&'a UpdateResult>,
    skipped: Vec<&'a UpdateResult>,
    failed: Vec<&'a UpdateResult>,
}

impl<'a> Summary<'a> {
    fn of(results: &'a [UpdateResult]) -> Self {
        let mut summary = Summary {
            updated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        };
        for result in results {
            let group = match result.outcome {
                UpdateOutcome::Success(_) => &mut summary.updated,
                UpdateOutcome::Skipped(_) => &mut summary.skipped,
                UpdateOutcome::Failed(_) => &mut summary.failed,
            };
            group.push(result);
        }
        summary
    }

    /// Repositories that entered the pipeline.
    fn attempted(&self) -> usize {
        self.updated.len() + self.failed.len()
    }

    fn count_line(&self) -> String {
        format!(
            "{}/{} repositories updated",
            self.updated.len(),
            self.attempted()
        )
    }

    fn print_quiet(&self) {
        println!("{}", self.count_line());
        for result in &self.failed {
            if let UpdateOutcome::Failed(failure) = &result.outcome {
                eprintln!("error: {}: {}", result.path.display(), failure.error);
            }
        }
    }

    fn print(&self, duration: Duration) {
        println!("\n{}\n", format!("{:─^50}", " Summary ").cyan().bold());

        print_group("Updated", &self.updated, |s| s.green().bold());
        print_group("Skipped", &self.skipped, |s| s.yellow().bold());
        print_group("Failed", &self.failed, |s| s.red().bold());

        println!(
            "{} in {}",
            self.count_line().white().bold(),
            format_duration(duration)
        );
    }
}

fn print_group(title: &str, group: &[&UpdateResult], paint: fn(&str) -> colored::ColoredString) {
    if group.is_empty() {
        return;
    }
    println!("{}", paint(&format!("{title} ({}):", group.len())));
    for result in group {
        let line = outcome_line(&result.path.display().to_string(), &result.outcome);
        if result.duration.is_zero() {
            println!("  {line}");
        } else {
            println!("  {line} {}", format_duration(result.duration).dimmed());
        }
    }
    println!();
}

fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f32())
}
