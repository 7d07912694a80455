//! npm command construction and the dependency bump.
//!
//! Dependencies pinned to an exact version are reinstalled at that version;
//! everything else is moved to `latest`.

use crate::constants::{LOCK_FILE, MODULES_DIR, NPM};
use crate::manifest::{DependencyKind, DependencyMap, Manifest, RepoConfig};
use crate::runner::{CommandError, CommandRunner, CommandSpec, Shell};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

impl Dependency {
    /// `name@version` as npm expects it on the command line.
    pub fn spec(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Exact specifiers start with a digit (`1.2.3`); ranges, tags and URLs do not.
pub fn is_exact(version: &str) -> bool {
    version.trim().starts_with(|c: char| c.is_ascii_digit())
}

/// Applies configured versions to names the map already declares.
pub fn with_overrides(deps: &DependencyMap, overrides: &DependencyMap) -> DependencyMap {
    deps.iter()
        .map(|(name, version)| {
            let version = overrides.get(name).unwrap_or(version);
            (name.clone(), version.clone())
        })
        .collect()
}

/// Entries with an exact version, kept at that version.
pub fn deps_exact(deps: &DependencyMap) -> Vec<Dependency> {
    deps.iter()
        .filter(|(_, version)| is_exact(version))
        .map(|(name, version)| Dependency {
            name: name.clone(),
            version: version.trim().to_string(),
        })
        .collect()
}

/// Entries with a range, moved to `latest`.
pub fn deps_range(deps: &DependencyMap) -> Vec<Dependency> {
    deps.iter()
        .filter(|(_, version)| !is_exact(version))
        .map(|(name, _)| Dependency {
            name: name.clone(),
            version: "latest".to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Record the result in `package.json` and the lockfile.
    pub save: bool,
    pub registry: String,
    /// Pass `--force` to bypass npm's safety checks.
    pub force: bool,
}

/// `install`, then the save flag, registry and force, in that order.
pub fn install_params(options: &InstallOptions) -> Vec<String> {
    let mut params = vec![
        "install".to_string(),
        (if options.save { "--save" } else { "--no-save" }).to_string(),
        "--registry".to_string(),
        options.registry.clone(),
    ];
    if options.force {
        params.push("--force".to_string());
    }
    params
}

/// Fresh install of everything the manifest declares.
pub fn install(options: &InstallOptions) -> CommandSpec {
    CommandSpec::new("npm-install", NPM, install_params(options))
}

/// Deletes the lockfile and `node_modules`.
pub fn clean(shell: &dyn Shell) -> CommandSpec {
    shell.remove_paths("npm-clean", &[MODULES_DIR, LOCK_FILE])
}

/// npm flag that records a package in the given category.
pub fn save_flag(kind: DependencyKind) -> &'static str {
    match kind {
        DependencyKind::Prod => "--save-prod",
        DependencyKind::Dev => "--save-dev",
        DependencyKind::Optional => "--save-optional",
        DependencyKind::Bundle => "--save-bundle",
        DependencyKind::Peer => "--save-peer",
    }
}

/// `npm install` for one category of packages; exact ones also get `--save-exact`.
pub fn install_packages(
    options: &InstallOptions,
    kind: DependencyKind,
    exact: bool,
    packages: &[Dependency],
) -> CommandSpec {
    let mut args = install_params(options);
    args.push(save_flag(kind).to_string());
    if exact {
        args.push("--save-exact".to_string());
    }
    args.extend(packages.iter().map(Dependency::spec));

    let operation = if exact { "npm-install-exact" } else { "npm-install-latest" };
    CommandSpec::new(operation, NPM, args)
}

/// Commands that bring every selected category of `dir`'s manifest up to date.
pub fn bump_commands(
    manifest: &Manifest,
    config: &RepoConfig,
    kinds: &[DependencyKind],
    options: &InstallOptions,
) -> Vec<CommandSpec> {
    let mut commands = Vec::new();
    for &kind in kinds {
        let deps = with_overrides(&manifest.dependencies(kind), config.overrides(kind));

        let range = deps_range(&deps);
        if !range.is_empty() {
            commands.push(install_packages(options, kind, false, &range));
        }
        let exact = deps_exact(&deps);
        if !exact.is_empty() {
            commands.push(install_packages(options, kind, true, &exact));
        }
    }
    commands
}

/// Bumps the manifest in `dir`. Without a readable manifest there is nothing to do.
pub fn bump(
    runner: &dyn CommandRunner,
    dir: &Path,
    kinds: &[DependencyKind],
    options: &InstallOptions,
) -> Result<usize, CommandError> {
    let Some(manifest) = Manifest::load(dir) else {
        info!(dir = %dir.display(), "no package manifest, nothing to bump");
        return Ok(0);
    };
    let config = RepoConfig::load(dir).unwrap_or_default();

    let commands = bump_commands(&manifest, &config, kinds, options);
    for command in &commands {
        info!("{}", command.display());
        runner.run(dir, command)?;
    }
    Ok(commands.len())
}

/// Runs this program's `bump` sub-command as a separate process, so a crash
/// there cannot take the sweep down with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpInvocation {
    pub program: PathBuf,
}

impl BumpInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The running executable, falling back to the binary name on `PATH`.
    pub fn current() -> Self {
        let program = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("dep-sweep"));
        Self { program }
    }

    pub fn command(&self, registry: &str, force: bool) -> CommandSpec {
        let mut args = vec!["bump".to_string(), "--registry".to_string(), registry.to_string()];
        if force {
            args.push("--force".to_string());
        }
        CommandSpec::new("dep-bump", self.program.to_string_lossy(), args)
    }
}
