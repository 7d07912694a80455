//! `package.json` and `.dep-sweep.json` models.
//!
//! Both files are read leniently: a missing file is "no opinion", and an
//! unreadable or malformed one is logged and treated the same way.

use crate::constants::{CONFIG_FILE, MANIFEST_FILE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Package name to version specifier.
pub type DependencyMap = BTreeMap<String, String>;

/// The five dependency categories a manifest can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
    Prod,
    Dev,
    Optional,
    Bundle,
    Peer,
}

impl DependencyKind {
    pub const ALL: [DependencyKind; 5] = [
        DependencyKind::Prod,
        DependencyKind::Dev,
        DependencyKind::Optional,
        DependencyKind::Bundle,
        DependencyKind::Peer,
    ];

    /// Manifest field holding this category.
    pub fn field(self) -> &'static str {
        match self {
            DependencyKind::Prod => "dependencies",
            DependencyKind::Dev => "devDependencies",
            DependencyKind::Optional => "optionalDependencies",
            DependencyKind::Bundle => "bundleDependencies",
            DependencyKind::Peer => "peerDependencies",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// `author` as npm allows it: a string or a person object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Author {
    Text(String),
    Person {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
}

impl Author {
    /// Renders the author as `Name <email>` for `git commit --author`.
    ///
    /// `None` unless both a name and an email are present; git rejects a bare name.
    pub fn to_git(&self) -> Option<String> {
        match self {
            // "Name <email> (url)"
            Author::Text(text) => {
                let (name, rest) = text.split_once('<')?;
                let (email, _) = rest.split_once('>')?;
                git_ident(name, email)
            }
            Author::Person { name, email, .. } => git_ident(name.as_deref()?, email.as_deref()?),
        }
    }
}

fn git_ident(name: &str, email: &str) -> Option<String> {
    let name = non_empty(name)?;
    let email = non_empty(email)?;
    Some(format!("{name} <{email}>"))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// npm accepts a list of names, `true` (every production dependency) or a map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BundleDependencies {
    All(bool),
    Names(Vec<String>),
    Map(DependencyMap),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub dependencies: DependencyMap,
    #[serde(default)]
    pub dev_dependencies: DependencyMap,
    #[serde(default)]
    pub optional_dependencies: DependencyMap,
    #[serde(default, alias = "bundledDependencies")]
    pub bundle_dependencies: Option<BundleDependencies>,
    #[serde(default)]
    pub peer_dependencies: DependencyMap,
    #[serde(default)]
    pub author: Option<Author>,
}

impl Manifest {
    pub fn load(dir: &Path) -> Option<Self> {
        load_json(&dir.join(MANIFEST_FILE))
    }

    /// Declared dependencies of one category with their specifiers.
    ///
    /// Bundled names are looked up in `dependencies` then `optionalDependencies`;
    /// names without a declared version are dropped.
    pub fn dependencies(&self, kind: DependencyKind) -> DependencyMap {
        match kind {
            DependencyKind::Prod => self.dependencies.clone(),
            DependencyKind::Dev => self.dev_dependencies.clone(),
            DependencyKind::Optional => self.optional_dependencies.clone(),
            DependencyKind::Peer => self.peer_dependencies.clone(),
            DependencyKind::Bundle => match &self.bundle_dependencies {
                None | Some(BundleDependencies::All(false)) => DependencyMap::new(),
                Some(BundleDependencies::All(true)) => self.dependencies.clone(),
                Some(BundleDependencies::Map(map)) => map.clone(),
                Some(BundleDependencies::Names(names)) => names
                    .iter()
                    .filter_map(|name| {
                        self.dependencies
                            .get(name)
                            .or_else(|| self.optional_dependencies.get(name))
                            .map(|version| (name.clone(), version.clone()))
                    })
                    .collect(),
            },
        }
    }
}

/// Repository-local `.dep-sweep.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoConfig {
    /// Leave this repository out of the sweep.
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub dependencies: DependencyMap,
    #[serde(default)]
    pub dev_dependencies: DependencyMap,
    #[serde(default)]
    pub optional_dependencies: DependencyMap,
    #[serde(default, alias = "bundledDependencies")]
    pub bundle_dependencies: DependencyMap,
    #[serde(default)]
    pub peer_dependencies: DependencyMap,
}

impl RepoConfig {
    pub fn load(dir: &Path) -> Option<Self> {
        load_json(&dir.join(CONFIG_FILE))
    }

    /// Pinned versions that replace the manifest's specifiers for one category.
    pub fn overrides(&self, kind: DependencyKind) -> &DependencyMap {
        match kind {
            DependencyKind::Prod => &self.dependencies,
            DependencyKind::Dev => &self.dev_dependencies,
            DependencyKind::Optional => &self.optional_dependencies,
            DependencyKind::Bundle => &self.bundle_dependencies,
            DependencyKind::Peer => &self.peer_dependencies,
        }
    }
}

/// Reads a JSON file, treating absence as `None` and logging any other failure.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), "cannot read file: {}", err);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), "invalid JSON: {}", err);
            None
        }
    }
}
