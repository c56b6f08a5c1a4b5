//! Layering lint for the offline agent.
//!
//! `agent/src` is split into `domain` (queue, cache and replay rules behind
//! ports), `inbound` (the actix-web proxy and control endpoints) and
//! `outbound` (SQLite, reqwest, sync registry and metrics adapters). The lint
//! parses every file in those trees and rejects imports that cross a
//! boundary:
//!
//! - `domain` may not name `inbound`, `outbound`, or any HTTP, storage or
//!   metrics crate;
//! - `inbound` may not name `outbound` or the storage and HTTP client crates;
//! - `outbound` may not name `inbound` or the HTTP server crates.
//!
//! `#[cfg(test)]` modules and test-only files (`tests.rs`, `*_tests.rs`,
//! `test_utils.rs`) are skipped; adapter tests stand up real servers.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use syn::visit::{self, Visit};

/// Library name of the linted crate, as written in absolute paths.
const CRATE_NAME: &str = "offline_agent";

const STORAGE_CRATES: [&str; 4] = ["diesel", "diesel_async", "diesel_migrations", "libsqlite3_sys"];
const SERVER_CRATES: [&str; 2] = ["actix_service", "actix_web"];

/// A forbidden import found in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File path relative to `agent/src`.
    pub file: PathBuf,
    /// Which rule was broken.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.message)
    }
}

/// Why a lint run did not pass.
#[derive(Debug)]
pub enum ArchitectureLintError {
    /// Walking or reading `agent/src` failed.
    Io(io::Error),
    /// A file could not be attributed to a layer or parsed as Rust.
    Parse { file: PathBuf, message: String },
    /// The sources parsed but broke at least one rule.
    Violations(Vec<Violation>),
}

impl fmt::Display for ArchitectureLintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cannot read agent sources: {err}"),
            Self::Parse { file, message } => {
                write!(f, "cannot lint {}: {message}", file.display())
            }
            Self::Violations(violations) => {
                writeln!(f, "{} layering violation(s):", violations.len())?;
                violations
                    .iter()
                    .try_for_each(|violation| writeln!(f, "  {violation}"))
            }
        }
    }
}

impl std::error::Error for ArchitectureLintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::Io(err) = self {
            Some(err)
        } else {
            None
        }
    }
}

impl From<io::Error> for ArchitectureLintError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// A Rust source file handed to the lint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintSource {
    /// Path relative to `agent/src`.
    pub file: PathBuf,
    pub contents: String,
}

/// Lint the sources under `agent_dir/src`.
pub fn lint_agent_sources(agent_dir: &Path) -> Result<(), ArchitectureLintError> {
    let src = agent_dir.join("src");
    let mut sources = Vec::new();
    for layer in Layer::ALL {
        let root = src.join(layer.dir());
        if root.is_dir() {
            read_tree(&src, &root, &mut sources)?;
        }
    }
    lint_sources(&sources)
}

/// Lint in-memory sources; paths are relative to `agent/src`.
pub fn lint_sources(sources: &[LintSource]) -> Result<(), ArchitectureLintError> {
    let mut violations = Vec::new();
    for source in sources.iter().filter(|source| !is_test_file(&source.file)) {
        let parse_error = |message: String| ArchitectureLintError::Parse {
            file: source.file.clone(),
            message,
        };
        let layer = Layer::of(&source.file)
            .ok_or_else(|| parse_error("not under domain, inbound or outbound".to_owned()))?;
        let file = syn::parse_file(&source.contents).map_err(|err| parse_error(err.to_string()))?;
        violations.extend(
            check_file(layer, &file)
                .into_iter()
                .map(|message| Violation {
                    file: source.file.clone(),
                    message,
                }),
        );
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ArchitectureLintError::Violations(violations))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Domain,
    Inbound,
    Outbound,
}

impl Layer {
    const ALL: [Self; 3] = [Self::Domain, Self::Inbound, Self::Outbound];

    const fn dir(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    fn from_dir(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|layer| layer.dir() == name)
    }

    fn of(relative_path: &Path) -> Option<Self> {
        let first = relative_path.components().next()?;
        Self::from_dir(first.as_os_str().to_str()?)
    }

    fn may_use_layer(self, other: Self) -> bool {
        matches!(
            (self, other),
            (_, Self::Domain) | (Self::Inbound, Self::Inbound) | (Self::Outbound, Self::Outbound)
        )
    }

    fn may_use_crate(self, name: &str) -> bool {
        match self {
            Self::Domain => !(STORAGE_CRATES.contains(&name)
                || SERVER_CRATES.contains(&name)
                || matches!(name, "reqwest" | "prometheus" | "actix_web_prom")),
            Self::Inbound => !(STORAGE_CRATES.contains(&name) || name == "reqwest"),
            Self::Outbound => !SERVER_CRATES.contains(&name),
        }
    }
}

/// Where a path starts: one of our layers, another crate, or neither.
#[derive(Debug, PartialEq, Eq)]
enum PathRoot<'a> {
    Layer(Layer),
    Crate(&'a str),
    Local,
}

fn path_root(segments: &[String]) -> PathRoot<'_> {
    let Some(first) = segments.first() else {
        return PathRoot::Local;
    };
    if let Some(layer) = Layer::from_dir(first) {
        return PathRoot::Layer(layer);
    }
    let is_relative = |segment: &String| matches!(segment.as_str(), "crate" | "self" | "super");
    let rest = if first == CRATE_NAME {
        segments.get(1..).unwrap_or_default()
    } else if is_relative(first) {
        let skip = segments.iter().take_while(|segment| is_relative(segment)).count();
        segments.get(skip..).unwrap_or_default()
    } else {
        return PathRoot::Crate(first);
    };
    rest.first()
        .and_then(|segment| Layer::from_dir(segment))
        .map_or(PathRoot::Local, PathRoot::Layer)
}

fn check_file(layer: Layer, file: &syn::File) -> BTreeSet<String> {
    let mut imports = ImportCollector::default();
    imports.visit_file(file);

    let mut messages = BTreeSet::new();
    for segments in &imports.paths {
        match path_root(segments) {
            PathRoot::Layer(target) if !layer.may_use_layer(target) => {
                messages.insert(format!(
                    "{} module must not depend on crate::{}",
                    layer.dir(),
                    target.dir()
                ));
            }
            PathRoot::Crate(name) if !layer.may_use_crate(name) => {
                messages.insert(format!(
                    "{} module must not depend on external crate `{name}`",
                    layer.dir()
                ));
            }
            _ => {}
        }
    }
    messages
}

/// Collects every path written in `use` trees and expressions, outside test
/// modules.
#[derive(Default)]
struct ImportCollector {
    paths: BTreeSet<Vec<String>>,
}

impl ImportCollector {
    fn walk_use(&mut self, tree: &syn::UseTree, prefix: &mut Vec<String>) {
        let leaf = match tree {
            syn::UseTree::Path(path) => {
                prefix.push(path.ident.to_string());
                self.walk_use(&path.tree, prefix);
                prefix.pop();
                return;
            }
            syn::UseTree::Group(group) => {
                for item in &group.items {
                    self.walk_use(item, prefix);
                }
                return;
            }
            syn::UseTree::Name(name) => name.ident.to_string(),
            syn::UseTree::Rename(rename) => rename.ident.to_string(),
            syn::UseTree::Glob(_) => "*".to_owned(),
        };
        let mut segments = prefix.clone();
        segments.push(leaf);
        self.paths.insert(segments);
    }
}

impl<'ast> Visit<'ast> for ImportCollector {
    fn visit_path(&mut self, node: &'ast syn::Path) {
        let segments: Vec<String> = node
            .segments
            .iter()
            .map(|segment| segment.ident.to_string())
            .collect();
        if !segments.is_empty() {
            self.paths.insert(segments);
        }
        visit::visit_path(self, node);
    }

    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        self.walk_use(&node.tree, &mut Vec::new());
    }

    fn visit_item_mod(&mut self, node: &'ast syn::ItemMod) {
        if !is_cfg_test(&node.attrs) {
            visit::visit_item_mod(self, node);
        }
    }
}

fn is_cfg_test(attrs: &[syn::Attribute]) -> bool {
    attrs.iter().any(|attr| {
        attr.path().is_ident("cfg")
            && attr
                .parse_args::<syn::Ident>()
                .is_ok_and(|ident| ident == "test")
    })
}

fn is_test_file(relative_path: &Path) -> bool {
    relative_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| matches!(stem, "tests" | "test_utils") || stem.ends_with("_tests"))
}

fn read_tree(
    src: &Path,
    dir: &Path,
    sources: &mut Vec<LintSource>,
) -> Result<(), ArchitectureLintError> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            read_tree(src, &path, sources)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            let file = path
                .strip_prefix(src)
                .map_err(|err| ArchitectureLintError::Parse {
                    file: path.clone(),
                    message: err.to_string(),
                })?
                .to_path_buf();
            let contents = fs::read_to_string(&path)?;
            sources.push(LintSource { file, contents });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
