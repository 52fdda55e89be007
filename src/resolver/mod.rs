//! Module resolution
//!
//! Extracts import statements with their source positions and resolves
//! specifiers to files. Bare specifiers are looked up in `node_modules`;
//! anything that cannot be found there is left to the runtime as an
//! external.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::analysis::scan::blank_comments;
use crate::error::{BuildError, BuildResult};
use crate::utils::{clean_path, normalize_path_sep};

static IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s+(?:type\s+)?([\w$*{},\s]+?)\s*from\s*["']([^"']+)["']"#).unwrap()
});

static IMPORT_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bimport\s*["']([^"']+)["']"#).unwrap());

static EXPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bexport\s+(\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*["']([^"']+)["']"#).unwrap()
});

static DYNAMIC_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bimport\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());

static REQUIRE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\brequire\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());

/// Node.js builtin modules
const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants", "crypto", "dgram",
    "diagnostics_channel", "dns", "domain", "events", "fs", "fs/promises", "http", "http2", "https", "inspector",
    "module", "net", "os", "path", "perf_hooks", "process", "punycode", "querystring", "readline", "repl", "stream",
    "stream/web", "string_decoder", "sys", "timers", "tls", "trace_events", "tty", "url", "util", "v8", "vm",
    "wasi", "worker_threads", "zlib",
];

/// Extensions tried after the configured page extensions
const FALLBACK_EXTENSIONS: [&str; 4] = ["mjs", "cjs", "json", "jsx"];

/// Whether `name` (with or without the `node:` scheme) is a Node.js builtin
pub fn is_node_builtin(name: &str) -> bool {
    let name = name.strip_prefix("node:").unwrap_or(name);
    NODE_BUILTINS.contains(&name)
}

/// Position of an import in its module; lines are 1-based, columns 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    /// Position of a byte offset in `source`
    pub fn at(source: &str, offset: usize) -> Self {
        let before = &source[..offset.min(source.len())];
        let line = before.matches('\n').count() + 1;
        let column = before.rfind('\n').map_or(before.len(), |newline| before.len() - newline - 1);
        Self { line, column }
    }
}

/// How a module is imported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Static,
    ReExport,
    Dynamic,
    Require,
}

/// Which exports an import uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportedNames {
    /// Namespace imports, `export *`, `require` and `import()`
    All,
    /// `import './side-effect'`
    None,
    Named(BTreeSet<String>),
}

/// One import statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub specifier: String,
    pub kind: ImportKind,
    pub names: ImportedNames,
    pub position: SourcePosition,
}

/// Collect the imports of a module in source order
pub fn extract_imports(source: &str) -> Vec<ImportSpec> {
    let code = blank_comments(source);
    let mut imports: Vec<(usize, ImportSpec)> = Vec::new();
    let mut push = |offset: usize, specifier: &str, kind: ImportKind, names: ImportedNames| {
        imports.push((
            offset,
            ImportSpec {
                specifier: specifier.to_string(),
                kind,
                names,
                position: SourcePosition::at(&code, offset),
            },
        ));
    };

    for caps in IMPORT_FROM.captures_iter(&code) {
        push(caps.get(0).map_or(0, |m| m.start()), &caps[2], ImportKind::Static, import_clause_names(&caps[1]));
    }
    for caps in IMPORT_BARE.captures_iter(&code) {
        push(caps.get(0).map_or(0, |m| m.start()), &caps[1], ImportKind::Static, ImportedNames::None);
    }
    for caps in EXPORT_FROM.captures_iter(&code) {
        let clause = caps[1].trim();
        let names = if clause.starts_with('*') {
            ImportedNames::All
        } else {
            ImportedNames::Named(specifier_list_locals(clause.trim_matches(|c| c == '{' || c == '}')))
        };
        push(caps.get(0).map_or(0, |m| m.start()), &caps[2], ImportKind::ReExport, names);
    }
    for caps in DYNAMIC_IMPORT.captures_iter(&code) {
        push(caps.get(0).map_or(0, |m| m.start()), &caps[1], ImportKind::Dynamic, ImportedNames::All);
    }
    for caps in REQUIRE.captures_iter(&code) {
        push(caps.get(0).map_or(0, |m| m.start()), &caps[1], ImportKind::Require, ImportedNames::All);
    }

    imports.sort_by_key(|(offset, _)| *offset);
    imports.into_iter().map(|(_, spec)| spec).collect()
}

/// Names used by an import clause such as `React, { useState as s }`
fn import_clause_names(clause: &str) -> ImportedNames {
    let clause = clause.trim();
    if clause.contains('*') {
        return ImportedNames::All;
    }

    let mut names = BTreeSet::new();
    let (default, named) = match clause.find('{') {
        Some(open) => (&clause[..open], Some(&clause[open..])),
        None => (clause, None),
    };
    if !default.trim().trim_end_matches(',').trim().is_empty() {
        names.insert("default".to_string());
    }
    if let Some(named) = named {
        names.extend(specifier_list_locals(named.trim_matches(|c| c == '{' || c == '}')));
    }
    ImportedNames::Named(names)
}

/// Imported (remote) names of a `{ a, b as c }` list
fn specifier_list_locals(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(|item| item.trim().trim_start_matches("type ").trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.split_whitespace().next().unwrap_or(item).to_string())
        .collect()
}

/// Outcome of resolving a specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    File(PathBuf),
    /// Left to the runtime: Node.js builtins and packages not installed
    External,
}

/// Module resolver
#[derive(Debug, Clone)]
pub struct Resolver {
    extensions: Vec<String>,
}

impl Resolver {
    pub fn new(page_extensions: &[String]) -> Self {
        let mut extensions: Vec<String> = page_extensions.to_vec();
        for ext in FALLBACK_EXTENSIONS {
            if !extensions.iter().any(|e| e == ext) {
                extensions.push(ext.to_string());
            }
        }
        Self { extensions }
    }

    /// Resolve a specifier imported from `importer`
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Option<Resolution> {
        debug!("Resolving '{}' from '{}'", specifier, importer.display());

        if is_node_builtin(specifier) {
            return Some(Resolution::External);
        }

        let base_dir = importer.parent().unwrap_or(Path::new("."));
        if specifier.starts_with('.') || specifier.starts_with('/') {
            let joined = if specifier.starts_with('/') {
                PathBuf::from(specifier)
            } else {
                base_dir.join(specifier)
            };
            let target = PathBuf::from(clean_path(&normalize_path_sep(&joined.to_string_lossy())));
            return self.resolve_file(&target).map(Resolution::File);
        }

        Some(
            self.resolve_bare(specifier, base_dir)
                .map_or(Resolution::External, Resolution::File),
        )
    }

    /// Resolve or fail with the import trace leading to the importer
    pub fn resolve_or_trace(
        &self,
        import: &ImportSpec,
        importer: &Path,
        importer_name: &str,
        issuers: &[String],
    ) -> BuildResult<Resolution> {
        self.resolve(&import.specifier, importer).ok_or_else(|| {
            let mut import_trace = vec![format!(
                "{}:{}:{}",
                importer_name, import.position.line, import.position.column
            )];
            import_trace.extend(issuers.iter().cloned());
            BuildError::ModuleNotFound {
                request: import.specifier.clone(),
                importer: importer.parent().unwrap_or(Path::new(".")).display().to_string(),
                import_trace,
            }
        })
    }

    fn resolve_file(&self, target: &Path) -> Option<PathBuf> {
        if target.is_file() {
            return Some(target.to_path_buf());
        }

        for ext in &self.extensions {
            let mut with_ext = target.as_os_str().to_owned();
            with_ext.push(format!(".{}", ext));
            let with_ext = PathBuf::from(with_ext);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }

        if target.is_dir() {
            return self
                .extensions
                .iter()
                .map(|ext| target.join(format!("index.{}", ext)))
                .find(|index| index.is_file());
        }

        None
    }

    /// Look a package up in `node_modules` directories above `from`
    fn resolve_bare(&self, specifier: &str, from: &Path) -> Option<PathBuf> {
        from.ancestors()
            .map(|dir| dir.join("node_modules"))
            .filter(|node_modules| node_modules.is_dir())
            .find_map(|node_modules| self.resolve_in_node_modules(&node_modules, specifier))
    }

    fn resolve_in_node_modules(&self, node_modules: &Path, specifier: &str) -> Option<PathBuf> {
        let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
        let package_name = if specifier.starts_with('@') {
            format!("{}/{}", parts.next()?, parts.next()?)
        } else {
            parts.next()?.to_string()
        };
        let subpath = parts.next();

        let package_dir = node_modules.join(&package_name);
        if !package_dir.is_dir() {
            return None;
        }
        if let Some(sub) = subpath {
            return self.resolve_file(&package_dir.join(sub));
        }

        let manifest = fs::read_to_string(package_dir.join("package.json"))
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok());
        if let Some(pkg) = manifest {
            for field in ["module", "main"] {
                if let Some(entry) = pkg.get(field).and_then(|v| v.as_str()) {
                    if let Some(resolved) = self.resolve_file(&package_dir.join(entry)) {
                        return Some(resolved);
                    }
                }
            }
        }

        self.resolve_file(&package_dir.join("index"))
    }
}
