//! The result of compiling one target

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{BuildInfoTable, ChunkGraph, ChunkGroupId, ModuleGraph, ModuleId};
use crate::entries::{EntryDescriptor, Target};
use crate::error::BuildError;
use crate::utils::normalize_path_sep;

/// Tracing target for telemetry events
pub const TELEMETRY_TARGET: &str = "strata::telemetry";

/// An anonymous usage record produced during a build
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub event_name: String,
    pub payload: serde_json::Value,
}

impl TelemetryRecord {
    pub fn new(event_name: impl Into<String>, payload: serde_json::Value) -> Self {
        let record = Self {
            event_name: event_name.into(),
            payload,
        };
        info!(target: TELEMETRY_TARGET, event = %record.event_name, payload = %record.payload);
        record
    }
}

/// An entry after compilation
#[derive(Debug, Clone)]
pub struct CompiledEntry {
    pub descriptor: EntryDescriptor,
    pub group: ChunkGroupId,
    /// Modules the entry starts from, one per import
    pub modules: Vec<ModuleId>,
}

/// Everything one compiler produced
#[derive(Debug)]
pub struct Compilation {
    pub target: Target,
    pub dev: bool,
    pub root_dir: PathBuf,
    /// Content hash of the emitted assets
    pub hash: String,
    pub graph: ModuleGraph,
    pub chunks: ChunkGraph,
    pub entries: BTreeMap<String, CompiledEntry>,
    pub build_info: BuildInfoTable,
    /// Emitted assets by file name, relative to the compiler's output directory
    pub assets: BTreeMap<String, String>,
    pub errors: Vec<BuildError>,
    pub warnings: Vec<BuildError>,
    pub telemetry: Vec<TelemetryRecord>,
}

impl Compilation {
    pub fn new(target: Target, dev: bool, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            target,
            dev,
            root_dir: root_dir.into(),
            hash: String::new(),
            graph: ModuleGraph::new(),
            chunks: ChunkGraph::new(),
            entries: BTreeMap::new(),
            build_info: BuildInfoTable::new(),
            assets: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            telemetry: Vec::new(),
        }
    }

    pub fn emit_asset(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.assets.insert(name.into(), source.into());
    }

    pub fn record_telemetry(&mut self, event_name: &str, payload: serde_json::Value) {
        self.telemetry.push(TelemetryRecord::new(event_name, payload));
    }

    pub fn entry(&self, name: &str) -> Option<&CompiledEntry> {
        self.entries.get(name)
    }

    /// Files of an entry's own chunks
    pub fn entry_files(&self, name: &str) -> Vec<String> {
        self.entry(name)
            .map(|entry| self.chunks.group_files(entry.group))
            .unwrap_or_default()
    }

    /// A module's file as `./relative/path` from the project root
    pub fn relative_resource(&self, resource: &Path) -> String {
        let relative = pathdiff::diff_paths(resource, &self.root_dir).unwrap_or_else(|| resource.to_path_buf());
        let relative = normalize_path_sep(&relative.to_string_lossy());
        if relative.starts_with('.') {
            relative
        } else {
            format!("./{}", relative)
        }
    }

    /// Recompute [`hash`](Self::hash) from the emitted assets
    pub fn update_hash(&mut self) -> &str {
        let mut hasher = Sha256::new();
        for (name, source) in &self.assets {
            hasher.update(name.as_bytes());
            hasher.update([0]);
            hasher.update(source.as_bytes());
        }
        self.hash = hex::encode(hasher.finalize())[..20].to_string();
        &self.hash
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_relative_resource() {
        let compilation = Compilation::new(Target::Server, false, "/project");
        assert_eq!(
            compilation.relative_resource(Path::new("/project/app/button.tsx")),
            "./app/button.tsx"
        );
        assert_eq!(
            compilation.relative_resource(Path::new("/elsewhere/lib.js")),
            "../elsewhere/lib.js"
        );
    }

    #[test]
    fn test_hash_follows_assets() {
        let mut compilation = Compilation::new(Target::Client, true, "/project");
        let empty = compilation.update_hash().to_string();
        assert_eq!(empty.len(), 20);

        compilation.emit_asset("static/chunks/main.js", "1");
        let first = compilation.update_hash().to_string();
        assert_ne!(first, empty);

        compilation.emit_asset("static/chunks/main.js", "2");
        assert_ne!(compilation.update_hash(), first);
    }
}
