//! Module transformation
//!
//! Runs the source compiler over a module and, for modules bundled into the
//! edge sandbox, the edge safety analysis. The compiler itself is a
//! collaborator behind [`SourceCompiler`]; [`PassthroughCompiler`] is used
//! when no real one is plugged in.

mod edge;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entries::{Layer, Target};
use crate::error::BuildResult;
use crate::resolver::{extract_imports, ImportSpec};

pub use edge::{
    analyze_edge_module, ConstructKind, DynamicEval, EdgeAnalysis, UnsafeConstruct, EDGE_UNSUPPORTED_NODE_APIS,
};

/// ECMAScript syntax level to emit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EsTarget {
    Es5,
    Es2015,
    Es2017,
    #[default]
    Es2020,
    EsNext,
}

/// How JSX is compiled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsxRuntime {
    #[default]
    Automatic,
    Classic,
    Preserve,
}

/// Options handed to the source compiler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    pub target: EsTarget,
    pub decorators: bool,
    pub decorator_metadata: bool,
    pub jsx: JsxRuntime,
    pub development: bool,
}

/// Output of the source compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSource {
    pub code: String,
    pub map: Option<String>,
}

/// A source-to-source compiler: source text in, transformed text out
pub trait SourceCompiler: Send + Sync {
    fn name(&self) -> &str;

    fn compile(&self, source: &str, filename: &Path, options: &CompilerOptions) -> BuildResult<CompiledSource>;
}

/// Leaves scripts untouched and wraps JSON documents as modules
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompiler;

impl SourceCompiler for PassthroughCompiler {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn compile(&self, source: &str, filename: &Path, _options: &CompilerOptions) -> BuildResult<CompiledSource> {
        let is_json = filename.extension().and_then(|ext| ext.to_str()) == Some("json");
        let code = if is_json {
            serde_json::from_str::<serde_json::Value>(source)?;
            format!("module.exports = {};", source.trim())
        } else {
            source.to_string()
        };
        Ok(CompiledSource { code, map: None })
    }
}

/// One module to transform
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub source: &'a str,
    pub filename: &'a Path,
    /// Module identifier used in diagnostics
    pub module: &'a str,
    pub layer: Option<Layer>,
    pub target: Target,
    pub dev: bool,
}

impl TransformRequest<'_> {
    /// Middleware and edge API modules get the edge safety analysis
    pub fn needs_edge_analysis(&self) -> bool {
        self.target == Target::EdgeServer && self.layer.map_or(false, |layer| layer.is_edge_sandboxed())
    }
}

/// A transformed module
#[derive(Debug)]
pub struct TransformOutput {
    pub code: String,
    pub map: Option<String>,
    pub imports: Vec<ImportSpec>,
    pub edge: Option<EdgeAnalysis>,
}

/// Code transformer
#[derive(Clone)]
pub struct Transformer {
    compiler: Arc<dyn SourceCompiler>,
    options: CompilerOptions,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new(Arc::new(PassthroughCompiler))
    }
}

impl Transformer {
    pub fn new(compiler: Arc<dyn SourceCompiler>) -> Self {
        Self {
            compiler,
            options: CompilerOptions::default(),
        }
    }

    /// Transform one module
    pub fn transform(&self, request: TransformRequest<'_>) -> BuildResult<TransformOutput> {
        let imports = extract_imports(request.source);

        let edge = request.needs_edge_analysis().then(|| analyze_edge_module(request.source));
        let source = match &edge {
            Some(analysis) if !analysis.constructs.is_empty() => {
                debug!("Instrumenting edge module {}", request.module);
                analysis.wrap_dynamic_code(request.source, request.dev)
            }
            _ => request.source.to_string(),
        };

        let options = CompilerOptions {
            development: request.dev,
            ..self.options.clone()
        };
        let compiled = self.compiler.compile(&source, request.filename, &options)?;

        Ok(TransformOutput {
            code: compiled.code,
            map: compiled.map,
            imports,
            edge,
        })
    }
}
