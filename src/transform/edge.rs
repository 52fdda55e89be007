//! Edge runtime safety analysis
//!
//! Finds dynamic code evaluation, Node.js-only APIs and builtin module
//! imports in modules bundled for the edge sandbox. Dynamic code is tracked
//! per module as either unconditional or as the set of exports that reach
//! it, so the production check can ignore exports nobody uses.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::scan::blank_comments;
use crate::resolver::{extract_imports, is_node_builtin, SourcePosition};

/// Node.js globals the edge runtime does not provide
pub const EDGE_UNSUPPORTED_NODE_APIS: [&str; 16] = [
    "clearImmediate",
    "setImmediate",
    "BroadcastChannel",
    "ByteLengthQueuingStrategy",
    "CompressionStream",
    "CountQueuingStrategy",
    "DecompressionStream",
    "DomException",
    "MessageChannel",
    "MessageEvent",
    "MessagePort",
    "ReadableByteStreamController",
    "ReadableStreamBYOBRequest",
    "ReadableStreamDefaultController",
    "TransformStreamDefaultController",
    "WritableStreamDefaultController",
];

static DYNAMIC_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(^|[^.\w$])((?:new\s+)?(?:global\.|globalThis\.)?(?:eval|Function|WebAssembly\.compile|WebAssembly\.instantiate))\s*\(",
    )
    .unwrap()
});

static NODE_API: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(^|[^.\w$])({})\b", EDGE_UNSUPPORTED_NODE_APIS.join("|"))).unwrap()
});

static PROCESS_MEMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[^.\w$])process\.([A-Za-z_$][\w$]*)").unwrap());

static TOP_LEVEL_EXPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^export\s+(?:(default)\b|(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)|(?:const|let|var|class)\s+([A-Za-z_$][\w$]*))",
    )
    .unwrap()
});

/// What a flagged construct is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructKind {
    Eval,
    FunctionConstructor,
    WasmCompile,
    WasmInstantiate,
    NodeApi,
    ProcessApi,
    NodeModule,
}

impl ConstructKind {
    /// Whether the construct generates code at runtime
    pub fn is_dynamic_code(&self) -> bool {
        matches!(
            self,
            ConstructKind::Eval | ConstructKind::FunctionConstructor | ConstructKind::WasmCompile
        )
    }

    /// Whether the construct needs Node.js rather than the edge runtime
    pub fn is_node_only(&self) -> bool {
        matches!(
            self,
            ConstructKind::NodeApi | ConstructKind::ProcessApi | ConstructKind::NodeModule
        )
    }

    fn wrapper(&self) -> Option<&'static str> {
        match self {
            ConstructKind::Eval | ConstructKind::FunctionConstructor => Some("__strata_eval__"),
            ConstructKind::WasmCompile => Some("__strata_webassembly_compile__"),
            ConstructKind::WasmInstantiate => Some("__strata_webassembly_instantiate__"),
            _ => None,
        }
    }
}

/// A flagged construct and where it is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeConstruct {
    pub kind: ConstructKind,
    /// `eval`, `setImmediate`, `process.cwd`, `fs`, ...
    pub name: String,
    pub position: SourcePosition,
    /// Byte range of the whole expression, for call expressions
    pub span: Option<(usize, usize)>,
}

impl UnsafeConstruct {
    /// Diagnostic for a Node.js API or module, `None` for other constructs
    pub fn node_message(&self) -> Option<String> {
        match self.kind {
            ConstructKind::NodeApi | ConstructKind::ProcessApi => Some(format!(
                "A Node.js API is used ({} at line: {}) which is not supported in the Edge Runtime.",
                self.name, self.position.line
            )),
            ConstructKind::NodeModule => Some(format!(
                "A Node.js module is loaded ('{}' at line {}) which is not supported in the Edge Runtime.",
                self.name, self.position.line
            )),
            _ => None,
        }
    }
}

/// Dynamic code usage of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicEval {
    /// Reached from module scope or from code no export owns
    Always,
    /// Only reached through these exports
    Exports(BTreeSet<String>),
}

impl DynamicEval {
    pub fn merge(self, other: DynamicEval) -> DynamicEval {
        match (self, other) {
            (DynamicEval::Exports(mut a), DynamicEval::Exports(b)) => {
                a.extend(b);
                DynamicEval::Exports(a)
            }
            _ => DynamicEval::Always,
        }
    }

    /// Whether the final graph keeps code that evaluates dynamically.
    /// `used_exports` of `None` means usage is unknown and treated as all.
    pub fn is_used(&self, used_exports: Option<&BTreeSet<String>>) -> bool {
        match (self, used_exports) {
            (DynamicEval::Always, _) | (_, None) => true,
            (DynamicEval::Exports(names), Some(used)) => names.iter().any(|name| used.contains(name)),
        }
    }

    /// Export names for diagnostics, empty when unconditional
    pub fn export_names(&self) -> Vec<&str> {
        match self {
            DynamicEval::Always => Vec::new(),
            DynamicEval::Exports(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Result of analysing one edge module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeAnalysis {
    pub dynamic_eval: Option<DynamicEval>,
    pub constructs: Vec<UnsafeConstruct>,
    /// Where each imported specifier is imported, whether or not it resolves
    pub import_locations: BTreeMap<String, SourcePosition>,
}

impl EdgeAnalysis {
    /// Node.js globals and builtin modules the module uses
    pub fn unsupported_apis(&self) -> Vec<UnsafeConstruct> {
        self.constructs.iter().filter(|c| c.kind.is_node_only()).cloned().collect()
    }

    /// Wrap dynamic code so the sandbox can report it when it runs.
    /// `WebAssembly.instantiate` is only wrapped in development.
    pub fn wrap_dynamic_code(&self, source: &str, dev: bool) -> String {
        let mut spans: Vec<(usize, usize, &'static str)> = self
            .constructs
            .iter()
            .filter(|c| dev || c.kind != ConstructKind::WasmInstantiate)
            .filter_map(|c| Some((c.span?.0, c.span?.1, c.kind.wrapper()?)))
            .collect();
        spans.sort_by_key(|(start, _, _)| *start);

        let mut out = String::with_capacity(source.len() + spans.len() * 48);
        let mut cursor = 0;
        for (start, end, wrapper) in spans {
            // Nested calls are covered by the outer wrapper
            if start < cursor {
                continue;
            }
            out.push_str(&source[cursor..start]);
            out.push_str(wrapper);
            out.push_str("(function() { return ");
            out.push_str(&source[start..end]);
            out.push_str(" })");
            cursor = end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

/// Analyse a module bundled into the edge sandbox
pub fn analyze_edge_module(source: &str) -> EdgeAnalysis {
    let code = mask_strings(&blank_comments(source));
    let owners = export_regions(&code);
    let mut analysis = EdgeAnalysis::default();

    for caps in DYNAMIC_CODE.captures_iter(&code) {
        let Some(callee) = caps.get(2) else { continue };
        let name = callee.as_str();
        let kind = if name.ends_with("WebAssembly.compile") {
            ConstructKind::WasmCompile
        } else if name.ends_with("WebAssembly.instantiate") {
            ConstructKind::WasmInstantiate
        } else if name.ends_with("Function") {
            ConstructKind::FunctionConstructor
        } else {
            ConstructKind::Eval
        };

        let open = caps.get(0).map_or(callee.end(), |m| m.end() - 1);
        let span = matching_paren(&code, open).map(|close| (callee.start(), close + 1));

        if kind.is_dynamic_code() {
            let usage = match owner_at(&owners, callee.start()) {
                Some(export) => DynamicEval::Exports(BTreeSet::from([export.to_string()])),
                None => DynamicEval::Always,
            };
            analysis.dynamic_eval = Some(match analysis.dynamic_eval.take() {
                Some(existing) => existing.merge(usage),
                None => usage,
            });
        }

        analysis.constructs.push(UnsafeConstruct {
            kind,
            name: name.split_whitespace().last().unwrap_or(name).to_string(),
            position: SourcePosition::at(&code, callee.start()),
            span,
        });
    }

    for caps in NODE_API.captures_iter(&code) {
        if let Some(api) = caps.get(2) {
            analysis.constructs.push(UnsafeConstruct {
                kind: ConstructKind::NodeApi,
                name: api.as_str().to_string(),
                position: SourcePosition::at(&code, api.start()),
                span: None,
            });
        }
    }

    for caps in PROCESS_MEMBER.captures_iter(&code) {
        let Some(member) = caps.get(2) else { continue };
        if member.as_str() == "env" {
            continue;
        }
        analysis.constructs.push(UnsafeConstruct {
            kind: ConstructKind::ProcessApi,
            name: format!("process.{}", member.as_str()),
            position: SourcePosition::at(&code, member.start()),
            span: None,
        });
    }

    for import in extract_imports(source) {
        if is_node_builtin(&import.specifier) {
            analysis.constructs.push(UnsafeConstruct {
                kind: ConstructKind::NodeModule,
                name: import.specifier.clone(),
                position: import.position,
                span: None,
            });
        }
        analysis.import_locations.entry(import.specifier).or_insert(import.position);
    }

    analysis.constructs.sort_by_key(|c| (c.position.line, c.position.column));
    analysis
}

/// Replace string and template contents with spaces, keeping offsets
fn mask_strings(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in code.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                    push_blank(&mut out, c);
                } else if c == '\\' {
                    escaped = true;
                    out.push(' ');
                } else if c == q || (c == '\n' && q != '`') {
                    quote = None;
                    out.push(c);
                } else {
                    push_blank(&mut out, c);
                }
            }
            None => {
                if matches!(c, '"' | '\'' | '`') {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

fn push_blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        out.extend(std::iter::repeat(' ').take(c.len_utf8()));
    }
}

/// Index of the `)` closing the `(` at `open`
fn matching_paren(code: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, byte) in code.as_bytes()[open..].iter().enumerate() {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Top-level statement regions and the export owning each one
fn export_regions(code: &str) -> Vec<(usize, Option<String>)> {
    let mut regions = Vec::new();
    let mut offset = 0;

    for line in code.split_inclusive('\n') {
        let starts_statement = line
            .chars()
            .next()
            .map_or(false, |c| !c.is_whitespace() && !matches!(c, '}' | ')' | ']'));
        if starts_statement {
            let owner = TOP_LEVEL_EXPORT.captures(line).and_then(|caps| {
                caps.get(1)
                    .map(|_| "default".to_string())
                    .or_else(|| caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str().to_string()))
            });
            regions.push((offset, owner));
        }
        offset += line.len();
    }
    regions
}

fn owner_at(regions: &[(usize, Option<String>)], offset: usize) -> Option<&str> {
    regions
        .iter()
        .take_while(|(start, _)| *start <= offset)
        .last()
        .and_then(|(_, owner)| owner.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_eval_at_module_scope_is_unconditional() {
        let analysis = analyze_edge_module("const x = eval('1 + 1');\nexport default function handler() {}\n");
        assert_eq!(analysis.dynamic_eval, Some(DynamicEval::Always));
        assert_eq!(analysis.constructs[0].kind, ConstructKind::Eval);
        assert_eq!(analysis.constructs[0].position.line, 1);
    }

    #[test]
    fn test_eval_inside_export_is_tracked_by_export() {
        let source = "export function compile(src) {\n  return new Function(src);\n}\n\nexport function safe() {\n  return 1;\n}\n";
        let analysis = analyze_edge_module(source);
        let usage = analysis.dynamic_eval.unwrap();
        assert_eq!(usage, DynamicEval::Exports(BTreeSet::from(["compile".to_string()])));

        assert!(!usage.is_used(Some(&BTreeSet::from(["safe".to_string()]))));
        assert!(usage.is_used(Some(&BTreeSet::from(["compile".to_string()]))));
        assert!(usage.is_used(None));
    }

    #[test]
    fn test_strings_comments_and_members_are_ignored() {
        let source = "// eval('x')\nconst s = \"eval('x')\";\nobj.eval('x');\nconst v = process.env.FOO;\n";
        let analysis = analyze_edge_module(source);
        assert_eq!(analysis.dynamic_eval, None);
        assert!(analysis.constructs.is_empty());
    }

    #[test]
    fn test_wasm_instantiate_is_not_dynamic_code() {
        let analysis = analyze_edge_module("WebAssembly.instantiate(buffer);\n");
        assert_eq!(analysis.dynamic_eval, None);
        assert_eq!(analysis.constructs[0].kind, ConstructKind::WasmInstantiate);
    }

    #[test]
    fn test_node_apis_and_modules() {
        let source = "import fs from 'fs';\nsetImmediate(() => {});\nprocess.cwd();\nconst u = new URL(x);\n";
        let analysis = analyze_edge_module(source);
        let kinds: Vec<ConstructKind> = analysis.constructs.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ConstructKind::NodeModule, ConstructKind::NodeApi, ConstructKind::ProcessApi]
        );
        assert_eq!(analysis.import_locations.get("fs"), Some(&SourcePosition { line: 1, column: 0 }));

        let unsupported = analysis.unsupported_apis();
        assert_eq!(unsupported.len(), 3);
        assert_eq!(
            unsupported[0].node_message().unwrap(),
            "A Node.js module is loaded ('fs' at line 1) which is not supported in the Edge Runtime."
        );
        assert!(unsupported[1]
            .node_message()
            .unwrap()
            .contains("A Node.js API is used (setImmediate at line: 2)"));
        assert!(unsupported[2].node_message().unwrap().contains("process.cwd"));
    }

    #[test]
    fn test_dynamic_code_is_not_node_only() {
        let analysis = analyze_edge_module("eval('1');\nWebAssembly.compile(b);\n");
        assert_eq!(analysis.constructs.len(), 2);
        assert!(analysis.unsupported_apis().is_empty());
        assert_eq!(analysis.constructs[0].node_message(), None);
    }

    #[test]
    fn test_wrap_dynamic_code() {
        let source = "const f = new Function('return 1');\nWebAssembly.instantiate(b);\n";
        let analysis = analyze_edge_module(source);

        let prod = analysis.wrap_dynamic_code(source, false);
        assert_eq!(
            prod,
            "const f = __strata_eval__(function() { return new Function('return 1') });\nWebAssembly.instantiate(b);\n"
        );
        let dev = analysis.wrap_dynamic_code(source, true);
        assert!(dev.contains("__strata_webassembly_instantiate__(function() { return WebAssembly.instantiate(b) })"));
    }
}
