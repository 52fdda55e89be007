//! Lightweight module scanner
//!
//! Finds directives, exported names and the initialisers of exported
//! constants without a full JavaScript parser.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::literal::{parse_literal, UnsupportedLiteral};

static EXPORT_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)").unwrap()
});

static EXPORT_VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=;\n]+)?=").unwrap()
});

static EXPORT_SPECIFIERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bexport\s*(?:type\s*)?\{([^}]*)\}").unwrap());

static CLIENT_MODULE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\* __next_internal_client_entry_do_not_use__ ([^ ]*) (cjs|auto) \*/").unwrap()
});

static QUICK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"preferredRegion|getStaticProps|getServerSideProps|generateStaticParams|export const|generateImageMetadata|generateSitemaps",
    )
    .unwrap()
});

/// Module-level directive prologue entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Directive {
    /// `'use client'`
    Client,
    /// `'use server'`
    Server,
}

/// How a name is exported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function,
    /// `export const name = <init>`; the byte offset of `<init>`
    Variable { init: usize },
    /// `export { name }` or `export { local as name } from '..'`
    Specifier,
}

/// What the scanner found in one module
#[derive(Debug, Clone, Default)]
pub struct ScannedModule {
    pub directives: BTreeSet<Directive>,
    pub exports: BTreeMap<String, ExportKind>,
    source: String,
}

impl ScannedModule {
    pub fn has_export(&self, name: &str) -> bool {
        self.exports.contains_key(name)
    }

    pub fn is_client(&self) -> bool {
        self.directives.contains(&Directive::Client)
    }

    /// Evaluate the literal initialiser of an exported constant.
    ///
    /// `Ok(None)` when the name is not exported as a variable.
    pub fn const_value(&self, name: &str) -> Result<Option<Value>, UnsupportedLiteral> {
        let Some(ExportKind::Variable { init }) = self.exports.get(name) else {
            return Ok(None);
        };

        let rest = &self.source[*init..];
        let (value, consumed) = parse_literal(rest)?;

        let trailing = rest[consumed..].trim_start_matches([' ', '\t']);
        match trailing.chars().next() {
            None | Some(';') | Some('\n') | Some('\r') | Some(',') => Ok(Some(value)),
            Some(_) => Err(UnsupportedLiteral {
                message: format!("Unsupported node type for exported `{}`", name),
                path: None,
            }),
        }
    }
}

/// Whether the module could possibly contain anything worth extracting
pub fn might_have_static_info(source: &str) -> bool {
    QUICK_PATTERN.is_match(source) || mentions_runtime(source)
}

// `runtime`, but not the JSX runtime imports the compiler inserts
fn mentions_runtime(source: &str) -> bool {
    source.match_indices("runtime").any(|(index, _)| {
        let before = &source[..index];
        !before.ends_with("_jsx") && !before.ends_with("jsx-")
    })
}

/// The client-reference label emitted by the compiler: `(exported names, entry type)`
pub fn client_module_label(source: &str) -> Option<(Vec<String>, String)> {
    CLIENT_MODULE_LABEL.captures(source).map(|caps| {
        let refs = caps[1]
            .split(',')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        (refs, caps[2].to_string())
    })
}

/// Scan a module's source
pub fn scan_module(source: &str) -> ScannedModule {
    let code = blank_comments(source);

    let mut exports = BTreeMap::new();

    for caps in EXPORT_FUNCTION.captures_iter(&code) {
        exports.insert(caps[1].to_string(), ExportKind::Function);
    }

    for caps in EXPORT_VARIABLE.captures_iter(&code) {
        let init = caps.get(0).map_or(0, |m| m.end());
        exports.insert(caps[1].to_string(), ExportKind::Variable { init });
    }

    for caps in EXPORT_SPECIFIERS.captures_iter(&code) {
        for specifier in caps[1].split(',') {
            let exported = specifier
                .rsplit(" as ")
                .next()
                .unwrap_or(specifier)
                .trim()
                .trim_start_matches("type ")
                .trim();
            if !exported.is_empty() {
                exports.entry(exported.to_string()).or_insert(ExportKind::Specifier);
            }
        }
    }

    ScannedModule {
        directives: directives(&code),
        exports,
        source: code,
    }
}

fn directives(code: &str) -> BTreeSet<Directive> {
    let mut found = BTreeSet::new();
    let mut rest = code;

    loop {
        rest = rest.trim_start();
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            break;
        };
        let Some(end) = rest[1..].find(quote) else {
            break;
        };

        match &rest[1..end + 1] {
            "use client" => {
                found.insert(Directive::Client);
            }
            "use server" => {
                found.insert(Directive::Server);
            }
            _ => {}
        }

        rest = rest[end + 2..].trim_start_matches([' ', '\t']);
        rest = rest.strip_prefix(';').unwrap_or(rest);
    }

    found
}

/// Replace comments with spaces, keeping byte offsets and newlines intact
pub fn blank_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.char_indices().peekable();
    let mut in_string: Option<char> = None;

    while let Some((_, c)) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if c == '\\' {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            } else if c == quote || (c == '\n' && quote != '`') {
                in_string = None;
            }
            continue;
        }

        match (c, chars.peek().map(|(_, next)| *next)) {
            ('/', Some('/')) => {
                out.push_str("  ");
                chars.next();
                while let Some((_, inner)) = chars.peek().copied() {
                    if inner == '\n' {
                        break;
                    }
                    blank(&mut out, inner);
                    chars.next();
                }
            }
            ('/', Some('*')) => {
                out.push_str("  ");
                chars.next();
                let mut prev = ' ';
                for (_, inner) in chars.by_ref() {
                    blank(&mut out, inner);
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            ('"', _) | ('\'', _) | ('`', _) => {
                in_string = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        out.extend(std::iter::repeat(' ').take(c.len_utf8()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_directives_only_from_prologue() {
        let module = scan_module("// header\n'use client';\n\"use strict\"\nexport default 1;");
        assert!(module.is_client());

        let module = scan_module("import x from 'y';\n'use client';");
        assert!(!module.is_client());
    }

    #[test]
    fn test_exports_and_values() {
        let module = scan_module(
            r#"
            export const runtime = 'edge' // trailing note
            export const revalidate: number = 60;
            export async function getServerSideProps() {}
            export { helper as getStaticPaths } from './paths';
            export const dynamic = computeMode();
            "#,
        );

        assert_eq!(module.exports.get("getServerSideProps"), Some(&ExportKind::Function));
        assert_eq!(module.exports.get("getStaticPaths"), Some(&ExportKind::Specifier));
        assert_eq!(module.const_value("runtime").unwrap(), Some(json!("edge")));
        assert_eq!(module.const_value("revalidate").unwrap(), Some(json!(60)));
        assert_eq!(module.const_value("missing").unwrap(), None);
        assert!(module.const_value("dynamic").is_err());
    }

    #[test]
    fn test_expression_after_literal_is_unsupported() {
        let module = scan_module("export const revalidate = 60 * 60;");
        assert!(module.const_value("revalidate").is_err());
    }

    #[test]
    fn test_quick_pattern_ignores_jsx_runtime() {
        assert!(!might_have_static_info("import { jsx as _jsx } from 'react/jsx-runtime'"));
        assert!(might_have_static_info("export const runtime = 'edge'"));
        assert!(might_have_static_info("const cfg = { runtime: 'edge' }"));
    }

    #[test]
    fn test_client_module_label() {
        let source = "/* __next_internal_client_entry_do_not_use__ Button,default auto */ export {}";
        let (refs, kind) = client_module_label(source).unwrap();
        assert_eq!(refs, vec!["Button", "default"]);
        assert_eq!(kind, "auto");
    }

    #[test]
    fn test_blank_comments_keeps_offsets() {
        let source = "a /* é */ b // c\n'//not a comment'";
        let blanked = blank_comments(source);
        assert_eq!(blanked.len(), source.len());
        assert!(blanked.contains("'//not a comment'"));
        assert!(!blanked.contains('é'));
    }
}
