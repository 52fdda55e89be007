//! Middleware `config` parsing and matcher compilation
//!
//! Matcher sources use the `:param` path syntax and are compiled into
//! anchored regular expressions that also accept the `/_next/data/<build>`
//! prefix and a `.json` suffix used by client-side data requests. Sources
//! may contain lookarounds, so they are validated with `fancy_regex`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A compiled middleware matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareMatcher {
    pub regexp: String,
    pub original_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Value>,
}

impl MiddlewareMatcher {
    /// Matcher used when a middleware declares none
    pub fn catch_all() -> Self {
        Self {
            regexp: ".*".to_string(),
            original_source: "/:path*".to_string(),
            locale: None,
            has: None,
            missing: None,
        }
    }
}

/// Parsed middleware / edge function `config` export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchers: Option<Vec<MiddlewareMatcher>>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "unstable_allowDynamic")]
    pub unstable_allow_dynamic: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
}

impl MiddlewareConfig {
    pub fn is_empty(&self) -> bool {
        self.matchers.is_none() && self.unstable_allow_dynamic.is_none() && self.regions.is_none()
    }
}

/// Parse the literal value of `export const config`.
///
/// `Err` carries a human readable reason and the offending property.
pub fn parse_middleware_config(raw: &Value) -> Result<MiddlewareConfig, (String, String)> {
    let Value::Object(raw) = raw else {
        return Ok(MiddlewareConfig::default());
    };

    let mut config = MiddlewareConfig::default();

    if let Some(matcher) = raw.get("matcher") {
        let items = match matcher {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        let matchers = items
            .iter()
            .map(compile_matcher)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| (reason, "matcher".to_string()))?;
        config.matchers = Some(matchers);
    }

    if let Some(allow) = raw.get("unstable_allowDynamic") {
        config.unstable_allow_dynamic =
            Some(string_or_list(allow).map_err(|reason| (reason, "unstable_allowDynamic".to_string()))?);
    }

    if let Some(regions) = raw.get("regions") {
        config.regions = Some(string_or_list(regions).map_err(|reason| (reason, "regions".to_string()))?);
    }

    Ok(config)
}

fn string_or_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("expected string, received {}", item))
            })
            .collect(),
        other => Err(format!("expected string or string[], received {}", other)),
    }
}

fn compile_matcher(matcher: &Value) -> Result<MiddlewareMatcher, String> {
    let (source, locale, has, missing) = match matcher {
        Value::String(source) => (source.clone(), None, None, None),
        Value::Object(object) => {
            let source = object
                .get("source")
                .and_then(Value::as_str)
                .ok_or_else(|| "matcher object requires a string `source`".to_string())?;
            (
                source.to_string(),
                object.get("locale").and_then(Value::as_bool),
                object.get("has").cloned(),
                object.get("missing").cloned(),
            )
        }
        other => return Err(format!("unsupported matcher {}", other)),
    };

    if !source.starts_with('/') {
        return Err(format!("source '{}' must start with /", source));
    }

    let is_root = source == "/";
    let wrapped = format!(
        "/:nextData(_next/data/[^/]{{1,}})?{}{}",
        source,
        if is_root { r"(/?index|/?index\.json)?" } else { r"{(\.json)}?" }
    );

    let regexp = path_to_regex(&wrapped)?;
    fancy_regex::Regex::new(&regexp).map_err(|e| format!("invalid matcher '{}': {}", source, e))?;

    Ok(MiddlewareMatcher {
        regexp,
        original_source: source,
        locale,
        has,
        missing,
    })
}

#[derive(Debug)]
enum Token {
    Literal(String),
    Param {
        prefix: String,
        pattern: String,
        suffix: String,
        modifier: Option<char>,
    },
}

const DEFAULT_PATTERN: &str = r"[^\/#\?]+?";

/// Compile a `:param` path pattern into an anchored regular expression
pub fn path_to_regex(path: &str) -> Result<String, String> {
    let tokens = tokenize(path)?;
    let mut route = String::from("^");

    for token in &tokens {
        match token {
            Token::Literal(text) => route.push_str(&escape(text)),
            Token::Param {
                prefix,
                pattern,
                suffix,
                modifier,
            } => {
                let prefix = escape(prefix);
                let suffix = escape(suffix);
                let repeat = matches!(modifier, Some('+') | Some('*'));
                let optional = matches!(modifier, Some('?') | Some('*'));

                if prefix.is_empty() && suffix.is_empty() {
                    if repeat {
                        route.push_str(&format!("((?:{}){})", pattern, modifier.unwrap_or('+')));
                    } else {
                        route.push_str(&format!("({}){}", pattern, if optional { "?" } else { "" }));
                    }
                } else if repeat {
                    route.push_str(&format!(
                        "(?:{p}((?:{pat})(?:{s}{p}(?:{pat}))*){s}){o}",
                        p = prefix,
                        pat = pattern,
                        s = suffix,
                        o = if optional { "?" } else { "" }
                    ));
                } else {
                    route.push_str(&format!(
                        "(?:{}({}){}){}",
                        prefix,
                        pattern,
                        suffix,
                        if optional { "?" } else { "" }
                    ));
                }
            }
        }
    }

    route.push_str(r"[\/#\?]?$");
    Ok(route)
}

fn tokenize(path: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = path.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                literal.push(chars[i + 1]);
                i += 2;
            }
            ':' | '(' => {
                let (pattern, next) = read_param(&chars, i)?;
                i = next;
                let prefix = take_prefix(&mut literal);
                flush(&mut tokens, &mut literal);
                let modifier = read_modifier(&chars, &mut i);
                tokens.push(Token::Param {
                    prefix,
                    pattern,
                    suffix: String::new(),
                    modifier,
                });
            }
            '{' => {
                flush(&mut tokens, &mut literal);
                let close = find_close(&chars, i, '{', '}')?;
                let inner: String = chars[i + 1..close].iter().collect();
                i = close + 1;
                let modifier = read_modifier(&chars, &mut i);
                tokens.push(brace_group(&inner, modifier)?);
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    flush(&mut tokens, &mut literal);
    Ok(tokens)
}

fn brace_group(inner: &str, modifier: Option<char>) -> Result<Token, String> {
    let chars: Vec<char> = inner.chars().collect();
    let start = chars.iter().position(|c| *c == ':' || *c == '(');

    match start {
        Some(start) => {
            let prefix: String = chars[..start].iter().collect();
            let (pattern, next) = read_param(&chars, start)?;
            let suffix: String = chars[next..].iter().collect();
            Ok(Token::Param {
                prefix,
                pattern,
                suffix,
                modifier,
            })
        }
        None if modifier.is_none() => Ok(Token::Literal(inner.to_string())),
        None => Ok(Token::Param {
            prefix: String::new(),
            pattern: escape(inner),
            suffix: String::new(),
            modifier,
        }),
    }
}

// Reads `:name`, `:name(pattern)` or `(pattern)` starting at `i`
fn read_param(chars: &[char], mut i: usize) -> Result<(String, usize), String> {
    if chars[i] == ':' {
        i += 1;
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        if i == start {
            return Err(format!("missing parameter name at {}", start));
        }
    }

    if i < chars.len() && chars[i] == '(' {
        let close = find_close(chars, i, '(', ')')?;
        let pattern: String = chars[i + 1..close].iter().collect();
        if pattern.starts_with('?') {
            return Err(format!("pattern cannot start with \"?\" at {}", i));
        }
        Ok((pattern, close + 1))
    } else {
        Ok((DEFAULT_PATTERN.to_string(), i))
    }
}

fn find_close(chars: &[char], open_at: usize, open: char, close: char) -> Result<usize, String> {
    let mut depth = 0;
    let mut i = open_at;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(format!("unbalanced '{}' at {}", open, open_at))
}

fn read_modifier(chars: &[char], i: &mut usize) -> Option<char> {
    match chars.get(*i) {
        Some(c @ ('?' | '*' | '+')) => {
            *i += 1;
            Some(*c)
        }
        _ => None,
    }
}

fn take_prefix(literal: &mut String) -> String {
    match literal.chars().last() {
        Some(c @ ('/' | '.')) => {
            literal.pop();
            c.to_string()
        }
        _ => String::new(),
    }
}

fn flush(tokens: &mut Vec<Token>, literal: &mut String) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if ".+*?=^!:${}()[]|/\\".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
