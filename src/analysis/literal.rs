//! Evaluation of exported constant initialisers
//!
//! Only literal expressions are accepted: strings, numbers, booleans,
//! `null`, `undefined`, arrays and object literals built from those.
//! Anything else is reported with the property path where it was found.

use serde_json::{Map, Number, Value};

/// A value that cannot be evaluated without running the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedLiteral {
    pub message: String,
    /// Dotted path inside the value, e.g. `matcher[1].source`
    pub path: Option<String>,
}

impl std::fmt::Display for UnsupportedLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} at \"{}\"", self.message, path),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Parse a single literal at the start of `input`.
///
/// Returns the value and the number of bytes consumed. Trailing input is
/// left for the caller to inspect.
pub fn parse_literal(input: &str) -> Result<(Value, usize), UnsupportedLiteral> {
    let mut parser = LiteralParser {
        src: input.as_bytes(),
        text: input,
        pos: 0,
        path: Vec::new(),
    };
    parser.skip_trivia();
    let value = parser.value()?;
    Ok((value, parser.pos))
}

struct LiteralParser<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
    path: Vec<String>,
}

impl<'a> LiteralParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn unsupported(&self, message: impl Into<String>) -> UnsupportedLiteral {
        let path = if self.path.is_empty() {
            None
        } else {
            Some(self.path.iter().fold(String::new(), |mut acc, part| {
                if !part.starts_with('[') && !acc.is_empty() {
                    acc.push('.');
                }
                acc.push_str(part);
                acc
            }))
        };
        UnsupportedLiteral {
            message: message.into(),
            path,
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            let rest = &self.src[self.pos..];
            if rest.starts_with(b"//") {
                while !matches!(self.peek(), None | Some(b'\n')) {
                    self.pos += 1;
                }
            } else if rest.starts_with(b"/*") {
                match self.text[self.pos + 2..].find("*/") {
                    Some(end) => self.pos += end + 4,
                    None => self.pos = self.src.len(),
                }
            } else {
                break;
            }
        }
    }

    fn value(&mut self) -> Result<Value, UnsupportedLiteral> {
        match self.peek() {
            Some(b'"') | Some(b'\'') => self.string().map(Value::String),
            Some(b'`') => self.template(),
            Some(b'[') => self.array(),
            Some(b'{') => self.object(),
            Some(b'-') | Some(b'+') | Some(b'.') => self.number(),
            Some(b) if b.is_ascii_digit() => self.number(),
            Some(b) if is_ident_start(b) => {
                let ident = self.identifier();
                match ident {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" | "undefined" => Ok(Value::Null),
                    _ => Err(self.unsupported(format!("Unknown identifier \"{}\"", ident))),
                }
            }
            Some(_) => Err(self.unsupported("Unsupported node type")),
            None => Err(self.unsupported("Unexpected end of input")),
        }
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_ident_char(b)) {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn string(&mut self) -> Result<String, UnsupportedLiteral> {
        let quote = self.src[self.pos];
        self.pos += 1;
        let mut out = String::new();

        loop {
            let Some(c) = self.text[self.pos..].chars().next() else {
                return Err(self.unsupported("Unterminated string"));
            };
            self.pos += c.len_utf8();
            match c {
                c if c as u32 == quote as u32 => return Ok(out),
                '\\' => {
                    let Some(escaped) = self.text[self.pos..].chars().next() else {
                        return Err(self.unsupported("Unterminated string"));
                    };
                    self.pos += escaped.len_utf8();
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                '\n' => return Err(self.unsupported("Unterminated string")),
                c => out.push(c),
            }
        }
    }

    fn template(&mut self) -> Result<Value, UnsupportedLiteral> {
        self.pos += 1;
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.unsupported("Unterminated template literal")),
                Some(b'`') => break,
                Some(b'$') if self.src.get(self.pos + 1) == Some(&b'{') => {
                    return Err(self.unsupported("Unsupported template literal with expressions"));
                }
                Some(b'\\') => self.pos += 2,
                Some(_) => self.pos += 1,
            }
        }
        let raw = self.text[start..self.pos].to_string();
        self.pos += 1;
        Ok(Value::String(raw))
    }

    fn number(&mut self) -> Result<Value, UnsupportedLiteral> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-') | Some(b'+')) {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'.' || b == b'_') {
            self.pos += 1;
        }
        let raw: String = self.text[start..self.pos].chars().filter(|c| *c != '_').collect();

        if let Ok(int) = raw.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.unsupported(format!("Unsupported numeric literal \"{}\"", raw)))
    }

    fn array(&mut self) -> Result<Value, UnsupportedLiteral> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                Some(b'.') if self.src[self.pos..].starts_with(b"...") => {
                    return Err(self.unsupported("Unsupported spread operator in the Array Expression"));
                }
                _ => {}
            }

            self.path.push(format!("[{}]", items.len()));
            let item = self.value()?;
            self.path.pop();
            items.push(item);

            self.skip_trivia();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {}
                _ => return Err(self.unsupported("Unsupported node type")),
            }
        }
    }

    fn object(&mut self) -> Result<Value, UnsupportedLiteral> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            let key = match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(b'"') | Some(b'\'') => self.string()?,
                Some(b'[') => return Err(self.unsupported("Unsupported computed key in the Object Expression")),
                Some(b'.') => return Err(self.unsupported("Unsupported spread operator in the Object Expression")),
                Some(b) if is_ident_start(b) => self.identifier().to_string(),
                Some(b) if b.is_ascii_digit() => {
                    let start = self.pos;
                    while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                        self.pos += 1;
                    }
                    self.text[start..self.pos].to_string()
                }
                _ => return Err(self.unsupported("Unsupported key in the Object Expression")),
            };

            self.skip_trivia();
            if self.peek() != Some(b':') {
                return Err(self.unsupported(format!("Unsupported shorthand property \"{}\"", key)));
            }
            self.pos += 1;
            self.skip_trivia();

            self.path.push(key.clone());
            let value = self.value()?;
            self.path.pop();
            map.insert(key, value);

            self.skip_trivia();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.unsupported("Unsupported node type")),
            }
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}
