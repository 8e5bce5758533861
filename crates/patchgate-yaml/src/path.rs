// path.rs — Field path expressions.
//
// Grammar:
//
//   path      := ["$" ["."]] segment ("." key | "[" bracket "]")*
//   segment   := key | "[" bracket "]"
//   bracket   := digits | quoted | "?(" "@." field ws "==" ws quoted ")"
//   field     := name ("." name)*
//
// Plain keys run until the next `.` or `[`; keys containing those characters
// are written as `['a.b']` or `["a.b"]`.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::YamlError;

/// An equality test selecting mapping elements of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Key path below the element, `@.metadata.name` → `["metadata", "name"]`.
    pub field: Vec<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Filter(Predicate),
}

impl Segment {
    /// Whether the segment addresses sequence elements.
    pub fn is_positional(&self) -> bool {
        !matches!(self, Segment::Key(_))
    }
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    source: String,
    segments: Vec<Segment>,
}

impl PathExpr {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether any segment can select more than one node.
    pub fn has_filter(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Filter(_)))
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for PathExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl FromStr for PathExpr {
    type Err = YamlError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let segments = Lexer::new(expr).segments()?;
        Ok(PathExpr {
            source: expr.to_string(),
            segments,
        })
    }
}

struct Lexer<'a> {
    expr: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(expr: &'a str) -> Self {
        Self { expr, pos: 0 }
    }

    fn error(&self, reason: impl Into<String>) -> YamlError {
        YamlError::InvalidPath {
            expr: self.expr.to_string(),
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.expr[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), YamlError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn skip_spaces(&mut self) {
        while self.eat(' ') {}
    }

    fn segments(mut self) -> Result<Vec<Segment>, YamlError> {
        if self.expr.is_empty() {
            return Err(self.error("path is empty"));
        }
        if self.eat('$') {
            // `$` alone addresses nothing we can set.
            if self.peek().is_none() {
                return Err(self.error("path has no segments"));
            }
            if self.peek() != Some('[') {
                self.expect('.')?;
            }
        }

        let mut segments = Vec::new();
        let mut first = true;
        loop {
            match self.peek() {
                None => break,
                Some('[') => {
                    self.pos += 1;
                    segments.push(self.bracket()?);
                }
                Some('.') if !first => {
                    self.pos += 1;
                    segments.push(Segment::Key(self.plain_key()?));
                }
                Some(_) if first => segments.push(Segment::Key(self.plain_key()?)),
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            }
            first = false;
        }
        Ok(segments)
    }

    fn plain_key(&mut self) -> Result<String, YamlError> {
        let start = self.pos;
        let rest = &self.expr[start..];
        let len = rest.find(['.', '[', ']']).unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("empty key"));
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    fn bracket(&mut self) -> Result<Segment, YamlError> {
        let segment = match self.peek() {
            Some('\'' | '"') => Segment::Key(self.quoted()?),
            Some('?') => {
                self.pos += 1;
                Segment::Filter(self.predicate()?)
            }
            Some(c) if c.is_ascii_digit() => {
                let rest = &self.expr[self.pos..];
                let len = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                let index = rest[..len]
                    .parse::<usize>()
                    .map_err(|e| self.error(format!("invalid index: {e}")))?;
                self.pos += len;
                Segment::Index(index)
            }
            Some('-') => return Err(self.error("negative indexes are not supported")),
            _ => return Err(self.error("expected an index, quoted key or filter")),
        };
        self.expect(']')?;
        Ok(segment)
    }

    /// `'text'` or `"text"`; the quote character is escaped with a backslash.
    fn quoted(&mut self) -> Result<String, YamlError> {
        let quote = self.peek().ok_or_else(|| self.error("expected a quote"))?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = self
                .peek()
                .ok_or_else(|| self.error("unterminated quoted string"))?;
            self.pos += c.len_utf8();
            match c {
                '\\' => {
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.error("unterminated quoted string"))?;
                    self.pos += escaped.len_utf8();
                    out.push(escaped);
                }
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
    }

    fn predicate(&mut self) -> Result<Predicate, YamlError> {
        self.expect('(')?;
        self.skip_spaces();
        self.expect('@')?;
        let mut field = Vec::new();
        while self.eat('.') {
            let rest = &self.expr[self.pos..];
            let len = rest
                .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-')))
                .unwrap_or(rest.len());
            if len == 0 {
                return Err(self.error("empty field name in filter"));
            }
            field.push(rest[..len].to_string());
            self.pos += len;
        }
        if field.is_empty() {
            return Err(self.error("filter must compare a field of '@'"));
        }
        self.skip_spaces();
        if !self.expr[self.pos..].starts_with("==") {
            return Err(self.error("only '==' comparisons are supported"));
        }
        self.pos += 2;
        self.skip_spaces();
        if !matches!(self.peek(), Some('\'' | '"')) {
            return Err(self.error("filter value must be quoted"));
        }
        let value = self.quoted()?;
        self.skip_spaces();
        self.expect(')')?;
        Ok(Predicate { field, value })
    }
}
