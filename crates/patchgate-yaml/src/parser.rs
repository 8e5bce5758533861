// parser.rs — Span-preserving parser for the first document of a YAML file.
//
// Understands the YAML people keep in GitOps repositories: block mappings and
// sequences (including compact `- key: value` entries), plain, quoted and
// block scalars, flow collections, anchors, tags and aliases. Complex keys
// (`? key`) are rejected. Only the first document is parsed; everything from
// the next `---` or `...` marker on is left alone.
//
// The parser never copies formatting into the tree. It records where every
// node starts and ends so that a mutation can splice exactly those bytes.

use std::ops::Range;

use crate::error::YamlError;
use crate::scalar::{resolve_plain, ScalarType};
use crate::tree::{Entry, Node, NodeData, NodeId, Position, Scalar, ScalarStyle};

/// Result of parsing: the node arena, its root, and the byte range of the
/// first document's body.
#[derive(Debug)]
pub(crate) struct Parsed {
    pub nodes: Vec<Node>,
    pub root: NodeId,
    pub body: Range<usize>,
}

pub(crate) fn parse(src: &str) -> Result<Parsed, YamlError> {
    Parser::new(src).parse_document()
}

/// How the value after an indicator may be laid out.
#[derive(Clone, Copy)]
struct ValueCtx {
    /// A block sequence may start at the parent's own indentation
    /// (`key:\n- item`), which YAML allows for mapping values.
    seq_at_parent: bool,
    /// A block collection may start on the indicator's own line
    /// (`- name: x`, `- - nested`).
    compact: bool,
}

const MAPPING_VALUE: ValueCtx = ValueCtx {
    seq_at_parent: true,
    compact: false,
};

const COMPACT: ValueCtx = ValueCtx {
    seq_at_parent: false,
    compact: true,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Chomp {
    Strip,
    Clip,
    Keep,
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\r'
}

fn is_flow_indicator(b: u8) -> bool {
    matches!(b, b',' | b'[' | b']' | b'{' | b'}')
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    line_starts: Vec<usize>,
    /// End of the first document; bytes at or past it read as a line break.
    end: usize,
    nodes: Vec<Node>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        // A byte order mark is not content; the first line starts after it.
        let bom = if src.starts_with('\u{feff}') { '\u{feff}'.len_utf8() } else { 0 };
        let mut line_starts = vec![bom];
        line_starts.extend(
            src.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            src,
            bytes: src.as_bytes(),
            line_starts,
            end: src.len(),
            nodes: Vec::new(),
        }
    }

    // ── Low-level cursor helpers ─────────────────────────────────

    fn at(&self, i: usize) -> u8 {
        if i < self.end {
            self.bytes[i]
        } else {
            b'\n'
        }
    }

    /// Offset of the line break ending the line that contains `i`.
    fn eol(&self, mut i: usize) -> usize {
        while i < self.end && self.bytes[i] != b'\n' {
            i += 1;
        }
        i.min(self.end)
    }

    fn next_line(&self, i: usize) -> usize {
        let eol = self.eol(i);
        if eol < self.end {
            eol + 1
        } else {
            self.end
        }
    }

    fn line_index(&self, i: usize) -> usize {
        match self.line_starts.binary_search(&i) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        }
    }

    fn column(&self, i: usize) -> usize {
        i.saturating_sub(self.line_starts[self.line_index(i)])
    }

    fn position(&self, i: usize) -> Position {
        let line = self.line_index(i);
        Position {
            line: line + 1,
            column: i.saturating_sub(self.line_starts[line]) + 1,
        }
    }

    fn skip_blanks(&self, mut i: usize) -> usize {
        while i < self.end && is_blank(self.bytes[i]) {
            i += 1;
        }
        i
    }

    /// Whether only blanks and an optional comment remain on the line.
    fn rest_is_trivia(&self, i: usize) -> bool {
        let j = self.skip_blanks(i);
        matches!(self.at(j), b'\n' | b'#')
    }

    /// `sep` is a space, tab or line break: what must follow `-` or `:` for
    /// them to act as indicators.
    fn is_sep(&self, i: usize) -> bool {
        let b = self.at(i);
        is_blank(b) || b == b'\n'
    }

    fn error(&self, at: usize, message: impl Into<String>) -> YamlError {
        YamlError::Syntax {
            position: self.position(at.min(self.src.len())),
            message: message.into(),
        }
    }

    /// Skip the rest of the current line (which must be trivia) and any
    /// blank or comment-only lines. Returns the first content byte of the
    /// next content line, if the document has one.
    fn next_content(&self, from: usize) -> Result<Option<usize>, YamlError> {
        let j = self.skip_blanks(from);
        if !matches!(self.at(j), b'\n' | b'#') {
            return Err(self.error(j, "unexpected content after value"));
        }
        let mut line = self.next_line(from);
        while line < self.end {
            let c = self.skip_blanks(line);
            if !matches!(self.at(c), b'\n' | b'#') {
                return Ok(Some(c));
            }
            line = self.next_line(line);
        }
        Ok(None)
    }

    fn is_marker(&self, line: usize, marker: &[u8; 3]) -> bool {
        self.bytes.get(line..line + 3) == Some(&marker[..])
            && self
                .bytes
                .get(line + 3)
                .is_none_or(|b| is_blank(*b) || *b == b'\n')
    }

    fn is_seq_entry(&self, i: usize) -> bool {
        self.at(i) == b'-' && self.is_sep(i + 1)
    }

    /// Whether the line starting at `i` holds a `key:` indicator.
    fn is_mapping_key(&self, i: usize) -> bool {
        self.find_key_colon(i).is_some()
    }

    /// Locate the `:` that ends a block mapping key starting at `i`.
    fn find_key_colon(&self, i: usize) -> Option<usize> {
        match self.at(i) {
            b'"' | b'\'' => {
                let (close, _) = self.scan_quoted(i).ok()?;
                if self.line_index(close) != self.line_index(i) {
                    return None;
                }
                let c = self.skip_blanks(close);
                (self.at(c) == b':' && self.is_sep(c + 1)).then_some(c)
            }
            b'[' | b'{' | b'#' | b'\n' => None,
            b'-' | b'?' if self.is_sep(i + 1) => None,
            _ => {
                let mut j = i;
                while self.at(j) != b'\n' {
                    match self.at(j) {
                        b':' if self.is_sep(j + 1) => return Some(j),
                        b'#' if j > i && is_blank(self.bytes[j - 1]) => return None,
                        _ => j += 1,
                    }
                }
                None
            }
        }
    }

    // ── Node construction ────────────────────────────────────────

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    #[allow(clippy::too_many_arguments)]
    fn scalar(
        &mut self,
        span: Range<usize>,
        end: usize,
        style: ScalarStyle,
        value: String,
        body: Option<Range<usize>>,
        parent_indent: isize,
        flow: bool,
    ) -> NodeId {
        let ty = match style {
            ScalarStyle::Plain => resolve_plain(&value),
            _ => ScalarType::String,
        };
        let position = self.position(span.start);
        self.push(Node {
            data: NodeData::Scalar(Scalar {
                value,
                style,
                ty,
                body,
            }),
            span,
            end,
            position,
            indent: 0,
            parent_indent,
            flow,
        })
    }

    fn empty_scalar(&mut self, at: usize, parent_indent: isize, flow: bool) -> NodeId {
        self.scalar(
            at..at,
            at,
            ScalarStyle::Plain,
            String::new(),
            None,
            parent_indent,
            flow,
        )
    }

    // ── Documents ────────────────────────────────────────────────

    fn parse_document(mut self) -> Result<Parsed, YamlError> {
        let len = self.bytes.len();

        // Preamble: directives, comments and blank lines up to the first
        // `---` marker or the first content line.
        let mut line = self.line_starts[0];
        let body_start = loop {
            if line >= len {
                break len;
            }
            if self.is_marker(line, b"---") {
                break line + 3;
            }
            let c = self.skip_blanks(line);
            let directive = c == line && self.at(c) == b'%';
            if directive || matches!(self.at(c), b'\n' | b'#') {
                line = self.next_line(line);
                continue;
            }
            break line;
        };

        // The first document ends at the next marker line.
        let mut line = self.next_line(body_start);
        while line < len {
            if self.is_marker(line, b"---") || self.is_marker(line, b"...") {
                self.end = line;
                break;
            }
            line = self.next_line(line);
        }

        let root = self.parse_value(body_start, -1, COMPACT)?;
        let root_end = self.nodes[root.0].end;
        if let Some(rest) = self.next_content(root_end)? {
            return Err(self.error(rest, "unexpected content after document root"));
        }

        let body = body_start..self.end;
        Ok(Parsed {
            nodes: self.nodes,
            root,
            body,
        })
    }

    // ── Block structure ──────────────────────────────────────────

    /// Parse the node following an indicator that ends at `after`
    /// (`key:`, `-`, `---`, or the start of the document).
    fn parse_value(
        &mut self,
        after: usize,
        parent: isize,
        ctx: ValueCtx,
    ) -> Result<NodeId, YamlError> {
        let start = self.skip_blanks(after);
        let p = self.skip_properties(start);
        let anchor_end = if p > start {
            self.trim_back(p)
        } else {
            after
        };

        if matches!(self.at(p), b'\n' | b'#') {
            if let Some(q) = self.next_content(p)? {
                let column = self.column(q) as isize;
                if column > parent {
                    return self.parse_value(q, parent, COMPACT);
                }
                if ctx.seq_at_parent && column == parent && self.is_seq_entry(q) {
                    return self.parse_block_sequence(q);
                }
            }
            return Ok(self.empty_scalar(anchor_end, parent, false));
        }

        if ctx.compact {
            if self.is_seq_entry(p) {
                return self.parse_block_sequence(p);
            }
            if self.is_mapping_key(p) {
                return self.parse_block_mapping(p);
            }
        }
        self.parse_inline(p, parent)
    }

    fn parse_block_sequence(&mut self, start: usize) -> Result<NodeId, YamlError> {
        let indent = self.column(start);
        let mut items = Vec::new();
        let mut at = start;
        let end = loop {
            let item = self.parse_value(at + 1, indent as isize, COMPACT)?;
            items.push(item);
            let end = self.nodes[item.0].end.max(at + 1);
            match self.next_content(end)? {
                Some(next) if self.column(next) == indent && self.is_seq_entry(next) => at = next,
                Some(next) if self.column(next) > indent => {
                    return Err(self.error(next, "bad indentation of a sequence entry"));
                }
                _ => break end,
            }
        };
        let position = self.position(start);
        Ok(self.push(Node {
            data: NodeData::Sequence(items),
            span: start..end,
            end,
            position,
            indent,
            parent_indent: indent as isize - 1,
            flow: false,
        }))
    }

    fn parse_block_mapping(&mut self, start: usize) -> Result<NodeId, YamlError> {
        let indent = self.column(start);
        let mut entries: Vec<Entry> = Vec::new();
        let mut at = start;
        let end = loop {
            let (key, colon) = self.parse_key(at)?;
            if entries.iter().any(|entry| entry.key == key) {
                return Err(self.error(at, format!("duplicate mapping key '{key}'")));
            }
            let value = self.parse_value(colon + 1, indent as isize, MAPPING_VALUE)?;
            entries.push(Entry { key, value });
            let end = self.nodes[value.0].end.max(colon + 1);
            match self.next_content(end)? {
                Some(next) if self.column(next) == indent && !self.is_seq_entry(next) => {
                    at = next
                }
                Some(next) if self.column(next) > indent => {
                    return Err(self.error(next, "bad indentation of a mapping entry"));
                }
                _ => break end,
            }
        };
        let position = self.position(start);
        Ok(self.push(Node {
            data: NodeData::Mapping(entries),
            span: start..end,
            end,
            position,
            indent,
            parent_indent: indent as isize - 1,
            flow: false,
        }))
    }

    /// Parse a block mapping key at `at`; returns the key and the offset of
    /// its `:` indicator.
    fn parse_key(&self, at: usize) -> Result<(String, usize), YamlError> {
        if self.at(at) == b'?' && self.is_sep(at + 1) {
            return Err(self.error(at, "complex mapping keys are not supported"));
        }
        let colon = self
            .find_key_colon(at)
            .ok_or_else(|| self.error(at, "expected a mapping key"))?;
        let key = match self.at(at) {
            b'"' | b'\'' => self.scan_quoted(at)?.1,
            _ => self.src[at..colon].trim_end().to_string(),
        };
        Ok((key, colon))
    }

    fn trim_back(&self, mut i: usize) -> usize {
        while i > 0 && is_blank(self.bytes[i - 1]) {
            i -= 1;
        }
        i
    }

    /// Skip anchors (`&name`) and tags (`!tag`) in front of a node.
    fn skip_properties(&self, mut p: usize) -> usize {
        while matches!(self.at(p), b'&' | b'!') {
            while !self.is_sep(p) {
                p += 1;
            }
            p = self.skip_blanks(p);
        }
        p
    }

    // ── Inline nodes ─────────────────────────────────────────────

    fn parse_inline(&mut self, p: usize, parent: isize) -> Result<NodeId, YamlError> {
        let p = self.skip_properties(p);
        match self.at(p) {
            b'|' | b'>' => self.parse_block_scalar(p, parent),
            b'[' | b'{' => self.parse_flow_node(p, parent),
            b'*' => Ok(self.parse_alias(p, parent, false)),
            b'"' | b'\'' => {
                let (close, value) = self.scan_quoted(p)?;
                let style = if self.at(p) == b'"' {
                    ScalarStyle::DoubleQuoted
                } else {
                    ScalarStyle::SingleQuoted
                };
                Ok(self.scalar(p..close, close, style, value, None, parent, false))
            }
            b'\n' | b'#' => Ok(self.empty_scalar(p, parent, false)),
            _ => self.parse_plain(p, parent),
        }
    }

    fn parse_alias(&mut self, p: usize, parent: isize, flow: bool) -> NodeId {
        let mut end = p + 1;
        while !self.is_sep(end) && !(flow && is_flow_indicator(self.at(end))) {
            end += 1;
        }
        let position = self.position(p);
        self.push(Node {
            data: NodeData::Alias(self.src[p + 1..end].to_string()),
            span: p..end,
            end,
            position,
            indent: 0,
            parent_indent: parent,
            flow,
        })
    }

    /// End of a plain scalar's text on the line starting at `p`.
    fn plain_line_end(&self, p: usize, flow: bool) -> usize {
        let mut j = p;
        loop {
            match self.at(j) {
                b'\n' => break,
                b'#' if j > p && is_blank(self.bytes[j - 1]) => break,
                b':' if flow && (self.is_sep(j + 1) || is_flow_indicator(self.at(j + 1))) => {
                    break
                }
                b if flow && is_flow_indicator(b) => break,
                _ => j += 1,
            }
        }
        self.trim_back(j).max(p)
    }

    fn parse_plain(&mut self, p: usize, parent: isize) -> Result<NodeId, YamlError> {
        let mut end = self.plain_line_end(p, false);
        let mut value = self.src[p..end].to_string();

        // Continuation lines, indented deeper than the parent collection.
        while self.at(self.skip_blanks(end)) != b'#' {
            let mut line = self.next_line(end);
            let mut blank_lines = 0;
            let next = loop {
                if line >= self.end {
                    break None;
                }
                let c = self.skip_blanks(line);
                if self.at(c) == b'\n' {
                    blank_lines += 1;
                    line = self.next_line(line);
                    continue;
                }
                break Some(c);
            };
            let Some(q) = next else { break };
            if self.column(q) as isize <= parent || self.at(q) == b'#' || self.is_mapping_key(q) {
                break;
            }
            end = self.plain_line_end(q, false);
            if blank_lines == 0 {
                value.push(' ');
            } else {
                value.extend(std::iter::repeat_n('\n', blank_lines));
            }
            value.push_str(&self.src[q..end]);
        }

        Ok(self.scalar(p..end, end, ScalarStyle::Plain, value, None, parent, false))
    }

    fn parse_block_scalar(&mut self, p: usize, parent: isize) -> Result<NodeId, YamlError> {
        let literal = self.at(p) == b'|';
        let mut chomp = Chomp::Clip;
        let mut explicit_indent = None;
        let mut i = p + 1;
        loop {
            match self.at(i) {
                b'-' => chomp = Chomp::Strip,
                b'+' => chomp = Chomp::Keep,
                d @ b'1'..=b'9' => explicit_indent = Some((d - b'0') as usize),
                _ => break,
            }
            i += 1;
        }
        let header_end = i;
        if !self.rest_is_trivia(header_end) {
            return Err(self.error(header_end, "invalid block scalar header"));
        }
        // The body range starts at the header's line break, `\r` included.
        let mut header_eol = self.eol(header_end);
        if header_eol > header_end && self.bytes[header_eol - 1] == b'\r' {
            header_eol -= 1;
        }

        let mut indent =
            explicit_indent.map(|m| if parent < 0 { m } else { parent as usize + m });
        let mut lines: Vec<Range<usize>> = Vec::new();
        let mut body_end = header_eol;
        let mut trailing_blank = 0;
        let mut line = self.next_line(header_end);
        while line < self.end {
            let eol = self.eol(line);
            let mut spaces = 0;
            while self.at(line + spaces) == b' ' {
                spaces += 1;
            }
            let content = self.skip_blanks(line);
            if content >= eol {
                trailing_blank += 1;
                lines.push(line..eol);
                line = self.next_line(line);
                continue;
            }
            let required = *indent.get_or_insert(spaces);
            if spaces < required || (spaces as isize) <= parent {
                break;
            }
            trailing_blank = 0;
            lines.push(line..eol);
            body_end = self.trim_back(eol);
            line = self.next_line(line);
        }
        lines.truncate(lines.len() - trailing_blank);

        let indent = indent.unwrap_or(0);
        let content: Vec<&str> = lines
            .iter()
            .map(|range| {
                let text = self.src[range.clone()].trim_end_matches('\r');
                text.get(indent..).unwrap_or("")
            })
            .collect();
        let mut value = if literal {
            content.join("\n")
        } else {
            fold_lines(&content)
        };
        if !content.is_empty() {
            match chomp {
                Chomp::Strip => {}
                Chomp::Clip => value.push('\n'),
                Chomp::Keep => value.extend(std::iter::repeat_n('\n', trailing_blank + 1)),
            }
        }

        let style = if literal {
            ScalarStyle::Literal
        } else {
            ScalarStyle::Folded
        };
        Ok(self.scalar(
            p..header_end,
            body_end,
            style,
            value,
            Some(header_eol..body_end),
            parent,
            false,
        ))
    }

    // ── Quoted scalars ───────────────────────────────────────────

    /// Scan a quoted scalar starting at `p`. Returns the offset just past the
    /// closing quote and the decoded value.
    fn scan_quoted(&self, p: usize) -> Result<(usize, String), YamlError> {
        let quote = self.at(p);
        let double = quote == b'"';
        let mut out: Vec<u8> = Vec::new();
        let mut i = p + 1;
        loop {
            if i >= self.end {
                return Err(self.error(p, "unterminated quoted scalar"));
            }
            let b = self.bytes[i];
            match b {
                b'\'' if !double => {
                    if self.at(i + 1) == b'\'' {
                        out.push(b'\'');
                        i += 2;
                    } else {
                        i += 1;
                        break;
                    }
                }
                b'"' if double => {
                    i += 1;
                    break;
                }
                b'\\' if double => {
                    let esc = self.at(i + 1);
                    if esc == b'\n' || (esc == b'\r' && self.at(i + 2) == b'\n') {
                        // Escaped line break: join without a space.
                        i = self.skip_blanks(self.next_line(i));
                        continue;
                    }
                    let (decoded, width) = self.unescape(i)?;
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(decoded.encode_utf8(&mut buf).as_bytes());
                    i += width;
                }
                b'\n' | b'\r' => {
                    // Line folding: a single break becomes a space, each
                    // further empty line a newline.
                    while out.last().is_some_and(|b| *b == b' ' || *b == b'\t') {
                        out.pop();
                    }
                    let mut line = self.next_line(i);
                    let mut empty = 0;
                    while line < self.end && self.at(self.skip_blanks(line)) == b'\n' {
                        empty += 1;
                        line = self.next_line(line);
                    }
                    if empty == 0 {
                        out.push(b' ');
                    } else {
                        out.extend(std::iter::repeat_n(b'\n', empty));
                    }
                    i = self.skip_blanks(line);
                }
                _ => {
                    out.push(b);
                    i += 1;
                }
            }
        }
        let value =
            String::from_utf8(out).map_err(|_| self.error(p, "invalid UTF-8 in quoted scalar"))?;
        Ok((i, value))
    }

    /// Decode the escape sequence at `i` (pointing at the backslash).
    fn unescape(&self, i: usize) -> Result<(char, usize), YamlError> {
        let simple = match self.at(i + 1) {
            b'0' => Some('\0'),
            b'a' => Some('\u{7}'),
            b'b' => Some('\u{8}'),
            b't' | b'\t' => Some('\t'),
            b'n' => Some('\n'),
            b'v' => Some('\u{b}'),
            b'f' => Some('\u{c}'),
            b'r' => Some('\r'),
            b'e' => Some('\u{1b}'),
            b' ' => Some(' '),
            b'"' => Some('"'),
            b'/' => Some('/'),
            b'\\' => Some('\\'),
            b'N' => Some('\u{85}'),
            b'_' => Some('\u{a0}'),
            b'L' => Some('\u{2028}'),
            b'P' => Some('\u{2029}'),
            _ => None,
        };
        if let Some(c) = simple {
            return Ok((c, 2));
        }
        let digits = match self.at(i + 1) {
            b'x' => 2,
            b'u' => 4,
            b'U' => 8,
            _ => return Err(self.error(i, "unknown escape sequence")),
        };
        let hex = self
            .src
            .get(i + 2..i + 2 + digits)
            .filter(|_| i + 2 + digits <= self.end)
            .ok_or_else(|| self.error(i, "truncated escape sequence"))?;
        let c = u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(i, "invalid escape sequence"))?;
        Ok((c, 2 + digits))
    }

    // ── Flow collections ─────────────────────────────────────────

    /// Skip whitespace, line breaks and comments inside a flow collection.
    fn flow_ws(&self, mut i: usize) -> usize {
        loop {
            while i < self.end && (is_blank(self.bytes[i]) || self.bytes[i] == b'\n') {
                i += 1;
            }
            if i < self.end && self.bytes[i] == b'#' {
                i = self.eol(i);
                continue;
            }
            return i;
        }
    }

    fn parse_flow_node(&mut self, p: usize, parent: isize) -> Result<NodeId, YamlError> {
        let p = self.skip_properties(p);
        match self.at(p) {
            b'[' => self.parse_flow_sequence(p, parent),
            b'{' => self.parse_flow_mapping(p, parent),
            b'*' => Ok(self.parse_alias(p, parent, true)),
            b'"' | b'\'' => {
                let (close, value) = self.scan_quoted(p)?;
                let style = if self.at(p) == b'"' {
                    ScalarStyle::DoubleQuoted
                } else {
                    ScalarStyle::SingleQuoted
                };
                Ok(self.scalar(p..close, close, style, value, None, parent, true))
            }
            _ => {
                let end = self.plain_line_end(p, true);
                if end == p {
                    return Err(self.error(p, "unexpected character in flow collection"));
                }
                let value = self.src[p..end].to_string();
                Ok(self.scalar(p..end, end, ScalarStyle::Plain, value, None, parent, true))
            }
        }
    }

    fn parse_flow_sequence(&mut self, p: usize, parent: isize) -> Result<NodeId, YamlError> {
        let mut items = Vec::new();
        let mut i = self.flow_ws(p + 1);
        loop {
            if i >= self.end {
                return Err(self.error(p, "unterminated flow sequence"));
            }
            if self.bytes[i] == b']' {
                i += 1;
                break;
            }
            let item = self.parse_flow_node(i, parent)?;
            items.push(item);
            i = self.flow_ws(self.nodes[item.0].end);
            match self.at(i) {
                b',' => i = self.flow_ws(i + 1),
                b']' => {}
                b':' => return Err(self.error(i, "pairs in flow sequences are not supported")),
                _ => return Err(self.error(i, "expected ',' or ']' in flow sequence")),
            }
        }
        let position = self.position(p);
        Ok(self.push(Node {
            data: NodeData::Sequence(items),
            span: p..i,
            end: i,
            position,
            indent: 0,
            parent_indent: parent,
            flow: true,
        }))
    }

    fn parse_flow_mapping(&mut self, p: usize, parent: isize) -> Result<NodeId, YamlError> {
        let mut entries: Vec<Entry> = Vec::new();
        let mut i = self.flow_ws(p + 1);
        loop {
            if i >= self.end {
                return Err(self.error(p, "unterminated flow mapping"));
            }
            if self.bytes[i] == b'}' {
                i += 1;
                break;
            }
            let (key, key_end) = match self.at(i) {
                b'"' | b'\'' => {
                    let (close, key) = self.scan_quoted(i)?;
                    (key, close)
                }
                _ => {
                    let end = self.plain_line_end(i, true);
                    if end == i {
                        return Err(self.error(i, "expected a key in flow mapping"));
                    }
                    (self.src[i..end].to_string(), end)
                }
            };
            if entries.iter().any(|entry| entry.key == key) {
                return Err(self.error(i, format!("duplicate mapping key '{key}'")));
            }
            i = self.flow_ws(key_end);
            let value = if self.at(i) == b':' {
                let after = i + 1;
                i = self.flow_ws(after);
                if matches!(self.at(i), b',' | b'}') {
                    self.empty_scalar(after, parent, true)
                } else {
                    self.parse_flow_node(i, parent)?
                }
            } else {
                self.empty_scalar(key_end, parent, true)
            };
            entries.push(Entry { key, value });
            i = self.flow_ws(self.nodes[value.0].end.max(i));
            match self.at(i) {
                b',' => i = self.flow_ws(i + 1),
                b'}' => {}
                _ => return Err(self.error(i, "expected ',' or '}' in flow mapping")),
            }
        }
        let position = self.position(p);
        Ok(self.push(Node {
            data: NodeData::Mapping(entries),
            span: p..i,
            end: i,
            position,
            indent: 0,
            parent_indent: parent,
            flow: true,
        }))
    }
}

/// Fold the lines of a `>` block scalar.
fn fold_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    let mut previous_text = false;
    for line in lines {
        let more_indented = line.starts_with([' ', '\t']);
        if line.is_empty() {
            out.push('\n');
            previous_text = false;
        } else {
            if previous_text && !more_indented {
                out.push(' ');
            } else if previous_text {
                out.push('\n');
            }
            out.push_str(line);
            previous_text = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;

    fn scalar_at<'p>(parsed: &'p Parsed, path: &[&str]) -> &'p Scalar {
        let mut id = parsed.root;
        for key in path {
            id = parsed.nodes[id.0].get(key).expect("key present");
        }
        parsed.nodes[id.0].as_scalar().expect("scalar")
    }

    #[test]
    fn parses_nested_mappings_with_spans() {
        let src = "foo: bar\nspec:\n  image:\n    tag: 0.1.0 # pinned\n";
        let parsed = parse(src).unwrap();
        let tag = scalar_at(&parsed, &["spec", "image", "tag"]);
        assert_eq!(tag.value, "0.1.0");
        assert_eq!(tag.ty, ScalarType::String);
        let id = parsed.nodes[parsed.root.0].get("spec").unwrap();
        let image = parsed.nodes[id.0].get("image").unwrap();
        let tag_id = parsed.nodes[image.0].get("tag").unwrap();
        let tag_node = &parsed.nodes[tag_id.0];
        assert_eq!(&src[tag_node.span.clone()], "0.1.0");
        assert_eq!(tag_node.position, Position { line: 4, column: 10 });
    }

    #[test]
    fn parses_compact_sequences_of_mappings() {
        let src = "env:\n  - name: FOO\n    value: '1'\n  - name: BAR\n    value: \"2\"\n";
        let parsed = parse(src).unwrap();
        let env = parsed.nodes[parsed.root.0].get("env").unwrap();
        let items = parsed.nodes[env.0].items().to_vec();
        assert_eq!(items.len(), 2);
        let second = &parsed.nodes[items[1].0];
        assert_eq!(second.kind(), NodeKind::Mapping);
        let value = second.get("value").unwrap();
        let scalar = parsed.nodes[value.0].as_scalar().unwrap();
        assert_eq!(scalar.value, "2");
        assert_eq!(scalar.style, ScalarStyle::DoubleQuoted);
    }

    #[test]
    fn sequence_may_sit_at_the_parent_key_indentation() {
        let parsed = parse("items:\n- a\n- b\nnext: 1\n").unwrap();
        let root = &parsed.nodes[parsed.root.0];
        let items = root.get("items").unwrap();
        assert_eq!(parsed.nodes[items.0].items().len(), 2);
        assert!(root.get("next").is_some());
    }

    #[test]
    fn decodes_quoted_and_block_scalars() {
        let src = "a: 'it''s'\nb: \"tab\\tnew\\nline\"\nc: |\n  one\n  two\nd: >-\n  folded\n  text\ne:\n";
        let parsed = parse(src).unwrap();
        assert_eq!(scalar_at(&parsed, &["a"]).value, "it's");
        assert_eq!(scalar_at(&parsed, &["b"]).value, "tab\tnew\nline");
        assert_eq!(scalar_at(&parsed, &["c"]).value, "one\ntwo\n");
        assert_eq!(scalar_at(&parsed, &["d"]).value, "folded text");
        let e = scalar_at(&parsed, &["e"]);
        assert!(e.is_empty());
        assert_eq!(e.ty, ScalarType::Null);
    }

    #[test]
    fn folds_multi_line_plain_scalars() {
        let parsed = parse("description: first line\n  second line\nnext: x\n").unwrap();
        assert_eq!(
            scalar_at(&parsed, &["description"]).value,
            "first line second line"
        );
    }

    #[test]
    fn parses_flow_collections() {
        let parsed = parse("args: [--verbose, \"-x\"]\nlabels: {app: web, tier: }\n").unwrap();
        let root = &parsed.nodes[parsed.root.0];
        let args = &parsed.nodes[root.get("args").unwrap().0];
        assert_eq!(args.kind(), NodeKind::Sequence);
        assert!(args.is_flow());
        assert_eq!(args.items().len(), 2);
        let labels = &parsed.nodes[root.get("labels").unwrap().0];
        let tier = labels.get("tier").unwrap();
        assert!(parsed.nodes[tier.0].as_scalar().unwrap().is_empty());
    }

    #[test]
    fn anchors_tags_and_aliases() {
        let src = "base: &base\n  a: 1\nother: *base\ntagged: !!str 42\n";
        let parsed = parse(src).unwrap();
        let root = &parsed.nodes[parsed.root.0];
        let other = &parsed.nodes[root.get("other").unwrap().0];
        assert_eq!(other.alias(), Some("base"));
        assert_eq!(scalar_at(&parsed, &["tagged"]).value, "42");
        assert_eq!(scalar_at(&parsed, &["base", "a"]).ty, ScalarType::Int);
    }

    #[test]
    fn only_the_first_document_is_parsed() {
        let src = "---\na: 1\n---\nb: [unterminated\n";
        let parsed = parse(src).unwrap();
        assert_eq!(&src[parsed.body.clone()], "\na: 1\n");
        assert!(parsed.nodes[parsed.root.0].get("a").is_some());
    }

    #[test]
    fn empty_documents_have_an_empty_root() {
        for src in ["", "---", "# only a comment\n", "---\n"] {
            let parsed = parse(src).unwrap();
            let root = parsed.nodes[parsed.root.0].as_scalar().unwrap();
            assert!(root.is_empty(), "{src:?}");
        }
    }

    #[test]
    fn byte_order_mark_is_not_part_of_the_first_key() {
        let parsed = parse("\u{feff}a: 1\nb:\n  c: 2\n").unwrap();
        assert_eq!(scalar_at(&parsed, &["a"]).value, "1");
        assert_eq!(scalar_at(&parsed, &["b", "c"]).value, "2");
        let a = parsed.nodes[parsed.root.0].get("a").unwrap();
        assert_eq!(parsed.nodes[a.0].position, Position { line: 1, column: 4 });

        let bare = parse("\u{feff}").unwrap();
        assert!(bare.nodes[bare.root.0].as_scalar().unwrap().is_empty());
    }

    #[test]
    fn block_scalar_bodies_start_at_the_whole_line_break() {
        let src = "a: |-\r\n  one\r\n  two\r\nb: 1\r\n";
        let parsed = parse(src).unwrap();
        let a = scalar_at(&parsed, &["a"]);
        assert_eq!(a.value, "one\ntwo");
        let body = a.body.clone().unwrap();
        assert_eq!(&src[body], "\r\n  one\r\n  two");
        assert_eq!(scalar_at(&parsed, &["b"]).value, "1");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("a: 1\n  b: 2\n").is_err());
        assert!(parse("a: 1\na: 2\n").is_err());
        assert!(parse("a: 'open\n").is_err());
        assert!(parse("? complex\n: key\n").is_err());
        let err = parse("a: [1, 2\n").unwrap_err();
        assert_eq!(err.code(), "invalid_yaml");
    }
}
