// scalar.rs — Scalar typing and canonical re-encoding.
//
// Values written by a patch are always re-encoded canonically, regardless of
// how the previous value was written: booleans, numbers and null bare,
// strings bare when that reads back as the same string, single-quoted when
// it would not, as a `|` literal block when they span lines, and
// double-quoted when they carry characters no other style can hold.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::YamlError;

/// Primitive type a scalar resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Null,
    Bool,
    Int,
    Float,
    String,
}

/// A value to write into a scalar slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Number(n) => write!(f, "{n}"),
            ScalarValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl TryFrom<&serde_json::Value> for ScalarValue {
    type Error = YamlError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Null => Ok(ScalarValue::Null),
            serde_json::Value::Bool(b) => Ok(ScalarValue::Bool(*b)),
            serde_json::Value::Number(n) => Ok(ScalarValue::Number(n.clone())),
            serde_json::Value::String(s) => Ok(ScalarValue::String(s.clone())),
            serde_json::Value::Array(_) => Err(YamlError::UnsupportedValue(
                "arrays cannot be set as a field value".to_string(),
            )),
            serde_json::Value::Object(_) => Err(YamlError::UnsupportedValue(
                "objects cannot be set as a field value".to_string(),
            )),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::String(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::String(s)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Bool(b)
    }
}

impl From<i64> for ScalarValue {
    fn from(n: i64) -> Self {
        ScalarValue::Number(n.into())
    }
}

static NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(~|null|Null|NULL)$").expect("static regex is valid"));

static BOOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(true|True|TRUE|false|False|FALSE)$").expect("static regex is valid")
});

static INT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^[-+]?(0|[1-9][0-9_]*)$",
        r"|^0o[0-7]+$",
        r"|^[-+]?0x[0-9a-fA-F_]+$",
        r"|^[-+]?0b[01_]+$",
        r"|^[-+]?0[0-7_]+$",
        r"|^[-+]?[1-9][0-9_]*(:[0-5]?[0-9])+$",
    ))
    .expect("static regex is valid")
});

static FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^[-+]?([0-9][0-9_]*)?\.[0-9_]*([eE][-+]?[0-9]+)?$",
        r"|^[-+]?[0-9][0-9_]*[eE][-+]?[0-9]+$",
        r"|^[-+]?[0-9][0-9_]*(:[0-5]?[0-9])+\.[0-9_]*$",
        r"|^[-+]?\.(inf|Inf|INF)$",
        r"|^\.(nan|NaN|NAN)$",
    ))
    .expect("static regex is valid")
});

/// YAML 1.1 spellings that older readers still resolve to non-strings.
static LEGACY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(y|Y|yes|Yes|YES|n|N|no|No|NO|on|On|ON|off|Off|OFF|<<|=)$",
        r"|^[0-9]{4}-[0-9]{1,2}-[0-9]{1,2}([Tt ]|$)",
    ))
    .expect("static regex is valid")
});

/// Resolve the type of a plain (unquoted) scalar.
pub fn resolve_plain(text: &str) -> ScalarType {
    if text.is_empty() || NULL.is_match(text) {
        ScalarType::Null
    } else if BOOL.is_match(text) {
        ScalarType::Bool
    } else if INT.is_match(text) {
        ScalarType::Int
    } else if FLOAT.is_match(text)
        && text.contains(|c: char| c.is_ascii_digit() || c == 'n' || c == 'N')
    {
        ScalarType::Float
    } else {
        ScalarType::String
    }
}

/// Where an encoded scalar is going to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EncodeContext {
    /// Block context; `indent` is the column literal block lines start at.
    Block { indent: usize },
    Flow,
}

/// An encoded scalar: the token written in place of the old value, plus the
/// indented content lines when the token is a block scalar header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Encoded {
    pub token: String,
    pub body: Option<String>,
}

impl Encoded {
    fn inline(token: String) -> Self {
        Self { token, body: None }
    }
}

pub(crate) fn encode(value: &ScalarValue, ctx: EncodeContext) -> Encoded {
    match value {
        ScalarValue::Null => Encoded::inline("null".to_string()),
        ScalarValue::Bool(b) => Encoded::inline(b.to_string()),
        ScalarValue::Number(n) => Encoded::inline(n.to_string()),
        ScalarValue::String(s) => encode_string(s, ctx),
    }
}

/// Encode a mapping key. Keys never use block styles.
pub(crate) fn encode_key(key: &str) -> String {
    if is_plain_safe(key, false) {
        key.to_string()
    } else if key.chars().any(needs_escape) || key.contains('\n') {
        double_quoted(key)
    } else {
        single_quoted(key)
    }
}

fn encode_string(s: &str, ctx: EncodeContext) -> Encoded {
    let flow = ctx == EncodeContext::Flow;
    if is_plain_safe(s, flow) {
        return Encoded::inline(s.to_string());
    }
    if s.chars().any(needs_escape) {
        return Encoded::inline(double_quoted(s));
    }
    if s.contains('\n') {
        return match ctx {
            EncodeContext::Block { indent } if literal_fits(s) => literal(s, indent),
            _ => Encoded::inline(double_quoted(s)),
        };
    }
    Encoded::inline(single_quoted(s))
}

fn is_plain_safe(s: &str, flow: bool) -> bool {
    if s.is_empty() || s.trim() != s {
        return false;
    }
    if s.starts_with([
        '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@',
        '`',
    ]) {
        return false;
    }
    if s.contains(": ") || s.ends_with(':') || s.contains(" #") || s.contains(['\t', '\'', '"']) {
        return false;
    }
    if flow && s.contains([',', '[', ']', '{', '}', ':']) {
        return false;
    }
    if s.chars().any(|c| c == '\n' || needs_escape(c)) {
        return false;
    }
    resolve_plain(s) == ScalarType::String && !LEGACY.is_match(s)
}

/// Characters only a double-quoted scalar can carry.
fn needs_escape(c: char) -> bool {
    (c.is_control() && c != '\n') || matches!(c, '\u{feff}' | '\u{2028}' | '\u{2029}')
}

/// Whether a multi-line string reads back unchanged from a `|` block.
fn literal_fits(s: &str) -> bool {
    let content = s.trim_end_matches('\n');
    if content.is_empty() {
        return false;
    }
    let first_line = content.split('\n').find(|line| !line.is_empty());
    if first_line.is_some_and(|line| line.starts_with(' ')) {
        return false;
    }
    !content
        .split('\n')
        .any(|line| !line.is_empty() && line.trim().is_empty())
}

fn literal(s: &str, indent: usize) -> Encoded {
    let (content, chomp) = match s.strip_suffix('\n') {
        Some(rest) if rest.ends_with('\n') => (rest, "+"),
        Some(rest) => (rest, ""),
        None => (s, "-"),
    };
    let pad = " ".repeat(indent);
    let body = content
        .split('\n')
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    Encoded {
        token: format!("|{chomp}"),
        body: Some(body),
    }
}

fn single_quoted(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if (c as u32) < 0x100 && needs_escape(c) => {
                out.push_str(&format!("\\x{:02X}", c as u32));
            }
            c if needs_escape(c) => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(value: impl Into<ScalarValue>) -> Encoded {
        encode(&value.into(), EncodeContext::Block { indent: 2 })
    }

    #[test]
    fn resolves_plain_types() {
        assert_eq!(resolve_plain(""), ScalarType::Null);
        assert_eq!(resolve_plain("~"), ScalarType::Null);
        assert_eq!(resolve_plain("True"), ScalarType::Bool);
        assert_eq!(resolve_plain("42"), ScalarType::Int);
        assert_eq!(resolve_plain("0x1F"), ScalarType::Int);
        assert_eq!(resolve_plain("1.5e3"), ScalarType::Float);
        assert_eq!(resolve_plain(".inf"), ScalarType::Float);
        assert_eq!(resolve_plain("."), ScalarType::String);
        assert_eq!(resolve_plain("0.1.0"), ScalarType::String);
        assert_eq!(resolve_plain("test.example.com:latest"), ScalarType::String);
    }

    #[test]
    fn primitives_are_bare() {
        assert_eq!(block(true).token, "true");
        assert_eq!(block(42).token, "42");
        assert_eq!(block(ScalarValue::Null).token, "null");
        let float = ScalarValue::Number(serde_json::Number::from_f64(1.5).unwrap());
        assert_eq!(block(float).token, "1.5");
    }

    #[test]
    fn safe_strings_stay_plain() {
        assert_eq!(block("0.2.0").token, "0.2.0");
        assert_eq!(block("test.example.com:0.1.0").token, "test.example.com:0.1.0");
        assert_eq!(block("hello world").token, "hello world");
    }

    #[test]
    fn strings_that_would_change_type_are_quoted() {
        assert_eq!(block("42").token, "'42'");
        assert_eq!(block("true").token, "'true'");
        assert_eq!(block("yes").token, "'yes'");
        assert_eq!(block("null").token, "'null'");
        assert_eq!(block("").token, "''");
        assert_eq!(block("2024-01-02").token, "'2024-01-02'");
    }

    #[test]
    fn indicators_force_single_quotes() {
        assert_eq!(block("!better quote this").token, "'!better quote this'");
        assert_eq!(block("single's quote").token, "'single''s quote'");
        assert_eq!(block("a: b").token, "'a: b'");
        assert_eq!(block("- item").token, "'- item'");
        assert_eq!(block(" padded").token, "' padded'");
    }

    #[test]
    fn multi_line_strings_become_literal_blocks() {
        let encoded = block("A longer string\nwith a newline");
        assert_eq!(encoded.token, "|-");
        assert_eq!(
            encoded.body.as_deref(),
            Some("  A longer string\n  with a newline")
        );

        let clipped = block("line one\n\nline three\n");
        assert_eq!(clipped.token, "|");
        assert_eq!(clipped.body.as_deref(), Some("  line one\n\n  line three"));
    }

    #[test]
    fn control_characters_use_double_quotes() {
        assert_eq!(block("tab\there").token, "\"tab\\there\"");
        assert_eq!(block("bell\u{7}").token, "\"bell\\x07\"");
        assert_eq!(block("  indented\nfirst").token, "\"  indented\\nfirst\"");
    }

    #[test]
    fn flow_context_avoids_blocks_and_flow_indicators() {
        let flow = |s: &str| encode(&ScalarValue::from(s), EncodeContext::Flow).token;
        assert_eq!(flow("plain"), "plain");
        assert_eq!(flow("a,b"), "'a,b'");
        assert_eq!(flow("two\nlines"), "\"two\\nlines\"");
    }

    #[test]
    fn keys_are_quoted_only_when_needed() {
        assert_eq!(encode_key("image"), "image");
        assert_eq!(encode_key("8080"), "'8080'");
        assert_eq!(encode_key("a\nb"), "\"a\\nb\"");
    }

    #[test]
    fn json_containers_are_rejected() {
        let err = ScalarValue::try_from(&serde_json::json!([1, 2])).unwrap_err();
        assert_eq!(err.code(), "unsupported_value");
        assert!(ScalarValue::try_from(&serde_json::json!({"a": 1})).is_err());
        assert_eq!(
            ScalarValue::try_from(&serde_json::json!("x")).unwrap(),
            ScalarValue::from("x")
        );
    }
}
