// tree.rs — The document tree.
//
// Nodes live in an arena owned by the `Document` and refer to each other by
// `NodeId`. Every node remembers the byte range it occupies in the source
// text. Comments, blank lines and quoting are never stored in the tree; they
// stay in the source text, which is only ever changed by splicing the byte
// range of the node being mutated. Anything outside that range survives a
// mutation byte for byte.

use std::fmt;
use std::ops::Range;

use serde::Serialize;

use crate::scalar::ScalarType;

/// Index of a node in its document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// 1-based line and column of a node in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Mapping,
    Sequence,
    Scalar,
    Alias,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Mapping => "mapping",
            NodeKind::Sequence => "sequence",
            NodeKind::Scalar => "scalar",
            NodeKind::Alias => "alias",
        };
        f.write_str(name)
    }
}

/// Lexical style a scalar was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

/// A scalar as read from the source.
#[derive(Debug, Clone)]
pub struct Scalar {
    /// The decoded value (quotes removed, escapes resolved, lines folded).
    pub value: String,
    pub style: ScalarStyle,
    pub ty: ScalarType,
    /// Content lines of a block scalar, from the end of the header line to
    /// the end of the last non-blank content line.
    pub(crate) body: Option<Range<usize>>,
}

impl Scalar {
    /// An implicit null: `key:` with nothing after it.
    pub fn is_empty(&self) -> bool {
        self.style == ScalarStyle::Plain && self.value.is_empty()
    }
}

/// One `key: value` pair of a mapping.
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: String,
    pub value: NodeId,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Mapping(Vec<Entry>),
    Sequence(Vec<NodeId>),
    Scalar(Scalar),
    Alias(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) data: NodeData,
    /// The bytes a replacement overwrites. For scalars this is the value
    /// token (or block scalar header); for collections the whole node.
    pub(crate) span: Range<usize>,
    /// End of everything the node owns, including block scalar bodies.
    pub(crate) end: usize,
    pub(crate) position: Position,
    /// Column of the entries of a block collection.
    pub(crate) indent: usize,
    /// Indentation of the collection this node is a child of; -1 for the root.
    pub(crate) parent_indent: isize,
    /// Whether the node sits inside a flow collection (`[...]`, `{...}`).
    pub(crate) flow: bool,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Mapping(_) => NodeKind::Mapping,
            NodeData::Sequence(_) => NodeKind::Sequence,
            NodeData::Scalar(_) => NodeKind::Scalar,
            NodeData::Alias(_) => NodeKind::Alias,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Whether this node is written in flow style or nested inside one.
    pub fn is_flow(&self) -> bool {
        self.flow
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.data {
            NodeData::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Anchor name of an alias node (`*name`).
    pub fn alias(&self) -> Option<&str> {
        match &self.data {
            NodeData::Alias(name) => Some(name),
            _ => None,
        }
    }

    /// Mapping entries in document order; empty for other kinds.
    pub fn entries(&self) -> &[Entry] {
        match &self.data {
            NodeData::Mapping(entries) => entries,
            _ => &[],
        }
    }

    /// Sequence items in document order; empty for other kinds.
    pub fn items(&self) -> &[NodeId] {
        match &self.data {
            NodeData::Sequence(items) => items,
            _ => &[],
        }
    }

    /// Value of `key` when this node is a mapping.
    pub fn get(&self, key: &str) -> Option<NodeId> {
        self.entries()
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value)
    }

    /// Indentation for content nested one level below this node's owner.
    pub(crate) fn child_indent(&self) -> usize {
        if self.parent_indent < 0 {
            0
        } else {
            self.parent_indent as usize + 2
        }
    }
}
