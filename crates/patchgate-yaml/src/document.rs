// document.rs — A parsed YAML document that can be patched in place.
//
// Mutations never re-serialize the tree. Each one is turned into a set of
// text edits against the source, the edits are applied back to front, and
// the result is parsed again so the tree always describes the current text.

use std::ops::Range;

use tracing::debug;

use crate::error::YamlError;
use crate::parser::{self, Parsed};
use crate::path::PathExpr;
use crate::resolve::{self, Target, Vacancy};
use crate::scalar::{self, EncodeContext, ScalarValue};
use crate::tree::{Node, NodeId, NodeKind};

/// A YAML document together with its source text.
#[derive(Debug, Clone)]
pub struct Document {
    source: String,
    nodes: Vec<Node>,
    root: NodeId,
    body: Range<usize>,
}

/// A text replacement; `order` breaks ties between edits at the same offset.
struct Edit {
    range: Range<usize>,
    text: String,
    order: usize,
}

impl Document {
    /// Parse the first document of `source`. Later documents are kept
    /// verbatim but are not addressable.
    pub fn parse(source: impl Into<String>) -> Result<Self, YamlError> {
        let source = source.into();
        let Parsed { nodes, root, body } = parser::parse(&source)?;
        Ok(Self {
            source,
            nodes,
            root,
            body,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node by id. Ids are only valid until the next mutation.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Byte range of the first document's content.
    pub fn body(&self) -> Range<usize> {
        self.body.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn into_string(self) -> String {
        self.source
    }

    /// Nodes matching `path`, in document order.
    pub fn find(&self, path: &PathExpr) -> Result<Vec<NodeId>, YamlError> {
        Ok(resolve::resolve(self, path, false)?
            .into_iter()
            .filter_map(|target| match target {
                Target::Node(id) => Some(id),
                Target::Vacant(_) => None,
            })
            .collect())
    }

    /// Parse `path` and set the scalar(s) it addresses to `value`.
    ///
    /// See [`Document::set_path`].
    pub fn set_field(
        &mut self,
        path: &str,
        value: &ScalarValue,
        create: bool,
    ) -> Result<usize, YamlError> {
        let expr: PathExpr = path.parse()?;
        self.set_path(&expr, value, create)
    }

    /// Set the scalar(s) addressed by `path` to `value` and return how many
    /// were written.
    ///
    /// A path with a filter segment sets every element it matches; any other
    /// path must address exactly one scalar. With `create`, missing keys are
    /// added as nested block mappings; existing siblings are left untouched.
    pub fn set_path(
        &mut self,
        path: &PathExpr,
        value: &ScalarValue,
        create: bool,
    ) -> Result<usize, YamlError> {
        let targets = resolve::resolve(self, path, create)?;
        if targets.is_empty() {
            return Err(YamlError::PathNotFound {
                path: path.to_string(),
            });
        }
        if targets.len() > 1 && !path.has_filter() {
            return Err(YamlError::AmbiguousPath {
                path: path.to_string(),
                matches: targets.len(),
            });
        }

        let mut edits = Vec::new();
        for target in &targets {
            match target {
                Target::Node(id) => self.scalar_edits(*id, path, value, &mut edits)?,
                Target::Vacant(vacancy) => edits.push(self.vacancy_edit(vacancy, value, &edits)),
            }
        }
        edits.sort_by(|a, b| {
            b.range
                .start
                .cmp(&a.range.start)
                .then(b.order.cmp(&a.order))
        });

        let mut text = self.source.clone();
        for edit in edits {
            text.replace_range(edit.range, &edit.text);
        }
        *self = Document::parse(text).map_err(|err| YamlError::Rewrite(err.to_string()))?;

        debug!(path = %path, targets = targets.len(), "document patched");
        Ok(targets.len())
    }

    /// Offset of the line following the one containing `offset`, or the end
    /// of the text when that line is the last one.
    pub(crate) fn line_after(&self, offset: usize) -> usize {
        match self.source[offset..].find('\n') {
            Some(i) => offset + i + 1,
            None => self.source.len(),
        }
    }

    /// The line break the document already uses, judged by its first line.
    fn line_break(&self) -> &'static str {
        match self.source.find('\n') {
            Some(i) if i > 0 && self.source.as_bytes()[i - 1] == b'\r' => "\r\n",
            _ => "\n",
        }
    }

    fn end_of_line(&self, offset: usize) -> usize {
        match self.source[offset..].find('\n') {
            Some(i) => {
                let eol = offset + i;
                if eol > 0 && self.source.as_bytes()[eol - 1] == b'\r' {
                    eol - 1
                } else {
                    eol
                }
            }
            None => self.source.len(),
        }
    }

    fn scalar_edits(
        &self,
        id: NodeId,
        path: &PathExpr,
        value: &ScalarValue,
        edits: &mut Vec<Edit>,
    ) -> Result<(), YamlError> {
        let node = self.node(id);
        let Some(old) = node.as_scalar() else {
            return Err(YamlError::NotScalar {
                path: path.to_string(),
                kind: node.kind(),
                position: node.position(),
            });
        };

        let ctx = if node.is_flow() {
            EncodeContext::Flow
        } else {
            EncodeContext::Block {
                indent: node.child_indent().max(2),
            }
        };
        let encoded = scalar::encode(value, ctx);
        let nl = self.line_break();

        let span = node.span.clone();
        let before = self.source[..span.start].trim_end_matches([' ', '\t']);
        let prefix = if !span.is_empty() {
            ""
        } else if node.is_flow() && !before.ends_with(':') {
            ": "
        } else if before.len() == span.start {
            " "
        } else {
            ""
        };
        let order = edits.len();
        edits.push(Edit {
            range: span.clone(),
            text: format!("{prefix}{}", encoded.token),
            order,
        });

        let body_edit = match (&old.body, encoded.body) {
            (Some(range), Some(body)) => {
                Some((range.clone(), format!("{nl}{}", body.replace('\n', nl))))
            }
            (Some(range), None) => Some((range.clone(), String::new())),
            (None, Some(body)) => {
                let eol = self.end_of_line(node.end.max(span.end));
                Some((eol..eol, format!("{nl}{}", body.replace('\n', nl))))
            }
            (None, None) => None,
        };
        if let Some((range, text)) = body_edit {
            edits.push(Edit {
                range,
                text,
                order: order + 1,
            });
        }
        Ok(())
    }

    fn vacancy_edit(&self, vacancy: &Vacancy, value: &ScalarValue, edits: &[Edit]) -> Edit {
        let nl = self.line_break();
        let mut text = String::new();
        let before = &self.source[..vacancy.offset];
        if !before.trim_start_matches('\u{feff}').is_empty() && !before.ends_with('\n') {
            text.push_str(nl);
        }

        let last = vacancy.keys.len() - 1;
        for (depth, key) in vacancy.keys.iter().enumerate() {
            let indent = vacancy.indent + 2 * depth;
            text.push_str(&" ".repeat(indent));
            text.push_str(&scalar::encode_key(key));
            text.push(':');
            if depth == last {
                let encoded = scalar::encode(
                    value,
                    EncodeContext::Block {
                        indent: indent + 2,
                    },
                );
                text.push(' ');
                text.push_str(&encoded.token);
                if let Some(body) = encoded.body {
                    text.push_str(nl);
                    text.push_str(&body.replace('\n', nl));
                }
            }
            text.push_str(nl);
        }

        Edit {
            range: vacancy.offset..vacancy.offset,
            text,
            order: edits.len(),
        }
    }

    /// Kind of the node at `id`.
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind()
    }
}
