// resolve.rs — Walks a path expression over a parsed document.
//
// Resolution works on sets of nodes so that a filter segment can fan out to
// several sequence elements. When keys are to be created, a missing key turns
// into a `Vacancy`: the place where the missing keys will be written, plus the
// keys still to be written there.

use crate::document::Document;
use crate::error::YamlError;
use crate::path::{PathExpr, Predicate, Segment};
use crate::tree::{NodeId, NodeKind};

/// Where a missing key chain gets inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vacancy {
    /// Byte offset the new lines are inserted at (always a line start, or
    /// the end of the text).
    pub(crate) offset: usize,
    /// Column of the first inserted key.
    pub(crate) indent: usize,
    /// Keys to create, outermost first.
    pub(crate) keys: Vec<String>,
}

impl Vacancy {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// A node a path resolved to, or the place where it would be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(NodeId),
    Vacant(Vacancy),
}

pub(crate) fn resolve(
    doc: &Document,
    path: &PathExpr,
    create: bool,
) -> Result<Vec<Target>, YamlError> {
    let mut current = vec![Target::Node(doc.root())];
    for segment in path.segments() {
        let mut next = Vec::new();
        for target in current {
            match (target, segment) {
                (Target::Vacant(mut vacancy), Segment::Key(key)) => {
                    vacancy.keys.push(key.clone());
                    next.push(Target::Vacant(vacancy));
                }
                (Target::Vacant(_), _) => {
                    return Err(YamlError::CreateUnsupported {
                        path: path.to_string(),
                        reason: "index and filter segments cannot address created keys".into(),
                    })
                }
                (Target::Node(id), Segment::Key(key)) => match doc.node(id).get(key) {
                    Some(child) => next.push(Target::Node(child)),
                    None if create => next.push(Target::Vacant(vacancy(doc, id, key, path)?)),
                    None => {}
                },
                (Target::Node(id), Segment::Index(index)) => {
                    if let Some(child) = doc.node(id).items().get(*index) {
                        next.push(Target::Node(*child));
                    }
                }
                (Target::Node(id), Segment::Filter(predicate)) => next.extend(
                    doc.node(id)
                        .items()
                        .iter()
                        .filter(|item| matches(doc, **item, predicate))
                        .map(|item| Target::Node(*item)),
                ),
            }
        }
        current = next;
    }
    Ok(current)
}

fn matches(doc: &Document, item: NodeId, predicate: &Predicate) -> bool {
    let mut id = item;
    for key in &predicate.field {
        match doc.node(id).get(key) {
            Some(child) => id = child,
            None => return false,
        }
    }
    doc.node(id)
        .as_scalar()
        .is_some_and(|scalar| scalar.value == predicate.value)
}

/// Work out where `key` would be added below the node `id`.
fn vacancy(doc: &Document, id: NodeId, key: &str, path: &PathExpr) -> Result<Vacancy, YamlError> {
    if path.segments().iter().any(Segment::is_positional) {
        return Err(YamlError::CreateUnsupported {
            path: path.to_string(),
            reason: "keys can only be created along paths made of plain keys".into(),
        });
    }

    let node = doc.node(id);
    if node.is_flow() {
        return Err(YamlError::CreateUnsupported {
            path: path.to_string(),
            reason: format!(
                "cannot add key '{key}' inside a flow collection (at {})",
                node.position()
            ),
        });
    }

    let (offset, indent) = match node.kind() {
        NodeKind::Mapping => (doc.line_after(node.end), node.indent),
        NodeKind::Scalar if id == doc.root() && node.as_scalar().is_some_and(|s| s.is_empty()) => {
            (doc.body().end, 0)
        }
        NodeKind::Scalar if node.as_scalar().is_some_and(|s| s.is_empty()) => {
            (doc.line_after(node.end), node.child_indent())
        }
        kind => {
            return Err(YamlError::NotAMapping {
                path: path.to_string(),
                key: key.to_string(),
                kind,
                position: node.position(),
            })
        }
    };

    Ok(Vacancy {
        offset,
        indent,
        keys: vec![key.to_string()],
    })
}
