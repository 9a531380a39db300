//! Parsing and emission of YAML documents.
//!
//! The loader drives `yaml-rust2`'s event parser directly instead of using
//! its stock `YamlLoader`, because the engine needs three things the stock
//! loader hides: duplicate-key detection inside a single source, `<<`
//! merge-key expansion, and our own tree type. Anchors and aliases are
//! resolved here, so the merger downstream never sees them.

use std::collections::HashMap;

use yaml_rust2::emitter::YamlEmitter;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};
use yaml_rust2::yaml::{Hash, Yaml};

use crate::error::{Error, Result};
use crate::node::{Mapping, Node, Scalar};

/// Whether a source has any non-comment content.
///
/// Outside scalar content, whitespace-only lines are comments per the YAML
/// spec, and all full-line comments start with `#`. Sources with no content
/// are skipped during merging so they can be told apart from sources that
/// hold an explicit top-level null.
#[must_use]
pub fn has_content(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    })
}

/// Parse a single YAML document into a [`Node`].
///
/// In strict mode a key defined twice within one mapping is an error; in
/// permissive mode the later value silently wins.
///
/// # Errors
///
/// [`Error::Parse`] for malformed input and [`Error::DuplicateKey`] for
/// strict-mode duplicates.
pub fn parse(text: &str, strict: bool) -> Result<Node> {
    let mut parser = Parser::new_from_str(text);
    let mut builder = TreeBuilder::new(strict);
    parser
        .load(&mut builder, false)
        .map_err(|e| Error::Parse {
            message: e.to_string(),
        })?;
    if let Some(err) = builder.error {
        return Err(err);
    }
    Ok(builder.root.unwrap_or(Node::Null))
}

/// Type a plain scalar string the way the parser would.
///
/// An empty plain scalar is the YAML spelling of null, which is also what
/// an expanded-away `${KEY:""}` reference leaves behind.
pub(crate) fn retype_scalar(text: &str) -> Node {
    if text.is_empty() {
        return Node::Null;
    }
    yaml_to_scalar(Yaml::from_str(text))
}

fn yaml_to_scalar(yaml: Yaml) -> Node {
    match yaml {
        Yaml::Null => Node::Null,
        Yaml::Boolean(b) => Node::Scalar(Scalar::Bool(b)),
        Yaml::Integer(i) => Node::Scalar(Scalar::Int(i)),
        Yaml::Real(s) => {
            let f = match s.as_str() {
                ".inf" | "+.inf" | ".Inf" | "+.Inf" => f64::INFINITY,
                "-.inf" | "-.Inf" => f64::NEG_INFINITY,
                ".nan" | ".NaN" => f64::NAN,
                _ => match s.parse() {
                    Ok(f) => f,
                    Err(_) => return Node::Scalar(Scalar::Str(s)),
                },
            };
            Node::Scalar(Scalar::Float(f))
        }
        Yaml::String(s) => Node::Scalar(Scalar::Str(s)),
        _ => Node::Null,
    }
}

/// Builder that assembles [`Node`] trees from parser events.
struct TreeBuilder {
    strict: bool,
    stack: Vec<Frame>,
    anchors: HashMap<usize, Node>,
    root: Option<Node>,
    error: Option<Error>,
}

enum Frame {
    Sequence {
        aid: usize,
        items: Vec<Node>,
    },
    Mapping {
        aid: usize,
        entries: Vec<(Node, Option<Node>)>,
    },
}

impl TreeBuilder {
    fn new(strict: bool) -> Self {
        TreeBuilder {
            strict,
            stack: Vec::new(),
            anchors: HashMap::new(),
            root: None,
            error: None,
        }
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn push_complete(&mut self, node: Node) {
        match self.stack.last_mut() {
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping { entries, .. }) => {
                if let Some((_, value)) = entries.last_mut() {
                    if value.is_none() {
                        *value = Some(node);
                        return;
                    }
                }
                entries.push((node, None));
            }
        }
    }

    /// Resolve a `!!`-tagged plain scalar the way the stock loader does.
    fn tagged_scalar(value: String, handle: &str, suffix: &str) -> Result<Node> {
        if handle != "tag:yaml.org,2002:" {
            return Ok(Node::Scalar(Scalar::Str(value)));
        }
        let mismatch = |value: &str, suffix: &str| Error::Parse {
            message: format!("invalid {suffix} scalar {value:?}"),
        };
        match suffix {
            "bool" => value
                .parse::<bool>()
                .map(|b| Node::Scalar(Scalar::Bool(b)))
                .map_err(|_| mismatch(&value, "bool")),
            "int" => value
                .parse::<i64>()
                .map(|i| Node::Scalar(Scalar::Int(i)))
                .map_err(|_| mismatch(&value, "int")),
            "float" => value
                .parse::<f64>()
                .map(|f| Node::Scalar(Scalar::Float(f)))
                .map_err(|_| mismatch(&value, "float")),
            "null" => match value.as_str() {
                "~" | "null" | "" => Ok(Node::Null),
                _ => Err(mismatch(&value, "null")),
            },
            _ => Ok(Node::Scalar(Scalar::Str(value))),
        }
    }

    /// Turn collected entries into a mapping: validate keys, enforce the
    /// duplicate policy, and expand `<<` merge keys.
    fn finish_mapping(&mut self, entries: Vec<(Node, Option<Node>)>) -> Result<Node> {
        let mut mapping = Mapping::new();
        let mut merges: Vec<Node> = Vec::new();
        for (key, value) in entries {
            let value = value.unwrap_or(Node::Null);
            let key = match key {
                Node::Scalar(s) => s,
                other => {
                    return Err(Error::Parse {
                        message: format!("unsupported {} mapping key", other.describe()),
                    })
                }
            };
            if matches!(&key, Scalar::Str(s) if s == "<<") {
                if !merges.is_empty() && self.strict {
                    return Err(Error::DuplicateKey { key: "<<".into() });
                }
                merges.push(value);
                continue;
            }
            if mapping.insert(key.clone(), value).is_some() && self.strict {
                return Err(Error::DuplicateKey {
                    key: key.to_string(),
                });
            }
        }
        for merge in merges {
            apply_merge_key(&mut mapping, merge)?;
        }
        Ok(Node::Mapping(mapping))
    }

    fn record_anchor(&mut self, aid: usize, node: &Node) {
        if aid > 0 {
            self.anchors.insert(aid, node.clone());
        }
    }
}

/// Lay the entries of a `<<` value under the explicit keys of `mapping`.
///
/// Explicit keys always win; within a sequence of merge mappings, earlier
/// entries win over later ones.
fn apply_merge_key(mapping: &mut Mapping, merge: Node) -> Result<()> {
    match merge {
        Node::Mapping(merged) => {
            for (key, value) in merged {
                if !mapping.contains_key(&key) {
                    mapping.insert(key, value);
                }
            }
            Ok(())
        }
        Node::Sequence(items) => {
            for item in items {
                apply_merge_key(mapping, item)?;
            }
            Ok(())
        }
        other => Err(Error::Parse {
            message: format!("merge key requires a mapping, found a {}", other.describe()),
        }),
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, event: Event, _marker: Marker) {
        if self.error.is_some() {
            return;
        }
        match event {
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}
            Event::Scalar(value, style, aid, tag) => {
                let node = if style != TScalarStyle::Plain {
                    Ok(Node::Scalar(Scalar::Str(value)))
                } else if let Some(tag) = &tag {
                    Self::tagged_scalar(value, &tag.handle, &tag.suffix)
                } else {
                    Ok(retype_scalar(&value))
                };
                match node {
                    Ok(node) => {
                        self.record_anchor(aid, &node);
                        self.push_complete(node);
                    }
                    Err(err) => self.fail(err),
                }
            }
            Event::SequenceStart(aid, _) => self.stack.push(Frame::Sequence {
                aid,
                items: Vec::new(),
            }),
            Event::SequenceEnd => {
                let Some(Frame::Sequence { aid, items }) = self.stack.pop() else {
                    self.fail(Error::Parse {
                        message: "unbalanced sequence end".into(),
                    });
                    return;
                };
                let node = Node::Sequence(items);
                self.record_anchor(aid, &node);
                self.push_complete(node);
            }
            Event::MappingStart(aid, _) => self.stack.push(Frame::Mapping {
                aid,
                entries: Vec::new(),
            }),
            Event::MappingEnd => {
                let Some(Frame::Mapping { aid, entries }) = self.stack.pop() else {
                    self.fail(Error::Parse {
                        message: "unbalanced mapping end".into(),
                    });
                    return;
                };
                match self.finish_mapping(entries) {
                    Ok(node) => {
                        self.record_anchor(aid, &node);
                        self.push_complete(node);
                    }
                    Err(err) => self.fail(err),
                }
            }
            Event::Alias(aid) => match self.anchors.get(&aid) {
                Some(node) => {
                    let node = node.clone();
                    self.push_complete(node);
                }
                None => self.fail(Error::Parse {
                    message: "alias references an unknown anchor".into(),
                }),
            },
        }
    }
}

/// Serialize a tree back into YAML text.
///
/// # Errors
///
/// [`Error::Parse`] when the emitter rejects the tree.
pub fn emit(node: &Node) -> Result<String> {
    let yaml = node_to_yaml(node);
    let mut out = String::new();
    let mut emitter = YamlEmitter::new(&mut out);
    emitter.dump(&yaml).map_err(|e| Error::Parse {
        message: format!("couldn't serialize YAML: {e}"),
    })?;
    out.push('\n');
    Ok(out)
}

fn node_to_yaml(node: &Node) -> Yaml {
    match node {
        Node::Null => Yaml::Null,
        Node::Scalar(Scalar::Str(s)) => Yaml::String(s.clone()),
        Node::Scalar(Scalar::Int(i)) => Yaml::Integer(*i),
        // {:?} keeps the decimal point, so the text re-parses as a float.
        Node::Scalar(Scalar::Float(f)) => Yaml::Real(format!("{f:?}")),
        Node::Scalar(Scalar::Bool(b)) => Yaml::Boolean(*b),
        Node::Sequence(items) => Yaml::Array(items.iter().map(node_to_yaml).collect()),
        Node::Mapping(entries) => {
            let mut hash = Hash::new();
            for (key, value) in entries.iter() {
                hash.insert(node_to_yaml(&Node::Scalar(key.clone())), node_to_yaml(value));
            }
            Yaml::Hash(hash)
        }
    }
}
