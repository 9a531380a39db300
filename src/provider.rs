//! Provider construction and path-scoped lookup.
//!
//! A provider is built from an ordered list of sources (earliest = lowest
//! priority): each source is screened for content, parsed, escaped when
//! tagged raw, deep-merged, and finally expanded. The original bytes of
//! every source are retained so [`crate::Value::with_default`] can re-run
//! the merge with a new lowest-priority layer underneath them.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::debug;

use crate::cache::Cached;
use crate::error::{Error, Result};
use crate::expand;
use crate::merge;
use crate::node::{Mapping, Node, Scalar};
use crate::ser;
use crate::value::Value;
use crate::yaml;

/// Sentinel path denoting the whole tree.
pub const ROOT: &str = "";

/// The name providers report when none is configured.
const DEFAULT_NAME: &str = "YAML";

pub(crate) type LookupFn = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Internal seam between value handles and the providers backing them.
///
/// Implemented by the merged provider and by the caching wrapper.
pub(crate) trait Backend: Send + Sync {
    /// Provider name reported by `Value::source`.
    fn name(&self) -> &str;

    /// Whether strict-mode rules apply to decoding.
    fn strict(&self) -> bool;

    /// Deep-copied subtree at a dotted path. `None` when the path misses;
    /// `Some(Node::Null)` when it lands on an explicit null.
    fn at(&self, path: &str) -> Option<Node>;

    /// Whether anything is addressable at or below a dotted path.
    ///
    /// Unlike [`Backend::at`], this also sees flattened literal keys that
    /// extend the path (`a.b.s: x` makes `a.b` reachable even when no
    /// nested `a.b` mapping exists), which is what lets the decoder
    /// recurse into struct fields that only dotted keys back.
    fn reaches(&self, path: &str) -> bool;

    /// A new provider with `default` merged underneath the retained
    /// sources, wrapped at `path`.
    fn with_default(&self, path: &str, default: Node) -> Result<Arc<dyn Backend>>;
}

/// One retained source: original bytes plus its expansion tag.
#[derive(Clone)]
struct Raw {
    bytes: Vec<u8>,
    raw: bool,
}

/// The immutable merged provider.
struct Core {
    name: String,
    strict: bool,
    lookup: Option<Arc<LookupFn>>,
    /// `None` marks the distinguished empty provider: no source had any
    /// non-comment content.
    tree: Option<Node>,
    retained: Vec<Raw>,
}

impl Core {
    fn build(
        name: String,
        strict: bool,
        lookup: Option<Arc<LookupFn>>,
        retained: Vec<Raw>,
    ) -> Result<Core> {
        let tree = build_tree(&retained, strict, lookup.as_deref())?;
        if tree.is_none() {
            debug!(sources = retained.len(), "no source had content, provider is empty");
        }
        Ok(Core {
            name,
            strict,
            lookup,
            tree,
            retained,
        })
    }
}

/// Run the merge pipeline over retained sources.
fn build_tree(sources: &[Raw], strict: bool, lookup: Option<&LookupFn>) -> Result<Option<Node>> {
    let mut layers = Vec::with_capacity(sources.len());
    for source in sources {
        let text = std::str::from_utf8(&source.bytes).map_err(|e| Error::Parse {
            message: format!("source is not valid UTF-8: {e}"),
        })?;
        if !yaml::has_content(text) {
            continue;
        }
        let mut layer = yaml::parse(text, strict)?;
        if source.raw && lookup.is_some() {
            expand::escape_node(&mut layer);
        }
        layers.push(layer);
    }

    let merged = merge::merge_all(layers, strict).map_err(|e| match e {
        inner @ Error::MergeTypeMismatch { .. } => Error::Merge {
            source: Box::new(inner),
        },
        other => other,
    })?;
    let Some(mut merged) = merged else {
        return Ok(None);
    };
    if let Some(lookup) = lookup {
        expand::expand_node(&mut merged, lookup)?;
    }
    Ok(Some(merged))
}

/// Resolve a split path against a tree.
///
/// Inside a mapping the longest literal join of the remaining segments is
/// tried first, backtracking to shorter joins, so dotted literal keys win
/// over nested traversal and flattened keys resolve with no nesting at
/// all. Inside a sequence the next segment must be a decimal index.
fn resolve(node: &Node, segments: &[&str]) -> Option<Node> {
    if segments.is_empty() {
        return Some(node.clone());
    }
    match node {
        Node::Mapping(entries) => {
            for take in (1..=segments.len()).rev() {
                let joined = segments[..take].join(".");
                if let Some(child) = entries.get_str(&joined) {
                    if let Some(found) = resolve(child, &segments[take..]) {
                        return Some(found);
                    }
                }
            }
            None
        }
        Node::Sequence(items) => {
            let index: usize = segments[0].parse().ok()?;
            resolve(items.get(index)?, &segments[1..])
        }
        _ => None,
    }
}

/// Whether `segments` resolves to a node or is extended by a flattened
/// literal key (`a.b.s` makes `a.b` reachable).
fn reachable(node: &Node, segments: &[&str]) -> bool {
    if segments.is_empty() {
        return true;
    }
    match node {
        Node::Mapping(entries) => {
            for take in (1..=segments.len()).rev() {
                let joined = segments[..take].join(".");
                if let Some(child) = entries.get_str(&joined) {
                    if reachable(child, &segments[take..]) {
                        return true;
                    }
                }
            }
            let prefix = format!("{}.", segments.join("."));
            entries.iter().any(|(k, _)| k.to_string().starts_with(&prefix))
        }
        Node::Sequence(items) => {
            let Ok(index) = segments[0].parse::<usize>() else {
                return false;
            };
            items
                .get(index)
                .is_some_and(|item| reachable(item, &segments[1..]))
        }
        _ => false,
    }
}

/// Nest a default under the segments of `path`.
fn wrap_at_path(path: &str, default: Node) -> Result<Node> {
    if path.is_empty() {
        return Ok(default);
    }
    let mut node = default;
    for segment in path.rsplit('.') {
        if segment.is_empty() {
            return Err(Error::PathSyntax {
                path: path.to_owned(),
                message: "empty segment cannot address a map key".to_owned(),
            });
        }
        let mut entries = Mapping::new();
        entries.insert(Scalar::Str(segment.to_owned()), node);
        node = Node::Mapping(entries);
    }
    Ok(node)
}

impl Backend for Core {
    fn name(&self) -> &str {
        &self.name
    }

    fn strict(&self) -> bool {
        self.strict
    }

    fn at(&self, path: &str) -> Option<Node> {
        let tree = self.tree.as_ref()?;
        if path.is_empty() {
            return Some(tree.clone());
        }
        let segments: Vec<&str> = path.split('.').collect();
        resolve(tree, &segments)
    }

    fn reaches(&self, path: &str) -> bool {
        let Some(tree) = self.tree.as_ref() else {
            return false;
        };
        if path.is_empty() {
            return true;
        }
        let segments: Vec<&str> = path.split('.').collect();
        reachable(tree, &segments)
    }

    fn with_default(&self, path: &str, default: Node) -> Result<Arc<dyn Backend>> {
        let wrapped = wrap_at_path(path, default)?;
        let bytes = yaml::emit(&wrapped)?.into_bytes();
        debug!(path = %path, "applying default as new lowest-priority source");

        // The serialized default joins as a raw source: its text is data,
        // never subject to expansion.
        let mut retained = Vec::with_capacity(self.retained.len() + 1);
        retained.push(Raw { bytes, raw: true });
        retained.extend(self.retained.iter().cloned());

        Ok(Arc::new(Core::build(
            self.name.clone(),
            self.strict,
            self.lookup.clone(),
            retained,
        )?))
    }
}

enum SourceSpec {
    Reader {
        reader: Box<dyn Read>,
        raw: bool,
    },
    File {
        path: Utf8PathBuf,
        raw: bool,
    },
    Bytes {
        bytes: Vec<u8>,
        raw: bool,
    },
}

/// Assembles a [`Provider`] from ordered sources and options.
///
/// Later sources override earlier ones under the merge rules; strict mode
/// is the default.
pub struct Builder {
    name: String,
    strict: bool,
    lookup: Option<Arc<LookupFn>>,
    sources: Vec<SourceSpec>,
    deferred: Option<Error>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            name: DEFAULT_NAME.to_owned(),
            strict: true,
            lookup: None,
            sources: Vec::new(),
            deferred: None,
        }
    }
}

impl Builder {
    /// Create a builder with no sources, strict mode, and the default name.
    #[must_use]
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Append a source of YAML configuration.
    #[must_use]
    pub fn source(mut self, reader: impl Read + 'static) -> Builder {
        self.sources.push(SourceSpec::Reader {
            reader: Box::new(reader),
            raw: false,
        });
        self
    }

    /// Append a source that bypasses variable expansion: its text reaches
    /// the merged tree verbatim even when expansion is enabled.
    #[must_use]
    pub fn raw_source(mut self, reader: impl Read + 'static) -> Builder {
        self.sources.push(SourceSpec::Reader {
            reader: Box::new(reader),
            raw: true,
        });
        self
    }

    /// Append a file source. The file opens during [`Builder::build`] and
    /// is closed once its bytes are read.
    #[must_use]
    pub fn file(mut self, path: impl AsRef<Path>) -> Builder {
        self.sources.push(SourceSpec::File {
            path: utf8_path(path.as_ref()),
            raw: false,
        });
        self
    }

    /// Append a file source that bypasses variable expansion.
    #[must_use]
    pub fn raw_file(mut self, path: impl AsRef<Path>) -> Builder {
        self.sources.push(SourceSpec::File {
            path: utf8_path(path.as_ref()),
            raw: true,
        });
        self
    }

    /// Serialize an in-memory value and append it as a source.
    ///
    /// Serialization happens immediately; a failure is reported by
    /// [`Builder::build`].
    #[must_use]
    pub fn static_source<T: Serialize + ?Sized>(mut self, value: &T) -> Builder {
        match ser::to_node(value).and_then(|node| yaml::emit(&node)) {
            Ok(text) => self.sources.push(SourceSpec::Bytes {
                bytes: text.into_bytes(),
                raw: false,
            }),
            Err(err) => self.deferred = self.deferred.or(Some(err)),
        }
        self
    }

    /// Enable variable expansion with the given lookup, applied to every
    /// source not tagged raw.
    #[must_use]
    pub fn expand(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Builder {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    /// Disable strict mode: allow duplicate keys within a source,
    /// type-mismatched merges, and extra keys during decoding.
    #[must_use]
    pub fn permissive(mut self) -> Builder {
        self.strict = false;
        self
    }

    /// Set the provider name reported by `Value::source`.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Builder {
        self.name = name.into();
        self
    }

    /// Read every source and run the merge pipeline.
    ///
    /// # Errors
    ///
    /// Any deferred option failure, I/O failure, parse failure, strict
    /// duplicate key, merge mismatch, or expansion failure.
    pub fn build(self) -> Result<Provider> {
        if let Some(err) = self.deferred {
            return Err(err);
        }

        let mut retained = Vec::with_capacity(self.sources.len());
        for (position, spec) in self.sources.into_iter().enumerate() {
            retained.push(read_source(position, spec)?);
        }

        debug!(sources = retained.len(), strict = self.strict, "building provider");
        let core = Core::build(self.name, self.strict, self.lookup, retained)?;
        Ok(Provider {
            backend: Arc::new(core),
        })
    }
}

fn utf8_path(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()))
}

fn read_source(position: usize, spec: SourceSpec) -> Result<Raw> {
    match spec {
        SourceSpec::Reader { mut reader, raw } => {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes).map_err(|e| Error::Io {
                name: format!("source #{position}"),
                source: e,
            })?;
            Ok(Raw { bytes, raw })
        }
        SourceSpec::File { path, raw } => {
            let bytes = std::fs::read(&path).map_err(|e| Error::Io {
                name: path.to_string(),
                source: e,
            })?;
            debug!(path = %path, bytes = bytes.len(), "read configuration file");
            Ok(Raw { bytes, raw })
        }
        SourceSpec::Bytes { bytes, raw } => Ok(Raw { bytes, raw }),
    }
}

/// The immutable result of merging sources.
///
/// Cheap to clone; safe for concurrent reads. All queries go through
/// [`Provider::get`], which returns a path-scoped [`Value`] without
/// touching the tree.
#[derive(Clone)]
pub struct Provider {
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.backend.name())
            .finish()
    }
}

impl Provider {
    /// Start building a provider.
    #[must_use]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// The configured provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// A value handle scoped to `path` ([`ROOT`] for the whole tree).
    #[must_use]
    pub fn get(&self, path: &str) -> Value {
        Value::new(self.backend.clone(), path)
    }

    /// Combine already-built providers into one, later members taking
    /// priority, under the usual merge rules.
    ///
    /// Each member's tree joins the merge as a serialized source, so an
    /// explicitly-null member erases everything below it and defaults
    /// applied later sit underneath every member. The group is strict only
    /// when every member is.
    ///
    /// # Errors
    ///
    /// The same merge failures as building from the equivalent sources.
    pub fn group(
        name: impl Into<String>,
        members: impl IntoIterator<Item = Provider>,
    ) -> Result<Provider> {
        let mut strict = true;
        let mut retained = Vec::new();
        for member in members {
            strict &= member.backend.strict();
            if let Some(tree) = member.backend.at(ROOT) {
                retained.push(Raw {
                    bytes: yaml::emit(&tree)?.into_bytes(),
                    raw: true,
                });
            }
        }
        let core = Core::build(name.into(), strict, None, retained)?;
        Ok(Provider {
            backend: Arc::new(core),
        })
    }

    /// A provider that memoizes subtree lookups.
    ///
    /// Reads take a shared guard; a miss takes an exclusive guard to store
    /// the computed subtree. Lookups are pure, so the occasional duplicate
    /// computation under contention is harmless.
    #[must_use]
    pub fn cached(&self) -> Provider {
        Provider {
            backend: Arc::new(Cached::new(self.backend.clone())),
        }
    }
}
