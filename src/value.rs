//! Path-scoped views onto a provider.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::de;
use crate::error::Result;
use crate::node::Node;
use crate::provider::Backend;
use crate::ser;

/// A lightweight handle onto one path of a provider.
///
/// Handles carry only a provider reference and a dotted path; they are
/// created on demand and are cheap to clone. Every read returns a deep
/// copy, so nothing obtained through a handle can mutate shared state.
#[derive(Clone)]
pub struct Value {
    backend: Arc<dyn Backend>,
    path: String,
}

impl Value {
    pub(crate) fn new(backend: Arc<dyn Backend>, path: &str) -> Value {
        Value {
            backend,
            path: path.to_owned(),
        }
    }

    /// The name of the provider backing this handle.
    #[must_use]
    pub fn source(&self) -> &str {
        self.backend.name()
    }

    /// A handle scoped further into this one. The root sentinel returns
    /// a handle equivalent to `self`.
    #[must_use]
    pub fn get(&self, path: &str) -> Value {
        if path.is_empty() {
            return self.clone();
        }
        Value {
            backend: self.backend.clone(),
            path: de::join(&self.path, path),
        }
    }

    /// Whether the provider holds anything at this path.
    ///
    /// An explicit null is a value: `antique: ~` makes
    /// `get("antique").has_value()` true.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.backend.at(&self.path).is_some()
    }

    /// Decode the subtree at this path into `T`.
    ///
    /// # Errors
    ///
    /// Decoding failures annotated with the offending path; see the
    /// crate-level documentation for the coercion rules.
    pub fn populate<T: DeserializeOwned>(&self) -> Result<T> {
        de::populate(&*self.backend, &self.path)
    }

    /// A new handle whose provider has `default` merged in as the lowest
    /// priority layer at this path.
    ///
    /// Existing sources always override the default, including explicit
    /// nulls, which erase it. Chained calls deep-merge their defaults,
    /// with the most recent call sitting lowest.
    ///
    /// # Errors
    ///
    /// Serialization failures, path syntax failures, and the same merge
    /// failures as provider construction.
    pub fn with_default<T: Serialize + ?Sized>(&self, default: &T) -> Result<Value> {
        let node = ser::to_node(default)?;
        let backend = self.backend.with_default(&self.path, node)?;
        Ok(Value {
            backend,
            path: self.path.clone(),
        })
    }

    /// The keys addressable one level below this handle.
    ///
    /// Sequence indices render as decimal strings; scalars and missing
    /// paths have no children.
    #[must_use]
    pub fn child_keys(&self) -> Vec<String> {
        match self.value() {
            Node::Sequence(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            Node::Mapping(entries) => entries.iter().map(|(k, _)| k.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// A deep copy of the subtree as an opaque tree.
    ///
    /// Routed through [`Value::populate`] into an untyped sink, so
    /// per-index overrides are spliced in and mutations of the returned
    /// tree never affect the provider. Paths with no value (and subtrees
    /// that cannot be represented) come back as [`Node::Null`].
    #[must_use]
    pub fn value(&self) -> Node {
        self.populate().unwrap_or(Node::Null)
    }
}

impl fmt::Display for Value {
    /// Stable printable rendering of [`Value::value`]; null renders as
    /// `<nil>`. Not a wire contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("source", &self.source())
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
