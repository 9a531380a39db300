//! Read-through caching of subtree lookups.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::node::Node;
use crate::provider::Backend;

/// Wraps a provider and memoizes `at` results per path.
///
/// Readers take the shared guard; a miss computes outside any guard and
/// then takes the exclusive guard to insert. There is no single-flight
/// de-duplication: the same path may be computed more than once under
/// contention, which is fine because lookups are pure.
pub(crate) struct Cached {
    inner: Arc<dyn Backend>,
    name: String,
    entries: RwLock<HashMap<String, Option<Node>>>,
}

impl Cached {
    pub(crate) fn new(inner: Arc<dyn Backend>) -> Cached {
        let name = format!("cached {:?}", inner.name());
        Cached {
            inner,
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Backend for Cached {
    fn name(&self) -> &str {
        &self.name
    }

    fn strict(&self) -> bool {
        self.inner.strict()
    }

    fn at(&self, path: &str) -> Option<Node> {
        if let Ok(entries) = self.entries.read() {
            if let Some(hit) = entries.get(path) {
                return hit.clone();
            }
        }
        let computed = self.inner.at(path);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(path.to_owned(), computed.clone());
        }
        computed
    }

    fn reaches(&self, path: &str) -> bool {
        self.inner.reaches(path)
    }

    fn with_default(&self, path: &str, default: Node) -> Result<Arc<dyn Backend>> {
        // The augmented provider is a fresh tree; callers wrap it again if
        // they want caching on top.
        self.inner.with_default(path, default)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Backend, Cached};
    use crate::error::Result;
    use crate::node::{Node, Scalar};

    struct Counting {
        hits: std::sync::atomic::AtomicUsize,
    }

    impl Backend for Counting {
        fn name(&self) -> &str {
            "YAML"
        }

        fn strict(&self) -> bool {
            true
        }

        fn at(&self, path: &str) -> Option<Node> {
            self.hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            (path == "present").then(|| Node::Scalar(Scalar::Int(1)))
        }

        fn reaches(&self, path: &str) -> bool {
            path == "present"
        }

        fn with_default(&self, _path: &str, _default: Node) -> Result<Arc<dyn Backend>> {
            unimplemented!("not exercised")
        }
    }

    #[test]
    fn repeated_lookups_hit_the_inner_provider_once() {
        let inner = Arc::new(Counting {
            hits: std::sync::atomic::AtomicUsize::new(0),
        });
        let cached = Cached::new(inner.clone());

        for _ in 0..3 {
            assert!(cached.at("present").is_some());
            assert!(cached.at("absent").is_none());
        }
        assert_eq!(inner.hits.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn cached_name_quotes_the_inner_name() {
        let inner = Arc::new(Counting {
            hits: std::sync::atomic::AtomicUsize::new(0),
        });
        assert_eq!(Cached::new(inner).name(), "cached \"YAML\"");
    }
}
