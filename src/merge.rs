//! Deep-merging of configuration trees.
//!
//! Mappings merge key-by-key, sequences and scalars are replaced wholesale,
//! and an explicitly-null higher layer erases whatever sits below it. In
//! permissive mode a category mismatch silently prefers the higher-priority
//! node; strict mode rejects it.

use crate::error::{Error, Result};
use crate::node::{Mapping, Node};

/// Merge `higher` on top of `lower`, producing a new tree.
///
/// Rules, in order: a null lower layer yields the higher one; an explicitly
/// null higher layer erases the lower one; matching scalars or sequences are
/// replaced by the higher value; matching mappings merge recursively. A
/// category mismatch is an error in strict mode and resolves to `higher`
/// otherwise.
///
/// # Errors
///
/// Returns [`Error::MergeTypeMismatch`] in strict mode when the two nodes
/// have different non-null categories.
pub fn merge(lower: Node, higher: Node, strict: bool) -> Result<Node> {
    match (lower, higher) {
        (Node::Null, higher) => Ok(higher),
        (_, Node::Null) => Ok(Node::Null),
        (Node::Scalar(_), higher @ Node::Scalar(_)) => Ok(higher),
        (Node::Sequence(_), higher @ Node::Sequence(_)) => Ok(higher),
        (Node::Mapping(lower), Node::Mapping(higher)) => {
            merge_mappings(lower, higher, strict).map(Node::Mapping)
        }
        (lower, higher) => {
            if strict {
                Err(Error::MergeTypeMismatch {
                    higher: higher.describe(),
                    lower: lower.describe(),
                })
            } else {
                Ok(higher)
            }
        }
    }
}

/// Fold a series of layers from lowest to highest priority.
///
/// Returns `None` when the iterator is empty. Stops and propagates on the
/// first merge failure.
///
/// # Errors
///
/// Propagates the first [`Error::MergeTypeMismatch`] produced by the fold.
pub fn merge_all<I>(layers: I, strict: bool) -> Result<Option<Node>>
where
    I: IntoIterator<Item = Node>,
{
    let mut merged: Option<Node> = None;
    for layer in layers {
        merged = Some(match merged {
            None => layer,
            Some(lower) => merge(lower, layer, strict)?,
        });
    }
    Ok(merged)
}

fn merge_mappings(lower: Mapping, higher: Mapping, strict: bool) -> Result<Mapping> {
    let mut merged = lower;
    for (key, value) in higher {
        let combined = match merged.get(&key) {
            Some(existing) => merge(existing.clone(), value, strict)?,
            None => value,
        };
        merged.insert(key, combined);
    }
    Ok(merged)
}
