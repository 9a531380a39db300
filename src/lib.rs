//! Layered YAML configuration.
//!
//! `strata` merges an ordered list of YAML sources into one immutable tree
//! and decodes path-scoped fragments of it into typed values with serde.
//! Later sources override earlier ones: mappings deep-merge, sequences and
//! scalars are replaced, and an explicit null erases whatever sits below
//! it.
//!
//! ```
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, PartialEq)]
//! struct Practical {
//!     toyota: String,
//!     honda: String,
//! }
//!
//! # fn main() -> strata::Result<()> {
//! let provider = strata::Provider::builder()
//!     .source("practical: {toyota: camry, honda: accord}".as_bytes())
//!     .source("practical: {honda: civic}".as_bytes())
//!     .build()?;
//!
//! let practical: Practical = provider.get("practical").populate()?;
//! assert_eq!(practical.honda, "civic");
//! assert_eq!(practical.toyota, "camry");
//! # Ok(())
//! # }
//! ```
//!
//! Variable expansion rewrites `$NAME` and `${KEY:DEFAULT}` references in
//! scalar values through a lookup bound at construction; sources appended
//! with [`Builder::raw_source`] keep their text verbatim. Defaults applied
//! through [`Value::with_default`] join the merge as the lowest-priority
//! layer, so existing sources, including explicit nulls, always win.
//!
//! Decoding supports nested structs, homogeneous and fixed-length
//! sequences (with per-index overrides like `a.1: 3` superseding and
//! extending a native sequence at `a`), maps with typed keys, options,
//! enums, `std::time::Duration` fields in `1h30m` form, and untyped
//! [`Node`] sinks. Strict mode, the default, rejects duplicate keys within
//! a source, type-mismatched merges, and source keys with no matching
//! destination field.

mod cache;
mod de;
mod error;
mod expand;
mod merge;
mod node;
mod provider;
mod ser;
mod value;
mod yaml;

pub use error::{Error, ErrorKind, Result};
pub use expand::{escape, Expander, Lookup};
pub use node::{Mapping, Node, Scalar};
pub use provider::{Builder, Provider, ROOT};
pub use value::Value;
