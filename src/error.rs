//! Error types produced by provider construction and decoding.

use std::fmt;

use thiserror::Error;

/// Convenient alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building a provider or decoding values.
///
/// Construction surfaces option application failures, merge failures,
/// expansion failures, and parse failures; queries surface decoding
/// failures annotated with the offending dotted path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A source could not be interpreted as YAML.
    #[error("couldn't parse YAML: {message}")]
    Parse {
        /// Parser diagnostic, including position where available.
        message: String,
    },

    /// Strict mode only: the same key appeared twice within one source.
    #[error("key {key:?} already set in map")]
    DuplicateKey {
        /// String rendering of the repeated key.
        key: String,
    },

    /// Strict mode only: two sources define the same path with
    /// incompatible node categories.
    #[error("can't merge a {higher} into a {lower}")]
    MergeTypeMismatch {
        /// Category of the higher-priority node.
        higher: &'static str,
        /// Category of the lower-priority node.
        lower: &'static str,
    },

    /// A construction step failed; wraps the underlying error with context.
    #[error("couldn't merge YAML sources: {source}")]
    Merge {
        /// The merge or duplicate-key failure that stopped construction.
        #[source]
        source: Box<Error>,
    },

    /// An unbracketed `$NAME` reference had no match in the lookup.
    #[error("undefined variable {name:?}")]
    UndefinedVariable {
        /// The referenced variable name.
        name: String,
    },

    /// A bracketed reference had no match and no usable default.
    #[error("default is empty for {name:?} (use \"\" for empty string)")]
    EmptyDefault {
        /// The referenced variable name.
        name: String,
    },

    /// A path could not be interpreted, e.g. an empty segment where a map
    /// key is required.
    #[error("invalid path {path:?}: {message}")]
    PathSyntax {
        /// The offending path.
        path: String,
        /// What made it invalid.
        message: String,
    },

    /// An empty string appeared as a map key, which cannot be told apart
    /// from the root sentinel.
    #[error("for key {path:?}: empty map key is ambiguous")]
    AmbiguousKey {
        /// Path of the mapping containing the empty key.
        path: String,
    },

    /// A scalar could not be coerced into the destination type.
    #[error("for key {path:?}: can't convert {value:?} to {target}")]
    Coercion {
        /// Path of the scalar.
        path: String,
        /// Rendering of the source value.
        value: String,
        /// Name of the destination type or kind.
        target: String,
    },

    /// The source node's shape cannot populate the destination's shape.
    #[error("for key {path:?}: can't decode a {node} into a {target}")]
    IncompatibleType {
        /// Path of the node.
        path: String,
        /// Category of the source node.
        node: &'static str,
        /// Description of the destination shape.
        target: String,
    },

    /// The destination recursed past the depth guard, indicating a
    /// self-referential destination driven by hostile input.
    #[error("for key {path:?}: cycle detected in destination")]
    Cycle {
        /// Path at which the guard tripped.
        path: String,
    },

    /// Strict mode only: a source key had no matching destination field.
    #[error("for key {path:?}: field {field:?} not found in target struct")]
    ExtraField {
        /// Path of the mapping holding the extra key.
        path: String,
        /// The unmatched key.
        field: String,
    },

    /// A destination's own `Deserialize` implementation reported failure.
    #[error("{message}")]
    Hook {
        /// Message produced by the user implementation.
        message: String,
    },

    /// Reading or opening a source failed.
    #[error("couldn't read source {name:?}: {source}")]
    Io {
        /// Display name of the source (file path or a positional label).
        name: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// The closed set of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Source could not be interpreted as YAML.
    ParseFailure,
    /// Same key defined twice in one source (strict mode).
    DuplicateKey,
    /// Incompatible categories merged (strict mode).
    MergeTypeMismatch,
    /// `$NAME` with no lookup match.
    UndefinedVariable,
    /// `${KEY:…}` with no match and an empty default.
    EmptyDefault,
    /// Malformed path.
    PathSyntax,
    /// Empty string map key.
    AmbiguousKey,
    /// Scalar not coercible to the destination type.
    CoercionFailure,
    /// Node shape cannot populate the destination shape.
    IncompatibleType,
    /// Self-reference in the destination graph.
    Cycle,
    /// Strict decode found a source key with no destination field.
    ExtraField,
    /// User deserialize implementation returned an error.
    HookFailure,
    /// Reading or opening a source failed.
    IO,
}

impl Error {
    /// Classify this error into the closed [`ErrorKind`] set.
    ///
    /// Wrapping variants report the kind of the failure they carry.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse { .. } => ErrorKind::ParseFailure,
            Error::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            Error::MergeTypeMismatch { .. } => ErrorKind::MergeTypeMismatch,
            Error::Merge { source } => source.kind(),
            Error::UndefinedVariable { .. } => ErrorKind::UndefinedVariable,
            Error::EmptyDefault { .. } => ErrorKind::EmptyDefault,
            Error::PathSyntax { .. } => ErrorKind::PathSyntax,
            Error::AmbiguousKey { .. } => ErrorKind::AmbiguousKey,
            Error::Coercion { .. } => ErrorKind::CoercionFailure,
            Error::IncompatibleType { .. } => ErrorKind::IncompatibleType,
            Error::Cycle { .. } => ErrorKind::Cycle,
            Error::ExtraField { .. } => ErrorKind::ExtraField,
            Error::Hook { .. } => ErrorKind::HookFailure,
            Error::Io { .. } => ErrorKind::IO,
        }
    }
}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Hook {
            message: msg.to_string(),
        }
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Parse {
            message: msg.to_string(),
        }
    }
}
