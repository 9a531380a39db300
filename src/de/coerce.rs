//! Scalar coercion rules.
//!
//! Destinations drive coercion: a string field stringifies any scalar, a
//! numeric field accepts in-range numerics and parsable strings, a boolean
//! field accepts the usual literal set, and `std::time::Duration` fields
//! accept compound `1h30m`-style text. Null (and absence) coerces to the
//! destination's zero value.

use std::time::Duration;

use crate::error::Error;
use crate::node::{Node, Scalar};

/// Render the node the way diagnostics expect it.
pub(super) fn render(node: Option<&Node>) -> String {
    node.map_or_else(|| "<nil>".to_owned(), ToString::to_string)
}

fn coercion(path: &str, node: Option<&Node>, target: &str) -> Error {
    Error::Coercion {
        path: path.to_owned(),
        value: render(node),
        target: target.to_owned(),
    }
}

fn incompatible(path: &str, node: &Node, target: &str) -> Error {
    Error::IncompatibleType {
        path: path.to_owned(),
        node: node.describe(),
        target: target.to_owned(),
    }
}

/// Coerce a node to a signed integer, truncating in-range floats the way
/// the merge format's numeric model does.
pub(super) fn to_i64(path: &str, node: Option<&Node>) -> Result<i64, Error> {
    match node {
        None | Some(Node::Null) => Ok(0),
        Some(Node::Scalar(Scalar::Int(i))) => Ok(*i),
        Some(Node::Scalar(Scalar::Float(f))) => {
            if f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                #[allow(clippy::cast_possible_truncation)]
                let truncated = f.trunc() as i64;
                Ok(truncated)
            } else {
                Err(coercion(path, node, "integer"))
            }
        }
        Some(Node::Scalar(Scalar::Str(s))) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| coercion(path, node, "integer")),
        Some(Node::Scalar(Scalar::Bool(_))) => Err(coercion(path, node, "integer")),
        Some(other) => Err(incompatible(path, other, "integer")),
    }
}

/// Coerce a node to an unsigned integer.
pub(super) fn to_u64(path: &str, node: Option<&Node>) -> Result<u64, Error> {
    match node {
        None | Some(Node::Null) => Ok(0),
        Some(Node::Scalar(Scalar::Int(i))) => {
            u64::try_from(*i).map_err(|_| coercion(path, node, "unsigned integer"))
        }
        Some(Node::Scalar(Scalar::Float(f))) => {
            if f.is_finite() && *f >= 0.0 && *f <= u64::MAX as f64 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let truncated = f.trunc() as u64;
                Ok(truncated)
            } else {
                Err(coercion(path, node, "unsigned integer"))
            }
        }
        Some(Node::Scalar(Scalar::Str(s))) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| coercion(path, node, "unsigned integer")),
        Some(Node::Scalar(Scalar::Bool(_))) => Err(coercion(path, node, "unsigned integer")),
        Some(other) => Err(incompatible(path, other, "unsigned integer")),
    }
}

/// Coerce a node to a float.
pub(super) fn to_f64(path: &str, node: Option<&Node>) -> Result<f64, Error> {
    match node {
        None | Some(Node::Null) => Ok(0.0),
        #[allow(clippy::cast_precision_loss)]
        Some(Node::Scalar(Scalar::Int(i))) => Ok(*i as f64),
        Some(Node::Scalar(Scalar::Float(f))) => Ok(*f),
        Some(Node::Scalar(Scalar::Str(s))) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| coercion(path, node, "float")),
        Some(Node::Scalar(Scalar::Bool(_))) => Err(coercion(path, node, "float")),
        Some(other) => Err(incompatible(path, other, "float")),
    }
}

/// Coerce a node to a boolean via the usual truthy/falsy literal set.
pub(super) fn to_bool(path: &str, node: Option<&Node>) -> Result<bool, Error> {
    match node {
        None | Some(Node::Null) => Ok(false),
        Some(Node::Scalar(Scalar::Bool(b))) => Ok(*b),
        Some(Node::Scalar(scalar)) => match scalar.to_string().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" | "on" => Ok(true),
            "0" | "f" | "false" | "n" | "no" | "off" => Ok(false),
            _ => Err(coercion(path, node, "bool")),
        },
        Some(other) => Err(incompatible(path, other, "bool")),
    }
}

/// Coerce a node to a string; any scalar stringifies.
pub(super) fn to_string(path: &str, node: Option<&Node>) -> Result<String, Error> {
    match node {
        None | Some(Node::Null) => Ok(String::new()),
        Some(Node::Scalar(scalar)) => Ok(scalar.to_string()),
        Some(other) => Err(incompatible(path, other, "string")),
    }
}

/// Parse a compound duration: `<number><unit>` repeated, with the units
/// `ns`, `us`/`µs`/`μs`, `ms`, `s`, `m`, `h`, and fractional numbers
/// allowed (`1h30m`, `1.5s`). A bare `0` needs no unit. Negative durations
/// have no representation and fail.
pub(super) fn parse_duration(text: &str) -> Option<Duration> {
    let mut rest = text.strip_prefix('+').unwrap_or(text);
    if rest == "0" {
        return Some(Duration::ZERO);
    }
    if rest.is_empty() || rest.starts_with('-') {
        return None;
    }

    let mut nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let (scale, tail) = unit_scale(rest)?;
        nanos += value * scale;
        rest = tail;
    }

    if !nanos.is_finite() || nanos < 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = nanos.round() as u64;
    Some(Duration::from_nanos(rounded))
}

fn unit_scale(rest: &str) -> Option<(f64, &str)> {
    // Two-character units must match before the bare `m` and `s`.
    for (unit, scale) in [
        ("ns", 1.0),
        ("us", 1e3),
        ("µs", 1e3),
        ("μs", 1e3),
        ("ms", 1e6),
        ("s", 1e9),
        ("m", 60e9),
        ("h", 3600e9),
    ] {
        if let Some(tail) = rest.strip_prefix(unit) {
            return Some((scale, tail));
        }
    }
    None
}
