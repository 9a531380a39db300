//! Variable expansion over scalar text.
//!
//! The expander rewrites `$NAME`, `${KEY:DEFAULT}`, and `$$` using a
//! caller-supplied lookup. It is a streaming byte transform: input may
//! arrive in arbitrary chunks, and the transform refuses to commit output
//! for a token that might continue in the next chunk.

use crate::error::{Error, Result};
use crate::node::{Node, Scalar};

/// Lookup signature bound at provider construction.
///
/// Behaves like `std::env::var` without the error detail: `Some(value)`
/// when the key is defined, `None` otherwise.
pub type Lookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// A streaming `$`-reference rewriter.
pub struct Expander<'a> {
    lookup: &'a Lookup,
}

impl<'a> Expander<'a> {
    /// Create an expander over the given lookup.
    #[must_use]
    pub fn new(lookup: &'a Lookup) -> Self {
        Expander { lookup }
    }

    /// Consume a prefix of `src`, appending rewritten bytes to `dst`.
    ///
    /// Returns the number of bytes consumed. A return value smaller than
    /// `src.len()` with `at_eof == false` means the tail starts a token
    /// that may continue in the next chunk; the caller must re-present the
    /// unconsumed bytes with more input appended. With `at_eof == true`
    /// the whole input is always consumed, and an incomplete token (a
    /// trailing `$` or an unterminated `${…`) is emitted literally.
    ///
    /// # Errors
    ///
    /// [`Error::UndefinedVariable`] for a `$NAME` with no lookup match and
    /// [`Error::EmptyDefault`] for a bracketed reference with no match and
    /// no usable default.
    pub fn transform(&self, dst: &mut Vec<u8>, src: &[u8], at_eof: bool) -> Result<usize> {
        let mut i = 0;
        while i < src.len() {
            let Some(rel) = src[i..].iter().position(|&b| b == b'$') else {
                dst.extend_from_slice(&src[i..]);
                return Ok(src.len());
            };
            let p = i + rel;
            dst.extend_from_slice(&src[i..p]);

            if p + 1 >= src.len() {
                if at_eof {
                    dst.push(b'$');
                    return Ok(src.len());
                }
                return Ok(p);
            }

            match src[p + 1] {
                b'$' => {
                    dst.push(b'$');
                    i = p + 2;
                }
                b'{' => match src[p + 2..].iter().position(|&b| b == b'}') {
                    Some(rel_close) => {
                        let q = p + 2 + rel_close;
                        self.braced(dst, &src[p + 2..q])?;
                        i = q + 1;
                    }
                    None => {
                        if at_eof {
                            dst.extend_from_slice(&src[p..]);
                            return Ok(src.len());
                        }
                        return Ok(p);
                    }
                },
                b if is_name_start(b) => {
                    let mut n = p + 2;
                    while n < src.len() && is_name_byte(src[n]) {
                        n += 1;
                    }
                    if n == src.len() && !at_eof {
                        // The name may continue in the next chunk.
                        return Ok(p);
                    }
                    let name = String::from_utf8_lossy(&src[p + 1..n]).into_owned();
                    match (self.lookup)(&name) {
                        Some(value) => dst.extend_from_slice(value.as_bytes()),
                        None => return Err(Error::UndefinedVariable { name }),
                    }
                    i = n;
                }
                _ => {
                    dst.push(b'$');
                    i = p + 1;
                }
            }
        }
        Ok(src.len())
    }

    /// Rewrite a complete input in one call.
    ///
    /// # Errors
    ///
    /// Same failures as [`Expander::transform`].
    pub fn expand(&self, src: &[u8]) -> Result<Vec<u8>> {
        let mut dst = Vec::with_capacity(src.len());
        let consumed = self.transform(&mut dst, src, true)?;
        debug_assert_eq!(consumed, src.len());
        Ok(dst)
    }

    /// Handle the content between `${` and `}`: everything up to the first
    /// colon is the key, the remainder is the default.
    fn braced(&self, dst: &mut Vec<u8>, content: &[u8]) -> Result<()> {
        let (key, default) = match content.iter().position(|&b| b == b':') {
            Some(c) => (&content[..c], Some(&content[c + 1..])),
            None => (content, None),
        };
        let name = String::from_utf8_lossy(key).into_owned();
        if let Some(value) = (self.lookup)(&name) {
            dst.extend_from_slice(value.as_bytes());
            return Ok(());
        }
        match default {
            None | Some(b"") => Err(Error::EmptyDefault { name }),
            // The two-byte literal "" selects the explicit empty string.
            Some(br#""""#) => Ok(()),
            Some(fallback) => {
                dst.extend_from_slice(fallback);
                Ok(())
            }
        }
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Double every `$` so the text survives expansion verbatim.
///
/// `expand(escape(s))` is the identity for any `s`.
#[must_use]
pub fn escape(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    for &b in src {
        if b == b'$' {
            out.push(b'$');
        }
        out.push(b);
    }
    out
}

/// Escape every string scalar in a tree, in place.
pub(crate) fn escape_node(node: &mut Node) {
    match node {
        Node::Scalar(Scalar::Str(s)) => {
            if s.contains('$') {
                *s = String::from_utf8(escape(s.as_bytes()))
                    .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
            }
        }
        Node::Sequence(items) => items.iter_mut().for_each(escape_node),
        Node::Mapping(entries) => entries.values_mut().for_each(escape_node),
        _ => {}
    }
}

/// Expand every string scalar in a tree, in place.
///
/// Mapping keys are left untouched. A rewritten scalar is re-typed the way
/// the parser would type it, so `port: $PORT` decodes as an integer once
/// `PORT` resolves to one.
pub(crate) fn expand_node(node: &mut Node, lookup: &Lookup) -> Result<()> {
    match node {
        Node::Scalar(Scalar::Str(s)) => {
            if !s.contains('$') {
                return Ok(());
            }
            let expanded = Expander::new(lookup).expand(s.as_bytes())?;
            let expanded = String::from_utf8(expanded)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
            if expanded != *s {
                *node = crate::yaml::retype_scalar(&expanded);
            }
            Ok(())
        }
        Node::Sequence(items) => items.iter_mut().try_for_each(|n| expand_node(n, lookup)),
        Node::Mapping(entries) => entries.values_mut().try_for_each(|n| expand_node(n, lookup)),
        _ => Ok(()),
    }
}
