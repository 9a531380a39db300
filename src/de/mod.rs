//! Decoding of tree fragments into typed destinations.
//!
//! The decoder walks the destination shape and the provider in parallel: a
//! struct probes one path per field, a sequence probes `path.0`, `path.1`, …
//! so per-index overrides and flattened dotted keys resolve exactly like
//! direct lookups, and scalars coerce by destination type. Serde is the
//! seam: a destination's own `Deserialize` impl plays the role of a user
//! unmarshaling hook.

mod coerce;

use serde::de::value::{StrDeserializer, StringDeserializer, U64Deserializer};
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, IntoDeserializer, Visitor,
};

use crate::error::{Error, Result};
use crate::node::{Node, Scalar};
use crate::provider::Backend;

/// Destinations deeper than this are assumed to be self-referential.
const MAX_DEPTH: usize = 128;

/// Decode the subtree at `path` into `T`.
pub(crate) fn populate<T: DeserializeOwned>(backend: &dyn Backend, path: &str) -> Result<T> {
    T::deserialize(Dec {
        backend,
        path: path.to_owned(),
        depth: 0,
    })
}

/// Join a parent path with a child segment.
pub(crate) fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_owned()
    } else {
        format!("{path}.{segment}")
    }
}

/// A deserializer positioned at one path of one provider.
struct Dec<'a> {
    backend: &'a dyn Backend,
    path: String,
    depth: usize,
}

impl<'a> Dec<'a> {
    fn node(&self) -> Option<Node> {
        self.backend.at(&self.path)
    }

    fn descend(&self, segment: &str) -> Result<Dec<'a>> {
        let path = join(&self.path, segment);
        if self.depth >= MAX_DEPTH {
            return Err(Error::Cycle { path });
        }
        Ok(Dec {
            backend: self.backend,
            path,
            depth: self.depth + 1,
        })
    }

    fn incompatible(&self, node: &Node, target: &str) -> Error {
        Error::IncompatibleType {
            path: self.path.clone(),
            node: node.describe(),
            target: target.to_owned(),
        }
    }
}

macro_rules! deserialize_integer {
    ($method:ident, $visit:ident, $int:ty, $wide:ident) => {
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
            let node = self.node();
            let wide = coerce::$wide(&self.path, node.as_ref())?;
            let value = <$int>::try_from(wide).map_err(|_| Error::Coercion {
                path: self.path.clone(),
                value: coerce::render(node.as_ref()),
                target: stringify!($int).to_owned(),
            })?;
            visitor.$visit(value)
        }
    };
}

impl<'de, 'a> de::Deserializer<'de> for Dec<'a> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node() {
            None | Some(Node::Null) => visitor.visit_unit(),
            Some(Node::Scalar(Scalar::Str(s))) => visitor.visit_string(s),
            Some(Node::Scalar(Scalar::Int(i))) => visitor.visit_i64(i),
            Some(Node::Scalar(Scalar::Float(f))) => visitor.visit_f64(f),
            Some(Node::Scalar(Scalar::Bool(b))) => visitor.visit_bool(b),
            Some(Node::Sequence(items)) => visitor.visit_seq(SeqWalk {
                dec: &self,
                index: 0,
                native_len: items.len(),
                fixed_len: None,
            }),
            Some(Node::Mapping(entries)) => visitor.visit_map(MapWalk {
                dec: &self,
                keys: entries.iter().map(|(k, _)| k.clone()).collect(),
                index: 0,
                value_path: None,
            }),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bool(coerce::to_bool(&self.path, self.node().as_ref())?)
    }

    deserialize_integer!(deserialize_i8, visit_i8, i8, to_i64);
    deserialize_integer!(deserialize_i16, visit_i16, i16, to_i64);
    deserialize_integer!(deserialize_i32, visit_i32, i32, to_i64);
    deserialize_integer!(deserialize_i64, visit_i64, i64, to_i64);
    deserialize_integer!(deserialize_u8, visit_u8, u8, to_u64);
    deserialize_integer!(deserialize_u16, visit_u16, u16, to_u64);
    deserialize_integer!(deserialize_u32, visit_u32, u32, to_u64);
    deserialize_integer!(deserialize_u64, visit_u64, u64, to_u64);

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        #[allow(clippy::cast_possible_truncation)]
        let value = coerce::to_f64(&self.path, self.node().as_ref())? as f32;
        visitor.visit_f32(value)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f64(coerce::to_f64(&self.path, self.node().as_ref())?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let node = self.node();
        let text = coerce::to_string(&self.path, node.as_ref())?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(Error::Coercion {
                path: self.path,
                value: text,
                target: "char".to_owned(),
            }),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(coerce::to_string(&self.path, self.node().as_ref())?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_any(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_any(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node() {
            None | Some(Node::Null) => visitor.visit_none(),
            Some(_) => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let native_len = match self.node() {
            Some(Node::Sequence(items)) => items.len(),
            None | Some(Node::Null) => 0,
            Some(other) => return Err(self.incompatible(&other, "sequence")),
        };
        visitor.visit_seq(SeqWalk {
            dec: &self,
            index: 0,
            native_len,
            fixed_len: None,
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        match self.node() {
            None | Some(Node::Null | Node::Sequence(_)) => {}
            Some(other) => return Err(self.incompatible(&other, "sequence")),
        }
        visitor.visit_seq(SeqWalk {
            dec: &self,
            index: 0,
            native_len: 0,
            fixed_len: Some(len),
        })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let keys = match self.node() {
            Some(Node::Mapping(entries)) => entries.iter().map(|(k, _)| k.clone()).collect(),
            None | Some(Node::Null) => Vec::new(),
            Some(other) => {
                if self.backend.strict() {
                    return Err(self.incompatible(&other, "map"));
                }
                Vec::new()
            }
        };
        visitor.visit_map(MapWalk {
            dec: &self,
            keys,
            index: 0,
            value_path: None,
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let node = self.node();

        if name == "Duration" && fields == ["secs", "nanos"] {
            if let Some(value) = duration_parts(&self, node.as_ref())? {
                return visitor.visit_map(DurationWalk { value, index: 0 });
            }
        }

        if self.backend.strict() {
            if let Some(Node::Mapping(entries)) = &node {
                for (key, _) in entries.iter() {
                    let key = key.to_string();
                    if !fields.contains(&key.as_str()) {
                        return Err(Error::ExtraField {
                            path: self.path,
                            field: key,
                        });
                    }
                }
            }
        }

        visitor.visit_map(FieldWalk {
            dec: &self,
            fields,
            index: 0,
            value_path: None,
        })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.node() {
            Some(Node::Scalar(Scalar::Str(variant))) => visitor.visit_enum(EnumWalk {
                variant,
                value: None,
            }),
            Some(Node::Mapping(entries)) => {
                let mut iter = entries.iter();
                match (iter.next(), iter.next()) {
                    (Some((key, _)), None) => {
                        let variant = key.to_string();
                        let value = self.descend(&variant)?;
                        visitor.visit_enum(EnumWalk {
                            variant,
                            value: Some(value),
                        })
                    }
                    _ => Err(Error::IncompatibleType {
                        path: self.path,
                        node: "mapping",
                        target: "externally tagged enum".to_owned(),
                    }),
                }
            }
            node => Err(Error::IncompatibleType {
                path: self.path,
                node: node.as_ref().map_or("null", Node::describe),
                target: "enum".to_owned(),
            }),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

/// Split a scalar duration into the `(secs, nanos)` pair serde's
/// `Duration` impl expects. Returns `Ok(None)` when the node is a mapping,
/// which decodes through the regular struct machinery instead.
fn duration_parts(dec: &Dec<'_>, node: Option<&Node>) -> Result<Option<(u64, u32)>> {
    let scalar = match node {
        None | Some(Node::Null) => return Ok(Some((0, 0))),
        Some(Node::Mapping(_)) => return Ok(None),
        Some(Node::Scalar(s)) => s,
        Some(other) => return Err(dec.incompatible(other, "duration")),
    };
    let text = scalar.to_string();
    let duration = coerce::parse_duration(&text).ok_or_else(|| Error::Coercion {
        path: dec.path.clone(),
        value: text,
        target: "duration".to_owned(),
    })?;
    Ok(Some((duration.as_secs(), duration.subsec_nanos())))
}

/// Feeds `secs`/`nanos` for an intercepted duration scalar.
struct DurationWalk {
    value: (u64, u32),
    index: usize,
}

impl<'de> de::MapAccess<'de> for DurationWalk {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let key = match self.index {
            0 => "secs",
            1 => "nanos",
            _ => return Ok(None),
        };
        seed.deserialize(StrDeserializer::new(key)).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let value = match self.index {
            0 => self.value.0,
            _ => u64::from(self.value.1),
        };
        self.index += 1;
        seed.deserialize(U64Deserializer::new(value))
    }
}

/// Walks a sequence by probing indices, splicing per-index overrides.
struct SeqWalk<'a, 'b> {
    dec: &'b Dec<'a>,
    index: usize,
    native_len: usize,
    fixed_len: Option<usize>,
}

impl<'de> de::SeqAccess<'de> for SeqWalk<'_, '_> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        let element = self.dec.descend(&self.index.to_string())?;
        match self.fixed_len {
            Some(len) => {
                if self.index >= len {
                    return Ok(None);
                }
            }
            None => {
                let overridden = element.node().is_some_and(|n| !n.is_null());
                if !overridden && self.index >= self.native_len {
                    return Ok(None);
                }
            }
        }
        self.index += 1;
        seed.deserialize(element).map(Some)
    }
}

/// Walks a source mapping, decoding keys through scalar coercion and
/// values through fresh path lookups.
struct MapWalk<'a, 'b> {
    dec: &'b Dec<'a>,
    keys: Vec<Scalar>,
    index: usize,
    value_path: Option<String>,
}

impl<'de> de::MapAccess<'de> for MapWalk<'_, '_> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let Some(key) = self.keys.get(self.index) else {
            return Ok(None);
        };
        self.index += 1;
        let rendered = key.to_string();
        if rendered.is_empty() {
            return Err(Error::AmbiguousKey {
                path: self.dec.path.clone(),
            });
        }
        self.value_path = Some(join(&self.dec.path, &rendered));
        seed.deserialize(KeyDe {
            scalar: key.clone(),
            path: self.dec.path.clone(),
        })
        .map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let path = self.value_path.take().ok_or_else(|| Error::Hook {
            message: "map value requested before its key".to_owned(),
        })?;
        if self.dec.depth >= MAX_DEPTH {
            return Err(Error::Cycle { path });
        }
        seed.deserialize(Dec {
            backend: self.dec.backend,
            path,
            depth: self.dec.depth + 1,
        })
    }
}

/// Walks a struct's declared fields, yielding only those with a value.
struct FieldWalk<'a, 'b> {
    dec: &'b Dec<'a>,
    fields: &'static [&'static str],
    index: usize,
    value_path: Option<String>,
}

impl<'de> de::MapAccess<'de> for FieldWalk<'_, '_> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        while let Some(field) = self.fields.get(self.index) {
            self.index += 1;
            let path = join(&self.dec.path, field);
            if self.dec.backend.reaches(&path) {
                self.value_path = Some(path);
                return seed.deserialize(StrDeserializer::new(field)).map(Some);
            }
        }
        Ok(None)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let path = self.value_path.take().ok_or_else(|| Error::Hook {
            message: "field value requested before its key".to_owned(),
        })?;
        if self.dec.depth >= MAX_DEPTH {
            return Err(Error::Cycle { path });
        }
        seed.deserialize(Dec {
            backend: self.dec.backend,
            path,
            depth: self.dec.depth + 1,
        })
    }
}

/// Enum access over a variant name and an optional value subtree.
struct EnumWalk<'a> {
    variant: String,
    value: Option<Dec<'a>>,
}

impl<'de, 'a> de::EnumAccess<'de> for EnumWalk<'a> {
    type Error = Error;
    type Variant = VariantWalk<'a>;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, VariantWalk<'a>)> {
        let variant: StringDeserializer<Error> = self.variant.into_deserializer();
        Ok((seed.deserialize(variant)?, VariantWalk { value: self.value }))
    }
}

struct VariantWalk<'a> {
    value: Option<Dec<'a>>,
}

impl<'de> de::VariantAccess<'de> for VariantWalk<'_> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        match self.value {
            Some(dec) => seed.deserialize(dec),
            None => Err(Error::Hook {
                message: "unit variant used where a value-carrying variant is required".to_owned(),
            }),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        match self.value {
            Some(dec) => de::Deserializer::deserialize_tuple(dec, len, visitor),
            None => Err(Error::Hook {
                message: "unit variant used where a tuple variant is required".to_owned(),
            }),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.value {
            Some(dec) => de::Deserializer::deserialize_struct(dec, "", fields, visitor),
            None => Err(Error::Hook {
                message: "unit variant used where a struct variant is required".to_owned(),
            }),
        }
    }
}

/// Deserializer for a mapping key: a standalone scalar coerced by the
/// destination's key type.
struct KeyDe {
    scalar: Scalar,
    path: String,
}

impl KeyDe {
    fn node(&self) -> Node {
        Node::Scalar(self.scalar.clone())
    }
}

macro_rules! deserialize_key_integer {
    ($method:ident, $visit:ident, $int:ty, $wide:ident) => {
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
            let node = self.node();
            let wide = coerce::$wide(&self.path, Some(&node))?;
            let value = <$int>::try_from(wide).map_err(|_| Error::Coercion {
                path: self.path.clone(),
                value: self.scalar.to_string(),
                target: stringify!($int).to_owned(),
            })?;
            visitor.$visit(value)
        }
    };
}

impl<'de> de::Deserializer<'de> for KeyDe {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.scalar {
            Scalar::Str(s) => visitor.visit_string(s),
            Scalar::Int(i) => visitor.visit_i64(i),
            Scalar::Float(f) => visitor.visit_f64(f),
            Scalar::Bool(b) => visitor.visit_bool(b),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bool(coerce::to_bool(&self.path, Some(&self.node()))?)
    }

    deserialize_key_integer!(deserialize_i8, visit_i8, i8, to_i64);
    deserialize_key_integer!(deserialize_i16, visit_i16, i16, to_i64);
    deserialize_key_integer!(deserialize_i32, visit_i32, i32, to_i64);
    deserialize_key_integer!(deserialize_i64, visit_i64, i64, to_i64);
    deserialize_key_integer!(deserialize_u8, visit_u8, u8, to_u64);
    deserialize_key_integer!(deserialize_u16, visit_u16, u16, to_u64);
    deserialize_key_integer!(deserialize_u32, visit_u32, u32, to_u64);
    deserialize_key_integer!(deserialize_u64, visit_u64, u64, to_u64);

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        #[allow(clippy::cast_possible_truncation)]
        let value = coerce::to_f64(&self.path, Some(&self.node()))? as f32;
        visitor.visit_f32(value)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f64(coerce::to_f64(&self.path, Some(&self.node()))?)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.scalar.to_string())
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let text = self.scalar.to_string();
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(Error::Coercion {
                path: self.path,
                value: text,
                target: "char".to_owned(),
            }),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_enum(EnumWalk {
            variant: self.scalar.to_string(),
            value: None,
        })
    }

    serde::forward_to_deserialize_any! {
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct ignored_any
    }
}
