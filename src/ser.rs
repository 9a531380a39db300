//! Serialization of arbitrary values into configuration trees.
//!
//! `static_source` and `with_default` accept any `T: Serialize`; this
//! serializer turns such values into [`Node`] trees so they can join the
//! merge pipeline like any other source.

use serde::ser::{self, Serialize};

use crate::error::{Error, Result};
use crate::node::{Mapping, Node, Scalar};

/// Serialize a value into a [`Node`] tree.
///
/// # Errors
///
/// Returns [`Error::Parse`] when the value cannot be represented in the
/// document format (e.g. an integer outside the signed 64-bit range or a
/// non-scalar mapping key).
pub fn to_node<T: Serialize + ?Sized>(value: &T) -> Result<Node> {
    value.serialize(NodeSerializer)
}

struct NodeSerializer;

fn out_of_range(what: &str) -> Error {
    Error::Parse {
        message: format!("can't serialize {what}: outside the signed 64-bit range"),
    }
}

impl ser::Serializer for NodeSerializer {
    type Ok = Node;
    type Error = Error;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Node> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Node> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Node> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Int(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Node> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Node> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Node> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Node> {
        i64::try_from(v)
            .map(|i| Node::Scalar(Scalar::Int(i)))
            .map_err(|_| out_of_range("unsigned integer"))
    }

    fn serialize_f32(self, v: f32) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Float(f64::from(v))))
    }

    fn serialize_f64(self, v: f64) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Float(v)))
    }

    fn serialize_char(self, v: char) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Str(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Str(v.to_owned())))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Node> {
        Ok(Node::Sequence(
            v.iter()
                .map(|&b| Node::Scalar(Scalar::Int(i64::from(b))))
                .collect(),
        ))
    }

    fn serialize_none(self) -> Result<Node> {
        Ok(Node::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Node> {
        value.serialize(NodeSerializer)
    }

    fn serialize_unit(self) -> Result<Node> {
        Ok(Node::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node> {
        Ok(Node::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Str(variant.to_owned())))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Node> {
        value.serialize(NodeSerializer)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Node> {
        Ok(singleton(variant, value.serialize(NodeSerializer)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder> {
        Ok(VariantSeqBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder> {
        Ok(MapBuilder {
            entries: Mapping::new(),
            pending: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<MapBuilder> {
        self.serialize_map(None)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantMapBuilder> {
        Ok(VariantMapBuilder {
            variant,
            entries: Mapping::new(),
        })
    }
}

fn singleton(variant: &str, value: Node) -> Node {
    let mut entries = Mapping::new();
    entries.insert(Scalar::Str(variant.to_owned()), value);
    Node::Mapping(entries)
}

fn key_scalar(node: Node) -> Result<Scalar> {
    match node {
        Node::Scalar(s) => Ok(s),
        other => Err(Error::Parse {
            message: format!("can't use a {} as a mapping key", other.describe()),
        }),
    }
}

struct SeqBuilder {
    items: Vec<Node>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Node;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Sequence(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Node;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Node;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    items: Vec<Node>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Node;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node> {
        Ok(singleton(self.variant, Node::Sequence(self.items)))
    }
}

struct MapBuilder {
    entries: Mapping,
    pending: Option<Scalar>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Node;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.pending = Some(key_scalar(key.serialize(NodeSerializer)?)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self.pending.take().ok_or_else(|| Error::Parse {
            message: "mapping value serialized before its key".into(),
        })?;
        self.entries.insert(key, value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Mapping(self.entries))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Node;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.entries
            .insert(Scalar::Str(key.to_owned()), value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Mapping(self.entries))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    entries: Mapping,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Node;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.entries
            .insert(Scalar::Str(key.to_owned()), value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node> {
        Ok(singleton(self.variant, Node::Mapping(self.entries)))
    }
}
