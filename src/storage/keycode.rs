//! Order-preserving key encoding
//!
//! bincode is fine for values, but storage keys must sort the same way as the
//! data they encode: a prefix scan over a table returns rows in primary key
//! order, and MVCC version keys sort by (key, version). This module is a small
//! serde format with that property:
//!
//! - `bool`: one byte, 0 or 1
//! - `u64`: 8 bytes big-endian
//! - `i64`: 8 bytes big-endian with the sign bit flipped
//! - `f64`: IEEE bits, sign bit flipped for positives, all bits inverted for negatives
//! - strings and byte strings: `0x00` escaped as `0x00 0xff`, terminated by `0x00 0x00`
//! - enum variants: the variant index as one byte, followed by the fields
//! - tuples and sequences: the concatenation of their elements

use serde::{
    de::{self, DeserializeSeed, EnumAccess, IntoDeserializer, SeqAccess, VariantAccess, Visitor},
    ser::{self, Impossible, Serialize},
    Deserialize,
};

use crate::error::{Error, Result};

/// Encodes a key into its ordered byte form
pub fn serialize_key<T: Serialize>(key: &T) -> Result<Vec<u8>> {
    let mut serializer = Serializer { output: Vec::new() };
    key.serialize(&mut serializer)?;
    Ok(serializer.output)
}

/// Decodes a key previously produced by [`serialize_key`]
pub fn deserialize_key<'a, T: Deserialize<'a>>(input: &'a [u8]) -> Result<T> {
    let mut deserializer = Deserializer { input };
    let key = T::deserialize(&mut deserializer)?;
    if !deserializer.input.is_empty() {
        return Err(Error::Internal(format!(
            "unexpected trailing bytes {:x?} in key",
            deserializer.input
        )));
    }
    Ok(key)
}

pub struct Serializer {
    output: Vec<u8>,
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleVariant = Self;
    type SerializeTupleStruct = Impossible<(), Error>;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = Impossible<(), Error>;
    type SerializeStructVariant = Impossible<(), Error>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.output.push(if v { 1 } else { 0 });
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.serialize_i64(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.serialize_i64(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.serialize_i64(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        let mut bytes = v.to_be_bytes();
        bytes[0] ^= 1 << 7;
        self.output.extend(bytes);
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.output.push(v);
        Ok(())
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.serialize_u64(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.serialize_u64(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.output.extend(v.to_be_bytes());
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.serialize_f64(v.into())
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        let mut bits = v.to_bits();
        if bits & (1 << 63) == 0 {
            bits ^= 1 << 63;
        } else {
            bits = !bits;
        }
        self.output.extend(bits.to_be_bytes());
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<()> {
        let mut buf = [0; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.serialize_bytes(v.as_bytes())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        for &b in v {
            match b {
                0x00 => self.output.extend([0x00, 0xff]),
                b => self.output.push(b),
            }
        }
        self.output.extend([0x00, 0x00]);
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        Err(Error::Internal("option is not supported in keys".into()))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _: &T) -> Result<()> {
        Err(Error::Internal("option is not supported in keys".into()))
    }

    fn serialize_unit(self) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, index: u32, _: &'static str) -> Result<()> {
        self.output.push(variant_byte(index)?);
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        index: u32,
        _: &'static str,
        value: &T,
    ) -> Result<()> {
        self.output.push(variant_byte(index)?);
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(Error::Internal(format!("tuple struct {name} is not supported in keys")))
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        index: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.output.push(variant_byte(index)?);
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::Internal("map is not supported in keys".into()))
    }

    fn serialize_struct(self, name: &'static str, _: usize) -> Result<Self::SerializeStruct> {
        Err(Error::Internal(format!("struct {name} is not supported in keys")))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::Internal(format!("struct variant {name} is not supported in keys")))
    }
}

fn variant_byte(index: u32) -> Result<u8> {
    u8::try_from(index).map_err(|_| Error::Internal(format!("variant index {index} out of range")))
}

impl ser::SerializeSeq for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTuple for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

pub struct Deserializer<'de> {
    input: &'de [u8],
}

impl<'de> Deserializer<'de> {
    fn take_bytes(&mut self, len: usize) -> Result<&'de [u8]> {
        if self.input.len() < len {
            return Err(Error::Internal(format!(
                "insufficient bytes, expected {} got {}",
                len,
                self.input.len()
            )));
        }
        let (bytes, rest) = self.input.split_at(len);
        self.input = rest;
        Ok(bytes)
    }

    /// Decodes an escaped, terminated byte string
    fn decode_bytes(&mut self) -> Result<Vec<u8>> {
        let mut decoded = Vec::new();
        loop {
            match self.take_bytes(1)?[0] {
                0x00 => match self.take_bytes(1)?[0] {
                    0x00 => return Ok(decoded),
                    0xff => decoded.push(0x00),
                    b => return Err(Error::Internal(format!("invalid escape byte {b:#x}"))),
                },
                b => decoded.push(b),
            }
        }
    }

    fn take_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_bytes(8)?.try_into()?))
    }
}

impl<'de> de::Deserializer<'de> for &mut Deserializer<'de> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        Err(Error::Internal("key encoding is not self-describing".into()))
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bool(match self.take_bytes(1)?[0] {
            0 => false,
            1 => true,
            b => return Err(Error::Internal(format!("invalid boolean byte {b}"))),
        })
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let mut bytes: [u8; 8] = self.take_bytes(8)?.try_into()?;
        bytes[0] ^= 1 << 7;
        visitor.visit_i64(i64::from_be_bytes(bytes))
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u8(self.take_bytes(1)?[0])
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u64(self.take_u64()?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let mut bits = self.take_u64()?;
        if bits & (1 << 63) != 0 {
            bits ^= 1 << 63;
        } else {
            bits = !bits;
        }
        visitor.visit_f64(f64::from_bits(bits))
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(String::from_utf8(self.decode_bytes()?)?)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.decode_bytes()?)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(self)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _: usize, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_enum(self)
    }

    serde::forward_to_deserialize_any! {
        i8 i16 i32 i128 u16 u32 u128 f32 char option unit_struct
        newtype_struct tuple_struct map struct identifier ignored_any
    }
}

impl<'de> SeqAccess<'de> for Deserializer<'de> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.input.is_empty() {
            return Ok(None);
        }
        seed.deserialize(self).map(Some)
    }
}

impl<'de> EnumAccess<'de> for &mut Deserializer<'de> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let index = u32::from(self.take_bytes(1)?[0]);
        let value: Result<_> = seed.deserialize(index.into_deserializer());
        Ok((value?, self))
    }
}

impl<'de> VariantAccess<'de> for &mut Deserializer<'de> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _: usize, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(self)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _: &'static [&'static str],
        _: V,
    ) -> Result<V::Value> {
        Err(Error::Internal("struct variants are not supported in keys".into()))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::{deserialize_key, serialize_key};
    use crate::{error::Result, sql::types::Value};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum TestKey {
        Marker,
        Counter(u64),
        Pair(String, #[serde(with = "serde_bytes")] Vec<u8>),
    }

    #[test]
    fn test_integer_keys_sort_numerically() -> Result<()> {
        let ids = [-300_i64, -1, 0, 1, 2, 255, 256, 70_000];
        let encoded = ids
            .iter()
            .map(|id| serialize_key(&Value::Integer(*id)))
            .collect::<Result<Vec<_>>>()?;
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
        Ok(())
    }

    #[test]
    fn test_float_keys_sort_numerically() -> Result<()> {
        let amounts = [-15.0_f64, -0.5, 0.0, 75.25, 120.5, 250.0];
        let encoded = amounts
            .iter()
            .map(|a| serialize_key(a))
            .collect::<Result<Vec<_>>>()?;
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
        Ok(())
    }

    #[test]
    fn test_strings_escape_zero_and_keep_prefix_order() -> Result<()> {
        assert_eq!(serialize_key(&"a\0b")?, vec![b'a', 0x00, 0xff, b'b', 0x00, 0x00]);
        // "orders" must sort after "order" and not interleave with it
        let short = serialize_key(&"order")?;
        let long = serialize_key(&"orders")?;
        assert!(short < long);
        assert!(!long.starts_with(&short));
        Ok(())
    }

    #[test]
    fn test_enum_keys_decode() -> Result<()> {
        for key in [
            TestKey::Marker,
            TestKey::Counter(42),
            TestKey::Pair("customers".into(), vec![0, 1, 0, 255]),
        ] {
            let bytes = serialize_key(&key)?;
            assert_eq!(deserialize_key::<TestKey>(&bytes)?, key);
        }
        assert_eq!(serialize_key(&TestKey::Counter(1))?[0], 1);
        Ok(())
    }

    #[test]
    fn test_trailing_bytes_rejected() -> Result<()> {
        let mut bytes = serialize_key(&TestKey::Counter(7))?;
        bytes.push(9);
        assert!(deserialize_key::<TestKey>(&bytes).is_err());
        Ok(())
    }
}
