//! CBOR helpers shared by the packet codecs.
//!
//! Packets are CBOR maps keyed by field name. Item lists travel as arrays
//! of two-element `[index, bytes]` arrays.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Checksum, ItemIndex};
use ciborium::value::{Integer, Value};

/// Serializes a value to CBOR bytes.
pub(crate) fn to_cbor(value: &Value) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| ProtocolError::encoding_failed(e.to_string()))?;
    Ok(out)
}

/// Parses CBOR bytes into a value.
pub(crate) fn from_cbor(bytes: &[u8]) -> ProtocolResult<Value> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::decoding_failed(e.to_string()))
}

/// Builds a map value with text keys.
pub(crate) fn map(pairs: Vec<(&'static str, Value)>) -> Value {
    Value::Map(
        pairs
            .into_iter()
            .map(|(key, value)| (Value::Text(key.to_string()), value))
            .collect(),
    )
}

/// Encodes an unsigned integer.
pub(crate) fn uint(n: impl Into<u64>) -> Value {
    Value::Integer(Integer::from(n.into()))
}

/// Encodes a list of indices.
pub(crate) fn indices(list: &[ItemIndex]) -> Value {
    Value::Array(list.iter().map(|&index| uint(index)).collect())
}

/// Encodes `(index, checksum)` pairs.
pub(crate) fn checksum_pairs(pairs: &[(ItemIndex, Checksum)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(index, checksum)| {
                Value::Array(vec![uint(*index), Value::Bytes(checksum.as_bytes().to_vec())])
            })
            .collect(),
    )
}

/// Encodes `(index, payload)` pairs.
pub(crate) fn byte_pairs(pairs: &[(ItemIndex, Vec<u8>)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(index, bytes)| Value::Array(vec![uint(*index), Value::Bytes(bytes.clone())]))
            .collect(),
    )
}

/// Typed field access over a decoded packet map.
pub(crate) struct Fields<'a> {
    packet: &'static str,
    pairs: &'a [(Value, Value)],
}

impl<'a> Fields<'a> {
    /// Views `value` as the field map of `packet`.
    pub(crate) fn of(packet: &'static str, value: &'a Value) -> ProtocolResult<Self> {
        let pairs = value
            .as_map()
            .ok_or_else(|| ProtocolError::invalid_field(packet, "<root>", "expected map"))?;
        Ok(Self { packet, pairs })
    }

    fn get(&self, field: &'static str) -> ProtocolResult<&'a Value> {
        self.pairs
            .iter()
            .find(|(k, _)| k.as_text() == Some(field))
            .map(|(_, v)| v)
            .ok_or_else(|| ProtocolError::missing_field(self.packet, field))
    }

    fn integer(&self, field: &'static str, value: &Value) -> ProtocolResult<i128> {
        value
            .as_integer()
            .map(i128::from)
            .ok_or_else(|| ProtocolError::invalid_field(self.packet, field, "expected integer"))
    }

    fn as_u32(&self, field: &'static str, value: &Value) -> ProtocolResult<u32> {
        let n = self.integer(field, value)?;
        u32::try_from(n).map_err(|_| {
            ProtocolError::invalid_field(self.packet, field, format!("{n} out of range for u32"))
        })
    }

    /// Reads a `u64` field.
    pub(crate) fn u64(&self, field: &'static str) -> ProtocolResult<u64> {
        let n = self.integer(field, self.get(field)?)?;
        u64::try_from(n).map_err(|_| {
            ProtocolError::invalid_field(self.packet, field, format!("{n} out of range for u64"))
        })
    }

    /// Reads a boolean field.
    pub(crate) fn bool(&self, field: &'static str) -> ProtocolResult<bool> {
        self.get(field)?
            .as_bool()
            .ok_or_else(|| ProtocolError::invalid_field(self.packet, field, "expected bool"))
    }

    fn array(&self, field: &'static str) -> ProtocolResult<&'a [Value]> {
        self.get(field)?
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| ProtocolError::invalid_field(self.packet, field, "expected array"))
    }

    /// Reads a list of indices.
    pub(crate) fn indices(&self, field: &'static str) -> ProtocolResult<Vec<ItemIndex>> {
        self.array(field)?
            .iter()
            .map(|v| self.as_u32(field, v))
            .collect()
    }

    fn pairs(&self, field: &'static str) -> ProtocolResult<Vec<(ItemIndex, &'a [u8])>> {
        self.array(field)?
            .iter()
            .map(|entry| {
                let pair = entry
                    .as_array()
                    .filter(|pair| pair.len() == 2)
                    .ok_or_else(|| {
                        ProtocolError::invalid_field(self.packet, field, "expected [index, bytes]")
                    })?;
                let index = self.as_u32(field, &pair[0])?;
                let bytes = pair[1].as_bytes().ok_or_else(|| {
                    ProtocolError::invalid_field(self.packet, field, "expected byte string")
                })?;
                Ok((index, bytes.as_slice()))
            })
            .collect()
    }

    /// Reads `(index, checksum)` pairs.
    pub(crate) fn checksum_pairs(
        &self,
        field: &'static str,
    ) -> ProtocolResult<Vec<(ItemIndex, Checksum)>> {
        self.pairs(field)?
            .into_iter()
            .map(|(index, bytes)| Ok((index, Checksum::from_slice(bytes)?)))
            .collect()
    }

    /// Reads `(index, payload)` pairs.
    pub(crate) fn byte_pairs(&self, field: &'static str) -> ProtocolResult<Vec<(ItemIndex, Vec<u8>)>> {
        Ok(self
            .pairs(field)?
            .into_iter()
            .map(|(index, bytes)| (index, bytes.to_vec()))
            .collect())
    }
}
