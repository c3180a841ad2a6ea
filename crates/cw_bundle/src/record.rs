//! Typed records stored inside a bundle.

use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use crate::error::BundleError;

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

/// A single object inside a bundle.
///
/// `path_id` is unique within one bundle; `class_id` identifies the object
/// kind (see [`class`](crate::class)). Fields are kept sorted by name so that
/// re-encoding an unchanged record is byte-stable.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub path_id: i64,
    pub class_id: u32,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(path_id: i64, class_id: u32) -> Self {
        Self {
            path_id,
            class_id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_str)
    }

    pub fn int_field(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(FieldValue::as_int)
    }

    /// Set a field, returning the previous value if there was one.
    pub fn set_field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn remove_field(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), BundleError> {
        let payload = rmp_serde::to_vec(&self.fields)?;
        let payload_len =
            u32::try_from(payload.len()).map_err(|_| BundleError::PayloadTooLarge(payload.len()))?;

        writer.write_i64::<BE>(self.path_id)?;
        writer.write_u32::<BE>(self.class_id)?;
        writer.write_u32::<BE>(payload_len)?;
        writer.write_all(&payload)?;
        Ok(())
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R, index: usize) -> Result<Self, BundleError> {
        let truncated = |e: io::Error| match e.kind() {
            io::ErrorKind::UnexpectedEof => BundleError::TruncatedRecords(index),
            _ => BundleError::Io(e),
        };

        let path_id = reader.read_i64::<BE>().map_err(truncated)?;
        let class_id = reader.read_u32::<BE>().map_err(truncated)?;
        let payload_len = reader.read_u32::<BE>().map_err(truncated)? as usize;

        let mut payload = Vec::new();
        reader
            .by_ref()
            .take(payload_len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != payload_len {
            return Err(BundleError::TruncatedRecords(index));
        }

        let fields = rmp_serde::from_slice(&payload)?;
        Ok(Self {
            path_id,
            class_id,
            fields,
        })
    }
}
