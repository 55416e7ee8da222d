use std::collections::HashMap;
use std::fmt::Display;
use std::time::SystemTime;

use crate::accessor::{self, Endianness, FieldType, FieldValue, Overflow};
use crate::{Error, Result};

/// Definition of a named field within a packet buffer.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub name: String,
    pub bit_offset: i64,
    pub bit_size: u32,
    pub data_type: FieldType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub endianness: Endianness,
}

impl FieldDef {
    pub fn new(name: &str, bit_offset: i64, bit_size: u32, data_type: FieldType) -> Self {
        FieldDef {
            name: name.to_string(),
            bit_offset,
            bit_size,
            data_type,
            endianness: Endianness::Big,
        }
    }
}

/// A named, typed binary record.
///
/// The framing layer treats a packet as an opaque buffer of bytes with a
/// name; only Template framing consults the field table, to substitute
/// command variables and to store captured response values.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    target: Option<String>,
    name: Option<String>,
    buffer: Vec<u8>,
    fields: Vec<FieldDef>,
    /// When the packet's framing bytes completed in the stream.
    pub received_time: Option<SystemTime>,
    /// Packet came from stored telemetry rather than the live link.
    pub stored: bool,
    /// Free-form metadata carried alongside the packet.
    pub extra: Option<HashMap<String, String>>,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{target: {:?}, name: {:?}, data:[len={}]}}",
            self.target,
            self.name,
            self.buffer.len()
        )
    }
}

impl Packet {
    #[must_use]
    pub fn new(target: &str, name: &str) -> Self {
        Packet {
            target: Some(target.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// An anonymous packet wrapping raw bytes carved from a stream.
    #[must_use]
    pub fn from_buffer(buffer: Vec<u8>) -> Self {
        Packet {
            buffer,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    pub fn set_buffer(&mut self, buffer: Vec<u8>) {
        self.buffer = buffer;
    }

    pub fn add_field(&mut self, field: FieldDef) {
        self.fields.push(field);
    }

    /// Builder-style [`add_field`](Self::add_field).
    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Read the named field's raw value out of the buffer.
    ///
    /// # Errors
    /// [`Error::UnknownField`] for an undefined name, otherwise any accessor
    /// error.
    pub fn read_field(&self, name: &str) -> Result<FieldValue> {
        let field = self
            .field(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        accessor::read(
            field.bit_offset,
            field.bit_size,
            field.data_type,
            &self.buffer,
            field.endianness,
        )
    }

    /// Write a raw value into the named field.
    ///
    /// # Errors
    /// [`Error::UnknownField`] for an undefined name, otherwise any accessor
    /// error.
    pub fn write_field(&mut self, name: &str, value: &FieldValue) -> Result<()> {
        let field = self
            .field(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?
            .clone();
        accessor::write(
            value,
            field.bit_offset,
            field.bit_size,
            field.data_type,
            &mut self.buffer,
            field.endianness,
            Overflow::Error,
        )
    }

    /// Parse `text` according to the named field's type and write it.
    ///
    /// This is how captured response values, which are always text, make it
    /// into typed response packets. Integer fields accept a `0x` prefix.
    ///
    /// # Errors
    /// [`Error::FieldParams`] when the text does not parse as the field's
    /// type, otherwise as [`write_field`](Self::write_field).
    pub fn write_field_str(&mut self, name: &str, text: &str) -> Result<()> {
        let field = self
            .field(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        let value = parse_field_value(field.data_type, text)?;
        self.write_field(name, &value)
    }
}

fn parse_field_value(data_type: FieldType, text: &str) -> Result<FieldValue> {
    let bad = |err: &dyn Display| {
        Error::FieldParams(format!("could not parse {text:?} as {data_type}: {err}"))
    };
    let trimmed = text.trim();
    match data_type {
        FieldType::Uint => {
            let v = if let Some(hex) = trimmed.strip_prefix("0x") {
                u64::from_str_radix(hex, 16)
            } else {
                trimmed.parse()
            };
            Ok(FieldValue::Uint(v.map_err(|e| bad(&e))?))
        }
        FieldType::Int => {
            let v = if let Some(hex) = trimmed.strip_prefix("0x") {
                i64::from_str_radix(hex, 16)
            } else {
                trimmed.parse()
            };
            Ok(FieldValue::Int(v.map_err(|e| bad(&e))?))
        }
        FieldType::Float => Ok(FieldValue::Float(trimmed.parse().map_err(|e| bad(&e))?)),
        FieldType::String => Ok(FieldValue::String(text.to_string())),
        FieldType::Block => Ok(FieldValue::Block(text.as_bytes().to_vec())),
    }
}
