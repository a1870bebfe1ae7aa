//! Decoded SML elements.
//!
//! Every element starts with a one-byte header:
//!
//! ```text
//! +-----------+-----------+
//! | type (hi) | len (lo)  |
//! |  4 bits   |  4 bits   |
//! +-----------+-----------+
//! ```
//!
//! For scalar types the length counts the header byte itself. For lists it
//! is the number of child elements that follow.

use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::fmt;

/// Element type carried in the high nibble of the header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TlvType {
    OctetString,
    Boolean,
    Integer,
    Unsigned,
    List,
}

impl TlvType {
    /// Maps a header high nibble to a type. The extended-length nibble is not
    /// a type of its own and maps to `None` like any unknown code.
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0 => Some(TlvType::OctetString),
            4 => Some(TlvType::Boolean),
            5 => Some(TlvType::Integer),
            6 => Some(TlvType::Unsigned),
            7 => Some(TlvType::List),
            _ => None,
        }
    }

    /// Returns the header high nibble for this type.
    pub fn nibble(&self) -> u8 {
        match self {
            TlvType::OctetString => 0,
            TlvType::Boolean => 4,
            TlvType::Integer => 5,
            TlvType::Unsigned => 6,
            TlvType::List => 7,
        }
    }
}

impl fmt::Display for TlvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlvType::OctetString => write!(f, "octet_string"),
            TlvType::Boolean => write!(f, "boolean"),
            TlvType::Integer => write!(f, "integer"),
            TlvType::Unsigned => write!(f, "unsigned"),
            TlvType::List => write!(f, "list"),
        }
    }
}

/// Type-dependent payload of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Raw string bytes; `None` when the string is empty.
    OctetString(#[serde(serialize_with = "serialize_octets")] Option<Bytes>),
    Boolean(bool),
    Integer(i128),
    Unsigned(u128),
    List(Vec<Element>),
}

/// One decoded TLV element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    /// Element type.
    #[serde(rename = "type")]
    pub tlv_type: TlvType,
    /// Declared length: the header low nibble, or the fixed extended length.
    pub length: usize,
    /// Decoded value.
    pub value: Value,
}

impl Element {
    pub fn octet_string(value: impl Into<Bytes>) -> Self {
        let value: Bytes = value.into();
        let length = value.len() + 1;
        let value = if value.is_empty() { None } else { Some(value) };
        Self {
            tlv_type: TlvType::OctetString,
            length,
            value: Value::OctetString(value),
        }
    }

    pub fn boolean(value: bool, length: usize) -> Self {
        Self {
            tlv_type: TlvType::Boolean,
            length,
            value: Value::Boolean(value),
        }
    }

    /// An unsigned element spanning `width` value bytes.
    pub fn unsigned(value: u128, width: usize) -> Self {
        Self {
            tlv_type: TlvType::Unsigned,
            length: width + 1,
            value: Value::Unsigned(value),
        }
    }

    /// A signed element spanning `width` value bytes.
    pub fn integer(value: i128, width: usize) -> Self {
        Self {
            tlv_type: TlvType::Integer,
            length: width + 1,
            value: Value::Integer(value),
        }
    }

    pub fn list(children: Vec<Element>) -> Self {
        Self {
            tlv_type: TlvType::List,
            length: children.len(),
            value: Value::List(children),
        }
    }

    pub fn as_unsigned(&self) -> Option<u128> {
        match self.value {
            Value::Unsigned(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self.value {
            Value::Integer(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the string bytes, or `None` for empty strings and other types.
    pub fn as_octets(&self) -> Option<&Bytes> {
        match &self.value {
            Value::OctetString(v) => v.as_ref(),
            _ => None,
        }
    }

    /// Returns the children of a list element.
    pub fn children(&self) -> Option<&[Element]> {
        match &self.value {
            Value::List(children) => Some(children),
            _ => None,
        }
    }

    /// Number of elements in this subtree, the element itself included.
    pub fn count(&self) -> usize {
        match &self.value {
            Value::List(children) => 1 + children.iter().map(Element::count).sum::<usize>(),
            _ => 1,
        }
    }
}

fn serialize_octets<S>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(bytes) => serializer.serialize_str(&hex::encode(bytes)),
        None => serializer.serialize_none(),
    }
}
