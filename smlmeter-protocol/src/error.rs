//! Protocol error types and failure codes.

use crate::element::TlvType;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Maximum number of raw bytes attached to a diagnostic.
const RAW_CONTEXT: usize = 16;

/// Errors raised while building or handling SML data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("cannot encode {tlv_type} element of length {length} in a single header byte")]
    Unencodable { tlv_type: TlvType, length: usize },

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors from the TLV decoder. Offsets are relative to the start of the
/// frame payload (version tag already stripped).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unrecognized TLV type {type_code:#x} (length {length}) at offset {offset}")]
    UnknownType {
        header: u8,
        type_code: u8,
        length: usize,
        offset: usize,
    },

    #[error("extended length marker {header:#04x} at offset {offset} has no previous element")]
    MissingPreviousType { header: u8, offset: usize },

    #[error("{tlv_type} element at offset {offset} needs {needed} bytes, {available} available")]
    Truncated {
        tlv_type: TlvType,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("{tlv_type} element at offset {offset} has invalid length {length}")]
    InvalidLength {
        tlv_type: TlvType,
        offset: usize,
        length: usize,
    },

    #[error("{tlv_type} element at offset {offset} is {width} bytes wide (max 16)")]
    IntegerTooWide {
        tlv_type: TlvType,
        offset: usize,
        width: usize,
    },

    #[error("list at offset {offset} declares {declared} elements, payload ended after {decoded}")]
    ListTruncated {
        offset: usize,
        declared: usize,
        decoded: usize,
    },

    #[error("list nesting deeper than {max} at offset {offset}")]
    NestingTooDeep { offset: usize, max: usize },
}

impl DecodeError {
    /// Byte offset of the offending element within the payload.
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::UnknownType { offset, .. }
            | DecodeError::MissingPreviousType { offset, .. }
            | DecodeError::Truncated { offset, .. }
            | DecodeError::InvalidLength { offset, .. }
            | DecodeError::IntegerTooWide { offset, .. }
            | DecodeError::ListTruncated { offset, .. }
            | DecodeError::NestingTooDeep { offset, .. } => *offset,
        }
    }

    /// Returns whether the payload contained a header with an unknown type code.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, DecodeError::UnknownType { .. })
    }

    /// Returns the failure code reported for this error.
    pub fn failure_kind(&self) -> FailureKind {
        if self.is_unknown_type() {
            FailureKind::UnrecognizedTlvType
        } else {
            FailureKind::MalformedElement
        }
    }
}

/// Stable failure codes attached to diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// End marker found at or before the start marker.
    FramingCorrupt,
    /// Payload does not start with the version 1 tag.
    UnsupportedVersion,
    /// Header nibble outside the known type set.
    UnrecognizedTlvType,
    /// Element whose declared length does not fit the payload.
    MalformedElement,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::FramingCorrupt => write!(f, "FRAMING_CORRUPT"),
            FailureKind::UnsupportedVersion => write!(f, "UNSUPPORTED_VERSION"),
            FailureKind::UnrecognizedTlvType => write!(f, "UNRECOGNIZED_TLV_TYPE"),
            FailureKind::MalformedElement => write!(f, "MALFORMED_ELEMENT"),
        }
    }
}

/// Structured failure event carrying the raw bytes needed to debug it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: FailureKind,
    #[serde(serialize_with = "serialize_hex")]
    pub raw: Bytes,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: FailureKind, raw: impl Into<Bytes>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
            detail: detail.into(),
        }
    }

    /// Diagnostic for a decode failure; `raw` holds the payload from the
    /// offending element onwards (at most 16 bytes).
    pub fn from_decode(payload: &Bytes, error: &DecodeError) -> Self {
        let start = error.offset().min(payload.len());
        let end = (start + RAW_CONTEXT).min(payload.len());
        Self::new(error.failure_kind(), payload.slice(start..end), error.to_string())
    }

    /// Diagnostic for a discarded buffer; `raw` holds its first bytes.
    pub fn from_resync(discarded: &Bytes) -> Self {
        Self::new(
            FailureKind::FramingCorrupt,
            discarded.slice(..RAW_CONTEXT.min(discarded.len())),
            format!(
                "end marker before start marker, discarded {} bytes",
                discarded.len()
            ),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.kind, self.detail, hex::encode(&self.raw))
    }
}

fn serialize_hex<S>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(value))
}
