//! # smlmeter-protocol
//!
//! SML (Smart Message Language) wire protocol as emitted by electricity meters
//! on their optical/serial interface.
//!
//! This crate provides:
//! - Frame extraction from an accumulating byte buffer (start/end markers, version tag)
//! - A recursive TLV decoder producing a tree of typed elements
//! - A stream decoder that ties both together, and an encoder for building frames
//! - Error types and stable failure codes for diagnostics

pub mod codec;
pub mod decoder;
pub mod element;
pub mod error;
pub mod frame;

pub use codec::{Decoder, Encoder, Event};
pub use decoder::decode;
pub use element::{Element, TlvType, Value};
pub use error::{DecodeError, Diagnostic, FailureKind, ProtocolError};
pub use frame::{Extraction, Frame};

/// Escape sequence opening every SML transport frame.
pub const START_MARKER: [u8; 4] = [0x1B, 0x1B, 0x1B, 0x1B];

/// Escape sequence closing every SML transport frame.
pub const END_MARKER: [u8; 5] = [0x1B, 0x1B, 0x1B, 0x1B, 0x1A];

/// Version tag of SML transport protocol version 1.
pub const VERSION_1: [u8; 4] = [0x01, 0x01, 0x01, 0x01];

/// High nibble marking an element that reuses the previous element's type.
pub const EXTENDED_LENGTH: u8 = 8;

/// Fixed length assumed for elements introduced by [`EXTENDED_LENGTH`].
pub const EXTENDED_LENGTH_VALUE: usize = 48;

/// Maximum list nesting accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Widest numeric value, in bytes, that decodes into an `i128`/`u128`.
pub const MAX_NUMERIC_WIDTH: usize = 16;
