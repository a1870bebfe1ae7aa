//! Stream decoder and frame encoder.

use crate::decoder::decode;
use crate::element::{Element, TlvType, Value};
use crate::error::{DecodeError, ProtocolError};
use crate::frame::{Extraction, Frame};
use crate::{END_MARKER, MAX_NUMERIC_WIDTH, START_MARKER, VERSION_1};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

/// Outcome of one decoding attempt on the buffered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A frame was extracted and decoded.
    Frame(Vec<Element>),
    /// Corrupt framing; carries the discarded buffer.
    Resync { discarded: Bytes },
    /// Version tag mismatch; the buffer was discarded.
    UnsupportedVersion(Bytes),
    /// A frame was extracted but its payload failed to decode.
    DecodeFailed { payload: Bytes, error: DecodeError },
}

/// Accumulates transport bytes and turns them into decoded frames.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        trace!(buffered = self.buffer.len(), "buffer extended");
    }

    /// Attempts to extract and decode the next frame.
    ///
    /// Returns `None` if more data is needed.
    pub fn next_event(&mut self) -> Option<Event> {
        match Frame::extract(&mut self.buffer) {
            Extraction::Incomplete => None,
            Extraction::Resync { discarded } => Some(Event::Resync { discarded }),
            Extraction::UnsupportedVersion(version) => Some(Event::UnsupportedVersion(version)),
            Extraction::Frame(frame) => match decode(frame.payload.clone()) {
                Ok(elements) => {
                    debug!(
                        elements = elements.len(),
                        total = elements.iter().map(Element::count).sum::<usize>(),
                        "decoded SML frame"
                    );
                    Some(Event::Frame(elements))
                }
                Err(error) => Some(Event::DecodeFailed {
                    payload: frame.payload,
                    error,
                }),
            },
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds SML frames and element sequences.
pub struct Encoder;

impl Encoder {
    /// Wraps a payload in start marker, version tag and end marker.
    pub fn encode_frame(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(
            START_MARKER.len() + VERSION_1.len() + payload.len() + END_MARKER.len(),
        );
        buf.put_slice(&START_MARKER);
        buf.put_slice(&VERSION_1);
        buf.put_slice(payload);
        buf.put_slice(&END_MARKER);
        buf
    }

    /// Encodes elements with single-byte headers.
    pub fn encode_elements(elements: &[Element]) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::new();
        for element in elements {
            Self::encode_element(element, &mut buf)?;
        }
        Ok(buf)
    }

    /// Encodes a list of elements and wraps them into a frame.
    pub fn encode_message(elements: &[Element]) -> Result<BytesMut, ProtocolError> {
        let payload = Self::encode_elements(elements)?;
        Ok(Self::encode_frame(&payload))
    }

    fn encode_element(element: &Element, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let unencodable = || ProtocolError::Unencodable {
            tlv_type: element.tlv_type,
            length: element.length,
        };
        if element.length > 0x0F {
            return Err(unencodable());
        }
        buf.put_u8((element.tlv_type.nibble() << 4) | element.length as u8);

        match (&element.value, element.tlv_type) {
            (Value::OctetString(value), TlvType::OctetString) => {
                let bytes = value.as_deref().unwrap_or_default();
                if bytes.len() != element.length.saturating_sub(1) {
                    return Err(unencodable());
                }
                buf.put_slice(bytes);
            }
            (Value::Boolean(value), TlvType::Boolean) => {
                if *value != (element.length > 0) {
                    return Err(unencodable());
                }
                // Booleans span the full declared length after the header
                buf.put_bytes(0x01, element.length);
            }
            (Value::Unsigned(value), TlvType::Unsigned) => {
                let width = element.length.checked_sub(1).ok_or_else(unencodable)?;
                buf.put_slice(&value.to_be_bytes()[MAX_NUMERIC_WIDTH - width..]);
            }
            (Value::Integer(value), TlvType::Integer) => {
                let width = element.length.checked_sub(1).ok_or_else(unencodable)?;
                buf.put_slice(&value.to_be_bytes()[MAX_NUMERIC_WIDTH - width..]);
            }
            (Value::List(children), TlvType::List) => {
                if children.len() != element.length {
                    return Err(unencodable());
                }
                for child in children {
                    Self::encode_element(child, buf)?;
                }
            }
            _ => return Err(unencodable()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Vec<Element> {
        vec![
            Element::list(vec![
                Element::octet_string(vec![0x00, 0x11, 0x2a]),
                Element::unsigned(0, 1),
                Element::list(vec![Element::unsigned(0x0701, 2), Element::integer(-1, 1)]),
                Element::octet_string(Bytes::new()),
            ]),
            Element::octet_string(Bytes::new()),
        ]
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut decoder = Decoder::new();
        decoder.extend(&[0x1B, 0x1B, 0x1B, 0x1B]);
        decoder.extend(&[0x01, 0x01, 0x01, 0x01]);
        decoder.extend(&[0x65, 0x00, 0x00, 0x00, 0x01]);
        decoder.extend(&[0x1B, 0x1B, 0x1B, 0x1B, 0x1A]);

        let event = decoder.next_event().unwrap();
        assert_eq!(event, Event::Frame(vec![Element::unsigned(1, 4)]));
        assert_eq!(decoder.buffered(), 0);
        assert!(decoder.next_event().is_none());
    }

    #[test]
    fn test_encoder_decoder_roundtrip() {
        let message = sample_message();
        let encoded = Encoder::encode_message(&message).unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        assert_eq!(decoder.next_event(), Some(Event::Frame(message)));
    }

    #[test]
    fn test_partial_frame_decoding() {
        let encoded = Encoder::encode_message(&sample_message()).unwrap();
        let mut decoder = Decoder::new();

        // Feed partial data
        decoder.extend(&encoded[..10]);
        assert!(decoder.next_event().is_none());
        assert_eq!(decoder.buffered(), 10);

        // Feed the rest
        decoder.extend(&encoded[10..]);
        assert!(matches!(decoder.next_event(), Some(Event::Frame(_))));
    }

    #[test]
    fn test_resync_event() {
        let mut decoder = Decoder::new();
        decoder.extend(&[0x62, 0x01]);
        decoder.extend(&END_MARKER);

        match decoder.next_event() {
            Some(Event::Resync { discarded }) => {
                assert_eq!(discarded.len(), 7);
                assert_eq!(&discarded[..2], &[0x62, 0x01]);
            }
            other => panic!("expected resync, got {:?}", other),
        }
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_unsupported_version_event() {
        let mut decoder = Decoder::new();
        decoder.extend(&START_MARKER);
        decoder.extend(&[0x02, 0x02, 0x02, 0x02, 0x62, 0x01]);
        decoder.extend(&END_MARKER);

        assert_eq!(
            decoder.next_event(),
            Some(Event::UnsupportedVersion(Bytes::from_static(&[
                0x02, 0x02, 0x02, 0x02
            ])))
        );
    }

    #[test]
    fn test_decode_failed_event() {
        let mut decoder = Decoder::new();
        decoder.extend(&Encoder::encode_frame(&[0x62, 0x01, 0x93, 0x00, 0x00]));

        match decoder.next_event() {
            Some(Event::DecodeFailed { payload, error }) => {
                assert_eq!(payload.as_ref(), &[0x62, 0x01, 0x93, 0x00, 0x00]);
                assert!(error.is_unknown_type());
            }
            other => panic!("expected decode failure, got {:?}", other),
        }
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_buffered() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.buffered(), 0);

        decoder.extend(b"some data");
        assert_eq!(decoder.buffered(), 9);

        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_default() {
        let decoder = Decoder::default();
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_encode_frame_layout() {
        let encoded = Encoder::encode_frame(&[0x62, 0x01]);
        assert_eq!(
            encoded.as_ref(),
            &[
                0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01, 0x62, 0x01, 0x1B, 0x1B, 0x1B,
                0x1B, 0x1A
            ]
        );
    }

    #[test]
    fn test_encode_scalars() {
        let encoded = Encoder::encode_elements(&[
            Element::unsigned(1, 4),
            Element::integer(-200, 2),
            Element::boolean(true, 1),
            Element::octet_string(&b"ab"[..]),
        ])
        .unwrap();
        assert_eq!(
            encoded.as_ref(),
            &[0x65, 0x00, 0x00, 0x00, 0x01, 0x53, 0xFF, 0x38, 0x41, 0x01, 0x03, b'a', b'b']
        );
    }

    #[test]
    fn test_encode_rejects_long_elements() {
        let long = Element::octet_string(vec![0u8; 20]);
        let result = Encoder::encode_elements(&[long]);
        assert!(matches!(
            result,
            Err(ProtocolError::Unencodable {
                tlv_type: TlvType::OctetString,
                length: 21,
            })
        ));
    }

    #[test]
    fn test_encode_rejects_inconsistent_list() {
        let mut list = Element::list(vec![Element::unsigned(1, 1)]);
        list.length = 3;
        assert!(Encoder::encode_elements(&[list]).is_err());
    }
}
