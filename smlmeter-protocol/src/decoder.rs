//! Recursive TLV decoder for SML payloads.
//!
//! The payload is consumed front to back through a [`Cursor`] that only ever
//! narrows. Lists consume their header byte and then decode the declared
//! number of children from the same cursor.
//!
//! An extended-length header (high nibble 8) reuses the type of the most
//! recently decoded header, in document order, and fixes the length at 48.
//! That type is threaded through every call instead of living in shared state.

use crate::element::{Element, TlvType, Value};
use crate::error::DecodeError;
use crate::{EXTENDED_LENGTH, EXTENDED_LENGTH_VALUE, MAX_NESTING_DEPTH, MAX_NUMERIC_WIDTH};
use bytes::{Buf, Bytes};
use tracing::trace;

/// Decodes a frame payload into its top-level elements.
pub fn decode(payload: Bytes) -> Result<Vec<Element>, DecodeError> {
    let mut cursor = Cursor::new(payload);
    let mut elements = Vec::new();
    let mut previous = None;

    while !cursor.is_empty() {
        let (element, last) = decode_element(&mut cursor, previous, 0)?;
        previous = Some(last);
        elements.push(element);
    }

    Ok(elements)
}

/// Remaining payload plus the position of its first byte.
struct Cursor {
    buf: Bytes,
    total: usize,
}

impl Cursor {
    fn new(buf: Bytes) -> Self {
        let total = buf.len();
        Self { buf, total }
    }

    fn offset(&self) -> usize {
        self.total - self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, tlv_type: TlvType, offset: usize, len: usize) -> Result<Bytes, DecodeError> {
        if len > self.buf.len() {
            return Err(DecodeError::Truncated {
                tlv_type,
                offset,
                needed: len,
                available: self.buf.len(),
            });
        }
        Ok(self.buf.split_to(len))
    }
}

/// Decodes one element (and, for lists, its subtree). Returns the element and
/// the type of the last header consumed, which seeds the next extended-length
/// marker. The cursor must not be empty.
fn decode_element(
    cursor: &mut Cursor,
    previous: Option<TlvType>,
    depth: usize,
) -> Result<(Element, TlvType), DecodeError> {
    let offset = cursor.offset();
    let header = cursor.buf[0];
    let nibble = header >> 4;

    let (tlv_type, length) = if nibble == EXTENDED_LENGTH {
        let tlv_type = previous.ok_or(DecodeError::MissingPreviousType { header, offset })?;
        (tlv_type, EXTENDED_LENGTH_VALUE)
    } else {
        let length = (header & 0x0F) as usize;
        match TlvType::from_nibble(nibble) {
            Some(tlv_type) => (tlv_type, length),
            None => {
                return Err(DecodeError::UnknownType {
                    header,
                    type_code: nibble,
                    length,
                    offset,
                })
            }
        }
    };

    let raw_len = match tlv_type {
        TlvType::List => 1,
        _ => length.clamp(1, cursor.remaining()),
    };
    trace!(
        remaining = cursor.remaining(),
        offset,
        %tlv_type,
        length,
        raw = %hex::encode(&cursor.buf[..raw_len]),
        "tlv element"
    );

    cursor.buf.advance(1);

    let value = match tlv_type {
        TlvType::Boolean => {
            let span = cursor.take(tlv_type, offset, length)?;
            Value::Boolean(!span.is_empty())
        }
        TlvType::OctetString => {
            // The declared length counts the header byte
            let len = length.saturating_sub(1);
            if len == 0 {
                Value::OctetString(None)
            } else {
                Value::OctetString(Some(cursor.take(tlv_type, offset, len)?))
            }
        }
        TlvType::Unsigned | TlvType::Integer => {
            if length == 0 {
                return Err(DecodeError::InvalidLength {
                    tlv_type,
                    offset,
                    length,
                });
            }
            let width = length - 1;
            if width > MAX_NUMERIC_WIDTH {
                return Err(DecodeError::IntegerTooWide {
                    tlv_type,
                    offset,
                    width,
                });
            }
            let span = cursor.take(tlv_type, offset, width)?;
            if tlv_type == TlvType::Unsigned {
                Value::Unsigned(be_unsigned(&span))
            } else {
                Value::Integer(be_signed(&span))
            }
        }
        TlvType::List => {
            if depth >= MAX_NESTING_DEPTH {
                return Err(DecodeError::NestingTooDeep {
                    offset,
                    max: MAX_NESTING_DEPTH,
                });
            }

            let mut children = Vec::with_capacity(length);
            let mut last = TlvType::List;
            for _ in 0..length {
                if cursor.is_empty() {
                    return Err(DecodeError::ListTruncated {
                        offset,
                        declared: length,
                        decoded: children.len(),
                    });
                }
                let (child, child_last) = decode_element(cursor, Some(last), depth + 1)?;
                last = child_last;
                children.push(child);
            }

            let element = Element {
                tlv_type,
                length,
                value: Value::List(children),
            };
            return Ok((element, last));
        }
    };

    Ok((
        Element {
            tlv_type,
            length,
            value,
        },
        tlv_type,
    ))
}

fn be_unsigned(bytes: &[u8]) -> u128 {
    bytes.iter().fold(0u128, |acc, &b| (acc << 8) | u128::from(b))
}

fn be_signed(bytes: &[u8]) -> i128 {
    if bytes.is_empty() {
        return 0;
    }
    let shift = 128 - 8 * bytes.len() as u32;
    ((be_unsigned(bytes) << shift) as i128) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_slice(data: &[u8]) -> Result<Vec<Element>, DecodeError> {
        decode(Bytes::copy_from_slice(data))
    }

    #[test]
    fn test_unsigned() {
        let elements = decode_slice(&[0x65, 0x00, 0x00, 0x00, 0x01]).unwrap();
        assert_eq!(elements, vec![Element::unsigned(1, 4)]);
        assert_eq!(elements[0].length, 5);
    }

    #[test]
    fn test_declared_length_exceeds_span() {
        let err = decode_slice(&[0x65, 0x00, 0x64]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                tlv_type: TlvType::Unsigned,
                offset: 0,
                needed: 4,
                available: 2,
            }
        );
    }

    #[test]
    fn test_integer_sign_extension() {
        let elements = decode_slice(&[0x53, 0xFF, 0x38, 0x52, 0x7F, 0x55, 0x80, 0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(elements[0].as_integer(), Some(-200));
        assert_eq!(elements[1].as_integer(), Some(127));
        assert_eq!(elements[2].as_integer(), Some(i32::MIN as i128));
    }

    #[test]
    fn test_full_width_numbers() {
        let mut data = vec![0x69];
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        data.push(0x59);
        data.extend_from_slice(&i64::MIN.to_be_bytes());

        let elements = decode_slice(&data).unwrap();
        assert_eq!(elements[0].as_unsigned(), Some(u64::MAX as u128));
        assert_eq!(elements[1].as_integer(), Some(i64::MIN as i128));
    }

    #[test]
    fn test_numbers_wider_than_eight_bytes() {
        let mut data = vec![0x6F];
        data.extend_from_slice(&[0x01; 14]);
        data.push(0x5A);
        data.extend_from_slice(&[0xFF; 9]);
        data.extend_from_slice(&[0x6A, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

        let elements = decode_slice(&data).unwrap();
        assert_eq!(
            elements[0].as_unsigned(),
            Some(u128::from_be_bytes([
                0, 0, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
                0x01, 0x01
            ]))
        );
        assert_eq!(elements[0].length, 15);
        assert_eq!(elements[1].as_integer(), Some(-1));
        assert_eq!(elements[2], Element::unsigned(1, 9));
    }

    #[test]
    fn test_zero_width_numbers() {
        let elements = decode_slice(&[0x61, 0x51]).unwrap();
        assert_eq!(elements[0].as_unsigned(), Some(0));
        assert_eq!(elements[1].as_integer(), Some(0));
    }

    #[test]
    fn test_numeric_length_zero_rejected() {
        let err = decode_slice(&[0x60]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidLength {
                tlv_type: TlvType::Unsigned,
                length: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_octet_string() {
        let elements = decode_slice(&[0x04, b'a', b'b', b'c']).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].tlv_type, TlvType::OctetString);
        assert_eq!(elements[0].length, 4);
        assert_eq!(elements[0].as_octets().unwrap().as_ref(), b"abc");
    }

    #[test]
    fn test_empty_octet_strings() {
        // 0x00 is the end-of-message marker and trailing fill byte
        let elements = decode_slice(&[0x00, 0x01, 0x00]).unwrap();
        assert_eq!(elements.len(), 3);
        for elem in &elements {
            assert_eq!(elem.value, Value::OctetString(None));
        }
    }

    #[test]
    fn test_boolean_consumes_declared_length() {
        let elements = decode_slice(&[0x42, 0x01, 0x00, 0x40]).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0], Element::boolean(true, 2));
        assert_eq!(elements[1], Element::boolean(false, 0));
    }

    #[test]
    fn test_list_recursion() {
        let elements = decode_slice(&[0x72, 0x62, 0x01, 0x52, 0xFF, 0x62, 0x09]).unwrap();
        assert_eq!(
            elements,
            vec![
                Element::list(vec![Element::unsigned(1, 1), Element::integer(-1, 1)]),
                Element::unsigned(9, 1),
            ]
        );
    }

    #[test]
    fn test_empty_list() {
        let elements = decode_slice(&[0x70, 0x62, 0x01]).unwrap();
        assert_eq!(elements[0], Element::list(vec![]));
        assert_eq!(elements[1].as_unsigned(), Some(1));
    }

    #[test]
    fn test_list_runs_past_payload() {
        let err = decode_slice(&[0x73, 0x62, 0x01]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ListTruncated {
                offset: 0,
                declared: 3,
                decoded: 1,
            }
        );
    }

    #[test]
    fn test_nested_list_error_offset() {
        let err = decode_slice(&[0x71, 0x71, 0x65, 0x00]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { offset: 2, .. }));
    }

    #[test]
    fn test_unknown_type() {
        let err = decode_slice(&[0x62, 0x01, 0x93, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownType {
                header: 0x93,
                type_code: 9,
                length: 3,
                offset: 2,
            }
        );
    }

    #[test]
    fn test_extended_length_reuses_previous_type() {
        let mut data = vec![0x03, b'a', b'b', 0x8F];
        data.extend(std::iter::repeat(b'x').take(47));

        let elements = decode_slice(&data).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].tlv_type, TlvType::OctetString);
        assert_eq!(elements[1].length, 48);
        assert_eq!(elements[1].as_octets().unwrap().len(), 47);
    }

    #[test]
    fn test_extended_length_after_list_uses_last_descendant() {
        let mut data = vec![0x71, 0x03, b'a', b'b', 0x80];
        data.extend(std::iter::repeat(0u8).take(47));

        let elements = decode_slice(&data).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].tlv_type, TlvType::List);
        assert_eq!(elements[1].tlv_type, TlvType::OctetString);
        assert_eq!(elements[1].length, 48);
    }

    #[test]
    fn test_extended_length_numeric_too_wide() {
        let err = decode_slice(&[0x62, 0x01, 0x80]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::IntegerTooWide {
                tlv_type: TlvType::Unsigned,
                offset: 2,
                width: 47,
            }
        );
    }

    #[test]
    fn test_extended_length_without_previous() {
        let err = decode_slice(&[0x81, 0x00]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingPreviousType {
                header: 0x81,
                offset: 0,
            }
        );
    }

    #[test]
    fn test_nesting_limit() {
        let data = vec![0x71; MAX_NESTING_DEPTH + 2];
        let err = decode_slice(&data).unwrap_err();
        assert!(matches!(err, DecodeError::NestingTooDeep { max, .. } if max == MAX_NESTING_DEPTH));
    }

    #[test]
    fn test_public_open_response() {
        // SML_Message carrying an SML_PublicOpen.Res, followed by two fill bytes
        let data = [
            0x76, // message: list of 6
            0x07, 0x00, 0x11, 0x00, 0x2a, 0x5c, 0x2b, // transaction id
            0x62, 0x00, // group no
            0x62, 0x00, // abort on error
            0x72, // message body: list of 2
            0x63, 0x01, 0x01, // tag 0x0101
            0x76, // public open response: list of 6
            0x01, 0x01, // codepage, client id
            0x07, 0x00, 0x11, 0x00, 0x2a, 0x5c, 0x2c, // request file id
            0x0b, 0x0a, 0x01, 0x44, 0x5a, 0x47, 0x00, 0x02, 0x82, 0x25, 0xe4, // server id
            0x01, 0x01, // ref time, version
            0x63, 0x49, 0xe5, // crc16
            0x00, // end of message
            0x00, 0x00, // fill
        ];

        let elements = decode_slice(&data).unwrap();
        assert_eq!(elements.len(), 3);

        let message = elements[0].children().unwrap();
        assert_eq!(message.len(), 6);
        assert_eq!(
            message[0].as_octets().unwrap().as_ref(),
            &[0x00, 0x11, 0x00, 0x2a, 0x5c, 0x2b]
        );
        assert_eq!(message[1].as_unsigned(), Some(0));

        let body = message[3].children().unwrap();
        assert_eq!(body[0].as_unsigned(), Some(0x0101));
        let response = body[1].children().unwrap();
        assert_eq!(response.len(), 6);
        assert_eq!(response[0].value, Value::OctetString(None));
        assert_eq!(response[3].as_octets().unwrap().len(), 10);

        assert_eq!(message[4].as_unsigned(), Some(0x49e5));
        assert_eq!(message[5].value, Value::OctetString(None));
        assert_eq!(elements[1].value, Value::OctetString(None));
    }

    proptest! {
        #[test]
        fn prop_octet_string_consumes_declared_length(
            content in prop::collection::vec(any::<u8>(), 1..15),
            trailer in prop::collection::vec(any::<u8>(), 0..8),
        ) {
            let length = content.len() + 1;
            let mut data = vec![length as u8];
            data.extend_from_slice(&content);
            data.extend_from_slice(&trailer);

            let mut cursor = Cursor::new(Bytes::from(data));
            let before = cursor.remaining();
            let (element, last) = decode_element(&mut cursor, None, 0).unwrap();

            prop_assert_eq!(last, TlvType::OctetString);
            prop_assert_eq!(element.as_octets().map(|b| b.to_vec()), Some(content));
            prop_assert_eq!(before - cursor.remaining(), length);
        }

        #[test]
        fn prop_unsigned_roundtrip(value in any::<u128>(), width in 1usize..=14) {
            let value = value & ((1u128 << (8 * width)) - 1);
            let mut data = vec![0x60 | (width as u8 + 1)];
            data.extend_from_slice(&value.to_be_bytes()[16 - width..]);

            let elements = decode_slice(&data).unwrap();
            prop_assert_eq!(elements, vec![Element::unsigned(value, width)]);
        }

        #[test]
        fn prop_integer_roundtrip(value in any::<i128>(), width in 1usize..=14) {
            let shift = 128 - 8 * width as u32;
            let value = (value << shift) >> shift;
            let mut data = vec![0x50 | (width as u8 + 1)];
            data.extend_from_slice(&value.to_be_bytes()[16 - width..]);

            let elements = decode_slice(&data).unwrap();
            prop_assert_eq!(elements, vec![Element::integer(value, width)]);
        }

        #[test]
        fn prop_list_consumes_only_header(count in 0usize..15) {
            let mut data = vec![0x70 | count as u8];
            for i in 0..count {
                data.extend_from_slice(&[0x62, i as u8]);
            }

            let mut cursor = Cursor::new(Bytes::from(data));
            let (element, _) = decode_element(&mut cursor, None, 0).unwrap();
            prop_assert!(cursor.is_empty());
            prop_assert_eq!(element.length, count);
            prop_assert_eq!(element.children().unwrap().len(), count);
        }

        #[test]
        fn prop_arbitrary_input_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode_slice(&data);
        }
    }
}
