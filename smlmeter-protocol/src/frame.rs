//! SML transport frame extraction.
//!
//! Frame layout on the wire:
//!
//! ```text
//! +-------------+-------------+-----------------+----------------+
//! | start       | version     | payload         | end            |
//! | 1b1b1b1b    | 01010101    | TLV elements    | 1b1b1b1b 1a    |
//! +-------------+-------------+-----------------+----------------+
//! ```
//!
//! The three bytes following the end marker (fill count and CRC) are not
//! checked. At most one frame is taken per buffer fill: after a frame is
//! extracted the whole buffer is discarded.

use crate::{END_MARKER, START_MARKER, VERSION_1};
use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, warn};

/// Payload of one extracted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// TLV payload with the version tag stripped.
    pub payload: Bytes,
    /// Number of bytes that preceded the start marker.
    pub skipped: usize,
}

/// Result of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Start or end marker not yet buffered; the buffer is untouched.
    Incomplete,
    /// End marker found at or before the start marker; carries the discarded
    /// buffer.
    Resync { discarded: Bytes },
    /// Payload does not begin with the version tag; the buffer was discarded.
    /// Carries the offending bytes (up to four).
    UnsupportedVersion(Bytes),
    /// A complete frame; the buffer was discarded.
    Frame(Frame),
}

impl Frame {
    /// Attempts to extract one frame from the buffer.
    pub fn extract(buf: &mut BytesMut) -> Extraction {
        let (start, end) = match (find(&buf[..], &START_MARKER), find(&buf[..], &END_MARKER)) {
            (Some(start), Some(end)) => (start, end),
            _ => return Extraction::Incomplete,
        };

        if end <= start {
            let discarded = buf.split().freeze();
            debug!(
                start,
                end,
                discarded = discarded.len(),
                "end marker precedes start marker, resynchronizing"
            );
            return Extraction::Resync { discarded };
        }

        // Overlapping markers (e.g. 1b1b1b1b1b1a) leave an empty body
        let body_start = (start + START_MARKER.len()).min(end);
        let body = &buf[body_start..end];

        if body.len() < VERSION_1.len() || body[..VERSION_1.len()] != VERSION_1 {
            let version = Bytes::copy_from_slice(&body[..body.len().min(VERSION_1.len())]);
            warn!(version = %hex::encode(&version), "unsupported SML version");
            buf.clear();
            return Extraction::UnsupportedVersion(version);
        }

        let mut frame = buf.split_to(end);
        frame.advance(body_start + VERSION_1.len());
        let payload = frame.freeze();
        buf.clear();

        debug!(
            len = payload.len(),
            skipped = start,
            payload = %hex::encode(&payload),
            "extracted SML frame"
        );

        Extraction::Frame(Frame {
            payload,
            skipped: start,
        })
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
