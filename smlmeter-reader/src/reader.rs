//! Meter read loop.
//!
//! A single task reads whatever bytes the transport has available and appends
//! them to the frame buffer one byte at a time, attempting extraction after
//! each byte. Extraction clears the buffer, so it never holds more than one
//! frame at that point. Framing errors discard the buffer and reading
//! continues. Decode failures are
//! reported per frame, except unknown TLV types under
//! [`UnknownTypePolicy::Abort`], which stop the loop.

use crate::config::{Config, UnknownTypePolicy};
use crate::error::ReaderError;
use crate::sink::Sink;
use serde::Serialize;
use smlmeter_protocol::{Decoder, Diagnostic, Event, FailureKind};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, info, trace, warn};

/// Default size of the per-read scratch buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 512;

/// Counters collected over one reader run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReaderStats {
    /// Bytes received from the transport.
    pub bytes_read: u64,
    /// Frames decoded and delivered to the sink.
    pub frames: u64,
    /// Buffers discarded because of corrupt framing.
    pub resyncs: u64,
    /// Frames rejected for an unsupported version.
    pub version_errors: u64,
    /// Frames whose payload failed to decode.
    pub decode_failures: u64,
}

/// Reads SML frames from a byte stream and forwards them to a sink.
pub struct MeterReader<S, K> {
    stream: S,
    sink: K,
    decoder: Decoder,
    policy: UnknownTypePolicy,
    read_buffer_size: usize,
    stats: ReaderStats,
}

impl<S, K> MeterReader<S, K>
where
    S: AsyncRead + Unpin,
    K: Sink,
{
    /// Creates a reader with default settings.
    pub fn new(stream: S, sink: K) -> Self {
        Self {
            stream,
            sink,
            decoder: Decoder::new(),
            policy: UnknownTypePolicy::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            stats: ReaderStats::default(),
        }
    }

    /// Creates a reader using the decode and transport settings of `config`.
    pub fn from_config(stream: S, sink: K, config: &Config) -> Self {
        Self::new(stream, sink)
            .with_policy(config.decode.on_unknown_type)
            .with_read_buffer_size(config.transport.read_buffer_size)
    }

    pub fn with_policy(mut self, policy: UnknownTypePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Returns the counters collected so far.
    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Reads until the stream ends or a fatal error occurs.
    pub async fn run(&mut self) -> Result<ReaderStats, ReaderError> {
        let mut scratch = vec![0u8; self.read_buffer_size];

        loop {
            let n = self.stream.read(&mut scratch).await?;
            if n == 0 {
                info!(
                    buffered = self.decoder.buffered(),
                    frames = self.stats.frames,
                    "end of stream"
                );
                return Ok(self.stats);
            }

            self.stats.bytes_read += n as u64;
            self.feed(&scratch[..n])?;
        }
    }

    /// Appends bytes and handles every event they complete.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), ReaderError> {
        trace!(buflen = self.decoder.buffered(), "read {} bytes", data.len());

        for byte in data.chunks(1) {
            self.decoder.extend(byte);
            while let Some(event) = self.decoder.next_event() {
                self.handle(event)?;
            }
        }
        Ok(())
    }

    fn handle(&mut self, event: Event) -> Result<(), ReaderError> {
        match event {
            Event::Frame(elements) => {
                self.stats.frames += 1;
                self.sink.frame(&elements)
            }
            Event::Resync { discarded } => {
                self.stats.resyncs += 1;
                warn!(discarded = discarded.len(), "corrupt framing, buffer discarded");
                self.sink.diagnostic(&Diagnostic::from_resync(&discarded))
            }
            Event::UnsupportedVersion(version) => {
                self.stats.version_errors += 1;
                self.sink.diagnostic(&Diagnostic::new(
                    FailureKind::UnsupportedVersion,
                    version,
                    "unsupported SML version",
                ))
            }
            Event::DecodeFailed { payload, error } => {
                self.stats.decode_failures += 1;
                let diagnostic = Diagnostic::from_decode(&payload, &error);
                self.sink.diagnostic(&diagnostic)?;

                if error.is_unknown_type() && self.policy == UnknownTypePolicy::Abort {
                    error!(
                        %error,
                        payload = %hex::encode(&payload),
                        "unhandled TLV type, aborting"
                    );
                    return Err(ReaderError::Fatal(error));
                }

                warn!(%error, payload = %hex::encode(&payload), "frame skipped");
                Ok(())
            }
        }
    }
}
