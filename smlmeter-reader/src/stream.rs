//! Byte source abstraction for serial ports and plain files.

use crate::config::{TransportConfig, TransportMode};
use crate::error::ReaderError;
use pin_project_lite::pin_project;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};
use tracing::info;

pin_project! {
    /// A meter byte stream that can be either a serial port or a plain file.
    #[project = MeterStreamProj]
    pub enum MeterStream {
        Serial { #[pin] stream: SerialStream },
        File { #[pin] stream: File },
    }
}

impl MeterStream {
    /// Opens the configured device.
    pub async fn open(config: &TransportConfig) -> Result<Self, ReaderError> {
        let device = config.device.as_deref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no device configured")
        })?;

        match config.mode {
            TransportMode::Serial => Self::open_serial(device, config.baud_rate),
            TransportMode::File => Self::open_file(device).await,
        }
    }

    /// Opens a serial port, 8N1 without flow control.
    pub fn open_serial(device: &Path, baud_rate: u32) -> Result<Self, ReaderError> {
        let builder = tokio_serial::new(device.to_string_lossy(), baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None);
        let stream = SerialStream::open(&builder)?;
        info!(device = %device.display(), baud_rate, "opened serial port");
        Ok(MeterStream::Serial { stream })
    }

    /// Opens a plain file for reading.
    pub async fn open_file(device: &Path) -> Result<Self, ReaderError> {
        let stream = File::open(device).await?;
        info!(device = %device.display(), "opened file");
        Ok(MeterStream::File { stream })
    }

    /// Returns whether this stream reads from a serial port.
    pub fn is_serial(&self) -> bool {
        matches!(self, MeterStream::Serial { .. })
    }
}

impl AsyncRead for MeterStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            MeterStreamProj::Serial { stream } => stream.poll_read(cx, buf),
            MeterStreamProj::File { stream } => stream.poll_read(cx, buf),
        }
    }
}
