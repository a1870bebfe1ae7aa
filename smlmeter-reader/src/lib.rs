//! # smlmeter-reader
//!
//! Reads SML frames from a meter's serial interface (or a recorded capture)
//! and hands decoded element trees and diagnostics to an output sink.

pub mod config;
pub mod error;
pub mod reader;
pub mod sink;
pub mod stream;

pub use config::{Config, ConfigError, OutputFormat, TransportMode, UnknownTypePolicy};
pub use error::ReaderError;
pub use reader::{MeterReader, ReaderStats};
pub use sink::{JsonSink, Sink, TextSink};
pub use stream::MeterStream;
