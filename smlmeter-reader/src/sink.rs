//! Output sinks for decoded frames and diagnostics.

use crate::config::OutputFormat;
use crate::error::ReaderError;
use serde::Serialize;
use smlmeter_protocol::{Diagnostic, Element, Value};
use std::io::Write;

/// Receives decoded frames and failure diagnostics.
pub trait Sink {
    /// Called once per successfully decoded frame.
    fn frame(&mut self, elements: &[Element]) -> Result<(), ReaderError>;

    /// Called once per framing or decoding failure.
    fn diagnostic(&mut self, diagnostic: &Diagnostic) -> Result<(), ReaderError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn frame(&mut self, elements: &[Element]) -> Result<(), ReaderError> {
        (**self).frame(elements)
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) -> Result<(), ReaderError> {
        (**self).diagnostic(diagnostic)
    }
}

/// Creates the sink for the configured output format.
pub fn for_format<W: Write + 'static>(format: OutputFormat, writer: W) -> Box<dyn Sink> {
    match format {
        OutputFormat::Text => Box::new(TextSink::new(writer)),
        OutputFormat::Json => Box::new(JsonSink::new(writer)),
    }
}

/// Prints frames as an indented element tree.
///
/// ```text
/// list(2)
///   unsigned(5) 1
///   octet_string(4) 616263 "abc"
/// ```
pub struct TextSink<W> {
    writer: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_element(&mut self, element: &Element, depth: usize) -> std::io::Result<()> {
        let indent = "  ".repeat(depth);
        let head = format!("{}{}({})", indent, element.tlv_type, element.length);
        match &element.value {
            Value::OctetString(None) => writeln!(self.writer, "{}", head),
            Value::OctetString(Some(bytes)) => {
                if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                    writeln!(
                        self.writer,
                        "{} {} {:?}",
                        head,
                        hex::encode(bytes),
                        String::from_utf8_lossy(bytes)
                    )
                } else {
                    writeln!(self.writer, "{} {}", head, hex::encode(bytes))
                }
            }
            Value::Boolean(v) => writeln!(self.writer, "{} {}", head, v),
            Value::Integer(v) => writeln!(self.writer, "{} {}", head, v),
            Value::Unsigned(v) => writeln!(self.writer, "{} {}", head, v),
            Value::List(children) => {
                writeln!(self.writer, "{}", head)?;
                for child in children {
                    self.write_element(child, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl<W: Write> Sink for TextSink<W> {
    fn frame(&mut self, elements: &[Element]) -> Result<(), ReaderError> {
        writeln!(self.writer, "frame ({} elements)", elements.len())?;
        for element in elements {
            self.write_element(element, 1)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) -> Result<(), ReaderError> {
        writeln!(self.writer, "error {}", diagnostic)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Record<'a> {
    Frame(&'a [Element]),
    Diagnostic(&'a Diagnostic),
}

/// Writes one JSON object per frame or diagnostic, newline-delimited.
pub struct JsonSink<W> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_record(&mut self, record: &Record<'_>) -> Result<(), ReaderError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> Sink for JsonSink<W> {
    fn frame(&mut self, elements: &[Element]) -> Result<(), ReaderError> {
        self.write_record(&Record::Frame(elements))
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) -> Result<(), ReaderError> {
        self.write_record(&Record::Diagnostic(diagnostic))
    }
}
