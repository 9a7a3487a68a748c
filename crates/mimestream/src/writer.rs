//! Boundary-delimited multipart writer.
//!
//! [`MultipartWriter`] frames parts as RFC 2046 body parts:
//!
//! ```text
//! --boundary\r\n
//! Header: value\r\n
//! \r\n
//! body
//! \r\n--boundary\r\n
//! ...
//! \r\n--boundary--\r\n
//! ```
//!
//! Every byte goes through a checked sink: a sink that stops accepting data
//! fails the write with [`Error::PartialWrite`] instead of truncating it.

use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::part::Parts;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt;
use std::io::{self, Write};

/// Longest boundary allowed by RFC 2046.
pub const MAX_BOUNDARY_LENGTH: usize = 70;

/// Length of generated boundaries.
const BOUNDARY_LENGTH: usize = 60;

/// Kind of multipart container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultipartKind {
    /// Independent sibling parts, such as a body and its attachments.
    #[default]
    Mixed,
    /// Sibling renderings of the same content (plain text and HTML).
    Alternative,
    /// A root part plus resources it references (inline images).
    Related,
}

impl MultipartKind {
    /// Returns the media subtype (`mixed`, `alternative`, `related`).
    #[must_use]
    pub const fn subtype(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Alternative => "alternative",
            Self::Related => "related",
        }
    }
}

impl fmt::Display for MultipartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multipart/{}", self.subtype())
    }
}

/// Generates a random boundary token.
///
/// Alphanumeric characters are valid bare boundary characters and never need
/// quoting in a `Content-Type` parameter.
#[must_use]
pub fn random_boundary() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LENGTH)
        .map(char::from)
        .collect()
}

/// Checks a boundary against the RFC 2046 `boundary` grammar.
///
/// # Errors
///
/// Returns [`Error::MalformedBoundary`] if the boundary is empty, longer
/// than 70 characters, ends in a space, or contains a character outside
/// `bchars`.
pub fn validate_boundary(boundary: &str) -> Result<()> {
    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LENGTH {
        return Err(Error::MalformedBoundary(format!(
            "boundary must be 1 to {MAX_BOUNDARY_LENGTH} characters, got {}",
            boundary.len()
        )));
    }
    if boundary.ends_with(' ') {
        return Err(Error::MalformedBoundary(
            "boundary ends with a space".to_string(),
        ));
    }
    if let Some(c) = boundary
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(*c)))
    {
        return Err(Error::MalformedBoundary(format!(
            "invalid boundary character {c:?}"
        )));
    }
    Ok(())
}

/// Writes `parts` as one multipart body and returns the matching
/// `Content-Type` header value.
///
/// # Errors
///
/// Returns the first rendering error, wrapped with the failing part's index
/// and kind. The sink may hold a partially framed body afterwards.
pub fn write_multipart<W: Write>(target: W, kind: MultipartKind, parts: Parts) -> Result<String> {
    let mut writer = MultipartWriter::new(target);
    let content_type = writer.content_type(kind);
    parts.render_into(&mut writer)?;
    writer.finish()?;
    Ok(content_type)
}

/// Sink wrapper that counts accepted bytes and rejects zero-length writes.
#[derive(Debug)]
struct Sink<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if n == 0 && !buf.is_empty() {
            return Err(Error::PartialWrite {
                expected: self.written + buf.len() as u64,
                written: self.written,
            }
            .into());
        }
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming multipart body writer.
#[derive(Debug)]
pub struct MultipartWriter<W: Write> {
    sink: Sink<W>,
    boundary: String,
    parts: usize,
}

impl<W: Write> MultipartWriter<W> {
    /// Creates a writer with a freshly generated boundary.
    pub fn new(inner: W) -> Self {
        Self {
            sink: Sink { inner, written: 0 },
            boundary: random_boundary(),
            parts: 0,
        }
    }

    /// Creates a writer with a caller-chosen boundary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedBoundary`] if the boundary is not valid.
    pub fn with_boundary(inner: W, boundary: impl Into<String>) -> Result<Self> {
        let boundary = boundary.into();
        validate_boundary(&boundary)?;
        Ok(Self {
            sink: Sink { inner, written: 0 },
            boundary,
            parts: 0,
        })
    }

    /// Returns the boundary token.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Returns the `Content-Type` value for a container of this kind.
    #[must_use]
    pub fn content_type(&self, kind: MultipartKind) -> String {
        ContentType::multipart(kind.subtype(), self.boundary.as_str()).to_string()
    }

    /// Number of parts started so far.
    #[must_use]
    pub const fn part_count(&self) -> usize {
        self.parts
    }

    /// Total bytes accepted by the sink so far.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.sink.written
    }

    /// Writes the delimiter and headers of a new part and returns a writer
    /// for its body.
    ///
    /// # Errors
    ///
    /// Returns an error if a header contains a line break or the sink fails.
    pub fn start_part(&mut self, headers: &Headers) -> Result<PartWriter<'_, W>> {
        for (name, value) in headers.iter() {
            if name.contains(['\r', '\n', ':']) || value.contains(['\r', '\n']) {
                return Err(Error::MalformedHeader(format!(
                    "line break in header {name:?}"
                )));
            }
        }

        let mut frame = Vec::with_capacity(self.boundary.len() + 8 + headers.len() * 48);
        if self.parts > 0 {
            frame.extend_from_slice(b"\r\n");
        }
        frame.extend_from_slice(b"--");
        frame.extend_from_slice(self.boundary.as_bytes());
        frame.extend_from_slice(b"\r\n");
        frame.extend_from_slice(headers.to_string().as_bytes());
        frame.extend_from_slice(b"\r\n");
        self.sink.write_all(&frame)?;

        self.parts += 1;
        Ok(PartWriter {
            sink: &mut self.sink,
            written: 0,
        })
    }

    /// Writes the closing delimiter and returns the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails.
    pub fn finish(mut self) -> Result<W> {
        let mut frame = Vec::with_capacity(self.boundary.len() + 8);
        if self.parts > 0 {
            frame.extend_from_slice(b"\r\n");
        }
        frame.extend_from_slice(b"--");
        frame.extend_from_slice(self.boundary.as_bytes());
        frame.extend_from_slice(b"--\r\n");
        self.sink.write_all(&frame)?;
        self.sink.flush()?;

        tracing::trace!(
            boundary = %self.boundary,
            parts = self.parts,
            bytes = self.sink.written,
            "closed multipart body"
        );
        Ok(self.sink.inner)
    }
}

/// Body writer for a single part, borrowed from a [`MultipartWriter`].
#[derive(Debug)]
pub struct PartWriter<'a, W: Write> {
    sink: &'a mut Sink<W>,
    written: u64,
}

impl<W: Write> PartWriter<'_, W> {
    /// Bytes written into this part's body.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Writes `data` in full and verifies the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialWrite`] if fewer bytes than `data.len()`
    /// reach the sink.
    pub fn copy_exact(&mut self, data: &[u8]) -> Result<()> {
        let mut copied = 0;
        while copied < data.len() {
            match self.write(&data[copied..]) {
                Ok(0) => break,
                Ok(n) => copied += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if copied != data.len() {
            return Err(Error::PartialWrite {
                expected: data.len() as u64,
                written: copied as u64,
            });
        }
        Ok(())
    }
}

impl<W: Write> Write for PartWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.sink.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    /// Sink that accepts a fixed number of bytes, then reports zero-length writes.
    struct CappedSink {
        data: Vec<u8>,
        capacity: usize,
    }

    impl Write for CappedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.capacity - self.data.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_random_boundary() {
        let a = random_boundary();
        let b = random_boundary();
        assert_eq!(a.len(), BOUNDARY_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
        validate_boundary(&a).unwrap();
    }

    #[test]
    fn test_validate_boundary() {
        validate_boundary("simple boundary").unwrap();
        validate_boundary("----=_Part_0_1234.5678").unwrap();
        assert!(validate_boundary("").is_err());
        assert!(validate_boundary(&"x".repeat(71)).is_err());
        assert!(validate_boundary("trailing ").is_err());
        assert!(validate_boundary("semi;colon").is_err());
    }

    #[test]
    fn test_framing() {
        let mut writer = MultipartWriter::with_boundary(Vec::new(), "XYZ").unwrap();
        assert_eq!(
            writer.content_type(MultipartKind::Alternative),
            "multipart/alternative; boundary=XYZ"
        );

        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        writer.start_part(&headers).unwrap().write_all(b"one").unwrap();
        let mut part = writer.start_part(&Headers::new()).unwrap();
        part.copy_exact(b"two").unwrap();
        assert_eq!(part.written(), 3);
        assert_eq!(writer.part_count(), 2);

        let out = writer.finish().unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "--XYZ\r\nContent-Type: text/plain\r\n\r\none\r\n--XYZ\r\n\r\ntwo\r\n--XYZ--\r\n"
        );
    }

    #[test]
    fn test_empty_body() {
        let writer = MultipartWriter::with_boundary(Vec::new(), "XYZ").unwrap();
        assert_eq!(writer.finish().unwrap(), b"--XYZ--\r\n");
    }

    #[test]
    fn test_rejects_header_injection() {
        let mut writer = MultipartWriter::new(Vec::new());
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain\r\nX-Evil: 1");
        assert!(matches!(
            writer.start_part(&headers),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_partial_write_detected() {
        let sink = CappedSink {
            data: Vec::new(),
            capacity: 40,
        };
        let mut writer = MultipartWriter::with_boundary(sink, "XYZ").unwrap();
        let mut part = writer.start_part(&Headers::new()).unwrap();
        let err = part.copy_exact(&[b'a'; 100]).unwrap_err();
        assert!(matches!(err, Error::PartialWrite { .. }), "{err}");
        assert_eq!(writer.bytes_written(), 40);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MultipartKind::Mixed.to_string(), "multipart/mixed");
        assert_eq!(MultipartKind::Related.subtype(), "related");
        assert_eq!(MultipartKind::default(), MultipartKind::Mixed);
    }
}
