//! Bounded recursive multipart parser.
//!
//! The parser walks a MIME entity depth-first and hands every leaf part to a
//! caller-supplied handler together with a reader over its decoded body.
//! Nesting depth and the number of parts per container are bounded by
//! [`Limits`], so hostile input cannot drive unbounded recursion.
//!
//! # Example
//!
//! ```ignore
//! use mimestream::parse_multipart;
//! use std::io::Read;
//!
//! parse_multipart(message, |headers, body| {
//!     let mut content = Vec::new();
//!     body.read_to_end(&mut content)?;
//!     println!("{:?}: {} bytes", headers.get("content-type"), content.len());
//!     Ok(())
//! })?;
//! ```

use crate::config::Limits;
use crate::content_type::ContentType;
use crate::encoding::decode_transfer_encoding;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::reader::MultipartReader;
use std::io::{BufRead, BufReader, Read};
use tracing::debug;

/// Parses a MIME entity (headers and body) with default limits.
///
/// # Errors
///
/// See [`Parser::parse`].
pub fn parse_multipart<R, F>(source: R, handler: F) -> Result<()>
where
    R: Read,
    F: FnMut(&Headers, &mut dyn Read) -> Result<()>,
{
    Parser::default().parse(source, handler)
}

/// Parses a MIME entity (headers and body) with explicit limits.
///
/// # Errors
///
/// See [`Parser::parse`].
pub fn parse_multipart_with<R, F>(source: R, limits: Limits, handler: F) -> Result<()>
where
    R: Read,
    F: FnMut(&Headers, &mut dyn Read) -> Result<()>,
{
    Parser::new(limits).parse(source, handler)
}

/// Effective content type of an entity; `text/plain` when absent.
fn content_type_of(headers: &Headers) -> Result<ContentType> {
    headers
        .get("content-type")
        .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
}

/// Recursive multipart parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parser {
    limits: Limits,
}

impl Parser {
    /// Creates a parser with the given limits.
    #[must_use]
    pub const fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Returns the parser limits.
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Reads the entity headers from `source`, then parses its body.
    ///
    /// The handler is called once per leaf part, in document order, with the
    /// part headers and a reader over the transfer-decoded body. A
    /// non-multipart entity is itself the only leaf.
    ///
    /// # Errors
    ///
    /// Returns the first framing, limit, decoding or handler error. Errors
    /// from inside a part carry its position as [`Error::Nested`].
    pub fn parse<R, F>(&self, source: R, mut handler: F) -> Result<()>
    where
        R: Read,
        F: FnMut(&Headers, &mut dyn Read) -> Result<()>,
    {
        let mut source = BufReader::new(source);
        let headers = self.read_entity_headers(&mut source)?;
        self.parse_body(&headers, &mut source, &mut handler)
    }

    /// Parses a body whose entity headers are already known.
    ///
    /// # Errors
    ///
    /// See [`Parser::parse`].
    pub fn parse_body<F>(
        &self,
        headers: &Headers,
        body: &mut dyn Read,
        mut handler: F,
    ) -> Result<()>
    where
        F: FnMut(&Headers, &mut dyn Read) -> Result<()>,
    {
        let content_type = content_type_of(headers)?;
        self.walk(headers, &content_type, body, 0, &mut handler)
    }

    fn read_entity_headers<R: BufRead>(&self, source: &mut R) -> Result<Headers> {
        let mut block = Vec::new();
        loop {
            let before = block.len();
            let remaining = (self.limits.max_header_bytes + 1).saturating_sub(before);
            let read = (&mut *source)
                .take(remaining as u64)
                .read_until(b'\n', &mut block)?;
            if block.len() > self.limits.max_header_bytes {
                return Err(Error::MalformedHeader(format!(
                    "header block exceeds {} bytes",
                    self.limits.max_header_bytes
                )));
            }
            if read == 0 || !block.ends_with(b"\n") {
                return Err(Error::UnexpectedEof("inside message headers"));
            }
            let line = &block[before..];
            if line == b"\n" || line == b"\r\n" {
                return Headers::parse_bytes(&block);
            }
        }
    }

    /// Parses one entity at `depth` (the depth of the container it opens).
    fn walk<F>(
        &self,
        headers: &Headers,
        content_type: &ContentType,
        body: &mut dyn Read,
        depth: usize,
        handler: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&Headers, &mut dyn Read) -> Result<()>,
    {
        if !content_type.is_multipart() {
            let mut decoded = decode_transfer_encoding(headers, body);
            handler(headers, &mut *decoded)?;
            debug!(content_type = %content_type.essence(), "parsed leaf part");
            return Ok(());
        }

        let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
        let mut reader = MultipartReader::new(body, boundary)?
            .with_max_header_bytes(self.limits.max_header_bytes);

        let mut index = 0;
        while let Some(part_headers) = reader.next_part()? {
            if index == self.limits.max_parts_per_level {
                return Err(Error::TooManyParts {
                    max: self.limits.max_parts_per_level,
                });
            }
            self.visit(&mut reader, &part_headers, depth, handler)
                .map_err(|e| e.parsing(depth, index))?;
            index += 1;
        }

        debug!(
            subtype = %content_type.sub_type,
            depth,
            parts = index,
            "parsed multipart container"
        );
        Ok(())
    }

    fn visit<F>(
        &self,
        reader: &mut MultipartReader<&mut dyn Read>,
        headers: &Headers,
        depth: usize,
        handler: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&Headers, &mut dyn Read) -> Result<()>,
    {
        let content_type = content_type_of(headers)?;
        if content_type.is_multipart() && depth + 1 > self.limits.max_depth {
            return Err(Error::MaxDepthExceeded {
                depth: depth + 1,
                max: self.limits.max_depth,
            });
        }

        let mut body = reader.body();
        self.walk(headers, &content_type, &mut body, depth + 1, handler)
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
    use std::cell::Cell;
    use std::rc::Rc;

    /// Endless header line with no newline; records how much was pulled.
    struct Unterminated {
        pulled: Rc<Cell<usize>>,
    }

    impl Read for Unterminated {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            buf.fill(b'a');
            self.pulled.set(self.pulled.get() + buf.len());
            Ok(buf.len())
        }
    }

    fn leaves(limits: Limits, message: &str) -> (Vec<(Option<String>, String)>, Result<()>) {
        let mut seen = Vec::new();
        let result = parse_multipart_with(message.as_bytes(), limits, |headers, body| {
            let mut content = String::new();
            body.read_to_string(&mut content)?;
            seen.push((headers.get("content-type").map(str::to_string), content));
            Ok(())
        });
        (seen, result)
    }

    /// Builds a chain of `levels` multipart containers around one text leaf.
    fn nested_message(levels: usize) -> String {
        let mut body = "Content-Type: text/plain\r\n\r\nleaf".to_string();
        for level in (0..levels).rev() {
            body = format!(
                "Content-Type: multipart/mixed; boundary=b{level}\r\n\r\n--b{level}\r\n{body}\r\n--b{level}--\r\n"
            );
        }
        body
    }

    #[test]
    fn test_non_multipart_message() {
        let (seen, result) = leaves(
            Limits::default(),
            "Content-Transfer-Encoding: base64\r\n\r\naGVsbG8=",
        );
        result.unwrap();
        assert_eq!(seen, vec![(None, "hello".to_string())]);
    }

    #[test]
    fn test_leaves_in_document_order() {
        let message = concat!(
            "Content-Type: multipart/mixed; boundary=outer\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "<b>=3D</b>\r\n",
            "--inner--\r\n",
            "\r\n",
            "--outer\r\n",
            "\r\n",
            "untyped\r\n",
            "--outer--\r\n",
        );
        let (seen, result) = leaves(Limits::default(), message);
        result.unwrap();
        assert_eq!(
            seen,
            vec![
                (Some("text/plain".to_string()), "plain".to_string()),
                (Some("text/html".to_string()), "<b>=</b>".to_string()),
                (None, "untyped".to_string()),
            ]
        );
    }

    #[test]
    fn test_depth_limit() {
        let limits = Limits::builder().max_depth(2).build();

        let (seen, result) = leaves(limits, &nested_message(3));
        result.unwrap();
        assert_eq!(seen.len(), 1);

        let (seen, result) = leaves(limits, &nested_message(4));
        let err = result.unwrap_err();
        assert!(
            matches!(err.root(), Error::MaxDepthExceeded { depth: 3, max: 2 }),
            "{err}"
        );
        assert!(seen.is_empty());
    }

    #[test]
    fn test_missing_boundary() {
        let (seen, result) = leaves(
            Limits::default(),
            "Content-Type: multipart/mixed\r\n\r\n--x\r\n\r\nbody\r\n--x--\r\n",
        );
        assert!(matches!(result, Err(Error::MissingBoundary)));
        assert!(seen.is_empty());
    }

    #[test]
    fn test_invalid_content_type() {
        let (_, result) = leaves(Limits::default(), "Content-Type: garbage\r\n\r\nbody");
        assert!(matches!(result, Err(Error::InvalidContentType(_))));
    }

    #[test]
    fn test_missing_header_terminator() {
        let (_, result) = leaves(Limits::default(), "Subject: cut");
        assert!(matches!(result, Err(Error::UnexpectedEof(_))));
    }

    #[test]
    fn test_oversized_message_header_stops_reading() {
        let pulled = Rc::new(Cell::new(0));
        let source = Unterminated {
            pulled: Rc::clone(&pulled),
        };
        let limits = Limits::builder().max_header_bytes(1024).build();

        let result = parse_multipart_with(source, limits, |_, _| Ok(()));
        assert!(matches!(result, Err(Error::MalformedHeader(_))), "{result:?}");
        // One BufReader fill past the limit at most.
        assert!(pulled.get() <= 1024 + 8 * 1024, "pulled {}", pulled.get());
    }

    #[test]
    fn test_parse_body_with_known_headers() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "multipart/mixed; boundary=k");
        let mut body: &[u8] = b"--k\r\n\r\none\r\n--k--\r\n";

        let mut count = 0;
        Parser::default()
            .parse_body(&headers, &mut body, |_, _| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_handler_error_is_wrapped() {
        let message = "Content-Type: multipart/mixed; boundary=x\r\n\r\n--x\r\n\r\na\r\n--x\r\n\r\nb\r\n--x--\r\n";
        let mut calls = 0;
        let err = parse_multipart(message.as_bytes(), |_, _| {
            calls += 1;
            if calls == 2 {
                return Err(Error::handler("stop"));
            }
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(err, Error::Nested { depth: 0, index: 1, .. }), "{err}");
        assert!(matches!(err.root(), Error::Handler(_)));
        assert_eq!(calls, 2);
    }
}
