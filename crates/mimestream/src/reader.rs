//! Streaming multipart body reader.
//!
//! [`MultipartReader`] splits one multipart body into parts without
//! buffering whole parts: it keeps a small window over the source, emits body
//! bytes as soon as they cannot belong to a delimiter, and holds back only
//! enough bytes to recognize a delimiter split across reads.
//!
//! A delimiter is `--boundary` at the start of a line. The line break in
//! front of it (CRLF or bare LF) belongs to the delimiter, not to the body.
//! After the boundary comes either `--` (the closing delimiter) or optional
//! linear whitespace and a line break. Anything else right after the boundary
//! means the match was body content.

use crate::config::DEFAULT_MAX_HEADER_BYTES;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::writer::MAX_BOUNDARY_LENGTH;
use memchr::memmem;
use std::io::{self, Read};

/// Initial window size.
const BUFFER_SIZE: usize = 8 * 1024;

/// Longest run of transport padding accepted after a boundary.
const MAX_PADDING: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first delimiter.
    Preamble,
    /// Inside a part body.
    Body,
    /// A delimiter line was consumed; part headers come next.
    Delimiter,
    /// The closing delimiter was consumed.
    Closed,
}

/// What follows a boundary match.
#[derive(Debug, PartialEq, Eq)]
enum Tail {
    /// Delimiter line of the given length (padding and line break).
    Next(usize),
    /// Closing delimiter.
    Close,
    /// Not a delimiter.
    Content,
    /// Not enough bytes buffered to tell.
    Incomplete,
}

/// Result of scanning the window in a body.
#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// This many bytes are body content.
    Data(usize),
    /// The body ends after `data` bytes; the delimiter spans `skip` more.
    End { data: usize, skip: usize, close: bool },
    /// More input is needed to decide.
    NeedMore,
}

/// Classifies the bytes following `--boundary`.
fn classify(tail: &[u8], eof: bool) -> Result<Tail> {
    if tail.starts_with(b"--") {
        return Ok(Tail::Close);
    }
    if tail == b"-" {
        return Ok(if eof { Tail::Content } else { Tail::Incomplete });
    }

    let padding = tail
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    if padding > MAX_PADDING {
        return Err(Error::MalformedBoundary(
            "transport padding too long".to_string(),
        ));
    }

    match &tail[padding..] {
        [b'\n', ..] => Ok(Tail::Next(padding + 1)),
        [b'\r', b'\n', ..] => Ok(Tail::Next(padding + 2)),
        [] | [b'\r'] if !eof => Ok(Tail::Incomplete),
        // Stream ends on the delimiter line; the part headers will be missing.
        [] => Ok(Tail::Next(padding)),
        _ if padding == 0 => Ok(Tail::Content),
        [b, ..] => Err(Error::MalformedBoundary(format!(
            "unexpected byte 0x{b:02X} after delimiter"
        ))),
    }
}

/// Reader over the parts of one multipart body.
///
/// Call [`next_part`](Self::next_part) to advance to the next part and read
/// its headers, then [`body`](Self::body) to stream its content. Unread body
/// bytes are skipped by the next call to `next_part`.
///
/// # Example
///
/// ```ignore
/// let mut reader = MultipartReader::new(source, "frontier")?;
/// while let Some(headers) = reader.next_part()? {
///     let mut body = Vec::new();
///     reader.body().read_to_end(&mut body)?;
/// }
/// ```
#[derive(Debug)]
pub struct MultipartReader<R: Read> {
    source: R,
    buf: Vec<u8>,
    pos: usize,
    end: usize,
    eof: bool,
    /// `\n--boundary`.
    needle: Vec<u8>,
    finder: memmem::Finder<'static>,
    state: State,
    /// Nothing of the current body has been emitted yet.
    at_start: bool,
    max_header_bytes: usize,
}

impl<R: Read> MultipartReader<R> {
    /// Creates a reader for a body delimited by `boundary`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedBoundary`] if the boundary is empty or
    /// longer than 70 characters.
    pub fn new(source: R, boundary: &str) -> Result<Self> {
        if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LENGTH {
            return Err(Error::MalformedBoundary(format!(
                "boundary must be 1 to {MAX_BOUNDARY_LENGTH} characters, got {}",
                boundary.len()
            )));
        }

        let mut needle = Vec::with_capacity(boundary.len() + 3);
        needle.extend_from_slice(b"\n--");
        needle.extend_from_slice(boundary.as_bytes());
        let finder = memmem::Finder::new(&needle).into_owned();

        Ok(Self {
            source,
            buf: vec![0; BUFFER_SIZE + needle.len()],
            pos: 0,
            end: 0,
            eof: false,
            needle,
            finder,
            state: State::Preamble,
            at_start: true,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        })
    }

    /// Sets the maximum size of one part's header block.
    #[must_use]
    pub const fn with_max_header_bytes(mut self, bytes: usize) -> Self {
        self.max_header_bytes = bytes;
        self
    }

    /// Returns the boundary token.
    #[must_use]
    pub fn boundary(&self) -> &str {
        // The needle was built from a `&str` after a 3-byte ASCII prefix.
        std::str::from_utf8(&self.needle[3..]).unwrap_or_default()
    }

    /// Advances to the next part and returns its headers.
    ///
    /// Returns `Ok(None)` after the closing delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedEof`] if the stream ends before the
    /// structure is complete, [`Error::MalformedBoundary`] for garbage on a
    /// delimiter line, or [`Error::MalformedHeader`] for a bad header block.
    pub fn next_part(&mut self) -> Result<Option<Headers>> {
        let mut scratch = [0u8; 4096];
        while self.read_body(&mut scratch)? > 0 {}

        match self.state {
            State::Closed => Ok(None),
            State::Delimiter => {
                let headers = self.read_headers()?;
                self.state = State::Body;
                self.at_start = true;
                tracing::trace!(fields = headers.len(), "read part headers");
                Ok(Some(headers))
            }
            State::Preamble | State::Body => Err(Error::UnexpectedEof("inside a part body")),
        }
    }

    /// Returns a reader over the current part's body.
    ///
    /// The reader yields nothing before the first part or after the body's
    /// closing delimiter.
    pub fn body(&mut self) -> PartBody<'_, R> {
        PartBody { reader: self }
    }

    /// Returns the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }

    fn eof_context(&self) -> &'static str {
        match self.state {
            State::Preamble => "before the opening delimiter",
            _ => "inside a part body",
        }
    }

    /// Reads body (or preamble) bytes; returns 0 at the delimiter.
    fn read_body(&mut self, out: &mut [u8]) -> Result<usize> {
        if !matches!(self.state, State::Preamble | State::Body) || out.is_empty() {
            return Ok(0);
        }

        loop {
            match self.scan()? {
                Scan::NeedMore => self.fill()?,
                Scan::Data(available) => return Ok(self.emit(available, out)),
                Scan::End { data, .. } if data > 0 => return Ok(self.emit(data, out)),
                Scan::End { skip, close, .. } => {
                    self.pos += skip;
                    self.state = if close { State::Closed } else { State::Delimiter };
                    tracing::trace!(close, "reached delimiter");
                    return Ok(0);
                }
            }
        }
    }

    fn emit(&mut self, available: usize, out: &mut [u8]) -> usize {
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        self.at_start = false;
        n
    }

    fn scan(&self) -> Result<Scan> {
        let window = &self.buf[self.pos..self.end];
        let needle = self.needle.as_slice();

        // A body may open directly with the boundary when the line break
        // before it was consumed with the previous line.
        if self.at_start {
            let dash = &needle[1..];
            if window.len() < dash.len() && dash.starts_with(window) && !self.eof {
                return Ok(Scan::NeedMore);
            }
            if window.starts_with(dash) {
                match classify(&window[dash.len()..], self.eof)? {
                    Tail::Next(n) => {
                        return Ok(Scan::End {
                            data: 0,
                            skip: dash.len() + n,
                            close: false,
                        });
                    }
                    Tail::Close => {
                        return Ok(Scan::End {
                            data: 0,
                            skip: dash.len() + 2,
                            close: true,
                        });
                    }
                    Tail::Incomplete => return Ok(Scan::NeedMore),
                    Tail::Content => {}
                }
            }
        }

        let mut from = 0;
        while let Some(found) = self.finder.find(&window[from..]) {
            let at = from + found;
            let start = if at > 0 && window[at - 1] == b'\r' {
                at - 1
            } else {
                at
            };
            let after = at + needle.len();
            match classify(&window[after..], self.eof)? {
                Tail::Next(n) => {
                    return Ok(Scan::End {
                        data: start,
                        skip: after + n - start,
                        close: false,
                    });
                }
                Tail::Close => {
                    return Ok(Scan::End {
                        data: start,
                        skip: after + 2 - start,
                        close: true,
                    });
                }
                Tail::Incomplete if start > 0 => return Ok(Scan::Data(start)),
                Tail::Incomplete => return Ok(Scan::NeedMore),
                Tail::Content => from = at + 1,
            }
        }

        if self.eof {
            if window.is_empty() {
                return Err(Error::UnexpectedEof(self.eof_context()));
            }
            return Ok(Scan::Data(window.len()));
        }

        // Hold back enough bytes to complete a delimiter split across reads.
        let safe = from.max(window.len().saturating_sub(needle.len()));
        if safe == 0 {
            Ok(Scan::NeedMore)
        } else {
            Ok(Scan::Data(safe))
        }
    }

    fn read_headers(&mut self) -> Result<Headers> {
        let mut block = Vec::new();
        loop {
            let window = &self.buf[self.pos..self.end];
            if let Some(nl) = memchr::memchr(b'\n', window) {
                let line = &window[..=nl];
                let blank = line == b"\n" || line == b"\r\n";
                block.extend_from_slice(line);
                self.pos += nl + 1;
                if block.len() > self.max_header_bytes {
                    return Err(self.header_overflow());
                }
                if blank {
                    return Headers::parse_bytes(&block);
                }
                continue;
            }

            if block.len() + window.len() > self.max_header_bytes {
                return Err(self.header_overflow());
            }
            if self.eof {
                return Err(Error::UnexpectedEof(
                    if block.is_empty() && window.is_empty() {
                        "before the closing delimiter"
                    } else {
                        "inside part headers"
                    },
                ));
            }
            self.fill()?;
        }
    }

    fn header_overflow(&self) -> Error {
        Error::MalformedHeader(format!(
            "header block exceeds {} bytes",
            self.max_header_bytes
        ))
    }

    /// Reads more input into the window, compacting or growing it first.
    fn fill(&mut self) -> Result<()> {
        if self.pos > 0 {
            self.buf.copy_within(self.pos..self.end, 0);
            self.end -= self.pos;
            self.pos = 0;
        }
        if self.end == self.buf.len() {
            let grown = self.buf.len() * 2;
            self.buf.resize(grown, 0);
        }

        loop {
            match self.source.read(&mut self.buf[self.end..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.end += n;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Body of the current part, borrowed from a [`MultipartReader`].
#[derive(Debug)]
pub struct PartBody<'a, R: Read> {
    reader: &'a mut MultipartReader<R>,
}

impl<R: Read> Read for PartBody<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Preamble bytes are never exposed as a body.
        if self.reader.state != State::Body {
            return Ok(0);
        }
        Ok(self.reader.read_body(buf)?)
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

    /// Source that returns at most `step` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn collect<R: Read>(mut reader: MultipartReader<R>) -> Result<Vec<(Headers, Vec<u8>)>> {
        let mut parts = Vec::new();
        while let Some(headers) = reader.next_part()? {
            let mut body = Vec::new();
            reader.body().read_to_end(&mut body)?;
            parts.push((headers, body));
        }
        Ok(parts)
    }

    const SAMPLE: &[u8] = b"preamble\r\n--xyz\r\nA: 1\r\n\r\nfirst\r\n--xyz  \r\n\r\nsecond\nline\r\n--xyz--\r\nepilogue";

    #[test]
    fn test_parts_and_bodies() {
        let parts = collect(MultipartReader::new(SAMPLE, "xyz").unwrap()).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0.get("a"), Some("1"));
        assert_eq!(parts[0].1, b"first");
        assert!(parts[1].0.is_empty());
        assert_eq!(parts[1].1, b"second\nline");
    }

    #[test]
    fn test_byte_at_a_time() {
        for step in [1, 2, 3, 7] {
            let source = Trickle { data: SAMPLE, step };
            let parts = collect(MultipartReader::new(source, "xyz").unwrap()).unwrap();
            assert_eq!(parts[0].1, b"first", "step {step}");
            assert_eq!(parts[1].1, b"second\nline", "step {step}");
        }
    }

    #[test]
    fn test_bare_lf_delimiters() {
        let data = b"--b\nContent-Type: text/plain\n\nhello\n--b--\n";
        let parts = collect(MultipartReader::new(&data[..], "b").unwrap()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1, b"hello");
    }

    #[test]
    fn test_boundary_prefix_is_content() {
        let data = b"--b\r\n\r\nline\r\n--bb not a delimiter\r\n--b--\r\n";
        let parts = collect(MultipartReader::new(&data[..], "b").unwrap()).unwrap();
        assert_eq!(parts[0].1, b"line\r\n--bb not a delimiter");
    }

    #[test]
    fn test_empty_body_and_zero_parts() {
        let reader = MultipartReader::new(&b"--b\r\n\r\n\r\n--b--\r\n"[..], "b").unwrap();
        let parts = collect(reader).unwrap();
        assert_eq!(parts.len(), 1);
        assert!(parts[0].1.is_empty());

        let parts = collect(MultipartReader::new(&b"--b--\r\n"[..], "b").unwrap()).unwrap();
        assert!(parts.is_empty());
    }

    #[test]
    fn test_large_body_spans_window() {
        let body: Vec<u8> = (0..50_000u32).map(|i| b"ab\r\n-"[(i % 5) as usize]).collect();
        let mut data = b"--edge\r\n\r\n".to_vec();
        data.extend_from_slice(&body);
        data.extend_from_slice(b"\r\n--edge--\r\n");

        let parts = collect(MultipartReader::new(&data[..], "edge").unwrap()).unwrap();
        assert_eq!(parts[0].1, body);
    }

    #[test]
    fn test_unread_body_is_skipped() {
        let mut reader = MultipartReader::new(SAMPLE, "xyz").unwrap();
        reader.next_part().unwrap().unwrap();
        let second = reader.next_part().unwrap().unwrap();
        assert!(second.is_empty());
        assert!(reader.next_part().unwrap().is_none());
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_boundary_validation() {
        assert!(matches!(
            MultipartReader::new(&b""[..], ""),
            Err(Error::MalformedBoundary(_))
        ));
        assert!(matches!(
            MultipartReader::new(&b""[..], &"x".repeat(71)),
            Err(Error::MalformedBoundary(_))
        ));
        assert_eq!(MultipartReader::new(&b""[..], "abc").unwrap().boundary(), "abc");
    }

    #[test]
    fn test_garbage_after_padding() {
        let data = b"--b \tjunk\r\n\r\nx\r\n--b--\r\n";
        let err = collect(MultipartReader::new(&data[..], "b").unwrap()).unwrap_err();
        assert!(matches!(err, Error::MalformedBoundary(_)), "{err}");
    }

    #[test]
    fn test_eof_errors() {
        let cases: [(&[u8], &str); 4] = [
            (b"no delimiter at all", "before the opening delimiter"),
            (b"--b\r\nA: 1\r\n", "inside part headers"),
            (b"--b\r\n\r\ntruncated body", "inside a part body"),
            (b"--b\r\n\r\nbody\r\n--b\r\n", "before the closing delimiter"),
        ];
        for (data, context) in cases {
            let err = collect(MultipartReader::new(data, "b").unwrap()).unwrap_err();
            match err {
                Error::UnexpectedEof(got) => assert_eq!(got, context),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_header_limit() {
        let data = b"--b\r\nX-Long: aaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\nbody\r\n--b--\r\n";
        let reader = MultipartReader::new(&data[..], "b").unwrap().with_max_header_bytes(16);
        let err = collect(reader).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(b"--", false).unwrap(), Tail::Close);
        assert_eq!(classify(b"\r\nX", false).unwrap(), Tail::Next(2));
        assert_eq!(classify(b" \t\n", false).unwrap(), Tail::Next(3));
        assert_eq!(classify(b"\r", false).unwrap(), Tail::Incomplete);
        assert_eq!(classify(b"-", false).unwrap(), Tail::Incomplete);
        assert_eq!(classify(b"x", false).unwrap(), Tail::Content);
        assert!(classify(b" x", false).is_err());
    }
}
