//! MIME transfer encodings.
//!
//! Streaming Base64 (wrapped at 76 characters per RFC 2045 §6.8) and
//! Quoted-Printable (RFC 2045 §6.7) encoders and decoders. Encoders wrap a
//! [`Write`] sink and must be finished explicitly; decoders wrap a [`Read`]
//! source and report malformed input as [`DecodeError`].

use crate::error::{DecodeError, Error, Result};
use crate::header::Headers;
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};

/// Decoding engine that accepts non-zero bits after the final symbol.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Maximum encoded line length, excluding the CRLF.
pub const MAX_LINE_LENGTH: usize = 76;

/// Longest encoded line a decoder will buffer.
const MAX_ENCODED_LINE: usize = 64 * 1024;

/// Input bytes encoded per Base64 batch (a multiple of 3).
const BASE64_BATCH: usize = 57 * 16;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }

    /// Reads the `Content-Transfer-Encoding` of a header block.
    #[must_use]
    pub fn from_headers(headers: &Headers) -> Self {
        headers
            .get("content-transfer-encoding")
            .map_or(Self::SevenBit, Self::parse)
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Wraps `source` in the decoder named by the part's
/// `Content-Transfer-Encoding` header.
///
/// Identity encodings (7bit, 8bit, binary, or no header) pass through.
pub fn decode_transfer_encoding<'a, R: Read + 'a>(
    headers: &Headers,
    source: R,
) -> Box<dyn Read + 'a> {
    match TransferEncoding::from_headers(headers) {
        TransferEncoding::Base64 => Box::new(Base64Reader::new(source)),
        TransferEncoding::QuotedPrintable => Box::new(QuotedPrintableReader::new(source)),
        _ => Box::new(source),
    }
}

/// Encodes data as Base64, wrapped at 76 characters with CRLF.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let mut wrap = LineWrap::default();
    let mut out = Vec::with_capacity(data.len() / 3 * 4 + data.len() / 38 + 4);
    wrap.push(STANDARD.encode(data).as_bytes(), &mut out);
    String::from_utf8_lossy(&out).into_owned()
}

/// Encodes data using Quoted-Printable encoding (RFC 2045).
///
/// CR, LF and CRLF become CRLF hard line breaks.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut encoder = QpEncoder::default();
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    encoder.encode(data, &mut out);
    encoder.finish(&mut out);
    String::from_utf8_lossy(&out).into_owned()
}

/// Inserts CRLF before every 77th character of a line.
#[derive(Debug, Default)]
struct LineWrap {
    column: usize,
}

impl LineWrap {
    fn push(&mut self, mut encoded: &[u8], out: &mut Vec<u8>) {
        while !encoded.is_empty() {
            if self.column == MAX_LINE_LENGTH {
                out.extend_from_slice(b"\r\n");
                self.column = 0;
            }
            let take = (MAX_LINE_LENGTH - self.column).min(encoded.len());
            out.extend_from_slice(&encoded[..take]);
            self.column += take;
            encoded = &encoded[take..];
        }
    }
}

/// Streaming Base64 encoder with RFC 2045 line wrapping.
///
/// Call [`Base64Writer::finish`] to flush the final group and padding; the
/// wrapped sink is handed back, not closed.
#[derive(Debug)]
pub struct Base64Writer<W: Write> {
    inner: W,
    pending: [u8; 3],
    pending_len: usize,
    wrap: LineWrap,
    scratch: Vec<u8>,
}

impl<W: Write> Base64Writer<W> {
    /// Creates an encoder writing to `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: [0; 3],
            pending_len: 0,
            wrap: LineWrap::default(),
            scratch: Vec::new(),
        }
    }

    fn encode_groups(&mut self, input: &[u8]) -> io::Result<()> {
        let mut encoded = [0u8; BASE64_BATCH / 3 * 4];
        for chunk in input.chunks(BASE64_BATCH) {
            let n = STANDARD
                .encode_slice(chunk, &mut encoded)
                .map_err(|e| io::Error::from(Error::Encode(e.to_string())))?;
            self.scratch.clear();
            self.wrap.push(&encoded[..n], &mut self.scratch);
            self.inner.write_all(&self.scratch)?;
        }
        Ok(())
    }

    /// Flushes the final partial group and returns the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects the remaining output.
    pub fn finish(mut self) -> io::Result<W> {
        if self.pending_len > 0 {
            let pending = self.pending;
            let tail = STANDARD.encode(&pending[..self.pending_len]);
            self.scratch.clear();
            self.wrap.push(tail.as_bytes(), &mut self.scratch);
            self.inner.write_all(&self.scratch)?;
            self.pending_len = 0;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for Base64Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut input = buf;

        if self.pending_len > 0 {
            let take = (3 - self.pending_len).min(input.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&input[..take]);
            self.pending_len += take;
            input = &input[take..];
            if self.pending_len < 3 {
                return Ok(buf.len());
            }
            let group = self.pending;
            self.pending_len = 0;
            self.encode_groups(&group)?;
        }

        let full = input.len() / 3 * 3;
        self.encode_groups(&input[..full])?;

        let rest = &input[full..];
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Quoted-Printable encoder state shared by the writer and one-shot helper.
#[derive(Debug, Default)]
struct QpEncoder {
    line: Vec<u8>,
    cr: bool,
}

impl QpEncoder {
    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            match byte {
                b'\r' | b'\n' => {
                    // CRLF already broke the line at the CR
                    if self.cr && byte == b'\n' {
                        self.cr = false;
                        continue;
                    }
                    self.cr = byte == b'\r';
                    self.hard_break(out);
                }
                b' ' | b'\t' | b'!'..=b'<' | b'>'..=b'~' => {
                    self.cr = false;
                    self.literal(byte, out);
                }
                _ => {
                    self.cr = false;
                    self.escaped(byte, out);
                }
            }
        }
    }

    fn literal(&mut self, byte: u8, out: &mut Vec<u8>) {
        if self.line.len() + 1 > MAX_LINE_LENGTH - 1 {
            self.soft_break(out);
        }
        self.line.push(byte);
    }

    fn escaped(&mut self, byte: u8, out: &mut Vec<u8>) {
        if self.line.len() + 3 > MAX_LINE_LENGTH - 1 {
            self.soft_break(out);
        }
        self.line.extend_from_slice(&[
            b'=',
            HEX[usize::from(byte >> 4)],
            HEX[usize::from(byte & 0x0F)],
        ]);
    }

    fn soft_break(&mut self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.line);
        out.extend_from_slice(b"=\r\n");
        self.line.clear();
    }

    fn hard_break(&mut self, out: &mut Vec<u8>) {
        self.escape_trailing_whitespace(out);
        out.extend_from_slice(&self.line);
        out.extend_from_slice(b"\r\n");
        self.line.clear();
    }

    // Whitespace at the end of an encoded line would be stripped in transit.
    fn escape_trailing_whitespace(&mut self, out: &mut Vec<u8>) {
        if let Some(&last) = self.line.last() {
            if last == b' ' || last == b'\t' {
                self.line.pop();
                self.escaped(last, out);
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        self.escape_trailing_whitespace(out);
        out.extend_from_slice(&self.line);
        self.line.clear();
    }
}

/// Streaming Quoted-Printable encoder (text mode).
///
/// [`QuotedPrintableWriter::finish`] is mandatory: it flushes the pending
/// line, escaping trailing whitespace.
#[derive(Debug)]
pub struct QuotedPrintableWriter<W: Write> {
    inner: W,
    encoder: QpEncoder,
    scratch: Vec<u8>,
}

impl<W: Write> QuotedPrintableWriter<W> {
    /// Creates an encoder writing to `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            encoder: QpEncoder::default(),
            scratch: Vec::new(),
        }
    }

    /// Flushes the pending line and returns the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects the remaining output.
    pub fn finish(mut self) -> io::Result<W> {
        self.scratch.clear();
        self.encoder.finish(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for QuotedPrintableWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.encoder.encode(buf, &mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming Base64 decoder.
///
/// Whitespace (including line breaks) between characters is ignored.
#[derive(Debug)]
pub struct Base64Reader<R: Read> {
    inner: R,
    quad: [u8; 4],
    quad_len: usize,
    decoded: Vec<u8>,
    pos: usize,
    offset: u64,
    padded: bool,
    eof: bool,
}

impl<R: Read> Base64Reader<R> {
    /// Creates a decoder reading from `inner`.
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            quad: [0; 4],
            quad_len: 0,
            decoded: Vec::new(),
            pos: 0,
            offset: 0,
            padded: false,
            eof: false,
        }
    }

    fn decode_chunk(&mut self, chunk: &[u8]) -> std::result::Result<(), DecodeError> {
        for &byte in chunk {
            let offset = self.offset;
            self.offset += 1;

            if byte.is_ascii_whitespace() {
                continue;
            }
            if self.padded {
                return Err(DecodeError::TrailingBase64(offset));
            }
            if !(byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'/' | b'=')) {
                return Err(DecodeError::InvalidBase64 { byte, offset });
            }

            self.quad[self.quad_len] = byte;
            self.quad_len += 1;
            if self.quad_len == 4 {
                let mut out = [0u8; 3];
                let n = LENIENT
                    .decode_slice(self.quad, &mut out)
                    .map_err(|_| DecodeError::InvalidPadding(offset))?;
                self.decoded.extend_from_slice(&out[..n]);
                self.padded = self.quad[3] == b'=';
                self.quad_len = 0;
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for Base64Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.decoded.len() {
                let n = (self.decoded.len() - self.pos).min(buf.len());
                buf[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.eof {
                return Ok(0);
            }

            self.decoded.clear();
            self.pos = 0;

            let mut raw = [0u8; 4096];
            let n = match self.inner.read(&mut raw) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                self.eof = true;
                if self.quad_len != 0 {
                    return Err(Error::from(DecodeError::TruncatedBase64(self.quad_len)).into());
                }
                continue;
            }
            self.decode_chunk(&raw[..n])
                .map_err(|e| io::Error::from(Error::from(e)))?;
        }
    }
}

/// Streaming Quoted-Printable decoder.
///
/// Soft line breaks are removed, trailing whitespace on encoded lines is
/// dropped, and hard line breaks are passed through as received.
#[derive(Debug)]
pub struct QuotedPrintableReader<R: Read> {
    inner: BufReader<R>,
    line: Vec<u8>,
    decoded: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> QuotedPrintableReader<R> {
    /// Creates a decoder reading from `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            line: Vec::new(),
            decoded: Vec::new(),
            pos: 0,
            eof: false,
        }
    }
}

impl<R: Read> Read for QuotedPrintableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.decoded.len() {
                let n = (self.decoded.len() - self.pos).min(buf.len());
                buf[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.eof {
                return Ok(0);
            }

            self.decoded.clear();
            self.pos = 0;
            self.line.clear();

            let limit = (MAX_ENCODED_LINE + 1) as u64;
            let n = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.line)?;
            if n == 0 {
                self.eof = true;
                continue;
            }
            if self.line.len() > MAX_ENCODED_LINE {
                return Err(Error::from(DecodeError::LineTooLong(MAX_ENCODED_LINE)).into());
            }
            decode_qp_line(&self.line, &mut self.decoded)
                .map_err(|e| io::Error::from(Error::from(e)))?;
        }
    }
}

fn decode_qp_line(line: &[u8], out: &mut Vec<u8>) -> std::result::Result<(), DecodeError> {
    let (content, ending): (&[u8], &[u8]) = if let Some(rest) = line.strip_suffix(b"\r\n") {
        (rest, b"\r\n")
    } else if let Some(rest) = line.strip_suffix(b"\n") {
        (rest, b"\n")
    } else {
        (line, b"")
    };

    let trimmed_len = content
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(0, |i| i + 1);
    let content = &content[..trimmed_len];

    let (content, soft) = content
        .strip_suffix(b"=")
        .map_or((content, false), |rest| (rest, true));

    let mut i = 0;
    while i < content.len() {
        let byte = content[i];
        if byte == b'=' {
            let escape = content.get(i + 1..i + 3);
            let value = escape.and_then(|e| Some((hex_value(e[0])? << 4) | hex_value(e[1])?));
            match value {
                Some(value) => out.push(value),
                None => {
                    let end = (i + 3).min(content.len());
                    return Err(DecodeError::InvalidEscape(
                        String::from_utf8_lossy(&content[i..end]).into_owned(),
                    ));
                }
            }
            i += 3;
        } else {
            out.push(byte);
            i += 1;
        }
    }

    if !soft {
        out.extend_from_slice(ending);
    }
    Ok(())
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

/// Decodes a complete Base64 payload, ignoring whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 4 * 3);
    Base64Reader::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Decodes a complete Quoted-Printable payload.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    QuotedPrintableReader::new(data).read_to_end(&mut out)?;
    Ok(out)
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
    use proptest::prelude::*;

    fn base64_stream(data: &[u8], write_size: usize) -> Vec<u8> {
        let mut writer = Base64Writer::new(Vec::new());
        for chunk in data.chunks(write_size.max(1)) {
            writer.write_all(chunk).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_base64_encode_decode() {
        let encoded = base64_stream(b"Hello, World!", 5);
        assert_eq!(encoded, b"SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_wrap_lengths() {
        for len in [0usize, 1, 75, 76, 77, 10_000] {
            let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
            let encoded = base64_stream(&data, 1000);

            let text = String::from_utf8(encoded.clone()).unwrap();
            let lines: Vec<&str> = text.split("\r\n").collect();
            let (last, full) = lines.split_last().unwrap();
            assert!(full.iter().all(|line| line.len() == MAX_LINE_LENGTH), "len {len}");
            assert!(last.len() <= MAX_LINE_LENGTH);
            assert!(!text.ends_with("\r\n"));

            assert_eq!(decode_base64(&encoded).unwrap(), data, "len {len}");
        }
    }

    #[test]
    fn test_base64_wrapped_helper_matches_writer() {
        let data = vec![0xA5; 500];
        assert_eq!(
            encode_base64_wrapped(&data).into_bytes(),
            base64_stream(&data, 13)
        );
    }

    #[test]
    fn test_base64_decode_tolerates_line_breaks() {
        let decoded = decode_base64(b"SGVs\r\nbG8s\nIFdv cmxk\tIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_decode_invalid_byte() {
        let err = decode_base64(b"SGVs*G8=").unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::InvalidBase64 { byte: b'*', offset: 4 })
        ));
    }

    #[test]
    fn test_base64_decode_truncated() {
        let err = decode_base64(b"SGVsbG8").unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::TruncatedBase64(3))));
    }

    #[test]
    fn test_base64_decode_non_canonical_trailing_bits() {
        assert_eq!(decode_base64(b"YR==").unwrap(), b"a");
        assert_eq!(decode_base64(b"YWJ=").unwrap(), b"ab");

        let err = decode_base64(b"S=Gk").unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::InvalidPadding(3))));
    }

    #[test]
    fn test_base64_decode_data_after_padding() {
        let err = decode_base64(b"SGk=SGk=").unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::TrailingBase64(4))));
    }

    #[test]
    fn test_quoted_printable_encode() {
        assert_eq!(encode_quoted_printable(b"Hello, World!"), "Hello, World!");

        let encoded = encode_quoted_printable("Héllo, Wørld!".as_bytes());
        assert_eq!(encoded, "H=C3=A9llo, W=C3=B8rld!");

        assert_eq!(encode_quoted_printable(b"a=b"), "a=3Db");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let text = "x".repeat(200);
        let encoded = encode_quoted_printable(text.as_bytes());
        for line in encoded.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH);
        }
        assert!(encoded.contains("=\r\n"));
        assert_eq!(decode_quoted_printable(encoded.as_bytes()).unwrap(), text.as_bytes());
    }

    #[test]
    fn test_quoted_printable_escapes_trailing_whitespace() {
        assert_eq!(encode_quoted_printable(b"end "), "end=20");
        assert_eq!(encode_quoted_printable(b"tab\t\r\nnext"), "tab=09\r\nnext");
    }

    #[test]
    fn test_quoted_printable_canonical_line_breaks() {
        assert_eq!(encode_quoted_printable(b"a\nb\rc\r\nd"), "a\r\nb\r\nc\r\nd");
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable(b"H=C3=A9llo").unwrap();
        assert_eq!(decoded, "Héllo".as_bytes());

        let decoded = decode_quoted_printable(b"Hello=\r\nWorld   \r\nagain=\nok").unwrap();
        assert_eq!(decoded, b"HelloWorld\r\nagainok");

        let decoded = decode_quoted_printable(b"lower=c3=a9").unwrap();
        assert_eq!(decoded, "loweré".as_bytes());
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        let err = decode_quoted_printable(b"bad =ZZ escape").unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::InvalidEscape(ref s)) if s == "=ZZ"));

        let err = decode_quoted_printable(b"short =4").unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::InvalidEscape(_))));
    }

    #[test]
    fn test_quoted_printable_line_too_long() {
        let line = vec![b'a'; MAX_ENCODED_LINE + 10];
        let err = decode_quoted_printable(&line).unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::LineTooLong(_))));
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::QuotedPrintable.to_string(), "quoted-printable");
    }

    #[test]
    fn test_decode_transfer_encoding_dispatch() {
        let mut headers = Headers::new();
        headers.add("Content-Transfer-Encoding", "base64");
        let mut out = Vec::new();
        decode_transfer_encoding(&headers, &b"YWJj"[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"abc");

        headers.set("Content-Transfer-Encoding", "8bit");
        out.clear();
        decode_transfer_encoding(&headers, &b"YWJj"[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"YWJj");
    }

    proptest! {
        #[test]
        fn prop_base64_round_trip(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            write_size in 1usize..300,
        ) {
            let encoded = base64_stream(&data, write_size);
            prop_assert_eq!(decode_base64(&encoded).unwrap(), data);
        }

        #[test]
        fn prop_quoted_printable_round_trip(
            data in proptest::collection::vec(
                any::<u8>().prop_filter("no bare line breaks", |b| *b != b'\r' && *b != b'\n'),
                0..2048,
            ),
        ) {
            let encoded = encode_quoted_printable(&data);
            for line in encoded.split("\r\n") {
                prop_assert!(line.len() <= MAX_LINE_LENGTH);
            }
            prop_assert_eq!(decode_quoted_printable(encoded.as_bytes()).unwrap(), data);
        }
    }
}
