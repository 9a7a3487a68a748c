//! Collecting parsed parts into re-readable storage.
//!
//! [`collect_parts`] runs the streaming parser and copies every decoded leaf
//! body into a [`SpooledTempFile`]: small bodies stay in memory, larger ones
//! roll over to an anonymous temporary file that is removed when the part is
//! dropped.

use crate::config::Limits;
use crate::content_type::ContentType;
use crate::error::Result;
use crate::header::Headers;
use crate::parser::Parser;
use std::io::{self, Read, Seek, SeekFrom};
use tempfile::SpooledTempFile;
use tracing::debug;

/// Bodies up to this size stay in memory.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 1024 * 1024;

/// A parsed leaf part with a re-readable decoded body.
#[derive(Debug)]
pub struct ParsedPart {
    headers: Headers,
    body: SpooledTempFile,
    len: u64,
}

impl ParsedPart {
    /// Part headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Parsed `Content-Type`, `text/plain` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is present but invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Decoded body length in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the decoded body is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the body was moved to a temporary file.
    #[must_use]
    pub fn is_on_disk(&self) -> bool {
        self.body.is_rolled()
    }

    /// Seeks back to the start of the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file cannot seek.
    pub fn rewind(&mut self) -> Result<()> {
        self.body.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Reads the whole body from the start.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    pub fn to_vec(&mut self) -> Result<Vec<u8>> {
        self.rewind()?;
        let mut data = Vec::with_capacity(usize::try_from(self.len).unwrap_or(0));
        self.body.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Releases the backing storage.
    pub fn close(self) {
        drop(self);
    }
}

impl Read for ParsedPart {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// Parses `source` and collects every leaf into a [`ParsedPart`].
///
/// Bodies larger than `threshold` bytes are spooled to disk. On error, parts
/// collected so far are released.
///
/// # Errors
///
/// Returns any parse error, or an I/O error from the spool storage.
pub fn collect_parts<R: Read>(
    source: R,
    limits: &Limits,
    threshold: usize,
) -> Result<Vec<ParsedPart>> {
    let mut parts = Vec::new();
    Parser::new(*limits).parse(source, |headers, body| {
        let mut spool = SpooledTempFile::new(threshold);
        let len = io::copy(body, &mut spool)?;
        spool.seek(SeekFrom::Start(0))?;
        debug!(len, on_disk = spool.is_rolled(), "spooled part");
        parts.push(ParsedPart {
            headers: headers.clone(),
            body: spool,
            len,
        });
        Ok(())
    })?;
    Ok(parts)
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
    use crate::part::{File, Part, Parts};

    fn message(parts: Parts) -> Vec<u8> {
        let mut body = Vec::new();
        let content_type = parts.write_to(&mut body).unwrap();
        let mut out = format!("Content-Type: {content_type}\r\n\r\n").into_bytes();
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_collect_parts() {
        let data = message(
            Parts::new()
                .with(Part::text("hello"))
                .with(File::new("a.txt", &b"abc"[..])),
        );

        let mut parts =
            collect_parts(&data[..], &Limits::default(), DEFAULT_SPOOL_THRESHOLD).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].to_vec().unwrap(), b"hello");
        assert_eq!(parts[1].to_vec().unwrap(), b"abc");
        assert_eq!(parts[1].len(), 3);
        assert_eq!(parts[1].content_type().unwrap().essence(), "text/plain");
        assert!(!parts[1].is_on_disk());

        // Bodies can be read more than once.
        assert_eq!(parts[1].to_vec().unwrap(), b"abc");
    }

    #[test]
    fn test_large_part_rolls_to_disk() {
        let payload = vec![7u8; 4096];
        let data = message(
            Parts::new().with(File::new("blob.bin", io::Cursor::new(payload.clone()))),
        );

        let mut parts = collect_parts(&data[..], &Limits::default(), 1024).unwrap();
        let part = &mut parts[0];
        assert!(part.is_on_disk());
        assert_eq!(part.to_vec().unwrap(), payload);

        let mut first = [0u8; 2];
        part.rewind().unwrap();
        part.read_exact(&mut first).unwrap();
        assert_eq!(first, [7, 7]);

        parts.pop().unwrap().close();
    }

    #[test]
    fn test_empty_leaf() {
        let data = message(Parts::new().with(Part::text("")));
        let parts = collect_parts(&data[..], &Limits::default(), 16).unwrap();
        assert!(parts[0].is_empty());
    }
}
