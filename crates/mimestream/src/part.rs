//! Part sources for multipart bodies.
//!
//! A [`Part`] is a deferred source of body content: text, a readable file,
//! a JSON value, or a nested multipart container. Parts are rendered in
//! order by [`Parts::render_into`]; each one writes its own headers and
//! transfer-encoded body through a [`MultipartWriter`].
//!
//! # Example
//!
//! ```ignore
//! use mimestream::{File, MultipartKind, Part, Parts};
//!
//! let body = Parts::new()
//!     .with(Part::alternative([Part::text("Hi"), Part::html("<b>Hi</b>")]))
//!     .with(File::new("report.pdf", std::fs::File::open("report.pdf")?));
//!
//! let mut out = Vec::new();
//! let content_type = body.write_to(&mut out)?;
//! ```

use crate::ascii::to_ascii;
use crate::content_type::{
    APPLICATION_JSON, ContentDisposition, ContentType, TEXT_HTML, TEXT_MARKDOWN, TEXT_PLAIN,
};
use crate::encoding::{Base64Writer, QuotedPrintableWriter, TransferEncoding};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::writer::{MultipartKind, MultipartWriter, write_multipart};
use std::ffi::OsStr;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Cleanup hook run once after a file part's source is consumed or skipped.
pub type Closer = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Filename sanitizer applied to the `name` content-type parameter.
pub type Sanitizer = fn(&str) -> String;

/// A single part of a multipart body.
#[derive(Debug)]
pub enum Part {
    /// Quoted-printable text.
    Text(Text),
    /// Base64 attachment read from a stream.
    File(File),
    /// Quoted-printable JSON document.
    Json(Json),
    /// Nested multipart container.
    Nested(Nested),
}

impl Part {
    /// Creates a `text/plain; charset=utf-8` part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(Text::new(text))
    }

    /// Creates a `text/html; charset=utf-8` part.
    pub fn html(html: impl Into<String>) -> Self {
        Self::Text(Text::new(html).with_content_type(TEXT_HTML))
    }

    /// Creates a `text/markdown; charset=utf-8` part.
    pub fn markdown(markdown: impl Into<String>) -> Self {
        Self::Text(Text::new(markdown).with_content_type(TEXT_MARKDOWN))
    }

    /// Creates a JSON part from a value.
    #[must_use]
    pub fn json(value: serde_json::Value) -> Self {
        Self::Json(Json::new(value))
    }

    /// Creates a `multipart/alternative` container.
    pub fn alternative(parts: impl IntoIterator<Item = Self>) -> Self {
        Self::Nested(Nested::new(MultipartKind::Alternative, parts))
    }

    /// Creates a `multipart/mixed` container.
    pub fn mixed(parts: impl IntoIterator<Item = Self>) -> Self {
        Self::Nested(Nested::new(MultipartKind::Mixed, parts))
    }

    /// Creates a `multipart/related` container.
    pub fn related(parts: impl IntoIterator<Item = Self>) -> Self {
        Self::Nested(Nested::new(MultipartKind::Related, parts))
    }

    /// Short name of the part source, used in error context.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::File(_) => "file",
            Self::Json(_) => "json",
            Self::Nested(_) => "nested",
        }
    }

    /// Renders the part into `writer` as one body part.
    ///
    /// # Errors
    ///
    /// Returns the first I/O, encoding or serialization error.
    pub fn render<W: Write>(self, writer: &mut MultipartWriter<W>) -> Result<()> {
        match self {
            Self::Text(text) => text.render(writer),
            Self::File(file) => file.render(writer),
            Self::Json(json) => json.render(writer),
            Self::Nested(nested) => nested.render(writer),
        }
    }

    /// Drops the part without rendering it, running any pending closers.
    fn release(self) {
        match self {
            Self::File(file) => file.release(),
            Self::Nested(nested) => nested.parts.release(),
            Self::Text(_) | Self::Json(_) => {}
        }
    }
}

impl From<Text> for Part {
    fn from(text: Text) -> Self {
        Self::Text(text)
    }
}

impl From<File> for Part {
    fn from(file: File) -> Self {
        Self::File(file)
    }
}

impl From<Json> for Part {
    fn from(json: Json) -> Self {
        Self::Json(json)
    }
}

impl From<Nested> for Part {
    fn from(nested: Nested) -> Self {
        Self::Nested(nested)
    }
}

/// Writes a quoted-printable body under `content_type`.
fn render_quoted_printable<W: Write>(
    writer: &mut MultipartWriter<W>,
    content_type: &ContentType,
    body: &[u8],
) -> Result<()> {
    let mut headers = Headers::new();
    headers.add("Content-Type", content_type.to_string());
    headers.add(
        "Content-Transfer-Encoding",
        TransferEncoding::QuotedPrintable.to_string(),
    );

    let part = writer.start_part(&headers)?;
    let mut encoder = QuotedPrintableWriter::new(part);
    encoder.write_all(body)?;
    encoder.finish()?;
    Ok(())
}

/// Text part source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    text: String,
    content_type: String,
}

impl Text {
    /// Creates a plain-text part.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            content_type: TEXT_PLAIN.to_string(),
        }
    }

    /// Overrides the content type (default `text/plain; charset=utf-8`).
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    fn render<W: Write>(self, writer: &mut MultipartWriter<W>) -> Result<()> {
        let content_type = ContentType::parse(&self.content_type)?;
        render_quoted_printable(writer, &content_type, self.text.as_bytes())?;
        debug!(content_type = %content_type, bytes = self.text.len(), "rendered text part");
        Ok(())
    }
}

/// JSON part source, sent as `application/json; charset=utf-8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json {
    value: serde_json::Value,
    content_type: String,
}

impl Json {
    /// Creates a JSON part from a value.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            content_type: APPLICATION_JSON.to_string(),
        }
    }

    /// Overrides the content type (default `application/json; charset=utf-8`).
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Creates a JSON part from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the value cannot be serialized.
    pub fn from_serialize<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    fn render<W: Write>(self, writer: &mut MultipartWriter<W>) -> Result<()> {
        let body = serde_json::to_vec(&self.value)?;
        let content_type = ContentType::parse(&self.content_type)?;
        render_quoted_printable(writer, &content_type, &body)?;
        debug!(content_type = %content_type, bytes = body.len(), "rendered json part");
        Ok(())
    }
}

/// Attachment part source, sent as base64.
///
/// The content type is derived from the filename extension unless set
/// explicitly. The reader is consumed once; the closer (if any) runs
/// exactly once whether the part renders, fails, or is never reached.
pub struct File {
    name: String,
    reader: Box<dyn Read + Send>,
    content_type: Option<String>,
    charset: Option<String>,
    inline: bool,
    expected_len: Option<u64>,
    closer: Option<Closer>,
    sanitizer: Sanitizer,
}

impl File {
    /// Creates an attachment named `name` read from `reader`.
    pub fn new(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
            content_type: None,
            charset: None,
            inline: false,
            expected_len: None,
            closer: None,
            sanitizer: to_ascii,
        }
    }

    /// Sets an explicit content type instead of guessing from the name.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the charset parameter (default `utf-8`).
    #[must_use]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Marks the part as inline rather than an attachment.
    #[must_use]
    pub const fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    /// Declares the source length; rendering fails if it differs.
    #[must_use]
    pub const fn with_len(mut self, len: u64) -> Self {
        self.expected_len = Some(len);
        self
    }

    /// Registers a cleanup hook for the source.
    #[must_use]
    pub fn with_closer(mut self, closer: impl FnOnce() -> io::Result<()> + Send + 'static) -> Self {
        self.closer = Some(Box::new(closer));
        self
    }

    /// Replaces the filename sanitizer used for the `name` parameter.
    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Final path component of the name.
    fn base_name(&self) -> &str {
        Path::new(&self.name)
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or(&self.name)
    }

    fn headers(&self) -> Result<Headers> {
        let base = self.base_name();
        let mut content_type = match &self.content_type {
            Some(explicit) => ContentType::parse(explicit)?,
            None => ContentType::parse(
                mime_guess::from_path(base)
                    .first_or_octet_stream()
                    .essence_str(),
            )?,
        };
        match (&self.charset, content_type.charset()) {
            (Some(charset), _) => content_type.set_parameter("charset", charset.as_str()),
            (None, None) => content_type.set_parameter("charset", "utf-8"),
            (None, Some(_)) => {}
        }
        let ascii_name = (self.sanitizer)(base);
        content_type.set_parameter("name", ascii_name.as_str());

        let disposition = if self.inline {
            ContentDisposition::inline(ascii_name)
        } else {
            ContentDisposition::attachment(ascii_name)
        };

        let mut headers = Headers::new();
        headers.add("Content-Type", content_type.to_string());
        headers.add("Content-Disposition", disposition.to_string());
        headers.add("Content-Transfer-Encoding", TransferEncoding::Base64.to_string());
        Ok(headers)
    }

    fn write_body<W: Write>(&mut self, writer: &mut MultipartWriter<W>) -> Result<u64> {
        let headers = self.headers()?;
        let part = writer.start_part(&headers)?;
        let mut encoder = Base64Writer::new(part);
        let copied = io::copy(&mut self.reader, &mut encoder)?;
        encoder.finish()?;

        if let Some(expected) = self.expected_len
            && copied != expected
        {
            return Err(Error::PartialWrite {
                expected,
                written: copied,
            });
        }
        Ok(copied)
    }

    fn render<W: Write>(mut self, writer: &mut MultipartWriter<W>) -> Result<()> {
        let written = self.write_body(writer);
        let closed = self.close();

        let bytes = written?;
        closed?;
        debug!(name = %self.name, bytes, "rendered file part");
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.reader = Box::new(io::empty());
        self.closer.take().map_or(Ok(()), |close| close())
    }

    fn release(mut self) {
        if let Err(e) = self.close() {
            warn!(name = %self.name, error = %e, "failed to close skipped file part");
        }
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("charset", &self.charset)
            .field("inline", &self.inline)
            .field("expected_len", &self.expected_len)
            .field("has_closer", &self.closer.is_some())
            .finish_non_exhaustive()
    }
}

/// Nested multipart container.
#[derive(Debug)]
pub struct Nested {
    kind: MultipartKind,
    parts: Parts,
}

impl Nested {
    /// Creates a container of `kind` holding `parts`.
    pub fn new(kind: MultipartKind, parts: impl IntoIterator<Item = Part>) -> Self {
        Self {
            kind,
            parts: parts.into_iter().collect(),
        }
    }

    /// Container kind.
    #[must_use]
    pub const fn kind(&self) -> MultipartKind {
        self.kind
    }

    /// Renders the children into a buffer with their own boundary, then
    /// writes the buffer as one part. An empty container renders nothing.
    fn render<W: Write>(self, writer: &mut MultipartWriter<W>) -> Result<()> {
        if self.parts.is_empty() {
            debug!(kind = %self.kind, "skipped empty nested container");
            return Ok(());
        }

        let mut buffer = Vec::new();
        let content_type = write_multipart(&mut buffer, self.kind, self.parts)?;

        let mut headers = Headers::new();
        headers.add("Content-Type", content_type);
        let mut part = writer.start_part(&headers)?;
        part.copy_exact(&buffer)?;

        debug!(kind = %self.kind, bytes = buffer.len(), "rendered nested container");
        Ok(())
    }
}

/// Ordered list of parts forming one multipart body.
#[derive(Debug, Default)]
pub struct Parts(Vec<Part>);

impl Parts {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a part.
    pub fn push(&mut self, part: impl Into<Part>) -> &mut Self {
        self.0.push(part.into());
        self
    }

    /// Appends a part, builder style.
    #[must_use]
    pub fn with(mut self, part: impl Into<Part>) -> Self {
        self.0.push(part.into());
        self
    }

    /// Number of top-level parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the parts in order.
    pub fn iter(&self) -> impl Iterator<Item = &Part> {
        self.0.iter()
    }

    /// Writes the parts as a `multipart/mixed` body and returns its
    /// `Content-Type` value.
    ///
    /// # Errors
    ///
    /// See [`write_multipart`].
    pub fn write_to<W: Write>(self, target: W) -> Result<String> {
        write_multipart(target, MultipartKind::Mixed, self)
    }

    /// Renders every part through `writer`, in order.
    ///
    /// On failure the parts not yet rendered are released (their closers
    /// run) and the error is returned with the failing part's position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] wrapping the first failure.
    pub fn render_into<W: Write>(self, writer: &mut MultipartWriter<W>) -> Result<()> {
        let mut parts = self.0.into_iter().enumerate();
        while let Some((index, part)) = parts.next() {
            let kind = part.kind();
            if let Err(err) = part.render(writer) {
                for (_, rest) in parts {
                    rest.release();
                }
                return Err(err.rendering(index, kind));
            }
        }
        Ok(())
    }

    fn release(self) {
        for part in self.0 {
            part.release();
        }
    }
}

impl From<Vec<Part>> for Parts {
    fn from(parts: Vec<Part>) -> Self {
        Self(parts)
    }
}

impl FromIterator<Part> for Parts {
    fn from_iter<I: IntoIterator<Item = Part>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Parts {
    type Item = Part;
    type IntoIter = std::vec::IntoIter<Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
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
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn render(part: impl Into<Part>) -> String {
        let mut writer = MultipartWriter::with_boundary(Vec::new(), "B").unwrap();
        Parts::new().with(part).render_into(&mut writer).unwrap();
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    fn counting_closer(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> io::Result<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_text_part() {
        assert_eq!(
            render(Part::text("hello=world")),
            concat!(
                "--B\r\n",
                "Content-Type: text/plain; charset=utf-8\r\n",
                "Content-Transfer-Encoding: quoted-printable\r\n",
                "\r\n",
                "hello=3Dworld",
                "\r\n--B--\r\n"
            )
        );
    }

    #[test]
    fn test_html_part() {
        let out = render(Part::html("<p>Hi</p>"));
        assert!(out.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(out.contains("\r\n\r\n<p>Hi</p>\r\n--B--"));
    }

    #[test]
    fn test_json_part() {
        let out = render(Part::json(serde_json::json!({"a": 1})));
        assert!(out.contains("Content-Type: application/json; charset=utf-8\r\n"));
        assert!(out.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(out.contains("{\"a\":1}"));
    }

    #[test]
    fn test_json_content_type_override() {
        let json = Json::new(serde_json::json!(null)).with_content_type("application/ld+json");
        let out = render(json);
        assert!(out.contains("Content-Type: application/ld+json\r\n"));
        assert!(out.contains("\r\n\r\nnull\r\n--B--"));
    }

    #[test]
    fn test_json_from_serialize() {
        let json = Json::from_serialize(&vec![1, 2, 3]).unwrap();
        assert_eq!(json, Json::new(serde_json::json!([1, 2, 3])));
    }

    #[test]
    fn test_file_part_headers() {
        let out = render(File::new("docs/Résumé.pdf", &b"%PDF"[..]));
        assert!(out.contains("Content-Type: application/pdf; charset=utf-8; name=Resume.pdf\r\n"));
        assert!(out.contains("Content-Disposition: attachment; filename=\"Resume.pdf\"\r\n"));
        assert!(out.contains("Content-Transfer-Encoding: base64\r\n\r\nJVBERg==\r\n--B--"));
    }

    #[test]
    fn test_file_part_unknown_extension() {
        let out = render(File::new("blob.zzzunknown", &b"x"[..]).inline());
        assert!(out.contains("Content-Type: application/octet-stream; charset=utf-8"));
        assert!(out.contains("Content-Disposition: inline; filename=\"blob.zzzunknown\""));
    }

    #[test]
    fn test_file_part_explicit_charset_kept() {
        let out = render(
            File::new("notes.txt", &b"x"[..]).with_content_type("text/plain; charset=latin1"),
        );
        assert!(out.contains("Content-Type: text/plain; charset=latin1; name=notes.txt"));

        let out = render(File::new("notes.txt", &b"x"[..]).with_charset("us-ascii"));
        assert!(out.contains("charset=us-ascii"));
    }

    #[test]
    fn test_file_part_custom_sanitizer() {
        let out = render(File::new("a b.txt", &b"x"[..]).with_sanitizer(|s| s.replace(' ', "-")));
        assert!(out.contains("name=a-b.txt"));
    }

    #[test]
    fn test_file_declared_length_mismatch() {
        let mut writer = MultipartWriter::new(Vec::new());
        let err = Parts::new()
            .with(File::new("a.bin", &b"abc"[..]).with_len(10))
            .render_into(&mut writer)
            .unwrap_err();
        assert!(matches!(
            err.root(),
            Error::PartialWrite {
                expected: 10,
                written: 3
            }
        ));
    }

    #[test]
    fn test_closer_runs_once_on_success() {
        let closed = Arc::new(AtomicUsize::new(0));
        render(File::new("a.txt", &b"abc"[..]).with_closer(counting_closer(&closed)));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_closes_remaining_parts() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let nested = Arc::new(AtomicUsize::new(0));

        let parts = Parts::new()
            .with(Part::text("ok"))
            .with(File::new("bad.bin", FailingReader).with_closer(counting_closer(&first)))
            .with(File::new("later.bin", &b"x"[..]).with_closer(counting_closer(&second)))
            .with(Part::mixed([Part::File(
                File::new("deep.bin", &b"x"[..]).with_closer(counting_closer(&nested)),
            )]));

        let mut writer = MultipartWriter::new(Vec::new());
        let err = parts.render_into(&mut writer).unwrap_err();

        assert!(matches!(err, Error::Render { index: 1, kind: "file", .. }), "{err}");
        assert!(err.to_string().starts_with("Failed to add file part 1"));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(nested.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closer_error_surfaces() {
        let mut writer = MultipartWriter::new(Vec::new());
        let err = Parts::new()
            .with(
                File::new("a.txt", &b"x"[..])
                    .with_closer(|| Err(io::Error::other("close failed"))),
            )
            .render_into(&mut writer)
            .unwrap_err();
        assert!(matches!(err.root(), Error::Io(_)));
    }

    #[test]
    fn test_empty_nested_renders_nothing() {
        let mut writer = MultipartWriter::with_boundary(Vec::new(), "B").unwrap();
        Parts::new()
            .with(Part::alternative([]))
            .render_into(&mut writer)
            .unwrap();
        assert_eq!(writer.part_count(), 0);
        assert_eq!(writer.finish().unwrap(), b"--B--\r\n");
    }

    #[test]
    fn test_nested_part() {
        let out = render(Part::alternative([Part::text("a"), Part::html("b")]));
        assert!(out.starts_with("--B\r\nContent-Type: multipart/alternative; boundary="));
        assert_eq!(out.matches("Content-Transfer-Encoding: quoted-printable").count(), 2);
        assert!(out.ends_with("--\r\n\r\n--B--\r\n"));
    }

    #[test]
    fn test_nested_error_context() {
        let mut writer = MultipartWriter::new(Vec::new());
        let err = Parts::new()
            .with(Part::text("ok"))
            .with(Part::mixed([
                Part::text("inner"),
                Part::Text(Text::new("x").with_content_type("not a type")),
            ]))
            .render_into(&mut writer)
            .unwrap_err();

        let Error::Render { index, kind, source } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!((*index, *kind), (1, "nested"));
        assert!(matches!(**source, Error::Render { index: 1, kind: "text", .. }));
        assert!(matches!(err.root(), Error::InvalidContentType(_)));
    }

    #[test]
    fn test_write_to_is_mixed() {
        let mut out = Vec::new();
        let content_type = Parts::new().with(Part::text("x")).write_to(&mut out).unwrap();
        assert!(content_type.starts_with("multipart/mixed; boundary="));
        assert_eq!(Parts::from(vec![Part::text("a")]).len(), 1);
    }
}
