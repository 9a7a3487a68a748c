//! Error types for multipart operations.

use std::io;

/// Result type alias for multipart operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Multipart error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// The sink stopped accepting bytes before a write completed.
    #[error("Partial write: {written} of {expected} bytes written")]
    PartialWrite {
        /// Bytes that should have been written.
        expected: u64,
        /// Bytes the sink actually accepted.
        written: u64,
    },

    /// Transfer encoding failed.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Transfer decoding failed.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// JSON serialization of a part failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Multipart content type without a boundary parameter.
    #[error("Missing boundary in multipart content type")]
    MissingBoundary,

    /// Boundary token or delimiter line is not valid.
    #[error("Malformed boundary: {0}")]
    MalformedBoundary(String),

    /// Multipart containers nested deeper than allowed.
    #[error("Maximum multipart nesting depth {max} exceeded at depth {depth}")]
    MaxDepthExceeded {
        /// Depth of the rejected container.
        depth: usize,
        /// Configured maximum depth.
        max: usize,
    },

    /// More sibling parts than allowed in one container.
    #[error("Maximum of {max} parts per multipart level exceeded")]
    TooManyParts {
        /// Configured maximum part count.
        max: usize,
    },

    /// Invalid header line or header block.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// The stream ended before the multipart structure was complete.
    #[error("Unexpected end of stream {0}")]
    UnexpectedEof(&'static str),

    /// Error returned by a caller-supplied part handler.
    #[error("Part handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Rendering a part failed.
    #[error("Failed to add {kind} part {index}: {source}")]
    Render {
        /// Position of the part within its container.
        index: usize,
        /// Kind of part source (e.g. "text", "file").
        kind: &'static str,
        /// Underlying error.
        source: Box<Error>,
    },

    /// Parsing a part failed.
    #[error("Failed to parse part {index} at depth {depth}: {source}")]
    Nested {
        /// Depth of the container holding the part.
        depth: usize,
        /// Position of the part within its container.
        index: usize,
        /// Underlying error.
        source: Box<Error>,
    },
}

/// Transfer decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Byte outside the base64 alphabet.
    #[error("invalid base64 byte 0x{byte:02X} at offset {offset}")]
    InvalidBase64 {
        /// Offending byte.
        byte: u8,
        /// Offset within the encoded input.
        offset: u64,
    },

    /// Padding in a position the encoding does not allow.
    #[error("invalid base64 padding near offset {0}")]
    InvalidPadding(u64),

    /// Encoded data after base64 padding.
    #[error("base64 data after padding at offset {0}")]
    TrailingBase64(u64),

    /// Base64 input ended mid-quantum.
    #[error("truncated base64 input ({0} dangling characters)")]
    TruncatedBase64(usize),

    /// Malformed `=XX` quoted-printable escape.
    #[error("invalid quoted-printable escape {0:?}")]
    InvalidEscape(String),

    /// Encoded line longer than any conforming encoder produces.
    #[error("encoded line exceeds {0} bytes")]
    LineTooLong(usize),
}

impl Error {
    /// Wraps an arbitrary error returned by a part handler.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }

    /// Returns the innermost error, skipping part context wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Render { source, .. } | Self::Nested { source, .. } => source.root(),
            other => other,
        }
    }

    /// Wraps this error with the position of the part being rendered.
    #[must_use]
    pub(crate) fn rendering(self, index: usize, kind: &'static str) -> Self {
        Self::Render {
            index,
            kind,
            source: Box::new(self),
        }
    }

    /// Wraps this error with the position of the part being parsed.
    #[must_use]
    pub(crate) fn parsing(self, depth: usize, index: usize) -> Self {
        Self::Nested {
            depth,
            index,
            source: Box::new(self),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        // Codec errors raised inside Read/Write impls travel boxed in io::Error.
        if err.get_ref().is_some_and(|inner| inner.is::<Self>()) {
            let kind = err.kind();
            return match err.into_inner().map(|inner| inner.downcast::<Self>()) {
                Some(Ok(inner)) => *inner,
                _ => Self::Io(io::Error::from(kind)),
            };
        }
        Self::Io(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            other => Self::new(io::ErrorKind::InvalidData, other),
        }
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

    #[test]
    fn test_io_round_trip_keeps_variant() {
        let io_err: io::Error = Error::Decode(DecodeError::TruncatedBase64(2)).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let err = Error::from(io_err);
        assert!(matches!(
            err,
            Error::Decode(DecodeError::TruncatedBase64(2))
        ));
    }

    #[test]
    fn test_plain_io_error_passes_through() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        match err {
            Error::Io(inner) => {
                assert_eq!(inner.kind(), io::ErrorKind::BrokenPipe);
                assert_eq!(inner.to_string(), "gone");
            }
            other => panic!("unexpected error: {other}"),
        }

        let back: io::Error = Error::Io(io::Error::from(io::ErrorKind::TimedOut)).into();
        assert_eq!(back.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_root_skips_context() {
        let err = Error::TooManyParts { max: 3 }
            .parsing(1, 3)
            .parsing(0, 0);
        assert!(matches!(err.root(), Error::TooManyParts { max: 3 }));
        assert_eq!(
            err.to_string(),
            "Failed to parse part 0 at depth 0: Failed to parse part 3 at depth 1: \
             Maximum of 3 parts per multipart level exceeded"
        );

        let err = Error::MissingBoundary.rendering(2, "nested");
        assert!(matches!(err.root(), Error::MissingBoundary));
    }
}
