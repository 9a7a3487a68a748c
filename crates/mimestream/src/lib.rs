//! # mimestream
//!
//! Streaming MIME multipart writer and bounded recursive parser.
//!
//! ## Features
//!
//! - **Multipart writing**: Text, file, JSON and nested parts framed with
//!   RFC 2046 boundaries, streamed straight into any `Write` sink
//! - **Byte-exact output**: A sink that stops accepting bytes is an error,
//!   never a silently truncated body
//! - **Recursive parsing**: Depth-first walk of nested multipart bodies with
//!   limits on depth and parts per level
//! - **Transfer encodings**: Streaming Base64 and Quoted-Printable codecs
//! - **Spooling**: Collect parsed parts into re-readable temporary storage
//!
//! ## Quick Start
//!
//! ### Writing Multipart Bodies
//!
//! ```ignore
//! use mimestream::{File, Part, Parts};
//!
//! let parts = Parts::new()
//!     .with(Part::text("Please find the report attached."))
//!     .with(File::new("report.pdf", std::fs::File::open("report.pdf")?));
//!
//! let mut body = Vec::new();
//! let content_type = parts.write_to(&mut body)?;
//! // content_type == "multipart/mixed; boundary=..."
//! ```
//!
//! ### Alternative Bodies
//!
//! ```ignore
//! use mimestream::{MultipartKind, Part, Parts, write_multipart};
//!
//! let parts = Parts::new()
//!     .with(Part::text("Plain text version"))
//!     .with(Part::html("<h1>HTML version</h1>"));
//!
//! let content_type = write_multipart(&mut sink, MultipartKind::Alternative, parts)?;
//! ```
//!
//! ### Parsing
//!
//! ```ignore
//! use mimestream::{Limits, parse_multipart_with};
//! use std::io::Read;
//!
//! let limits = Limits::builder().max_depth(4).build();
//! parse_multipart_with(message, limits, |headers, body| {
//!     let mut content = Vec::new();
//!     body.read_to_end(&mut content)?;
//!     println!("{:?}", headers.get("content-type"));
//!     Ok(())
//! })?;
//! ```
//!
//! ### Spooling
//!
//! ```ignore
//! use mimestream::spool::{DEFAULT_SPOOL_THRESHOLD, collect_parts};
//!
//! for mut part in collect_parts(message, &Limits::default(), DEFAULT_SPOOL_THRESHOLD)? {
//!     let body = part.to_vec()?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod content_type;
mod error;
mod header;
mod parser;
mod part;
mod reader;
mod writer;

pub mod ascii;
pub mod encoding;
pub mod spool;

pub use config::{
    DEFAULT_MAX_DEPTH, DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_PARTS_PER_LEVEL, Limits,
    LimitsBuilder,
};
pub use content_type::{
    APPLICATION_JSON, ContentDisposition, ContentType, TEXT_HTML, TEXT_MARKDOWN, TEXT_PLAIN,
    format_parameter, parse_parameters,
};
pub use encoding::TransferEncoding;
pub use error::{DecodeError, Error, Result};
pub use header::Headers;
pub use parser::{Parser, parse_multipart, parse_multipart_with};
pub use part::{Closer, File, Json, Nested, Part, Parts, Sanitizer, Text};
pub use reader::{MultipartReader, PartBody};
pub use writer::{
    MAX_BOUNDARY_LENGTH, MultipartKind, MultipartWriter, PartWriter, random_boundary,
    validate_boundary, write_multipart,
};
