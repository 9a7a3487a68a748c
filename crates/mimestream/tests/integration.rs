//! Integration tests for writing and parsing multipart bodies.
//!
//! Bodies are produced by the writer, prefixed with their entity header and
//! fed back through the parser.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use proptest::prelude::*;

use mimestream::{
    Error, File, Headers, Limits, MultipartKind, MultipartWriter, Part, Parts, parse_multipart,
    parse_multipart_with, random_boundary, write_multipart,
};

/// A parsed leaf: headers and decoded body.
type Leaf = (Headers, Vec<u8>);

/// Writes `parts` as a complete entity: `Content-Type` header plus body.
fn message(kind: MultipartKind, parts: Parts) -> Vec<u8> {
    let mut body = Vec::new();
    let content_type = write_multipart(&mut body, kind, parts).unwrap();
    let mut out = format!("Content-Type: {content_type}\r\n\r\n").into_bytes();
    out.extend_from_slice(&body);
    out
}

fn parse_leaves(data: &[u8], limits: Limits) -> (Vec<Leaf>, mimestream::Result<()>) {
    let mut leaves = Vec::new();
    let result = parse_multipart_with(data, limits, |headers, body| {
        let mut content = Vec::new();
        body.read_to_end(&mut content)?;
        leaves.push((headers.clone(), content));
        Ok(())
    });
    (leaves, result)
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

/// Wraps `leaf` in `levels` nested mixed containers.
fn nest(levels: usize, leaf: Part) -> Part {
    (0..levels).fold(leaf, |inner, _| Part::mixed([inner]))
}

/// Sink that accepts a fixed number of bytes, then stops.
struct CappedSink {
    written: usize,
    capacity: usize,
}

impl Write for CappedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.capacity - self.written);
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "source went away"))
    }
}

#[test_log::test]
fn test_text_and_file_scenario() {
    let data = message(
        MultipartKind::Mixed,
        Parts::new()
            .with(Part::text("hello"))
            .with(File::new("a.txt", &b"abc"[..])),
    );

    let (leaves, result) = parse_leaves(&data, Limits::default());
    result.unwrap();
    assert_eq!(leaves.len(), 2);

    let (text_headers, text_body) = &leaves[0];
    assert_eq!(text_headers.get("Content-Type"), Some("text/plain; charset=utf-8"));
    assert_eq!(
        text_headers.get("Content-Transfer-Encoding"),
        Some("quoted-printable")
    );
    assert_eq!(text_body, b"hello");

    let (file_headers, file_body) = &leaves[1];
    assert_eq!(
        file_headers.get("content-type"),
        Some("text/plain; charset=utf-8; name=a.txt")
    );
    assert_eq!(
        file_headers.get("content-disposition"),
        Some("attachment; filename=\"a.txt\"")
    );
    assert_eq!(file_headers.get("content-transfer-encoding"), Some("base64"));
    assert_eq!(file_body, b"abc");
}

#[test_log::test]
fn test_nested_round_trip() {
    let binary: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
    let data = message(
        MultipartKind::Mixed,
        Parts::new()
            .with(Part::alternative([
                Part::text("plain body\r\nsecond line"),
                Part::html("<p>html body</p>"),
            ]))
            .with(File::new("photo.png", io::Cursor::new(binary.clone())).inline())
            .with(Part::json(serde_json::json!({"ok": true, "n": [1, 2]})))
            .with(Part::related([Part::markdown("# title")])),
    );

    let (leaves, result) = parse_leaves(&data, Limits::default());
    result.unwrap();

    let bodies: Vec<&[u8]> = leaves.iter().map(|(_, body)| body.as_slice()).collect();
    assert_eq!(bodies.len(), 5);
    assert_eq!(bodies[0], b"plain body\r\nsecond line");
    assert_eq!(bodies[1], b"<p>html body</p>");
    assert_eq!(bodies[2], binary.as_slice());
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(bodies[3]).unwrap(),
        serde_json::json!({"ok": true, "n": [1, 2]})
    );
    assert_eq!(bodies[4], b"# title");

    assert!(leaves[2].0.get("content-type").unwrap().starts_with("image/png"));
    assert!(leaves[2].0.get("content-disposition").unwrap().starts_with("inline;"));
}

#[test]
fn test_boundaries_differ_per_level() {
    let data = message(
        MultipartKind::Mixed,
        Parts::new().with(Part::alternative([Part::text("a"), Part::text("b")])),
    );
    let text = String::from_utf8(data).unwrap();
    let boundaries: Vec<&str> = text
        .match_indices("boundary=")
        .map(|(at, _)| &text[at + 9..at + 9 + 60])
        .collect();
    assert_eq!(boundaries.len(), 2);
    assert_ne!(boundaries[0], boundaries[1]);
}

#[test_log::test]
fn test_depth_guard() {
    let limits = Limits::builder().max_depth(3).build();

    // Top-level container is depth 0; three nested levels reach depth 3.
    let data = message(
        MultipartKind::Mixed,
        Parts::new().with(nest(3, Part::text("deep"))),
    );
    let (leaves, result) = parse_leaves(&data, limits);
    result.unwrap();
    assert_eq!(leaves.len(), 1);

    let data = message(
        MultipartKind::Mixed,
        Parts::new()
            .with(Part::text("shallow"))
            .with(nest(4, Part::text("too deep"))),
    );
    let (leaves, result) = parse_leaves(&data, limits);
    let err = result.unwrap_err();
    assert!(
        matches!(err.root(), Error::MaxDepthExceeded { depth: 4, max: 3 }),
        "{err}"
    );
    assert!(matches!(err, Error::Nested { depth: 0, index: 1, .. }));
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].1, b"shallow");
}

#[test_log::test]
fn test_part_count_guard() {
    let limits = Limits::default();
    let parts: Parts = (0..=limits.max_parts_per_level)
        .map(|i| Part::text(format!("part {i}")))
        .collect();
    let data = message(MultipartKind::Mixed, parts);

    let (leaves, result) = parse_leaves(&data, limits);
    let err = result.unwrap_err();
    assert!(matches!(err, Error::TooManyParts { max: 50 }), "{err}");
    assert_eq!(leaves.len(), limits.max_parts_per_level);
}

#[test]
fn test_missing_boundary() {
    let data = b"Content-Type: multipart/alternative; charset=utf-8\r\n\r\n--x\r\n\r\nbody\r\n--x--\r\n";
    let mut calls = 0;
    let result = parse_multipart(&data[..], |_, _| {
        calls += 1;
        Ok(())
    });
    assert!(matches!(result, Err(Error::MissingBoundary)));
    assert_eq!(calls, 0);
}

#[test]
fn test_malformed_boundary() {
    let long = "x".repeat(71);
    let data = format!("Content-Type: multipart/mixed; boundary={long}\r\n\r\n");
    let (_, result) = parse_leaves(data.as_bytes(), Limits::default());
    assert!(matches!(result, Err(Error::MalformedBoundary(_))));

    let data = b"Content-Type: multipart/mixed; boundary=\"\"\r\n\r\n";
    let (_, result) = parse_leaves(data, Limits::default());
    assert!(matches!(result, Err(Error::MalformedBoundary(_))));
}

#[test]
fn test_partial_write() {
    for capacity in [0, 10, 200] {
        let sink = CappedSink {
            written: 0,
            capacity,
        };
        let parts = Parts::new()
            .with(Part::text("x".repeat(500)))
            .with(File::new("a.bin", io::Cursor::new(vec![1u8; 500])));
        let err = write_multipart(sink, MultipartKind::Mixed, parts).unwrap_err();
        assert!(
            matches!(err.root(), Error::PartialWrite { .. }),
            "capacity {capacity}: {err}"
        );
    }
}

#[test]
fn test_partial_write_in_closing_delimiter() {
    let mut writer = MultipartWriter::new(CappedSink {
        written: 0,
        capacity: 4,
    });
    Parts::new().render_into(&mut writer).unwrap();
    assert!(matches!(writer.finish(), Err(Error::PartialWrite { .. })));
}

#[test_log::test]
fn test_closers_run_exactly_once() {
    let ok = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let skipped = Arc::new(AtomicUsize::new(0));

    // Success
    let parts =
        Parts::new().with(File::new("ok.txt", &b"fine"[..]).with_closer(counting_closer(&ok)));
    write_multipart(io::sink(), MultipartKind::Mixed, parts).unwrap();
    assert_eq!(ok.load(Ordering::SeqCst), 1);

    // Copy failure, then a part that is never reached
    let parts = Parts::new()
        .with(File::new("bad.txt", FailingReader).with_closer(counting_closer(&failed)))
        .with(Part::alternative([Part::File(
            File::new("later.txt", &b"x"[..]).with_closer(counting_closer(&skipped)),
        )]));
    let err = write_multipart(io::sink(), MultipartKind::Mixed, parts).unwrap_err();
    assert!(matches!(err, Error::Render { index: 0, kind: "file", .. }));
    match err.root() {
        Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(failed.load(Ordering::SeqCst), 1);
    assert_eq!(skipped.load(Ordering::SeqCst), 1);
}

#[test_log::test]
fn test_premature_end_of_stream() {
    let data = message(
        MultipartKind::Mixed,
        Parts::new()
            .with(Part::text("first"))
            .with(Part::text("second body that gets cut")),
    );

    // Cut inside the second body
    let cut = data.len() - 70;
    let (leaves, result) = parse_leaves(&data[..cut], Limits::default());
    let err = result.unwrap_err();
    assert!(
        matches!(err.root(), Error::UnexpectedEof("inside a part body")),
        "{err}"
    );
    assert_eq!(leaves.len(), 1);

    // Cut right after the last delimiter line
    let text = String::from_utf8(data.clone()).unwrap();
    let at = text.find("boundary=").unwrap() + 9;
    let marker = format!("\r\n--{}\r\n", &text[at..at + 60]);
    let cut = text.rfind(&marker).unwrap() + marker.len();
    let (_, result) = parse_leaves(&data[..cut], Limits::default());
    assert!(matches!(
        result.unwrap_err().root(),
        Error::UnexpectedEof("before the closing delimiter")
    ));

    // Only the entity header
    let header_end = data.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let (_, result) = parse_leaves(&data[..header_end], Limits::default());
    assert!(matches!(
        result,
        Err(Error::UnexpectedEof("before the opening delimiter"))
    ));
}

#[test_log::test]
fn test_decode_error_in_part() {
    let data = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\nContent-Transfer-Encoding: base64\r\n\r\nnot*base64\r\n--b--\r\n";
    let (_, result) = parse_leaves(data, Limits::default());
    let err = result.unwrap_err();
    assert!(matches!(err.root(), Error::Decode(_)), "{err}");
}

#[test_log::test]
fn test_pipe_between_threads() {
    let (reader, mut writer) = io::pipe().unwrap();
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    let producer = thread::spawn(move || -> mimestream::Result<()> {
        let boundary = random_boundary();
        write!(
            writer,
            "Content-Type: multipart/mixed; boundary={boundary}\r\n\r\n"
        )?;
        let mut multipart = MultipartWriter::with_boundary(writer, boundary)?;
        Parts::new()
            .with(Part::text("streamed"))
            .with(File::new("payload.bin", io::Cursor::new(payload)))
            .render_into(&mut multipart)?;
        multipart.finish()?;
        Ok(())
    });

    let mut leaves = Vec::new();
    parse_multipart(reader, |headers, body| {
        let mut content = Vec::new();
        body.read_to_end(&mut content)?;
        leaves.push((headers.get("content-type").map(str::to_string), content));
        Ok(())
    })
    .unwrap();
    producer.join().unwrap().unwrap();

    assert_eq!(leaves.len(), 2);
    assert_eq!(leaves[0].1, b"streamed");
    assert_eq!(leaves[1].1, expected);
    assert_eq!(
        leaves[1].0.as_deref(),
        Some("application/octet-stream; charset=utf-8; name=payload.bin")
    );
}

proptest! {
    #[test]
    fn prop_round_trip(
        text in "[^\r\n]{0,200}",
        lines in prop::collection::vec("[ -~]{0,90}", 0..4),
        data in prop::collection::vec(any::<u8>(), 0..2000),
        nested in any::<bool>(),
    ) {
        let multiline = lines.join("\r\n");
        let leaves = [
            Part::text(text.clone()),
            Part::File(File::new("data.bin", io::Cursor::new(data.clone()))),
        ];
        let mut parts = Parts::new();
        if nested {
            parts.push(Part::alternative(leaves));
        } else {
            for leaf in leaves {
                parts.push(leaf);
            }
        }
        parts.push(Part::text(multiline.clone()));

        let encoded = message(MultipartKind::Mixed, parts);
        let (decoded, result) = parse_leaves(&encoded, Limits::default());
        prop_assert!(result.is_ok());
        prop_assert_eq!(decoded.len(), 3);
        prop_assert_eq!(&decoded[0].1, text.as_bytes());
        prop_assert_eq!(&decoded[1].1, &data);
        prop_assert_eq!(&decoded[2].1, multiline.as_bytes());
    }
}
