//! MIME header handling.

use crate::error::{Error, Result};
use std::fmt;

/// Ordered collection of MIME headers.
///
/// Lookup is case-insensitive; names keep the casing they were added with,
/// and repeated fields are preserved in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets a header value, replacing any existing values.
    ///
    /// The new value takes the position of the first replaced one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(first) => {
                let tail = self.entries.split_off(first + 1);
                self.entries
                    .extend(tail.into_iter().filter(|(n, _)| !n.eq_ignore_ascii_case(&name)));
                self.entries[first] = (name, value);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns true if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header fields, counting repeats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no header fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a header block.
    ///
    /// Lines may end in CRLF or LF. Continuation lines (starting with space
    /// or tab) are unfolded into the previous field. Parsing stops at the
    /// first empty line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHeader`] for a line without a colon, an
    /// invalid field name, or a continuation with no preceding field.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_bytes(text.as_bytes())
    }

    /// Parses a raw header block; see [`Headers::parse`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHeader`] if a line is not a valid field.
    pub fn parse_bytes(block: &[u8]) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for raw in block.split(|&b| b == b'\n') {
            let line = raw.strip_suffix(b"\r").unwrap_or(raw);
            if line.is_empty() {
                break;
            }

            // Continuation line
            if line[0] == b' ' || line[0] == b'\t' {
                let Some((_, value)) = current.as_mut() else {
                    return Err(Error::MalformedHeader(format!(
                        "continuation without a field: {}",
                        String::from_utf8_lossy(line).trim()
                    )));
                };
                let folded = String::from_utf8_lossy(line);
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(folded.trim());
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }

            let Some(colon) = line.iter().position(|&b| b == b':') else {
                return Err(Error::MalformedHeader(format!(
                    "missing colon: {}",
                    String::from_utf8_lossy(line)
                )));
            };
            let name = &line[..colon];
            if name.is_empty() || !name.iter().all(|b| (b'!'..=b'~').contains(b)) {
                return Err(Error::MalformedHeader(format!(
                    "invalid field name: {:?}",
                    String::from_utf8_lossy(name)
                )));
            }

            current = Some((
                String::from_utf8_lossy(name).into_owned(),
                String::from_utf8_lossy(&line[colon + 1..]).trim().to_string(),
            ));
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        Ok(headers)
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
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
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_headers_set() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("Subject", "Hi");
        headers.add("to", "bob@example.com");
        assert_eq!(headers.get_all("To").len(), 2);

        headers.set("To", "charlie@example.com");
        assert_eq!(headers.get_all("To"), vec!["charlie@example.com"]);
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["To", "Subject"]);
    }

    #[test]
    fn test_headers_remove() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        assert!(headers.get("Subject").is_some());

        headers.remove("subject");
        assert!(headers.get("Subject").is_none());
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "Received: one\r\n",
            "Received: two\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(text).unwrap();
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get_all("received"), vec!["one", "two"]);
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert!(headers.get("Body").is_none());
    }

    #[test]
    fn test_headers_parse_bare_lf() {
        let headers = Headers::parse("A: 1\nb: 2\n\n").unwrap();
        assert_eq!(headers.get("a"), Some("1"));
        assert_eq!(headers.get("B"), Some("2"));
    }

    #[test]
    fn test_headers_parse_errors() {
        assert!(matches!(
            Headers::parse("no colon here\r\n"),
            Err(Error::MalformedHeader(_))
        ));
        assert!(matches!(
            Headers::parse(" folded: first\r\n"),
            Err(Error::MalformedHeader(_))
        ));
        assert!(matches!(
            Headers::parse("Bad Name: x\r\n"),
            Err(Error::MalformedHeader(_))
        ));
        assert!(matches!(
            Headers::parse(": empty\r\n"),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_headers_display_preserves_case_and_order() {
        let mut headers = Headers::new();
        headers.add("content-TYPE", "text/plain");
        headers.add("X-Custom", "1");

        assert_eq!(headers.to_string(), "content-TYPE: text/plain\r\nX-Custom: 1\r\n");
    }

    #[test]
    fn test_headers_from_iter() {
        let headers: Headers = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.iter().count(), 2);
    }
}
