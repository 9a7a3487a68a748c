//! MIME content type and disposition handling.

use crate::error::{Error, Result};
use std::fmt;

/// Unformatted text.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// HTML.
pub const TEXT_HTML: &str = "text/html; charset=utf-8";

/// Markdown.
pub const TEXT_MARKDOWN: &str = "text/markdown; charset=utf-8";

/// JSON.
pub const APPLICATION_JSON: &str = "application/json; charset=utf-8";

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters in order (e.g., charset=utf-8, boundary=xxx).
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: Vec::new(),
        }
    }

    /// Creates a text/plain content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "utf-8")
    }

    /// Creates a multipart content type with boundary.
    #[must_use]
    pub fn multipart(sub_type: impl Into<String>, boundary: impl Into<String>) -> Self {
        Self::new("multipart", sub_type).with_parameter("boundary", boundary)
    }

    /// Adds or replaces a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(key, value);
        self
    }

    /// Adds or replaces a parameter in place.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        set_parameter(&mut self.parameters, key.into(), value.into());
    }

    /// Returns a parameter by case-insensitive name.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        get_parameter(&self.parameters, key)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Returns the name parameter if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameter("name")
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="quoted value"`
    ///
    /// # Errors
    ///
    /// Returns an error if the format is invalid.
    pub fn parse(s: &str) -> Result<Self> {
        let (type_str, params) = s.split_once(';').unwrap_or((s, ""));

        let (main_type, sub_type) = type_str
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("missing subtype in {s:?}")))?;
        let main_type = main_type.trim();
        let sub_type = sub_type.trim();
        if !is_token(main_type) || !is_token(sub_type) {
            return Err(Error::InvalidContentType(format!(
                "invalid media type {type_str:?}"
            )));
        }

        Ok(Self {
            main_type: main_type.to_lowercase(),
            sub_type: sub_type.to_lowercase(),
            parameters: parse_parameters(params)?,
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        for (key, value) in &self.parameters {
            write!(f, "; {}", format_parameter(key, value))?;
        }

        Ok(())
    }
}

/// Content disposition (`attachment` or `inline`) with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type, lowercase.
    pub disposition: String,
    /// Parameters in order (e.g., filename).
    pub parameters: Vec<(String, String)>,
}

impl ContentDisposition {
    /// Creates an `attachment` disposition with a filename.
    #[must_use]
    pub fn attachment(filename: impl Into<String>) -> Self {
        Self {
            disposition: "attachment".to_string(),
            parameters: vec![("filename".to_string(), filename.into())],
        }
    }

    /// Creates an `inline` disposition with a filename.
    #[must_use]
    pub fn inline(filename: impl Into<String>) -> Self {
        Self {
            disposition: "inline".to_string(),
            parameters: vec![("filename".to_string(), filename.into())],
        }
    }

    /// Returns true for the `inline` disposition.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.disposition == "inline"
    }

    /// Returns the filename parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        get_parameter(&self.parameters, "filename")
    }

    /// Parses a content disposition string.
    ///
    /// # Errors
    ///
    /// Returns an error if the disposition type or parameters are invalid.
    pub fn parse(s: &str) -> Result<Self> {
        let (disposition, params) = s.split_once(';').unwrap_or((s, ""));
        let disposition = disposition.trim();
        if !is_token(disposition) {
            return Err(Error::InvalidContentType(format!(
                "invalid disposition {disposition:?}"
            )));
        }

        Ok(Self {
            disposition: disposition.to_lowercase(),
            parameters: parse_parameters(params)?,
        })
    }
}

impl fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.disposition)?;
        for (key, value) in &self.parameters {
            if key == "filename" {
                write!(f, "; {key}=\"{}\"", escape_quoted(value))?;
            } else {
                write!(f, "; {}", format_parameter(key, value))?;
            }
        }
        Ok(())
    }
}

/// Parses a `; key=value` parameter list.
///
/// Names are lowercased; values may be tokens or quoted strings with
/// backslash escapes. Parameters without `=` are skipped.
///
/// # Errors
///
/// Returns an error for an unterminated quoted string or a repeated name.
pub fn parse_parameters(s: &str) -> Result<Vec<(String, String)>> {
    let mut parameters: Vec<(String, String)> = Vec::new();
    let mut rest = s;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        let key_end = rest.find(['=', ';']).unwrap_or(rest.len());
        let key = rest[..key_end].trim().to_lowercase();
        rest = &rest[key_end..];

        let Some(after_eq) = rest.strip_prefix('=') else {
            continue;
        };
        let after_eq = after_eq.trim_start();

        let value = if let Some(quoted) = after_eq.strip_prefix('"') {
            let (value, consumed) = unquote(quoted).ok_or_else(|| {
                Error::InvalidContentType(format!("unterminated quoted value for {key:?}"))
            })?;
            rest = &quoted[consumed..];
            value
        } else {
            let end = after_eq.find(';').unwrap_or(after_eq.len());
            rest = &after_eq[end..];
            after_eq[..end].trim().to_string()
        };

        if key.is_empty() {
            continue;
        }
        if get_parameter(&parameters, &key).is_some() {
            return Err(Error::InvalidContentType(format!(
                "duplicate parameter {key:?}"
            )));
        }
        parameters.push((key, value));
    }

    Ok(parameters)
}

/// Formats one `key=value` parameter, quoting the value when needed.
#[must_use]
pub fn format_parameter(key: &str, value: &str) -> String {
    if is_token(value) {
        format!("{key}={value}")
    } else {
        format!("{key}=\"{}\"", escape_quoted(value))
    }
}

/// Reads a quoted string body (after the opening quote).
///
/// Returns the unescaped value and the bytes consumed including the closing
/// quote.
fn unquote(s: &str) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((value, i + 1)),
            '\\' => value.push(chars.next()?.1),
            _ => value.push(c),
        }
    }
    None
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// RFC 2045 token: non-empty printable ASCII without tspecials.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
}

fn get_parameter<'a>(parameters: &'a [(String, String)], key: &str) -> Option<&'a str> {
    parameters
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

fn set_parameter(parameters: &mut Vec<(String, String)>, key: String, value: String) {
    let key = key.to_lowercase();
    match parameters.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => parameters.push((key, value)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("text", "plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_text_plain() {
        let ct = ContentType::text_plain();
        assert_eq!(ct.essence(), "text/plain");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert!(ct.is_text());
        assert_eq!(ct.to_string(), TEXT_PLAIN);
    }

    #[test]
    fn test_multipart() {
        let ct = ContentType::multipart("mixed", "boundary123");
        assert_eq!(ct.main_type, "multipart");
        assert_eq!(ct.sub_type, "mixed");
        assert_eq!(ct.boundary(), Some("boundary123"));
        assert!(ct.is_multipart());
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=boundary123");
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; CharSet=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"").unwrap();
        assert_eq!(ct.main_type, "multipart");
        assert_eq!(ct.sub_type, "mixed");
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
    }

    #[test]
    fn test_content_type_parse_quoted_semicolon_and_escape() {
        let ct =
            ContentType::parse(r#"application/pdf; name="a; \"b\".pdf"; charset=us-ascii"#).unwrap();
        assert_eq!(ct.name(), Some(r#"a; "b".pdf"#));
        assert_eq!(ct.charset(), Some("us-ascii"));
    }

    #[test]
    fn test_content_type_parse_errors() {
        assert!(matches!(
            ContentType::parse("text"),
            Err(Error::InvalidContentType(_))
        ));
        assert!(matches!(
            ContentType::parse("text/"),
            Err(Error::InvalidContentType(_))
        ));
        assert!(matches!(
            ContentType::parse("text/plain; name=\"open"),
            Err(Error::InvalidContentType(_))
        ));
        assert!(matches!(
            ContentType::parse("multipart/mixed; boundary=a; boundary=b"),
            Err(Error::InvalidContentType(_))
        ));
    }

    #[test]
    fn test_content_type_display_quotes_when_needed() {
        let ct = ContentType::new("application", "octet-stream")
            .with_parameter("charset", "utf-8")
            .with_parameter("name", "my file.bin");
        assert_eq!(
            ct.to_string(),
            "application/octet-stream; charset=utf-8; name=\"my file.bin\""
        );
    }

    #[test]
    fn test_content_type_with_parameter() {
        let ct = ContentType::new("text", "plain")
            .with_parameter("charset", "iso-8859-1")
            .with_parameter("format", "flowed")
            .with_parameter("Charset", "utf-8");

        assert_eq!(ct.charset(), Some("utf-8"));
        assert_eq!(ct.parameter("FORMAT"), Some("flowed"));
        assert_eq!(ct.parameters.len(), 2);
    }

    #[test]
    fn test_content_disposition() {
        let cd = ContentDisposition::attachment("a.txt");
        assert_eq!(cd.to_string(), "attachment; filename=\"a.txt\"");
        assert!(!cd.is_inline());

        let cd = ContentDisposition::parse("INLINE; filename=\"x \\\"y\\\".png\"").unwrap();
        assert!(cd.is_inline());
        assert_eq!(cd.filename(), Some("x \"y\".png"));
        assert_eq!(cd.to_string(), "inline; filename=\"x \\\"y\\\".png\"");
    }
}
