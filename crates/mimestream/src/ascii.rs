//! ASCII transliteration for header-safe filenames.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Converts a string to printable ASCII.
///
/// Letters are decomposed and lose their combining marks, full-width ASCII
/// forms are narrowed, and anything else outside printable ASCII becomes `_`.
#[must_use]
pub fn to_ascii(s: &str) -> String {
    s.nfd()
        .filter(|&c| !is_combining_mark(c))
        .map(fold)
        .collect()
}

fn fold(c: char) -> char {
    match c {
        ' '..='~' => c,
        // Full-width forms of ASCII
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(u32::from(c) - 0xFF01 + 0x21).unwrap_or('_'),
        '\u{3000}' => ' ',
        // No canonical decomposition
        'Ð' => 'D',
        'Ø' => 'O',
        'ø' => 'o',
        _ => '_',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        assert_eq!(to_ascii("report-2024 (final).pdf"), "report-2024 (final).pdf");
    }

    #[test]
    fn test_accents_are_stripped() {
        assert_eq!(to_ascii("Crème Brûlée.txt"), "Creme Brulee.txt");
        assert_eq!(to_ascii("ÅNGSTRÖM"), "ANGSTROM");
        assert_eq!(to_ascii("Čapek.pdf"), "Capek.pdf");
        assert_eq!(to_ascii("Dvořák Øresund"), "Dvorak Oresund");
    }

    #[test]
    fn test_letters_without_decomposition() {
        assert_eq!(to_ascii("Łódź"), "_odz");
    }

    #[test]
    fn test_full_width_is_narrowed() {
        assert_eq!(to_ascii("ＡＢＣ１２３"), "ABC123");
    }

    #[test]
    fn test_other_characters_become_underscores() {
        assert_eq!(to_ascii("filename-2 שלום.txt"), "filename-2 ____.txt");
        assert_eq!(to_ascii("tab\there"), "tab_here");
    }
}
