//! Parser limits.

/// Most messages never nest more than three multipart levels.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Most messages never carry more than a dozen parts per level.
pub const DEFAULT_MAX_PARTS_PER_LEVEL: usize = 50;

/// Largest header block accepted for one entity.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 10 * 1024 * 1024;

/// Guards applied while parsing untrusted multipart input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "derive", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "derive", serde(default, rename_all = "kebab-case"))]
pub struct Limits {
    /// Deepest multipart container allowed; the outermost container is depth 0.
    pub max_depth: usize,
    /// Maximum sibling parts within one container.
    pub max_parts_per_level: usize,
    /// Maximum size of one entity's header block.
    pub max_header_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_parts_per_level: DEFAULT_MAX_PARTS_PER_LEVEL,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl Limits {
    /// Creates a limits builder starting from the defaults.
    #[must_use]
    pub fn builder() -> LimitsBuilder {
        LimitsBuilder::new()
    }
}

/// Builder for parser limits.
#[derive(Debug, Clone, Default)]
pub struct LimitsBuilder {
    limits: Limits,
}

impl LimitsBuilder {
    /// Creates a new builder with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth.
    #[must_use]
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.limits.max_depth = depth;
        self
    }

    /// Sets the maximum number of parts per container.
    #[must_use]
    pub const fn max_parts_per_level(mut self, parts: usize) -> Self {
        self.limits.max_parts_per_level = parts;
        self
    }

    /// Sets the maximum header block size.
    #[must_use]
    pub const fn max_header_bytes(mut self, bytes: usize) -> Self {
        self.limits.max_header_bytes = bytes;
        self
    }

    /// Builds the limits.
    #[must_use]
    pub const fn build(self) -> Limits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = Limits::default();
        assert_eq!(limits.max_depth, 10);
        assert_eq!(limits.max_parts_per_level, 50);
        assert_eq!(limits.max_header_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_builder() {
        let limits = Limits::builder()
            .max_depth(2)
            .max_parts_per_level(5)
            .max_header_bytes(1024)
            .build();

        assert_eq!(limits.max_depth, 2);
        assert_eq!(limits.max_parts_per_level, 5);
        assert_eq!(limits.max_header_bytes, 1024);
    }

    #[cfg(feature = "derive")]
    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_deserialize_partial() {
        let limits: Limits = serde_json::from_str(r#"{"max-depth": 3}"#).unwrap();
        assert_eq!(limits.max_depth, 3);
        assert_eq!(limits.max_parts_per_level, DEFAULT_MAX_PARTS_PER_LEVEL);
    }
}
