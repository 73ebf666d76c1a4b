use std::ops::Deref;
use std::ops::Range;

use serde::Deserialize;

use crate::MergeConflictLocation;
use crate::SourceInfo;
use crate::ValidationError;

/// A value together with where it was written.
///
/// Like `toml::Spanned<T>`, but also remembers which file the span refers
/// to, so a diagnostic can show the offending line after several files have
/// been merged together.
#[derive(Debug, Clone)]
pub struct Located<T> {
    value: T,
    span: Range<usize>,
    source: SourceInfo,
}

impl<T> Located<T> {
    pub fn new(value: T, span: Range<usize>, source: SourceInfo) -> Self {
        Self {
            value,
            span,
            source,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    /// Byte span in the source file
    pub fn span(&self) -> &Range<usize> {
        &self.span
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    pub fn map<U, F>(self, f: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: f(self.value),
            span: self.span,
            source: self.source,
        }
    }

    /// Attach the file the value was read from (spans are known before the file is)
    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = source;
        self
    }

    pub fn set_source(&mut self, source: &SourceInfo) {
        self.source = source.clone();
    }

    pub fn to_conflict_location(&self) -> MergeConflictLocation {
        MergeConflictLocation {
            file_path: self.source.file_path.clone(),
            span: self.span.clone(),
            content: self.source.content.clone(),
        }
    }

    /// A validation error pointing at this value
    pub fn error(&self, field_path: impl Into<String>, message: impl Into<String>) -> ValidationError {
        ValidationError::at(field_path, message, self.span.clone(), &self.source)
    }
}

impl<T> Deref for Located<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// Deserializes through `toml::Spanned<T>`.
///
/// Only the span is known at this point; the source is filled in by the
/// loader once the whole file has been parsed.
impl<'de, T> Deserialize<'de> for Located<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let spanned = toml::Spanned::<T>::deserialize(deserializer)?;
        let span = spanned.span();

        Ok(Located {
            value: spanned.into_inner(),
            span,
            source: SourceInfo {
                file_path: std::path::PathBuf::from("<unknown>"),
                content: String::new(),
            },
        })
    }
}

impl<T: PartialEq> PartialEq for Located<T> {
    fn eq(&self, other: &Self) -> bool {
        // Location is not part of a value's identity
        self.value == other.value
    }
}

impl<T: Eq> Eq for Located<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Pins {
        rx_pin: Located<u8>,
    }

    #[test]
    fn test_span_points_at_value() {
        let content = "rx_pin = 22\n";
        let pins: Pins = toml::from_str(content).unwrap();

        assert_eq!(*pins.rx_pin, 22);
        assert_eq!(&content[pins.rx_pin.span().clone()], "22");
    }

    #[test]
    fn test_equality_ignores_location() {
        let source = SourceInfo {
            file_path: "a.toml".into(),
            content: String::new(),
        };
        let a = Located::new(22u8, 0..2, source.clone());
        let b = Located::new(22u8, 10..12, source);
        assert_eq!(a, b);
    }

    #[test]
    fn test_error_carries_source() {
        let source = SourceInfo {
            file_path: "opnpool.toml".into(),
            content: "rx_pin = 99\n".to_string(),
        };
        let pin = Located::new(99u8, 9..11, SourceInfo {
            file_path: "<unknown>".into(),
            content: String::new(),
        })
        .with_source(source);

        let error = pin.error("rs485.rx_pin", "out of range");
        assert_eq!(error.span, Some(9..11));
        assert_eq!(
            error.source.map(|s| s.file_path),
            Some(std::path::PathBuf::from("opnpool.toml"))
        );
    }
}
