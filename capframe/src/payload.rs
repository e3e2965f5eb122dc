//! Job payloads: caption text plus the asset it is laid over.
//!
//! Payloads are validated once at construction so every job that reaches
//! the scheduler carries clean input.

use std::fmt;
use thiserror::Error;

/// Longest caption accepted, in characters.
pub const MAX_TEXT_CHARS: usize = 5000;

/// Reasons a payload is refused before submission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// Nothing left after stripping control characters and whitespace.
    #[error("caption text is empty")]
    EmptyText,

    /// Caption longer than [`MAX_TEXT_CHARS`].
    #[error("caption text has {len} characters, the limit is {max}")]
    TextTooLong { len: usize, max: usize },

    /// Asset selector empty after sanitizing.
    #[error("asset selector is empty")]
    EmptyAsset,
}

/// Name of the video asset a caption is combined with.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct AssetSelector(String);

impl AssetSelector {
    /// Builds a selector, keeping only `[A-Za-z0-9_- ]`.
    pub fn new(name: &str) -> Result<Self, PayloadError> {
        let cleaned = sanitize_asset(name);
        if cleaned.trim().is_empty() {
            return Err(PayloadError::EmptyAsset);
        }
        Ok(Self(cleaned))
    }

    /// Wraps a name taken from an asset catalog as-is.
    ///
    /// Catalog names identify existing assets; only user input is
    /// sanitized.
    pub(crate) fn from_catalog(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Returns the asset name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated input for one render + encode job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderPayload {
    text: String,
    asset: AssetSelector,
}

impl RenderPayload {
    /// Validates caption text and asset name.
    pub fn new(text: &str, asset: &str) -> Result<Self, PayloadError> {
        Self::with_asset(text, AssetSelector::new(asset)?)
    }

    /// Validates caption text for an already resolved asset.
    pub fn with_asset(text: &str, asset: AssetSelector) -> Result<Self, PayloadError> {
        let text = sanitize_text(text);
        if text.is_empty() {
            return Err(PayloadError::EmptyText);
        }
        let len = text.chars().count();
        if len > MAX_TEXT_CHARS {
            return Err(PayloadError::TextTooLong {
                len,
                max: MAX_TEXT_CHARS,
            });
        }
        Ok(Self { text, asset })
    }

    /// Returns the caption text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the asset selector.
    pub fn asset(&self) -> &AssetSelector {
        &self.asset
    }
}

/// Strips C0/C1 control characters and surrounding whitespace.
pub fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(*c as u32, 0x00..=0x1F | 0x7F..=0x9F))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Keeps only characters valid in an asset name.
pub fn sanitize_asset(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_control_characters_removed() {
        assert_eq!(sanitize_text("  hi\u{0007}\nthere\u{0085} "), "hithere");
    }

    #[test]
    fn test_asset_sanitized() {
        assert_eq!(sanitize_asset("dance/../party!"), "danceparty");
        assert_eq!(sanitize_asset("happy jerma_2-b"), "happy jerma_2-b");
    }

    #[test]
    fn test_empty_text_rejected() {
        assert_eq!(
            RenderPayload::new(" \u{0001} ", "dance"),
            Err(PayloadError::EmptyText)
        );
    }

    #[test]
    fn test_long_text_rejected() {
        let text = "a".repeat(MAX_TEXT_CHARS + 1);
        assert_eq!(
            RenderPayload::new(&text, "dance"),
            Err(PayloadError::TextTooLong {
                len: MAX_TEXT_CHARS + 1,
                max: MAX_TEXT_CHARS
            })
        );
        let text = "a".repeat(MAX_TEXT_CHARS);
        assert!(RenderPayload::new(&text, "dance").is_ok());
    }

    #[test]
    fn test_empty_asset_rejected() {
        assert_eq!(AssetSelector::new("!!!"), Err(PayloadError::EmptyAsset));
    }

    #[test]
    fn test_payload_accessors() {
        let payload = RenderPayload::new("when the", "sus").unwrap();
        assert_eq!(payload.text(), "when the");
        assert_eq!(payload.asset().as_str(), "sus");
    }
}
