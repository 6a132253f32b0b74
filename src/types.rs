//! Data model shared by every pipeline stage.
//!
//! A [`QueueItem`] is produced by a capture collaborator and consumed exactly
//! once.  Each item yields either an [`ExtractedContent`] or a
//! [`ProcessingError`], never both.  A queue-mode run ends in one
//! [`ProblemInfo`].

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// InputKind
// ---------------------------------------------------------------------------

/// What a queued item holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Screenshot,
    Audio,
    Text,
}

impl InputKind {
    /// Lowercase name used in prompts and fallback text.
    pub fn label(&self) -> &'static str {
        match self {
            InputKind::Screenshot => "screenshot",
            InputKind::Audio => "audio",
            InputKind::Text => "text",
        }
    }

    /// Guess the kind from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" => Some(InputKind::Screenshot),
            "wav" | "mp3" | "m4a" | "ogg" | "webm" | "flac" | "aac" => Some(InputKind::Audio),
            "txt" | "md" | "text" => Some(InputKind::Text),
            _ => None,
        }
    }
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// QueueItem
// ---------------------------------------------------------------------------

/// One captured input.  `locator` is opaque to the pipeline; only the
/// [`FileReader`](crate::capture::FileReader) knows how to resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub kind: InputKind,
    pub locator: String,
}

impl QueueItem {
    pub fn new(kind: InputKind, locator: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
        }
    }

    pub fn screenshot(locator: impl Into<String>) -> Self {
        Self::new(InputKind::Screenshot, locator)
    }

    pub fn audio(locator: impl Into<String>) -> Self {
        Self::new(InputKind::Audio, locator)
    }

    pub fn text(locator: impl Into<String>) -> Self {
        Self::new(InputKind::Text, locator)
    }

    /// MIME type sent alongside binary payloads, derived from the locator's
    /// extension with a per-kind default.
    pub fn mime_type(&self) -> &'static str {
        let ext = self
            .locator
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match (self.kind, ext.as_str()) {
            (InputKind::Screenshot, "jpg" | "jpeg") => "image/jpeg",
            (InputKind::Screenshot, "webp") => "image/webp",
            (InputKind::Screenshot, "gif") => "image/gif",
            (InputKind::Screenshot, _) => "image/png",
            (InputKind::Audio, "mp3") => "audio/mp3",
            (InputKind::Audio, "m4a" | "aac") => "audio/aac",
            (InputKind::Audio, "ogg") => "audio/ogg",
            (InputKind::Audio, "webm") => "audio/webm",
            (InputKind::Audio, "flac") => "audio/flac",
            (InputKind::Audio, _) => "audio/wav",
            (InputKind::Text, _) => "text/plain",
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractedContent
// ---------------------------------------------------------------------------

/// Plain text recovered from one [`QueueItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub source_kind: InputKind,
    pub text: String,
}

// ---------------------------------------------------------------------------
// GenerationResult
// ---------------------------------------------------------------------------

/// Final text of one logical processing call.  `text` is never empty; on
/// total failure it holds the fallback response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl GenerationResult {
    /// Stamp `text` with the current time.
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessingError
// ---------------------------------------------------------------------------

/// Pipeline stage at which an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Input rejected before any model call.
    Validate,
    /// The collaborator could not produce the item's bytes.
    Read,
    /// OCR / transcription produced nothing or failed.
    Extract,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Read => "read",
            Stage::Extract => "extract",
        }
    }
}

/// Per-item failure collected during batch aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub item_locator: String,
    pub stage: Stage,
    pub message: String,
}

impl std::fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.item_locator,
            self.stage.label(),
            self.message
        )
    }
}

// ---------------------------------------------------------------------------
// ProblemInfo
// ---------------------------------------------------------------------------

/// Terminal artifact of a queue-mode run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemInfo {
    /// Extracted problem text.  For screenshot batches this is the
    /// image-derived answer, preceded by any audio/text context.
    pub problem_statement: String,
    /// Distinct kinds present in the batch, in first-seen order.
    pub input_kinds: Vec<InputKind>,
    /// Present only when at least one item failed.
    pub processing_errors: Option<Vec<ProcessingError>>,
    /// Generated, sanitized response for the batch.
    pub solution: GenerationResult,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(InputKind::from_extension("PNG"), Some(InputKind::Screenshot));
        assert_eq!(InputKind::from_extension("wav"), Some(InputKind::Audio));
        assert_eq!(InputKind::from_extension("txt"), Some(InputKind::Text));
        assert_eq!(InputKind::from_extension("exe"), None);
    }

    #[test]
    fn mime_type_follows_extension_and_kind() {
        assert_eq!(QueueItem::screenshot("a/shot.JPG").mime_type(), "image/jpeg");
        assert_eq!(QueueItem::screenshot("opaque-id").mime_type(), "image/png");
        assert_eq!(QueueItem::audio("clip.mp3").mime_type(), "audio/mp3");
        assert_eq!(QueueItem::audio("clip").mime_type(), "audio/wav");
    }

    #[test]
    fn processing_error_display_names_stage() {
        let err = ProcessingError {
            item_locator: "notes.txt".into(),
            stage: Stage::Read,
            message: "not found".into(),
        };
        assert_eq!(err.to_string(), "notes.txt (read): not found");
    }

    #[test]
    fn generation_result_now_is_stamped() {
        let r = GenerationResult::now("hello");
        assert_eq!(r.text, "hello");
        assert!(r.timestamp > 0);
    }
}
