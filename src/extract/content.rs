//! Per-item text extraction.
//!
//! Text items are passed through after validation.  Audio and screenshot
//! items are sent to the model once, with a fixed transcribe/extract
//! instruction, under the per-attempt deadline.  Nothing here retries; the
//! caller decides what a failure means for the batch.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureError, FileReader};
use crate::config::AppConfig;
use crate::llm::prompt::extraction_instruction;
use crate::llm::{with_deadline, GenerationOptions, LlmClient, LlmError, PromptPart};
use crate::types::{ExtractedContent, InputKind, ProcessingError, QueueItem, Stage};

// ---------------------------------------------------------------------------
// ExtractError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("text input is empty")]
    EmptyText,

    #[error("text input is {len} characters, limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("{0} payload is empty")]
    EmptyPayload(InputKind),

    #[error(transparent)]
    Read(#[from] CaptureError),

    #[error("no text could be extracted from the {0} input")]
    NothingExtracted(InputKind),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl ExtractError {
    /// Stage recorded in the item's [`ProcessingError`].
    pub fn stage(&self) -> Stage {
        match self {
            ExtractError::EmptyText
            | ExtractError::TextTooLong { .. }
            | ExtractError::EmptyPayload(_) => Stage::Validate,
            ExtractError::Read(_) => Stage::Read,
            ExtractError::NothingExtracted(_) | ExtractError::Llm(_) => Stage::Extract,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractError::Llm(LlmError::Cancelled))
    }

    pub fn into_processing_error(self, locator: &str) -> ProcessingError {
        ProcessingError {
            item_locator: locator.to_string(),
            stage: self.stage(),
            message: self.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentExtractor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ContentExtractor {
    max_text_chars: usize,
    options: GenerationOptions,
    attempt_timeout: Duration,
}

impl ContentExtractor {
    pub fn new(max_text_chars: usize, options: GenerationOptions, attempt_timeout: Duration) -> Self {
        Self {
            max_text_chars,
            options,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.extraction.max_text_chars,
            GenerationOptions::from_config(&config.llm),
            Duration::from_secs(config.retry.attempt_timeout_secs),
        )
    }

    /// Accept `raw` unchanged, or reject it as empty or oversized.
    pub fn validate_text(&self, raw: &str) -> Result<String, ExtractError> {
        if raw.trim().is_empty() {
            return Err(ExtractError::EmptyText);
        }
        let len = raw.chars().count();
        if len > self.max_text_chars {
            return Err(ExtractError::TextTooLong {
                len,
                max: self.max_text_chars,
            });
        }
        Ok(raw.to_string())
    }

    /// One model call turning an audio/image payload into text.
    pub async fn extract_binary(
        &self,
        client: &dyn LlmClient,
        kind: InputKind,
        data: Vec<u8>,
        mime_type: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExtractError> {
        if data.is_empty() {
            return Err(ExtractError::EmptyPayload(kind));
        }

        let parts = [
            PromptPart::text(extraction_instruction(kind)),
            PromptPart::binary(mime_type, data),
        ];
        let parts = &parts;
        let options = &self.options;

        let text = with_deadline(cancel, self.attempt_timeout, |token| async move {
            client.generate(parts, options, &token).await
        })
        .await?;

        if text.trim().is_empty() {
            return Err(ExtractError::NothingExtracted(kind));
        }
        log::debug!("extract: {} chars from {kind} input", text.len());
        Ok(text)
    }

    /// Resolve `item` through `reader` and extract its text.
    pub async fn extract(
        &self,
        item: &QueueItem,
        reader: &dyn FileReader,
        client: &dyn LlmClient,
        cancel: &CancellationToken,
    ) -> Result<ExtractedContent, ExtractError> {
        let text = match item.kind {
            InputKind::Text => {
                let raw = reader.read_text(&item.locator).await?;
                self.validate_text(&raw)?
            }
            InputKind::Audio | InputKind::Screenshot => {
                let data = reader.read_binary(&item.locator).await?;
                self.extract_binary(client, item.kind, data, item.mime_type(), cancel)
                    .await?
            }
        };
        Ok(ExtractedContent {
            source_kind: item.kind,
            text,
        })
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MemoryReader;
    use crate::llm::ScriptedLlm;
    use async_trait::async_trait;

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(50, GenerationOptions::default(), Duration::from_millis(50))
    }

    #[test]
    fn valid_text_is_returned_unchanged() {
        let e = extractor();
        for input in ["two sum", "  padded\n", "line one\n\nline two"] {
            assert_eq!(e.validate_text(input).unwrap(), input);
        }
    }

    #[test]
    fn empty_and_oversized_text_are_validation_failures() {
        let e = extractor();
        let err = e.validate_text(" \n\t").unwrap_err();
        assert!(matches!(err, ExtractError::EmptyText));
        assert_eq!(err.stage(), Stage::Validate);

        let err = e.validate_text(&"x".repeat(51)).unwrap_err();
        assert!(matches!(err, ExtractError::TextTooLong { len: 51, max: 50 }));
        assert_eq!(e.validate_text(&"x".repeat(50)).unwrap().len(), 50);
    }

    #[tokio::test]
    async fn audio_is_transcribed_with_payload_attached() {
        let llm = ScriptedLlm::always("reverse a linked list");
        let reader = MemoryReader::new().with("clip.mp3", vec![1u8, 2, 3]);

        let content = extractor()
            .extract(
                &QueueItem::audio("clip.mp3"),
                &reader,
                &llm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(content.source_kind, InputKind::Audio);
        assert_eq!(content.text, "reverse a linked list");

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(
            prompts[0][1],
            PromptPart::binary("audio/mp3", vec![1u8, 2, 3])
        );
        assert!(llm_text(&prompts[0]).contains("Transcribe"));
    }

    fn llm_text(parts: &[PromptPart]) -> String {
        parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text(t) => Some(t.clone()),
                PromptPart::Binary { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn blank_model_output_is_an_extraction_failure() {
        let llm = ScriptedLlm::always("  \n");
        let err = extractor()
            .extract_binary(
                &llm,
                InputKind::Screenshot,
                vec![0u8],
                "image/png",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NothingExtracted(InputKind::Screenshot)));
        assert_eq!(err.stage(), Stage::Extract);
    }

    #[tokio::test]
    async fn empty_payload_makes_no_call() {
        let llm = ScriptedLlm::always("unused");
        let err = extractor()
            .extract_binary(
                &llm,
                InputKind::Audio,
                Vec::new(),
                "audio/wav",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::EmptyPayload(InputKind::Audio)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn unreadable_item_reports_read_stage() {
        let llm = ScriptedLlm::always("unused");
        let err = extractor()
            .extract(
                &QueueItem::text("gone.txt"),
                &MemoryReader::new(),
                &llm,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        let pe = err.into_processing_error("gone.txt");
        assert_eq!(pe.stage, Stage::Read);
        assert_eq!(pe.item_locator, "gone.txt");
    }

    struct Stalled;

    #[async_trait]
    impl LlmClient for Stalled {
        async fn generate(
            &self,
            _parts: &[PromptPart],
            _options: &GenerationOptions,
            _cancel: &CancellationToken,
        ) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    #[tokio::test]
    async fn stalled_extraction_times_out() {
        let err = extractor()
            .extract_binary(
                &Stalled,
                InputKind::Audio,
                vec![1u8],
                "audio/wav",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Llm(LlmError::Timeout)));
    }
}
