//! Combined classify-and-respond call.
//!
//! One round trip returns both the label line and a first-draft answer.
//! The label is recovered from the first line starting with
//! [`LABEL_MARKER`]; anything unparseable becomes [`Category::General`].

use tokio_util::sync::CancellationToken;

use super::Category;
use crate::extract::SnippetSelector;
use crate::llm::prompt::{classification_prompt, LABEL_MARKER};
use crate::llm::{GenerationOptions, LlmClient, LlmError, PromptPart};
use crate::types::InputKind;

/// Parsed classifier output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    /// Everything except the label line, trimmed.  May be empty.
    pub response: String,
}

impl Classification {
    /// Recover label and response from raw model output.
    pub fn parse(raw: &str) -> Self {
        let mut label: Option<&str> = None;
        let mut rest: Vec<&str> = Vec::new();

        for line in raw.lines() {
            if label.is_none() {
                if let Some(value) = label_value(line) {
                    label = Some(value);
                    continue;
                }
            }
            rest.push(line);
        }

        let category = match label {
            Some(value) => Category::coerce(value),
            None => {
                log::warn!("classifier: no {LABEL_MARKER} line in output, using general");
                Category::General
            }
        };

        Self {
            category,
            response: rest.join("\n").trim().to_string(),
        }
    }
}

/// Value after the marker, if `line` is a label line.  Leading markdown
/// decoration (`#`, `*`, `>`) is ignored.
fn label_value(line: &str) -> Option<&str> {
    let stripped = line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '#' | '*' | '>'));
    let head = stripped.get(..LABEL_MARKER.len())?;
    if head.eq_ignore_ascii_case(LABEL_MARKER) {
        Some(stripped[LABEL_MARKER.len()..].trim())
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    selector: SnippetSelector,
    options: GenerationOptions,
}

impl Classifier {
    pub fn new(options: GenerationOptions) -> Self {
        Self {
            selector: SnippetSelector::new(),
            options,
        }
    }

    /// Classify `content` (excerpted first if long) and fetch a draft
    /// answer in the same call.
    pub async fn classify(
        &self,
        client: &dyn LlmClient,
        content: &str,
        kind: InputKind,
        cancel: &CancellationToken,
    ) -> Result<Classification, LlmError> {
        let snippet = self.selector.select(content);
        let prompt = classification_prompt(&snippet, kind);
        let raw = client
            .generate(&[PromptPart::text(prompt)], &self.options, cancel)
            .await?;

        let classification = Classification::parse(&raw);
        log::info!("classifier: {kind} input classified as {}", classification.category);
        Ok(classification)
    }
}
