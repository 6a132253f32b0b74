//! Category-specific generation over the full content.

use tokio_util::sync::CancellationToken;

use super::Category;
use crate::llm::prompt::generation_prompt;
use crate::llm::{GenerationOptions, LlmClient, LlmError, PromptPart};
use crate::response::sections::{classification_line, is_classification_header};

#[derive(Debug, Clone, Default)]
pub struct ResponseGenerator {
    options: GenerationOptions,
}

impl ResponseGenerator {
    pub fn new(options: GenerationOptions) -> Self {
        Self { options }
    }

    /// One call with the category template and the original content.
    /// Blank output is an [`LlmError::EmptyResponse`].
    pub async fn generate(
        &self,
        client: &dyn LlmClient,
        category: Category,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let prompt = generation_prompt(category, content);
        let text = client
            .generate(&[PromptPart::text(prompt)], &self.options, cancel)
            .await?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    /// Final response text: the canonical classification line followed by
    /// `body` with any classification lines the model added removed.
    pub fn finish(category: Category, body: &str) -> String {
        let body = body
            .lines()
            .filter(|line| !is_classification_header(line))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{}\n\n{}",
            classification_line(category.label()),
            body.trim()
        )
    }
}
