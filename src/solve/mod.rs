//! Classification and answer generation.
//!
//! Two paths produce an answer:
//! * [`Solver::classify_and_generate`] for text/audio content: one combined
//!   classify-and-respond call, plus a template-driven second call for
//!   categories whose answers need a strict section layout.
//! * [`MultiImageComposer`] for screenshot batches: one call for
//!   everything, then structural repair.

pub mod category;
pub mod classifier;
pub mod composer;
pub mod generator;

pub use category::Category;
pub use classifier::{Classification, Classifier};
pub use composer::{ComposeError, MultiImageComposer, PreparedImages};
pub use generator::ResponseGenerator;

use tokio_util::sync::CancellationToken;

use crate::llm::prompt::template;
use crate::llm::{GenerationOptions, LlmClient, LlmError};
use crate::types::InputKind;

/// Classifier and generator sharing one set of sampling options.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    classifier: Classifier,
    generator: ResponseGenerator,
}

impl Solver {
    pub fn new(options: GenerationOptions) -> Self {
        Self {
            classifier: Classifier::new(options),
            generator: ResponseGenerator::new(options),
        }
    }

    /// The text-path sequence.  Every failure, including an empty answer,
    /// fails the whole sequence so the caller can retry it as a unit.
    pub async fn classify_and_generate(
        &self,
        client: &dyn LlmClient,
        content: &str,
        kind: InputKind,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let classification = self.classifier.classify(client, content, kind, cancel).await?;
        let category = classification.category;

        let body = if template(category).strict_format || classification.response.is_empty() {
            log::debug!("solve: second pass with {category} template");
            self.generator.generate(client, category, content, cancel).await?
        } else {
            classification.response
        };

        Ok(ResponseGenerator::finish(category, &body))
    }
}
