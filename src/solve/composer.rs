//! One-round-trip path for screenshot batches.
//!
//! All images of a batch go into a single prompt that asks the model to
//! read, classify and answer at once.  The answer is then repaired
//! structurally without calling the model again:
//!
//! 1. anything before the classification header is dropped;
//! 2. a missing header is synthesized with the `unknown` value, any other
//!    out-of-set value is coerced into [`Category::COMBINED`];
//! 3. code in a recognised language without an entry point gets a note;
//! 4. missing `Time Complexity` / `Space Complexity` lines get a note.
//!
//! Notes carry fixed prefixes so repeated validation never duplicates them.

use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::Category;
use crate::capture::FileReader;
use crate::extract::ExtractError;
use crate::llm::prompt::multi_image_prompt;
use crate::llm::{GenerationOptions, LlmClient, LlmError, PromptPart};
use crate::response::sections::{
    self, classification_line, code_blocks, Section, UNKNOWN_CLASSIFICATION,
};
use crate::types::{InputKind, ProcessingError, QueueItem};

pub const ENTRY_POINT_NOTE: &str = "> Note: No entry point";
pub const COMPLEXITY_NOTE: &str = "> Note: Complexity analysis incomplete";

const COMPLEXITY_LINES: [&str; 2] = ["Time Complexity", "Space Complexity"];

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("none of the screenshots in the batch could be read")]
    NoImages,
}

// ---------------------------------------------------------------------------
// Image preparation
// ---------------------------------------------------------------------------

/// Binary prompt parts for the images that could be read, plus one
/// [`ProcessingError`] per image that could not.
#[derive(Debug, Default)]
pub struct PreparedImages {
    pub parts: Vec<PromptPart>,
    pub errors: Vec<ProcessingError>,
}

impl PreparedImages {
    pub fn require_any(&self) -> Result<(), ComposeError> {
        if self.parts.is_empty() {
            Err(ComposeError::NoImages)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// MultiImageComposer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MultiImageComposer {
    options: GenerationOptions,
}

impl MultiImageComposer {
    pub fn new(options: GenerationOptions) -> Self {
        Self { options }
    }

    /// Read every screenshot concurrently.  A failed read drops that image
    /// only; order of surviving images follows `items`.
    pub async fn prepare(&self, reader: &dyn FileReader, items: &[QueueItem]) -> PreparedImages {
        let reads = items
            .iter()
            .filter(|item| item.kind == InputKind::Screenshot)
            .map(|item| async move {
                let outcome = match reader.read_binary(&item.locator).await {
                    Ok(data) if data.is_empty() => {
                        Err(ExtractError::EmptyPayload(InputKind::Screenshot))
                    }
                    Ok(data) => Ok(PromptPart::binary(item.mime_type(), data)),
                    Err(e) => Err(ExtractError::from(e)),
                };
                (item, outcome)
            });

        let mut prepared = PreparedImages::default();
        for (item, outcome) in join_all(reads).await {
            match outcome {
                Ok(part) => prepared.parts.push(part),
                Err(e) => {
                    log::warn!("composer: dropping {}: {e}", item.locator);
                    prepared.errors.push(e.into_processing_error(&item.locator));
                }
            }
        }
        prepared
    }

    /// Single model call over `images` (with optional audio/text `context`),
    /// followed by [`post_validate`].
    pub async fn generate(
        &self,
        client: &dyn LlmClient,
        images: &[PromptPart],
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let mut parts = Vec::with_capacity(images.len() + 1);
        parts.push(PromptPart::text(multi_image_prompt(images.len(), context)));
        parts.extend(images.iter().cloned());

        let raw = client.generate(&parts, &self.options, cancel).await?;
        if raw.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        log::debug!("composer: {} image(s) answered in one call", images.len());
        Ok(post_validate(&raw))
    }
}

// ---------------------------------------------------------------------------
// Post-validation
// ---------------------------------------------------------------------------

/// Structural repair of a combined-path answer.  Idempotent.
pub fn post_validate(raw: &str) -> String {
    let mut text = normalize_header(raw);

    if let Some(language) = detect_language(&text) {
        let code: String = code_blocks(&text).into_iter().map(|b| b.code).collect();
        if !code.is_empty() && !has_entry_point(language, &code) && !text.contains(ENTRY_POINT_NOTE) {
            log::debug!("composer: no {language} entry point found");
            text = append_note(
                &text,
                &format!(
                    "{ENTRY_POINT_NOTE} (main function) was found in the {language} code. \
                     Add one before running it."
                ),
            );
        }
    }

    let lower = text.to_lowercase();
    let missing: Vec<&str> = COMPLEXITY_LINES
        .iter()
        .copied()
        .filter(|line| !lower.contains(&line.to_lowercase()))
        .collect();
    if !missing.is_empty() && !text.contains(COMPLEXITY_NOTE) {
        text = append_note(
            &text,
            &format!("{COMPLEXITY_NOTE} (missing: {}).", missing.join(", ")),
        );
    }
    text
}

fn normalize_header(raw: &str) -> String {
    let mut parsed = sections::parse(raw);

    match parsed.iter().position(Section::is_classification) {
        Some(idx) => {
            if idx > 0 {
                log::debug!("composer: discarding {idx} section(s) before classification");
            }
            parsed.drain(..idx);
            let value = parsed[0].classification().unwrap_or_default();
            let label = if value.eq_ignore_ascii_case(UNKNOWN_CLASSIFICATION) {
                UNKNOWN_CLASSIFICATION
            } else {
                Category::coerce_within(value, &Category::COMBINED).label()
            };
            parsed[0].header = Some(classification_line(label));
        }
        None => {
            log::warn!("composer: no classification header, synthesizing one");
            parsed.insert(
                0,
                Section {
                    header: Some(classification_line(UNKNOWN_CLASSIFICATION)),
                    body: String::new(),
                },
            );
        }
    }
    sections::render(&parsed).trim_end().to_string()
}

fn append_note(text: &str, note: &str) -> String {
    format!("{}\n\n{note}", text.trim_end())
}

// ---------------------------------------------------------------------------
// Language / entry-point heuristics
// ---------------------------------------------------------------------------

/// Canonical language name from the first tagged code fence, else from a
/// `Language:` line.
fn detect_language(text: &str) -> Option<&'static str> {
    let from_fence = code_blocks(text)
        .into_iter()
        .find_map(|b| canonical_language(&b.info));
    from_fence.or_else(|| {
        text.lines().find_map(|line| {
            let t = line.trim().trim_start_matches(['*', '-', '#', ' ']);
            let head = t.get(..9)?;
            if !head.eq_ignore_ascii_case("language:") {
                return None;
            }
            canonical_language(t[9..].trim_matches(|c: char| c == '*' || c.is_whitespace()))
        })
    })
}

fn canonical_language(name: &str) -> Option<&'static str> {
    let name = name.split_whitespace().next()?.to_ascii_lowercase();
    let canonical = match name.as_str() {
        "python" | "python3" | "py" => "python",
        "java" => "java",
        "c" => "c",
        "cpp" | "c++" | "cc" | "cxx" => "cpp",
        "csharp" | "c#" | "cs" => "csharp",
        "go" | "golang" => "go",
        "rust" | "rs" => "rust",
        "kotlin" | "kt" => "kotlin",
        "javascript" | "js" => "javascript",
        "typescript" | "ts" => "typescript",
        _ => return None,
    };
    Some(canonical)
}

/// Entry-point signatures per language.  Scripts without a conventional
/// entry point (JavaScript, TypeScript) always pass.
fn has_entry_point(language: &str, code: &str) -> bool {
    let signatures: &[&str] = match language {
        "python" => &["def main(", "if __name__"],
        "java" => &["public static void main"],
        "c" | "cpp" => &["int main("],
        "csharp" => &["static void Main", "static int Main", "static async Task Main"],
        "go" => &["func main("],
        "rust" => &["fn main("],
        "kotlin" => &["fun main("],
        _ => return true,
    };
    signatures.iter().any(|sig| code.contains(sig))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
