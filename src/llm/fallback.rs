//! Deterministic fallback response.
//!
//! When validation fails, configuration is missing, or every retry attempt
//! is used up, [`FallbackSynthesizer`] produces a response in the `general`
//! category's section shape instead of an error.  Downstream sanitization
//! and rendering therefore never special-case failure.

use crate::llm::prompt::template;
use crate::response::sections::classification_line;
use crate::solve::Category;
use crate::types::{GenerationResult, InputKind};

/// Marker every fallback response carries in its summary line.
pub const FALLBACK_MARKER: &str = "Fallback response";

// ---------------------------------------------------------------------------
// FallbackSynthesizer
// ---------------------------------------------------------------------------

/// Builds template-shaped error responses.
///
/// # Example
/// ```rust
/// use interview_coach::llm::FallbackSynthesizer;
/// use interview_coach::types::InputKind;
///
/// let text = FallbackSynthesizer::new().render(InputKind::Text, "timed out", 0);
/// assert!(text.starts_with("## Classification: general"));
/// assert!(text.contains("Fallback response"));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackSynthesizer;

impl FallbackSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Fallback for `kind` failing with `message`, stamped now.
    pub fn synthesize(&self, kind: InputKind, message: &str) -> GenerationResult {
        log::warn!("fallback: {kind} input failed: {message}");
        let timestamp = chrono::Utc::now().timestamp_millis();
        GenerationResult {
            text: self.render(kind, message, timestamp),
            timestamp,
        }
    }

    /// Render the fallback text for a fixed `timestamp` (epoch millis).
    pub fn render(&self, kind: InputKind, message: &str, timestamp: i64) -> String {
        let sections = template(Category::General).sections;
        let message = one_line(message);
        let when = chrono::DateTime::from_timestamp_millis(timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| timestamp.to_string());

        let bodies = [
            format!("**{FALLBACK_MARKER}:** the {kind} input could not be processed."),
            format!("- Error: {message}\n- Generated at: {when}"),
            format!(
                "- Check the captured {kind} and try again.\n\
                 - If this keeps happening, verify the API key and network connection."
            ),
        ];

        let mut out = classification_line(Category::General.label());
        for (title, body) in sections.iter().zip(bodies.iter()) {
            out.push_str(&format!("\n\n## {title}\n{body}"));
        }
        out
    }
}

fn one_line(message: &str) -> String {
    let joined = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        "unknown error".to_string()
    } else {
        joined
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
