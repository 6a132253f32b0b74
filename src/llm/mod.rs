//! Model access for the coaching pipeline.
//!
//! This module provides:
//! * [`LlmClient`]: async trait implemented by all generation backends.
//! * [`GeminiClient`]: `generateContent` REST client (text + inline binary).
//! * [`SharedClient`]: lazily-built, process-wide client handle.
//! * [`RetryPolicy`] / [`call_with_policy`] / [`RetryController`]: timeout
//!   race plus bounded exponential-backoff retries.
//! * [`FallbackSynthesizer`]: template-shaped response used when nothing
//!   else worked.
//! * [`prompt`]: every prompt string and per-category template.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use interview_coach::config::AppConfig;
//! use interview_coach::llm::{GenerationOptions, PromptPart, RetryController, SharedClient};
//! use interview_coach::types::InputKind;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(AppConfig::load().unwrap());
//!     let shared = SharedClient::gemini(config.clone(), config.llm.clone());
//!     let client = shared.get().expect("API key configured");
//!
//!     let controller = RetryController::default();
//!     let options = GenerationOptions::from_config(&config.llm);
//!     let parts = vec![PromptPart::text("Explain a hash map.")];
//!
//!     let result = controller
//!         .run(InputKind::Text, Ok(()), &CancellationToken::new(), |token| {
//!             let client = client.clone();
//!             let parts = parts.clone();
//!             async move { client.generate(&parts, &options, &token).await }
//!         })
//!         .await
//!         .unwrap();
//!     println!("{}", result.text);
//! }
//! ```

pub mod client;
pub mod fallback;
pub mod prompt;
pub mod retry;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{
    GeminiClient, GenerationOptions, LlmClient, LlmError, PromptPart, SharedClient,
};
pub use fallback::{FallbackSynthesizer, FALLBACK_MARKER};
pub use retry::{call_with_policy, with_deadline, Cancelled, RetryController, RetryError, RetryPolicy};

#[cfg(test)]
pub use client::ScriptedLlm;
