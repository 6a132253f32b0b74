//! Core `LlmClient` trait and the `GeminiClient` implementation.
//!
//! `GeminiClient` calls a `generateContent` endpoint with mixed text and
//! inline binary parts.  All connection details come from [`LlmConfig`] and
//! the [`ConfigStore`]; nothing is hardcoded.
//!
//! [`SharedClient`] is the process-wide handle: it builds the client once,
//! on first use, and hands out cheap `Arc` clones afterwards.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigStore, LlmConfig};

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur during a model call.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status.
    #[error("LLM endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The call did not complete within the per-attempt deadline.
    #[error("LLM request timed out")]
    Timeout,

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// The model returned no usable text.
    #[error("LLM returned an empty response")]
    EmptyResponse,

    /// The owning run was cancelled while the call was in flight.
    #[error("LLM request cancelled")]
    Cancelled,

    /// No API key is configured; nothing can be called.
    #[error("no API key configured")]
    MissingApiKey,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt parts & options
// ---------------------------------------------------------------------------

/// One element of a multimodal prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Binary { mime_type: String, data: Vec<u8> },
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        PromptPart::Text(text.into())
    }

    pub fn binary(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        PromptPart::Binary {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, PromptPart::Binary { .. })
    }
}

/// Sampling options passed with every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
}

impl GenerationOptions {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

// ---------------------------------------------------------------------------
// LlmClient trait
// ---------------------------------------------------------------------------

/// Async, object-safe interface to the generation endpoint.
///
/// Implementors must observe `cancel`: once it fires, the call should stop
/// and return [`LlmError::Cancelled`].  Implementations hold no per-request
/// mutable state, so one instance may serve concurrent calls.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        parts: &[PromptPart],
        options: &GenerationOptions,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<WireContent>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text { text: String },
    InlineData { inline_data: WireInlineData },
}

#[derive(Debug, Serialize)]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateResponse {
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireCandidate {
    content: Option<WireResponseContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireResponseContent {
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireResponsePart {
    text: Option<String>,
}

fn build_request(parts: &[PromptPart], options: &GenerationOptions) -> GenerateRequest {
    let engine = base64::engine::general_purpose::STANDARD;
    let wire_parts = parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => WirePart::Text { text: text.clone() },
            PromptPart::Binary { mime_type, data } => WirePart::InlineData {
                inline_data: WireInlineData {
                    mime_type: mime_type.clone(),
                    data: engine.encode(data),
                },
            },
        })
        .collect();

    GenerateRequest {
        contents: vec![WireContent {
            role: "user",
            parts: wire_parts,
        }],
        generation_config: WireGenerationConfig {
            max_output_tokens: options.max_output_tokens,
            temperature: options.temperature,
            top_k: options.top_k,
            top_p: options.top_p,
        },
    }
}

/// Join the text parts of the first candidate.
fn response_text(response: GenerateResponse) -> Result<String, LlmError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text.to_string())
}

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

/// Calls `{base_url}/models/{model}:generateContent`.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Build a client for `model` authenticated with `api_key`.
    ///
    /// Only a connect timeout is set here; the per-call deadline is owned by
    /// the retry policy.
    pub fn new(config: &LlmConfig, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn send(
        &self,
        parts: &[PromptPart],
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = build_request(parts, options);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        response_text(parsed)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        parts: &[PromptPart],
        options: &GenerationOptions,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        log::debug!(
            "llm: generateContent model={} parts={} binary={}",
            self.model,
            parts.len(),
            parts.iter().filter(|p| p.is_binary()).count()
        );

        tokio::select! {
            result = self.send(parts, options) => result,
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
        }
    }
}

// ---------------------------------------------------------------------------
// SharedClient
// ---------------------------------------------------------------------------

/// Builds an [`LlmClient`] from `(api_key, model)`.
pub type ClientFactory = dyn Fn(&str, &str) -> Arc<dyn LlmClient> + Send + Sync;

/// Lazily-constructed, process-wide client handle.
///
/// The API key is checked on every [`get`](Self::get); the client itself is
/// built on the first successful check and reused from then on.
pub struct SharedClient {
    config: Arc<dyn ConfigStore>,
    factory: Box<ClientFactory>,
    cell: OnceLock<Arc<dyn LlmClient>>,
}

impl SharedClient {
    pub fn new(
        config: Arc<dyn ConfigStore>,
        factory: impl Fn(&str, &str) -> Arc<dyn LlmClient> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            factory: Box::new(factory),
            cell: OnceLock::new(),
        }
    }

    /// A handle that builds a [`GeminiClient`] from `llm`.
    pub fn gemini(config: Arc<dyn ConfigStore>, llm: LlmConfig) -> Self {
        Self::new(config, move |api_key, model| {
            Arc::new(GeminiClient::new(&llm, api_key, model)) as Arc<dyn LlmClient>
        })
    }

    /// Return the shared client, building it on first use.
    pub fn get(&self) -> Result<Arc<dyn LlmClient>, LlmError> {
        let api_key = self.config.api_key().ok_or(LlmError::MissingApiKey)?;

        let client = self.cell.get_or_init(|| {
            let model = self.config.model_name();
            log::info!("llm: building client for model {model}");
            (self.factory)(&api_key, &model)
        });
        Ok(Arc::clone(client))
    }
}

// ---------------------------------------------------------------------------
// ScriptedLlm (test double)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use scripted::ScriptedLlm;

#[cfg(test)]
mod scripted {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays a fixed list of responses, one per call; once the script is
    /// exhausted the last entry repeats.  Records every prompt it receives.
    pub struct ScriptedLlm {
        script: Mutex<VecDeque<Result<String, LlmError>>>,
        last: Mutex<Option<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<Vec<PromptPart>>>,
    }

    impl ScriptedLlm {
        pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn always(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn failing(err: LlmError) -> Self {
            Self::new(vec![Err(err)])
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        /// Concatenated text parts of call `index`.
        pub fn prompt_text(&self, index: usize) -> String {
            self.prompts.lock().unwrap()[index]
                .iter()
                .filter_map(|p| match p {
                    PromptPart::Text(t) => Some(t.as_str()),
                    PromptPart::Binary { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(
            &self,
            parts: &[PromptPart],
            _options: &GenerationOptions,
            cancel: &CancellationToken,
        ) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(parts.to_vec());
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            match next {
                Some(entry) => {
                    *last = Some(entry.clone());
                    entry
                }
                None => last.clone().unwrap_or(Err(LlmError::EmptyResponse)),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
