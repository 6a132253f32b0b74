//! Pipeline orchestrator: queue mode, debug mode and the simple call.
//!
//! [`PipelineOrchestrator`] owns the [`SharedState`], talks to the capture
//! collaborators through [`QueueStore`] / [`FileReader`], and reports to the
//! presentation layer through an unbounded [`PipelineEvent`] channel.
//!
//! # Queue mode
//!
//! ```text
//! list items ─▶ ProcessingStarted
//!   ├─ text / audio items ─▶ ContentExtractor (concurrent, all settle)
//!   ├─ screenshots present ─▶ MultiImageComposer (one call, context first)
//!   │     └─ no image readable ─▶ fall through to the text path
//!   └─ otherwise ─▶ Solver::classify_and_generate
//!         each generation wrapped by RetryController ─▶ ResponseSanitizer
//! ─▶ ProblemExtracted(ProblemInfo), clear main queue
//! ```
//!
//! # Debug mode
//!
//! ```text
//! last ProblemInfo + extra screenshots ─▶ DebugStarted
//!   ─▶ baseline (classify_and_generate over the problem statement)
//!   ─▶ one debug call with baseline + screenshots ─▶ DebugSuccess
//! ```
//!
//! Every run holds a [`CancellationToken`].  Starting another run cancels
//! it; a cancelled run emits nothing further and leaves state alone.

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::{FileReader, QueueKind, QueueStore};
use crate::config::AppConfig;
use crate::extract::ContentExtractor;
use crate::llm::prompt::debug_prompt;
use crate::llm::{
    Cancelled, GenerationOptions, LlmClient, PromptPart, RetryController, RetryPolicy,
    SharedClient,
};
use crate::response::ResponseSanitizer;
use crate::solve::{MultiImageComposer, Solver};
use crate::types::{
    ExtractedContent, GenerationResult, InputKind, ProblemInfo, ProcessingError, QueueItem,
};

use super::events::{PipelineCommand, PipelineEvent, ProcessRequest, RawInput};
use super::state::{new_shared_state, AppState, PipelineState, SharedState};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Why a run ended without a result.
///
/// The `Display` text is what goes into `SolutionError` / `DebugError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// No API key; nothing can be called.
    Configuration(String),
    /// The queue was empty.
    NoInput,
    /// Every item failed; carries the per-item summary.
    NoContent(String),
    /// Debug mode without a previous queue run.
    NoProblem,
    /// Debug mode without a readable extra screenshot.
    NoDebugImages,
    /// The run was cancelled; nothing was emitted after that point.
    Cancelled,
    /// Collaborator failure outside any single item.
    Internal(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            PipelineError::NoInput => write!(f, "Nothing to process: the queue is empty"),
            PipelineError::NoContent(detail) => {
                write!(f, "No content could be extracted from the inputs: {detail}")
            }
            PipelineError::NoProblem => {
                write!(f, "Nothing to debug yet: process a problem first")
            }
            PipelineError::NoDebugImages => {
                write!(f, "Debug mode needs at least one readable extra screenshot")
            }
            PipelineError::Cancelled => write!(f, "Processing was cancelled"),
            PipelineError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<Cancelled> for PipelineError {
    fn from(_: Cancelled) -> Self {
        PipelineError::Cancelled
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Sequences extraction, classification, generation and sanitization for
/// one user's queue.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use interview_coach::capture::{DirectoryQueue, FsReader};
/// use interview_coach::config::{AppConfig, AppPaths};
/// use interview_coach::llm::SharedClient;
/// use interview_coach::pipeline::{PipelineCommand, PipelineOrchestrator, ProcessRequest};
///
/// # async fn example() {
/// let config = Arc::new(AppConfig::load().unwrap());
/// let paths = AppPaths::new();
/// let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
///
/// let orchestrator = Arc::new(PipelineOrchestrator::new(
///     &config,
///     SharedClient::gemini(config.clone(), config.llm.clone()),
///     Arc::new(DirectoryQueue::new(paths.queue_dir, paths.extra_queue_dir)),
///     Arc::new(FsReader),
///     event_tx,
/// ));
///
/// let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel(8);
/// tokio::spawn(orchestrator.run(cmd_rx));
/// cmd_tx.send(PipelineCommand::Process(ProcessRequest::Buffered)).await.unwrap();
/// while let Some(event) = event_rx.recv().await {
///     println!("{event:?}");
/// }
/// # }
/// ```
pub struct PipelineOrchestrator {
    state: SharedState,
    client: SharedClient,
    queue: Arc<dyn QueueStore>,
    reader: Arc<dyn FileReader>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    extractor: ContentExtractor,
    solver: Solver,
    composer: MultiImageComposer,
    controller: RetryController,
    sanitizer: ResponseSanitizer,
    options: GenerationOptions,
    current: Mutex<Option<CancellationToken>>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &AppConfig,
        client: SharedClient,
        queue: Arc<dyn QueueStore>,
        reader: Arc<dyn FileReader>,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        let options = GenerationOptions::from_config(&config.llm);
        Self {
            state: new_shared_state(),
            client,
            queue,
            reader,
            events,
            extractor: ContentExtractor::from_config(config),
            solver: Solver::new(options),
            composer: MultiImageComposer::new(options),
            controller: RetryController::new(RetryPolicy::from_config(&config.retry)),
            sanitizer: ResponseSanitizer::new(),
            options,
            current: Mutex::new(None),
        }
    }

    /// Handle to the shared state, for a UI to read.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    // -----------------------------------------------------------------------
    // Command loop
    // -----------------------------------------------------------------------

    /// Consume commands until `rx` closes.  Each run is spawned; a new
    /// `Process`/`Debug` cancels the run in flight and waits for it before
    /// starting.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<PipelineCommand>) {
        let mut in_flight: Option<JoinHandle<()>> = None;

        while let Some(command) = rx.recv().await {
            let (debug, request) = match command {
                PipelineCommand::Cancel => {
                    self.cancel();
                    continue;
                }
                PipelineCommand::Process(request) => (false, request),
                PipelineCommand::Debug(request) => (true, request),
            };

            let token = self.begin_run();
            if let Some(previous) = in_flight.take() {
                if let Err(e) = previous.await {
                    log::error!("pipeline: previous run panicked: {e}");
                }
            }

            let this = Arc::clone(&self);
            in_flight = Some(tokio::spawn(async move {
                let outcome = if debug {
                    this.debug_with(request, &token).await.map(|_| ())
                } else {
                    this.queue_with(request, &token).await.map(|_| ())
                };
                if let Err(e) = outcome {
                    log::debug!("pipeline: run ended: {e}");
                }
            }));
        }

        if let Some(last) = in_flight.take() {
            if let Err(e) = last.await {
                log::error!("pipeline: run panicked: {e}");
            }
        }
        log::info!("pipeline: command channel closed, orchestrator shutting down");
    }

    /// Cancel the run in flight, if any.  Results arriving afterwards are
    /// discarded.
    pub fn cancel(&self) {
        let token = self.current.lock().unwrap().take();
        if let Some(token) = token {
            log::info!("pipeline: cancelling run in flight");
            token.cancel();
            let mut st = self.state.lock().unwrap();
            if st.pipeline.is_busy() {
                st.pipeline = PipelineState::Idle;
            }
        }
    }

    fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.current.lock().unwrap().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }

    // -----------------------------------------------------------------------
    // Queue mode
    // -----------------------------------------------------------------------

    /// Process the main queue (or an explicit item list) into one
    /// [`ProblemInfo`], emitting `ProblemExtracted`.  The main queue is
    /// cleared only when its buffered items were the ones processed.
    pub async fn process_queue(&self, request: ProcessRequest) -> Result<ProblemInfo, PipelineError> {
        let token = self.begin_run();
        self.queue_with(request, &token).await
    }

    async fn queue_with(
        &self,
        request: ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<ProblemInfo, PipelineError> {
        let client = match self.client.get() {
            Ok(client) => client,
            Err(e) => {
                let err = PipelineError::Configuration(e.to_string());
                self.fail(cancel, PipelineEvent::SolutionError(err.to_string()));
                return Err(err);
            }
        };

        let buffered = matches!(request, ProcessRequest::Buffered);
        let items = match request {
            ProcessRequest::Items(items) => items,
            ProcessRequest::Buffered => match self.queue.list_queue_items(QueueKind::Main).await {
                Ok(items) => items,
                Err(e) => {
                    let err = PipelineError::Internal(e.to_string());
                    self.fail(cancel, PipelineEvent::SolutionError(err.to_string()));
                    return Err(err);
                }
            },
        };

        if items.is_empty() {
            log::info!("pipeline: queue is empty");
            self.commit(
                cancel,
                |st| st.pipeline = PipelineState::Idle,
                PipelineEvent::NoInputAvailable,
            );
            return Err(PipelineError::NoInput);
        }

        self.start(cancel, PipelineState::QueueProcessing, PipelineEvent::ProcessingStarted)?;
        log::info!("pipeline: processing {} item(s)", items.len());

        let (screenshots, others): (Vec<QueueItem>, Vec<QueueItem>) = items
            .iter()
            .cloned()
            .partition(|item| item.kind == InputKind::Screenshot);

        let (contents, mut errors) = self.extract_all(&others, client.as_ref(), cancel).await?;
        let context = context_text(&contents);

        let mut answered: Option<(String, GenerationResult)> = None;

        if !screenshots.is_empty() {
            let prepared = self.composer.prepare(self.reader.as_ref(), &screenshots).await;
            errors.extend(prepared.errors.iter().cloned());
            ensure_live(cancel)?;

            match prepared.require_any() {
                Ok(()) => {
                    let ctx = (!context.is_empty()).then_some(context.as_str());
                    let solution = self
                        .generate_combined(client.as_ref(), &prepared.parts, ctx, cancel)
                        .await?;
                    let statement = match ctx {
                        Some(ctx) => format!("{ctx}\n\n{}", solution.text),
                        None => solution.text.clone(),
                    };
                    answered = Some((statement, solution));
                }
                Err(e) => log::warn!("pipeline: {e}; using text/audio content only"),
            }
        }

        let (problem_statement, solution) = match answered {
            Some(answered) => answered,
            None if context.is_empty() => {
                return Err(self.total_failure(cancel, &errors, buffered).await);
            }
            None => {
                let kind = contents
                    .first()
                    .map(|c| c.source_kind)
                    .unwrap_or(InputKind::Text);
                let solution = self
                    .generate_text(client.as_ref(), &context, kind, cancel)
                    .await?;
                (context, solution)
            }
        };

        let info = ProblemInfo {
            problem_statement,
            input_kinds: distinct_kinds(&items),
            processing_errors: (!errors.is_empty()).then_some(errors),
            solution,
        };

        let committed = self.commit(
            cancel,
            |st| {
                st.pipeline = PipelineState::Success;
                st.last_problem = Some(info.clone());
                st.has_debugged = false;
            },
            PipelineEvent::ProblemExtracted(info.clone()),
        );
        if !committed {
            return Err(PipelineError::Cancelled);
        }

        if buffered {
            self.clear_main_queue().await;
        }
        Ok(info)
    }

    /// Extract every non-screenshot item concurrently.  Failures become
    /// [`ProcessingError`]s; only cancellation aborts.
    async fn extract_all(
        &self,
        items: &[QueueItem],
        client: &dyn LlmClient,
        cancel: &CancellationToken,
    ) -> Result<(Vec<ExtractedContent>, Vec<ProcessingError>), PipelineError> {
        let reader = self.reader.as_ref();
        let outcomes = join_all(
            items
                .iter()
                .map(|item| self.extractor.extract(item, reader, client, cancel)),
        )
        .await;
        ensure_live(cancel)?;

        let mut contents = Vec::new();
        let mut errors = Vec::new();
        for (item, outcome) in items.iter().zip(outcomes) {
            match outcome {
                Ok(content) => contents.push(content),
                Err(e) if e.is_cancelled() => return Err(PipelineError::Cancelled),
                Err(e) => {
                    log::warn!("pipeline: {} failed at {}: {e}", item.locator, e.stage().label());
                    errors.push(e.into_processing_error(&item.locator));
                }
            }
        }
        Ok((contents, errors))
    }

    async fn generate_combined(
        &self,
        client: &dyn LlmClient,
        images: &[PromptPart],
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, PipelineError> {
        let composer = &self.composer;
        let result = self
            .controller
            .run(InputKind::Screenshot, Ok(()), cancel, move |token| async move {
                composer.generate(client, images, context, &token).await
            })
            .await?;
        Ok(self.sanitized(result))
    }

    async fn generate_text(
        &self,
        client: &dyn LlmClient,
        content: &str,
        kind: InputKind,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, PipelineError> {
        let solver = &self.solver;
        let result = self
            .controller
            .run(kind, Ok(()), cancel, move |token| async move {
                solver.classify_and_generate(client, content, kind, &token).await
            })
            .await?;
        Ok(self.sanitized(result))
    }

    async fn total_failure(
        &self,
        cancel: &CancellationToken,
        errors: &[ProcessingError],
        buffered: bool,
    ) -> PipelineError {
        let detail = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        let err = PipelineError::NoContent(detail);
        if self.fail(cancel, PipelineEvent::SolutionError(err.to_string())) && buffered {
            self.clear_main_queue().await;
        }
        err
    }

    async fn clear_main_queue(&self) {
        if let Err(e) = self.queue.clear_queue(QueueKind::Main).await {
            log::warn!("pipeline: could not clear queue: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Debug mode
    // -----------------------------------------------------------------------

    /// Re-examine the last problem with extra screenshots (from `request`,
    /// or the extra queue when buffered).  Queues are left untouched.
    pub async fn process_debug(
        &self,
        request: ProcessRequest,
    ) -> Result<GenerationResult, PipelineError> {
        let token = self.begin_run();
        self.debug_with(request, &token).await
    }

    async fn debug_with(
        &self,
        request: ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, PipelineError> {
        let client = match self.client.get() {
            Ok(client) => client,
            Err(e) => {
                return Err(self.debug_failure(cancel, PipelineError::Configuration(e.to_string())))
            }
        };

        let problem = self.state.lock().unwrap().last_problem.clone();
        let Some(problem) = problem else {
            return Err(self.debug_failure(cancel, PipelineError::NoProblem));
        };

        let items = match request {
            ProcessRequest::Items(items) => items,
            ProcessRequest::Buffered => match self.queue.list_queue_items(QueueKind::Extra).await {
                Ok(items) => items,
                Err(e) => {
                    return Err(self.debug_failure(cancel, PipelineError::Internal(e.to_string())))
                }
            },
        };

        self.start(cancel, PipelineState::DebugProcessing, PipelineEvent::DebugStarted)?;

        let prepared = self.composer.prepare(self.reader.as_ref(), &items).await;
        ensure_live(cancel)?;
        if prepared.require_any().is_err() {
            return Err(self.debug_failure(cancel, PipelineError::NoDebugImages));
        }

        let baseline = self
            .generate_text(client.as_ref(), &problem.problem_statement, InputKind::Text, cancel)
            .await?;
        log::debug!("pipeline: baseline regenerated ({} chars)", baseline.text.len());

        let mut parts = vec![PromptPart::text(debug_prompt(
            &problem.problem_statement,
            &baseline.text,
            prepared.parts.len(),
        ))];
        parts.extend(prepared.parts);

        let client = client.as_ref();
        let parts = &parts;
        let options = &self.options;
        let result = self
            .controller
            .run(InputKind::Screenshot, Ok(()), cancel, move |token| async move {
                client.generate(parts, options, &token).await
            })
            .await?;
        let result = self.sanitized(result);

        let committed = self.commit(
            cancel,
            |st| {
                st.pipeline = PipelineState::Success;
                st.last_debug = Some(result.clone());
                st.has_debugged = true;
            },
            PipelineEvent::DebugSuccess(result.clone()),
        );
        if !committed {
            return Err(PipelineError::Cancelled);
        }
        Ok(result)
    }

    fn debug_failure(&self, cancel: &CancellationToken, err: PipelineError) -> PipelineError {
        self.fail(cancel, PipelineEvent::DebugError(err.to_string()));
        err
    }

    // -----------------------------------------------------------------------
    // Simple call
    // -----------------------------------------------------------------------

    /// One input in, one response out.  Never fails: validation,
    /// configuration and extraction problems all produce the fallback
    /// response.
    pub async fn respond(&self, input: RawInput) -> GenerationResult {
        self.respond_with(input, &CancellationToken::new()).await
    }

    /// [`respond`](Self::respond) under a caller-owned cancellation token.
    pub async fn respond_with(&self, input: RawInput, cancel: &CancellationToken) -> GenerationResult {
        let kind = input.kind();
        let fallback = *self.controller.fallback();

        let client = match self.client.get() {
            Ok(client) => client,
            Err(e) => return self.sanitized(fallback.synthesize(kind, &e.to_string())),
        };

        let (content, precheck) = match input {
            RawInput::Text(raw) => {
                let precheck = self
                    .extractor
                    .validate_text(&raw)
                    .map(|_| ())
                    .map_err(|e| e.to_string());
                (raw, precheck)
            }
            RawInput::Binary {
                kind,
                mime_type,
                data,
            } => match self
                .extractor
                .extract_binary(client.as_ref(), kind, data, &mime_type, cancel)
                .await
            {
                Ok(text) => (text, Ok(())),
                Err(e) => return self.sanitized(fallback.synthesize(kind, &e.to_string())),
            },
        };

        match self.generate_text_or_fallback(client.as_ref(), &content, kind, precheck, cancel).await {
            Ok(result) => result,
            Err(Cancelled) => self.sanitized(fallback.synthesize(kind, "request cancelled")),
        }
    }

    async fn generate_text_or_fallback(
        &self,
        client: &dyn LlmClient,
        content: &str,
        kind: InputKind,
        precheck: Result<(), String>,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, Cancelled> {
        let solver = &self.solver;
        let result = self
            .controller
            .run(kind, precheck, cancel, move |token| async move {
                solver.classify_and_generate(client, content, kind, &token).await
            })
            .await?;
        Ok(self.sanitized(result))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn sanitized(&self, result: GenerationResult) -> GenerationResult {
        GenerationResult {
            text: self.sanitizer.sanitize(&result.text),
            timestamp: result.timestamp,
        }
    }

    /// Apply `update` and emit `event` unless `cancel` has fired.  Returns
    /// whether anything was applied.
    fn commit(
        &self,
        cancel: &CancellationToken,
        update: impl FnOnce(&mut AppState),
        event: PipelineEvent,
    ) -> bool {
        let mut st = self.state.lock().unwrap();
        if cancel.is_cancelled() {
            log::debug!("pipeline: run cancelled, discarding {}", event.name());
            return false;
        }
        update(&mut *st);
        // A closed receiver just means nobody is listening.
        let _ = self.events.send(event);
        true
    }

    fn start(
        &self,
        cancel: &CancellationToken,
        phase: PipelineState,
        event: PipelineEvent,
    ) -> Result<(), PipelineError> {
        let started = self.commit(
            cancel,
            |st| {
                st.pipeline = phase;
                st.error_message = None;
            },
            event,
        );
        if started {
            Ok(())
        } else {
            Err(PipelineError::Cancelled)
        }
    }

    fn fail(&self, cancel: &CancellationToken, event: PipelineEvent) -> bool {
        let message = match &event {
            PipelineEvent::SolutionError(msg) | PipelineEvent::DebugError(msg) => msg.clone(),
            other => other.name().to_string(),
        };
        log::error!("pipeline error: {message}");
        self.commit(
            cancel,
            |st| {
                st.pipeline = PipelineState::Failed;
                st.error_message = Some(message);
            },
            event,
        )
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Audio transcripts first, then typed text, each in queue order.
fn context_text(contents: &[ExtractedContent]) -> String {
    [InputKind::Audio, InputKind::Text]
        .iter()
        .flat_map(|kind| {
            contents
                .iter()
                .filter(move |c| c.source_kind == *kind)
                .map(|c| c.text.trim())
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn distinct_kinds(items: &[QueueItem]) -> Vec<InputKind> {
    let mut kinds = Vec::new();
    for item in items {
        if !kinds.contains(&item.kind) {
            kinds.push(item.kind);
        }
    }
    kinds
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MemoryQueue, MemoryReader};
    use crate::llm::{LlmError, ScriptedLlm, FALLBACK_MARKER};
    use crate::types::Stage;
    use async_trait::async_trait;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Blocks until cancelled when the prompt mentions "slow", otherwise
    /// answers immediately.
    struct GateLlm;

    #[async_trait]
    impl LlmClient for GateLlm {
        async fn generate(
            &self,
            parts: &[PromptPart],
            _options: &GenerationOptions,
            cancel: &CancellationToken,
        ) -> Result<String, LlmError> {
            let slow = parts
                .iter()
                .any(|p| matches!(p, PromptPart::Text(t) if t.contains("slow")));
            if slow {
                cancel.cancelled().await;
                return Err(LlmError::Cancelled);
            }
            Ok("CATEGORY: general\n## Summary\nquick answer".into())
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    struct Harness {
        orc: PipelineOrchestrator,
        events: mpsc::UnboundedReceiver<PipelineEvent>,
        queue: Arc<MemoryQueue>,
    }

    impl Harness {
        fn drain(&mut self) -> Vec<PipelineEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn test_config(api_key: Option<&str>) -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.api_key = api_key.map(String::from);
        config.retry.backoff_unit_ms = 1;
        config.retry.attempt_timeout_secs = 5;
        config
    }

    fn harness_with(
        llm: Arc<dyn LlmClient>,
        queue: MemoryQueue,
        reader: MemoryReader,
        api_key: Option<&str>,
    ) -> Harness {
        let config = Arc::new(test_config(api_key));
        let client = SharedClient::new(config.clone(), move |_key, _model| Arc::clone(&llm));
        let queue = Arc::new(queue);
        let (tx, rx) = mpsc::unbounded_channel();
        let orc = PipelineOrchestrator::new(
            &config,
            client,
            queue.clone(),
            Arc::new(reader),
            tx,
        );
        Harness {
            orc,
            events: rx,
            queue,
        }
    }

    fn harness(llm: &Arc<ScriptedLlm>, queue: MemoryQueue, reader: MemoryReader) -> Harness {
        let llm: Arc<dyn LlmClient> = llm.clone();
        harness_with(llm, queue, reader, Some("test-key"))
    }

    fn extracted(events: &[PipelineEvent]) -> Vec<&ProblemInfo> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::ProblemExtracted(info) => Some(info),
                _ => None,
            })
            .collect()
    }

    const GENERAL_ANSWER: &str = "CATEGORY: general\n## Summary\nHere is the answer.";

    // -----------------------------------------------------------------------
    // Queue mode
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn one_unreadable_text_file_is_recorded_and_the_other_used() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let queue = MemoryQueue::with_items(
            vec![QueueItem::text("good.txt"), QueueItem::text("missing.txt")],
            vec![],
        );
        let reader = MemoryReader::new().with("good.txt", "Explain event loops");
        let mut h = harness(&llm, queue, reader);

        let info = h.orc.process_queue(ProcessRequest::Buffered).await.unwrap();

        let errors = info.processing_errors.as_ref().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].item_locator, "missing.txt");
        assert_eq!(errors[0].stage, Stage::Read);
        assert!(info.problem_statement.contains("Explain event loops"));
        assert!(info.solution.text.starts_with("## Classification: general"));

        let events = h.drain();
        assert_eq!(events[0], PipelineEvent::ProcessingStarted);
        assert_eq!(extracted(&events), vec![&info]);
        assert!(h.queue.main.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn three_screenshots_start_with_classification_header() {
        let llm = Arc::new(ScriptedLlm::always(
            "Here is what I found in the images:\n## Extracted Text\nfoo\n\n## Classification: algorithm\n## Solution\nLanguage: python\n```python\ndef main():\n    pass\n```\nTime Complexity: O(n)\nSpace Complexity: O(1)",
        ));
        let items: Vec<QueueItem> = ["1.png", "2.png", "3.png"]
            .into_iter()
            .map(QueueItem::screenshot)
            .collect();
        let reader = MemoryReader::new()
            .with("1.png", vec![1u8])
            .with("2.png", vec![2u8])
            .with("3.png", vec![3u8]);
        let mut h = harness(&llm, MemoryQueue::default(), reader);

        let info = h.orc.process_queue(ProcessRequest::Items(items)).await.unwrap();

        assert_eq!(llm.calls(), 1);
        assert!(info.solution.text.starts_with("## Classification: algorithm"));
        assert!(!info.solution.text.contains("Extracted Text"));
        assert_eq!(info.problem_statement, info.solution.text);
        assert_eq!(info.input_kinds, vec![InputKind::Screenshot]);
        assert!(info.processing_errors.is_none());
        assert_eq!(extracted(&h.drain()).len(), 1);
    }

    #[tokio::test]
    async fn audio_and_text_context_precede_image_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("spoken words".into()),
            Ok("## Classification: technical\n## Concept\nimage answer".into()),
        ]));
        let items = vec![
            QueueItem::text("t.txt"),
            QueueItem::screenshot("s.png"),
            QueueItem::audio("a.wav"),
        ];
        let reader = MemoryReader::new()
            .with("t.txt", "typed words")
            .with("s.png", vec![9u8])
            .with("a.wav", vec![7u8]);
        let h = harness(&llm, MemoryQueue::default(), reader);

        let info = h.orc.process_queue(ProcessRequest::Items(items)).await.unwrap();

        let s = &info.problem_statement;
        assert!(s.starts_with("spoken words\n\ntyped words"));
        assert!(s.find("typed words").unwrap() < s.find("## Classification").unwrap());
        assert_eq!(
            info.input_kinds,
            vec![InputKind::Text, InputKind::Screenshot, InputKind::Audio]
        );
        assert!(llm.prompt_text(1).contains("spoken words\n\ntyped words"));
    }

    #[tokio::test]
    async fn unreadable_screenshots_fall_back_to_text_content() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let items = vec![QueueItem::screenshot("broken.png"), QueueItem::text("q.txt")];
        let reader = MemoryReader::new().with("q.txt", "What is a deadlock?");
        let h = harness(&llm, MemoryQueue::default(), reader);

        let info = h.orc.process_queue(ProcessRequest::Items(items)).await.unwrap();

        assert_eq!(info.problem_statement, "What is a deadlock?");
        assert_eq!(info.processing_errors.as_ref().unwrap().len(), 1);
        assert!(llm.prompt_text(0).contains("What is a deadlock?"));
    }

    #[tokio::test]
    async fn nothing_extracted_is_total_failure_and_clears_queue() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let queue = MemoryQueue::with_items(
            vec![QueueItem::text("a.txt"), QueueItem::screenshot("b.png")],
            vec![],
        );
        let reader = MemoryReader::new().with("a.txt", "   ");
        let mut h = harness(&llm, queue, reader);

        let err = h.orc.process_queue(ProcessRequest::Buffered).await.unwrap_err();

        assert!(matches!(err, PipelineError::NoContent(_)));
        assert_eq!(llm.calls(), 0);
        assert!(h.queue.main.lock().unwrap().is_empty());
        let events = h.drain();
        assert!(matches!(events.last(), Some(PipelineEvent::SolutionError(msg)) if msg.contains("a.txt")));
        assert_eq!(h.orc.state().lock().unwrap().pipeline, PipelineState::Failed);
    }

    #[tokio::test]
    async fn explicit_items_leave_buffered_queue_alone() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let queue = MemoryQueue::with_items(vec![QueueItem::text("pending.txt")], vec![]);
        let reader = MemoryReader::new().with("q.txt", "What is a mutex?");
        let h = harness(&llm, queue, reader);

        let info = h
            .orc
            .process_queue(ProcessRequest::Items(vec![QueueItem::text("q.txt")]))
            .await
            .unwrap();

        assert_eq!(info.problem_statement, "What is a mutex?");
        let main = h.queue.main.lock().unwrap();
        assert_eq!(*main, vec![QueueItem::text("pending.txt")]);
    }

    #[tokio::test]
    async fn explicit_items_total_failure_leaves_buffered_queue_alone() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let queue = MemoryQueue::with_items(vec![QueueItem::text("pending.txt")], vec![]);
        let h = harness(&llm, queue, MemoryReader::new());

        let err = h
            .orc
            .process_queue(ProcessRequest::Items(vec![QueueItem::text("gone.txt")]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoContent(_)));
        assert_eq!(h.queue.main.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_api_key_is_reported_without_clearing_queue() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let queue = MemoryQueue::with_items(vec![QueueItem::text("a.txt")], vec![]);
        let dyn_llm: Arc<dyn LlmClient> = llm.clone();
        let mut h = harness_with(dyn_llm, queue, MemoryReader::new(), None);

        let err = h.orc.process_queue(ProcessRequest::Buffered).await.unwrap_err();

        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(llm.calls(), 0);
        assert_eq!(h.queue.main.lock().unwrap().len(), 1);
        assert!(matches!(h.drain().as_slice(), [PipelineEvent::SolutionError(_)]));
    }

    #[tokio::test]
    async fn empty_queue_emits_no_input() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let mut h = harness(&llm, MemoryQueue::default(), MemoryReader::new());

        let err = h.orc.process_queue(ProcessRequest::Buffered).await.unwrap_err();

        assert_eq!(err, PipelineError::NoInput);
        assert_eq!(h.drain(), vec![PipelineEvent::NoInputAvailable]);
    }

    #[tokio::test]
    async fn exhausted_retries_still_produce_a_problem_with_fallback() {
        let llm = Arc::new(ScriptedLlm::failing(LlmError::Request("connection reset".into())));
        let reader = MemoryReader::new().with("q.txt", "Design a URL shortener");
        let h = harness(&llm, MemoryQueue::default(), reader);

        let info = h
            .orc
            .process_queue(ProcessRequest::Items(vec![QueueItem::text("q.txt")]))
            .await
            .unwrap();

        assert_eq!(llm.calls(), 3);
        assert!(info.solution.text.contains(FALLBACK_MARKER));
        assert!(info.solution.text.contains("connection reset"));
        assert_eq!(info.problem_statement, "Design a URL shortener");
    }

    // -----------------------------------------------------------------------
    // Debug mode
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn debug_without_problem_is_an_error() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let mut h = harness(&llm, MemoryQueue::default(), MemoryReader::new());

        let err = h.orc.process_debug(ProcessRequest::Buffered).await.unwrap_err();

        assert_eq!(err, PipelineError::NoProblem);
        assert!(matches!(h.drain().as_slice(), [PipelineEvent::DebugError(_)]));
    }

    #[tokio::test]
    async fn debug_uses_baseline_and_extra_screenshots() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(GENERAL_ANSWER.into()),
            Ok("CATEGORY: general\n## Summary\nbaseline solution".into()),
            Ok("## Classification: debugging_optimization\n## Root Cause\noff by one".into()),
        ]));
        let queue = MemoryQueue::with_items(
            vec![QueueItem::text("q.txt")],
            vec![QueueItem::screenshot("attempt.png")],
        );
        let reader = MemoryReader::new()
            .with("q.txt", "Reverse a string")
            .with("attempt.png", vec![5u8]);
        let mut h = harness(&llm, queue, reader);

        h.orc.process_queue(ProcessRequest::Buffered).await.unwrap();
        let result = h.orc.process_debug(ProcessRequest::Buffered).await.unwrap();

        assert!(result.text.starts_with("## Classification: debugging_optimization"));
        assert_eq!(llm.calls(), 3);
        let debug_prompt = llm.prompt_text(2);
        assert!(debug_prompt.contains("Reverse a string"));
        assert!(debug_prompt.contains("baseline solution"));
        let sent = llm.prompts.lock().unwrap()[2].clone();
        assert_eq!(sent.iter().filter(|p| p.is_binary()).count(), 1);

        assert_eq!(h.queue.extra.lock().unwrap().len(), 1);
        {
            let state = h.orc.state();
            let st = state.lock().unwrap();
            assert!(st.has_debugged);
            assert_eq!(st.last_debug.as_ref(), Some(&result));
        }
        let events = h.drain();
        assert_eq!(events[2], PipelineEvent::DebugStarted);
        assert_eq!(events[3], PipelineEvent::DebugSuccess(result));
    }

    #[tokio::test]
    async fn debug_without_extra_screenshots_is_an_error() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let reader = MemoryReader::new().with("q.txt", "Reverse a string");
        let mut h = harness(&llm, MemoryQueue::default(), reader);

        h.orc
            .process_queue(ProcessRequest::Items(vec![QueueItem::text("q.txt")]))
            .await
            .unwrap();
        let err = h.orc.process_debug(ProcessRequest::Buffered).await.unwrap_err();

        assert_eq!(err, PipelineError::NoDebugImages);
        assert!(matches!(h.drain().last(), Some(PipelineEvent::DebugError(_))));
        assert!(!h.orc.state().lock().unwrap().has_debugged);
    }

    // -----------------------------------------------------------------------
    // Simple call
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn respond_with_invalid_text_returns_fallback_without_calls() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let h = harness(&llm, MemoryQueue::default(), MemoryReader::new());

        for input in [String::new(), "   \n".to_string(), "x".repeat(20_001)] {
            let result = h.orc.respond(RawInput::Text(input)).await;
            assert!(result.text.contains(FALLBACK_MARKER));
            assert!(result.text.starts_with("## Classification: general"));
        }
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn respond_without_api_key_returns_fallback() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let h = harness_with(llm, MemoryQueue::default(), MemoryReader::new(), Some("  "));

        let result = h.orc.respond(RawInput::Text("What is DNS?".into())).await;
        assert!(result.text.contains(FALLBACK_MARKER));
        assert!(result.text.contains("no API key"));
    }

    #[tokio::test]
    async fn respond_answers_valid_input() {
        let llm = Arc::new(ScriptedLlm::always(GENERAL_ANSWER));
        let h = harness(&llm, MemoryQueue::default(), MemoryReader::new());

        let result = h.orc.respond(RawInput::Text("Hello?".into())).await;
        assert_eq!(
            result.text,
            "## Classification: general\n\n## Summary\nHere is the answer."
        );
    }

    // -----------------------------------------------------------------------
    // Cancellation & command loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn cancelled_run_emits_nothing_further() {
        let reader = MemoryReader::new().with("q.txt", "a slow question");
        let mut h = harness_with(
            Arc::new(GateLlm),
            MemoryQueue::default(),
            reader,
            Some("test-key"),
        );
        let orc = Arc::new(h.orc);

        let task = tokio::spawn({
            let orc = Arc::clone(&orc);
            async move {
                orc.process_queue(ProcessRequest::Items(vec![QueueItem::text("q.txt")]))
                    .await
            }
        });

        assert_eq!(h.events.recv().await, Some(PipelineEvent::ProcessingStarted));
        orc.cancel();

        let outcome = task.await.unwrap();
        assert_eq!(outcome, Err(PipelineError::Cancelled));
        assert!(h.events.try_recv().is_err());
        assert_eq!(orc.state().lock().unwrap().pipeline, PipelineState::Idle);
    }

    #[tokio::test]
    async fn new_command_cancels_run_in_flight() {
        let reader = MemoryReader::new()
            .with("slow.txt", "a slow question")
            .with("fast.txt", "a quick question");
        let mut h = harness_with(
            Arc::new(GateLlm),
            MemoryQueue::default(),
            reader,
            Some("test-key"),
        );
        let orc = Arc::new(h.orc);

        let (tx, rx) = mpsc::channel(4);
        tx.send(PipelineCommand::Process(ProcessRequest::Items(vec![QueueItem::text(
            "slow.txt",
        )])))
        .await
        .unwrap();
        tx.send(PipelineCommand::Process(ProcessRequest::Items(vec![QueueItem::text(
            "fast.txt",
        )])))
        .await
        .unwrap();
        drop(tx);

        Arc::clone(&orc).run(rx).await;

        let mut events = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            events.push(event);
        }
        let problems = extracted(&events);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].problem_statement, "a quick question");
        assert_eq!(orc.state().lock().unwrap().pipeline, PipelineState::Success);
    }

    #[test]
    fn context_orders_audio_before_text() {
        let contents = vec![
            ExtractedContent {
                source_kind: InputKind::Text,
                text: "typed".into(),
            },
            ExtractedContent {
                source_kind: InputKind::Audio,
                text: " spoken ".into(),
            },
        ];
        assert_eq!(context_text(&contents), "spoken\n\ntyped");
    }

    #[test]
    fn error_messages_are_human_readable() {
        assert_eq!(
            PipelineError::NoInput.to_string(),
            "Nothing to process: the queue is empty"
        );
        assert!(PipelineError::Configuration("no API key configured".into())
            .to_string()
            .contains("no API key"));
    }
}
