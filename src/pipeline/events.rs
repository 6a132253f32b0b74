//! Messages into and out of the orchestrator.

use crate::types::{GenerationResult, InputKind, ProblemInfo, QueueItem};

/// One-directional notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    ProcessingStarted,
    ProblemExtracted(ProblemInfo),
    SolutionError(String),
    DebugStarted,
    DebugSuccess(GenerationResult),
    DebugError(String),
    NoInputAvailable,
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::ProcessingStarted => "processing-started",
            PipelineEvent::ProblemExtracted(_) => "problem-extracted",
            PipelineEvent::SolutionError(_) => "solution-error",
            PipelineEvent::DebugStarted => "debug-started",
            PipelineEvent::DebugSuccess(_) => "debug-success",
            PipelineEvent::DebugError(_) => "debug-error",
            PipelineEvent::NoInputAvailable => "no-input-available",
        }
    }

    /// `true` for the events that end a run.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            PipelineEvent::ProcessingStarted | PipelineEvent::DebugStarted
        )
    }
}

/// Which items a run should process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessRequest {
    /// Whatever is currently in the queue store.
    Buffered,
    /// An explicit list, bypassing the queue store for listing.
    Items(Vec<QueueItem>),
}

/// Requests consumed by [`PipelineOrchestrator::run`](super::PipelineOrchestrator::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCommand {
    /// Queue-mode processing.
    Process(ProcessRequest),
    /// Debug-mode processing over the last problem.
    Debug(ProcessRequest),
    /// Cancel the run in flight, if any.
    Cancel,
}

/// A single input for the simple processing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    Text(String),
    Binary {
        kind: InputKind,
        mime_type: String,
        data: Vec<u8>,
    },
}

impl RawInput {
    pub fn kind(&self) -> InputKind {
        match self {
            RawInput::Text(_) => InputKind::Text,
            RawInput::Binary { kind, .. } => *kind,
        }
    }
}
