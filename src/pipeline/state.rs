//! Pipeline state machine and shared application state.
//!
//! [`PipelineState`] is the orchestrator's current phase.  [`AppState`]
//! holds everything a UI needs to render: phase, last problem, last debug
//! answer, the has-debugged flag, and the last error.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<AppState>>`, cheap to
//! clone and safe to share across tasks.

use std::sync::{Arc, Mutex};

use crate::types::{GenerationResult, ProblemInfo};

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// Phases of the coaching pipeline.
///
/// ```text
/// Idle ──process──▶ QueueProcessing ──▶ Success | Failed
/// Idle ──debug────▶ DebugProcessing ──▶ Success | Failed
/// Success / Failed ──next request──▶ QueueProcessing | DebugProcessing
/// any busy state ──cancel──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No run in flight and nothing processed yet.
    #[default]
    Idle,

    /// Initial processing of the main queue.
    QueueProcessing,

    /// Re-examining the last problem with extra screenshots.
    DebugProcessing,

    /// The last run emitted its result.
    Success,

    /// The last run ended in an error event.
    Failed,
}

impl PipelineState {
    /// Returns `true` while a run is in flight.
    ///
    /// ```
    /// use interview_coach::pipeline::PipelineState;
    ///
    /// assert!(!PipelineState::Idle.is_busy());
    /// assert!(PipelineState::QueueProcessing.is_busy());
    /// assert!(PipelineState::DebugProcessing.is_busy());
    /// assert!(!PipelineState::Success.is_busy());
    /// assert!(!PipelineState::Failed.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineState::QueueProcessing | PipelineState::DebugProcessing
        )
    }

    /// Short label for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::QueueProcessing => "Processing",
            PipelineState::DebugProcessing => "Debugging",
            PipelineState::Success => "Done",
            PipelineState::Failed => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared application state, mutated only by the orchestrator at phase
/// transitions.
#[derive(Debug, Default)]
pub struct AppState {
    pub pipeline: PipelineState,

    /// Result of the last successful queue run; debug mode requires it.
    pub last_problem: Option<ProblemInfo>,

    /// Result of the last successful debug run.
    pub last_debug: Option<GenerationResult>,

    /// Set once a debug run has succeeded for the current problem; reset
    /// by the next queue run.
    pub has_debugged: bool,

    /// Message of the last error event, cleared when a new run starts.
    pub error_message: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`AppState`].
///
/// Lock for short critical sections only; never hold the guard across an
/// `.await`.
pub type SharedState = Arc<Mutex<AppState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(AppState::new()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
