//! Pipeline orchestration for the interview coach.
//!
//! This module sequences extraction, classification, generation and
//! sanitization, and exposes the shared state a UI reads.
//!
//! # Architecture
//!
//! ```text
//! PipelineCommand (mpsc)
//!        │
//!        ▼
//! PipelineOrchestrator::run()  ← async tokio task
//!        │
//!        ├─ Process(request) → cancel previous run, spawn queue mode
//!        ├─ Debug(request)   → cancel previous run, spawn debug mode
//!        └─ Cancel           → cancel run in flight
//!
//! PipelineEvent (unbounded mpsc) ──▶ presentation layer
//! SharedState (Arc<Mutex<AppState>>) ←── read by a UI
//! ```

pub mod events;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use events::{PipelineCommand, PipelineEvent, ProcessRequest, RawInput};
pub use runner::{PipelineError, PipelineOrchestrator};
pub use state::{new_shared_state, AppState, PipelineState, SharedState};
