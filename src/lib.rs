//! Interview coach: turns captured screenshots, audio clips and typed text
//! into one structured, category-specific answer from a remote model.
//!
//! Leaf-first module order:
//!
//! * [`types`]: shared data model.
//! * [`config`]: settings, paths and the config-store collaborator.
//! * [`capture`]: queue store and file reader collaborators.
//! * [`llm`]: model client, prompts, retry policy and fallback.
//! * [`extract`]: per-item text extraction and snippet selection.
//! * [`solve`]: classification, generation and the multi-image path.
//! * [`response`]: section parsing and final sanitization.
//! * [`pipeline`]: the orchestrator and its state machine.

pub mod capture;
pub mod config;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod response;
pub mod solve;
pub mod types;
