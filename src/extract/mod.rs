//! Turning captured items into plain text.
//!
//! * [`ContentExtractor`]: validation passthrough for text, one model call
//!   for audio/screenshot payloads.
//! * [`SnippetSelector`]: keyword-scored excerpt used only for the
//!   classification prompt.

pub mod content;
pub mod snippet;

pub use content::{ContentExtractor, ExtractError};
pub use snippet::SnippetSelector;
