//! Structural handling of model output: a typed section parser and the
//! sanitizer every final response passes through.

pub mod sanitize;
pub mod sections;

pub use sanitize::ResponseSanitizer;
pub use sections::{Section, CLASSIFICATION_TITLE, LEGACY_HEADERS};
