//! Closed set of problem categories.
//!
//! Any label coming back from the model is funnelled through
//! [`Category::coerce`] (or [`Category::coerce_within`] for the narrower
//! combined-image set), so downstream code only ever sees a member of the
//! set.  Unknown labels become [`Category::General`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Algorithm,
    SystemDesign,
    Behavioral,
    Technical,
    DebuggingOptimization,
    General,
}

impl Category {
    /// Every label the classifier may emit.
    pub const ALL: [Category; 6] = [
        Category::Algorithm,
        Category::SystemDesign,
        Category::Behavioral,
        Category::Technical,
        Category::DebuggingOptimization,
        Category::General,
    ];

    /// Labels allowed on the combined multi-image path.
    pub const COMBINED: [Category; 4] = [
        Category::Algorithm,
        Category::Technical,
        Category::DebuggingOptimization,
        Category::General,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Algorithm => "algorithm",
            Category::SystemDesign => "system_design",
            Category::Behavioral => "behavioral",
            Category::Technical => "technical",
            Category::DebuggingOptimization => "debugging_optimization",
            Category::General => "general",
        }
    }

    /// Parse a raw label leniently: case, surrounding markdown/quotes and
    /// space/hyphen separators are ignored.  Returns `None` for anything
    /// outside [`Category::ALL`].
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .trim_matches(|c: char| matches!(c, '*' | '`' | '"' | '\'' | '.' | '[' | ']'))
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();

        Self::ALL
            .iter()
            .copied()
            .find(|c| c.label() == normalized)
    }

    /// Parse `raw`, falling back to [`Category::General`].
    pub fn coerce(raw: &str) -> Self {
        Self::coerce_within(raw, &Self::ALL)
    }

    /// Parse `raw` and require membership in `allowed`; anything else is
    /// [`Category::General`].
    pub fn coerce_within(raw: &str, allowed: &[Category]) -> Self {
        match Self::parse(raw) {
            Some(c) if allowed.contains(&c) => c,
            _ => {
                log::warn!("classifier: label {raw:?} outside the valid set, using general");
                Category::General
            }
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
