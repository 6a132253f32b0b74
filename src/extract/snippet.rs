//! Keyword-scored excerpting of long inputs for the classification prompt.
//!
//! Inputs up to [`WORD_THRESHOLD`] words pass through untouched.  Longer
//! inputs are cut to their first [`WORD_THRESHOLD`] words when that window
//! hits at least one category keyword, otherwise to the first
//! [`SHORT_WINDOW`] words.  Either way [`CONTINUATION_MARKER`] is appended.
//! Only the classification prompt sees the excerpt; generation always gets
//! the full text.

use crate::solve::Category;

/// Word count above which inputs are excerpted.
pub const WORD_THRESHOLD: usize = 100;
/// Window used when no category keyword matches.
pub const SHORT_WINDOW: usize = 50;
/// Appended to every excerpt.
pub const CONTINUATION_MARKER: &str = "...";

// ---------------------------------------------------------------------------
// Static keyword dictionary
// ---------------------------------------------------------------------------

struct CategoryKeywords {
    category: Category,
    keywords: &'static [&'static str],
}

static KEYWORDS: &[CategoryKeywords] = &[
    CategoryKeywords {
        category: Category::Algorithm,
        keywords: &[
            "array",
            "string",
            "linked list",
            "tree",
            "graph",
            "sort",
            "binary search",
            "dynamic programming",
            "recursion",
            "hash",
            "subarray",
            "substring",
            "algorithm",
            "leetcode",
            "integer",
            "return the",
        ],
    },
    CategoryKeywords {
        category: Category::SystemDesign,
        keywords: &[
            "design a",
            "system design",
            "scalable",
            "scalability",
            "architecture",
            "load balancer",
            "microservice",
            "distributed",
            "database",
            "cache",
            "throughput",
            "high availability",
        ],
    },
    CategoryKeywords {
        category: Category::Behavioral,
        keywords: &[
            "tell me about",
            "a time when",
            "describe a situation",
            "conflict",
            "teammate",
            "leadership",
            "challenge you faced",
            "weakness",
            "strength",
            "disagree",
        ],
    },
    CategoryKeywords {
        category: Category::Technical,
        keywords: &[
            "what is",
            "explain",
            "difference between",
            "how does",
            "protocol",
            "garbage collection",
            "thread",
            "process",
            "virtual memory",
            "polymorphism",
        ],
    },
    CategoryKeywords {
        category: Category::DebuggingOptimization,
        keywords: &[
            "bug",
            "error",
            "exception",
            "debug",
            "fix",
            "optimize",
            "performance",
            "too slow",
            "time limit exceeded",
            "memory leak",
            "stack trace",
        ],
    },
];

// ---------------------------------------------------------------------------
// SnippetSelector
// ---------------------------------------------------------------------------

/// Deterministic excerpt selection; no model call.
///
/// # Example
/// ```rust
/// use interview_coach::extract::SnippetSelector;
///
/// let selector = SnippetSelector::new();
/// assert_eq!(selector.select("short question"), "short question");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct SnippetSelector;

impl SnippetSelector {
    pub fn new() -> Self {
        Self
    }

    /// Keyword hit count per category over `window` (case-insensitive
    /// substring matches, each keyword counted once).
    pub fn scores(&self, window: &str) -> Vec<(Category, usize)> {
        let lower = window.to_lowercase();
        KEYWORDS
            .iter()
            .map(|entry| {
                let count = entry
                    .keywords
                    .iter()
                    .filter(|kw| lower.contains(**kw))
                    .count();
                (entry.category, count)
            })
            .collect()
    }

    /// Excerpt `text` for classification.
    pub fn select(&self, text: &str) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() <= WORD_THRESHOLD {
            return text.to_string();
        }

        let window = words[..WORD_THRESHOLD].join(" ");
        let indicative = self.scores(&window).iter().any(|(_, score)| *score > 0);

        let excerpt = if indicative {
            window
        } else {
            log::debug!("snippet: no category keywords in first {WORD_THRESHOLD} words");
            words[..SHORT_WINDOW].join(" ")
        };
        format!("{excerpt}{CONTINUATION_MARKER}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
