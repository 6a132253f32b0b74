//! Final text clean-up applied to every response, whatever path produced it.
//!
//! Steps, in order:
//! 1. trim trailing whitespace on every line;
//! 2. drop each legacy section (see
//!    [`LEGACY_HEADERS`](super::sections::LEGACY_HEADERS)) up to the next
//!    blank line;
//! 3. cut everything from a second classification header onwards;
//! 4. collapse runs of blank lines to a single blank line and trim the ends.
//!
//! The transform is idempotent.

use super::sections::{is_classification_header, is_legacy_header};

#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseSanitizer;

impl ResponseSanitizer {
    pub fn new() -> Self {
        Self
    }

    pub fn sanitize(&self, text: &str) -> String {
        let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
        let lines = drop_legacy_blocks(lines);
        let lines = truncate_repeated_classification(lines);
        collapse_blank_runs(&lines)
    }
}

fn drop_legacy_blocks(lines: Vec<&str>) -> Vec<&str> {
    let mut kept = Vec::with_capacity(lines.len());
    let mut skipping = false;

    for line in lines {
        if skipping {
            if line.is_empty() {
                skipping = false;
                kept.push(line);
            }
            continue;
        }
        if is_legacy_header(line) {
            log::debug!("sanitize: dropping legacy section {line:?}");
            skipping = true;
            continue;
        }
        kept.push(line);
    }
    kept
}

fn truncate_repeated_classification(mut lines: Vec<&str>) -> Vec<&str> {
    let mut seen = false;
    let cut = lines.iter().position(|line| {
        if is_classification_header(line) {
            if seen {
                return true;
            }
            seen = true;
        }
        false
    });
    if let Some(idx) = cut {
        log::debug!("sanitize: repeated classification header at line {idx}, truncating");
        lines.truncate(idx);
    }
    lines
}

fn collapse_blank_runs(lines: &[&str]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_empty() && out.last().is_some_and(|prev| prev.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
