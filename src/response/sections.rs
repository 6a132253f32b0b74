//! Typed view of model output as a sequence of `{header, body}` sections.
//!
//! A header is a markdown heading (`# …` through `###### …`), a line that is
//! entirely bold (`**Title:**`), or a classification line in any of those
//! decorations.  Text before the first header becomes a section with
//! `header: None`.
//!
//! The header vocabulary lives here as data: [`CLASSIFICATION_TITLE`] and
//! [`LEGACY_HEADERS`].

/// Title of the header that opens every final response.
pub const CLASSIFICATION_TITLE: &str = "Classification";

/// Placeholder used when the model never emitted a classification header.
pub const UNKNOWN_CLASSIFICATION: &str = "unknown";

/// Sections that echo raw input back; stripped from every final response.
pub const LEGACY_HEADERS: &[&str] = &[
    "Extracted Text",
    "Extracted Content",
    "Extracted Code",
    "OCR Output",
    "OCR Text",
    "Raw Input",
    "Raw Text",
    "Original Input",
    "Input Echo",
    "Transcription",
];

// ---------------------------------------------------------------------------
// Header recognition
// ---------------------------------------------------------------------------

/// Render the canonical classification header line.
pub fn classification_line(label: &str) -> String {
    format!("## {CLASSIFICATION_TITLE}: {label}")
}

/// Title of a heading line, without `#`/`**` decoration or a trailing colon.
///
/// Returns `None` for ordinary text lines.
pub fn heading_title(line: &str) -> Option<&str> {
    let t = line.trim();

    let inner = if let Some(rest) = t.strip_prefix('#') {
        let rest = rest.trim_start_matches('#');
        // `#hashtag` is text, `# Title` is a heading.
        if !rest.starts_with(' ') && !rest.is_empty() {
            return None;
        }
        if t.len() - rest.len() > 6 {
            return None;
        }
        rest.trim()
    } else if t.len() > 4 && t.starts_with("**") && t.ends_with("**") {
        &t[2..t.len() - 2]
    } else {
        return None;
    };

    let title = inner
        .trim_matches('*')
        .trim()
        .trim_end_matches(':')
        .trim_end_matches('*')
        .trim();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// If `line` is a classification header, return its (possibly empty) value.
///
/// Accepts `## Classification: x`, `**Classification:** x`,
/// `Classification: x` and similar decorations, case-insensitively.
pub fn classification_value(line: &str) -> Option<&str> {
    let t = line
        .trim()
        .trim_start_matches('#')
        .trim_start()
        .trim_start_matches('*')
        .trim_start();

    let head = t.get(..CLASSIFICATION_TITLE.len())?;
    if !head.eq_ignore_ascii_case(CLASSIFICATION_TITLE) {
        return None;
    }
    let rest = t[CLASSIFICATION_TITLE.len()..]
        .trim_start_matches('*')
        .trim_start();
    let rest = rest.strip_prefix(':')?;
    Some(rest.trim_start_matches('*').trim().trim_end_matches('*').trim())
}

pub fn is_classification_header(line: &str) -> bool {
    classification_value(line).is_some()
}

/// `true` for a heading whose title is one of [`LEGACY_HEADERS`].
pub fn is_legacy_header(line: &str) -> bool {
    heading_title(line).is_some_and(|title| {
        LEGACY_HEADERS
            .iter()
            .any(|legacy| legacy.eq_ignore_ascii_case(title))
    })
}

fn is_header(line: &str) -> bool {
    is_classification_header(line) || heading_title(line).is_some()
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

/// One header line plus the lines up to the next header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// The header line exactly as written; `None` for leading preamble.
    pub header: Option<String>,
    /// Body lines joined with `\n`.
    pub body: String,
}

impl Section {
    pub fn is_classification(&self) -> bool {
        self.header
            .as_deref()
            .is_some_and(is_classification_header)
    }

    /// Classification value, if this is the classification section.
    pub fn classification(&self) -> Option<&str> {
        self.header.as_deref().and_then(classification_value)
    }
}

/// Split `text` into sections.  Fenced code blocks are never split, even if
/// a line inside them looks like a heading (e.g. a Python comment).
pub fn parse(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut header: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            body.push(line);
            continue;
        }
        if !in_fence && is_header(line) {
            if header.is_some() || !body.is_empty() {
                sections.push(Section {
                    header: header.take(),
                    body: body.join("\n"),
                });
                body.clear();
            }
            header = Some(line.to_string());
        } else {
            body.push(line);
        }
    }

    if header.is_some() || !body.is_empty() {
        sections.push(Section {
            header,
            body: body.join("\n"),
        });
    }
    sections
}

/// Inverse of [`parse`] for the lines it saw.
pub fn render(sections: &[Section]) -> String {
    let mut out: Vec<&str> = Vec::new();
    for section in sections {
        if let Some(h) = &section.header {
            out.push(h);
        }
        if section.header.is_none() || !section.body.is_empty() {
            out.push(&section.body);
        }
    }
    out.join("\n")
}

/// Contents of every fenced code block, concatenated.
pub fn code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<CodeBlock> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(info) = trimmed.strip_prefix("```") {
            match current.take() {
                Some(block) => blocks.push(block),
                None => {
                    current = Some(CodeBlock {
                        info: info.trim().to_ascii_lowercase(),
                        code: String::new(),
                    })
                }
            }
            continue;
        }
        if let Some(block) = current.as_mut() {
            block.code.push_str(line);
            block.code.push('\n');
        }
    }
    // Unterminated fence: keep what we have.
    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

/// One fenced code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Lowercased info string after the opening fence (e.g. `python`).
    pub info: String,
    pub code: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
