//! Prompt text for every model call the pipeline makes.
//!
//! Per-category response templates are data ([`CategoryTemplate`]): a style
//! instruction plus the ordered section headers the answer must use.  The
//! builders here only assemble strings; they never call the model.

use crate::response::sections::{classification_line, CLASSIFICATION_TITLE};
use crate::solve::Category;
use crate::types::InputKind;

/// Marker the classifier's first output line starts with.
pub const LABEL_MARKER: &str = "CATEGORY:";

// ---------------------------------------------------------------------------
// Extraction instructions
// ---------------------------------------------------------------------------

pub const TRANSCRIBE_INSTRUCTION: &str = "\
Transcribe this audio clip verbatim. Reply with ONLY the transcript text, \
no commentary. If nothing intelligible is spoken, reply with an empty message.";

pub const EXTRACT_TEXT_INSTRUCTION: &str = "\
Extract all text from this image exactly as shown, including any code with \
its indentation. Reply with ONLY the extracted text, no commentary.";

/// Fixed instruction for extracting text from a binary payload of `kind`.
pub fn extraction_instruction(kind: InputKind) -> &'static str {
    match kind {
        InputKind::Audio => TRANSCRIBE_INSTRUCTION,
        InputKind::Screenshot | InputKind::Text => EXTRACT_TEXT_INSTRUCTION,
    }
}

// ---------------------------------------------------------------------------
// Category templates
// ---------------------------------------------------------------------------

/// Style instruction and required sections for one category.
#[derive(Debug)]
pub struct CategoryTemplate {
    pub category: Category,
    pub style: &'static str,
    pub sections: &'static [&'static str],
    /// Whether the classifier's inline answer is too loose for this category
    /// and a second, template-driven call is always made.
    pub strict_format: bool,
}

static TEMPLATES: [CategoryTemplate; 6] = [
    CategoryTemplate {
        category: Category::Algorithm,
        style: "You are an expert competitive programmer coaching a candidate through a \
                coding interview. Give a correct, optimal solution with clean, runnable code \
                including an entry point, and state complexities as \
                `Time Complexity: …` and `Space Complexity: …` lines.",
        sections: &[
            "Problem Understanding",
            "Approach",
            "Solution",
            "Complexity Analysis",
            "Edge Cases",
        ],
        strict_format: true,
    },
    CategoryTemplate {
        category: Category::SystemDesign,
        style: "You are a senior staff engineer running a system design interview. \
                Be concrete about components, data flow, and scaling numbers.",
        sections: &[
            "Requirements",
            "High-Level Design",
            "Components",
            "Data Model",
            "Scalability",
            "Trade-offs",
        ],
        strict_format: true,
    },
    CategoryTemplate {
        category: Category::Behavioral,
        style: "You are an interview coach helping a candidate answer a behavioral question \
                with the STAR method. Keep it first-person and specific.",
        sections: &["Situation", "Task", "Action", "Result", "Key Takeaways"],
        strict_format: false,
    },
    CategoryTemplate {
        category: Category::Technical,
        style: "You are a senior engineer answering a technical knowledge question \
                precisely, with a short example where it helps.",
        sections: &["Concept", "Explanation", "Example", "Common Pitfalls"],
        strict_format: false,
    },
    CategoryTemplate {
        category: Category::DebuggingOptimization,
        style: "You are a senior engineer debugging and optimizing code in an interview. \
                Identify the root cause, show the corrected code, and state complexities as \
                `Time Complexity: …` and `Space Complexity: …` lines.",
        sections: &[
            "Issue Analysis",
            "Root Cause",
            "Fixed Code",
            "Complexity Analysis",
            "Verification",
        ],
        strict_format: true,
    },
    CategoryTemplate {
        category: Category::General,
        style: "You are a helpful interview assistant. Answer clearly and concisely.",
        sections: &["Summary", "Details", "Next Steps"],
        strict_format: false,
    },
];

/// Template for `category`.
pub fn template(category: Category) -> &'static CategoryTemplate {
    TEMPLATES
        .iter()
        .find(|t| t.category == category)
        .unwrap_or(&TEMPLATES[TEMPLATES.len() - 1])
}

fn section_list(sections: &[&str]) -> String {
    sections
        .iter()
        .map(|s| format!("## {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn category_menu(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Combined classify-and-respond prompt over a (possibly shortened) snippet.
pub fn classification_prompt(snippet: &str, kind: InputKind) -> String {
    format!(
        "You are an interview assistant. The following content came from a {kind} input.\n\
         \n\
         1. On the FIRST line, write `{LABEL_MARKER} <label>` where <label> is exactly one of: {menu}.\n\
         2. Then write a structured answer using markdown `## ` section headers.\n\
         Do not repeat the input back.\n\
         \n\
         Content:\n{snippet}\n",
        kind = kind.label(),
        menu = category_menu(&Category::ALL),
    )
}

/// Category-specific generation prompt over the full content.
pub fn generation_prompt(category: Category, content: &str) -> String {
    let t = template(category);
    format!(
        "{style}\n\
         \n\
         Answer using exactly these sections, in order:\n{sections}\n\
         \n\
         Do not add a {CLASSIFICATION_TITLE} line and do not repeat the question.\n\
         \n\
         Question:\n{content}\n",
        style = t.style,
        sections = section_list(t.sections),
    )
}

/// Single-round-trip prompt for a batch of `image_count` screenshots.
///
/// `context` carries audio/text material captured alongside the images.
pub fn multi_image_prompt(image_count: usize, context: Option<&str>) -> String {
    let mut per_category = String::new();
    for c in Category::COMBINED {
        per_category.push_str(&format!(
            "- {}:\n{}\n",
            c.label(),
            section_list(template(c).sections)
        ));
    }

    let mut prompt = format!(
        "You are an expert interview assistant. The {image_count} attached screenshot(s) \
         together show ONE problem.\n\
         \n\
         Steps:\n\
         1. Read all text and code from every image.\n\
         2. Do NOT include the raw extracted text in your answer.\n\
         3. Classify the problem as exactly one of: {menu}.\n\
         4. Start your answer with the line `{header}` and nothing before it.\n\
         5. Then answer with the sections for that category:\n\
         {per_category}\
         \n\
         When you write code, name the language on a `Language: <name>` line, use a fenced \
         code block tagged with the language, and include an entry point (main function). \
         For algorithm and debugging problems include `Time Complexity:` and \
         `Space Complexity:` lines.\n",
        menu = category_menu(&Category::COMBINED),
        header = classification_line("<category>"),
    );

    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("\nAdditional context from the candidate:\n{ctx}\n"));
    }
    prompt
}

/// Debug-mode prompt combining the problem, a baseline solution and the
/// attached screenshots of the candidate's current attempt.
pub fn debug_prompt(problem_statement: &str, baseline: &str, image_count: usize) -> String {
    let t = template(Category::DebuggingOptimization);
    format!(
        "{style}\n\
         \n\
         Original problem:\n{problem_statement}\n\
         \n\
         Reference solution:\n{baseline}\n\
         \n\
         The {image_count} attached screenshot(s) show the candidate's current code, errors, \
         or test output. Compare it with the reference, explain what is wrong, and give the \
         corrected code.\n\
         \n\
         Start with the line `{header}`, then use exactly these sections:\n{sections}\n",
        style = t.style,
        header = classification_line(Category::DebuggingOptimization.label()),
        sections = section_list(t.sections),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
