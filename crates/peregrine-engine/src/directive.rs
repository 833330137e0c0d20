//! Parser for tool directives embedded in model output.
//!
//! The model requests tools with inline blocks:
//!
//! ```text
//! [TOOL_REQUEST]
//! Tool: weather
//! Location: Barcelona, Spain
//! Start_Date: 2026-09-10
//! End_Date: 2026-09-14
//! [END_TOOL_REQUEST]
//! ```
//!
//! Parsing is purely syntactic and never fails: malformed content simply
//! yields fewer (or emptier) invocations, and policy questions like
//! unknown tool names belong to the orchestrator. The regex lives only in
//! this module.

use std::sync::LazyLock;

use regex::Regex;

/// Matches one directive block, non-greedy so adjacent blocks stay separate.
static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[TOOL_REQUEST\](.*?)\[END_TOOL_REQUEST\]").unwrap()
});

/// Matches a field-start line: key at column zero, then a colon.
static FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_]*):[ \t]?(.*)$").unwrap());

/// One parsed tool invocation: an ordered field map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolInvocation {
    fields: Vec<(String, String)>,
}

impl ToolInvocation {
    /// Field value by key, case-insensitive. First match wins.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// The `Tool` field, trimmed and lowercased for dispatch.
    #[must_use]
    pub fn tool_name(&self) -> Option<String> {
        self.field("Tool")
            .map(|name| name.trim().to_ascii_lowercase())
    }

    /// Number of fields in the block.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Result of scanning one model response for directives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parsed {
    /// Response text with every directive block removed, trimmed.
    pub cleaned_text: String,
    /// Invocations in order of appearance.
    pub invocations: Vec<ToolInvocation>,
}

impl Parsed {
    /// Whether the response requested any tool.
    #[must_use]
    pub fn has_tool(&self) -> bool {
        !self.invocations.is_empty()
    }
}

/// Scan `text` for directive blocks.
///
/// Text with no blocks passes through unchanged (not even trimmed), so
/// tool-free responses are untouched.
#[must_use]
pub fn parse(text: &str) -> Parsed {
    if !BLOCK.is_match(text) {
        return Parsed {
            cleaned_text: text.to_owned(),
            invocations: Vec::new(),
        };
    }

    let invocations = BLOCK
        .captures_iter(text)
        .map(|captures| parse_block(&captures[1]))
        .collect();
    let cleaned_text = BLOCK.replace_all(text, "").trim().to_owned();

    Parsed {
        cleaned_text,
        invocations,
    }
}

/// Parse one block body into fields. `Key: value` lines start a field;
/// any other line continues the current field with its newline preserved.
fn parse_block(body: &str) -> ToolInvocation {
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in body.lines() {
        if let Some(captures) = FIELD.captures(line) {
            fields.push((captures[1].to_owned(), captures[2].to_owned()));
        } else if let Some((_, value)) = fields.last_mut() {
            value.push('\n');
            value.push_str(line);
        }
        // lines before the first field are dropped
    }
    for (_, value) in &mut fields {
        let trimmed = value.trim().to_owned();
        *value = trimmed;
    }
    ToolInvocation { fields }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
