use crate::diff::diff_model::DiffResult;
use crate::heal::heal_model::SelectorFailure;

/// Markup characters embedded in the prompt by default.
pub const DEFAULT_MARKUP_BUDGET: usize = 10_000;

/// Changed elements listed per diff category in the prompt.
const MAX_DIFF_ENTRIES: usize = 10;

pub const SYSTEM_PROMPT: &str = "You repair broken end-to-end test selectors. \
Prefer test ids, accessible labels and roles over structural CSS. \
Answer with a single JSON object in a ```json fenced block.";

/// First `budget` characters of the markup, cut on a char boundary.
pub fn truncate_markup(markup: &str, budget: usize) -> &str {
    match markup.char_indices().nth(budget) {
        Some((byte_idx, _)) => &markup[..byte_idx],
        None => markup,
    }
}

/// Build the heal prompt for one failing selector.
pub fn build_heal_prompt(
    failure: &SelectorFailure,
    markup: &str,
    diff: Option<&DiffResult>,
    markup_budget: usize,
) -> String {
    let page = truncate_markup(markup, markup_budget);
    let truncated_note = if page.len() < markup.len() {
        " (truncated)"
    } else {
        ""
    };

    format!(
        r##"A test selector no longer matches any element on the page.

FAILURE:
- Selector: {selector}
- Element: {description}
- Context: {context}

RECENT PAGE CHANGES:
{changes}

CURRENT PAGE MARKUP{truncated_note}:
```html
{page}
```

Return ONLY a JSON object matching this schema, inside a ```json fenced block:
{{
  "found": true,
  "candidates": [
    {{
      "selector": "replacement selector",
      "codeTemplate": "page.getByTestId('...')",
      "stability": "high|medium|low",
      "reason": "why this element is the one the test meant"
    }}
  ],
  "recommendation": {{ "index": 0, "explanation": "why this candidate is best" }}
}}

If no element on the page matches, return {{"found": false, "candidates": []}}."##,
        selector = failure.selector,
        description = failure.description.as_deref().unwrap_or("(not described)"),
        context = failure.context.as_deref().unwrap_or("(none)"),
        changes = diff.map_or_else(|| "(no previous snapshot)".to_string(), summarize_diff),
    )
}

fn summarize_diff(diff: &DiffResult) -> String {
    if diff.is_empty() {
        return "(no interactive elements changed)".to_string();
    }

    let mut lines = vec![format!("- {}", diff.summary())];
    for el in diff.removed.iter().take(MAX_DIFF_ENTRIES) {
        lines.push(format!("- removed: {} \"{}\"", el.css_path, el.text));
    }
    for el in diff.added.iter().take(MAX_DIFF_ENTRIES) {
        lines.push(format!("- added: {} \"{}\"", el.css_path, el.text));
    }
    for change in diff.modified.iter().take(MAX_DIFF_ENTRIES) {
        lines.push(format!(
            "- modified: {} ({})",
            change.after.css_path,
            change.changes.join("; ")
        ));
    }
    lines.join("\n")
}
