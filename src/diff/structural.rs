use std::collections::{BTreeMap, BTreeSet};

use crate::diff::diff_model::{DiffResult, ElementChange};
use crate::dom::dom_model::{ElementInfo, InteractiveElement};
use crate::dom::extractor::extract_interactive_elements;

/// Compare two markup documents by their interactive elements.
pub fn diff_markup(before: &str, after: &str) -> DiffResult {
    let before = extract_interactive_elements(before);
    let after = extract_interactive_elements(after);
    diff_elements(&before, &after)
}

/// Compare two extractions keyed by CSS path.
///
/// On a path collision within one side the last element wins. Results are
/// ordered by CSS path.
pub fn diff_elements(before: &[InteractiveElement], after: &[InteractiveElement]) -> DiffResult {
    let before_map = by_css_path(before);
    let after_map = by_css_path(after);

    let added = after_map
        .iter()
        .filter(|(path, _)| !before_map.contains_key(*path))
        .map(|(_, el)| (*el).clone())
        .collect();

    let removed = before_map
        .iter()
        .filter(|(path, _)| !after_map.contains_key(*path))
        .map(|(_, el)| (*el).clone())
        .collect();

    let modified = before_map
        .iter()
        .filter_map(|(path, b)| {
            let a = after_map.get(path)?;
            let changes = describe_changes(b, a);
            (!changes.is_empty()).then(|| ElementChange {
                before: (*b).clone(),
                after: (*a).clone(),
                changes,
            })
        })
        .collect();

    DiffResult {
        added,
        removed,
        modified,
    }
}

fn by_css_path(elements: &[InteractiveElement]) -> BTreeMap<&str, &ElementInfo> {
    elements
        .iter()
        .map(|el| (el.element.css_path.as_str(), &el.element))
        .collect()
}

fn describe_changes(before: &ElementInfo, after: &ElementInfo) -> Vec<String> {
    let mut changes = vec![];

    if before.text != after.text {
        changes.push(format!("text: \"{}\" -> \"{}\"", before.text, after.text));
    }

    if before.id != after.id {
        changes.push(format!(
            "id: {} -> {}",
            before.id.as_deref().unwrap_or("(none)"),
            after.id.as_deref().unwrap_or("(none)")
        ));
    }

    let before_classes: BTreeSet<_> = before.classes.iter().collect();
    let after_classes: BTreeSet<_> = after.classes.iter().collect();
    if before_classes != after_classes {
        changes.push(format!(
            "classes: [{}] -> [{}]",
            before.classes.join(" "),
            after.classes.join(" ")
        ));
    }

    changes
}
