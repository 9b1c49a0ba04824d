use crate::dom::dom_model::ElementInfo;
use crate::dom::path::{css_escape, stable_id};
use crate::locator::locator_model::{
    ARIA_LABEL_CONFIDENCE, CSS_PATH_CONFIDENCE, ID_CONFIDENCE, LocatorStrategy,
    MAX_ROLE_NAME_LEN, MAX_TEXT_LOCATOR_LEN, ROLE_CONFIDENCE, SuggestedLocator,
    TEST_ID_ATTRIBUTES, TEST_ID_CONFIDENCE, TEXT_CONFIDENCE,
};

/// Build the ranked locator list for one element.
///
/// Candidates are emitted in table order (test id, aria-label, role, text,
/// stable id, CSS path) and then stably sorted by confidence, highest first.
/// The CSS path rule always fires, so the result is never empty.
pub fn generate_locators(element: &ElementInfo) -> Vec<SuggestedLocator> {
    let mut locators = Vec::new();
    let text = element.text.as_str();
    let text_len = text.chars().count();

    if let Some(test_id) = test_id(element) {
        locators.push(locator(LocatorStrategy::TestId, test_id, TEST_ID_CONFIDENCE));
    }

    let aria_label = element.attr("aria-label").filter(|l| !l.trim().is_empty());
    if let Some(label) = aria_label {
        locators.push(locator(LocatorStrategy::AriaLabel, label, ARIA_LABEL_CONFIDENCE));
    }

    if let Some(role) = element.role().filter(|r| !r.trim().is_empty()) {
        let name = aria_label.or_else(|| {
            (!text.is_empty() && text_len <= MAX_ROLE_NAME_LEN).then_some(text)
        });
        if let Some(name) = name {
            locators.push(SuggestedLocator {
                strategy: LocatorStrategy::Role,
                value: format!("role={}[name=\"{}\"]", role, name.replace('"', "\\\"")),
                confidence: ROLE_CONFIDENCE,
                code_template: format!(
                    "page.getByRole('{}', {{ name: '{}' }})",
                    escape(role),
                    escape(name)
                ),
            });
        }
    }

    // Button-like anchors qualify twice; one text locator is enough.
    let short_text = !text.is_empty() && text_len < MAX_TEXT_LOCATOR_LEN;
    if short_text && (is_button_like(element) || element.tag == "a") {
        locators.push(locator(LocatorStrategy::Text, text, TEXT_CONFIDENCE));
    }

    if let Some(id) = stable_id(element.id.as_deref()) {
        locators.push(locator(
            LocatorStrategy::Css,
            &format!("#{}", css_escape(id)),
            ID_CONFIDENCE,
        ));
    }

    locators.push(locator(
        LocatorStrategy::Css,
        &element.css_path,
        CSS_PATH_CONFIDENCE,
    ));

    // Vec::sort_by is stable: ties keep emission order.
    locators.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    locators
}

/// The single highest-confidence locator for an element.
pub fn best_locator(element: &ElementInfo) -> SuggestedLocator {
    generate_locators(element)
        .into_iter()
        .next()
        .unwrap_or_else(|| locator(LocatorStrategy::Css, &element.css_path, CSS_PATH_CONFIDENCE))
}

/// Playwright expression that re-locates an element by the given strategy.
pub fn code_template(strategy: LocatorStrategy, value: &str) -> String {
    let value = escape(value);
    match strategy {
        LocatorStrategy::TestId => format!("page.getByTestId('{value}')"),
        LocatorStrategy::AriaLabel => format!("page.getByLabel('{value}')"),
        LocatorStrategy::Role => format!("page.locator('{value}')"),
        LocatorStrategy::Text => format!("page.getByText('{value}')"),
        LocatorStrategy::Css => format!("page.locator('{value}')"),
        LocatorStrategy::Xpath => format!("page.locator('xpath={value}')"),
    }
}

fn locator(strategy: LocatorStrategy, value: &str, confidence: f32) -> SuggestedLocator {
    SuggestedLocator {
        strategy,
        value: value.to_string(),
        confidence,
        code_template: code_template(strategy, value),
    }
}

fn test_id(element: &ElementInfo) -> Option<&str> {
    TEST_ID_ATTRIBUTES
        .iter()
        .filter_map(|attr| element.attr(attr))
        .find(|v| !v.trim().is_empty())
}

fn is_button_like(element: &ElementInfo) -> bool {
    element.tag == "button"
        || element.role() == Some("button")
        || (element.tag == "input"
            && matches!(element.attr("type"), Some("submit") | Some("button")))
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}
