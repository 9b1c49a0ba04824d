use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::dom::dom_model::{
    ElementInfo, ElementType, FormField, FormSummary, InteractiveElement, MAX_TEXT_LEN,
    PageSection,
};
use crate::dom::path::{build_css_path, build_xpath, class_list};
use crate::locator::generator::{best_locator, generate_locators};

// ============================================================================
// Selector tables
// ============================================================================

/// Everything a test is likely to click, type into, or toggle.
pub const INTERACTIVE_SELECTORS: &[&str] = &[
    "button",
    "a[href]",
    "input",
    "select",
    "textarea",
    "[role=\"button\"]",
    "[role=\"link\"]",
    "[role=\"checkbox\"]",
    "[role=\"radio\"]",
    "[role=\"switch\"]",
    "[role=\"tab\"]",
    "[role=\"menuitem\"]",
    "[onclick]",
    "[tabindex]",
];

/// Landmark regions reported by [`get_page_sections`], as (name, selector).
pub const SECTION_SELECTORS: &[(&str, &str)] = &[
    ("header", "header"),
    ("nav", "nav"),
    ("main", "main"),
    ("aside", "aside"),
    ("footer", "footer"),
    ("banner", "[role=\"banner\"]"),
    ("navigation", "[role=\"navigation\"]"),
    ("main-content", "[role=\"main\"]"),
    ("complementary", "[role=\"complementary\"]"),
    ("contentinfo", "[role=\"contentinfo\"]"),
    ("form", "form"),
];

const FORM_FIELD_SELECTOR: &str = "input, select, textarea";

static INTERACTIVE: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse(&INTERACTIVE_SELECTORS.join(", ")).ok());
static FORMS: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("form").ok());
static FORM_FIELDS: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse(FORM_FIELD_SELECTOR).ok());
static LABELS: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("label[for]").ok());

// ============================================================================
// Element extraction
// ============================================================================

/// Extract every interactive element from a markup document, in document order.
///
/// Malformed or partial markup is parsed leniently; a page with no
/// interactive elements yields an empty list.
pub fn extract_interactive_elements(markup: &str) -> Vec<InteractiveElement> {
    let document = Html::parse_document(markup);
    let Some(selector) = INTERACTIVE.as_ref() else {
        return Vec::new();
    };

    document
        .select(selector)
        .map(|el| {
            let element = element_info(el);
            let element_type = determine_element_type(&element);
            InteractiveElement {
                element,
                element_type,
            }
        })
        .collect()
}

/// Build the shallow record for one element, locators included.
pub fn element_info(el: ElementRef<'_>) -> ElementInfo {
    let value = el.value();

    let attributes: BTreeMap<String, String> = value
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let mut info = ElementInfo {
        tag: value.name().to_lowercase(),
        id: value.attr("id").filter(|id| !id.is_empty()).map(String::from),
        classes: class_list(value.attr("class").unwrap_or("")),
        attributes,
        text: element_text(el),
        xpath: build_xpath(el),
        css_path: build_css_path(el),
        suggested_locators: Vec::new(),
    };
    info.suggested_locators = generate_locators(&info);
    info
}

fn element_text(el: ElementRef<'_>) -> String {
    let text: String = el.text().collect();
    text.trim().chars().take(MAX_TEXT_LEN).collect()
}

/// Classify an element. Checked in order: button semantics, anchor,
/// select, textarea, form, input sub-types, then other.
pub fn determine_element_type(element: &ElementInfo) -> ElementType {
    let tag = element.tag.as_str();

    if tag == "button" || element.role() == Some("button") {
        return ElementType::Button;
    }

    match tag {
        "a" => ElementType::Link,
        "select" => ElementType::Select,
        "textarea" => ElementType::Textarea,
        "form" => ElementType::Form,
        "input" => match element.attr("type").map(str::to_lowercase).as_deref() {
            Some("checkbox") => ElementType::Checkbox,
            Some("radio") => ElementType::Radio,
            Some("submit") | Some("button") => ElementType::Button,
            _ => ElementType::Input,
        },
        _ => ElementType::Other,
    }
}

// ============================================================================
// Page structure
// ============================================================================

/// Landmark regions present on the page, with their descendant element counts.
pub fn get_page_sections(markup: &str) -> Vec<PageSection> {
    let document = Html::parse_document(markup);

    SECTION_SELECTORS
        .iter()
        .filter_map(|(name, css)| {
            let selector = Selector::parse(css).ok()?;
            let matches: Vec<_> = document.select(&selector).collect();
            if matches.is_empty() {
                return None;
            }
            let element_count = matches.iter().map(|m| descendant_count(*m)).sum();
            Some(PageSection {
                name: name.to_string(),
                selector: css.to_string(),
                element_count,
            })
        })
        .collect()
}

fn descendant_count(el: ElementRef<'_>) -> usize {
    // descendants() yields the element itself first.
    el.descendants()
        .filter_map(ElementRef::wrap)
        .count()
        .saturating_sub(1)
}

/// Every form on the page with its labelled fields.
pub fn get_form_fields(markup: &str) -> Vec<FormSummary> {
    let document = Html::parse_document(markup);
    let (Some(forms), Some(fields)) = (FORMS.as_ref(), FORM_FIELDS.as_ref()) else {
        return Vec::new();
    };

    let labels_by_for: BTreeMap<String, String> = LABELS
        .as_ref()
        .map(|sel| {
            let mut map = BTreeMap::new();
            for label in document.select(sel) {
                if let Some(target) = label.value().attr("for") {
                    // First label for an id wins, as in a browser.
                    map.entry(target.to_string())
                        .or_insert_with(|| element_text(label));
                }
            }
            map
        })
        .unwrap_or_default();

    document
        .select(forms)
        .map(|form| {
            let fields = form
                .select(fields)
                .enumerate()
                .map(|(index, field)| form_field(field, index, &labels_by_for))
                .collect();

            let attr = |name: &str| form.value().attr(name).map(String::from);
            FormSummary {
                id: attr("id"),
                name: attr("name"),
                action: attr("action"),
                method: attr("method"),
                css_path: build_css_path(form),
                fields,
            }
        })
        .collect()
}

fn form_field(
    field: ElementRef<'_>,
    index: usize,
    labels_by_for: &BTreeMap<String, String>,
) -> FormField {
    let value = field.value();
    let info = element_info(field);

    let label = value
        .attr("id")
        .and_then(|id| labels_by_for.get(id).cloned())
        .or_else(|| wrapping_label(field))
        .filter(|l| !l.is_empty());

    let name = value
        .attr("name")
        .filter(|n| !n.is_empty())
        .or_else(|| value.attr("id").filter(|id| !id.is_empty()))
        .map(String::from)
        .unwrap_or_else(|| format!("field-{index}"));

    let field_type = match value.name() {
        "input" => value.attr("type").unwrap_or("text").to_lowercase(),
        other => other.to_string(),
    };

    FormField {
        name,
        field_type,
        label,
        required: value.attr("required").is_some(),
        locator: best_locator(&info),
    }
}

fn wrapping_label(field: ElementRef<'_>) -> Option<String> {
    field
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "label")
        .map(element_text)
}
