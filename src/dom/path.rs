use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

// ============================================================================
// Volatile identifier filters
// ============================================================================

/// Ids that are regenerated per render and must never anchor a selector:
/// UUIDs, trailing counters, and React `useId` values like `:r3a:`.
pub const DYNAMIC_ID_PATTERNS: &[&str] = &[
    r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
    r"\d{4,}$",
    r"^:[rR][A-Za-z0-9]+:$",
];

/// Classes emitted by CSS modules / CSS-in-JS toolchains.
pub const DYNAMIC_CLASS_PATTERNS: &[&str] = &[r"[_-][A-Za-z0-9]{5,}$", r"^(css|styles?|sc)-"];

/// Ascent stops at these; they never appear in a CSS path.
pub const ROOT_CONTAINER_TAGS: &[&str] = &["html", "body"];

/// Max stable classes kept per CSS path segment.
pub const MAX_PATH_CLASSES: usize = 2;

static DYNAMIC_ID_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(DYNAMIC_ID_PATTERNS));
static DYNAMIC_CLASS_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(DYNAMIC_CLASS_PATTERNS));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

pub fn is_dynamic_id(id: &str) -> bool {
    DYNAMIC_ID_RES.iter().any(|re| re.is_match(id))
}

pub fn is_dynamic_class(class: &str) -> bool {
    DYNAMIC_CLASS_RES.iter().any(|re| re.is_match(class))
}

/// The element's id, if present and safe to select on.
pub fn stable_id(id: Option<&str>) -> Option<&str> {
    id.map(str::trim)
        .filter(|id| !id.is_empty() && !is_dynamic_id(id))
}

/// Split a `class` attribute into an ordered, de-duplicated list.
pub fn class_list(raw: &str) -> Vec<String> {
    let mut classes: Vec<String> = Vec::new();
    for class in raw.split_whitespace() {
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
    }
    classes
}

/// Escape an identifier for use after `#` or `.` in a selector, following
/// the `CSS.escape()` algorithm.
pub fn css_escape(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    let first = ident.chars().next();

    for (i, c) in ident.chars().enumerate() {
        let leading_digit = c.is_ascii_digit() && (i == 0 || (i == 1 && first == Some('-')));
        match c {
            '\0' => out.push('\u{FFFD}'),
            '\u{1}'..='\u{1f}' | '\u{7f}' => out.push_str(&format!("\\{:x} ", c as u32)),
            _ if leading_digit => out.push_str(&format!("\\{:x} ", c as u32)),
            '-' if i == 0 && ident.len() == 1 => out.push_str("\\-"),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() => out.push(c),
            c => {
                out.push('\\');
                out.push(c);
            }
        }
    }
    out
}

// ============================================================================
// Path construction
// ============================================================================

fn child_elements<'a>(parent: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    parent.children().filter_map(ElementRef::wrap)
}

fn parent_element<'a>(el: ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.parent().and_then(ElementRef::wrap)
}

/// Absolute XPath from the document root, e.g. `/html/body/div[2]/button`.
///
/// A positional index is added only when the parent has more than one
/// child with the same tag.
pub fn build_xpath(element: ElementRef<'_>) -> String {
    let mut segments = Vec::new();
    let mut current = Some(element);

    while let Some(el) = current {
        let tag = el.value().name();
        let parent = parent_element(el);

        let segment = match parent {
            Some(p) => {
                let same_tag: Vec<_> = child_elements(p)
                    .filter(|c| c.value().name() == tag)
                    .collect();
                if same_tag.len() > 1 {
                    let pos = same_tag
                        .iter()
                        .position(|c| c.id() == el.id())
                        .map_or(1, |i| i + 1);
                    format!("{tag}[{pos}]")
                } else {
                    tag.to_string()
                }
            }
            None => tag.to_string(),
        };

        segments.push(segment);
        current = parent;
    }

    segments.reverse();
    format!("/{}", segments.join("/"))
}

/// CSS path anchored on the nearest stable id, e.g. `#app > ul > li.item:nth-child(3)`.
///
/// Dynamic ids are skipped at every level, so a volatile id on the leaf or
/// any ancestor never ends up in the path.
pub fn build_css_path(element: ElementRef<'_>) -> String {
    let mut segments = Vec::new();
    let mut current = Some(element);

    while let Some(el) = current {
        let tag = el.value().name();
        if ROOT_CONTAINER_TAGS.contains(&tag) {
            break;
        }

        if let Some(id) = stable_id(el.value().attr("id")) {
            segments.push(format!("#{}", css_escape(id)));
            break;
        }

        let mut segment = tag.to_string();
        let classes = class_list(el.value().attr("class").unwrap_or(""));
        for class in classes
            .iter()
            .filter(|c| !is_dynamic_class(c))
            .take(MAX_PATH_CLASSES)
        {
            segment.push('.');
            segment.push_str(&css_escape(class));
        }

        let parent = parent_element(el);
        if let Some(p) = parent {
            let siblings: Vec<_> = child_elements(p).collect();
            let same_tag = siblings.iter().filter(|s| s.value().name() == tag).count();
            if same_tag > 1 {
                let pos = siblings
                    .iter()
                    .position(|s| s.id() == el.id())
                    .map_or(1, |i| i + 1);
                segment.push_str(&format!(":nth-child({pos})"));
            }
        }

        segments.push(segment);
        current = parent;
    }

    if segments.is_empty() {
        // The element is itself a root container.
        return element.value().name().to_string();
    }

    segments.reverse();
    segments.join(" > ")
}
