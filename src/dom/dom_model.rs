use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::locator::locator_model::SuggestedLocator;

/// Max characters of visible text kept per element.
pub const MAX_TEXT_LEN: usize = 100;

/// One element pulled out of a markup snapshot.
///
/// Extraction is shallow: children are never recorded, only the element's
/// own attributes, trimmed text and the two identity paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub xpath: String,
    pub css_path: String,

    /// Ordered by confidence, highest first. Never empty.
    pub suggested_locators: Vec<SuggestedLocator>,
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.attr("role")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Button,
    Link,
    Input,
    Select,
    Textarea,
    Checkbox,
    Radio,
    Form,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub element: ElementInfo,
    #[serde(rename = "type")]
    pub element_type: ElementType,
}

/// A landmark region of the page and how much markup it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSection {
    pub name: String,
    pub selector: String,
    pub element_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    /// `name`, else `id`, else `field-{index}`.
    pub name: String,
    pub field_type: String,
    pub label: Option<String>,
    pub required: bool,
    pub locator: SuggestedLocator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub action: Option<String>,
    pub method: Option<String>,
    pub css_path: String,
    pub fields: Vec<FormField>,
}
