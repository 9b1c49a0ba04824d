use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Confidence table
// ============================================================================
//
// Heuristic tuning values, not derived from measurement.

pub const TEST_ID_CONFIDENCE: f32 = 0.95;
pub const ARIA_LABEL_CONFIDENCE: f32 = 0.90;
pub const ROLE_CONFIDENCE: f32 = 0.85;
pub const TEXT_CONFIDENCE: f32 = 0.80;
pub const ID_CONFIDENCE: f32 = 0.70;
pub const CSS_PATH_CONFIDENCE: f32 = 0.50;

/// Text locators require strictly fewer characters than this.
pub const MAX_TEXT_LOCATOR_LEN: usize = 50;

/// Role locators accept an accessible name up to this many characters.
pub const MAX_ROLE_NAME_LEN: usize = 50;

/// Attributes treated as explicit test hooks, checked in order.
pub const TEST_ID_ATTRIBUTES: &[&str] = &["data-testid", "data-test-id", "data-test", "data-cy"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocatorStrategy {
    TestId,
    AriaLabel,
    Role,
    Text,
    Css,
    Xpath,
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocatorStrategy::TestId => "testId",
            LocatorStrategy::AriaLabel => "ariaLabel",
            LocatorStrategy::Role => "role",
            LocatorStrategy::Text => "text",
            LocatorStrategy::Css => "css",
            LocatorStrategy::Xpath => "xpath",
        };
        f.write_str(name)
    }
}

/// A candidate way to re-find an element, with a heuristic stability score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedLocator {
    pub strategy: LocatorStrategy,
    pub value: String,
    pub confidence: f32,
    pub code_template: String,
}
