use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Stability thresholds
// ============================================================================
//
// Heuristic tuning values, not derived from measurement.

/// Confidence strictly above this is `High`.
pub const HIGH_STABILITY_THRESHOLD: f32 = 0.9;

/// Confidence strictly above this (and not high) is `Medium`.
pub const MEDIUM_STABILITY_THRESHOLD: f32 = 0.7;

/// Root-cause confidence assigned from the top candidate's stability.
pub const HIGH_STABILITY_CAUSE_CONFIDENCE: f32 = 0.9;
pub const MEDIUM_STABILITY_CAUSE_CONFIDENCE: f32 = 0.7;
pub const LOW_STABILITY_CAUSE_CONFIDENCE: f32 = 0.4;

/// Root-cause confidence when the failing selector matches a removed element.
pub const ELEMENT_REMOVED_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Low", alias = "LOW")]
    Low,
}

impl Stability {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > HIGH_STABILITY_THRESHOLD {
            Stability::High
        } else if confidence > MEDIUM_STABILITY_THRESHOLD {
            Stability::Medium
        } else {
            Stability::Low
        }
    }
}

/// A selector that stopped resolving, as reported by the test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorFailure {
    pub selector: String,

    /// What the element is supposed to be ("the login button").
    #[serde(default)]
    pub description: Option<String>,

    /// Free-form context: error message, test step, surrounding code.
    #[serde(default)]
    pub context: Option<String>,

    /// Page the selector was run against. Used by batch mode to find snapshots.
    #[serde(default)]
    pub url: Option<String>,

    /// Explicit snapshot to heal against, instead of the URL's latest.
    #[serde(default)]
    pub snapshot_id: Option<String>,

    #[serde(default)]
    pub test_file: Option<String>,
}

impl SelectorFailure {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            description: None,
            context: None,
            url: None,
            snapshot_id: None,
            test_file: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot_id: impl Into<String>) -> Self {
        self.snapshot_id = Some(snapshot_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingCandidate {
    pub selector: String,
    #[serde(alias = "code_template")]
    pub code_template: String,
    pub stability: Stability,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub index: usize,
    pub explanation: String,
}

/// Where a heal result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealResult {
    pub found: bool,
    pub candidates: Vec<HealingCandidate>,
    pub recommendation: Option<Recommendation>,
    pub source: HealSource,
}

impl HealResult {
    pub fn recommended(&self) -> Option<&HealingCandidate> {
        let index = self.recommendation.as_ref().map_or(0, |r| r.index);
        self.candidates.get(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RootCause {
    /// The element is still on the page under a different selector.
    SelectorChanged,
    /// The element the selector pointed at is gone from the page.
    ElementRemoved,
    Unknown,
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootCause::SelectorChanged => write!(f, "selector changed"),
            RootCause::ElementRemoved => write!(f, "element removed"),
            RootCause::Unknown => write!(f, "unknown"),
        }
    }
}

/// Batch-mode outcome for one failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureAnalysis {
    pub failure: SelectorFailure,
    pub root_cause: RootCause,
    pub confidence: f32,
    pub heal: Option<HealResult>,

    /// Set when this entry could not be processed at all.
    pub error: Option<String>,
}
