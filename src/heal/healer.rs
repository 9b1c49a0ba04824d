use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::diff::diff_model::DiffResult;
use crate::diff::structural::diff_markup;
use crate::dom::dom_model::ElementInfo;
use crate::dom::extractor::extract_interactive_elements;
use crate::heal::completion::{CompletionError, CompletionOptions, TextCompletion};
use crate::heal::heal_model::{
    ELEMENT_REMOVED_CONFIDENCE, FailureAnalysis, HIGH_STABILITY_CAUSE_CONFIDENCE, HealResult,
    HealSource, HealingCandidate, LOW_STABILITY_CAUSE_CONFIDENCE,
    MEDIUM_STABILITY_CAUSE_CONFIDENCE, Recommendation, RootCause, SelectorFailure, Stability,
};
use crate::heal::prompt::{DEFAULT_MARKUP_BUDGET, SYSTEM_PROMPT, build_heal_prompt};
use crate::heal::response::{HealPayload, ReplyError, parse_reply};
use crate::snapshot::error::StoreError;
use crate::snapshot::snapshot_model::Snapshot;
use crate::snapshot::store::SnapshotStore;

pub const BEST_MATCH_EXPLANATION: &str = "Best available match";

#[derive(Debug, Clone)]
pub struct HealerConfig {
    /// Upper bound on one model call; past it the heuristics answer instead.
    pub model_timeout: Duration,
    pub markup_budget: usize,
    pub max_candidates: usize,

    /// Heuristic candidates need a best locator strictly above this.
    pub min_confidence: f32,
    pub max_output_tokens: u32,
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            model_timeout: Duration::from_secs(30),
            markup_budget: DEFAULT_MARKUP_BUDGET,
            max_candidates: 5,
            min_confidence: 0.7,
            max_output_tokens: 2048,
        }
    }
}

/// Why the model path produced nothing usable.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Reply(#[from] ReplyError),
}

/// Why one batch entry could not be analyzed.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failure has neither a url nor a snapshot id")]
    MissingTarget,

    #[error("no snapshot found for {0}")]
    NoSnapshot(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Proposes replacement locators for selectors that stopped resolving.
///
/// Asks the language model first; any failure there (error, timeout,
/// unparseable reply) falls back to ranking the page's own locators.
pub struct SelectorHealer {
    completion: Arc<dyn TextCompletion>,
    config: HealerConfig,
}

impl SelectorHealer {
    pub fn new(completion: Arc<dyn TextCompletion>, config: HealerConfig) -> Self {
        Self { completion, config }
    }

    pub fn config(&self) -> &HealerConfig {
        &self.config
    }

    /// Heal one selector against the current markup.
    ///
    /// `previous_markup`, when given, is diffed against the current markup
    /// and summarized for the model. Never fails: a page with nothing usable
    /// yields `found = false` and no candidates.
    pub async fn heal_selector(
        &self,
        failure: &SelectorFailure,
        current_markup: &str,
        previous_markup: Option<&str>,
    ) -> HealResult {
        let diff = previous_markup.map(|prev| diff_markup(prev, current_markup));
        self.heal_with_diff(failure, current_markup, diff.as_ref())
            .await
    }

    async fn heal_with_diff(
        &self,
        failure: &SelectorFailure,
        markup: &str,
        diff: Option<&DiffResult>,
    ) -> HealResult {
        match self.ask_model(failure, markup, diff).await {
            Ok(payload) => {
                info!(
                    selector = %failure.selector,
                    found = payload.found,
                    candidates = payload.candidates.len(),
                    "model heal"
                );
                HealResult {
                    found: payload.found,
                    candidates: payload.candidates,
                    recommendation: payload.recommendation,
                    source: HealSource::Model,
                }
            }
            Err(reason) => {
                debug!(selector = %failure.selector, %reason, "falling back to heuristic heal");
                heuristic_heal(markup, &self.config)
            }
        }
    }

    /// One bounded model call, parsed into a typed payload.
    pub async fn ask_model(
        &self,
        failure: &SelectorFailure,
        markup: &str,
        diff: Option<&DiffResult>,
    ) -> Result<HealPayload, ModelError> {
        let prompt = build_heal_prompt(failure, markup, diff, self.config.markup_budget);
        let options = CompletionOptions {
            system: Some(SYSTEM_PROMPT.to_string()),
            max_output_tokens: Some(self.config.max_output_tokens),
        };

        let reply = tokio::time::timeout(
            self.config.model_timeout,
            self.completion.complete(&prompt, &options),
        )
        .await
        .map_err(|_| CompletionError::Timeout(self.config.model_timeout))??;

        Ok(parse_reply(&reply)?)
    }

    /// Analyze failures one at a time, in order.
    ///
    /// At most one model call is in flight and the output order matches the
    /// input. An entry that errors or panics is recorded as an unknown root
    /// cause with confidence 0; the batch continues.
    pub async fn heal_batch(
        &self,
        store: &SnapshotStore,
        failures: &[SelectorFailure],
    ) -> Vec<FailureAnalysis> {
        let mut results = Vec::with_capacity(failures.len());

        for failure in failures {
            let outcome = AssertUnwindSafe(self.analyze_failure(store, failure))
                .catch_unwind()
                .await;
            let analysis = match outcome {
                Ok(Ok(analysis)) => analysis,
                Ok(Err(e)) => {
                    warn!(selector = %failure.selector, error = %e, "failure analysis aborted");
                    unknown_cause(failure, e.to_string())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(selector = %failure.selector, %message, "failure analysis panicked");
                    unknown_cause(failure, format!("analysis panicked: {message}"))
                }
            };
            results.push(analysis);
        }

        results
    }

    async fn analyze_failure(
        &self,
        store: &SnapshotStore,
        failure: &SelectorFailure,
    ) -> Result<FailureAnalysis, AnalysisError> {
        let current = resolve_snapshot(store, failure).await?;
        let previous = store.get_before(&current).await?;
        let diff = previous
            .as_ref()
            .map(|prev| diff_markup(&prev.markup, &current.markup));

        let heal = self
            .heal_with_diff(failure, &current.markup, diff.as_ref())
            .await;
        let (root_cause, confidence) = classify_root_cause(failure, &heal, diff.as_ref());

        Ok(FailureAnalysis {
            failure: failure.clone(),
            root_cause,
            confidence,
            heal: Some(heal),
            error: None,
        })
    }
}

fn unknown_cause(failure: &SelectorFailure, error: String) -> FailureAnalysis {
    FailureAnalysis {
        failure: failure.clone(),
        root_cause: RootCause::Unknown,
        confidence: 0.0,
        heal: None,
        error: Some(error),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

async fn resolve_snapshot(
    store: &SnapshotStore,
    failure: &SelectorFailure,
) -> Result<Snapshot, AnalysisError> {
    match (&failure.snapshot_id, &failure.url) {
        (Some(id), _) => store
            .load(id)
            .await?
            .ok_or_else(|| AnalysisError::NoSnapshot(id.clone())),
        (None, Some(url)) => store
            .get_latest(url)
            .await?
            .ok_or_else(|| AnalysisError::NoSnapshot(url.clone())),
        (None, None) => Err(AnalysisError::MissingTarget),
    }
}

// ============================================================================
// Heuristic fallback
// ============================================================================

/// Rank the page's own elements by their best locator.
///
/// Keeps elements whose top locator scores above `min_confidence`, highest
/// first (document order on ties), capped at `max_candidates`.
pub fn heuristic_heal(markup: &str, config: &HealerConfig) -> HealResult {
    let mut ranked: Vec<_> = extract_interactive_elements(markup)
        .into_iter()
        .filter_map(|el| el.element.suggested_locators.into_iter().next())
        .filter(|locator| locator.confidence > config.min_confidence)
        .collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let candidates: Vec<HealingCandidate> = ranked
        .into_iter()
        .take(config.max_candidates)
        .map(|locator| HealingCandidate {
            stability: Stability::from_confidence(locator.confidence),
            reason: format!("Found via {}", locator.strategy),
            selector: locator.value,
            code_template: locator.code_template,
        })
        .collect();

    let recommendation = (!candidates.is_empty()).then(|| Recommendation {
        index: 0,
        explanation: BEST_MATCH_EXPLANATION.to_string(),
    });

    HealResult {
        found: !candidates.is_empty(),
        candidates,
        recommendation,
        source: HealSource::Heuristic,
    }
}

// ============================================================================
// Root cause
// ============================================================================

/// Best guess at why the selector broke, with a heuristic confidence.
pub fn classify_root_cause(
    failure: &SelectorFailure,
    heal: &HealResult,
    diff: Option<&DiffResult>,
) -> (RootCause, f32) {
    let removed = diff.is_some_and(|d| {
        d.removed
            .iter()
            .any(|el| element_matches_selector(el, &failure.selector))
    });
    if removed {
        return (RootCause::ElementRemoved, ELEMENT_REMOVED_CONFIDENCE);
    }

    match heal.recommended() {
        Some(candidate) if heal.found => {
            let confidence = match candidate.stability {
                Stability::High => HIGH_STABILITY_CAUSE_CONFIDENCE,
                Stability::Medium => MEDIUM_STABILITY_CAUSE_CONFIDENCE,
                Stability::Low => LOW_STABILITY_CAUSE_CONFIDENCE,
            };
            (RootCause::SelectorChanged, confidence)
        }
        _ => (RootCause::Unknown, 0.0),
    }
}

fn element_matches_selector(element: &ElementInfo, selector: &str) -> bool {
    let selector = selector.trim();
    element.css_path == selector
        || element.xpath == selector
        || element
            .suggested_locators
            .iter()
            .any(|l| l.value == selector || l.code_template == selector)
}
