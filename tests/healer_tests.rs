use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use resilient_selectors::diff::structural::diff_markup;
use resilient_selectors::heal::completion::{
    CompletionError, CompletionOptions, MockCompletion, TextCompletion, UnavailableCompletion,
};
use resilient_selectors::heal::heal_model::{HealSource, RootCause, SelectorFailure, Stability};
use resilient_selectors::heal::healer::{
    BEST_MATCH_EXPLANATION, HealerConfig, SelectorHealer, heuristic_heal,
};
use resilient_selectors::heal::prompt::{build_heal_prompt, truncate_markup};
use resilient_selectors::heal::response::{ReplyError, parse_reply};
use resilient_selectors::snapshot::backend::MemoryBackend;
use resilient_selectors::snapshot::store::SnapshotStore;

use crate::common::fixtures::{ANONYMOUS_PAGE, LOGIN_PAGE};

mod common;

const MODEL_REPLY: &str = r#"The button lost its id but kept its test hook.

```json
{
  "found": true,
  "candidates": [
    {
      "selector": "[data-testid=login-btn]",
      "codeTemplate": "page.getByTestId('login-btn')",
      "stability": "High",
      "reason": "Same test id as before"
    }
  ],
  "recommendation": { "index": 0, "explanation": "Test ids survive restyling" }
}
```
"#;

fn offline_healer() -> SelectorHealer {
    SelectorHealer::new(Arc::new(UnavailableCompletion), HealerConfig::default())
}

fn failure() -> SelectorFailure {
    SelectorFailure::new("#submit-login").with_description("the login button")
}

/// Sleeps far longer than any test timeout.
struct StalledCompletion;

#[async_trait]
impl TextCompletion for StalledCompletion {
    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(MODEL_REPLY.to_string())
    }
}

/// Captures every request and answers with nothing parseable.
#[derive(Default)]
struct RecordingCompletion {
    requests: Mutex<Vec<(String, CompletionOptions)>>,
}

#[async_trait]
impl TextCompletion for RecordingCompletion {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        self.requests
            .lock()
            .unwrap()
            .push((prompt.to_string(), options.clone()));
        Ok("I am not sure.".to_string())
    }
}

// =========================================================================
// Reply parsing
// =========================================================================

#[test]
fn parses_fenced_json_reply() {
    let payload = parse_reply(MODEL_REPLY).unwrap();
    assert!(payload.found);
    assert_eq!(payload.candidates.len(), 1);
    assert_eq!(payload.candidates[0].stability, Stability::High);
    assert_eq!(payload.candidates[0].code_template, "page.getByTestId('login-btn')");
    assert_eq!(payload.recommendation.map(|r| r.index), Some(0));
}

#[test]
fn parses_untagged_fence_and_bare_object() {
    let untagged = "Here you go:\n```\n{\"found\": false}\n```";
    let payload = parse_reply(untagged).unwrap();
    assert!(!payload.found);
    assert!(payload.candidates.is_empty());
    assert_eq!(payload.recommendation, None);

    let bare = r#"  {"found": true, "candidates": [{"selector": "a", "code_template": "page.locator('a')", "stability": "low", "reason": "only link"}]}  "#;
    let payload = parse_reply(bare).unwrap();
    assert_eq!(payload.candidates[0].code_template, "page.locator('a')");
    assert_eq!(payload.candidates[0].stability, Stability::Low);
}

#[test]
fn rejects_replies_without_usable_json() {
    assert_eq!(
        parse_reply("The element is probably gone."),
        Err(ReplyError::NoStructuredBlock)
    );
    assert!(matches!(
        parse_reply("```json\n{\"candidates\": 3}\n```"),
        Err(ReplyError::InvalidJson(_))
    ));
}

#[test]
fn drops_recommendation_outside_candidate_list() {
    let reply = r#"{"found": true, "candidates": [{"selector": "a", "codeTemplate": "x", "stability": "medium", "reason": "r"}], "recommendation": {"index": 3, "explanation": "?"}}"#;
    let payload = parse_reply(reply).unwrap();
    assert_eq!(payload.candidates.len(), 1);
    assert_eq!(payload.recommendation, None);
}

#[test]
fn stability_thresholds_are_strict() {
    assert_eq!(Stability::from_confidence(0.95), Stability::High);
    assert_eq!(Stability::from_confidence(0.9), Stability::Medium);
    assert_eq!(Stability::from_confidence(0.8), Stability::Medium);
    assert_eq!(Stability::from_confidence(0.7), Stability::Low);
    assert_eq!(Stability::from_confidence(0.5), Stability::Low);
}

// =========================================================================
// Prompt
// =========================================================================

#[test]
fn prompt_describes_failure_and_recent_changes() {
    let before = r#"<div id="app"><button id="go">Go</button></div>"#;
    let after = r#"<div id="app"><a href="/go">Go</a></div>"#;
    let diff = diff_markup(before, after);

    let prompt = build_heal_prompt(&failure(), after, Some(&diff), 10_000);
    assert!(prompt.contains("- Selector: #submit-login"));
    assert!(prompt.contains("- Element: the login button"));
    assert!(prompt.contains("- Context: (none)"));
    assert!(prompt.contains("1 added, 1 removed, 0 modified"));
    assert!(prompt.contains("- removed: #go \"Go\""));
    assert!(prompt.contains("- added: #app > a \"Go\""));
    assert!(!prompt.contains("(truncated)"));

    let no_history = build_heal_prompt(&SelectorFailure::new("x"), after, None, 10_000);
    assert!(no_history.contains("(no previous snapshot)"));
    assert!(no_history.contains("- Element: (not described)"));
}

#[test]
fn truncation_respects_char_boundaries() {
    assert_eq!(truncate_markup("héllo", 2), "hé");
    assert_eq!(truncate_markup("abc", 10), "abc");
    assert_eq!(truncate_markup("", 0), "");
}

// =========================================================================
// Model path and fallback
// =========================================================================

#[tokio::test]
async fn model_answer_is_used_when_parseable() {
    let healer = SelectorHealer::new(
        Arc::new(MockCompletion::new(MODEL_REPLY)),
        HealerConfig::default(),
    );
    let result = healer.heal_selector(&failure(), LOGIN_PAGE, None).await;

    assert_eq!(result.source, HealSource::Model);
    assert!(result.found);
    assert_eq!(result.candidates[0].selector, "[data-testid=login-btn]");
    assert_eq!(
        result.recommended().map(|c| c.reason.as_str()),
        Some("Same test id as before")
    );
}

#[tokio::test]
async fn model_saying_not_found_is_taken_at_its_word() {
    let healer = SelectorHealer::new(
        Arc::new(MockCompletion::new(r#"{"found": false, "candidates": []}"#)),
        HealerConfig::default(),
    );
    let result = healer.heal_selector(&failure(), LOGIN_PAGE, None).await;

    assert_eq!(result.source, HealSource::Model);
    assert!(!result.found);
    assert!(result.candidates.is_empty());
}

#[tokio::test]
async fn garbage_reply_falls_back_to_heuristics() {
    let healer = SelectorHealer::new(
        Arc::new(MockCompletion::new("Sorry, I cannot help with that.")),
        HealerConfig::default(),
    );
    let result = healer.heal_selector(&failure(), LOGIN_PAGE, None).await;

    assert_eq!(result.source, HealSource::Heuristic);
    assert!(result.found);
}

#[tokio::test]
async fn unavailable_model_yields_ranked_heuristic_candidates() {
    let result = offline_healer()
        .heal_selector(&failure(), LOGIN_PAGE, None)
        .await;

    assert_eq!(result.source, HealSource::Heuristic);
    assert!(result.found);

    let selectors: Vec<&str> = result.candidates.iter().map(|c| c.selector.as_str()).collect();
    assert_eq!(selectors, vec!["login-btn", "Close dialog", "Home", "Help", "Terms"]);

    let top = &result.candidates[0];
    assert_eq!(top.stability, Stability::High);
    assert_eq!(top.reason, "Found via testId");
    assert_eq!(top.code_template, "page.getByTestId('login-btn')");
    assert_eq!(result.candidates[1].stability, Stability::Medium);
    assert!(result.candidates.iter().all(|c| c.stability != Stability::Low));

    let recommendation = result.recommendation.as_ref().unwrap();
    assert_eq!(recommendation.index, 0);
    assert_eq!(recommendation.explanation, BEST_MATCH_EXPLANATION);
}

#[tokio::test]
async fn heuristic_result_is_deterministic_and_capped() {
    let config = HealerConfig {
        max_candidates: 2,
        ..HealerConfig::default()
    };
    let first = heuristic_heal(LOGIN_PAGE, &config);
    let second = heuristic_heal(LOGIN_PAGE, &config);

    assert_eq!(first, second);
    assert_eq!(first.candidates.len(), 2);
}

#[tokio::test]
async fn page_without_strong_locators_is_not_found() {
    let result = offline_healer()
        .heal_selector(&failure(), ANONYMOUS_PAGE, None)
        .await;

    assert!(!result.found);
    assert!(result.candidates.is_empty());
    assert_eq!(result.recommendation, None);
}

#[tokio::test]
async fn stalled_model_is_abandoned_after_the_timeout() {
    let config = HealerConfig {
        model_timeout: Duration::from_millis(50),
        ..HealerConfig::default()
    };
    let healer = SelectorHealer::new(Arc::new(StalledCompletion), config);

    let started = Instant::now();
    let result = healer.heal_selector(&failure(), LOGIN_PAGE, None).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.source, HealSource::Heuristic);
    assert!(result.found);
}

#[tokio::test]
async fn model_sees_truncated_markup_and_system_prompt() {
    let recorder = Arc::new(RecordingCompletion::default());
    let healer = SelectorHealer::new(recorder.clone(), HealerConfig::default());

    let markup = format!("<main>{}</main>", "z".repeat(20_000));
    healer.heal_selector(&failure(), &markup, None).await;

    let requests = recorder.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);

    let (prompt, options) = &requests[0];
    let kept = &markup[..10_000];
    assert!(prompt.contains(kept));
    assert!(!prompt.contains(&markup[..10_001]));
    assert!(prompt.contains("(truncated)"));
    assert!(options.system.is_some());
    assert_eq!(options.max_output_tokens, Some(2048));
}

// =========================================================================
// Batch analysis
// =========================================================================

const APP_URL: &str = "https://app.example.com/login";
const OTHER_URL: &str = "https://app.example.com/settings";

async fn seeded_store() -> (SnapshotStore, String) {
    let store = SnapshotStore::new(Arc::new(MemoryBackend::new()));
    let day = |d: u32| Utc.with_ymd_and_hms(2024, 5, d, 9, 0, 0).unwrap();

    store
        .save_at(
            APP_URL,
            r#"<div id="app"><button data-testid="login-btn">Log in</button><a href="/help">Help</a></div>"#,
            None,
            BTreeMap::new(),
            day(1),
        )
        .await
        .unwrap();
    store
        .save_at(
            APP_URL,
            r#"<div id="app"><a href="/help">Help</a></div>"#,
            None,
            BTreeMap::new(),
            day(2),
        )
        .await
        .unwrap();
    let settings = store
        .save_at(
            OTHER_URL,
            r#"<button data-testid="save-settings">Save</button>"#,
            None,
            BTreeMap::new(),
            day(2),
        )
        .await
        .unwrap();
    store
        .save_at("https://app.example.com/bare", ANONYMOUS_PAGE, None, BTreeMap::new(), day(3))
        .await
        .unwrap();

    (store, settings.id)
}

#[tokio::test]
async fn batch_classifies_root_causes_in_input_order() {
    let (store, settings_id) = seeded_store().await;
    let failures = vec![
        SelectorFailure::new("#app > button").with_url(APP_URL),
        SelectorFailure::new("#save").with_snapshot(settings_id),
        SelectorFailure::new("#gone").with_url("https://app.example.com/bare"),
    ];

    let results = offline_healer().heal_batch(&store, &failures).await;
    assert_eq!(results.len(), 3);

    let removed = &results[0];
    assert_eq!(removed.failure.selector, "#app > button");
    assert_eq!(removed.root_cause, RootCause::ElementRemoved);
    assert_eq!(removed.confidence, 0.8);
    assert!(removed.error.is_none());

    let changed = &results[1];
    assert_eq!(changed.root_cause, RootCause::SelectorChanged);
    assert_eq!(changed.confidence, 0.9);
    let heal = changed.heal.as_ref().unwrap();
    assert_eq!(heal.candidates[0].selector, "save-settings");

    let unknown = &results[2];
    assert_eq!(unknown.root_cause, RootCause::Unknown);
    assert_eq!(unknown.confidence, 0.0);
    assert!(unknown.heal.as_ref().is_some_and(|h| !h.found));
    assert!(unknown.error.is_none());
}

#[tokio::test]
async fn batch_entries_fail_independently() {
    let (store, _) = seeded_store().await;
    let failures = vec![
        SelectorFailure::new("#a").with_url("https://never.example.com"),
        SelectorFailure::new("#b"),
        SelectorFailure::new("#c").with_snapshot("snapshot-00000000-20240101T000000000Z"),
        SelectorFailure::new("#d").with_url(OTHER_URL),
    ];

    let results = offline_healer().heal_batch(&store, &failures).await;
    let selectors: Vec<&str> = results.iter().map(|r| r.failure.selector.as_str()).collect();
    assert_eq!(selectors, vec!["#a", "#b", "#c", "#d"]);

    for failed in &results[..3] {
        assert_eq!(failed.root_cause, RootCause::Unknown);
        assert_eq!(failed.confidence, 0.0);
        assert!(failed.heal.is_none());
        assert!(failed.error.is_some());
    }
    assert!(
        results[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("neither a url nor a snapshot id"))
    );

    assert_eq!(results[3].root_cause, RootCause::SelectorChanged);
    assert!(results[3].error.is_none());
}

/// Panics on one selector and is otherwise unreachable.
struct PanickingCompletion;

#[async_trait]
impl TextCompletion for PanickingCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        if prompt.contains("- Selector: #explode") {
            panic!("completion backend crashed");
        }
        Err(CompletionError::Unavailable("offline".to_string()))
    }
}

#[tokio::test]
async fn batch_survives_a_panicking_entry() {
    let (store, _) = seeded_store().await;
    let failures = vec![
        SelectorFailure::new("#explode").with_url(OTHER_URL),
        SelectorFailure::new("#d").with_url(OTHER_URL),
    ];

    let healer = SelectorHealer::new(Arc::new(PanickingCompletion), HealerConfig::default());
    let results = healer.heal_batch(&store, &failures).await;
    assert_eq!(results.len(), 2);

    let crashed = &results[0];
    assert_eq!(crashed.failure.selector, "#explode");
    assert_eq!(crashed.root_cause, RootCause::Unknown);
    assert_eq!(crashed.confidence, 0.0);
    assert!(crashed.heal.is_none());
    assert!(
        crashed
            .error
            .as_deref()
            .is_some_and(|e| e.contains("panicked") && e.contains("completion backend crashed"))
    );

    assert_eq!(results[1].root_cause, RootCause::SelectorChanged);
    assert!(results[1].error.is_none());
}
