use serde::Deserialize;
use thiserror::Error;

use crate::heal::heal_model::{HealingCandidate, Recommendation};

/// Structured answer expected from the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealPayload {
    pub found: bool,
    #[serde(default)]
    pub candidates: Vec<HealingCandidate>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
}

/// Why a model reply could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    #[error("reply contains no JSON block")]
    NoStructuredBlock,

    #[error("reply JSON does not match the heal schema: {0}")]
    InvalidJson(String),
}

/// Parse a model reply into a [`HealPayload`].
///
/// Looks for a fenced code block first (```` ```json ```` or a bare fence
/// holding an object), then falls back to the whole reply if it is a bare
/// JSON object. A recommendation pointing outside the candidate list is dropped.
pub fn parse_reply(text: &str) -> Result<HealPayload, ReplyError> {
    let block = structured_block(text).ok_or(ReplyError::NoStructuredBlock)?;

    let mut payload: HealPayload =
        serde_json::from_str(block).map_err(|e| ReplyError::InvalidJson(e.to_string()))?;

    if payload
        .recommendation
        .as_ref()
        .is_some_and(|r| r.index >= payload.candidates.len())
    {
        payload.recommendation = None;
    }

    Ok(payload)
}

/// The JSON text inside a reply, if any.
pub fn structured_block(text: &str) -> Option<&str> {
    fenced_blocks(text)
        .into_iter()
        .find(|(lang, body)| lang.eq_ignore_ascii_case("json") || body.starts_with('{'))
        .map(|(_, body)| body)
        .or_else(|| {
            let trimmed = text.trim();
            (trimmed.starts_with('{') && trimmed.ends_with('}')).then_some(trimmed)
        })
}

/// Every ```` ``` ```` fenced block as (info string, trimmed body).
fn fenced_blocks(text: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("```") {
        let after_fence = &rest[start + 3..];
        let (lang, body_start) = match after_fence.find('\n') {
            Some(nl) => (after_fence[..nl].trim(), &after_fence[nl + 1..]),
            None => break,
        };
        let Some(end) = body_start.find("```") else {
            break;
        };
        blocks.push((lang, body_start[..end].trim()));
        rest = &body_start[end + 3..];
    }

    blocks
}
