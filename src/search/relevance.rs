//! Generative relevance filtering.
//!
//! The similarity hits go through one more pass: a chat model is asked
//! to return only the ids that actually satisfy the query. Model output
//! is untrusted, so it goes through a strict parser — a JSON array of
//! integers that must be a subset of the candidate ids. On any provider
//! or parse failure the filter fails open: it logs a warning and keeps
//! the full ranked candidate list.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::provider::GenerativeProvider;
use crate::store::SearchHit;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that, given a list of candidate \
talent objects (with an \"id\" and \"summary\" field) and a search query, outputs only a \
JSON array of the IDs of those candidates that satisfy the query. If none match, return \
the people whose skills or experience can plausibly fit the query; if there are no such \
people, output an empty JSON array: []. Do not output any other text.";

/// Violations of the expected model output grammar.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OutputParseError {
    #[error("not valid JSON: {0}")]
    NotJson(String),

    #[error("not a JSON array")]
    NotAnArray,

    #[error("array element is not an integer: {0}")]
    NotAnInteger(String),

    #[error("id {0} is not among the candidates")]
    UnknownId(i64),
}

/// Parse model output into a validated id list.
///
/// Accepts an optional surrounding code fence, requires a JSON array of
/// integers, and enforces that every id is one of the candidates.
/// Duplicates are dropped, first occurrence wins.
pub fn parse_id_array(raw: &str, candidates: &HashSet<i64>) -> Result<Vec<i64>, OutputParseError> {
    let body = strip_code_fence(raw);

    let value: Value =
        serde_json::from_str(body).map_err(|err| OutputParseError::NotJson(err.to_string()))?;
    let items = value.as_array().ok_or(OutputParseError::NotAnArray)?;

    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .as_i64()
            .ok_or_else(|| OutputParseError::NotAnInteger(item.to_string()))?;
        if !candidates.contains(&id) {
            return Err(OutputParseError::UnknownId(id));
        }
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn strip_code_fence(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.trim_start();
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest.trim_end();
    }
    body
}

pub struct RelevanceFilter {
    model: Arc<dyn GenerativeProvider>,
}

impl RelevanceFilter {
    pub fn new(model: Arc<dyn GenerativeProvider>) -> Self {
        Self { model }
    }

    /// Narrow `hits` to the ids the model judges relevant to `query`.
    ///
    /// Always returns a subset of the input ids. Fail-open: a provider
    /// failure or rejected output keeps the full ranked list.
    pub fn filter(&self, query: &str, hits: &[SearchHit]) -> Vec<i64> {
        if hits.is_empty() {
            return vec![];
        }

        let ranked_ids: Vec<i64> = hits.iter().map(|h| h.talent_id).collect();
        let candidate_set: HashSet<i64> = ranked_ids.iter().copied().collect();

        let payload = json!({
            "query": query,
            "candidates": hits
                .iter()
                .map(|h| json!({ "id": h.talent_id, "summary": h.summary }))
                .collect::<Vec<_>>(),
        });
        let user = serde_json::to_string_pretty(&payload)
            .expect("candidate payload is always serializable");

        let raw = match self.model.complete(SYSTEM_PROMPT, &user) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("relevance filter call failed ({err}), failing open");
                return ranked_ids;
            }
        };

        match parse_id_array(&raw, &candidate_set) {
            Ok(ids) => ids,
            Err(err) => {
                log::warn!("relevance filter output rejected ({err}), failing open");
                ranked_ids
            }
        }
    }
}
