//! JSON extraction: pull the object out of a free-form completion.
//!
//! Models asked for "JSON only" still tend to wrap it in prose or code fences,
//! so the completion is searched for the greedy span from the first `{` to the
//! last `}` (across newlines) and that span is parsed.
//!
//! The greedy span is a known weak spot: explanatory text with its own braces
//! before or after the object widens the span and the parse fails. It is kept
//! as-is; the parse error carries the exact span so the case is easy to spot.

use crate::error::JsonExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Locate the greedy `{ … }` span, if any.
pub fn find_json_span(completion: &str) -> Option<&str> {
    RE_OBJECT_SPAN.find(completion).map(|m| m.as_str())
}

/// Parse a span located by [`find_json_span`].
///
/// The result is returned as-is; no schema check is applied.
pub fn parse_span(span: &str) -> Result<Map<String, Value>, JsonExtractError> {
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        // A span that starts with '{' can only parse to an object.
        Ok(_) => unreachable!("brace-delimited span parsed to a non-object"),
        Err(source) => Err(JsonExtractError::Parse {
            source,
            span: span.to_string(),
        }),
    }
}

/// Find and parse the JSON object in `completion`.
///
/// Returns the span alongside the parsed map.
pub fn extract_json(completion: &str) -> Result<(&str, Map<String, Value>), JsonExtractError> {
    let span = find_json_span(completion).ok_or_else(|| JsonExtractError::NoJsonFound {
        completion: completion.to_string(),
    })?;
    let map = parse_span(span)?;
    Ok((span, map))
}
