//! Turns free-form model replies into structured results.
//!
//! The model is asked for JSON but nothing enforces it, so a reply is tried as
//! JSON directly, then as the span between its outermost braces, then as each
//! balanced `{...}` block in turn. Whatever object parses first is returned
//! untouched. When nothing parses, or the call itself failed, a fixed fallback
//! shape is returned instead so callers always get something renderable.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{MedicError, Result};
use crate::models::{Analysis, Confidence, Diagnosis, DiagnosisList, SoapSummary};

/// Degraded results for when the model cannot be used.
pub trait Fallback: Sized {
    /// The reply arrived but held no parseable JSON object.
    fn unparseable(raw_response: &str) -> Self;

    /// The call failed before a reply was available.
    fn call_failed(error: &MedicError) -> Self;
}

impl Fallback for SoapSummary {
    fn unparseable(raw_response: &str) -> Self {
        SoapSummary {
            subjective: "Error parsing model response as JSON".into(),
            objective: "Original response included below".into(),
            assessment: String::new(),
            plan: String::new(),
            raw_response: Some(raw_response.to_string()),
        }
    }

    fn call_failed(error: &MedicError) -> Self {
        SoapSummary {
            subjective: "Error calling LLM API".into(),
            objective: format!("Error: {error}"),
            assessment: String::new(),
            plan: String::new(),
            raw_response: None,
        }
    }
}

impl Fallback for DiagnosisList {
    fn unparseable(raw_response: &str) -> Self {
        DiagnosisList {
            diagnoses: vec![Diagnosis {
                name: "Response Parsing Error".into(),
                explanation: "Could not parse model response as JSON".into(),
                evidence: Vec::new(),
                confidence: Confidence::NotAvailable,
                follow_up: vec!["Please review the raw response".into()],
            }],
            raw_response: Some(raw_response.to_string()),
        }
    }

    fn call_failed(error: &MedicError) -> Self {
        DiagnosisList {
            diagnoses: vec![Diagnosis {
                name: "API Error".into(),
                explanation: format!("Error calling LLM API: {error}"),
                evidence: Vec::new(),
                confidence: Confidence::NotAvailable,
                follow_up: vec!["Check API configuration and try again".into()],
            }],
            raw_response: None,
        }
    }
}

/// Interpret the outcome of a model call.
///
/// Only configuration errors are returned as `Err`; every other failure is
/// folded into the fallback value.
pub fn interpret<T: Fallback>(outcome: Result<String>) -> Result<Analysis<T>> {
    match outcome {
        Ok(reply) => Ok(interpret_reply(&reply)),
        Err(e) if e.is_config() => Err(e),
        Err(e) => {
            warn!(error = %e, "LLM call failed, returning fallback");
            Ok(Analysis::Fallback(T::call_failed(&e)))
        }
    }
}

pub fn interpret_reply<T: Fallback>(reply: &str) -> Analysis<T> {
    match parse_reply(reply) {
        Some(object) => Analysis::Structured(Value::Object(object)),
        None => {
            warn!(chars = reply.len(), "Model reply is not valid JSON, returning fallback");
            Analysis::Fallback(T::unparseable(reply))
        }
    }
}

/// Recover a JSON object from a reply that may wrap it in prose or code fences.
pub fn parse_reply(reply: &str) -> Option<Map<String, Value>> {
    let trimmed = reply.trim();

    if trimmed.starts_with('{') {
        if let Some(object) = parse_object(trimmed) {
            return Some(object);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Some(object) = parse_object(&trimmed[start..=end]) {
                return Some(object);
            }
        }
    }

    balanced_blocks(trimmed).into_iter().find_map(parse_object)
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(candidate) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Every brace-balanced `{...}` span in order of its opening brace, found in
/// one pass. Braces inside JSON string literals are skipped and quotes outside
/// any block are ignored.
fn balanced_blocks(text: &str) -> Vec<&str> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i + 1));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable();
    spans.into_iter().map(|(start, end)| &text[start..end]).collect()
}
