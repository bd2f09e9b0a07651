//! Classification prompt and response parsing.

use crate::error::{OllamaError, OllamaResult};
use serde::Deserialize;
use vellum_core::{Classification, ContentDomain, StructuralCategory};

pub(crate) const SYSTEM_PROMPT: &str = "You classify documents for a research knowledge base. \
Answer with a single JSON object and nothing else.";

/// Build the user prompt for one document.
///
/// Only the first `max_chars` characters of the text are sent.
pub fn build_classification_prompt(
    text: &str,
    metadata: &serde_json::Value,
    max_chars: usize,
) -> String {
    let excerpt: String = text.chars().take(max_chars).collect();
    let domains = ContentDomain::ALL
        .iter()
        .map(|d| d.label())
        .collect::<Vec<_>>()
        .join(", ");
    let categories = StructuralCategory::ALL
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Classify the document below.\n\n\
         Return JSON with exactly these keys:\n\
         - \"domain\": one of [{domains}]\n\
         - \"structural_category\": one of [{categories}]\n\
         - \"confidence\": a number between 0 and 1\n\
         - \"reasoning\": one short sentence\n\n\
         Structural hints: {metadata}\n\n\
         Document:\n{excerpt}"
    )
}

#[derive(Deserialize)]
struct RawClassification {
    #[serde(default)]
    domain: String,
    #[serde(alias = "category", alias = "structure")]
    structural_category: String,
    confidence: serde_json::Value,
    #[serde(default)]
    reasoning: String,
}

fn parse_confidence(value: &serde_json::Value) -> Option<f32> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().ok()?,
        _ => return None,
    };
    // Some models answer in percent
    let scaled = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
    scaled.is_finite().then_some(scaled as f32)
}

/// Parse the model's answer into a [`Classification`].
///
/// Tolerates prose or code fences around the JSON object.
pub fn parse_classification(response: &str) -> OllamaResult<Classification> {
    let start = response.find('{');
    let end = response.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => {
            return Err(OllamaError::ParseError(format!(
                "no JSON object in classifier output: {:.80}",
                response
            )))
        }
    };

    let raw: RawClassification = serde_json::from_str(json)
        .map_err(|e| OllamaError::ParseError(format!("classifier output: {}", e)))?;
    let confidence = parse_confidence(&raw.confidence).ok_or_else(|| {
        OllamaError::ParseError(format!("invalid confidence value {}", raw.confidence))
    })?;

    Ok(Classification::new(
        ContentDomain::from_label(&raw.domain),
        StructuralCategory::from_label(&raw.structural_category),
        confidence,
        raw.reasoning.trim(),
    ))
}
