//! Request payload checks. Nothing here touches the network; a payload that fails
//! never reaches the prompt builder.
use serde_json::Value;

use crate::error::AnalyzeError;
use crate::model::AnalysisRequest;

pub const MIN_TEXT_CHARS: usize = 10;
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Validate a raw JSON payload of the form `{text, writingType, criteria}`.
///
/// Text presence and length are checked first so the length codes do not depend on the
/// other fields. Lengths are counted in characters on the untrimmed text.
pub fn validate_payload(payload: &Value) -> Result<AnalysisRequest, AnalyzeError> {
    let text = non_empty_str(payload.get("text")).ok_or(AnalyzeError::MissingFields)?;

    let chars = text.chars().count();
    if chars < MIN_TEXT_CHARS {
        return Err(AnalyzeError::TextTooShort { chars });
    }
    if chars > MAX_TEXT_CHARS {
        return Err(AnalyzeError::TextTooLong { chars });
    }

    let writing_type =
        non_empty_str(payload.get("writingType")).ok_or(AnalyzeError::MissingFields)?;
    let criteria = criteria_list(payload.get("criteria")).ok_or(AnalyzeError::MissingFields)?;

    Ok(AnalysisRequest {
        text: text.to_string(),
        writing_type: writing_type.to_string(),
        criteria,
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn criteria_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    let mut criteria: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let name = non_empty_str(Some(item))?;
        if !criteria.iter().any(|c| c == name) {
            criteria.push(name.to_string());
        }
    }
    (!criteria.is_empty()).then_some(criteria)
}
