/// Turns the model's free text into a validated result object.
///
/// Two tiers, both followed by the same required-key check:
/// 1. strict parse of the trimmed body, after stripping surrounding code fences
/// 2. parse of the outermost `{ ... }` substring (first `{` to last `}`)
///
/// All-or-nothing: a partially valid object is never returned.
use regex::Regex;
use serde_json::{Map, Value};

pub const REQUIRED_KEYS: [&str; 2] = ["overall", "writing_info"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("model reply contains no JSON object")]
    Format,

    #[error("model reply could not be parsed: {0}")]
    Parse(String),
}

/// How (or whether) a result object was recovered from the reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The reply was a bare JSON object.
    Parsed(Map<String, Value>),
    /// The reply was a JSON object wrapped in Markdown code fences.
    FenceStripped(Map<String, Value>),
    /// The object had to be cut out of surrounding prose.
    BraceRecovered(Map<String, Value>),
    Failed(NormalizeError),
}

impl Extraction {
    pub fn strategy(&self) -> &'static str {
        match self {
            Extraction::Parsed(_) => "parsed",
            Extraction::FenceStripped(_) => "fence_stripped",
            Extraction::BraceRecovered(_) => "brace_recovered",
            Extraction::Failed(_) => "failed",
        }
    }

    pub fn into_result(self) -> Result<Map<String, Value>, NormalizeError> {
        match self {
            Extraction::Parsed(map)
            | Extraction::FenceStripped(map)
            | Extraction::BraceRecovered(map) => Ok(map),
            Extraction::Failed(e) => Err(e),
        }
    }
}

pub fn extract(raw: &str) -> Extraction {
    let (body, fenced) = strip_fences(raw);

    if let Ok(map) = parse_with_required_keys(&body) {
        return if fenced {
            Extraction::FenceStripped(map)
        } else {
            Extraction::Parsed(map)
        };
    }

    let Some(candidate) = outermost_braces(&body) else {
        return Extraction::Failed(NormalizeError::Format);
    };

    match parse_with_required_keys(candidate) {
        Ok(map) => Extraction::BraceRecovered(map),
        Err(reason) => Extraction::Failed(NormalizeError::Parse(reason)),
    }
}

/// Remove a leading ```` ```lang ```` line and a trailing ```` ``` ```` from the trimmed
/// reply. Returns the trimmed remainder and whether any fence was removed.
fn strip_fences(raw: &str) -> (String, bool) {
    let opening = Regex::new(r"^```[A-Za-z0-9_+.\-]*[ \t]*(\r?\n)?").expect("valid regex");
    let closing = Regex::new(r"(\r?\n)?[ \t]*```$").expect("valid regex");

    let trimmed = raw.trim();
    let without_open = opening.replace(trimmed, "");
    let opened = without_open.len() != trimmed.len();
    let without_close = closing.replace(&without_open, "");
    let closed = without_close.len() != without_open.len();

    (without_close.trim().to_string(), opened || closed)
}

fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_with_required_keys(text: &str) -> Result<Map<String, Value>, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    let Value::Object(map) = value else {
        return Err("expected a JSON object".to_string());
    };
    if let Some(missing) = REQUIRED_KEYS.iter().find(|k| !map.contains_key(**k)) {
        return Err(format!("missing required key `{missing}`"));
    }
    Ok(map)
}
