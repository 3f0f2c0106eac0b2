use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request that has passed validation. Only `validate::validate_payload` builds these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub text: String,
    pub writing_type: String,
    /// Caller order, duplicates removed.
    pub criteria: Vec<String>,
}

/// Facts about the submitted text that the prompt asks the model to echo back
/// under `writing_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritingInfo {
    #[serde(rename = "type")]
    pub writing_type: String,
    pub word_count: usize,
    pub character_count: usize,
    pub analyzed_on: String,
    pub sample_text: String,
}

/// Score and feedback for one criterion (or `overall`).
///
/// Scores are whatever the model returned; the 1-10 range is requested in the prompt
/// but not enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: Value,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMeta {
    pub processed_at: String,
    pub version: String,
    pub service: String,
}

/// The object returned to the caller on success.
///
/// `scores` holds the model's object as parsed (criteria, `overall`, `writing_info`);
/// `_meta` is appended last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(flatten)]
    pub scores: Map<String, Value>,
    #[serde(rename = "_meta")]
    pub meta: ResultMeta,
}

impl AnalysisResult {
    pub fn criterion(&self, name: &str) -> Option<CriterionScore> {
        self.scores
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn overall(&self) -> Option<CriterionScore> {
        self.criterion("overall")
    }
}
