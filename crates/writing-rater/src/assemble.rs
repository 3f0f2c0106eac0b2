use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::model::{AnalysisResult, ResultMeta};

pub const SERVICE_NAME: &str = "writing-rater";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Attach `_meta` to a normalized result. A `_meta` key supplied by the model is replaced.
pub fn assemble(scores: Map<String, Value>, processed_at: DateTime<Utc>) -> AnalysisResult {
    let mut scores = scores;
    scores.remove("_meta");
    AnalysisResult {
        scores,
        meta: ResultMeta {
            processed_at: processed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            version: SERVICE_VERSION.to_string(),
            service: SERVICE_NAME.to_string(),
        },
    }
}
