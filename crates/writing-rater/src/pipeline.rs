use std::sync::Arc;

use chrono::Utc;
use llm_common::messages::MessagesClient;
use serde_json::Value;
use tracing::{debug, info};

use crate::assemble::assemble;
use crate::error::AnalyzeError;
use crate::model::AnalysisResult;
use crate::normalize;
use crate::prompt::build_prompt_today;
use crate::validate::validate_payload;

/// Runs one request through validate -> prompt -> model call -> normalize -> assemble.
///
/// Holds no per-request state. The gateway is `None` when no credential was configured,
/// in which case every valid request fails with `NotConfigured` before any network call.
#[derive(Clone)]
pub struct Analyzer {
    gateway: Option<Arc<MessagesClient>>,
}

impl Analyzer {
    pub fn new(gateway: Option<Arc<MessagesClient>>) -> Self {
        Self { gateway }
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_some()
    }

    pub async fn analyze(&self, payload: &Value) -> Result<AnalysisResult, AnalyzeError> {
        let request = validate_payload(payload)?;
        let gateway = self.gateway.as_ref().ok_or(AnalyzeError::NotConfigured)?;

        let prompt = build_prompt_today(&request);
        debug!(
            criteria = request.criteria.len(),
            word_count = prompt.writing_info().word_count,
            character_count = prompt.writing_info().character_count,
            "prompt built"
        );

        let completion = gateway.complete(prompt.as_str()).await?;

        let extraction = normalize::extract(&completion.text);
        info!(strategy = extraction.strategy(), "model reply normalized");
        let scores = extraction.into_result()?;

        let result = assemble(scores, Utc::now());
        if let Some(overall) = result.overall() {
            info!(overall_score = %overall.score, "analysis complete");
        }
        Ok(result)
    }
}
