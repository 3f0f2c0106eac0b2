/// Evaluation prompt rendering.
///
/// The prompt is a pure function of the request and the calendar date. It lists one
/// output key per criterion in caller order, then `overall`, then `writing_info`, and
/// pre-fills `writing_info` with values computed here so the model only has to echo them.
use chrono::NaiveDate;
use serde_json::Value;

use crate::model::{AnalysisRequest, WritingInfo};

const SAMPLE_CHARS: usize = 150;

/// Rendered prompt plus the text facts that went into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPrompt {
    body: String,
    info: WritingInfo,
}

impl ModelPrompt {
    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn writing_info(&self) -> &WritingInfo {
        &self.info
    }
}

pub fn build_prompt_today(request: &AnalysisRequest) -> ModelPrompt {
    build_prompt(request, chrono::Local::now().date_naive())
}

pub fn build_prompt(request: &AnalysisRequest, today: NaiveDate) -> ModelPrompt {
    let info = writing_info(request, today);

    let mut keys: Vec<String> = request
        .criteria
        .iter()
        .map(|c| {
            format!(
                "  {}: {{\"score\": [1-10], \"feedback\": \"[specific feedback]\"}}",
                quoted(c)
            )
        })
        .collect();
    keys.push(
        "  \"overall\": {\"score\": [1-10], \"feedback\": \"[overall assessment]\"}".to_string(),
    );
    keys.push(format!(
        "  \"writing_info\": {{\n    \"type\": {},\n    \"word_count\": {},\n    \"character_count\": {},\n    \"analyzed_on\": {},\n    \"sample_text\": {}\n  }}",
        quoted(&info.writing_type),
        info.word_count,
        info.character_count,
        quoted(&info.analyzed_on),
        quoted(&info.sample_text),
    ));

    let body = format!(
        "You are an experienced writing evaluator. Analyze this {kind} and provide scores (1-10) with feedback:\n\
\n\
TEXT: \"\"\"{text}\"\"\"\n\
\n\
Return ONLY valid JSON in this format:\n\
{{\n{keys}\n}}\n\
\n\
Respond with the JSON object only. Do not add explanations, prose, or Markdown code fences.",
        kind = request.writing_type.to_lowercase(),
        text = request.text,
        keys = keys.join(",\n"),
    );

    ModelPrompt { body, info }
}

fn writing_info(request: &AnalysisRequest, today: NaiveDate) -> WritingInfo {
    let character_count = request.text.chars().count();
    let mut sample_text: String = request.text.chars().take(SAMPLE_CHARS).collect();
    if character_count > SAMPLE_CHARS {
        sample_text.push_str("...");
    }

    WritingInfo {
        writing_type: request.writing_type.clone(),
        word_count: request.text.split_whitespace().count(),
        character_count,
        analyzed_on: today.format("%-m/%-d/%Y").to_string(),
        sample_text,
    }
}

/// JSON string literal, so quotes and control characters in user input stay escaped.
fn quoted(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}
