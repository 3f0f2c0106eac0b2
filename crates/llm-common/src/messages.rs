use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GatewayError;

#[derive(Clone, Debug)]
pub struct MessagesClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_error_body_bytes: usize,
}

impl Default for MessagesClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_version: "2023-06-01".to_string(),
            max_tokens: 1500,
            timeout: Duration::from_secs(25),
            max_error_body_bytes: 8 * 1024,
        }
    }
}

impl MessagesClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank or unparsable values fall back to
    /// the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_blank = |name: &str| lookup(name).filter(|s| !s.trim().is_empty());

        let base_url = non_blank("ANTHROPIC_BASE_URL").unwrap_or(defaults.base_url);

        let model = non_blank("ANTHROPIC_MODEL").unwrap_or(defaults.model);

        let api_version = non_blank("ANTHROPIC_VERSION").unwrap_or(defaults.api_version);

        let max_tokens = non_blank("ANTHROPIC_MAX_TOKENS")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_tokens);

        let timeout = non_blank("ANTHROPIC_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&n| n > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let max_error_body_bytes = non_blank("ANTHROPIC_MAX_ERROR_BODY_BYTES")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(defaults.max_error_body_bytes);

        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            model,
            api_version,
            max_tokens,
            timeout,
            max_error_body_bytes,
        }
    }
}

/// Text produced by one successful completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: Option<String>,
    pub stop_reason: Option<String>,
    pub usage: Option<MessagesUsage>,
}

/// Client for a Messages-style completion endpoint (`POST {base_url}/messages`).
///
/// The credential is handed in at construction and reused for every call. Each call is a
/// single outbound request bounded by `config.timeout`; there is no retry loop here.
#[derive(Clone)]
pub struct MessagesClient {
    config: MessagesClientConfig,
    api_key: String,
    http: reqwest::Client,
}

impl MessagesClient {
    pub fn new(
        config: MessagesClientConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("writing-rater/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config,
            api_key: api_key.into(),
            http,
        })
    }

    pub fn config(&self) -> &MessagesClientConfig {
        &self.config
    }

    /// Send a single user prompt and return the generated text.
    ///
    /// The deadline covers connecting, sending, and reading the whole body. When it elapses
    /// the in-flight request is dropped and `GatewayError::Timeout` is returned.
    pub async fn complete(&self, prompt: &str) -> Result<Completion, GatewayError> {
        let url = format!("{}/messages", self.config.base_url);
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![MessageParam {
                role: "user",
                content: prompt,
            }],
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, async {
            let resp = self
                .http
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", &self.config.api_version)
                .json(&request)
                .send()
                .await?;
            self.read_completion(resp).await
        })
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Err(GatewayError::Request(e))) if e.is_timeout() => {
                Err(GatewayError::Timeout(self.config.timeout))
            }
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.timeout)),
        };

        match &result {
            Ok(completion) => debug!(
                latency_ms,
                model = completion.model.as_deref().unwrap_or(&self.config.model),
                stop_reason = completion.stop_reason.as_deref().unwrap_or("unknown"),
                output_tokens = completion.usage.as_ref().and_then(|u| u.output_tokens),
                "completion received"
            ),
            Err(e) => warn!(
                latency_ms,
                status = e.status().map(|s| s.as_u16()),
                error = %e,
                "completion call failed"
            ),
        }
        result
    }

    async fn read_completion(&self, resp: reqwest::Response) -> Result<Completion, GatewayError> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited);
        }
        if !status.is_success() {
            return Err(to_upstream_error(resp, self.config.max_error_body_bytes).await);
        }

        let body = resp.bytes().await?;
        let envelope: MessagesResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::MalformedEnvelope(format!("invalid JSON: {e}")))?;

        let text = envelope
            .content
            .iter()
            .find(|block| block.kind.as_deref().unwrap_or("text") == "text")
            .and_then(|block| block.text.clone())
            .ok_or_else(|| {
                GatewayError::MalformedEnvelope("missing content[].text".to_string())
            })?;

        Ok(Completion {
            text,
            model: envelope.model,
            stop_reason: envelope.stop_reason,
            usage: envelope.usage,
        })
    }
}

async fn to_upstream_error(resp: reqwest::Response, max_error_body_bytes: usize) -> GatewayError {
    let status = resp.status();
    let body = read_limited_text(resp, max_error_body_bytes).await;
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|parsed| parsed.error.message)
        .unwrap_or(body);
    GatewayError::Upstream { status, message }
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    stop_reason: Option<String>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorObject,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    message: Option<String>,
}
