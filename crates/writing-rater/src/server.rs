use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::Instrument;

use crate::assemble::{SERVICE_NAME, SERVICE_VERSION};
use crate::error::AnalyzeError;
use crate::pipeline::Analyzer;
use crate::presets::{find_preset, WritingPreset, PRESETS};

#[derive(Clone)]
pub struct AppState {
    analyzer: Analyzer,
    environment: String,
}

impl AppState {
    pub fn new(analyzer: Analyzer, environment: impl Into<String>) -> Self {
        Self {
            analyzer,
            environment: environment.into(),
        }
    }
}

/// Routes are served at the root and again under `/api`, where the browser client
/// has always called them.
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route(
            "/analyze",
            post(analyze).options(preflight).fallback(method_not_allowed),
        )
        .route("/health", get(health).fallback(method_not_allowed))
        .route("/writing-types", get(list_writing_types))
        .route("/writing-types/{key}", get(get_writing_type));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(middleware::map_response(with_cors_headers))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

async fn with_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

/// The body is parsed by hand so that a missing content type or a non-JSON body is
/// reported as `MISSING_FIELDS` rather than an extractor rejection.
async fn analyze(State(state): State<AppState>, body: Bytes) -> Result<Response, AnalyzeError> {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let writing_type = payload
        .get("writingType")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let criteria = payload
        .get("criteria")
        .and_then(serde_json::Value::as_array)
        .map(|c| c.len())
        .unwrap_or_default();
    let span = tracing::info_span!("analyze", writing_type, criteria);

    let json = async {
        let outcome = state.analyzer.analyze(&payload).await.and_then(|result| {
            serde_json::to_value(&result)
                .map_err(|e| AnalyzeError::Internal(format!("failed to serialize result: {e}")))
        });
        if let Err(e) = &outcome {
            e.log();
        }
        outcome
    }
    .instrument(span)
    .await?;
    Ok((StatusCode::OK, Json(json)).into_response())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    service: &'static str,
    environment: String,
    api_key_configured: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        version: SERVICE_VERSION,
        service: SERVICE_NAME,
        environment: state.environment.clone(),
        api_key_configured: state.analyzer.is_configured(),
    })
}

async fn list_writing_types() -> Json<&'static [WritingPreset]> {
    Json(&PRESETS[..])
}

async fn get_writing_type(Path(key): Path<String>) -> Response {
    match find_preset(&key) {
        Some(preset) => Json(preset).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown writing type: {key}") })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use llm_common::messages::{MessagesClient, MessagesClientConfig};
    use serde_json::json;
    use tokio::sync::oneshot;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FENCED_REPLY: &str = "```json\n{\"grammar\":{\"score\":8,\"feedback\":\"Good\"},\"clarity\":{\"score\":7,\"feedback\":\"OK\"},\"overall\":{\"score\":7,\"feedback\":\"Solid\"},\"writing_info\":{\"type\":\"General Writing\",\"word_count\":8,\"character_count\":43,\"analyzed_on\":\"10/16/2026\",\"sample_text\":\"This is a short test paragraph for scoring.\"}}\n```";

    async fn spawn_app(analyzer: Analyzer) -> (String, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local_addr should succeed");
        let app = router(AppState::new(analyzer, "test"));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        (format!("http://{addr}"), shutdown_tx)
    }

    fn analyzer_for(upstream: &MockServer, timeout: Duration) -> Analyzer {
        let config = MessagesClientConfig {
            base_url: upstream.uri(),
            timeout,
            ..MessagesClientConfig::default()
        };
        let client = MessagesClient::new(config, "sk-test-secret").expect("client should build");
        Analyzer::new(Some(Arc::new(client)))
    }

    async fn upstream_replying(template: ResponseTemplate) -> MockServer {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(template)
            .mount(&upstream)
            .await;
        upstream
    }

    fn text_envelope(text: &str) -> Value {
        json!({
            "id": "msg_test",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn"
        })
    }

    fn sample_payload() -> Value {
        json!({
            "text": "This is a short test paragraph for scoring.",
            "writingType": "General Writing",
            "criteria": ["grammar", "clarity"]
        })
    }

    async fn post_analyze(base: &str, body: &Value) -> (StatusCode, Value) {
        let resp = reqwest::Client::new()
            .post(format!("{base}/analyze"))
            .json(body)
            .send()
            .await
            .expect("request should complete");
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        let json = resp.json::<Value>().await.expect("body should be JSON");
        (status, json)
    }

    #[tokio::test]
    async fn fenced_reply_is_returned_with_meta() {
        let upstream =
            upstream_replying(ResponseTemplate::new(200).set_body_json(text_envelope(FENCED_REPLY)))
                .await;
        let (base, _shutdown) = spawn_app(analyzer_for(&upstream, Duration::from_secs(5))).await;

        let (status, body) = post_analyze(&base, &sample_payload()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overall"]["score"], 7);
        assert_eq!(body["grammar"]["feedback"], "Good");
        assert_eq!(body["writing_info"]["type"], "General Writing");
        assert_eq!(body["_meta"]["service"], SERVICE_NAME);
        assert_eq!(body["_meta"]["version"], SERVICE_VERSION);
        assert!(body["_meta"]["processed_at"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn body_keeps_model_key_order_with_meta_last() {
        let reply = r#"{"style":{"score":6,"feedback":"Plain"},"grammar":{"score":8,"feedback":"Good"},"clarity":{"score":7,"feedback":"OK"},"overall":{"score":7,"feedback":"Solid"},"writing_info":{"type":"General Writing"}}"#;
        let upstream =
            upstream_replying(ResponseTemplate::new(200).set_body_json(text_envelope(reply))).await;
        let (base, _shutdown) = spawn_app(analyzer_for(&upstream, Duration::from_secs(5))).await;

        let (status, body) = post_analyze(&base, &sample_payload()).await;
        assert_eq!(status, StatusCode::OK);
        let keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["style", "grammar", "clarity", "overall", "writing_info", "_meta"]
        );
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn rejection_log_carries_request_fields() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let state = AppState::new(Analyzer::new(None), "test");
        let payload = json!({
            "text": "too short",
            "writingType": "Business Writing",
            "criteria": ["clarity", "tone", "structure"]
        });
        let result = analyze(State(state), Bytes::from(payload.to_string())).await;
        assert!(matches!(result, Err(AnalyzeError::TextTooShort { .. })));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("analysis rejected"))
            .unwrap_or_else(|| panic!("no rejection logged: {output}"));
        assert!(line.contains("Business Writing"), "line: {line}");
        assert!(line.contains("criteria=3"), "line: {line}");
        assert!(line.contains("TEXT_TOO_SHORT"), "line: {line}");
    }

    #[tokio::test]
    async fn input_errors_are_400_with_codes() {
        let upstream = MockServer::start().await;
        let (base, _shutdown) = spawn_app(analyzer_for(&upstream, Duration::from_secs(5))).await;

        let cases = [
            (json!({"text": "", "writingType": "General Writing", "criteria": ["grammar"]}), "MISSING_FIELDS"),
            (json!({"text": "123456789", "writingType": "General Writing", "criteria": ["grammar"]}), "TEXT_TOO_SHORT"),
            (json!({"text": "x".repeat(10_001), "writingType": "General Writing", "criteria": ["grammar"]}), "TEXT_TOO_LONG"),
            (json!({"text": "A perfectly fine sentence."}), "MISSING_FIELDS"),
        ];
        for (payload, code) in cases {
            let (status, body) = post_analyze(&base, &payload).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "expected 400 for {code}");
            assert_eq!(body["code"], code);
            assert!(body["error"].is_string());
        }
        assert!(upstream.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn non_json_body_is_missing_fields() {
        let upstream = MockServer::start().await;
        let (base, _shutdown) = spawn_app(analyzer_for(&upstream, Duration::from_secs(5))).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/analyze"))
            .body("text=hello")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "MISSING_FIELDS");
    }

    #[tokio::test]
    async fn upstream_timeout_is_408_without_partial_body() {
        let upstream = upstream_replying(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(text_envelope(FENCED_REPLY)),
        )
        .await;
        let (base, _shutdown) =
            spawn_app(analyzer_for(&upstream, Duration::from_millis(200))).await;

        let (status, body) = post_analyze(&base, &sample_payload()).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["code"], "TIMEOUT");
        assert!(body.get("overall").is_none());
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn upstream_429_passes_through() {
        let upstream = upstream_replying(ResponseTemplate::new(429)).await;
        let (base, _shutdown) = spawn_app(analyzer_for(&upstream, Duration::from_secs(5))).await;

        let (status, body) = post_analyze(&base, &sample_payload()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn upstream_failure_is_api_error_without_secrets() {
        let upstream = upstream_replying(ResponseTemplate::new(500).set_body_json(json!({
            "type": "error",
            "error": {"type": "api_error", "message": "Internal server error"}
        })))
        .await;
        let (base, _shutdown) = spawn_app(analyzer_for(&upstream, Duration::from_secs(5))).await;

        let (status, body) = post_analyze(&base, &sample_payload()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "API_ERROR");
        let rendered = body.to_string();
        assert!(!rendered.contains("sk-test-secret"));
        assert!(!rendered.contains("Return ONLY valid JSON"));
    }

    #[tokio::test]
    async fn content_errors_are_distinguished() {
        let cases = [
            (json!({"content": []}), "INVALID_RESPONSE"),
            (text_envelope("Sorry, I can't help with that."), "FORMAT_ERROR"),
            (text_envelope("{\"overall\": {\"score\": 7}}"), "PARSE_ERROR"),
        ];
        for (envelope, code) in cases {
            let upstream = upstream_replying(ResponseTemplate::new(200).set_body_json(envelope)).await;
            let (base, _shutdown) =
                spawn_app(analyzer_for(&upstream, Duration::from_secs(5))).await;

            let (status, body) = post_analyze(&base, &sample_payload()).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "expected 500 for {code}");
            assert_eq!(body["code"], code);
        }
    }

    #[tokio::test]
    async fn missing_credential_is_service_error() {
        let (base, _shutdown) = spawn_app(Analyzer::new(None)).await;

        let (status, body) = post_analyze(&base, &sample_payload()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "SERVICE_ERROR");
    }

    #[tokio::test]
    async fn preflight_and_method_handling() {
        let (base, _shutdown) = spawn_app(Analyzer::new(None)).await;
        let client = reqwest::Client::new();

        let resp = client
            .request(reqwest::Method::OPTIONS, format!("{base}/analyze"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        assert!(resp
            .headers()
            .get("access-control-allow-methods")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|m| m.contains("POST")));

        let resp = client.get(format!("{base}/analyze")).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 405);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Method not allowed");

        let resp = client.post(format!("{base}/health")).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 405);
    }

    #[tokio::test]
    async fn health_reports_configuration_under_both_prefixes() {
        let (base, _shutdown) = spawn_app(Analyzer::new(None)).await;
        let client = reqwest::Client::new();

        for url in [format!("{base}/health"), format!("{base}/api/health")] {
            let resp = client.get(&url).send().await.unwrap();
            assert_eq!(resp.status().as_u16(), 200);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["service"], SERVICE_NAME);
            assert_eq!(body["environment"], "test");
            assert_eq!(body["api_key_configured"], false);
        }
    }

    #[tokio::test]
    async fn writing_types_are_listed() {
        let (base, _shutdown) = spawn_app(Analyzer::new(None)).await;
        let client = reqwest::Client::new();

        let list: Value = client
            .get(format!("{base}/api/writing-types"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list.as_array().map(|a| a.len()), Some(PRESETS.len()));
        assert_eq!(list[0]["name"], "General Writing");

        let one: Value = client
            .get(format!("{base}/writing-types/academic"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(one["criteria"][3], "argumentation");

        let missing = client
            .get(format!("{base}/writing-types/poetry"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status().as_u16(), 404);
    }
}
