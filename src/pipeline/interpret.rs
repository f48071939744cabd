//! Interpretation: turn extracted text into a structured invoice record.
//!
//! Model output is decoded in two stages and neither is trusted:
//!
//! 1. **Envelope**: the HTTP body must be JSON with a string at
//!    `choices[0].message.content`, otherwise the whole body is returned as
//!    [`ErrorKind::MalformedApiResponse`].
//! 2. **Content**: after stripping code fences the content must decode to a
//!    JSON object, otherwise the cleaned content is returned as
//!    [`ErrorKind::MalformedContent`].
//!
//! Fields inside the record are not validated.
//!
//! ## Retry Strategy
//!
//! Only transport failures are retried (timeouts, connection errors, HTTP 429
//! and 5xx), with exponential backoff `retry_backoff_ms * 2^(attempt-1)`,
//! capped at [`MAX_BACKOFF_MS`]. A
//! reply that arrived but cannot be decoded is final.

use crate::config::InvoiceConfig;
use crate::error::{ErrorKind, ExtractionError, InvoiceError, TransportError};
use crate::pipeline::postprocess::clean_content;
use crate::prompts::{invoice_prompt, DEFAULT_SYSTEM_PROMPT};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Either a decoded record or the reason it could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InterpretationResult {
    Record(Map<String, Value>),
    Error(ExtractionError),
}

impl InterpretationResult {
    pub fn is_record(&self) -> bool {
        matches!(self, InterpretationResult::Record(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            InterpretationResult::Record(_) => None,
            InterpretationResult::Error(e) => Some(e.kind),
        }
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Sends a chat-completion body and returns the raw response text.
pub trait ChatTransport: Send + Sync {
    fn send<'a>(&'a self, body: &'a Value) -> BoxFuture<'a, Result<String, TransportError>>;
}

/// Azure OpenAI style endpoint: `POST {endpoint}` with an `api-key` header.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InvoiceError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(InvoiceError::InvalidConfig(
                "An API endpoint is required to interpret invoices".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvoiceError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &InvoiceConfig) -> Result<Self, InvoiceError> {
        Self::new(
            &config.endpoint,
            &config.api_key,
            Duration::from_secs(config.api_timeout_secs),
        )
    }
}

impl ChatTransport for HttpTransport {
    fn send<'a>(&'a self, body: &'a Value) -> BoxFuture<'a, Result<String, TransportError>> {
        async move {
            let response = self
                .client
                .post(&self.endpoint)
                .header("api-key", &self.api_key)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() || e.is_connect() || e.is_request() {
                        TransportError::retryable(e.to_string())
                    } else {
                        TransportError::fatal(e.to_string())
                    }
                })?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| TransportError::retryable(format!("reading body: {e}")))?;

            if status.as_u16() == 429 || status.is_server_error() {
                return Err(TransportError::retryable(format!("HTTP {status}: {text}")));
            }
            // Other statuses carry an error body without `choices`; the
            // envelope check reports it with the body attached.
            Ok(text)
        }
        .boxed()
    }
}

// ── Request / response ───────────────────────────────────────────────────────

/// Build the chat-completion request body for `text`.
pub fn build_request(text: &str, config: &InvoiceConfig) -> Value {
    let system = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    json!({
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": invoice_prompt(text) },
        ],
        "temperature": 0,
        "max_tokens": config.max_tokens,
    })
}

/// Decode a transport payload into a record or an [`ExtractionError`].
pub fn parse_response(payload: &str) -> InterpretationResult {
    let content = serde_json::from_str::<Value>(payload).ok().and_then(|v| {
        v.get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
            .map(str::to_owned)
    });

    let Some(content) = content else {
        return InterpretationResult::Error(ExtractionError::new(
            ErrorKind::MalformedApiResponse,
            payload,
        ));
    };

    let cleaned = clean_content(&content);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(record)) => InterpretationResult::Record(record),
        Ok(_) | Err(_) => {
            InterpretationResult::Error(ExtractionError::new(ErrorKind::MalformedContent, cleaned))
        }
    }
}

/// Upper bound for a single retry delay.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Delay before retry number `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

// ── Interpreter ──────────────────────────────────────────────────────────────

/// Calls the language model and decodes its reply.
#[derive(Clone)]
pub struct Interpreter {
    transport: Arc<dyn ChatTransport>,
    config: InvoiceConfig,
}

impl Interpreter {
    pub fn new(transport: Arc<dyn ChatTransport>, config: InvoiceConfig) -> Self {
        Self { transport, config }
    }

    /// HTTP transport built from the endpoint, key and timeout in `config`.
    pub fn from_config(config: &InvoiceConfig) -> Result<Self, InvoiceError> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(Arc::new(transport), config.clone()))
    }

    /// Interpret extracted text. Always returns one of the two variants.
    pub async fn interpret(&self, text: &str) -> InterpretationResult {
        let body = build_request(text, &self.config);
        let start = Instant::now();
        let mut last_err = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.config.retry_backoff_ms, attempt);
                warn!(
                    "Interpretation retry {}/{} after {}ms",
                    attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.transport.send(&body).await {
                Ok(payload) => {
                    debug!(
                        "Model replied with {} bytes in {:?}",
                        payload.len(),
                        start.elapsed()
                    );
                    return parse_response(&payload);
                }
                Err(e) if e.retryable => {
                    warn!("Interpretation attempt {} failed — {}", attempt + 1, e);
                    last_err = e.message;
                }
                Err(e) => {
                    warn!("Interpretation failed — {}", e);
                    return InterpretationResult::Error(ExtractionError::new(
                        ErrorKind::TransportFailure,
                        e.message,
                    ));
                }
            }
        }

        InterpretationResult::Error(ExtractionError::new(ErrorKind::TransportFailure, last_err))
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("transport", &"<dyn ChatTransport>")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn envelope(content: &str) -> String {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
            .to_string()
    }

    /// Replays canned results in order; the last one repeats.
    struct Scripted {
        replies: Mutex<Vec<Result<String, TransportError>>>,
        calls: AtomicUsize,
        bodies: Mutex<Vec<Value>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                bodies: Mutex::new(Vec::new()),
            })
        }
    }

    impl ChatTransport for Scripted {
        fn send<'a>(&'a self, body: &'a Value) -> BoxFuture<'a, Result<String, TransportError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies.lock().unwrap().push(body.clone());
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            };
            futures::future::ready(reply).boxed()
        }
    }

    fn fast_config() -> InvoiceConfig {
        InvoiceConfig::builder()
            .endpoint("http://localhost/chat")
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[test]
    fn fenced_content_is_decoded() {
        let payload = envelope("```json\n{\"invoice_number\":\"123\"}\n```");
        let mut expected = Map::new();
        expected.insert("invoice_number".into(), json!("123"));
        assert_eq!(parse_response(&payload), InterpretationResult::Record(expected));
    }

    #[test]
    fn nested_items_survive() {
        let payload = envelope(r#"{"total":"50","items":[{"description":"x","quantity":"1"}]}"#);
        match parse_response(&payload) {
            InterpretationResult::Record(r) => {
                assert_eq!(r["items"][0]["description"], "x");
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn missing_choices_is_malformed_api_response() {
        let payload = r#"{"error":{"code":"401","message":"Access denied"}}"#;
        let result = parse_response(payload);
        assert_eq!(
            result,
            InterpretationResult::Error(ExtractionError::new(
                ErrorKind::MalformedApiResponse,
                payload
            ))
        );
    }

    #[test]
    fn non_json_body_is_malformed_api_response() {
        let result = parse_response("<html>502 Bad Gateway</html>");
        assert_eq!(result.error_kind(), Some(ErrorKind::MalformedApiResponse));
    }

    #[test]
    fn non_string_content_is_malformed_api_response() {
        let payload = json!({ "choices": [ { "message": { "content": null } } ] }).to_string();
        assert_eq!(
            parse_response(&payload).error_kind(),
            Some(ErrorKind::MalformedApiResponse)
        );
    }

    #[test]
    fn truncated_content_is_malformed_content_with_cleaned_raw() {
        let payload = envelope("```json\n{\"invoice_number\": \"12");
        assert_eq!(
            parse_response(&payload),
            InterpretationResult::Error(ExtractionError::new(
                ErrorKind::MalformedContent,
                "{\"invoice_number\": \"12"
            ))
        );
    }

    #[test]
    fn prose_around_json_is_malformed_content() {
        let payload = envelope("Sure! Here it is:\n```json\n{}\n```");
        assert_eq!(
            parse_response(&payload).error_kind(),
            Some(ErrorKind::MalformedContent)
        );
    }

    #[test]
    fn non_object_json_is_malformed_content() {
        assert_eq!(
            parse_response(&envelope("[1, 2]")).error_kind(),
            Some(ErrorKind::MalformedContent)
        );
        assert_eq!(
            parse_response(&envelope("null")).error_kind(),
            Some(ErrorKind::MalformedContent)
        );
    }

    #[test]
    fn parse_is_deterministic() {
        for payload in [
            envelope("```json\n{\"a\":1}\n```"),
            envelope("{broken"),
            "{}".to_string(),
        ] {
            assert_eq!(parse_response(&payload), parse_response(&payload));
        }
    }

    #[test]
    fn request_body_shape() {
        let config = InvoiceConfig::builder().max_tokens(1234).build().unwrap();
        let body = build_request("FACTURA 7", &config);
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["max_tokens"], 1234);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], DEFAULT_SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("FACTURA 7"));
    }

    #[test]
    fn request_uses_system_prompt_override() {
        let config = InvoiceConfig::builder()
            .system_prompt("Be terse")
            .build()
            .unwrap();
        let body = build_request("x", &config);
        assert_eq!(body["messages"][0]["content"], "Be terse");
        assert_eq!(body["temperature"], 0);
    }

    #[test]
    fn http_transport_requires_endpoint() {
        let err = HttpTransport::new("  ", "key", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn interpret_decodes_reply() {
        let transport = Scripted::new(vec![Ok(envelope("{\"total\":\"50\"}"))]);
        let interpreter = Interpreter::new(transport.clone(), fast_config());

        let result = interpreter.interpret("Total: 50").await;
        assert!(result.is_record());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        let bodies = transport.bodies.lock().unwrap();
        assert!(bodies[0]["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("Total: 50"));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let transport = Scripted::new(vec![
            Err(TransportError::retryable("HTTP 503")),
            Err(TransportError::retryable("timeout")),
            Ok(envelope("{\"a\":\"b\"}")),
        ]);
        let interpreter = Interpreter::new(transport.clone(), fast_config());

        assert!(interpreter.interpret("x").await.is_record());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_become_transport_failure() {
        let transport = Scripted::new(vec![Err(TransportError::retryable("connection refused"))]);
        let interpreter = Interpreter::new(transport.clone(), fast_config());

        let result = interpreter.interpret("x").await;
        assert_eq!(
            result,
            InterpretationResult::Error(ExtractionError::new(
                ErrorKind::TransportFailure,
                "connection refused"
            ))
        );
        // one attempt + max_retries (2)
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_and_saturates_at_cap() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 7), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(0, 70), 0);
        assert_eq!(backoff_ms(u64::MAX, 64), MAX_BACKOFF_MS);
    }

    #[tokio::test]
    async fn many_retries_with_zero_backoff_do_not_overflow() {
        let transport = Scripted::new(vec![Err(TransportError::retryable("HTTP 503"))]);
        let config = InvoiceConfig::builder()
            .endpoint("http://localhost/chat")
            .max_retries(70)
            .retry_backoff_ms(0)
            .build()
            .unwrap();
        let interpreter = Interpreter::new(transport.clone(), config);

        let result = interpreter.interpret("x").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::TransportFailure));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 71);
    }

    #[tokio::test]
    async fn fatal_transport_error_is_not_retried() {
        let transport = Scripted::new(vec![Err(TransportError::fatal("builder error"))]);
        let interpreter = Interpreter::new(transport.clone(), fast_config());

        let result = interpreter.interpret("x").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::TransportFailure));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_reply_is_not_retried() {
        let transport = Scripted::new(vec![Ok(envelope("not json"))]);
        let interpreter = Interpreter::new(transport.clone(), fast_config());

        let result = interpreter.interpret("x").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::MalformedContent));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn interpret_is_idempotent_for_same_reply() {
        let transport = Scripted::new(vec![Ok(envelope("```json\n{\"n\":\"1\"}\n```"))]);
        let interpreter = Interpreter::new(transport, fast_config());

        let first = tokio_test::block_on(interpreter.interpret("x"));
        let second = tokio_test::block_on(interpreter.interpret("x"));
        assert_eq!(first, second);
    }
}
