//! Minimal HTTP client with safe logging, retries, and optional bearer auth.
//!
//! - Request options: headers, `Auth`, query params, timeout, retries
//! - Redacts sensitive query params and never logs secret values
//! - Retries network failures, 429 and 5xx with exponential backoff and
//!   `Retry-After` support
//! - Optional *raw* request/response logging via `THREADLINE_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), threadline_http::HttpError> {
//! let client = threadline_http::HttpClient::new("https://api.example.com")?;
//! let body = client
//!     .get_text("v1/items", threadline_http::RequestOpts::default())
//!     .await?;
//! # let _ = body;
//! # Ok(()) }
//! ```
//!
//! Every call logs `http.request.start` and `http.response` at debug; retries
//! and final failures are warnings. Raw bodies go to target `http.raw`.

use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use std::borrow::Cow;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

const RAW_ENV: &str = "THREADLINE_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
/// Minimum wait after a 429 that carried no `Retry-After`.
const RATE_LIMIT_FLOOR: Duration = Duration::from_millis(1100);
/// Upper bound on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

const SECRET_PARAMS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "token",
    "secret",
    "client_secret",
    "bearer",
];

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let mut val = v.to_str().unwrap_or("").to_string();
            if key.eq_ignore_ascii_case("authorization") {
                val = "Bearer <redacted>".into();
            }
            (key, val)
        })
        .collect()
}

fn redact_query(query: Option<&Vec<(&str, Cow<'_, str>)>>) -> Vec<(String, String)> {
    query
        .map(|q| {
            q.iter()
                .map(|(k, v)| {
                    let is_secret = SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str());
                    (
                        (*k).to_string(),
                        if is_secret {
                            "<redacted>".to_string()
                        } else {
                            v.as_ref().to_string()
                        },
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

/// Authentication strategies supported by the HTTP client helpers.
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    None,
}

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use threadline_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(1),
///     query: Some(vec![("hashtag", "rust".into())]),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(opts.auth.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
}

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
    pub base_backoff: Duration,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use threadline_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
            base_backoff: Duration::from_millis(200),
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Override the first backoff step; later steps double it.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// GET and return the raw body as text, leaving decoding to the caller.
    pub async fn get_text(&self, path: &str, opts: RequestOpts<'_>) -> Result<String, HttpError> {
        let (req_id, bytes) = self.send_with_retries(Method::GET, path, opts).await?;
        String::from_utf8(bytes).map_err(|e| {
            tracing::warn!(req_id=%req_id, error=%e, "http.response.not_utf8");
            HttpError::Decode(e.to_string(), snip_body(e.as_bytes()))
        })
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1) as u32).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }

    /// Delay before the next attempt after a retryable status.
    fn status_delay(&self, status: StatusCode, headers: &HeaderMap, attempt: usize) -> Duration {
        if let Some(secs) = retry_after_delay_secs(headers) {
            return Duration::from_secs(secs).min(MAX_RETRY_AFTER);
        }
        let exp = self.backoff(attempt);
        if status == StatusCode::TOO_MANY_REQUESTS {
            exp.max(RATE_LIMIT_FLOOR)
        } else {
            exp
        }
    }

    async fn send_with_retries(
        &self,
        method: Method,
        path: &str,
        opts: RequestOpts<'_>,
    ) -> Result<(String, Vec<u8>), HttpError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))?;

        let call = Call {
            req_id: format!("r{}", uuid::Uuid::new_v4().simple()),
            max_retries: opts.retries.unwrap_or(self.max_retries),
            timeout: opts.timeout.unwrap_or(self.default_timeout),
            bearer: match &opts.auth {
                Some(Auth::Bearer(tok)) => Some(sanitize_api_key(tok)?),
                Some(Auth::None) | None => None,
            },
        };
        let redacted_q = redact_query(opts.query.as_ref());

        let mut attempt = 0usize;
        loop {
            tracing::debug!(
                req_id = %call.req_id,
                attempt = attempt + 1,
                max_retries = call.max_retries,
                %method,
                host_path = %format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                query = ?redacted_q,
                timeout_ms = call.timeout.as_millis() as u64,
                auth_kind = if call.bearer.is_some() { "bearer" } else { "none" },
                "http.request.start"
            );

            let outcome = self.attempt(&call, &method, &url, &opts).await;
            let (delay, reason) = match outcome {
                Attempt::Done(bytes) => return Ok((call.req_id, bytes)),
                Attempt::Network(message) if attempt < call.max_retries => {
                    (self.backoff(attempt + 1), message)
                }
                Attempt::Network(message) => {
                    tracing::warn!(req_id = %call.req_id, attempt, %message, "http.network_error");
                    return Err(HttpError::Network(message));
                }
                Attempt::Status {
                    status,
                    headers,
                    message,
                    request_id,
                } => {
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable || attempt >= call.max_retries {
                        tracing::warn!(
                            req_id = %call.req_id,
                            %status,
                            %message,
                            x_request_id = %request_id,
                            "http.error"
                        );
                        return Err(HttpError::Api {
                            status,
                            message,
                            request_id,
                        });
                    }
                    (
                        self.status_delay(status, &headers, attempt + 1),
                        format!("{status}: {message}"),
                    )
                }
            };

            attempt += 1;
            tracing::warn!(
                req_id = %call.req_id,
                attempt,
                max_retries = call.max_retries,
                backoff_ms = delay.as_millis() as u64,
                %reason,
                "http.retrying"
            );
            sleep(delay).await;
        }
    }

    /// One round trip. Never sleeps; the caller decides whether to go again.
    async fn attempt(
        &self,
        call: &Call,
        method: &Method,
        url: &Url,
        opts: &RequestOpts<'_>,
    ) -> Attempt {
        let mut rb = self
            .inner
            .request(method.clone(), url.clone())
            .timeout(call.timeout);
        if let Some(q) = &opts.query {
            let pairs: Vec<(&str, &str)> = q.iter().map(|(k, v)| (*k, v.as_ref())).collect();
            rb = rb.query(&pairs);
        }
        if let Some(hdrs) = &opts.headers {
            rb = rb.headers(hdrs.clone());
        }
        if let Some(tok) = &call.bearer {
            rb = rb.bearer_auth(tok);
        }

        let started = std::time::Instant::now();
        let resp = match rb.send().await {
            Ok(resp) => resp,
            Err(err) => return Attempt::Network(err.to_string()),
        };
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return Attempt::Network(err.to_string()),
        };
        let request_id = headers
            .get("x-request-id")
            .or_else(|| headers.get("x-correlation-id"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        tracing::debug!(
            req_id = %call.req_id,
            %status,
            duration_ms = started.elapsed().as_millis() as u64,
            body_len = bytes.len(),
            x_request_id = %request_id,
            "http.response"
        );
        if raw_enabled() {
            let shown = &bytes[..bytes.len().min(RAW_MAX_BODY)];
            tracing::info!(
                target: "http.raw",
                req_id = %call.req_id,
                %status,
                headers = ?redact_headers(&headers),
                body = %String::from_utf8_lossy(shown),
                truncated = bytes.len() > RAW_MAX_BODY
            );
        }

        if status.is_success() {
            Attempt::Done(bytes.to_vec())
        } else {
            Attempt::Status {
                status,
                headers,
                message: extract_error_message(&bytes),
                request_id,
            }
        }
    }
}

/// Per-call settings resolved once from [`RequestOpts`] and the client defaults.
struct Call {
    req_id: String,
    max_retries: usize,
    timeout: Duration,
    bearer: Option<String>,
}

enum Attempt {
    Done(Vec<u8>),
    Network(String),
    Status {
        status: StatusCode,
        headers: HeaderMap,
        message: String,
        request_id: String,
    },
}

/// Pull a human message out of `{"message":..}`, `{"detail":..}` or `{"error":..}`.
fn extract_error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        for candidate in [m.message, m.detail, m.error] {
            if !candidate.is_empty() {
                return candidate;
            }
        }
    }
    snip_body(body)
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .parse()
        .ok()
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        let mut cut = 500;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    s.retain(|ch| !ch.is_ascii_whitespace());

    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }

    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(
            extract_error_message(br#"{"message":"account not found"}"#),
            "account not found"
        );
        assert_eq!(extract_error_message(br#"{"detail":"slow down"}"#), "slow down");
        assert_eq!(extract_error_message(b"plain text"), "plain text");
    }

    #[test]
    fn snippets_are_truncated() {
        let long = "x".repeat(800);
        let snip = snip_body(long.as_bytes());
        assert_eq!(snip.len(), 503);
        assert!(snip.ends_with("..."));
    }

    #[test]
    fn api_keys_are_cleaned() {
        assert_eq!(sanitize_api_key(" 'abc def' ").unwrap(), "abcdef");
        assert!(sanitize_api_key("caf\u{e9}").is_err());
    }

    #[test]
    fn secret_query_values_are_redacted() {
        let q = vec![("hashtag", Cow::Borrowed("rust")), ("token", Cow::Borrowed("s3cr3t"))];
        let redacted = redact_query(Some(&q));
        assert_eq!(redacted[0].1, "rust");
        assert_eq!(redacted[1].1, "<redacted>");
    }

    #[test]
    fn retry_after_is_capped() {
        let client = HttpClient::new("http://localhost").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3600"));
        let delay = client.status_delay(StatusCode::SERVICE_UNAVAILABLE, &headers, 1);
        assert_eq!(delay, MAX_RETRY_AFTER);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        let delay = client.status_delay(StatusCode::TOO_MANY_REQUESTS, &headers, 1);
        assert_eq!(delay, Duration::from_secs(2));
    }

    #[test]
    fn backoff_doubles() {
        let client = HttpClient::new("http://localhost")
            .unwrap()
            .with_backoff(Duration::from_millis(10));
        assert_eq!(client.backoff(1), Duration::from_millis(10));
        assert_eq!(client.backoff(3), Duration::from_millis(40));
    }
}
