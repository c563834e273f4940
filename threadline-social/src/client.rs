//! Thin wrapper around the social-data HTTP API.
//!
//! Each call is one logical round trip (the shared HTTP client may retry
//! transport failures, 429 and 5xx underneath) and hands back the raw body.
//! Only the first page of a thread listing is ever requested.
use std::time::Duration;

use threadline_common::{Result, ThreadlineError};
use threadline_http::{Auth, HttpClient, HttpError, RequestOpts};

pub const DEFAULT_PAGE_SIZE: u32 = 5;

#[derive(Clone)]
pub struct SocialApi {
    http: HttpClient,
    token: Option<String>,
    page_size: u32,
}

impl SocialApi {
    pub fn new(base_url: &str) -> Result<Self> {
        // `Url::join` drops the last path segment unless the base ends in '/'.
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let http = HttpClient::new(&base).map_err(map_http_error)?;
        Ok(Self::from_client(http))
    }

    pub fn from_client(http: HttpClient) -> Self {
        Self {
            http,
            token: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.http = self.http.with_retries(retries);
        self
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.http = self.http.with_backoff(base);
        self
    }

    fn auth(&self) -> Option<Auth<'_>> {
        self.token.as_deref().map(Auth::Bearer)
    }

    /// `GET /thread/?hashtag={keyword}&page_size={n}`, raw body.
    pub async fn fetch_threads(&self, keyword: &str) -> Result<String> {
        let page_size = self.page_size.to_string();
        let body = self
            .http
            .get_text(
                "thread/",
                RequestOpts {
                    auth: self.auth(),
                    query: Some(vec![
                        ("hashtag", keyword.into()),
                        ("page_size", page_size.as_str().into()),
                    ]),
                    ..Default::default()
                },
            )
            .await
            .map_err(map_http_error)?;

        tracing::debug!(keyword, body_len = body.len(), "social.threads.fetched");
        Ok(body)
    }

    /// `GET /account/{user_id}`, raw body.
    pub async fn fetch_account(&self, user_id: &str) -> Result<String> {
        if user_id.trim().is_empty() {
            return Err(ThreadlineError::InvalidInput("empty user id".into()));
        }

        let mut url = self
            .http
            .base_url()
            .join("account/")
            .map_err(|e| ThreadlineError::InvalidInput(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ThreadlineError::Config("social base url cannot be a base".into()))?
            .pop_if_empty()
            .push(user_id);

        let body = self
            .http
            .get_text(
                url.as_str(),
                RequestOpts {
                    auth: self.auth(),
                    ..Default::default()
                },
            )
            .await
            .map_err(map_http_error)?;

        tracing::debug!(user_id, body_len = body.len(), "social.account.fetched");
        Ok(body)
    }
}

pub(crate) fn map_http_error(err: HttpError) -> ThreadlineError {
    match err {
        HttpError::Url(msg) => ThreadlineError::InvalidInput(msg),
        HttpError::Build(msg) => ThreadlineError::Config(msg),
        HttpError::Network(msg) => ThreadlineError::Transport(msg),
        HttpError::Decode(msg, snippet) => {
            ThreadlineError::Decode(format!("{msg} (body: {snippet})"))
        }
        HttpError::Api {
            status, message, ..
        } => ThreadlineError::Upstream {
            status: status.as_u16(),
            message,
        },
    }
}
