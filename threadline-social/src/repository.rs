use async_trait::async_trait;
use serde::de::DeserializeOwned;
use threadline_common::{Result, ThreadlineError};

use crate::client::SocialApi;
use crate::types::{AccountInfo, ThreadPage};

/// What the worker pipeline needs from the social-data side.
#[async_trait]
pub trait SocialData: Send + Sync {
    async fn list_threads(&self, keyword: &str) -> Result<ThreadPage>;
    async fn get_account_info(&self, user_id: &str) -> Result<AccountInfo>;
}

fn decode<T: DeserializeOwned>(what: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        tracing::warn!(what, error = %e, "social.decode_error");
        ThreadlineError::Decode(format!("{what}: {e}"))
    })
}

#[derive(Clone)]
pub struct ThreadRepository {
    api: SocialApi,
}

impl ThreadRepository {
    pub fn new(api: SocialApi) -> Self {
        Self { api }
    }

    pub async fn list_threads(&self, keyword: &str) -> Result<ThreadPage> {
        let raw = self.api.fetch_threads(keyword).await?;
        decode("thread page", &raw)
    }
}

#[derive(Clone)]
pub struct AccountRepository {
    api: SocialApi,
}

impl AccountRepository {
    pub fn new(api: SocialApi) -> Self {
        Self { api }
    }

    pub async fn get_account_info(&self, user_id: &str) -> Result<AccountInfo> {
        let raw = self.api.fetch_account(user_id).await?;
        decode("account info", &raw)
    }
}

/// Both repositories behind the [`SocialData`] seam.
#[derive(Clone)]
pub struct SocialRepository {
    threads: ThreadRepository,
    accounts: AccountRepository,
}

impl SocialRepository {
    pub fn new(api: SocialApi) -> Self {
        Self {
            threads: ThreadRepository::new(api.clone()),
            accounts: AccountRepository::new(api),
        }
    }
}

#[async_trait]
impl SocialData for SocialRepository {
    async fn list_threads(&self, keyword: &str) -> Result<ThreadPage> {
        self.threads.list_threads(keyword).await
    }

    async fn get_account_info(&self, user_id: &str) -> Result<AccountInfo> {
        self.accounts.get_account_info(user_id).await
    }
}
