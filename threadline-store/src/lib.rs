//! MongoDB-backed persistence for users and hashtag configs.
//!
//! [`MongoStore`] owns the driver client and a per-operation timeout; the
//! collection repositories borrow it. Driver errors are folded into
//! [`ThreadlineError`] so callers never see `mongodb` types.
pub mod hashtags;
pub mod users;

use std::future::IntoFuture;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::{Client, Collection, Database};
use threadline_common::{Result, ThreadlineError};

pub use hashtags::{Hashtag, HashtagRepository};
pub use mongodb::bson::oid::ObjectId;
pub use users::{User, UserRepository, UserStore};

/// Liveness of the backing database, as seen by the readiness probe.
#[async_trait]
pub trait Readiness: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
    timeout: Duration,
}

impl MongoStore {
    /// Parse the URI and build a client. The driver connects lazily, so an
    /// unreachable server only shows up on the first operation or [`ping`](Readiness::ping).
    pub async fn connect(uri: &str, database: &str, timeout: Duration) -> Result<Self> {
        let client = Client::with_uri_str(uri).await.map_err(map_mongo_error)?;
        tracing::info!(database, "store.connected");
        Ok(Self {
            database: client.database(database),
            client,
            timeout,
        })
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database.collection::<T>(name)
    }

    /// Run a driver future under the store's timeout.
    pub(crate) async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: IntoFuture<Output = mongodb::error::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(|e| {
                tracing::warn!(op, error = %e, "store.op.failed");
                map_mongo_error(e)
            }),
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "store.op.timeout");
                Err(ThreadlineError::Timeout)
            }
        }
    }

    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

#[async_trait]
impl Readiness for MongoStore {
    async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.database.run_command(doc! { "ping": 1 }))
            .await
            .map(|_| ())
    }
}

pub(crate) fn parse_object_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| ThreadlineError::InvalidInput(format!("invalid id: {id}")))
}

pub(crate) fn map_mongo_error(err: mongodb::error::Error) -> ThreadlineError {
    match err.kind.as_ref() {
        ErrorKind::BsonDeserialization(e) => ThreadlineError::Decode(e.to_string()),
        ErrorKind::BsonSerialization(e) => ThreadlineError::InvalidInput(e.to_string()),
        ErrorKind::InvalidArgument { message, .. } => ThreadlineError::Config(message.clone()),
        _ => ThreadlineError::Transport(err.to_string()),
    }
}
