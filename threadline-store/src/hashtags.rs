use futures::TryStreamExt;
use mongodb::Collection;
use mongodb::bson::{Bson, doc};
use serde::{Deserialize, Serialize};
use threadline_common::Result;

use crate::MongoStore;

pub const DEFAULT_HASHTAGS_COLLECTION: &str = "hashtags";

/// A stored hashtag config. `_id` is whatever the seeding tool wrote
/// (usually an ObjectId, sometimes a plain string).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hashtag {
    #[serde(rename = "_id", default)]
    pub id: Bson,
    pub keyword: String,
}

impl Hashtag {
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            Bson::ObjectId(oid) => Some(oid.to_hex()),
            Bson::String(s) => Some(s.clone()),
            Bson::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct HashtagRepository {
    store: MongoStore,
    hashtags: Collection<Hashtag>,
}

impl HashtagRepository {
    pub fn new(store: MongoStore, collection: &str) -> Self {
        Self {
            hashtags: store.collection(collection),
            store,
        }
    }

    /// Every stored hashtag, in natural (insertion) order.
    pub async fn get_all(&self) -> Result<Vec<Hashtag>> {
        let cursor = self
            .store
            .bounded("hashtags.find", self.hashtags.find(doc! {}))
            .await?;
        let all = self
            .store
            .bounded("hashtags.collect", cursor.try_collect::<Vec<Hashtag>>())
            .await?;
        tracing::debug!(count = all.len(), "store.hashtags.loaded");
        Ok(all)
    }
}
