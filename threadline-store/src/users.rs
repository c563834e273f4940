use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::Collection;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, to_document};
use serde::{Deserialize, Serialize};
use threadline_common::{Result, ThreadlineError};

use crate::{MongoStore, parse_object_id};

pub const DEFAULT_USERS_COLLECTION: &str = "users";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub username: String,
    pub password: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub birth_date: DateTime<Utc>,
}

/// CRUD over the `users` collection. Missing records are
/// [`ThreadlineError::NotFound`]; malformed ids are [`ThreadlineError::InvalidInput`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_all(&self) -> Result<Vec<User>>;
    async fn get_by_id(&self, id: &str) -> Result<User>;
    /// Insert and return the new id as hex.
    async fn create(&self, user: User) -> Result<String>;
    async fn update(&self, id: &str, user: User) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct UserRepository {
    store: MongoStore,
    users: Collection<User>,
}

impl UserRepository {
    pub fn new(store: MongoStore, collection: &str) -> Self {
        Self {
            users: store.collection(collection),
            store,
        }
    }
}

fn user_not_found(id: &str) -> ThreadlineError {
    ThreadlineError::NotFound(format!("user {id}"))
}

#[async_trait]
impl UserStore for UserRepository {
    async fn get_all(&self) -> Result<Vec<User>> {
        let cursor = self.store.bounded("users.find", self.users.find(doc! {})).await?;
        self.store
            .bounded("users.collect", cursor.try_collect::<Vec<User>>())
            .await
    }

    async fn get_by_id(&self, id: &str) -> Result<User> {
        let oid = parse_object_id(id)?;
        self.store
            .bounded("users.find_one", self.users.find_one(doc! { "_id": oid }))
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn create(&self, mut user: User) -> Result<String> {
        user.id = None;
        let inserted = self
            .store
            .bounded("users.insert_one", self.users.insert_one(&user))
            .await?;
        inserted
            .inserted_id
            .as_object_id()
            .map(|oid| oid.to_hex())
            .ok_or_else(|| ThreadlineError::Decode("inserted id is not an ObjectId".into()))
    }

    async fn update(&self, id: &str, mut user: User) -> Result<()> {
        let oid = parse_object_id(id)?;
        user.id = None;
        let fields =
            to_document(&user).map_err(|e| ThreadlineError::InvalidInput(e.to_string()))?;
        let res = self
            .store
            .bounded(
                "users.update_one",
                self.users
                    .update_one(doc! { "_id": oid }, doc! { "$set": fields }),
            )
            .await?;
        if res.matched_count == 0 {
            return Err(user_not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let oid = parse_object_id(id)?;
        let res = self
            .store
            .bounded("users.delete_one", self.users.delete_one(doc! { "_id": oid }))
            .await?;
        if res.deleted_count == 0 {
            return Err(user_not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> User {
        User {
            id: None,
            name: "John Doe".into(),
            username: "johndoe".into(),
            password: "A1b2C3d$".into(),
            birth_date: Utc.with_ymd_and_hms(2006, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn new_users_serialize_without_id() {
        let doc = to_document(&sample()).unwrap();
        assert!(!doc.contains_key("_id"));
        assert_eq!(doc.get_str("username").unwrap(), "johndoe");
        assert!(doc.get_datetime("birth_date").is_ok());
    }

    #[test]
    fn stored_users_round_trip_their_id() {
        let mut user = sample();
        user.id = Some(ObjectId::new());
        let doc = to_document(&user).unwrap();
        assert_eq!(doc.get_object_id("_id").unwrap(), user.id.unwrap());
    }
}
