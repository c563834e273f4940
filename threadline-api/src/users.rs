use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use threadline_store::User;

use crate::{AppState, error::ApiError};

/// Body of `POST /users` and `PUT /users/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, deserialize_with = "birth_date")]
    pub birth_date: Option<DateTime<Utc>>,
}

/// What the API returns for a user. The password never leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub username: String,
    pub birth_date: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.map(|oid| oid.to_hex()).unwrap_or_default(),
            name: user.name,
            username: user.username,
            birth_date: user.birth_date,
        }
    }
}

/// Accepts RFC 3339 timestamps as well as bare `YYYY-MM-DD` dates.
fn birth_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid birth_date: {raw}")))
}

impl UserRequest {
    /// Check required fields and the password rule, producing a storable user.
    pub fn validate(self) -> Result<User, ApiError> {
        for (field, value) in [
            ("name", &self.name),
            ("username", &self.username),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::BadRequest(format!("{field} is required")));
            }
        }
        let birth_date = self
            .birth_date
            .ok_or_else(|| ApiError::BadRequest("birth_date is required".into()))?;
        if self.password.contains(self.username.as_str()) {
            return Err(ApiError::BadRequest(
                "password should not match the username".into(),
            ));
        }
        Ok(User {
            id: None,
            name: self.name.trim().to_string(),
            username: self.username.trim().to_string(),
            password: self.password,
            birth_date,
        })
    }
}

fn body(payload: Result<Json<UserRequest>, JsonRejection>) -> Result<UserRequest, ApiError> {
    payload
        .map(|Json(req)| req)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.users.get_all().await?;
    tracing::debug!(count = users.len(), "api.users.list");
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.users.get_by_id(&id).await?;
    Ok(Json(user.into()))
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = body(payload)?.validate()?;
    let id = state.users.create(user.clone()).await?;
    tracing::info!(%id, username = %user.username, "api.users.created");
    let mut created = UserResponse::from(user);
    created.id = id;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = body(payload)?.validate()?;
    state.users.update(&id, user.clone()).await?;
    tracing::info!(%id, "api.users.updated");
    let mut updated = UserResponse::from(user);
    updated.id = id;
    Ok(Json(updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.users.delete(&id).await?;
    tracing::info!(%id, "api.users.deleted");
    Ok(StatusCode::NO_CONTENT)
}
