//! User management handlers.

use axum::{
    Extension,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::credentials;
use crate::denorm::{self, SubjectGrants};
use crate::error::EngineError;
use crate::store::{InsertOutcome, permissions, users};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UserPayload {
    pub subject_id: Uuid,
    pub username: String,
    pub name: String,
    pub description: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetPassword {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SetRoles {
    pub role_ids: Vec<Uuid>,
}

pub async fn create(
    Extension(pool): Extension<PgPool>,
    Json(body): Json<CreateUser>,
) -> Result<Response, EngineError> {
    let username = body.username.trim().to_lowercase();
    if !valid_username(&username) {
        return Ok(bad_request("invalid username"));
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        return Ok(bad_request("password too short"));
    }
    if body.role_ids.is_empty() {
        return Ok(bad_request("at least one role is required"));
    }

    let password_hash = credentials::hash_password(&body.password)
        .map_err(|err| EngineError::configuration(err.to_string()))?;

    let new_user = users::NewUser {
        name: body.name.unwrap_or_else(|| username.clone()),
        description: body.description,
        username,
        password_hash,
        role_ids: body.role_ids,
    };

    match users::create(&pool, new_user).await? {
        InsertOutcome::Created(subject_id) => Ok((
            StatusCode::CREATED,
            Json(json!({ "subject_id": subject_id })),
        )
            .into_response()),
        InsertOutcome::Conflict => Ok((
            StatusCode::CONFLICT,
            Json(json!({ "error": "username already exists" })),
        )
            .into_response()),
    }
}

pub async fn list(
    Extension(pool): Extension<PgPool>,
) -> Result<Json<Vec<UserPayload>>, EngineError> {
    let summaries = users::list(&pool).await?;
    Ok(Json(summaries.into_iter().map(payload_from).collect()))
}

pub async fn get_one(
    Extension(pool): Extension<PgPool>,
    Path(subject_id): Path<Uuid>,
) -> Result<Json<UserPayload>, EngineError> {
    let summary = users::by_subject_id(&pool, subject_id)
        .await?
        .ok_or_else(|| EngineError::not_found("user"))?;
    Ok(Json(payload_from(summary)))
}

/// Resolved role → resource → action tree for one user.
pub async fn permissions(
    Extension(pool): Extension<PgPool>,
    Path(subject_id): Path<Uuid>,
) -> Result<Json<SubjectGrants>, EngineError> {
    users::by_subject_id(&pool, subject_id)
        .await?
        .ok_or_else(|| EngineError::not_found("user"))?;

    let rows = permissions::subject_permission_rows(&pool, subject_id).await?;
    let tree = denorm::subject_tree(&rows);
    Ok(Json(tree.into_iter().next().unwrap_or(SubjectGrants {
        subject_id,
        roles: Vec::new(),
    })))
}

pub async fn set_password(
    Extension(pool): Extension<PgPool>,
    Path(subject_id): Path<Uuid>,
    Json(body): Json<SetPassword>,
) -> Result<Response, EngineError> {
    if body.password.len() < MIN_PASSWORD_LEN {
        return Ok(bad_request("password too short"));
    }

    let password_hash = credentials::hash_password(&body.password)
        .map_err(|err| EngineError::configuration(err.to_string()))?;
    users::set_password_hash(&pool, subject_id, &password_hash).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn set_roles(
    Extension(pool): Extension<PgPool>,
    Path(subject_id): Path<Uuid>,
    Json(body): Json<SetRoles>,
) -> Result<Response, EngineError> {
    if body.role_ids.is_empty() {
        return Ok(bad_request("at least one role is required"));
    }

    users::set_roles(&pool, subject_id, &body.role_ids).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn remove(
    Extension(pool): Extension<PgPool>,
    Path(subject_id): Path<Uuid>,
) -> Result<Response, EngineError> {
    users::soft_delete(&pool, subject_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn payload_from(summary: users::UserSummary) -> UserPayload {
    UserPayload {
        subject_id: summary.subject_id,
        username: summary.username,
        name: summary.name,
        description: summary.description,
        deleted: summary.deleted,
    }
}

fn valid_username(username: &str) -> bool {
    Regex::new(r"^[a-z0-9][a-z0-9._-]{2,99}$").is_ok_and(|regex| regex.is_match(username))
}

pub(super) fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation() {
        assert!(valid_username("alice"));
        assert!(valid_username("alice.smith-2"));
        assert!(!valid_username("al"));
        assert!(!valid_username("_leading"));
        assert!(!valid_username("spaces here"));
        assert!(!valid_username(""));
    }
}
