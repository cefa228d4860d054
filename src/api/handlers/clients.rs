//! Client management handlers, including revocation and the optional
//! long-lived pinned token.

use axum::{
    Extension,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::users::bad_request;
use crate::cli::globals::GlobalArgs;
use crate::credentials::{self, SubjectKind};
use crate::error::EngineError;
use crate::store::{InsertOutcome, clients};

const MIN_SECRET_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct CreateClient {
    pub client_id: String,
    pub secret: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ClientPayload {
    pub subject_id: Uuid,
    pub client_id: String,
    pub name: String,
    pub revoked: bool,
    pub deleted: bool,
    pub has_pinned_token: bool,
}

#[derive(Debug, Serialize)]
pub struct LongLivedToken {
    pub access_token: String,
    pub token_type: String,
}

pub async fn create(
    Extension(pool): Extension<PgPool>,
    Extension(globals): Extension<GlobalArgs>,
    Json(body): Json<CreateClient>,
) -> Result<Response, EngineError> {
    let client_id = body.client_id.trim().to_string();
    if !valid_client_id(&client_id) {
        return Ok(bad_request("invalid client id"));
    }
    if body.secret.len() < MIN_SECRET_LEN {
        return Ok(bad_request("secret too short"));
    }
    if body.role_ids.is_empty() {
        return Ok(bad_request("at least one role is required"));
    }

    // Each client secret is encrypted independently with a fresh IV.
    let secret_enc = credentials::encrypt_secret(&body.secret, globals.master_secret.expose_secret())
        .map_err(|err| EngineError::configuration(err.to_string()))?;

    let new_client = clients::NewClient {
        name: body.name.unwrap_or_else(|| client_id.clone()),
        description: body.description,
        client_id,
        secret_enc,
        role_ids: body.role_ids,
    };

    match clients::create(&pool, new_client).await? {
        InsertOutcome::Created(subject_id) => Ok((
            StatusCode::CREATED,
            Json(json!({ "subject_id": subject_id })),
        )
            .into_response()),
        InsertOutcome::Conflict => Ok((
            StatusCode::CONFLICT,
            Json(json!({ "error": "client id already exists" })),
        )
            .into_response()),
    }
}

pub async fn list(
    Extension(pool): Extension<PgPool>,
) -> Result<Json<Vec<ClientPayload>>, EngineError> {
    let summaries = clients::list(&pool).await?;
    Ok(Json(
        summaries
            .into_iter()
            .map(|summary| ClientPayload {
                subject_id: summary.subject_id,
                client_id: summary.client_id,
                name: summary.name,
                revoked: summary.revoked,
                deleted: summary.deleted,
                has_pinned_token: summary.has_pinned_token,
            })
            .collect(),
    ))
}

/// Mint a non-expiring token and pin its hash on the client. The raw token
/// is returned exactly once; only the verifying hash is stored.
pub async fn mint_long_lived(
    Extension(pool): Extension<PgPool>,
    Extension(globals): Extension<GlobalArgs>,
    Path(subject_id): Path<Uuid>,
) -> Result<Json<LongLivedToken>, EngineError> {
    let record = clients::by_subject_id(&pool, subject_id)
        .await?
        .ok_or_else(|| EngineError::not_found("client"))?;

    if record.revoked {
        return Err(EngineError::authorization("client credentials revoked"));
    }

    let token = credentials::mint_token(
        record.subject_id,
        SubjectKind::Client,
        &record.client_id,
        globals.jwt_secret.expose_secret(),
        None,
    )
    .map_err(|err| EngineError::configuration(err.to_string()))?;

    let token_hash = credentials::hash_password(&token)
        .map_err(|err| EngineError::configuration(err.to_string()))?;
    clients::set_access_token_hash(&pool, subject_id, Some(&token_hash)).await?;

    Ok(Json(LongLivedToken {
        access_token: token,
        token_type: "Bearer".to_string(),
    }))
}

/// Clear the pinned hash, invalidating any outstanding long-lived token.
pub async fn clear_long_lived(
    Extension(pool): Extension<PgPool>,
    Path(subject_id): Path<Uuid>,
) -> Result<Response, EngineError> {
    clients::set_access_token_hash(&pool, subject_id, None).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn revoke(
    Extension(pool): Extension<PgPool>,
    Path(subject_id): Path<Uuid>,
) -> Result<Response, EngineError> {
    clients::set_revoked(&pool, subject_id, true).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn restore(
    Extension(pool): Extension<PgPool>,
    Path(subject_id): Path<Uuid>,
) -> Result<Response, EngineError> {
    clients::set_revoked(&pool, subject_id, false).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn remove(
    Extension(pool): Extension<PgPool>,
    Path(subject_id): Path<Uuid>,
) -> Result<Response, EngineError> {
    clients::soft_delete(&pool, subject_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn valid_client_id(client_id: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]{2,99}$").is_ok_and(|regex| regex.is_match(client_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_validation() {
        assert!(valid_client_id("svc-billing"));
        assert!(valid_client_id("admin-01h2xcejqtf2nbrexx3vqjhp41"));
        assert!(!valid_client_id("ab"));
        assert!(!valid_client_id("-leading"));
        assert!(!valid_client_id("has space"));
    }
}
