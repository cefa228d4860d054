//! Token issuance: password and client-credentials grants.

use axum::{Extension, response::Json};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

use crate::cli::globals::GlobalArgs;
use crate::credentials::{self, SubjectKind};
use crate::denorm::group_adjacent;
use crate::error::EngineError;
use crate::store::{clients, users};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

pub async fn issue(
    Extension(pool): Extension<PgPool>,
    Extension(globals): Extension<GlobalArgs>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, EngineError> {
    match body.grant_type.as_str() {
        "password" => password_grant(&pool, &globals, &body).await,
        "client_credentials" => client_grant(&pool, &globals, &body).await,
        other => Err(EngineError::authentication(format!(
            "unsupported grant type: {other}"
        ))),
    }
}

async fn password_grant(
    pool: &PgPool,
    globals: &GlobalArgs,
    body: &TokenRequest,
) -> Result<Json<TokenResponse>, EngineError> {
    let (Some(username), Some(password)) = (body.username.as_deref(), body.password.as_deref())
    else {
        return Err(EngineError::authentication(
            "password grant requires username and password",
        ));
    };

    // One row per held role; collapse before minting.
    let rows = users::login_rows(pool, username).await?;
    let accounts = group_adjacent(&rows, |row| row.user_id, |row| row.role_name.clone());
    let Some(account) = accounts.first() else {
        return Err(EngineError::authentication("invalid credentials"));
    };

    if !credentials::verify_password(password, &account.head.password_hash) {
        return Err(EngineError::authentication("invalid credentials"));
    }

    debug!(username, roles = ?account.values, "user authenticated");

    let token = credentials::mint_token(
        account.head.subject_id,
        SubjectKind::User,
        &account.head.username,
        globals.jwt_secret.expose_secret(),
        Some(globals.token_ttl_seconds),
    )
    .map_err(|err| EngineError::configuration(err.to_string()))?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: Some(globals.token_ttl_seconds),
    }))
}

async fn client_grant(
    pool: &PgPool,
    globals: &GlobalArgs,
    body: &TokenRequest,
) -> Result<Json<TokenResponse>, EngineError> {
    let (Some(client_id), Some(client_secret)) =
        (body.client_id.as_deref(), body.client_secret.as_deref())
    else {
        return Err(EngineError::authentication(
            "client grant requires client_id and client_secret",
        ));
    };

    let Some(record) = clients::by_client_id(pool, client_id).await? else {
        return Err(EngineError::authentication("invalid credentials"));
    };

    if record.revoked {
        return Err(EngineError::authorization("client credentials revoked"));
    }

    let stored = credentials::decrypt_secret(
        &record.secret_enc,
        globals.master_secret.expose_secret(),
    )
    .map_err(|err| EngineError::configuration(err.to_string()))?;

    if stored != client_secret {
        return Err(EngineError::authentication("invalid credentials"));
    }

    debug!(client_id, "client authenticated");

    let token = credentials::mint_token(
        record.subject_id,
        SubjectKind::Client,
        &record.client_id,
        globals.jwt_secret.expose_secret(),
        Some(globals.token_ttl_seconds),
    )
    .map_err(|err| EngineError::configuration(err.to_string()))?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: Some(globals.token_ttl_seconds),
    }))
}
