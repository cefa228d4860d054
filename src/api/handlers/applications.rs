//! Application (namespace) handlers.

use axum::{
    Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::users::bad_request;
use crate::error::EngineError;
use crate::store::applications;

#[derive(Debug, Deserialize)]
pub struct CreateApplication {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationPayload {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

pub async fn create(
    Extension(pool): Extension<PgPool>,
    Json(body): Json<CreateApplication>,
) -> Result<Response, EngineError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Ok(bad_request("application name is required"));
    }

    let id = applications::create(&pool, name, body.description.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "application_id": id }))).into_response())
}

pub async fn list(
    Extension(pool): Extension<PgPool>,
) -> Result<Json<Vec<ApplicationPayload>>, EngineError> {
    let records = applications::list(&pool).await?;
    Ok(Json(
        records
            .into_iter()
            .map(|record| ApplicationPayload {
                id: record.id,
                name: record.name,
                description: record.description,
            })
            .collect(),
    ))
}
