//! Role management handlers.

use axum::{
    Extension,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::users::bad_request;
use crate::denorm::{self, RoleGrant};
use crate::error::EngineError;
use crate::store::roles;

#[derive(Debug, Deserialize)]
pub struct CreateRole {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRole {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetPermissions {
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RolePayload {
    pub role_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub deleted: bool,
}

pub async fn create(
    Extension(pool): Extension<PgPool>,
    Json(body): Json<CreateRole>,
) -> Result<Response, EngineError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Ok(bad_request("role name is required"));
    }

    let role_id = roles::create(&pool, name, body.description.as_deref(), &body.permission_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "role_id": role_id }))).into_response())
}

/// Plain role records, including roles that hold no permissions yet.
pub async fn list(
    Extension(pool): Extension<PgPool>,
) -> Result<Json<Vec<RolePayload>>, EngineError> {
    let records = roles::list(&pool).await?;
    Ok(Json(
        records
            .into_iter()
            .map(|record| RolePayload {
                role_id: record.id,
                name: record.name,
                description: record.description,
                deleted: record.deleted,
            })
            .collect(),
    ))
}

/// Role → resource → action listing for all live roles.
pub async fn permissions_tree(
    Extension(pool): Extension<PgPool>,
) -> Result<Json<Vec<RoleGrant>>, EngineError> {
    let rows = roles::permission_rows(&pool).await?;
    Ok(Json(denorm::role_tree(&rows)))
}

pub async fn update(
    Extension(pool): Extension<PgPool>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<UpdateRole>,
) -> Result<Response, EngineError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Ok(bad_request("role name is required"));
    }

    roles::update(&pool, role_id, name, body.description.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn set_permissions(
    Extension(pool): Extension<PgPool>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<SetPermissions>,
) -> Result<Response, EngineError> {
    roles::by_id(&pool, role_id)
        .await?
        .ok_or_else(|| EngineError::not_found("role"))?;

    roles::set_permissions(&pool, role_id, &body.permission_ids).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn remove(
    Extension(pool): Extension<PgPool>,
    Path(role_id): Path<Uuid>,
) -> Result<Response, EngineError> {
    roles::soft_delete(&pool, role_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
