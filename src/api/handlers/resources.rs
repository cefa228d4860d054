//! Resource management handlers. Creating a resource also creates its
//! standard permission set, atomically.

use axum::{
    Extension,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::users::bad_request;
use crate::denorm::{self, ResourcePermissions};
use crate::error::EngineError;
use crate::store::{applications, resources};

#[derive(Debug, Deserialize)]
pub struct CreateResource {
    pub name: String,
    /// Defaults to the seeded root application when absent.
    pub application_id: Option<Uuid>,
}

pub async fn create(
    Extension(pool): Extension<PgPool>,
    Json(body): Json<CreateResource>,
) -> Result<Response, EngineError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Ok(bad_request("resource name is required"));
    }

    if resources::by_name(&pool, name).await?.is_some() {
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({ "error": "resource already exists" })),
        )
            .into_response());
    }

    let application_id = match body.application_id {
        Some(id) => id,
        None => {
            applications::first(&pool)
                .await?
                .ok_or_else(|| EngineError::not_found("application"))?
                .id
        }
    };

    let resource_id = resources::create(&pool, application_id, name).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "resource_id": resource_id })),
    )
        .into_response())
}

/// Resource → action listing for all live resources.
pub async fn list(
    Extension(pool): Extension<PgPool>,
) -> Result<Json<Vec<ResourcePermissions>>, EngineError> {
    let rows = resources::permission_rows(&pool).await?;
    Ok(Json(denorm::resource_tree(&rows)))
}

pub async fn remove(
    Extension(pool): Extension<PgPool>,
    Path(resource_id): Path<Uuid>,
) -> Result<Response, EngineError> {
    resources::soft_delete(&pool, resource_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
