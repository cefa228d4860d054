//! Caller self-inspection: the resolved permission tree for the
//! authenticated subject.

use axum::{Extension, response::Json};
use sqlx::PgPool;

use crate::denorm::{self, SubjectGrants};
use crate::error::EngineError;
use crate::guard::AuthSubject;
use crate::store::permissions;

/// The route is registered public so anonymous callers get a clean 401 from
/// here instead of a guard rejection.
pub async fn me(
    Extension(pool): Extension<PgPool>,
    subject: Option<Extension<AuthSubject>>,
) -> Result<Json<SubjectGrants>, EngineError> {
    let Some(Extension(subject)) = subject else {
        return Err(EngineError::authentication("authentication required"));
    };

    let rows = permissions::subject_permission_rows(&pool, subject.subject_id()).await?;
    let tree = denorm::subject_tree(&rows);
    Ok(Json(tree.into_iter().next().unwrap_or(SubjectGrants {
        subject_id: subject.subject_id(),
        roles: Vec::new(),
    })))
}
