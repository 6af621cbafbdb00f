use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    middleware::CurrentUser,
    models::{SetRoleRequest, UserResponse},
    utils::ValidatedJson,
    AppState,
};

#[utoipa::path(
    patch,
    path = "/users/{user_id}/role",
    params(("user_id" = Uuid, Path, description = "User to update")),
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserResponse),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn set_role(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<SetRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .permissions
        .set_role(&current.user, user_id, req.role)
        .await?;
    Ok(Json(UserResponse::from(user)))
}
