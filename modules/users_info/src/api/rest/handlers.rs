use std::sync::Arc;

use axum::{
    extract::{Path, Json},
    http::{StatusCode, Uri},
    Extension,
};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::dto::{CreateUserReq, UpdateUserReq, UserDto};
use crate::api::rest::error::{domain_error_to_problem, user_not_found};
use crate::domain::service::Service;
use modkit::ProblemResponse;

type ApiResult<T> = Result<T, ProblemResponse>;

/// Ids are opaque to clients; one that does not parse names no user.
fn parse_id(raw: &str, uri: &Uri) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| user_not_found(raw, uri.path()))
}

/// List all users
pub async fn list_users(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
) -> ApiResult<Json<Vec<UserDto>>> {
    let users = svc
        .list_users()
        .await
        .map_err(|e| domain_error_to_problem(&e, uri.path()))?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

/// Get a specific user by ID
pub async fn get_user(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    Path(id): Path<String>,
) -> ApiResult<Json<UserDto>> {
    let id = parse_id(&id, &uri)?;
    let user = svc
        .get_user(id)
        .await
        .map_err(|e| domain_error_to_problem(&e, uri.path()))?;
    Ok(Json(user.into()))
}

/// Create a new user
pub async fn create_user(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    Json(req): Json<CreateUserReq>,
) -> ApiResult<(StatusCode, Json<UserDto>)> {
    let user = svc
        .create_user(req.into())
        .await
        .map_err(|e| domain_error_to_problem(&e, uri.path()))?;
    info!(user_id = %user.id, "Created user");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Update an existing user (PUT and PATCH)
pub async fn update_user(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserReq>,
) -> ApiResult<Json<UserDto>> {
    let id = parse_id(&id, &uri)?;
    let user = svc
        .update_user(id, req.into())
        .await
        .map_err(|e| domain_error_to_problem(&e, uri.path()))?;
    Ok(Json(user.into()))
}

/// Delete a user by ID
pub async fn delete_user(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, &uri)?;
    svc.delete_user(id)
        .await
        .map_err(|e| domain_error_to_problem(&e, uri.path()))?;
    info!(user_id = %id, "Deleted user");
    Ok(StatusCode::NO_CONTENT)
}
