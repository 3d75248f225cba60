use axum::{Extension, Router};
use modkit::api::{Missing, OpenApiRegistry, OperationBuilder};
use std::sync::Arc;

use crate::api::rest::{dto, handlers};
use crate::domain::service::Service;

type Op = OperationBuilder<Missing, Missing, ()>;

pub fn register_routes(
    mut router: Router,
    openapi: &dyn OpenApiRegistry,
    service: Arc<Service>,
) -> anyhow::Result<Router> {
    // POST /users - Create a new user
    router = Op::post("/users")
        .operation_id("users_info.create_user")
        .summary("Create a new user")
        .tag("users")
        .json_request::<dto::CreateUserReq>(openapi, "User creation data")
        .handler(handlers::create_user)
        .json_response_with_schema::<dto::UserDto>(openapi, 201, "Created user")
        .problem_response(openapi, 401, "Unauthorized")
        .problem_response(openapi, 500, "Internal Server Error")
        .register(router, openapi);

    // GET /users - List all users
    router = Op::get("/users")
        .operation_id("users_info.list_users")
        .summary("List all users")
        .description("All users in ascending creation order")
        .tag("users")
        .handler(handlers::list_users)
        .json_list_response_with_schema::<dto::UserDto>(openapi, 200, "List of users")
        .problem_response(openapi, 401, "Unauthorized")
        .problem_response(openapi, 500, "Internal Server Error")
        .register(router, openapi);

    // GET /users/{id} - Get a specific user
    router = Op::get("/users/{id}")
        .operation_id("users_info.get_user")
        .summary("Get user by ID")
        .tag("users")
        .path_param_uuid("id", "User UUID")
        .handler(handlers::get_user)
        .json_response_with_schema::<dto::UserDto>(openapi, 200, "User found")
        .problem_response(openapi, 401, "Unauthorized")
        .problem_response(openapi, 404, "Not Found")
        .problem_response(openapi, 500, "Internal Server Error")
        .register(router, openapi);

    // PUT and PATCH /users/{id} - Partial update
    for (op, id) in [
        (Op::put("/users/{id}"), "users_info.update_user"),
        (Op::patch("/users/{id}"), "users_info.patch_user"),
    ] {
        router = op
            .operation_id(id)
            .summary("Update user")
            .description("Partial update; only provided fields change")
            .tag("users")
            .path_param_uuid("id", "User UUID")
            .json_request::<dto::UpdateUserReq>(openapi, "User update data")
            .handler(handlers::update_user)
            .json_response_with_schema::<dto::UserDto>(openapi, 200, "Updated user")
            .problem_response(openapi, 401, "Unauthorized")
            .problem_response(openapi, 404, "Not Found")
            .problem_response(openapi, 500, "Internal Server Error")
            .register(router, openapi);
    }

    // DELETE /users/{id} - Delete a user
    router = Op::delete("/users/{id}")
        .operation_id("users_info.delete_user")
        .summary("Delete user")
        .tag("users")
        .path_param_uuid("id", "User UUID")
        .handler(handlers::delete_user)
        .empty_response(204, "User deleted")
        .problem_response(openapi, 401, "Unauthorized")
        .problem_response(openapi, 404, "Not Found")
        .problem_response(openapi, 500, "Internal Server Error")
        .register(router, openapi);

    router = router.layer(Extension(service));

    Ok(router)
}
