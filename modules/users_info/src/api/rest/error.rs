use modkit::{Problem, ProblemResponse};

use crate::domain::error::DomainError;

pub const USERS_NOT_FOUND: &str = "USERS_NOT_FOUND";
pub const INTERNAL_DB: &str = "INTERNAL_DB";

/// Map domain errors to RFC 9457 problems; database details stay in the logs.
pub fn domain_error_to_problem(e: &DomainError, instance: &str) -> ProblemResponse {
    let problem: Problem = match e {
        DomainError::UserNotFound { id } => return user_not_found(&id.to_string(), instance),
        DomainError::Database { .. } => modkit::internal_error("An internal database error occurred")
            .0
            .with_code(INTERNAL_DB),
    };
    ProblemResponse(problem.with_instance(instance))
}

/// 404 for an id that names no user, including ids that are not even well-formed.
pub fn user_not_found(id: &str, instance: &str) -> ProblemResponse {
    let problem = modkit::not_found(format!("User with id {id} was not found"))
        .0
        .with_code(USERS_NOT_FOUND)
        .with_instance(instance);
    ProblemResponse(problem)
}
