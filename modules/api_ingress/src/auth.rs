//! AccessGate: a single shared reference token checked against the
//! `Authorization` header of every gated request.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::request_id::XRequestId;

pub const AUTH_UNAUTHORIZED: &str = "AUTH_UNAUTHORIZED";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid credentials")]
    Invalid,
}

/// Immutable after construction; shared by every request.
pub struct AccessGate {
    token: Box<str>,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate").finish_non_exhaustive()
    }
}

impl AccessGate {
    /// Fails on an empty reference token.
    pub fn new(token: impl Into<String>) -> anyhow::Result<Self> {
        let token = token.into();
        if token.is_empty() {
            anyhow::bail!("reference token must not be empty");
        }
        Ok(Self {
            token: token.into_boxed_str(),
        })
    }

    /// Exact string equality against the reference token.
    pub fn check(&self, presented: Option<&str>) -> Result<(), AuthError> {
        match presented {
            None => Err(AuthError::Missing),
            Some(p) if p == &*self.token => Ok(()),
            Some(_) => Err(AuthError::Invalid),
        }
    }
}

/// Raw `Authorization` value, compared as-is against the reference token.
pub fn presented_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()
}

/// Route middleware: the request proceeds only when the gate accepts it.
pub async fn require_token(
    State(gate): State<Arc<AccessGate>>,
    req: Request,
    next: Next,
) -> Response {
    if let Err(err) = gate.check(presented_token(req.headers())) {
        let request_id = req
            .extensions()
            .get::<XRequestId>()
            .map(|r| r.0.clone());
        tracing::warn!(
            method = %req.method(),
            path = %req.uri().path(),
            reason = %err,
            "request rejected by access gate"
        );

        let mut problem = modkit::unauthorized(err.to_string())
            .0
            .with_code(AUTH_UNAUTHORIZED)
            .with_instance(req.uri().path());
        if let Some(id) = request_id {
            problem = problem.with_request_id(id);
        }
        return modkit::ProblemResponse(problem).into_response();
    }
    next.run(req).await
}
