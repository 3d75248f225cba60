use std::sync::Arc;

use api_ingress::{request_id::XRequestId, ApiIngress};
use axum::{
    body::Body,
    extract::Extension,
    http::{Request, StatusCode},
    Router,
};
use modkit::{
    contracts::{OpenApiRegistry, RestHostModule},
    ConfigProvider, Module, ModuleCtx, ModuleCtxBuilder, OperationBuilder,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt; // for `oneshot`

struct JsonConfig(Value);

impl ConfigProvider for JsonConfig {
    fn get_module_config(&self, module_name: &str) -> Option<&Value> {
        self.0.get(module_name)
    }
}

async fn echo_request_id(Extension(XRequestId(id)): Extension<XRequestId>) -> String {
    id
}

async fn test_app() -> Router {
    let ingress = Arc::new(ApiIngress::default());
    let ctx: ModuleCtx = ModuleCtxBuilder::new(CancellationToken::new())
        .with_config_provider(Arc::new(JsonConfig(json!({
            "api_ingress": { "auth": { "token": "rid-token" } }
        }))))
        .build()
        .for_module("api_ingress");
    ingress.init(&ctx).await.unwrap();

    let registry: &dyn OpenApiRegistry = ingress.as_registry();
    let router = ingress.rest_prepare(&ctx, Router::new()).unwrap();
    let router = OperationBuilder::get("/echo")
        .handler(echo_request_id)
        .json_response(200, "Request id seen by the handler")
        .register(router, registry);
    ingress.rest_finalize(&ctx, router).unwrap()
}

fn header_of(resp: &axum::response::Response) -> Option<String> {
    resp.headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

#[tokio::test]
async fn generates_request_id_when_missing() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/echo")
                .header("authorization", "rid-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let request_id = header_of(&response).expect("x-request-id should be generated");
    assert!(!request_id.is_empty());

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body, request_id.as_bytes());
}

#[tokio::test]
async fn preserves_incoming_request_id() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_of(&response).as_deref(), Some("abc-123"));
}

#[tokio::test]
async fn includes_generated_request_id_in_problem() {
    let app = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let header = header_of(&response).expect("x-request-id on rejected request");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["request_id"], header.as_str());
}
