//! End-to-end router tests: a small module registers routes through
//! `OperationBuilder`, the ingress gates them and serves docs and health.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use api_ingress::ApiIngress;
use axum::{
    body::Body,
    extract::{Json, Path, State},
    http::{header, Request, StatusCode},
    Router,
};
use modkit::{
    contracts::{OpenApiRegistry, RestHostModule},
    ConfigProvider, Module, ModuleCtx, ModuleCtxBuilder, OperationBuilder, RestfulModule,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use utoipa::ToSchema;

const TOKEN: &str = "test-token";

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct Widget {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct NewWidget {
    pub name: String,
}

/// Counts handler invocations so tests can assert that rejected requests never get through.
#[derive(Clone, Default)]
struct Calls(Arc<AtomicUsize>);

struct WidgetsModule {
    calls: Calls,
}

impl RestfulModule for WidgetsModule {
    fn register_rest(
        &self,
        _ctx: &ModuleCtx,
        router: Router,
        openapi: &dyn OpenApiRegistry,
    ) -> Result<Router> {
        let widgets: Router<Calls> = Router::new();
        let widgets = OperationBuilder::get("/widgets/{id}")
            .operation_id("widgets.get")
            .tag("widgets")
            .path_param("id", "Widget id")
            .handler(get_widget)
            .json_response_with_schema::<Widget>(openapi, 200, "Widget")
            .problem_response(openapi, 401, "Unauthorized")
            .register(widgets, openapi);
        let widgets = OperationBuilder::post("/widgets")
            .operation_id("widgets.create")
            .json_request::<NewWidget>(openapi, "Widget to create")
            .handler(create_widget)
            .json_response_with_schema::<Widget>(openapi, 201, "Created")
            .register(widgets, openapi);

        Ok(router.merge(widgets.with_state(self.calls.clone())))
    }
}

async fn get_widget(State(calls): State<Calls>, Path(id): Path<String>) -> Json<Widget> {
    calls.0.fetch_add(1, Ordering::SeqCst);
    Json(Widget {
        id,
        name: "w".into(),
    })
}

async fn create_widget(
    State(calls): State<Calls>,
    Json(req): Json<NewWidget>,
) -> (StatusCode, Json<Widget>) {
    calls.0.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::CREATED,
        Json(Widget {
            id: "1".into(),
            name: req.name,
        }),
    )
}

struct JsonConfig(Value);

impl ConfigProvider for JsonConfig {
    fn get_module_config(&self, module_name: &str) -> Option<&Value> {
        self.0.get(module_name)
    }
}

fn ctx(section: Value) -> ModuleCtx {
    ModuleCtxBuilder::new(CancellationToken::new())
        .with_config_provider(Arc::new(JsonConfig(json!({ "api_ingress": section }))))
        .build()
        .for_module("api_ingress")
}

async fn app(calls: Calls) -> (Arc<ApiIngress>, Router) {
    let ingress = Arc::new(ApiIngress::default());
    let ctx = ctx(json!({
        "enable_docs": true,
        "auth": { "token": TOKEN }
    }));
    ingress.init(&ctx).await.unwrap();

    let router = ingress.rest_prepare(&ctx, Router::new()).unwrap();
    let router = WidgetsModule { calls }
        .register_rest(&ctx, router, ingress.as_registry())
        .unwrap();
    let router = ingress.rest_finalize(&ctx, router).unwrap();
    (ingress, router)
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().uri(uri);
    if let Some(a) = auth {
        b = b.header(header::AUTHORIZATION, a);
    }
    b.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn missing_token_is_rejected_without_reaching_handler() {
    let calls = Calls::default();
    let (_, router) = app(calls.clone()).await;

    let resp = router
        .oneshot(
            Request::builder()
                .uri("/widgets/1")
                .header("x-request-id", "rid-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
    let body = body_json(resp).await;
    assert_eq!(body["status"], 401);
    assert_eq!(body["code"], "AUTH_UNAUTHORIZED");
    assert_eq!(body["request_id"], "rid-1");
    assert_eq!(body["instance"], "/widgets/1");
    assert_eq!(calls.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let calls = Calls::default();
    let (_, router) = app(calls.clone()).await;

    for auth in ["nope", "", "Bearer test-token", "bearer test-token", "test-token "] {
        let resp = router.clone().oneshot(get("/widgets/1", Some(auth))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "auth = {auth:?}");
    }

    let resp = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/widgets")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(calls.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn exact_header_value_proceeds() {
    let calls = Calls::default();
    let (_, router) = app(calls.clone()).await;

    let resp = router.oneshot(get("/widgets/7", Some(TOKEN))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["id"], "7");
    assert_eq!(calls.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn health_and_docs_are_public() {
    let (_, router) = app(Calls::default()).await;

    for uri in ["/health", "/healthz", "/openapi.json", "/docs"] {
        let resp = router.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "uri = {uri}");
    }

    let resp = router.oneshot(get("/health", None)).await.unwrap();
    let health = body_json(resp).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["timestamp"].is_string());
}

#[tokio::test]
async fn openapi_lists_operations_schemas_and_token_auth() {
    let (_, router) = app(Calls::default()).await;

    let resp = router.oneshot(get("/openapi.json", None)).await.unwrap();
    let doc = body_json(resp).await;

    assert_eq!(doc["openapi"], "3.0.3");
    assert_eq!(doc["paths"]["/widgets/{id}"]["get"]["operationId"], "widgets.get");
    assert_eq!(doc["paths"]["/widgets"]["post"]["operationId"], "widgets.create");
    assert_eq!(
        doc["paths"]["/widgets"]["post"]["responses"]["201"]["content"]["application/json"]
            ["schema"]["$ref"],
        "#/components/schemas/Widget"
    );
    assert!(doc["components"]["schemas"].get("NewWidget").is_some());
    assert!(doc["components"]["schemas"].get("Problem").is_some());
    assert_eq!(doc["components"]["securitySchemes"]["tokenAuth"]["type"], "apiKey");
    assert_eq!(doc["security"][0]["tokenAuth"], json!([]));
}

#[tokio::test]
async fn duplicate_operations_keep_the_first() {
    let (ingress, _) = app(Calls::default()).await;

    let again = OperationBuilder::<_, _, ()>::get("/widgets/{id}")
        .operation_id("widgets.get.dup")
        .handler(|| async { "dup" })
        .json_response(200, "dup");
    ingress.register_operation(again.spec());

    let doc = ingress.build_openapi().unwrap();
    assert_eq!(doc["paths"]["/widgets/{id}"]["get"]["operationId"], "widgets.get");
}

#[tokio::test]
async fn init_fails_without_a_reference_token() {
    let ingress = ApiIngress::default();

    let empty = ctx(json!({ "auth": { "token": "" } }));
    assert!(ingress.init(&empty).await.is_err());

    let unset_env = ctx(json!({ "auth": { "token_env": "API_INGRESS_IT_UNSET_TOKEN" } }));
    assert!(ingress.init(&unset_env).await.is_err());

    // rest phase refuses to build an ungated router
    assert!(ingress.rest_prepare(&empty, Router::new()).is_err());
}

#[tokio::test]
async fn init_reads_token_from_named_env_var() {
    std::env::set_var("API_INGRESS_IT_TOKEN", "env-token");
    let ingress = Arc::new(ApiIngress::default());
    let ctx = ctx(json!({ "auth": { "token_env": "API_INGRESS_IT_TOKEN" } }));
    ingress.init(&ctx).await.unwrap();

    let router = ingress.rest_prepare(&ctx, Router::new()).unwrap();
    let router = WidgetsModule {
        calls: Calls::default(),
    }
    .register_rest(&ctx, router, ingress.as_registry())
    .unwrap();
    let router = ingress.rest_finalize(&ctx, router).unwrap();

    let resp = router
        .clone()
        .oneshot(get("/widgets/1", Some("env-token")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // docs are off by default
    let resp = router.oneshot(get("/openapi.json", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn server_serves_until_cancelled() {
    use modkit::contracts::StatefulModule;

    let ingress = Arc::new(ApiIngress::default());
    let ctx = ctx(json!({ "bind_addr": "127.0.0.1:0", "auth": { "token": TOKEN } }));
    ingress.init(&ctx).await.unwrap();
    let router = ingress.rest_prepare(&ctx, Router::new()).unwrap();
    ingress.rest_finalize(&ctx, router).unwrap();

    let cancel = CancellationToken::new();
    ingress.start(cancel.clone()).await.unwrap();
    let addr = ingress.bound_addr().unwrap();
    assert_ne!(addr.port(), 0);

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        assert!(buf.starts_with("HTTP/1.1 200"), "{buf}");
    }

    cancel.cancel();
    ingress.stop(cancel).await.unwrap();
}

#[tokio::test]
async fn routes_added_without_operation_builder_are_gated() {
    let ingress = Arc::new(ApiIngress::default());
    let ctx = ctx(json!({ "auth": { "token": TOKEN } }));
    ingress.init(&ctx).await.unwrap();

    let router = ingress.rest_prepare(&ctx, Router::new()).unwrap();
    let router = router.route("/raw", axum::routing::get(|| async { "raw" }));
    let router = ingress.rest_finalize(&ctx, router).unwrap();

    let resp = router.clone().oneshot(get("/raw", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = router.oneshot(get("/raw", Some(TOKEN))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
