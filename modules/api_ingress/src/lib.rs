use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::{ArcSwap, ArcSwapOption};
use axum::http::Method;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{routing::get, Router};
use dashmap::DashMap;
use modkit::api::{OpenApiRegistry, OperationSpec};
use modkit::registry::RegistryBuilder;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

pub mod auth;
mod config;
mod model;
mod openapi;
pub mod request_id;
mod web;

pub use auth::{AccessGate, AuthError};
pub use config::{ApiIngressConfig, AuthConfig};

use model::{ComponentsRegistry, SchemaInsert};

pub const MODULE_NAME: &str = "api_ingress";

const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);
const STOP_TIMEOUT: Duration = Duration::from_secs(30);
const BODY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// Main API Ingress module: owns the HTTP server (rest_host), gates module
/// routes behind the [`AccessGate`] and collects typed operation specs to
/// emit a single OpenAPI document.
pub struct ApiIngress {
    config: ArcSwap<ApiIngressConfig>,
    // Set once in init; rest phase refuses to run without it.
    gate: ArcSwapOption<AccessGate>,
    components_registry: ArcSwap<ComponentsRegistry>,
    // Finalized router from REST phase, taken by `start`
    final_router: Mutex<Option<Router>>,

    // Duplicate detection (per (method, path) and per handler id)
    registered_routes: DashMap<(Method, String), ()>,
    registered_handlers: DashMap<String, ()>,

    operation_specs: DashMap<String, OperationSpec>,

    bound_addr: ArcSwapOption<SocketAddr>,
    server: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Default for ApiIngress {
    fn default() -> Self {
        Self::new(ApiIngressConfig::default())
    }
}

impl ApiIngress {
    pub fn new(config: ApiIngressConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            gate: ArcSwapOption::empty(),
            components_registry: ArcSwap::from_pointee(ComponentsRegistry::default()),
            final_router: Mutex::new(None),
            registered_routes: DashMap::new(),
            registered_handlers: DashMap::new(),
            operation_specs: DashMap::new(),
            bound_addr: ArcSwapOption::empty(),
            server: Mutex::new(None),
        }
    }

    pub fn get_config(&self) -> ApiIngressConfig {
        (**self.config.load()).clone()
    }

    /// Actual listening address once `start` has bound the socket.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr.load_full().map(|a| *a)
    }

    /// Build OpenAPI specification from registered operations and components.
    pub fn build_openapi(&self) -> Result<serde_json::Value> {
        let components = self.components_registry.load();
        let specs: Vec<OperationSpec> = self
            .operation_specs
            .iter()
            .map(|e| e.value().clone())
            .collect();
        tracing::info!("Building OpenAPI: found {} registered operations", specs.len());

        let doc = openapi::build_document(&specs, &components)?;
        Ok(serde_json::to_value(doc)?)
    }

    /// Global layers, outermost last: request id, trace, timeout, CORS, body limit.
    fn apply_global_layers(&self, mut router: Router) -> Router {
        let config = self.get_config();

        router = router.layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES));
        if config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }
        router = router.layer(TimeoutLayer::new(HANDLER_TIMEOUT));

        let x_request_id = request_id::header();
        router
            .layer(from_fn(request_id::push_req_id_to_extensions))
            .layer(request_id::create_trace_layer())
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(SetRequestIdLayer::new(x_request_id, request_id::MakeReqId))
    }
}

#[async_trait]
impl modkit::Module for ApiIngress {
    async fn init(&self, ctx: &modkit::ModuleCtx) -> Result<()> {
        let cfg: ApiIngressConfig = ctx.module_config_or_default()?;

        let token = cfg.auth.resolve_token()?;
        let gate = AccessGate::new(token).context("api_ingress: invalid reference token")?;
        self.gate.store(Some(Arc::new(gate)));

        tracing::info!(
            bind_addr = %cfg.bind_addr,
            enable_docs = cfg.enable_docs,
            cors_enabled = cfg.cors_enabled,
            "api_ingress initialized"
        );
        self.config.store(Arc::new(cfg));
        Ok(())
    }
}

// REST host role: prepare/finalize the router, but do not start the server here.
impl modkit::contracts::RestHostModule for ApiIngress {
    fn rest_prepare(&self, _ctx: &modkit::ModuleCtx, router: Router) -> Result<Router> {
        if self.gate.load().is_none() {
            anyhow::bail!("api_ingress: access gate is not initialized; run init first");
        }
        tracing::debug!("REST host prepared");
        Ok(router)
    }

    fn rest_finalize(&self, _ctx: &modkit::ModuleCtx, mut router: Router) -> Result<Router> {
        let config = self.get_config();
        let gate = self
            .gate
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("api_ingress: access gate is not initialized"))?;

        // Gate everything registered so far; routes added below stay public.
        if !router.has_routes() {
            tracing::warn!("no module routes registered; nothing to gate");
        } else {
            router = router.route_layer(from_fn_with_state(gate, auth::require_token));
        }

        router = router
            .route("/health", get(web::health_check))
            .route("/healthz", get(|| async { "ok" }));

        if config.enable_docs {
            // Build once, serve as static JSON
            let openapi_value = Arc::new(self.build_openapi()?);
            router = router
                .route(
                    "/openapi.json",
                    get({
                        use axum::{http::header, response::IntoResponse};
                        let v = openapi_value.clone();
                        move || async move {
                            let json = axum::Json((*v).clone());
                            ([(header::CACHE_CONTROL, "no-store")], json).into_response()
                        }
                    }),
                )
                .route("/docs", get(web::serve_docs));
        }

        let router = self.apply_global_layers(router);
        *self.final_router.lock() = Some(router.clone());

        tracing::debug!(
            operations = self.operation_specs.len(),
            "REST host finalized router"
        );
        Ok(router)
    }

    fn as_registry(&self) -> &dyn OpenApiRegistry {
        self
    }
}

#[async_trait]
impl modkit::contracts::StatefulModule for ApiIngress {
    /// Bind the socket and serve in the background until `cancel` fires.
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let cfg = self.get_config();
        let addr: SocketAddr = cfg
            .bind_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", cfg.bind_addr, e))?;

        // Take the router so the MutexGuard is dropped before awaits
        let stored = { self.final_router.lock().take() };
        let router = stored
            .ok_or_else(|| anyhow::anyhow!("api_ingress: REST phase did not produce a router"))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let local = listener.local_addr()?;
        self.bound_addr.store(Some(Arc::new(local)));
        tracing::info!("HTTP server bound on {}", local);

        let shutdown = async move {
            cancel.cancelled().await;
            tracing::info!("HTTP server shutting down gracefully (cancellation)");
        };
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .map_err(anyhow::Error::from)
        });
        *self.server.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self, _cancel: CancellationToken) -> Result<()> {
        let handle = { self.server.lock().take() };
        let Some(handle) = handle else {
            return Ok(());
        };
        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(joined) => {
                joined.context("HTTP server task panicked")??;
                tracing::info!("HTTP server stopped");
                Ok(())
            }
            Err(_) => {
                anyhow::bail!("HTTP server did not stop within {STOP_TIMEOUT:?}")
            }
        }
    }
}

impl OpenApiRegistry for ApiIngress {
    fn register_operation(&self, spec: &OperationSpec) {
        // "First wins": a second registration is a programmer error.
        if self
            .registered_handlers
            .insert(spec.handler_id.clone(), ())
            .is_some()
        {
            tracing::error!(
                handler_id = %spec.handler_id,
                method = %spec.method.as_str(),
                path = %spec.path,
                "Duplicate handler_id detected; ignoring subsequent registration"
            );
            return;
        }

        let route_key = (spec.method.clone(), spec.path.clone());
        if self.registered_routes.insert(route_key, ()).is_some() {
            tracing::error!(
                method = %spec.method.as_str(),
                path = %spec.path,
                "Duplicate (method, path) detected; ignoring subsequent registration"
            );
            return;
        }

        let operation_key = format!("{}:{}", spec.method.as_str(), spec.path);
        self.operation_specs
            .insert(operation_key.clone(), spec.clone());

        tracing::debug!(
            handler_id = %spec.handler_id,
            operation_key = %operation_key,
            total_operations = self.operation_specs.len(),
            "Registered API operation"
        );
    }

    fn ensure_schema_raw(
        &self,
        root_name: &str,
        schemas: Vec<(
            String,
            utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>,
        )>,
    ) -> String {
        // Copy-on-write snapshot
        let current = self.components_registry.load();
        let mut reg = (**current).clone();

        for (name, schema) in schemas {
            match reg.register_schema(name.clone(), schema) {
                SchemaInsert::Inserted => tracing::debug!(%name, "Registered schema"),
                SchemaInsert::Identical => {}
                SchemaInsert::Conflict => tracing::error!(
                    %name,
                    "Conflicting schema content under the same component key; keeping the first"
                ),
            }
        }

        self.components_registry.store(Arc::new(reg));
        root_name.to_string()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Register the ingress as core module, REST host and stateful server.
pub fn register(b: &mut RegistryBuilder) {
    let m = Arc::new(ApiIngress::default());
    b.register_core_with_meta(MODULE_NAME, &[], m.clone());
    b.register_rest_host_with_meta(MODULE_NAME, m.clone());
    b.register_stateful_with_meta(MODULE_NAME, m);
}
