//! Explicit module registry.
//!
//! Each module crate exposes a [`Registrator`]; the binary hands the list to the
//! runtime, which collects every capability under the module's name, checks the
//! wiring and orders modules so that declared dependencies run first.

use axum::Router;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use thiserror::Error;

use crate::context::ModuleCtx;
use crate::contracts::{DbModule, Module, OpenApiRegistry, RestHostModule, RestfulModule, StatefulModule};

/// One module with every capability it registered.
pub struct ModuleEntry {
    pub name: &'static str,
    pub deps: &'static [&'static str],
    pub core: Arc<dyn Module>,
    pub rest: Option<Arc<dyn RestfulModule>>,
    pub rest_host: Option<Arc<dyn RestHostModule>>,
    pub db: Option<Arc<dyn DbModule>>,
    pub stateful: Option<Arc<dyn StatefulModule>>,
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let caps: Vec<&str> = [
            ("rest", self.rest.is_some()),
            ("rest_host", self.rest_host.is_some()),
            ("db", self.db.is_some()),
            ("stateful", self.stateful.is_some()),
        ]
        .into_iter()
        .filter_map(|(cap, present)| present.then_some(cap))
        .collect();
        f.debug_struct("ModuleEntry")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("capabilities", &caps)
            .finish()
    }
}

/// A module crate's registration function.
#[derive(Clone, Copy)]
pub struct Registrator(pub fn(&mut RegistryBuilder));

/// Modules in dependency order, ready to be driven through the phases.
pub struct ModuleRegistry {
    modules: Vec<ModuleEntry>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|m| m.name))
            .finish()
    }
}

impl ModuleRegistry {
    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    /// Run every registrator against one builder, then validate and order.
    pub fn build(registrators: &[Registrator]) -> Result<Self, RegistryError> {
        let mut b = RegistryBuilder::default();
        for Registrator(register) in registrators {
            register(&mut b);
        }
        b.build_topo_sorted()
    }

    pub async fn run_init_phase(&self, base_ctx: &ModuleCtx) -> Result<(), RegistryError> {
        for e in &self.modules {
            let ctx = base_ctx.clone().for_module(e.name);
            if let Err(source) = e.core.init(&ctx).await {
                return Err(RegistryError::Init {
                    module: e.name,
                    source,
                });
            }
        }
        Ok(())
    }

    pub async fn run_db_phase(&self, db: &modkit_db::DbHandle) -> Result<(), RegistryError> {
        for (name, m) in self.modules.iter().filter_map(|e| Some((e.name, e.db.as_ref()?))) {
            tracing::debug!(module = name, "running migrations");
            if let Err(source) = m.migrate(db).await {
                return Err(RegistryError::DbMigrate { module: name, source });
            }
        }
        Ok(())
    }

    /// Host `rest_prepare`, every provider's `register_rest`, host `rest_finalize`.
    pub fn run_rest_phase(&self, base_ctx: &ModuleCtx, router: Router) -> Result<Router, RegistryError> {
        let mut hosts = self
            .modules
            .iter()
            .filter_map(|e| Some((e.name, e.rest_host.as_ref()?)));

        let Some((host_name, host)) = hosts.next() else {
            if self.modules.iter().any(|e| e.rest.is_some()) {
                return Err(RegistryError::RestRequiresHost);
            }
            return Ok(router);
        };
        if hosts.next().is_some() {
            return Err(RegistryError::MultipleRestHosts);
        }

        let host_ctx = base_ctx.clone().for_module(host_name);
        let openapi: &dyn OpenApiRegistry = host.as_registry();

        let mut router = host
            .rest_prepare(&host_ctx, router)
            .map_err(|source| RegistryError::RestPrepare {
                module: host_name,
                source,
            })?;

        for (name, rest) in self.modules.iter().filter_map(|e| Some((e.name, e.rest.as_ref()?))) {
            let ctx = base_ctx.clone().for_module(name);
            router = rest
                .register_rest(&ctx, router, openapi)
                .map_err(|source| RegistryError::RestRegister { module: name, source })?;
        }

        host.rest_finalize(&host_ctx, router)
            .map_err(|source| RegistryError::RestFinalize {
                module: host_name,
                source,
            })
    }

    pub async fn run_start_phase(&self, cancel: CancellationToken) -> Result<(), RegistryError> {
        for (name, m) in self.stateful() {
            if let Err(source) = m.start(cancel.clone()).await {
                return Err(RegistryError::Start { module: name, source });
            }
        }
        Ok(())
    }

    /// Stops in reverse order; failures are logged and do not abort the phase.
    pub async fn run_stop_phase(&self, cancel: CancellationToken) {
        let started: Vec<_> = self.stateful().collect();
        for (name, m) in started.into_iter().rev() {
            if let Err(err) = m.stop(cancel.clone()).await {
                tracing::warn!(module = name, error = %err, "Failed to stop module");
            }
        }
    }

    fn stateful(&self) -> impl Iterator<Item = (&'static str, &Arc<dyn StatefulModule>)> + '_ {
        self.modules
            .iter()
            .filter_map(|e| Some((e.name, e.stateful.as_ref()?)))
    }
}

/// Capabilities collected for one name before validation.
struct Pending {
    name: &'static str,
    deps: &'static [&'static str],
    core: Option<Arc<dyn Module>>,
    rest: Option<Arc<dyn RestfulModule>>,
    rest_host: Option<Arc<dyn RestHostModule>>,
    db: Option<Arc<dyn DbModule>>,
    stateful: Option<Arc<dyn StatefulModule>>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    pending: Vec<Pending>,
    errors: Vec<String>,
}

impl RegistryBuilder {
    fn slot(&mut self, name: &'static str) -> &mut Pending {
        let idx = match self.pending.iter().position(|p| p.name == name) {
            Some(idx) => idx,
            None => {
                self.pending.push(Pending {
                    name,
                    deps: &[],
                    core: None,
                    rest: None,
                    rest_host: None,
                    db: None,
                    stateful: None,
                });
                self.pending.len() - 1
            }
        };
        &mut self.pending[idx]
    }

    pub fn register_core_with_meta(
        &mut self,
        name: &'static str,
        deps: &'static [&'static str],
        m: Arc<dyn Module>,
    ) {
        let slot = self.slot(name);
        if slot.core.is_some() {
            self.errors.push(format!("Module '{name}' is already registered"));
            return;
        }
        slot.core = Some(m);
        slot.deps = deps;
    }

    pub fn register_rest_with_meta(&mut self, name: &'static str, m: Arc<dyn RestfulModule>) {
        self.slot(name).rest = Some(m);
    }

    pub fn register_rest_host_with_meta(&mut self, name: &'static str, m: Arc<dyn RestHostModule>) {
        if let Some(existing) = self.pending.iter().find(|p| p.rest_host.is_some()) {
            self.errors.push(format!(
                "Multiple REST host modules detected: '{}' and '{name}'",
                existing.name
            ));
            return;
        }
        self.slot(name).rest_host = Some(m);
    }

    pub fn register_db_with_meta(&mut self, name: &'static str, m: Arc<dyn DbModule>) {
        self.slot(name).db = Some(m);
    }

    pub fn register_stateful_with_meta(&mut self, name: &'static str, m: Arc<dyn StatefulModule>) {
        self.slot(name).stateful = Some(m);
    }

    /// Validate the wiring and order modules so that dependencies come first;
    /// independent modules keep registration order.
    pub fn build_topo_sorted(self) -> Result<ModuleRegistry, RegistryError> {
        if !self.errors.is_empty() {
            return Err(RegistryError::InvalidRegistryConfiguration {
                errors: self.errors,
            });
        }

        let known: HashSet<&'static str> = self.pending.iter().map(|p| p.name).collect();
        for p in &self.pending {
            if p.core.is_none() {
                return Err(RegistryError::UnknownModule(p.name.to_string()));
            }
            if let Some(missing) = p.deps.iter().find(|d| !known.contains(*d)) {
                return Err(RegistryError::UnknownDependency {
                    module: p.name.to_string(),
                    depends_on: (*missing).to_string(),
                });
            }
        }

        // Repeatedly take the first module whose dependencies are all placed.
        let mut remaining = self.pending;
        let mut placed: HashSet<&'static str> = HashSet::new();
        let mut modules = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let Some(idx) = remaining
                .iter()
                .position(|p| p.deps.iter().all(|d| placed.contains(d)))
            else {
                return Err(RegistryError::CycleDetected {
                    path: cycle_path(&remaining, &placed),
                });
            };
            let p = remaining.remove(idx);
            placed.insert(p.name);
            let Some(core) = p.core else {
                return Err(RegistryError::UnknownModule(p.name.to_string()));
            };
            modules.push(ModuleEntry {
                name: p.name,
                deps: p.deps,
                core,
                rest: p.rest,
                rest_host: p.rest_host,
                db: p.db,
                stateful: p.stateful,
            });
        }

        tracing::info!(
            modules = ?modules.iter().map(|e| e.name).collect::<Vec<_>>(),
            "Module dependency order resolved"
        );
        Ok(ModuleRegistry { modules })
    }
}

/// Follow unplaced dependencies from the first stuck module until one repeats.
fn cycle_path(stuck: &[Pending], placed: &HashSet<&'static str>) -> Vec<&'static str> {
    let mut path = vec![stuck[0].name];
    loop {
        let current = path[path.len() - 1];
        let next = stuck
            .iter()
            .find(|p| p.name == current)
            .and_then(|p| p.deps.iter().copied().find(|d| !placed.contains(d)));
        let Some(next) = next else {
            return path;
        };
        if let Some(start) = path.iter().position(|n| *n == next) {
            let mut cycle = path.split_off(start);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("initialization failed for module '{module}'")]
    Init {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("start failed for module '{module}'")]
    Start {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("DB migration failed for module '{module}'")]
    DbMigrate {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("REST prepare failed for host module '{module}'")]
    RestPrepare {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("REST registration failed for module '{module}'")]
    RestRegister {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("REST finalize failed for host module '{module}'")]
    RestFinalize {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("modules registered REST routes but no module hosts them")]
    RestRequiresHost,
    #[error("multiple REST host modules; exactly one is allowed")]
    MultipleRestHosts,
    #[error("capability registered for unknown module '{0}'")]
    UnknownModule(String),
    #[error("module '{module}' depends on unknown '{depends_on}'")]
    UnknownDependency { module: String, depends_on: String },
    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<&'static str> },
    #[error("invalid registry configuration: {}", errors.join("; "))]
    InvalidRegistryConfiguration { errors: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, Router};
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::api::OpenApiRegistry;
    use crate::context::{ModuleCtx, ModuleCtxBuilder};
    use crate::contracts;

    /* --------------------------- Test helpers ------------------------- */
    #[derive(Default)]
    struct DummyCore;
    #[async_trait::async_trait]
    impl contracts::Module for DummyCore {
        async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FailingCore;
    #[async_trait::async_trait]
    impl contracts::Module for FailingCore {
        async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    #[derive(Default)]
    struct DummyRegistry {
        ops: Mutex<Vec<String>>,
    }
    impl OpenApiRegistry for DummyRegistry {
        fn register_operation(&self, spec: &crate::api::OperationSpec) {
            self.ops.lock().unwrap().push(spec.path.clone());
        }
        fn ensure_schema_raw(
            &self,
            name: &str,
            _schemas: Vec<(
                String,
                utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>,
            )>,
        ) -> String {
            name.to_string()
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[derive(Default)]
    struct DummyRestHost {
        reg: DummyRegistry,
        calls: Mutex<Vec<&'static str>>,
    }
    impl contracts::RestHostModule for DummyRestHost {
        fn rest_prepare(&self, _ctx: &ModuleCtx, router: Router) -> anyhow::Result<Router> {
            self.calls.lock().unwrap().push("prepare");
            Ok(router)
        }
        fn rest_finalize(&self, _ctx: &ModuleCtx, router: Router) -> anyhow::Result<Router> {
            self.calls.lock().unwrap().push("finalize");
            Ok(router)
        }
        fn as_registry(&self) -> &dyn OpenApiRegistry {
            &self.reg
        }
    }

    #[derive(Default)]
    struct DummyRest;
    impl contracts::RestfulModule for DummyRest {
        fn register_rest(
            &self,
            _ctx: &ModuleCtx,
            router: Router,
            registry: &dyn OpenApiRegistry,
        ) -> anyhow::Result<Router> {
            Ok(crate::api::OperationBuilder::get("/dummy")
                .handler(|| async { "ok" })
                .json_response(200, "ok")
                .register(router, registry))
        }
    }

    fn base_ctx() -> ModuleCtx {
        ModuleCtxBuilder::new(CancellationToken::new()).build()
    }

    /* ------------------------------- Tests ---------------------------- */

    #[test]
    fn topo_sort_puts_dependencies_first() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("core_b", &["core_a"], Arc::new(DummyCore));
        b.register_core_with_meta("core_a", &[], Arc::new(DummyCore));

        let reg = b.build_topo_sorted().unwrap();
        let order: Vec<_> = reg.modules().iter().map(|m| m.name).collect();
        assert_eq!(order, vec!["core_a", "core_b"]);
    }

    #[test]
    fn independent_modules_keep_registration_order() {
        fn reg_x(b: &mut RegistryBuilder) {
            b.register_core_with_meta("x", &[], Arc::new(DummyCore));
        }
        fn reg_y(b: &mut RegistryBuilder) {
            b.register_core_with_meta("y", &[], Arc::new(DummyCore));
        }
        let reg = ModuleRegistry::build(&[Registrator(reg_y), Registrator(reg_x)]).unwrap();
        let order: Vec<_> = reg.modules().iter().map(|m| m.name).collect();
        assert_eq!(order, vec!["y", "x"]);
    }

    #[test]
    fn unknown_dependency_error() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("core_a", &["missing_dep"], Arc::new(DummyCore));

        match b.build_topo_sorted().unwrap_err() {
            RegistryError::UnknownDependency { module, depends_on } => {
                assert_eq!(module, "core_a");
                assert_eq!(depends_on, "missing_dep");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn capability_without_core_is_rejected() {
        let mut b = RegistryBuilder::default();
        b.register_rest_with_meta("ghost", Arc::new(DummyRest));
        assert!(matches!(
            b.build_topo_sorted().unwrap_err(),
            RegistryError::UnknownModule(name) if name == "ghost"
        ));
    }

    #[test]
    fn cycle_is_reported_with_path() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("a", &["b"], Arc::new(DummyCore));
        b.register_core_with_meta("b", &["c"], Arc::new(DummyCore));
        b.register_core_with_meta("c", &["a"], Arc::new(DummyCore));
        b.register_core_with_meta("d", &[], Arc::new(DummyCore));

        match b.build_topo_sorted().unwrap_err() {
            RegistryError::CycleDetected { path } => {
                assert!(path.contains(&"a") && path.contains(&"b") && path.contains(&"c"));
                assert!(!path.contains(&"d"));
                let msg = RegistryError::CycleDetected { path }.to_string();
                assert!(msg.contains("->"));
            }
            other => panic!("expected CycleDetected, got: {other:?}"),
        }
    }

    #[test]
    fn duplicate_core_and_second_host_are_configuration_errors() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("a", &[], Arc::new(DummyCore));
        b.register_core_with_meta("a", &[], Arc::new(DummyCore));
        b.register_rest_host_with_meta("a", Arc::new(DummyRestHost::default()));
        b.register_rest_host_with_meta("b", Arc::new(DummyRestHost::default()));

        match b.build_topo_sorted().unwrap_err() {
            RegistryError::InvalidRegistryConfiguration { errors } => {
                assert!(errors.iter().any(|e| e.contains("already registered")));
                assert!(errors.iter().any(|e| e.contains("Multiple REST host")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rest_requires_host_if_rest_modules_exist() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("svc", &[], Arc::new(DummyCore));
        b.register_rest_with_meta("svc", Arc::new(DummyRest));
        let reg = b.build_topo_sorted().unwrap();

        let err = reg.run_rest_phase(&base_ctx(), Router::new()).unwrap_err();
        assert!(matches!(err, RegistryError::RestRequiresHost));
    }

    #[tokio::test]
    async fn rest_phase_wraps_providers_between_prepare_and_finalize() {
        let host = Arc::new(DummyRestHost::default());
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("host", &[], Arc::new(DummyCore));
        b.register_rest_host_with_meta("host", host.clone());
        b.register_core_with_meta("svc", &["host"], Arc::new(DummyCore));
        b.register_rest_with_meta("svc", Arc::new(DummyRest));
        let reg = b.build_topo_sorted().unwrap();

        let router = reg.run_rest_phase(&base_ctx(), Router::new()).unwrap();

        assert_eq!(*host.calls.lock().unwrap(), vec!["prepare", "finalize"]);
        assert_eq!(*host.reg.ops.lock().unwrap(), vec!["/dummy".to_string()]);

        let resp = router
            .oneshot(Request::get("/dummy").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn init_failure_names_the_module() {
        let mut b = RegistryBuilder::default();
        b.register_core_with_meta("ok", &[], Arc::new(DummyCore));
        b.register_core_with_meta("bad", &["ok"], Arc::new(FailingCore));
        let reg = b.build_topo_sorted().unwrap();

        match reg.run_init_phase(&base_ctx()).await.unwrap_err() {
            RegistryError::Init { module, .. } => assert_eq!(module, "bad"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
