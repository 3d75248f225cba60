use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::Router;
use modkit::api::OpenApiRegistry;
use modkit::registry::RegistryBuilder;
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

use crate::api::rest::routes;
use crate::contract::client::UsersInfoApi;
use crate::domain::service::Service;
use crate::gateways::local::UsersInfoLocalClient;
use crate::infra::storage::{migrations::Migrator, SeaOrmUsersRepository};

pub const MODULE_NAME: &str = "users_info";

/// Users module: owns the `users` table, the REST surface and the in-process client.
#[derive(Default)]
pub struct UsersInfo {
    service: ArcSwapOption<Service>,
}

impl UsersInfo {
    /// In-process client for other modules; `None` before init.
    pub fn client(&self) -> Option<Arc<dyn UsersInfoApi>> {
        self.service
            .load_full()
            .map(|svc| Arc::new(UsersInfoLocalClient::new(svc)) as Arc<dyn UsersInfoApi>)
    }

    fn service(&self) -> anyhow::Result<Arc<Service>> {
        self.service
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("users_info is not initialized"))
    }
}

#[async_trait]
impl modkit::Module for UsersInfo {
    async fn init(&self, ctx: &modkit::ModuleCtx) -> anyhow::Result<()> {
        let db = ctx.db_required()?;
        let repo = SeaOrmUsersRepository::new(db.sea());
        self.service
            .store(Some(Arc::new(Service::new(Arc::new(repo)))));
        info!(engine = ?db.engine(), "users_info initialized");
        Ok(())
    }
}

#[async_trait]
impl modkit::DbModule for UsersInfo {
    async fn migrate(&self, db: &modkit_db::DbHandle) -> anyhow::Result<()> {
        Migrator::up(db.seaorm(), None).await?;
        debug!("users_info migrations applied");
        Ok(())
    }
}

impl modkit::RestfulModule for UsersInfo {
    fn register_rest(
        &self,
        _ctx: &modkit::ModuleCtx,
        router: Router,
        openapi: &dyn OpenApiRegistry,
    ) -> anyhow::Result<Router> {
        routes::register_routes(router, openapi, self.service()?)
    }
}

/// Register the module with its core, DB and REST capabilities.
pub fn register(b: &mut RegistryBuilder) {
    let m = Arc::new(UsersInfo::default());
    b.register_core_with_meta(MODULE_NAME, &[], m.clone());
    b.register_db_with_meta(MODULE_NAME, m.clone());
    b.register_rest_with_meta(MODULE_NAME, m);
}
