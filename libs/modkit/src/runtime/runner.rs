//! ModKit runtime runner.
//!
//! Supported DB modes:
//!   - `DbOptions::None`: modules get no DB in their contexts.
//!   - `DbOptions::Existing`: one shared `DbHandle` for every module; migrations run
//!     in the db phase and the pool is closed after the stop phase.
//!
//! One stable `ModuleCtx` is built up front and reused across all phases
//! (init → db → rest → start → wait → stop). Shutdown can be driven by OS signals,
//! an external `CancellationToken`, or an arbitrary future.

use crate::context::{ConfigProvider, ModuleCtxBuilder};
use crate::registry::{ModuleRegistry, Registrator};
use crate::runtime::shutdown;
use std::{future::Future, pin::Pin, sync::Arc};
use tokio_util::sync::CancellationToken;

/// How the runtime should provide DBs to modules.
pub enum DbOptions {
    /// No database integration. `ModuleCtx::db()` will be `None`.
    None,
    /// An already connected handle shared by all modules.
    Existing(Arc<modkit_db::DbHandle>),
}

/// How the runtime should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// Options for running the ModKit runner.
pub struct RunOptions {
    /// Provider of module config sections (raw JSON by module name).
    pub modules_cfg: Arc<dyn ConfigProvider>,
    /// DB strategy: none, or a shared handle.
    pub db: DbOptions,
    /// Shutdown strategy.
    pub shutdown: ShutdownOptions,
    /// Module registration functions, usually one per module crate.
    pub modules: Vec<Registrator>,
}

/// Full cycle: init → db → rest (sync) → start → wait → stop.
pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    let cancel = match &opts.shutdown {
        ShutdownOptions::Token(t) => t.clone(),
        _ => CancellationToken::new(),
    };

    // Spawn the shutdown waiter according to the chosen strategy.
    match opts.shutdown {
        ShutdownOptions::Signals => {
            let c = cancel.clone();
            tokio::spawn(async move {
                match shutdown::wait_for_shutdown().await {
                    Ok(()) => {
                        tracing::info!("shutdown: signal received");
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "shutdown: primary waiter failed; falling back to ctrl_c()"
                        );
                        let _ = tokio::signal::ctrl_c().await;
                    }
                }
                c.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                c.cancel();
            });
        }
        ShutdownOptions::Token(_) => {
            tracing::info!("shutdown: external token will control lifecycle");
        }
    }

    let registry = ModuleRegistry::build(&opts.modules)?;

    let mut ctx_builder =
        ModuleCtxBuilder::new(cancel.clone()).with_config_provider(opts.modules_cfg.clone());
    let db = match opts.db {
        DbOptions::Existing(db) => {
            ctx_builder = ctx_builder.with_db(db.clone());
            Some(db)
        }
        DbOptions::None => None,
    };
    let base_ctx = ctx_builder.build();

    // INIT phase
    tracing::info!("Phase: init");
    registry.run_init_phase(&base_ctx).await?;

    // DB MIGRATION phase
    if let Some(db) = &db {
        tracing::info!("Phase: db");
        registry.run_db_phase(db).await?;
    }

    // REST phase (synchronous router composition against ingress).
    tracing::info!("Phase: rest (sync)");
    let _ = registry.run_rest_phase(&base_ctx, axum::Router::new())?;

    // START phase
    tracing::info!("Phase: start");
    if let Err(e) = registry.run_start_phase(cancel.clone()).await {
        // Modules already started must still be stopped.
        cancel.cancel();
        registry.run_stop_phase(cancel).await;
        return Err(e.into());
    }

    // WAIT
    cancel.cancelled().await;

    // STOP phase
    tracing::info!("Phase: stop");
    registry.run_stop_phase(cancel).await;

    if let Some(db) = db {
        db.close().await;
    }
    Ok(())
}
