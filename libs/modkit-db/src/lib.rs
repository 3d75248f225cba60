#![cfg_attr(
    not(any(feature = "pg", feature = "sqlite")),
    allow(unused_imports, unused_variables, dead_code, unreachable_code)
)]

//! ModKit database handle.
//!
//! Wraps one sqlx pool (SQLite or PostgreSQL) and, with the `sea-orm` feature,
//! a SeaORM connection built on top of the same pool.
//!
//! # Features
//! - `pg`, `sqlite`: enable SQLx backends
//! - `sea-orm`: add SeaORM integration
//!
//! # Example
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> modkit_db::Result<()> {
//!     use modkit_db::{ConnectOpts, DbHandle};
//!
//!     let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default()).await?;
//!     let _conn = db.sea();
//!     db.close().await;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "sqlite")]
mod sqlite;

use std::time::Duration;

#[cfg(feature = "pg")]
use sqlx::{postgres::PgPoolOptions, PgPool};
#[cfg(feature = "sqlite")]
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[cfg(feature = "sea-orm")]
use sea_orm::DatabaseConnection;
#[cfg(all(feature = "sea-orm", feature = "pg"))]
use sea_orm::SqlxPostgresConnector;
#[cfg(all(feature = "sea-orm", feature = "sqlite"))]
use sea_orm::SqlxSqliteConnector;

use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Typed error for the DB handle.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[cfg(feature = "sea-orm")]
    #[error(transparent)]
    Sea(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    Sqlite,
}

/// Pool knobs; each driver applies the subset it supports.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    /// Timeout to acquire a connection from the pool.
    pub acquire_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    /// SQLite `busy_timeout`; a `busy_timeout` DSN parameter takes precedence.
    pub sqlite_busy_timeout: Option<Duration>,
    /// For SQLite file DSNs, create parent directories if missing.
    pub create_sqlite_dirs: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
            sqlite_busy_timeout: Some(Duration::from_millis(5_000)),
            create_sqlite_dirs: true,
        }
    }
}

#[derive(Clone, Debug)]
enum DbPool {
    #[cfg(feature = "pg")]
    Postgres(PgPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

/// Main handle.
#[derive(Debug)]
pub struct DbHandle {
    engine: DbEngine,
    pool: DbPool,
    dsn: String,
    #[cfg(feature = "sea-orm")]
    sea: DatabaseConnection,
}

fn apply_pool_opts<DB: sqlx::Database>(
    mut o: sqlx::pool::PoolOptions<DB>,
    opts: &ConnectOpts,
) -> sqlx::pool::PoolOptions<DB> {
    if let Some(n) = opts.max_conns {
        o = o.max_connections(n);
    }
    if let Some(n) = opts.min_conns {
        o = o.min_connections(n);
    }
    if let Some(t) = opts.acquire_timeout {
        o = o.acquire_timeout(t);
    }
    o.idle_timeout(opts.idle_timeout)
        .max_lifetime(opts.max_lifetime)
}

impl DbHandle {
    /// Detect engine by DSN scheme.
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbEngine::Postgres)
        } else if s.starts_with("sqlite:") {
            Ok(DbEngine::Sqlite)
        } else {
            Err(DbError::UnknownDsn(redact_credentials(dsn)))
        }
    }

    /// Open a pool for `dsn` (engine chosen by scheme) and wrap it.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        match Self::detect(dsn)? {
            DbEngine::Postgres => Self::connect_postgres(dsn, &opts).await,
            DbEngine::Sqlite => Self::connect_sqlite(dsn, &opts).await,
        }
    }

    #[cfg(feature = "pg")]
    async fn connect_postgres(dsn: &str, opts: &ConnectOpts) -> Result<Self> {
        let pool = apply_pool_opts(PgPoolOptions::new(), opts)
            .connect(dsn)
            .await?;
        tracing::debug!(dsn = %redact_credentials(dsn), "postgres pool opened");
        Ok(Self {
            engine: DbEngine::Postgres,
            #[cfg(feature = "sea-orm")]
            sea: SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone()),
            pool: DbPool::Postgres(pool),
            dsn: dsn.to_string(),
        })
    }

    #[cfg(not(feature = "pg"))]
    async fn connect_postgres(_dsn: &str, _opts: &ConnectOpts) -> Result<Self> {
        Err(DbError::FeatureDisabled("PostgreSQL feature not enabled"))
    }

    #[cfg(feature = "sqlite")]
    async fn connect_sqlite(dsn: &str, opts: &ConnectOpts) -> Result<Self> {
        sqlite::prepare_sqlite_path(dsn, opts.create_sqlite_dirs)?;
        let connect_opts = sqlite::connect_options(dsn, opts.sqlite_busy_timeout)?;

        let mut pool_opts = apply_pool_opts(SqlitePoolOptions::new(), opts);
        if sqlite::is_memory_dsn(dsn) {
            // The in-memory database lives only as long as one connection stays open.
            pool_opts = pool_opts
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_opts.connect_with(connect_opts).await?;
        let dsn = sqlite::strip_pragmas(dsn);
        tracing::debug!(dsn = %dsn, "sqlite pool opened");
        Ok(Self {
            engine: DbEngine::Sqlite,
            #[cfg(feature = "sea-orm")]
            sea: SqlxSqliteConnector::from_sqlx_sqlite_pool(pool.clone()),
            pool: DbPool::Sqlite(pool),
            dsn,
        })
    }

    #[cfg(not(feature = "sqlite"))]
    async fn connect_sqlite(_dsn: &str, _opts: &ConnectOpts) -> Result<Self> {
        Err(DbError::FeatureDisabled("SQLite feature not enabled"))
    }

    /// Close the pool; outstanding connections are closed as they are returned.
    pub async fn close(&self) {
        match &self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(p) => p.close().await,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(p) => p.close().await,
        }
    }

    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    /// DSN the pool was opened with (SQLite PRAGMA parameters removed).
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlx_sqlite(&self) -> Option<&SqlitePool> {
        match self.pool {
            DbPool::Sqlite(ref p) => Some(p),
            #[cfg(feature = "pg")]
            _ => None,
        }
    }

    /// Get SeaORM connection (clone; cheap handle).
    #[cfg(feature = "sea-orm")]
    pub fn sea(&self) -> DatabaseConnection {
        self.sea.clone()
    }

    #[cfg(feature = "sea-orm")]
    pub fn seaorm(&self) -> &DatabaseConnection {
        &self.sea
    }
}

/// Replace the password component of a URL-style DSN with `***`.
pub fn redact_credentials(dsn: &str) -> String {
    match url::Url::parse(dsn) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => dsn.to_string(),
    }
}
