//! # ModKit - module system for the users server
//!
//! Modules implement a small set of capability traits and are registered
//! explicitly by the binary. The runtime drives them through ordered phases:
//! init → db → rest → start → wait → stop.
//!
//! ## Example
//!
//! ```rust,ignore
//! use modkit::registry::{Registrator, RegistryBuilder};
//!
//! fn register(b: &mut RegistryBuilder) {
//!     let m = std::sync::Arc::new(MyModule::default());
//!     b.register_core_with_meta("my_module", &[], m.clone());
//!     b.register_rest_with_meta("my_module", m);
//! }
//!
//! let registrators = vec![Registrator(register)];
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

// Module system exports
pub use crate::contracts::*;
pub mod context;
pub use context::{ConfigProvider, ModuleCtx, ModuleCtxBuilder};

pub mod registry;
pub use registry::{ModuleRegistry, Registrator, RegistryBuilder};

// Core module contracts and traits
pub mod contracts;
// Type-safe API operation builder
pub mod api;
pub use api::{OpenApiRegistry, OperationBuilder};
pub use api::problem::{
    internal_error, not_found, unauthorized, Problem, ProblemResponse,
};

pub mod runtime;
pub use runtime::{run, DbOptions, RunOptions, ShutdownOptions};
