//! Type-safe API operation builder with compile-time guarantees
//!
//! Operations cannot be registered unless both a handler and at least one
//! response are specified.

pub mod operation_builder;
pub mod problem;

pub use operation_builder::{
    ensure_schema, state, Missing, OpenApiRegistry, OperationBuilder, OperationSpec,
    ParamLocation, ParamSpec, Present, RequestBodySpec, ResponseSpec,
};
