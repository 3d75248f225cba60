//! Users module: the User resource with create/list/get/update/delete,
//! stored through SeaORM and exposed over REST and an in-process client.

pub mod api;
pub mod contract;
pub mod domain;
pub mod gateways;
pub mod infra;
mod module;

pub use module::{register, UsersInfo, MODULE_NAME};
