pub mod client;
pub mod error;
pub mod model;

pub use client::UsersInfoApi;
pub use error::UsersInfoError;
pub use model::{NewUser, User, UserPatch};
