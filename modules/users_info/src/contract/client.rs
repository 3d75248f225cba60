use async_trait::async_trait;
use uuid::Uuid;

use crate::contract::{
    error::UsersInfoError,
    model::{NewUser, User, UserPatch},
};

/// Public API trait for the users_info module that other modules can use
#[async_trait]
pub trait UsersInfoApi: Send + Sync {
    async fn create_user(&self, new_user: NewUser) -> Result<User, UsersInfoError>;

    /// All users in ascending creation order
    async fn list_users(&self) -> Result<Vec<User>, UsersInfoError>;

    async fn get_user(&self, id: Uuid) -> Result<User, UsersInfoError>;

    /// Partial update; refreshes `updated_at`
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User, UsersInfoError>;

    /// Returns the record as it was just before removal
    async fn delete_user(&self, id: Uuid) -> Result<User, UsersInfoError>;
}
