use async_trait::async_trait;
use uuid::Uuid;

use crate::contract::model::{NewUser, User, UserPatch};

/// Persistence port for users.
///
/// The store owns id generation and timestamps; "not found" is `Ok(None)`,
/// anything else that goes wrong is an `Err`.
#[async_trait]
pub trait UsersRepository: Send + Sync {
    async fn insert(&self, new_user: NewUser) -> anyhow::Result<User>;

    /// Ascending creation order.
    async fn list_all(&self) -> anyhow::Result<Vec<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn update_by_id(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<Option<User>>;

    /// Returns the removed row.
    async fn delete_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
}
