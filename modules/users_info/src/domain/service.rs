use std::sync::Arc;

use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::contract::model::{NewUser, User, UserPatch};
use crate::domain::error::DomainError;
use crate::domain::repo::UsersRepository;

/// Stateless pass-through over the repository: no business rules, no caching.
#[derive(Clone)]
pub struct Service {
    repo: Arc<dyn UsersRepository>,
}

impl Service {
    pub fn new(repo: Arc<dyn UsersRepository>) -> Self {
        Self { repo }
    }

    #[instrument(name = "users_info.service.create_user", skip(self, new_user))]
    pub async fn create_user(&self, new_user: NewUser) -> Result<User, DomainError> {
        let user = self.repo.insert(new_user).await.map_err(db_error)?;
        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    #[instrument(name = "users_info.service.list_users", skip(self))]
    pub async fn list_users(&self) -> Result<Vec<User>, DomainError> {
        let users = self.repo.list_all().await.map_err(db_error)?;
        debug!(count = users.len(), "users listed");
        Ok(users)
    }

    #[instrument(name = "users_info.service.get_user", skip(self), fields(user_id = %id))]
    pub async fn get_user(&self, id: Uuid) -> Result<User, DomainError> {
        self.repo
            .find_by_id(id)
            .await
            .map_err(db_error)?
            .ok_or_else(|| DomainError::user_not_found(id))
    }

    #[instrument(
        name = "users_info.service.update_user",
        skip(self, patch),
        fields(user_id = %id)
    )]
    pub async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User, DomainError> {
        let user = self
            .repo
            .update_by_id(id, patch)
            .await
            .map_err(db_error)?
            .ok_or_else(|| DomainError::user_not_found(id))?;
        debug!("user updated");
        Ok(user)
    }

    #[instrument(name = "users_info.service.delete_user", skip(self), fields(user_id = %id))]
    pub async fn delete_user(&self, id: Uuid) -> Result<User, DomainError> {
        let user = self
            .repo
            .delete_by_id(id)
            .await
            .map_err(db_error)?
            .ok_or_else(|| DomainError::user_not_found(id))?;
        debug!("user deleted");
        Ok(user)
    }
}

fn db_error(e: anyhow::Error) -> DomainError {
    error!(error = %format!("{e:#}"), "users repository failure");
    DomainError::from(e)
}
