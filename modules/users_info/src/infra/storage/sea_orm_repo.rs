//! SeaORM-backed [`UsersRepository`].
//!
//! Timestamps are truncated to microseconds so SQLite and Postgres round-trip
//! the same values; `updated_at` is strictly increasing per row.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::contract::model::{NewUser, User, UserPatch};
use crate::domain::repo::UsersRepository;
use crate::infra::storage::entity::{self, ActiveModel, Column, Entity};

pub struct SeaOrmUsersRepository {
    db: DatabaseConnection,
}

impl SeaOrmUsersRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// `max(now, previous + 1µs)`
fn next_updated_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    std::cmp::max(now, previous + Duration::microseconds(1))
}

#[async_trait]
impl UsersRepository for SeaOrmUsersRepository {
    async fn insert(&self, new_user: NewUser) -> anyhow::Result<User> {
        let now = now_micros();
        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(new_user.name),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = row.insert(&self.db).await.context("insert user")?;
        Ok(model.into())
    }

    async fn list_all(&self) -> anyhow::Result<Vec<User>> {
        let rows = Entity::find()
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await
            .context("list users")?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find user")?;
        Ok(row.map(User::from))
    }

    async fn update_by_id(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<Option<User>> {
        let txn = self.db.begin().await.context("begin update")?;

        let Some(current) = Entity::find_by_id(id).one(&txn).await.context("load user")? else {
            txn.rollback().await.context("rollback update")?;
            return Ok(None);
        };

        let updated_at = next_updated_at(current.updated_at, now_micros());
        let mut row: entity::ActiveModel = current.into_active_model();
        if let Some(name) = patch.name {
            row.name = Set(name);
        }
        row.updated_at = Set(updated_at);

        let model = row.update(&txn).await.context("update user")?;
        txn.commit().await.context("commit update")?;
        Ok(Some(model.into()))
    }

    async fn delete_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let txn = self.db.begin().await.context("begin delete")?;

        let Some(current) = Entity::find_by_id(id).one(&txn).await.context("load user")? else {
            txn.rollback().await.context("rollback delete")?;
            return Ok(None);
        };

        Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .context("delete user")?;
        txn.commit().await.context("commit delete")?;
        Ok(Some(current.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn updated_at_is_strictly_increasing() {
        let prev = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

        // clock behind the stored value
        let earlier = prev - Duration::seconds(5);
        assert_eq!(next_updated_at(prev, earlier), prev + Duration::microseconds(1));

        // same microsecond
        assert_eq!(next_updated_at(prev, prev), prev + Duration::microseconds(1));

        let later = prev + Duration::milliseconds(3);
        assert_eq!(next_updated_at(prev, later), later);
    }

    #[test]
    fn now_is_truncated_to_micros() {
        let now = now_micros();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }
}
