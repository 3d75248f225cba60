use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::contract::model::{NewUser, User, UserPatch};

/// REST DTO for user representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// REST DTO for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserReq {
    pub name: String,
}

/// REST DTO for updating a user (partial)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateUserReq {
    #[serde(default)]
    pub name: Option<String>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<CreateUserReq> for NewUser {
    fn from(req: CreateUserReq) -> Self {
        Self { name: req.name }
    }
}

impl From<UpdateUserReq> for UserPatch {
    fn from(req: UpdateUserReq) -> Self {
        Self { name: req.name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_dto_uses_camel_case_and_rfc3339() {
        let ts = DateTime::parse_from_rfc3339("2030-01-02T03:04:05.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let dto = UserDto {
            id: Uuid::nil(),
            name: "Ada".into(),
            created_at: ts,
            updated_at: ts,
        };
        let v = serde_json::to_value(&dto).unwrap();
        assert_eq!(v["createdAt"], "2030-01-02T03:04:05.123456Z");
        assert!(v.get("updatedAt").is_some());
        assert!(v.get("created_at").is_none());
    }

    #[test]
    fn update_request_name_is_optional() {
        let req: UpdateUserReq = serde_json::from_str("{}").unwrap();
        assert!(req.name.is_none());
        assert!(serde_json::from_str::<CreateUserReq>("{}").is_err());
    }
}
