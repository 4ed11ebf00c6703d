use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    RestaurantAdmin,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct UpsertUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

/// Caller seen through the token only, before a profile row exists.
#[derive(Debug, Clone, Serialize)]
pub struct DemoProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Profile {
    Registered(User),
    Demo(DemoProfile),
}

impl Profile {
    pub fn id(&self) -> Uuid {
        match self {
            Profile::Registered(u) => u.id,
            Profile::Demo(d) => d.id,
        }
    }

    /// Demo profiles are plain users.
    pub fn role(&self) -> UserRole {
        match self {
            Profile::Registered(u) => u.role,
            Profile::Demo(_) => UserRole::User,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Profile::Registered(u) => &u.display_name,
            Profile::Demo(d) => &d.display_name,
        }
    }
}
