use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{UpsertUser, User};

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn upsert(&self, user: UpsertUser) -> anyhow::Result<User>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, display_name, phone, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get user")
    }

    async fn upsert(&self, user: UpsertUser) -> anyhow::Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, display_name, phone, role)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
               SET email = COALESCE(EXCLUDED.email, users.email),
                   display_name = EXCLUDED.display_name,
                   phone = EXCLUDED.phone,
                   role = EXCLUDED.role,
                   updated_at = now()
            RETURNING id, email, display_name, phone, role, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(user.email)
        .bind(user.display_name)
        .bind(user.phone)
        .bind(user.role)
        .fetch_one(&self.db)
        .await
        .context("upsert user")
    }
}
