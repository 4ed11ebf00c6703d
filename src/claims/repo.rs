use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::Claim;

#[async_trait]
pub trait ClaimRepo: Send + Sync {
    async fn insert(&self, listing_id: Uuid, user_id: Uuid, at: OffsetDateTime)
        -> anyhow::Result<Claim>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Claim>>;
    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Claim>>;
    /// Unconditional; `None` when the claim does not exist.
    async fn mark_pickup_completed(
        &self,
        id: Uuid,
        at: OffsetDateTime,
    ) -> anyhow::Result<Option<Claim>>;
}

#[derive(Clone)]
pub struct PgClaimRepo {
    db: PgPool,
}

impl PgClaimRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ClaimRepo for PgClaimRepo {
    async fn insert(
        &self,
        listing_id: Uuid,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> anyhow::Result<Claim> {
        sqlx::query_as::<_, Claim>(
            r#"
            INSERT INTO claims (listing_id, user_id, claimed_at)
            VALUES ($1, $2, $3)
            RETURNING id, listing_id, user_id, claimed_at, pickup_completed, pickup_completed_at
            "#,
        )
        .bind(listing_id)
        .bind(user_id)
        .bind(at)
        .fetch_one(&self.db)
        .await
        .context("insert claim")
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Claim>> {
        sqlx::query_as::<_, Claim>(
            r#"
            SELECT id, listing_id, user_id, claimed_at, pickup_completed, pickup_completed_at
            FROM claims
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get claim")
    }

    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Claim>> {
        sqlx::query_as::<_, Claim>(
            r#"
            SELECT id, listing_id, user_id, claimed_at, pickup_completed, pickup_completed_at
            FROM claims
            WHERE user_id = $1
            ORDER BY claimed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list claims by user")
    }

    async fn mark_pickup_completed(
        &self,
        id: Uuid,
        at: OffsetDateTime,
    ) -> anyhow::Result<Option<Claim>> {
        sqlx::query_as::<_, Claim>(
            r#"
            UPDATE claims
               SET pickup_completed = true,
                   pickup_completed_at = $2
             WHERE id = $1
            RETURNING id, listing_id, user_id, claimed_at, pickup_completed, pickup_completed_at
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.db)
        .await
        .context("mark pickup completed")
    }
}
