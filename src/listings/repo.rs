use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{FoodListing, NewListing};

#[async_trait]
pub trait ListingRepo: Send + Sync {
    async fn create(&self, new: NewListing) -> anyhow::Result<FoodListing>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<FoodListing>>;
    /// Unclaimed listings whose pickup window has not ended, newest first.
    async fn list_available(&self, now: OffsetDateTime) -> anyhow::Result<Vec<FoodListing>>;
    async fn list_by_restaurant(&self, restaurant_id: Uuid) -> anyhow::Result<Vec<FoodListing>>;
    /// Conditional claim: only succeeds while `is_claimed = false`. `None` means zero rows matched.
    async fn mark_claimed(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> anyhow::Result<Option<FoodListing>>;
    async fn revert_claim(&self, id: Uuid) -> anyhow::Result<()>;
    async fn set_image_key(&self, id: Uuid, key: &str) -> anyhow::Result<Option<FoodListing>>;
}

#[derive(Clone)]
pub struct PgListingRepo {
    db: PgPool,
}

impl PgListingRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const COLUMNS: &str = "id, restaurant_id, item_name, description, quantity, \
     pickup_start_time, pickup_end_time, is_claimed, claimed_by_user_id, claimed_at, \
     dietary_tags, image_key, created_at, updated_at";

#[async_trait]
impl ListingRepo for PgListingRepo {
    async fn create(&self, new: NewListing) -> anyhow::Result<FoodListing> {
        sqlx::query_as::<_, FoodListing>(&format!(
            r#"
            INSERT INTO food_listings
                (restaurant_id, item_name, description, quantity,
                 pickup_start_time, pickup_end_time, dietary_tags)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(new.restaurant_id)
        .bind(new.item_name)
        .bind(new.description)
        .bind(new.quantity)
        .bind(new.pickup_start_time)
        .bind(new.pickup_end_time)
        .bind(new.dietary_tags)
        .fetch_one(&self.db)
        .await
        .context("insert food listing")
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<FoodListing>> {
        sqlx::query_as::<_, FoodListing>(&format!(
            "SELECT {COLUMNS} FROM food_listings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get food listing")
    }

    async fn list_available(&self, now: OffsetDateTime) -> anyhow::Result<Vec<FoodListing>> {
        sqlx::query_as::<_, FoodListing>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM food_listings
            WHERE is_claimed = false
              AND pickup_end_time >= $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(now)
        .fetch_all(&self.db)
        .await
        .context("list available listings")
    }

    async fn list_by_restaurant(&self, restaurant_id: Uuid) -> anyhow::Result<Vec<FoodListing>> {
        sqlx::query_as::<_, FoodListing>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM food_listings
            WHERE restaurant_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(restaurant_id)
        .fetch_all(&self.db)
        .await
        .context("list listings by restaurant")
    }

    async fn mark_claimed(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> anyhow::Result<Option<FoodListing>> {
        sqlx::query_as::<_, FoodListing>(&format!(
            r#"
            UPDATE food_listings
               SET is_claimed = true,
                   claimed_by_user_id = $2,
                   claimed_at = $3,
                   updated_at = now()
             WHERE id = $1
               AND is_claimed = false
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(&self.db)
        .await
        .context("conditional claim update")
    }

    async fn revert_claim(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE food_listings
               SET is_claimed = false,
                   claimed_by_user_id = NULL,
                   claimed_at = NULL,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await
        .context("revert claim")?;
        Ok(())
    }

    async fn set_image_key(&self, id: Uuid, key: &str) -> anyhow::Result<Option<FoodListing>> {
        sqlx::query_as::<_, FoodListing>(&format!(
            r#"
            UPDATE food_listings
               SET image_key = $2,
                   updated_at = now()
             WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .context("set listing image")
    }
}
