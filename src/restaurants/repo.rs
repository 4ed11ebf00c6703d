use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewRestaurant, Restaurant, RestaurantPatch};

#[async_trait]
pub trait RestaurantRepo: Send + Sync {
    async fn create(&self, new: NewRestaurant) -> anyhow::Result<Restaurant>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Restaurant>>;
    async fn get_many(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Restaurant>>;
    async fn list_by_owner(&self, owner_id: Uuid) -> anyhow::Result<Vec<Restaurant>>;
    async fn update(&self, id: Uuid, patch: RestaurantPatch) -> anyhow::Result<Option<Restaurant>>;
}

#[derive(Clone)]
pub struct PgRestaurantRepo {
    db: PgPool,
}

impl PgRestaurantRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const COLUMNS: &str =
    "id, owner_id, name, address, phone, latitude, longitude, is_verified, created_at, updated_at";

#[async_trait]
impl RestaurantRepo for PgRestaurantRepo {
    async fn create(&self, new: NewRestaurant) -> anyhow::Result<Restaurant> {
        sqlx::query_as::<_, Restaurant>(&format!(
            r#"
            INSERT INTO restaurants (owner_id, name, address, phone, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(new.owner_id)
        .bind(new.name)
        .bind(new.address)
        .bind(new.phone)
        .bind(new.latitude)
        .bind(new.longitude)
        .fetch_one(&self.db)
        .await
        .context("insert restaurant")
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Restaurant>> {
        sqlx::query_as::<_, Restaurant>(&format!(
            "SELECT {COLUMNS} FROM restaurants WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get restaurant")
    }

    async fn get_many(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Restaurant>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, Restaurant>(&format!(
            "SELECT {COLUMNS} FROM restaurants WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.db)
        .await
        .context("get restaurants by ids")
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> anyhow::Result<Vec<Restaurant>> {
        sqlx::query_as::<_, Restaurant>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM restaurants
            WHERE owner_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner_id)
        .fetch_all(&self.db)
        .await
        .context("list restaurants by owner")
    }

    async fn update(&self, id: Uuid, patch: RestaurantPatch) -> anyhow::Result<Option<Restaurant>> {
        sqlx::query_as::<_, Restaurant>(&format!(
            r#"
            UPDATE restaurants
               SET name = COALESCE($2, name),
                   address = COALESCE($3, address),
                   phone = COALESCE($4, phone),
                   latitude = COALESCE($5, latitude),
                   longitude = COALESCE($6, longitude),
                   updated_at = now()
             WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.address)
        .bind(patch.phone)
        .bind(patch.latitude)
        .bind(patch.longitude)
        .fetch_optional(&self.db)
        .await
        .context("update restaurant")
    }
}
