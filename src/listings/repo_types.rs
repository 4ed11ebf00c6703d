use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct FoodListing {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub item_name: String,
    pub description: Option<String>,
    pub quantity: String,
    #[serde(with = "time::serde::rfc3339")]
    pub pickup_start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub pickup_end_time: OffsetDateTime,
    pub is_claimed: bool,
    pub claimed_by_user_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub claimed_at: Option<OffsetDateTime>,
    pub dietary_tags: Vec<String>,
    #[serde(skip_serializing)]
    pub image_key: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FoodListing {
    pub fn has_image(&self) -> bool {
        self.image_key.is_some()
    }

    /// Unclaimed and still inside (or before) its pickup window.
    pub fn is_available(&self, now: OffsetDateTime) -> bool {
        !self.is_claimed && self.pickup_end_time >= now
    }
}

#[derive(Debug, Clone)]
pub struct NewListing {
    pub restaurant_id: Uuid,
    pub item_name: String,
    pub description: Option<String>,
    pub quantity: String,
    pub pickup_start_time: OffsetDateTime,
    pub pickup_end_time: OffsetDateTime,
    pub dietary_tags: Vec<String>,
}
