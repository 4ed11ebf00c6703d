use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Claim {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub claimed_at: OffsetDateTime,
    pub pickup_completed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub pickup_completed_at: Option<OffsetDateTime>,
}
