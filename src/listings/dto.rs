use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::FoodListing;
use crate::{geo::Coordinates, restaurants::repo_types::Restaurant};

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub restaurant_id: Uuid,
    pub item_name: String,
    pub description: Option<String>,
    pub quantity: String,
    #[serde(with = "time::serde::rfc3339")]
    pub pickup_start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub pickup_end_time: OffsetDateTime,
    #[serde(default)]
    pub dietary_tags: Vec<String>,
}

/// Caller location is optional; without it results stay newest-first.
#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestaurantSummary {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_verified: bool,
}

impl RestaurantSummary {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

impl From<&Restaurant> for RestaurantSummary {
    fn from(r: &Restaurant) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            address: r.address.clone(),
            latitude: r.latitude,
            longitude: r.longitude,
            is_verified: r.is_verified,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyListing {
    #[serde(flatten)]
    pub listing: FoodListing,
    pub has_image: bool,
    pub restaurant: RestaurantSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}
