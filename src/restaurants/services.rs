use uuid::Uuid;

use super::dto::{CreateRestaurantRequest, UpdateRestaurantRequest};
use super::repo::RestaurantRepo;
use super::repo_types::{NewRestaurant, Restaurant, RestaurantPatch};
use crate::{error::AppError, users::repo::UserRepo, users::services::require_restaurant_admin};

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), AppError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::invalid("latitude must be between -90 and 90"));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::invalid("longitude must be between -180 and 180"));
    }
    Ok(())
}

fn required_text(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::invalid(format!("{field} is required")));
    }
    Ok(value.to_string())
}

pub async fn create_restaurant(
    users: &dyn UserRepo,
    restaurants: &dyn RestaurantRepo,
    owner_id: Uuid,
    req: CreateRestaurantRequest,
) -> Result<Restaurant, AppError> {
    require_restaurant_admin(users, owner_id).await?;
    validate_coordinates(req.latitude, req.longitude)?;

    let restaurant = restaurants
        .create(NewRestaurant {
            owner_id,
            name: required_text(&req.name, "name")?,
            address: required_text(&req.address, "address")?,
            phone: req.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            latitude: req.latitude,
            longitude: req.longitude,
        })
        .await?;
    Ok(restaurant)
}

/// Fetches a restaurant and checks that `owner_id` owns it.
pub async fn get_owned(
    restaurants: &dyn RestaurantRepo,
    id: Uuid,
    owner_id: Uuid,
) -> Result<Restaurant, AppError> {
    let restaurant = restaurants
        .get(id)
        .await?
        .ok_or(AppError::NotFound("restaurant"))?;
    if restaurant.owner_id != owner_id {
        return Err(AppError::Forbidden("not the owner of this restaurant"));
    }
    Ok(restaurant)
}

pub async fn update_restaurant(
    restaurants: &dyn RestaurantRepo,
    id: Uuid,
    owner_id: Uuid,
    req: UpdateRestaurantRequest,
) -> Result<Restaurant, AppError> {
    let current = get_owned(restaurants, id, owner_id).await?;
    validate_coordinates(
        req.latitude.unwrap_or(current.latitude),
        req.longitude.unwrap_or(current.longitude),
    )?;

    let patch = RestaurantPatch {
        name: req.name.as_deref().map(|v| required_text(v, "name")).transpose()?,
        address: req
            .address
            .as_deref()
            .map(|v| required_text(v, "address"))
            .transpose()?,
        phone: req.phone.map(|p| p.trim().to_string()),
        latitude: req.latitude,
        longitude: req.longitude,
    };

    restaurants
        .update(id, patch)
        .await?
        .ok_or(AppError::NotFound("restaurant"))
}
