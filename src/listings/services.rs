use std::collections::{BTreeSet, HashMap};

use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::dto::{CreateListingRequest, DiscoveryQuery, NearbyListing, RestaurantSummary};
use super::repo::ListingRepo;
use super::repo_types::{FoodListing, NewListing};
use crate::{
    error::AppError,
    geo::{self, Coordinates},
    images::{self, ImageUpload},
    restaurants::{repo::RestaurantRepo, services::get_owned},
    storage::StorageClient,
};

const MAX_TAGS: usize = 20;

/// Trims, lower-cases and deduplicates dietary tags, dropping blanks.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn validate_new_listing(
    req: CreateListingRequest,
    now: OffsetDateTime,
) -> Result<NewListing, AppError> {
    let item_name = req.item_name.trim();
    if item_name.is_empty() {
        return Err(AppError::invalid("item_name is required"));
    }
    let quantity = req.quantity.trim();
    if quantity.is_empty() {
        return Err(AppError::invalid("quantity is required"));
    }
    if req.pickup_end_time <= req.pickup_start_time {
        return Err(AppError::invalid(
            "pickup_end_time must be after pickup_start_time",
        ));
    }
    if req.pickup_start_time <= now {
        return Err(AppError::invalid("pickup_start_time must be in the future"));
    }
    let dietary_tags = normalize_tags(req.dietary_tags);
    if dietary_tags.len() > MAX_TAGS {
        return Err(AppError::invalid("too many dietary tags"));
    }

    Ok(NewListing {
        restaurant_id: req.restaurant_id,
        item_name: item_name.to_string(),
        description: req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        quantity: quantity.to_string(),
        pickup_start_time: req.pickup_start_time,
        pickup_end_time: req.pickup_end_time,
        dietary_tags,
    })
}

pub async fn create_listing(
    listings: &dyn ListingRepo,
    restaurants: &dyn RestaurantRepo,
    owner_id: Uuid,
    req: CreateListingRequest,
    now: OffsetDateTime,
) -> Result<FoodListing, AppError> {
    get_owned(restaurants, req.restaurant_id, owner_id).await?;
    let new = validate_new_listing(req, now)?;
    Ok(listings.create(new).await?)
}

pub async fn get_listing(listings: &dyn ListingRepo, id: Uuid) -> Result<FoodListing, AppError> {
    listings.get(id).await?.ok_or(AppError::NotFound("listing"))
}

fn caller_location(q: &DiscoveryQuery) -> Result<Option<Coordinates>, AppError> {
    let (Some(lat), Some(lng)) = (q.lat, q.lng) else {
        return Ok(None);
    };
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(AppError::invalid("lat must be between -90 and 90"));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(AppError::invalid("lng must be between -180 and 180"));
    }
    Ok(Some(Coordinates::new(lat, lng)))
}

/// Available listings joined with their restaurant; distance-filtered and sorted when the
/// caller shares a location.
pub async fn discover_available(
    listings: &dyn ListingRepo,
    restaurants: &dyn RestaurantRepo,
    query: &DiscoveryQuery,
    now: OffsetDateTime,
) -> Result<Vec<NearbyListing>, AppError> {
    if let Some(r) = query.radius_km {
        if !r.is_finite() || r <= 0.0 {
            return Err(AppError::invalid("radius_km must be positive"));
        }
    }
    let origin = caller_location(query)?;

    let available = listings.list_available(now).await?;
    let ids: Vec<Uuid> = available
        .iter()
        .map(|l| l.restaurant_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let by_id: HashMap<Uuid, RestaurantSummary> = restaurants
        .get_many(&ids)
        .await?
        .iter()
        .map(|r| (r.id, RestaurantSummary::from(r)))
        .collect();

    let mut out: Vec<NearbyListing> = available
        .into_iter()
        .filter_map(|listing| {
            let restaurant = by_id.get(&listing.restaurant_id)?.clone();
            let distance_km = origin.map(|o| geo::haversine_km(o, restaurant.coordinates()));
            Some(NearbyListing {
                has_image: listing.has_image(),
                listing,
                restaurant,
                distance_km,
            })
        })
        .collect();

    if let Some(origin) = origin {
        if let Some(radius) = query.radius_km {
            out.retain(|n| geo::within_radius(origin, n.restaurant.coordinates(), radius));
        }
        geo::sort_by_distance(&mut out, origin, |n| n.restaurant.coordinates());
    }

    debug!(count = out.len(), located = origin.is_some(), "discovered listings");
    Ok(out)
}

pub async fn list_for_owner(
    listings: &dyn ListingRepo,
    restaurants: &dyn RestaurantRepo,
    restaurant_id: Uuid,
    owner_id: Uuid,
) -> Result<Vec<FoodListing>, AppError> {
    get_owned(restaurants, restaurant_id, owner_id).await?;
    Ok(listings.list_by_restaurant(restaurant_id).await?)
}

pub async fn attach_image(
    listings: &dyn ListingRepo,
    restaurants: &dyn RestaurantRepo,
    storage: &dyn StorageClient,
    listing_id: Uuid,
    owner_id: Uuid,
    img: ImageUpload,
) -> Result<FoodListing, AppError> {
    images::validate_image(&img)?;
    let listing = get_listing(listings, listing_id).await?;
    get_owned(restaurants, listing.restaurant_id, owner_id).await?;

    let key = images::services::upload_listing_image(storage, listing.restaurant_id, listing.id, img)
        .await?;
    let updated = listings
        .set_image_key(listing.id, &key)
        .await?
        .ok_or(AppError::NotFound("listing"))?;

    if let Some(previous) = listing.image_key.filter(|old| *old != key) {
        if let Err(e) = storage.delete_object(&previous).await {
            warn!(error = %e, key = %previous, "stale listing image left in bucket");
        }
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::repo::memory::MemoryListingRepo;
    use crate::restaurants::{
        repo::memory::MemoryRestaurantRepo,
        repo_types::{NewRestaurant, Restaurant},
    };
    use time::Duration;

    fn request(restaurant_id: Uuid, now: OffsetDateTime) -> CreateListingRequest {
        CreateListingRequest {
            restaurant_id,
            item_name: "Vegetable lasagna".into(),
            description: Some("  ".into()),
            quantity: "6 portions".into(),
            pickup_start_time: now + Duration::hours(1),
            pickup_end_time: now + Duration::hours(3),
            dietary_tags: vec![" Vegetarian".into(), "vegetarian".into(), "".into()],
        }
    }

    async fn restaurant(repo: &MemoryRestaurantRepo, lat: f64, lng: f64) -> Restaurant {
        repo.create(NewRestaurant {
            owner_id: Uuid::new_v4(),
            name: "Kitchen".into(),
            address: "1 Main St".into(),
            phone: None,
            latitude: lat,
            longitude: lng,
        })
        .await
        .unwrap()
    }

    fn raw(restaurant_id: Uuid, start: OffsetDateTime, end: OffsetDateTime) -> NewListing {
        NewListing {
            restaurant_id,
            item_name: "Bread".into(),
            description: None,
            quantity: "3 loaves".into(),
            pickup_start_time: start,
            pickup_end_time: end,
            dietary_tags: vec![],
        }
    }

    #[test]
    fn tags_are_normalized() {
        let tags = normalize_tags(vec!["Vegan ".into(), "vegan".into(), " ".into(), "Halal".into()]);
        assert_eq!(tags, vec!["halal".to_string(), "vegan".to_string()]);
    }

    #[test]
    fn validation_rules() {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();

        let ok = validate_new_listing(request(id, now), now).unwrap();
        assert_eq!(ok.dietary_tags, vec!["vegetarian".to_string()]);
        assert!(ok.description.is_none());

        let mut r = request(id, now);
        r.pickup_end_time = r.pickup_start_time;
        assert!(matches!(validate_new_listing(r, now), Err(AppError::InvalidInput(_))));

        let mut r = request(id, now);
        r.pickup_start_time = now;
        assert!(matches!(validate_new_listing(r, now), Err(AppError::InvalidInput(_))));

        let mut r = request(id, now);
        r.item_name = "   ".into();
        assert!(matches!(validate_new_listing(r, now), Err(AppError::InvalidInput(_))));

        let mut r = request(id, now);
        r.quantity = String::new();
        assert!(matches!(validate_new_listing(r, now), Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn only_owner_can_create_listing() {
        let now = OffsetDateTime::now_utc();
        let listings = MemoryListingRepo::default();
        let restaurants = MemoryRestaurantRepo::default();
        let r = restaurant(&restaurants, 40.0, -74.0).await;

        let err = create_listing(&listings, &restaurants, Uuid::new_v4(), request(r.id, now), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = create_listing(&listings, &restaurants, r.owner_id, request(Uuid::new_v4(), now), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("restaurant")));

        let l = create_listing(&listings, &restaurants, r.owner_id, request(r.id, now), now)
            .await
            .unwrap();
        assert!(!l.is_claimed);
        assert_eq!(l.restaurant_id, r.id);
    }

    #[tokio::test]
    async fn available_excludes_expired_and_claimed() {
        let now = OffsetDateTime::now_utc();
        let listings = MemoryListingRepo::default();
        let rid = Uuid::new_v4();

        let expired = listings
            .create(raw(rid, now - Duration::hours(3), now - Duration::hours(1)))
            .await
            .unwrap();
        let claimed = listings
            .create(raw(rid, now + Duration::hours(1), now + Duration::hours(2)))
            .await
            .unwrap();
        listings.mark_claimed(claimed.id, Uuid::new_v4(), now).await.unwrap();
        let open = listings
            .create(raw(rid, now + Duration::hours(1), now + Duration::hours(2)))
            .await
            .unwrap();
        let newest = listings
            .create(raw(rid, now - Duration::minutes(10), now + Duration::hours(1)))
            .await
            .unwrap();

        let ids: Vec<Uuid> = listings
            .list_available(now)
            .await
            .unwrap()
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![newest.id, open.id]);
        assert!(!ids.contains(&expired.id));
        assert!(!ids.contains(&claimed.id));

        assert_eq!(listings.list_by_restaurant(rid).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn discovery_filters_and_sorts_by_distance() {
        let now = OffsetDateTime::now_utc();
        let listings = MemoryListingRepo::default();
        let restaurants = MemoryRestaurantRepo::default();

        let manhattan = restaurant(&restaurants, 40.7128, -74.0060).await;
        let brooklyn = restaurant(&restaurants, 40.6782, -73.9442).await;
        let boston = restaurant(&restaurants, 42.3601, -71.0589).await;
        for r in [&boston, &manhattan, &brooklyn] {
            listings
                .create(raw(r.id, now + Duration::hours(1), now + Duration::hours(2)))
                .await
                .unwrap();
        }

        let query = DiscoveryQuery {
            lat: Some(40.7128),
            lng: Some(-74.0060),
            radius_km: Some(50.0),
        };
        let found = discover_available(&listings, &restaurants, &query, now).await.unwrap();
        let order: Vec<Uuid> = found.iter().map(|n| n.restaurant.id).collect();
        assert_eq!(order, vec![manhattan.id, brooklyn.id]);
        assert_eq!(found[0].distance_km, Some(0.0));

        let unlocated = discover_available(&listings, &restaurants, &DiscoveryQuery::default(), now)
            .await
            .unwrap();
        assert_eq!(unlocated.len(), 3);
        assert!(unlocated.iter().all(|n| n.distance_km.is_none()));
        assert_eq!(unlocated[0].restaurant.id, brooklyn.id);
    }

    #[tokio::test]
    async fn discovery_rejects_bad_radius() {
        let now = OffsetDateTime::now_utc();
        let query = DiscoveryQuery {
            lat: Some(0.0),
            lng: Some(0.0),
            radius_km: Some(-1.0),
        };
        let err = discover_available(
            &MemoryListingRepo::default(),
            &MemoryRestaurantRepo::default(),
            &query,
            now,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn replacing_an_image_drops_the_old_object() {
        use crate::storage::memory::MemoryStorage;
        use bytes::Bytes;

        let now = OffsetDateTime::now_utc();
        let listings = MemoryListingRepo::default();
        let restaurants = MemoryRestaurantRepo::default();
        let storage = MemoryStorage::default();
        let r = restaurant(&restaurants, 40.0, -74.0).await;
        let l = create_listing(&listings, &restaurants, r.owner_id, request(r.id, now), now)
            .await
            .unwrap();
        let jpeg = || ImageUpload {
            body: Bytes::from_static(b"jpeg"),
            content_type: "image/jpeg".into(),
        };

        let first = attach_image(&listings, &restaurants, &storage, l.id, r.owner_id, jpeg())
            .await
            .unwrap();
        let first_key = first.image_key.clone().unwrap();
        let second = attach_image(&listings, &restaurants, &storage, l.id, r.owner_id, jpeg())
            .await
            .unwrap();

        assert!(second.has_image());
        assert!(!storage.contains(&first_key));
        assert!(storage.contains(second.image_key.as_deref().unwrap()));
        assert_eq!(storage.len(), 1);

        let err = attach_image(&listings, &restaurants, &storage, l.id, Uuid::new_v4(), jpeg())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
