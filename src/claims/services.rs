use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::repo::ClaimRepo;
use super::repo_types::Claim;
use crate::{
    error::AppError,
    listings::{repo::ListingRepo, repo_types::FoodListing},
    restaurants::repo::RestaurantRepo,
};

#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub listing: FoodListing,
    pub claim: Claim,
}

/// Claims a listing for `user_id`.
///
/// The conditional update in [`ListingRepo::mark_claimed`] is the only race guard: the store
/// serialises writers to the row, and a zero-row result means another caller won. If the
/// claim row cannot be written the listing is reverted once, best effort.
pub async fn claim_listing(
    listings: &dyn ListingRepo,
    claims: &dyn ClaimRepo,
    listing_id: Uuid,
    user_id: Uuid,
) -> Result<ClaimOutcome, AppError> {
    let current = listings
        .get(listing_id)
        .await?
        .ok_or(AppError::NotFound("listing"))?;
    if current.is_claimed {
        return Err(AppError::AlreadyClaimed);
    }

    let now = OffsetDateTime::now_utc();
    let Some(listing) = listings.mark_claimed(listing_id, user_id, now).await? else {
        warn!(%listing_id, %user_id, "claim lost race");
        return Err(AppError::RaceLost);
    };

    match claims.insert(listing_id, user_id, now).await {
        Ok(claim) => {
            info!(%listing_id, %user_id, claim_id = %claim.id, "listing claimed");
            Ok(ClaimOutcome { listing, claim })
        }
        Err(e) => {
            error!(error = %e, %listing_id, %user_id, "claim insert failed; reverting listing");
            if let Err(revert) = listings.revert_claim(listing_id).await {
                error!(error = %revert, %listing_id, "claim revert failed; listing left claimed");
            }
            Err(AppError::Internal(e))
        }
    }
}

/// Unconditional; a second call simply refreshes the completion timestamp.
pub async fn mark_pickup_completed(claims: &dyn ClaimRepo, claim_id: Uuid) -> Result<Claim, AppError> {
    let claim = claims
        .mark_pickup_completed(claim_id, OffsetDateTime::now_utc())
        .await?
        .ok_or(AppError::NotFound("claim"))?;
    info!(%claim_id, listing_id = %claim.listing_id, "pickup completed");
    Ok(claim)
}

/// The claimant or the owner of the listing's restaurant may close out a pickup.
pub async fn authorize_completion(
    claims: &dyn ClaimRepo,
    listings: &dyn ListingRepo,
    restaurants: &dyn RestaurantRepo,
    claim_id: Uuid,
    caller: Uuid,
) -> Result<(), AppError> {
    let claim = claims.get(claim_id).await?.ok_or(AppError::NotFound("claim"))?;
    if claim.user_id == caller {
        return Ok(());
    }
    let owner = match listings.get(claim.listing_id).await? {
        Some(listing) => restaurants
            .get(listing.restaurant_id)
            .await?
            .map(|r| r.owner_id),
        None => None,
    };
    if owner == Some(caller) {
        Ok(())
    } else {
        Err(AppError::Forbidden("not allowed to complete this pickup"))
    }
}
