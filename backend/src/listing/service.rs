//! Listing service layer - catalogue, verification and advertising

use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::listing::{
    CreateListingRequest, Listing, ListingPage, ListingQuery, Locations, UpdateListingRequest,
    VerificationStatus,
};
use crate::models::{Identity, UserRole};
use crate::store::Store;

/// Listing service
pub struct ListingService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    advertise_cap: u32,
}

impl ListingService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, advertise_cap: u32) -> Self {
        Self {
            store,
            clock,
            advertise_cap,
        }
    }

    /// Create a listing in pending review
    pub async fn create_listing(
        &self,
        actor: &Identity,
        request: CreateListingRequest,
    ) -> ServiceResult<Listing> {
        actor.require_role(UserRole::Vendor)?;
        if actor.fraud {
            return Err(ServiceError::Forbidden(
                "Vendors flagged as fraud cannot add listings".into(),
            ));
        }

        let now = self.clock.now();
        request.check(now)?;

        let listing = self
            .store
            .insert_listing(Listing::new(actor.user_id, request, now))
            .await?;

        tracing::info!(
            listing_id = %listing.id,
            vendor_id = %listing.vendor_id,
            seats = listing.total_quantity,
            "Listing created"
        );
        Ok(listing)
    }

    /// Fetch one listing. Hidden listings are visible to their vendor and admins only.
    pub async fn get_listing(&self, actor: Option<&Identity>, id: Uuid) -> ServiceResult<Listing> {
        let listing = self.store.get_listing(id).await?;

        let privileged =
            actor.map_or(false, |a| a.is_admin() || a.user_id == listing.vendor_id);
        if privileged || self.is_public(&listing).await? {
            Ok(listing)
        } else {
            Err(ServiceError::NotFound("Listing".into()))
        }
    }

    async fn is_public(&self, listing: &Listing) -> ServiceResult<bool> {
        if !listing.is_listed(self.clock.now()) {
            return Ok(false);
        }
        let vendor = self.store.get_user(listing.vendor_id).await?;
        Ok(!vendor.fraud)
    }

    pub async fn update_listing(
        &self,
        actor: &Identity,
        id: Uuid,
        request: UpdateListingRequest,
    ) -> ServiceResult<Listing> {
        let current = self.owned_listing(actor, id).await?;
        let now = self.clock.now();
        let changes = request.into_changes(&current, now)?;

        let listing = self.store.update_listing(id, changes, now).await?;
        tracing::info!(
            listing_id = %id,
            total = listing.total_quantity,
            remaining = listing.remaining_quantity,
            "Listing updated"
        );
        Ok(listing)
    }

    /// Delete a listing (owning vendor or admin)
    pub async fn delete_listing(&self, actor: &Identity, id: Uuid) -> ServiceResult<Listing> {
        let listing = self.store.get_listing(id).await?;
        if !actor.is_admin() && actor.user_id != listing.vendor_id {
            return Err(ServiceError::Forbidden(
                "Only the owning vendor or an admin can delete this listing".into(),
            ));
        }

        let deleted = self.store.delete_listing(id).await?;
        tracing::info!(listing_id = %id, by = %actor.user_id, "Listing deleted");
        Ok(deleted)
    }

    /// Admin approval decision
    pub async fn set_verification(
        &self,
        actor: &Identity,
        id: Uuid,
        status: VerificationStatus,
    ) -> ServiceResult<Listing> {
        actor.require_role(UserRole::Admin)?;
        if status == VerificationStatus::Pending {
            return Err(ServiceError::Validation(
                "Verification status must be approved or rejected".into(),
            ));
        }

        let listing = self
            .store
            .set_verification(id, status, self.clock.now())
            .await?;
        tracing::info!(listing_id = %id, status = ?status, "Listing verification changed");
        Ok(listing)
    }

    /// Toggle the advertised flag under the slot cap
    pub async fn set_advertised(
        &self,
        actor: &Identity,
        id: Uuid,
        advertised: bool,
    ) -> ServiceResult<Listing> {
        actor.require_role(UserRole::Admin)?;

        let result = self
            .store
            .set_advertised(id, advertised, self.advertise_cap, self.clock.now())
            .await;

        match &result {
            Ok(_) => tracing::info!(listing_id = %id, advertised, "Advertised flag set"),
            Err(e) => tracing::debug!(listing_id = %id, advertised, error = %e, "Advertise toggle refused"),
        }
        Ok(result?)
    }

    /// Public paginated search
    pub async fn search(&self, query: ListingQuery) -> ServiceResult<ListingPage> {
        let filter = query.into_filter()?;
        Ok(self.store.search_listings(&filter, self.clock.now()).await?)
    }

    pub async fn locations(&self) -> ServiceResult<Locations> {
        Ok(self.store.listing_locations(self.clock.now()).await?)
    }

    pub async fn advertised(&self) -> ServiceResult<Vec<Listing>> {
        Ok(self.store.advertised_listings(self.clock.now()).await?)
    }

    /// The calling vendor's listings in every state
    pub async fn vendor_listings(&self, actor: &Identity) -> ServiceResult<Vec<Listing>> {
        actor.require_role(UserRole::Vendor)?;
        Ok(self.store.listings_by_vendor(actor.user_id).await?)
    }

    pub async fn all_listings(&self, actor: &Identity) -> ServiceResult<Vec<Listing>> {
        actor.require_role(UserRole::Admin)?;
        Ok(self.store.all_listings().await?)
    }

    async fn owned_listing(&self, actor: &Identity, id: Uuid) -> ServiceResult<Listing> {
        actor.require_role(UserRole::Vendor)?;
        let listing = self.store.get_listing(id).await?;
        if listing.vendor_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "Listing belongs to another vendor".into(),
            ));
        }
        Ok(listing)
    }
}
