//! In-memory store
//!
//! All state sits behind one async mutex, so every operation is trivially
//! atomic. Used by the test suites and by `STORAGE=memory` development runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ReservationRequest, Store, StoreError, StoreResult};
use crate::booking::{Booking, BookingFilter, BookingStatus, BookingTransition};
use crate::inventory::{LedgerError, SeatLedger};
use crate::listing::{
    Listing, ListingChanges, ListingFilter, ListingPage, ListingSort, Locations, VerificationStatus,
};
use crate::models::{User, UserRole};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    listings: HashMap<Uuid, Listing>,
    bookings: HashMap<Uuid, Booking>,
}

impl MemoryState {
    fn vendor_is_fraud(&self, vendor_id: Uuid) -> bool {
        self.users.get(&vendor_id).map_or(false, |u| u.fraud)
    }

    fn publicly_listed(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Listing> {
        self.listings
            .values()
            .filter(move |l| l.is_listed(now) && !self.vendor_is_fraud(l.vendor_id))
    }

    fn listing_mut(&mut self, id: Uuid) -> StoreResult<&mut Listing> {
        self.listings.get_mut(&id).ok_or(StoreError::NotFound("Listing"))
    }

    fn release_seats(&mut self, listing_id: Uuid, quantity: i32, at: DateTime<Utc>) {
        // the listing may have been deleted; its seats go with it
        if let Some(listing) = self.listings.get_mut(&listing_id) {
            let mut ledger = SeatLedger::new(listing.total_quantity, listing.remaining_quantity);
            ledger.release(quantity);
            listing.remaining_quantity = ledger.remaining();
            listing.updated_at = at;
        }
    }
}

/// Process-local [`Store`]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(mut items: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict(format!(
                "An account with email {} already exists",
                user.email
            )));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        let state = self.state.lock().await;
        state.users.get(&id).cloned().ok_or(StoreError::NotFound("User"))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let state = self.state.lock().await;
        Ok(newest_first(state.users.values().cloned().collect(), |u| {
            u.created_at
        }))
    }

    async fn set_user_role(&self, id: Uuid, role: UserRole, at: DateTime<Utc>) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound("User"))?;
        user.role = role;
        user.updated_at = at;
        Ok(user.clone())
    }

    async fn set_user_fraud(&self, id: Uuid, fraud: bool, at: DateTime<Utc>) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound("User"))?;
        user.fraud = fraud;
        user.updated_at = at;
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&id) {
            return Err(StoreError::NotFound("User"));
        }

        let sold = state
            .bookings
            .values()
            .filter(|b| b.vendor_id == id && b.status.is_open())
            .count();
        if sold > 0 {
            return Err(StoreError::Conflict(format!(
                "Vendor listings have {} open booking(s)",
                sold
            )));
        }
        state.users.remove(&id);

        let held: Vec<(Uuid, i32)> = state
            .bookings
            .values()
            .filter(|b| b.purchaser_id == id && b.status.is_open())
            .map(|b| (b.listing_id, b.quantity))
            .collect();
        for (listing_id, quantity) in held {
            state.release_seats(listing_id, quantity, at);
        }

        state.bookings.retain(|_, b| b.purchaser_id != id);
        state.listings.retain(|_, l| l.vendor_id != id);
        Ok(())
    }

    async fn insert_listing(&self, listing: Listing) -> StoreResult<Listing> {
        let mut state = self.state.lock().await;
        state.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn get_listing(&self, id: Uuid) -> StoreResult<Listing> {
        let state = self.state.lock().await;
        state
            .listings
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("Listing"))
    }

    async fn search_listings(&self, filter: &ListingFilter, now: DateTime<Utc>) -> StoreResult<ListingPage> {
        let state = self.state.lock().await;
        let mut matching: Vec<Listing> = state
            .publicly_listed(now)
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();

        match filter.sort {
            ListingSort::PriceAsc => {
                matching.sort_by(|a, b| a.price.cmp(&b.price).then(a.departure_at.cmp(&b.departure_at)))
            }
            ListingSort::PriceDesc => {
                matching.sort_by(|a, b| b.price.cmp(&a.price).then(a.departure_at.cmp(&b.departure_at)))
            }
            ListingSort::Departure => matching.sort_by(|a, b| {
                a.departure_at
                    .cmp(&b.departure_at)
                    .then(b.created_at.cmp(&a.created_at))
            }),
        }

        let total = matching.len() as i64;
        let tickets = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .collect();

        Ok(ListingPage { tickets, total })
    }

    async fn listing_locations(&self, now: DateTime<Utc>) -> StoreResult<Locations> {
        let state = self.state.lock().await;
        let mut from = BTreeSet::new();
        let mut to = BTreeSet::new();
        for listing in state.publicly_listed(now) {
            from.insert(listing.from_location.clone());
            to.insert(listing.to_location.clone());
        }
        Ok(Locations {
            from: from.into_iter().collect(),
            to: to.into_iter().collect(),
        })
    }

    async fn advertised_listings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Listing>> {
        let state = self.state.lock().await;
        let mut listings: Vec<Listing> = state
            .publicly_listed(now)
            .filter(|l| l.advertised)
            .cloned()
            .collect();
        listings.sort_by_key(|l| l.departure_at);
        Ok(listings)
    }

    async fn listings_by_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Listing>> {
        let state = self.state.lock().await;
        let listings = state
            .listings
            .values()
            .filter(|l| l.vendor_id == vendor_id)
            .cloned()
            .collect();
        Ok(newest_first(listings, |l| l.created_at))
    }

    async fn all_listings(&self) -> StoreResult<Vec<Listing>> {
        let state = self.state.lock().await;
        Ok(newest_first(state.listings.values().cloned().collect(), |l| {
            l.created_at
        }))
    }

    async fn update_listing(&self, id: Uuid, changes: ListingChanges, at: DateTime<Utc>) -> StoreResult<Listing> {
        let mut state = self.state.lock().await;
        let listing = state.listing_mut(id)?;

        if let Some(total) = changes.total_quantity {
            let mut ledger = SeatLedger::new(listing.total_quantity, listing.remaining_quantity);
            ledger.resize(total).map_err(|e| StoreError::Conflict(e.to_string()))?;
            listing.total_quantity = ledger.total();
            listing.remaining_quantity = ledger.remaining();
        }
        if let Some(title) = changes.title {
            listing.title = title;
        }
        if let Some(from) = changes.from_location {
            listing.from_location = from;
        }
        if let Some(to) = changes.to_location {
            listing.to_location = to;
        }
        if let Some(transport_type) = changes.transport_type {
            listing.transport_type = transport_type;
        }
        if let Some(price) = changes.price {
            listing.price = price;
        }
        if let Some(departure_at) = changes.departure_at {
            listing.departure_at = departure_at;
        }
        if let Some(perks) = changes.perks {
            listing.perks = perks;
        }
        if let Some(image_url) = changes.image_url {
            listing.image_url = Some(image_url);
        }
        if listing.verification_status == VerificationStatus::Rejected {
            listing.verification_status = VerificationStatus::Pending;
        }
        listing.updated_at = at;

        Ok(listing.clone())
    }

    async fn delete_listing(&self, id: Uuid) -> StoreResult<Listing> {
        let mut state = self.state.lock().await;
        if !state.listings.contains_key(&id) {
            return Err(StoreError::NotFound("Listing"));
        }
        let open = state
            .bookings
            .values()
            .filter(|b| b.listing_id == id && b.status.is_open())
            .count();
        if open > 0 {
            return Err(StoreError::Conflict(format!(
                "Listing has {} open booking(s)",
                open
            )));
        }
        state
            .listings
            .remove(&id)
            .ok_or(StoreError::NotFound("Listing"))
    }

    async fn set_verification(&self, id: Uuid, status: VerificationStatus, at: DateTime<Utc>) -> StoreResult<Listing> {
        let mut state = self.state.lock().await;
        let listing = state.listing_mut(id)?;
        listing.verification_status = status;
        if status == VerificationStatus::Rejected {
            listing.advertised = false;
        }
        listing.updated_at = at;
        Ok(listing.clone())
    }

    async fn set_advertised(&self, id: Uuid, advertised: bool, cap: u32, now: DateTime<Utc>) -> StoreResult<Listing> {
        let mut state = self.state.lock().await;
        let listing = state.listings.get(&id).ok_or(StoreError::NotFound("Listing"))?;

        if advertised && !listing.advertised {
            if !listing.is_approved() {
                return Err(StoreError::Invalid(
                    "Only approved listings can be advertised".to_string(),
                ));
            }
            if listing.is_departed(now) {
                return Err(StoreError::Departed {
                    departure_at: listing.departure_at,
                });
            }
            let in_use = state.publicly_listed(now).filter(|l| l.advertised).count();
            if in_use >= cap as usize {
                return Err(StoreError::SlotLimitReached { cap });
            }
        }

        let listing = state.listing_mut(id)?;
        if listing.advertised != advertised {
            listing.advertised = advertised;
            listing.updated_at = now;
        }
        Ok(listing.clone())
    }

    async fn reserve_booking(&self, request: ReservationRequest, now: DateTime<Utc>) -> StoreResult<Booking> {
        let mut state = self.state.lock().await;
        let vendor_fraud = {
            let listing = state
                .listings
                .get(&request.listing_id)
                .ok_or(StoreError::NotFound("Listing"))?;
            state.vendor_is_fraud(listing.vendor_id)
        };

        let listing = state.listing_mut(request.listing_id)?;
        if listing.is_departed(now) {
            return Err(StoreError::Departed {
                departure_at: listing.departure_at,
            });
        }
        if !listing.is_approved() || vendor_fraud {
            return Err(StoreError::Invalid(
                "Listing is not open for booking".to_string(),
            ));
        }

        let mut ledger = SeatLedger::new(listing.total_quantity, listing.remaining_quantity);
        ledger.try_reserve(request.quantity).map_err(|e| match e {
            LedgerError::Insufficient {
                requested,
                remaining,
            } => StoreError::InsufficientInventory {
                requested,
                remaining,
            },
            other => StoreError::Invalid(other.to_string()),
        })?;
        listing.remaining_quantity = ledger.remaining();
        listing.updated_at = now;

        let booking = Booking::from_reservation(listing, request.purchaser_id, request.quantity, now);
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Booking> {
        let state = self.state.lock().await;
        state
            .bookings
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("Booking"))
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let bookings = state
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        Ok(newest_first(bookings, |b| b.created_at))
    }

    async fn apply_transition(&self, transition: &BookingTransition) -> StoreResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get_mut(&transition.booking_id)
            .ok_or(StoreError::NotFound("Booking"))?;

        if booking.version != transition.expected_version || booking.status != transition.from {
            return Err(StoreError::VersionConflict);
        }

        booking.status = transition.to;
        booking.version += 1;
        booking.updated_at = transition.at;
        if let Some(tx) = &transition.transaction_id {
            booking.transaction_id = Some(tx.clone());
        }
        if transition.to == BookingStatus::Paid {
            booking.paid_at = Some(transition.at);
        }
        let updated = booking.clone();

        if transition.to.releases_inventory() {
            state.release_seats(updated.listing_id, updated.quantity, transition.at);
        }
        Ok(updated)
    }

    async fn attach_payment_session(
        &self,
        booking_id: Uuid,
        expected_version: i32,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::NotFound("Booking"))?;
        if booking.version != expected_version || booking.status != BookingStatus::Accepted {
            return Err(StoreError::VersionConflict);
        }
        booking.payment_session_id = Some(session_id.to_string());
        booking.version += 1;
        booking.updated_at = at;
        Ok(booking.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{CreateListingRequest, TransportType};
    use chrono::Duration;

    fn vendor(now: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            email: format!("{}@vendor.test", Uuid::new_v4()),
            name: "Vendor".into(),
            photo_url: None,
            password_hash: String::new(),
            role: UserRole::Vendor,
            fraud: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn approved_listing(vendor_id: Uuid, quantity: i32, now: DateTime<Utc>) -> Listing {
        let mut listing = Listing::new(
            vendor_id,
            CreateListingRequest {
                title: "Night coach".into(),
                from: "Dhaka".into(),
                to: "Sylhet".into(),
                transport_type: TransportType::Bus,
                price: 800,
                quantity,
                departure_at: now + Duration::days(1),
                perks: vec![],
                image_url: None,
            },
            now,
        );
        listing.verification_status = VerificationStatus::Approved;
        listing
    }

    #[tokio::test]
    async fn reserve_then_reject_restores_seats() {
        let now = Utc::now();
        let store = MemoryStore::new();
        let vendor = store.insert_user(vendor(now)).await.unwrap();
        let listing = store
            .insert_listing(approved_listing(vendor.id, 4, now))
            .await
            .unwrap();

        let booking = store
            .reserve_booking(
                ReservationRequest {
                    listing_id: listing.id,
                    purchaser_id: Uuid::new_v4(),
                    quantity: 3,
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(booking.total_price, 2400);
        assert_eq!(store.get_listing(listing.id).await.unwrap().remaining_quantity, 1);

        let transition = booking.transition_to(BookingStatus::Rejected, now).unwrap();
        store.apply_transition(&transition).await.unwrap();
        assert_eq!(store.get_listing(listing.id).await.unwrap().remaining_quantity, 4);

        // same transition again is stale
        assert!(matches!(
            store.apply_transition(&transition).await,
            Err(StoreError::VersionConflict)
        ));
        assert_eq!(store.get_listing(listing.id).await.unwrap().remaining_quantity, 4);
    }

    #[tokio::test]
    async fn fraud_vendor_listings_are_hidden_and_unbookable() {
        let now = Utc::now();
        let store = MemoryStore::new();
        let vendor = store.insert_user(vendor(now)).await.unwrap();
        let listing = store
            .insert_listing(approved_listing(vendor.id, 4, now))
            .await
            .unwrap();
        store.set_user_fraud(vendor.id, true, now).await.unwrap();

        let page = store
            .search_listings(&ListingFilter::default(), now)
            .await
            .unwrap();
        assert_eq!(page.total, 0);

        let result = store
            .reserve_booking(
                ReservationRequest {
                    listing_id: listing.id,
                    purchaser_id: Uuid::new_v4(),
                    quantity: 1,
                },
                now,
            )
            .await;
        assert!(matches!(result, Err(StoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let now = Utc::now();
        let store = MemoryStore::new();
        let mut user = vendor(now);
        user.email = "dup@example.com".into();
        store.insert_user(user.clone()).await.unwrap();

        user.id = Uuid::new_v4();
        user.email = "DUP@example.com".into();
        assert!(matches!(
            store.insert_user(user).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn deleting_a_purchaser_returns_their_seats() {
        let now = Utc::now();
        let store = MemoryStore::new();
        let vendor = store.insert_user(vendor(now)).await.unwrap();
        let mut purchaser = self::vendor(now);
        purchaser.role = UserRole::User;
        let purchaser = store.insert_user(purchaser).await.unwrap();
        let listing = store
            .insert_listing(approved_listing(vendor.id, 5, now))
            .await
            .unwrap();

        store
            .reserve_booking(
                ReservationRequest {
                    listing_id: listing.id,
                    purchaser_id: purchaser.id,
                    quantity: 2,
                },
                now,
            )
            .await
            .unwrap();
        store.delete_user(purchaser.id, now).await.unwrap();

        assert_eq!(store.get_listing(listing.id).await.unwrap().remaining_quantity, 5);
        assert!(store
            .list_bookings(&BookingFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn vendor_with_open_bookings_cannot_be_deleted() {
        let now = Utc::now();
        let store = MemoryStore::new();
        let vendor = store.insert_user(vendor(now)).await.unwrap();
        let listing = store
            .insert_listing(approved_listing(vendor.id, 5, now))
            .await
            .unwrap();
        let booking = store
            .reserve_booking(
                ReservationRequest {
                    listing_id: listing.id,
                    purchaser_id: Uuid::new_v4(),
                    quantity: 1,
                },
                now,
            )
            .await
            .unwrap();

        assert!(matches!(
            store.delete_user(vendor.id, now).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(store.get_user(vendor.id).await.is_ok());
        assert!(store.get_listing(listing.id).await.is_ok());

        let transition = booking.transition_to(BookingStatus::Rejected, now).unwrap();
        store.apply_transition(&transition).await.unwrap();
        store.delete_user(vendor.id, now).await.unwrap();
        assert!(matches!(
            store.get_listing(listing.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fraud_vendor_slots_are_freed() {
        let now = Utc::now();
        let store = MemoryStore::new();
        let flagged = store.insert_user(vendor(now)).await.unwrap();
        let honest = store.insert_user(vendor(now)).await.unwrap();
        let hidden = store
            .insert_listing(approved_listing(flagged.id, 2, now))
            .await
            .unwrap();
        let shown = store
            .insert_listing(approved_listing(honest.id, 2, now))
            .await
            .unwrap();

        store.set_advertised(hidden.id, true, 1, now).await.unwrap();
        store.set_user_fraud(flagged.id, true, now).await.unwrap();

        store.set_advertised(shown.id, true, 1, now).await.unwrap();
        let advertised = store.advertised_listings(now).await.unwrap();
        assert_eq!(advertised.len(), 1);
        assert_eq!(advertised[0].id, shown.id);
    }
}
