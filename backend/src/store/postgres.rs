//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{ReservationRequest, Store, StoreError, StoreResult};
use crate::booking::{Booking, BookingFilter, BookingStatus, BookingTransition};
use crate::inventory::SeatLedger;
use crate::listing::{
    Listing, ListingChanges, ListingFilter, ListingPage, ListingSort, Locations, VerificationStatus,
};
use crate::models::{User, UserRole};

/// Advisory lock key serializing advertise toggles
const ADVERTISE_LOCK_KEY: i64 = 0x7469_636b_6164;

/// Visible-to-the-public predicate, joined as `l` (listings) and `u` (vendor)
const PUBLIC_LISTING_SQL: &str = " FROM listings l JOIN users u ON u.id = l.vendor_id \
     WHERE l.verification_status = 'approved' AND NOT u.fraud AND l.departure_at > ";

#[derive(Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

fn unique_violation(err: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(message()),
        _ => StoreError::Database(err),
    }
}

/// `%needle%` with LIKE metacharacters escaped
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_search_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ListingFilter, now: DateTime<Utc>) {
    builder.push(PUBLIC_LISTING_SQL);
    builder.push_bind(now);
    if let Some(from) = &filter.from {
        builder.push(" AND l.from_location ILIKE ");
        builder.push_bind(like_pattern(from));
    }
    if let Some(to) = &filter.to {
        builder.push(" AND l.to_location ILIKE ");
        builder.push_bind(like_pattern(to));
    }
    if let Some(transport_type) = filter.transport_type {
        builder.push(" AND l.transport_type = ");
        builder.push_bind(transport_type);
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.db_pool).await?;
        Ok(())
    }

    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let email = user.email.clone();
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, photo_url, password_hash, role, fraud, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.photo_url)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.fraud)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| unique_violation(e, || format!("An account with email {} already exists", email)))
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or(StoreError::NotFound("User"))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
                .bind(email)
                .fetch_optional(&self.db_pool)
                .await?,
        )
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
                .fetch_all(&self.db_pool)
                .await?,
        )
    }

    async fn set_user_role(&self, id: Uuid, role: UserRole, at: DateTime<Utc>) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET role = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(role)
        .bind(at)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(StoreError::NotFound("User"))
    }

    async fn set_user_fraud(&self, id: Uuid, fraud: bool, at: DateTime<Utc>) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET fraud = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(fraud)
        .bind(at)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(StoreError::NotFound("User"))
    }

    async fn delete_user(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.db_pool.begin().await?;

        let sold: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE vendor_id = $1 AND status IN ('pending', 'accepted')",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if sold > 0 {
            return Err(StoreError::Conflict(format!(
                "Vendor listings have {} open booking(s)",
                sold
            )));
        }

        // hand back seats held by the purchaser's open bookings
        sqlx::query(
            r#"
            UPDATE listings l
            SET remaining_quantity = LEAST(l.total_quantity, l.remaining_quantity + held.quantity),
                updated_at = $2
            FROM (
                SELECT listing_id, SUM(quantity)::INTEGER AS quantity
                FROM bookings
                WHERE purchaser_id = $1 AND status IN ('pending', 'accepted')
                GROUP BY listing_id
            ) held
            WHERE l.id = held.listing_id
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        // listings and purchases cascade
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::NotFound("User"));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_listing(&self, listing: Listing) -> StoreResult<Listing> {
        Ok(sqlx::query_as::<_, Listing>(
            r#"
            INSERT INTO listings (
                id, vendor_id, title, from_location, to_location, transport_type, price,
                total_quantity, remaining_quantity, departure_at, perks, image_url,
                verification_status, advertised, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(listing.id)
        .bind(listing.vendor_id)
        .bind(&listing.title)
        .bind(&listing.from_location)
        .bind(&listing.to_location)
        .bind(listing.transport_type)
        .bind(listing.price)
        .bind(listing.total_quantity)
        .bind(listing.remaining_quantity)
        .bind(listing.departure_at)
        .bind(&listing.perks)
        .bind(&listing.image_url)
        .bind(listing.verification_status)
        .bind(listing.advertised)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .fetch_one(&self.db_pool)
        .await?)
    }

    async fn get_listing(&self, id: Uuid) -> StoreResult<Listing> {
        sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or(StoreError::NotFound("Listing"))
    }

    async fn search_listings(&self, filter: &ListingFilter, now: DateTime<Utc>) -> StoreResult<ListingPage> {
        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        push_search_filters(&mut count_builder, filter, now);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        let mut query_builder = QueryBuilder::<Postgres>::new("SELECT l.*");
        push_search_filters(&mut query_builder, filter, now);
        query_builder.push(match filter.sort {
            ListingSort::PriceAsc => " ORDER BY l.price ASC, l.departure_at ASC",
            ListingSort::PriceDesc => " ORDER BY l.price DESC, l.departure_at ASC",
            ListingSort::Departure => " ORDER BY l.departure_at ASC, l.created_at DESC",
        });
        query_builder.push(" LIMIT ");
        query_builder.push_bind(i64::from(filter.limit));
        query_builder.push(" OFFSET ");
        query_builder.push_bind(filter.offset());

        let tickets = query_builder
            .build_query_as::<Listing>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(ListingPage { tickets, total })
    }

    async fn listing_locations(&self, now: DateTime<Utc>) -> StoreResult<Locations> {
        let from = sqlx::query_scalar::<_, String>(&format!(
            "SELECT DISTINCT l.from_location{}$1 ORDER BY 1",
            PUBLIC_LISTING_SQL
        ))
        .bind(now)
        .fetch_all(&self.db_pool)
        .await?;

        let to = sqlx::query_scalar::<_, String>(&format!(
            "SELECT DISTINCT l.to_location{}$1 ORDER BY 1",
            PUBLIC_LISTING_SQL
        ))
        .bind(now)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(Locations { from, to })
    }

    async fn advertised_listings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Listing>> {
        Ok(sqlx::query_as::<_, Listing>(&format!(
            "SELECT l.*{}$1 AND l.advertised ORDER BY l.departure_at ASC",
            PUBLIC_LISTING_SQL
        ))
        .bind(now)
        .fetch_all(&self.db_pool)
        .await?)
    }

    async fn listings_by_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Listing>> {
        Ok(sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE vendor_id = $1 ORDER BY created_at DESC",
        )
        .bind(vendor_id)
        .fetch_all(&self.db_pool)
        .await?)
    }

    async fn all_listings(&self) -> StoreResult<Vec<Listing>> {
        Ok(
            sqlx::query_as::<_, Listing>("SELECT * FROM listings ORDER BY created_at DESC")
                .fetch_all(&self.db_pool)
                .await?,
        )
    }

    async fn update_listing(&self, id: Uuid, changes: ListingChanges, at: DateTime<Utc>) -> StoreResult<Listing> {
        let mut tx = self.db_pool.begin().await?;

        let current = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("Listing"))?;

        let mut ledger = SeatLedger::new(current.total_quantity, current.remaining_quantity);
        if let Some(total) = changes.total_quantity {
            ledger
                .resize(total)
                .map_err(|e| StoreError::Conflict(e.to_string()))?;
        }
        let verification_status = match current.verification_status {
            VerificationStatus::Rejected => VerificationStatus::Pending,
            other => other,
        };

        let updated = sqlx::query_as::<_, Listing>(
            r#"
            UPDATE listings
            SET title = $2, from_location = $3, to_location = $4, transport_type = $5,
                price = $6, total_quantity = $7, remaining_quantity = $8, departure_at = $9,
                perks = $10, image_url = $11, verification_status = $12, updated_at = $13
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.title.unwrap_or(current.title))
        .bind(changes.from_location.unwrap_or(current.from_location))
        .bind(changes.to_location.unwrap_or(current.to_location))
        .bind(changes.transport_type.unwrap_or(current.transport_type))
        .bind(changes.price.unwrap_or(current.price))
        .bind(ledger.total())
        .bind(ledger.remaining())
        .bind(changes.departure_at.unwrap_or(current.departure_at))
        .bind(changes.perks.unwrap_or(current.perks))
        .bind(changes.image_url.or(current.image_url))
        .bind(verification_status)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_listing(&self, id: Uuid) -> StoreResult<Listing> {
        let mut tx = self.db_pool.begin().await?;

        // row lock keeps reservations out until we are done
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM listings WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("Listing"))?;

        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE listing_id = $1 AND status IN ('pending', 'accepted')",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if open > 0 {
            return Err(StoreError::Conflict(format!(
                "Listing has {} open booking(s)",
                open
            )));
        }

        let deleted = sqlx::query_as::<_, Listing>("DELETE FROM listings WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }

    async fn set_verification(&self, id: Uuid, status: VerificationStatus, at: DateTime<Utc>) -> StoreResult<Listing> {
        sqlx::query_as::<_, Listing>(
            r#"
            UPDATE listings
            SET verification_status = $2, advertised = advertised AND NOT $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(status == VerificationStatus::Rejected)
        .bind(at)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(StoreError::NotFound("Listing"))
    }

    async fn set_advertised(&self, id: Uuid, advertised: bool, cap: u32, now: DateTime<Utc>) -> StoreResult<Listing> {
        let mut tx = self.db_pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ADVERTISE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("Listing"))?;

        if listing.advertised == advertised {
            tx.commit().await?;
            return Ok(listing);
        }

        if advertised {
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
            let in_use: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(*){}$1 AND l.advertised",
                PUBLIC_LISTING_SQL
            ))
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            if in_use >= i64::from(cap) {
                return Err(StoreError::SlotLimitReached { cap });
            }
        }

        let updated = sqlx::query_as::<_, Listing>(
            "UPDATE listings SET advertised = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(advertised)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn reserve_booking(&self, request: ReservationRequest, now: DateTime<Utc>) -> StoreResult<Booking> {
        if request.quantity < 1 {
            return Err(StoreError::Invalid(format!(
                "quantity must be at least 1, got {}",
                request.quantity
            )));
        }

        let mut tx = self.db_pool.begin().await?;

        let reserved = sqlx::query_as::<_, Listing>(
            r#"
            UPDATE listings l
            SET remaining_quantity = l.remaining_quantity - $2, updated_at = $3
            FROM users u
            WHERE l.id = $1
              AND u.id = l.vendor_id
              AND NOT u.fraud
              AND l.verification_status = 'approved'
              AND l.departure_at > $3
              AND l.remaining_quantity >= $2
            RETURNING l.*
            "#,
        )
        .bind(request.listing_id)
        .bind(request.quantity)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let listing = match reserved {
            Some(listing) => listing,
            None => {
                // work out which guard failed
                let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = $1")
                    .bind(request.listing_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(StoreError::NotFound("Listing"))?;
                let vendor_fraud: bool =
                    sqlx::query_scalar("SELECT fraud FROM users WHERE id = $1")
                        .bind(listing.vendor_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .unwrap_or(false);

                return Err(if listing.is_departed(now) {
                    StoreError::Departed {
                        departure_at: listing.departure_at,
                    }
                } else if !listing.is_approved() || vendor_fraud {
                    StoreError::Invalid("Listing is not open for booking".to_string())
                } else {
                    StoreError::InsufficientInventory {
                        requested: request.quantity,
                        remaining: listing.remaining_quantity,
                    }
                });
            }
        };

        let booking = Booking::from_reservation(&listing, request.purchaser_id, request.quantity, now);
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (
                id, listing_id, vendor_id, purchaser_id, quantity, unit_price, total_price,
                status, version, listing_title, from_location, to_location, transport_type,
                departure_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(booking.listing_id)
        .bind(booking.vendor_id)
        .bind(booking.purchaser_id)
        .bind(booking.quantity)
        .bind(booking.unit_price)
        .bind(booking.total_price)
        .bind(booking.status)
        .bind(booking.version)
        .bind(&booking.listing_title)
        .bind(&booking.from_location)
        .bind(&booking.to_location)
        .bind(booking.transport_type)
        .bind(booking.departure_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Booking> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or(StoreError::NotFound("Booking"))
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let mut query_builder = QueryBuilder::<Postgres>::new("SELECT * FROM bookings WHERE 1=1");

        if let Some(purchaser_id) = filter.purchaser_id {
            query_builder.push(" AND purchaser_id = ");
            query_builder.push_bind(purchaser_id);
        }
        if let Some(vendor_id) = filter.vendor_id {
            query_builder.push(" AND vendor_id = ");
            query_builder.push_bind(vendor_id);
        }
        if let Some(status) = filter.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }
        query_builder.push(" ORDER BY created_at DESC");

        Ok(query_builder
            .build_query_as::<Booking>()
            .fetch_all(&self.db_pool)
            .await?)
    }

    async fn apply_transition(&self, transition: &BookingTransition) -> StoreResult<Booking> {
        let mut tx = self.db_pool.begin().await?;

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = $4,
                version = version + 1,
                transaction_id = COALESCE($5, transaction_id),
                paid_at = CASE WHEN $6 THEN $7 ELSE paid_at END,
                updated_at = $7
            WHERE id = $1 AND version = $2 AND status = $3
            RETURNING *
            "#,
        )
        .bind(transition.booking_id)
        .bind(transition.expected_version)
        .bind(transition.from)
        .bind(transition.to)
        .bind(&transition.transaction_id)
        .bind(transition.to == BookingStatus::Paid)
        .bind(transition.at)
        .fetch_optional(&mut *tx)
        .await?;

        let updated = match updated {
            Some(booking) => booking,
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bookings WHERE id = $1)")
                        .bind(transition.booking_id)
                        .fetch_one(&mut *tx)
                        .await?;
                return Err(if exists {
                    StoreError::VersionConflict
                } else {
                    StoreError::NotFound("Booking")
                });
            }
        };

        if transition.to.releases_inventory() {
            sqlx::query(
                r#"
                UPDATE listings
                SET remaining_quantity = LEAST(total_quantity, remaining_quantity + $2),
                    updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(updated.listing_id)
            .bind(updated.quantity)
            .bind(transition.at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn attach_payment_session(
        &self,
        booking_id: Uuid,
        expected_version: i32,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Booking> {
        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET payment_session_id = $3, version = version + 1, updated_at = $4
            WHERE id = $1 AND version = $2 AND status = 'accepted'
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(expected_version)
        .bind(session_id)
        .bind(at)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| unique_violation(e, || "Checkout session already in use".to_string()))?;

        match updated {
            Some(booking) => Ok(booking),
            None => {
                self.get_booking(booking_id).await?;
                Err(StoreError::VersionConflict)
            }
        }
    }
}
