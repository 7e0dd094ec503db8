//! Listing models and request DTOs

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::booking::expiry::is_expired;
use crate::error::{ServiceError, ServiceResult};

pub const DEFAULT_PAGE_SIZE: u32 = 9;
pub const MAX_PAGE_SIZE: u32 = 50;

/// A batch of sellable seats on one journey
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Listing {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub title: String,
    #[serde(rename = "from")]
    pub from_location: String,
    #[serde(rename = "to")]
    pub to_location: String,
    pub transport_type: TransportType,
    /// Unit price in minor currency units
    pub price: i64,
    pub total_quantity: i32,
    pub remaining_quantity: i32,
    pub departure_at: DateTime<Utc>,
    pub perks: Vec<String>,
    pub image_url: Option<String>,
    pub verification_status: VerificationStatus,
    pub advertised: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Build a fresh listing from a validated request
    pub fn new(vendor_id: Uuid, req: CreateListingRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            vendor_id,
            title: req.title.trim().to_string(),
            from_location: req.from.trim().to_string(),
            to_location: req.to.trim().to_string(),
            transport_type: req.transport_type,
            price: req.price,
            total_quantity: req.quantity,
            remaining_quantity: req.quantity,
            departure_at: req.departure_at,
            perks: clean_perks(req.perks),
            image_url: req.image_url,
            verification_status: VerificationStatus::Pending,
            advertised: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_departed(&self, now: DateTime<Utc>) -> bool {
        is_expired(now, self.departure_at)
    }

    pub fn is_approved(&self) -> bool {
        self.verification_status == VerificationStatus::Approved
    }

    /// Approved and still ahead of departure. Vendor fraud is checked by the store.
    pub fn is_listed(&self, now: DateTime<Utc>) -> bool {
        self.is_approved() && !self.is_departed(now)
    }
}

/// Transport types
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "transport_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    #[serde(alias = "Bus")]
    Bus,
    #[serde(alias = "Train")]
    Train,
    #[serde(alias = "Flight", alias = "air", alias = "Air", alias = "plane", alias = "Plane")]
    Flight,
    #[serde(alias = "Launch", alias = "ship", alias = "Ship")]
    Launch,
}

impl TransportType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bus" => Some(TransportType::Bus),
            "train" => Some(TransportType::Train),
            "flight" | "air" | "plane" => Some(TransportType::Flight),
            "launch" | "ship" => Some(TransportType::Launch),
            _ => None,
        }
    }
}

/// Admin approval state of a listing
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "verification_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

/// Request DTO for creating a listing
#[derive(Debug, Deserialize, Validate)]
pub struct CreateListingRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub from: String,
    #[validate(length(min = 1, max = 100))]
    pub to: String,
    pub transport_type: TransportType,
    #[validate(range(min = 1))]
    pub price: i64,
    #[validate(range(min = 1, max = 100000))]
    pub quantity: i32,
    pub departure_at: DateTime<Utc>,
    #[serde(default)]
    pub perks: Vec<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

impl CreateListingRequest {
    /// Checks beyond the field-level rules
    pub fn check(&self, now: DateTime<Utc>) -> ServiceResult<()> {
        self.validate()?;
        if self.title.trim().is_empty() {
            return Err(ServiceError::Validation("Title must not be blank".into()));
        }
        check_route(&self.from, &self.to)?;
        if is_expired(now, self.departure_at) {
            return Err(ServiceError::Validation(
                "Departure must be in the future".into(),
            ));
        }
        Ok(())
    }
}

/// Request DTO for a partial listing update
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateListingRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub from: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub to: Option<String>,
    pub transport_type: Option<TransportType>,
    #[validate(range(min = 1))]
    pub price: Option<i64>,
    #[validate(range(min = 1, max = 100000))]
    pub quantity: Option<i32>,
    pub departure_at: Option<DateTime<Utc>>,
    pub perks: Option<Vec<String>>,
    #[validate(url)]
    pub image_url: Option<String>,
}

impl UpdateListingRequest {
    /// Validate against the listing being edited and produce the changes
    pub fn into_changes(self, current: &Listing, now: DateTime<Utc>) -> ServiceResult<ListingChanges> {
        self.validate()?;

        let from = self.from.as_deref().unwrap_or(&current.from_location);
        let to = self.to.as_deref().unwrap_or(&current.to_location);
        check_route(from, to)?;

        if let Some(departure_at) = self.departure_at {
            if is_expired(now, departure_at) {
                return Err(ServiceError::Validation(
                    "Departure must be in the future".into(),
                ));
            }
        }

        Ok(ListingChanges {
            title: self.title.map(|t| t.trim().to_string()),
            from_location: self.from.map(|f| f.trim().to_string()),
            to_location: self.to.map(|t| t.trim().to_string()),
            transport_type: self.transport_type,
            price: self.price,
            total_quantity: self.quantity,
            departure_at: self.departure_at,
            perks: self.perks.map(clean_perks),
            image_url: self.image_url,
        })
    }
}

/// Validated field changes applied by the store
#[derive(Debug, Clone, Default)]
pub struct ListingChanges {
    pub title: Option<String>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub transport_type: Option<TransportType>,
    pub price: Option<i64>,
    pub total_quantity: Option<i32>,
    pub departure_at: Option<DateTime<Utc>>,
    pub perks: Option<Vec<String>>,
    pub image_url: Option<String>,
}

/// Admin verification decision
#[derive(Debug, Deserialize)]
pub struct SetVerificationRequest {
    pub status: VerificationStatus,
}

/// Admin advertise toggle
#[derive(Debug, Deserialize)]
pub struct SetAdvertisedRequest {
    pub advertised: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingSort {
    PriceAsc,
    PriceDesc,
    /// Soonest departure first
    #[default]
    Departure,
}

/// Query parameters of the public search
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "type")]
    pub transport_type: Option<String>,
    pub sort: Option<String>,
}

impl ListingQuery {
    pub fn into_filter(self) -> ServiceResult<ListingFilter> {
        let transport_type = match non_blank(self.transport_type) {
            Some(raw) => Some(TransportType::parse(&raw).ok_or_else(|| {
                ServiceError::Validation(format!("Unknown transport type '{}'", raw))
            })?),
            None => None,
        };

        let sort = match non_blank(self.sort).as_deref() {
            None => ListingSort::default(),
            Some("price_asc") | Some("asc") => ListingSort::PriceAsc,
            Some("price_desc") | Some("desc") => ListingSort::PriceDesc,
            Some(other) => {
                return Err(ServiceError::Validation(format!(
                    "Unknown sort '{}'. Expected price_asc or price_desc",
                    other
                )))
            }
        };

        Ok(ListingFilter {
            from: non_blank(self.from),
            to: non_blank(self.to),
            transport_type,
            sort,
            page: self.page.unwrap_or(1).max(1),
            limit: self
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        })
    }
}

/// Normalized search filter handed to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub transport_type: Option<TransportType>,
    pub sort: ListingSort,
    pub page: u32,
    pub limit: u32,
}

impl ListingFilter {
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    /// Case-insensitive substring match on the route
    pub fn matches(&self, listing: &Listing) -> bool {
        let contains = |haystack: &str, needle: &Option<String>| match needle {
            Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
            None => true,
        };
        contains(&listing.from_location, &self.from)
            && contains(&listing.to_location, &self.to)
            && self
                .transport_type
                .map_or(true, |t| t == listing.transport_type)
    }
}

impl Default for ListingFilter {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            transport_type: None,
            sort: ListingSort::default(),
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of search results
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingPage {
    pub tickets: Vec<Listing>,
    pub total: i64,
}

/// Distinct route endpoints of visible listings
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Locations {
    pub from: Vec<String>,
    pub to: Vec<String>,
}

fn check_route(from: &str, to: &str) -> ServiceResult<()> {
    if from.trim().is_empty() || to.trim().is_empty() {
        return Err(ServiceError::Validation(
            "Origin and destination are required".into(),
        ));
    }
    if from.trim().eq_ignore_ascii_case(to.trim()) {
        return Err(ServiceError::Validation(
            "Origin and destination must differ".into(),
        ));
    }
    Ok(())
}

fn clean_perks(perks: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(perks.len());
    for perk in perks {
        let perk = perk.trim();
        if !perk.is_empty() && !cleaned.iter().any(|p| p == perk) {
            cleaned.push(perk.to_string());
        }
    }
    cleaned
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(now: DateTime<Utc>) -> CreateListingRequest {
        CreateListingRequest {
            title: "Dhaka Express".into(),
            from: "Dhaka".into(),
            to: "Chittagong".into(),
            transport_type: TransportType::Train,
            price: 1200,
            quantity: 40,
            departure_at: now + Duration::days(3),
            perks: vec!["AC".into(), " AC ".into(), "".into(), "Snacks".into()],
            image_url: None,
        }
    }

    #[test]
    fn new_listing_starts_pending_with_full_inventory() {
        let now = Utc::now();
        let listing = Listing::new(Uuid::new_v4(), request(now), now);
        assert_eq!(listing.verification_status, VerificationStatus::Pending);
        assert!(!listing.advertised);
        assert_eq!(listing.remaining_quantity, listing.total_quantity);
        assert_eq!(listing.perks, vec!["AC".to_string(), "Snacks".to_string()]);
    }

    #[test]
    fn create_request_rejects_same_route_and_past_departure() {
        let now = Utc::now();
        let mut req = request(now);
        req.to = " dhaka ".into();
        assert!(matches!(req.check(now), Err(ServiceError::Validation(_))));

        let mut req = request(now);
        req.departure_at = now;
        assert!(matches!(req.check(now), Err(ServiceError::Validation(_))));

        let mut req = request(now);
        req.quantity = 0;
        assert!(matches!(req.check(now), Err(ServiceError::Validation(_))));

        assert!(request(now).check(now).is_ok());
    }

    #[test]
    fn transport_type_accepts_ui_spellings() {
        let t: TransportType = serde_json::from_str("\"Air\"").unwrap();
        assert_eq!(t, TransportType::Flight);
        let t: TransportType = serde_json::from_str("\"ship\"").unwrap();
        assert_eq!(t, TransportType::Launch);
        assert_eq!(TransportType::parse(" BUS "), Some(TransportType::Bus));
        assert_eq!(TransportType::parse("rocket"), None);
    }

    #[test]
    fn query_defaults_and_clamps() {
        let filter = ListingQuery::default().into_filter().unwrap();
        assert_eq!(filter, ListingFilter::default());

        let filter = ListingQuery {
            page: Some(0),
            limit: Some(500),
            transport_type: Some("".into()),
            sort: Some("price_desc".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, MAX_PAGE_SIZE);
        assert_eq!(filter.transport_type, None);
        assert_eq!(filter.sort, ListingSort::PriceDesc);

        let err = ListingQuery {
            sort: Some("random".into()),
            ..Default::default()
        }
        .into_filter();
        assert!(err.is_err());
    }

    #[test]
    fn filter_matches_case_insensitive_substrings() {
        let now = Utc::now();
        let listing = Listing::new(Uuid::new_v4(), request(now), now);
        let filter = ListingFilter {
            from: Some("dhak".into()),
            to: Some("CHITT".into()),
            transport_type: Some(TransportType::Train),
            ..Default::default()
        };
        assert!(filter.matches(&listing));

        let filter = ListingFilter {
            transport_type: Some(TransportType::Bus),
            ..Default::default()
        };
        assert!(!filter.matches(&listing));
        assert_eq!(
            ListingFilter {
                page: 3,
                limit: 9,
                ..Default::default()
            }
            .offset(),
            18
        );
    }

    #[test]
    fn update_checks_route_against_current_values() {
        let now = Utc::now();
        let listing = Listing::new(Uuid::new_v4(), request(now), now);
        let req = UpdateListingRequest {
            to: Some("Dhaka".into()),
            ..Default::default()
        };
        assert!(req.into_changes(&listing, now).is_err());

        let req = UpdateListingRequest {
            quantity: Some(50),
            ..Default::default()
        };
        let changes = req.into_changes(&listing, now).unwrap();
        assert_eq!(changes.total_quantity, Some(50));
        assert!(changes.title.is_none());
    }
}
