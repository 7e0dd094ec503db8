//! Vendor dashboard analytics

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::booking::{Booking, BookingFilter, BookingStatus};
use crate::error::ServiceResult;
use crate::listing::Listing;
use crate::models::{Identity, UserRole};
use crate::store::Store;

/// One bar of the dashboard chart
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChartPoint {
    pub name: String,
    pub value: i64,
}

/// Sales summary for one vendor
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VendorStats {
    /// Sum of paid booking totals, minor units
    pub total_revenue: i64,
    /// Seats in paid bookings
    pub total_tickets_sold: i64,
    /// Seats across all of the vendor's listings
    pub total_tickets_added: i64,
    /// Bookings awaiting a decision
    pub new_bookings: i64,
    pub available_seats: i64,
    pub chart_data: Vec<ChartPoint>,
}

pub fn compute_vendor_stats(listings: &[Listing], bookings: &[Booking]) -> VendorStats {
    let paid = bookings.iter().filter(|b| b.status == BookingStatus::Paid);
    let total_revenue: i64 = paid.clone().map(|b| b.total_price).sum();
    let total_tickets_sold: i64 = paid.map(|b| i64::from(b.quantity)).sum();
    let total_tickets_added: i64 = listings.iter().map(|l| i64::from(l.total_quantity)).sum();
    let available_seats: i64 = listings.iter().map(|l| i64::from(l.remaining_quantity)).sum();
    let new_bookings = bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Pending)
        .count() as i64;

    let chart_data = vec![
        ChartPoint {
            name: "Revenue".into(),
            value: total_revenue,
        },
        ChartPoint {
            name: "Tickets Sold".into(),
            value: total_tickets_sold,
        },
        ChartPoint {
            name: "Tickets Added".into(),
            value: total_tickets_added,
        },
    ];

    VendorStats {
        total_revenue,
        total_tickets_sold,
        total_tickets_added,
        new_bookings,
        available_seats,
        chart_data,
    }
}

pub struct AnalyticsService {
    store: Arc<dyn Store>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn vendor_stats(&self, actor: &Identity) -> ServiceResult<VendorStats> {
        actor.require_role(UserRole::Vendor)?;
        let listings = self.store.listings_by_vendor(actor.user_id).await?;
        let bookings = self
            .store
            .list_bookings(&BookingFilter {
                vendor_id: Some(actor.user_id),
                ..Default::default()
            })
            .await?;
        Ok(compute_vendor_stats(&listings, &bookings))
    }
}
