//! Cross-cutting read services for TicketHub

mod analytics;

pub use analytics::{compute_vendor_stats, AnalyticsService, ChartPoint, VendorStats};
