//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{AuthService, AuthSettings};
use crate::booking::BookingService;
use crate::clock::Clock;
use crate::config::Config;
use crate::listing::ListingService;
use crate::payment::{CheckoutSettings, PaymentGateway, PaymentService};
use crate::services::AnalyticsService;
use crate::store::Store;
use crate::websocket::WsState;

/// Everything the services read from configuration
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub auth: AuthSettings,
    pub checkout: CheckoutSettings,
    pub advertise_slot_cap: u32,
    pub webhook_secret: Option<String>,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auth: AuthSettings {
                jwt_secret: config.jwt_secret.clone(),
                access_token_ttl_seconds: config.jwt_access_token_ttl_seconds,
                bcrypt_cost: config.bcrypt_cost,
                admin_emails: config.admin_emails.clone(),
            },
            checkout: CheckoutSettings::from(&config.payment),
            advertise_slot_cap: config.advertise_slot_cap,
            webhook_secret: config.webhook_secret.clone(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub listing_service: Arc<ListingService>,
    pub booking_service: Arc<BookingService>,
    pub payment_service: Arc<PaymentService>,
    pub analytics_service: Arc<AnalyticsService>,
    pub store: Arc<dyn Store>,
    pub ws_state: WsState,
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// Wire every service onto one store, gateway and clock
    pub fn build(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            auth_service: Arc::new(AuthService::new(
                store.clone(),
                clock.clone(),
                settings.auth,
            )),
            listing_service: Arc::new(ListingService::new(
                store.clone(),
                clock.clone(),
                settings.advertise_slot_cap,
            )),
            booking_service: Arc::new(BookingService::new(store.clone(), clock.clone())),
            payment_service: Arc::new(PaymentService::new(
                store.clone(),
                gateway,
                clock,
                settings.checkout,
            )),
            analytics_service: Arc::new(AnalyticsService::new(store.clone())),
            store,
            ws_state: WsState::new(),
            webhook_secret: settings.webhook_secret,
        }
    }
}

impl FromRef<AppState> for WsState {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ws_state.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<ListingService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.listing_service.clone()
    }
}

impl FromRef<AppState> for Arc<BookingService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.booking_service.clone()
    }
}

impl FromRef<AppState> for Arc<PaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.payment_service.clone()
    }
}

impl FromRef<AppState> for Arc<AnalyticsService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.analytics_service.clone()
    }
}
