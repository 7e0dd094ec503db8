//! Shared fixtures for the integration tests: an in-memory store, a manual
//! clock and the simulated payment gateway wired into a full `AppState`.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use tickethub_server::auth::AuthSettings;
use tickethub_server::clock::ManualClock;
use tickethub_server::listing::{CreateListingRequest, Listing, TransportType, VerificationStatus};
use tickethub_server::models::{Identity, User, UserRole};
use tickethub_server::payment::{CheckoutSettings, SimulatedGateway};
use tickethub_server::state::{AppState, ServiceSettings};
use tickethub_server::store::{MemoryStore, Store};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const ADVERTISE_CAP: u32 = 3;

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<SimulatedGateway>,
    pub admin: Identity,
}

pub fn settings() -> ServiceSettings {
    ServiceSettings {
        auth: AuthSettings {
            jwt_secret: JWT_SECRET.to_string(),
            access_token_ttl_seconds: 3600,
            // lowest cost bcrypt accepts, keeps tests fast
            bcrypt_cost: 4,
            admin_emails: vec!["root@tickethub.test".to_string()],
        },
        checkout: CheckoutSettings {
            success_url: "http://localhost/payment-success?session_id={CHECKOUT_SESSION_ID}"
                .to_string(),
            cancel_url: "http://localhost/dashboard/myBookings".to_string(),
            currency: "bdt".to_string(),
        },
        advertise_slot_cap: ADVERTISE_CAP,
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
    }
}

impl TestApp {
    /// The clock starts at the real current time so issued tokens verify
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gateway = Arc::new(SimulatedGateway::new());

        let state = AppState::build(store.clone(), gateway.clone(), clock.clone(), settings());

        let mut app = Self {
            state,
            store,
            clock,
            gateway,
            admin: Identity {
                user_id: Uuid::nil(),
                role: UserRole::Admin,
                fraud: false,
            },
        };
        app.admin = app.user(UserRole::Admin).await.identity();
        app
    }

    pub fn now(&self) -> DateTime<Utc> {
        use tickethub_server::clock::Clock;
        self.clock.now()
    }

    /// Insert an account directly, skipping password hashing
    pub async fn user(&self, role: UserRole) -> User {
        let now = self.now();
        let id = Uuid::new_v4();
        self.store
            .insert_user(User {
                id,
                email: format!("{}@tickethub.test", id.simple()),
                name: format!("{:?} {}", role, &id.simple().to_string()[..6]),
                photo_url: None,
                password_hash: String::new(),
                role,
                fraud: false,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    pub async fn identity(&self, role: UserRole) -> Identity {
        self.user(role).await.identity()
    }

    /// Vendor creates a listing departing in `hours`; the admin approves it
    pub async fn approved_listing(&self, vendor: &Identity, seats: i32, price: i64, hours: i64) -> Listing {
        let listing = self
            .state
            .listing_service
            .create_listing(vendor, listing_request(seats, price, self.now() + Duration::hours(hours)))
            .await
            .unwrap();
        self.state
            .listing_service
            .set_verification(&self.admin, listing.id, VerificationStatus::Approved)
            .await
            .unwrap()
    }
}

pub fn listing_request(seats: i32, price: i64, departure_at: DateTime<Utc>) -> CreateListingRequest {
    CreateListingRequest {
        title: "Green Line Express".to_string(),
        from: "Dhaka".to_string(),
        to: "Sylhet".to_string(),
        transport_type: TransportType::Bus,
        price,
        quantity: seats,
        departure_at,
        perks: vec!["AC".to_string(), "Water".to_string()],
        image_url: None,
    }
}
