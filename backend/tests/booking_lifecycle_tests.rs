//! Booking state machine through the service layer

mod common;

use chrono::Duration;

use tickethub_server::booking::{BookingStatus, CreateBookingRequest, TransitionOutcome};
use tickethub_server::error::ServiceError;
use tickethub_server::models::{Identity, UserRole};
use tickethub_server::store::Store;

use common::TestApp;

async fn book(app: &TestApp, purchaser: &Identity, listing_id: uuid::Uuid, quantity: i32) -> uuid::Uuid {
    app.state
        .booking_service
        .create_booking(
            purchaser,
            CreateBookingRequest {
                listing_id,
                quantity,
            },
        )
        .await
        .unwrap()
        .booking
        .id
}

async fn remaining(app: &TestApp, listing_id: uuid::Uuid) -> i32 {
    app.store.get_listing(listing_id).await.unwrap().remaining_quantity
}

#[tokio::test]
async fn test_reservation_snapshots_listing() {
    let app = TestApp::new().await;
    let vendor = app.identity(UserRole::Vendor).await;
    let purchaser = app.identity(UserRole::User).await;
    let listing = app.approved_listing(&vendor, 6, 750, 24).await;

    let view = app
        .state
        .booking_service
        .create_booking(
            &purchaser,
            CreateBookingRequest {
                listing_id: listing.id,
                quantity: 2,
            },
        )
        .await
        .unwrap();

    assert_eq!(view.booking.status, BookingStatus::Pending);
    assert_eq!(view.booking.total_price, 1500);
    assert_eq!(view.booking.vendor_id, vendor.user_id);
    assert_eq!(view.booking.from_location, "Dhaka");
    assert!(!view.expired);
    assert_eq!(remaining(&app, listing.id).await, 4);
}

#[tokio::test]
async fn test_accept_then_reject_restores_seats() {
    let app = TestApp::new().await;
    let vendor = app.identity(UserRole::Vendor).await;
    let purchaser = app.identity(UserRole::User).await;
    let listing = app.approved_listing(&vendor, 6, 750, 24).await;
    let booking_id = book(&app, &purchaser, listing.id, 3).await;

    let outcome = app
        .state
        .booking_service
        .decide(&vendor, booking_id, BookingStatus::Accepted)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        TransitionOutcome::Applied {
            from: BookingStatus::Pending,
            ..
        }
    ));
    assert_eq!(remaining(&app, listing.id).await, 3);

    app.state
        .booking_service
        .decide(&vendor, booking_id, BookingStatus::Rejected)
        .await
        .unwrap();
    assert_eq!(remaining(&app, listing.id).await, 6);

    // rejected is terminal
    let again = app
        .state
        .booking_service
        .decide(&vendor, booking_id, BookingStatus::Accepted)
        .await;
    assert!(matches!(
        again,
        Err(ServiceError::InvalidStateTransition {
            from: BookingStatus::Rejected,
            to: BookingStatus::Accepted
        })
    ));
    assert_eq!(remaining(&app, listing.id).await, 6);
}

#[tokio::test]
async fn test_purchaser_cancel_releases_seats() {
    let app = TestApp::new().await;
    let vendor = app.identity(UserRole::Vendor).await;
    let purchaser = app.identity(UserRole::User).await;
    let listing = app.approved_listing(&vendor, 4, 900, 24).await;
    let booking_id = book(&app, &purchaser, listing.id, 4).await;
    assert_eq!(remaining(&app, listing.id).await, 0);

    let stranger = app.identity(UserRole::User).await;
    assert!(matches!(
        app.state.booking_service.cancel(&stranger, booking_id).await,
        Err(ServiceError::Forbidden(_))
    ));

    let outcome = app
        .state
        .booking_service
        .cancel(&purchaser, booking_id)
        .await
        .unwrap();
    assert_eq!(outcome.booking().status, BookingStatus::Cancelled);
    assert_eq!(remaining(&app, listing.id).await, 4);
}

#[tokio::test]
async fn test_only_the_owning_vendor_decides() {
    let app = TestApp::new().await;
    let vendor = app.identity(UserRole::Vendor).await;
    let other_vendor = app.identity(UserRole::Vendor).await;
    let purchaser = app.identity(UserRole::User).await;
    let listing = app.approved_listing(&vendor, 4, 900, 24).await;
    let booking_id = book(&app, &purchaser, listing.id, 1).await;

    assert!(matches!(
        app.state
            .booking_service
            .decide(&other_vendor, booking_id, BookingStatus::Accepted)
            .await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        app.state
            .booking_service
            .decide(&vendor, booking_id, BookingStatus::Paid)
            .await,
        Err(ServiceError::Validation(_))
    ));
}

#[tokio::test]
async fn test_vendors_cannot_book() {
    let app = TestApp::new().await;
    let vendor = app.identity(UserRole::Vendor).await;
    let listing = app.approved_listing(&vendor, 4, 900, 24).await;

    let result = app
        .state
        .booking_service
        .create_booking(
            &vendor,
            CreateBookingRequest {
                listing_id: listing.id,
                quantity: 1,
            },
        )
        .await;
    assert!(matches!(result, Err(ServiceError::Forbidden(_))));
}

#[tokio::test]
async fn test_departure_expires_bookings() {
    let app = TestApp::new().await;
    let vendor = app.identity(UserRole::Vendor).await;
    let purchaser = app.identity(UserRole::User).await;
    let listing = app.approved_listing(&vendor, 4, 900, 2).await;
    let booking_id = book(&app, &purchaser, listing.id, 1).await;

    app.clock.advance(Duration::hours(3));

    let view = app
        .state
        .booking_service
        .get_booking(&purchaser, booking_id)
        .await
        .unwrap();
    assert!(view.expired);

    assert!(matches!(
        app.state
            .booking_service
            .decide(&vendor, booking_id, BookingStatus::Accepted)
            .await,
        Err(ServiceError::ExpiredListing { .. })
    ));

    // a departed listing takes no new reservations
    let late = app.identity(UserRole::User).await;
    assert!(matches!(
        app.state
            .booking_service
            .create_booking(
                &late,
                CreateBookingRequest {
                    listing_id: listing.id,
                    quantity: 1,
                },
            )
            .await,
        Err(ServiceError::ExpiredListing { .. })
    ));
}

#[tokio::test]
async fn test_unapproved_listing_is_not_bookable() {
    let app = TestApp::new().await;
    let vendor = app.identity(UserRole::Vendor).await;
    let purchaser = app.identity(UserRole::User).await;
    let listing = app
        .state
        .listing_service
        .create_listing(
            &vendor,
            common::listing_request(4, 900, app.now() + Duration::days(1)),
        )
        .await
        .unwrap();

    let result = app
        .state
        .booking_service
        .create_booking(
            &purchaser,
            CreateBookingRequest {
                listing_id: listing.id,
                quantity: 1,
            },
        )
        .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn test_booking_lists_filter_by_role() {
    let app = TestApp::new().await;
    let vendor = app.identity(UserRole::Vendor).await;
    let purchaser = app.identity(UserRole::User).await;
    let other = app.identity(UserRole::User).await;
    let listing = app.approved_listing(&vendor, 10, 900, 24).await;

    let first = book(&app, &purchaser, listing.id, 1).await;
    book(&app, &other, listing.id, 2).await;
    app.state
        .booking_service
        .decide(&vendor, first, BookingStatus::Accepted)
        .await
        .unwrap();

    let mine = app
        .state
        .booking_service
        .purchaser_bookings(&purchaser, None)
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);

    let requested = app
        .state
        .booking_service
        .vendor_bookings(&vendor, None)
        .await
        .unwrap();
    assert_eq!(requested.len(), 2);

    let pending = app
        .state
        .booking_service
        .vendor_bookings(&vendor, Some(BookingStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].booking.purchaser_id, other.user_id);

    assert!(matches!(
        app.state.booking_service.get_booking(&other, first).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_only_accepted_bookings_before_departure_are_payable() {
    let app = TestApp::new().await;
    let vendor = app.identity(UserRole::Vendor).await;
    let purchaser = app.identity(UserRole::User).await;
    let listing = app.approved_listing(&vendor, 4, 900, 2).await;
    let booking_id = book(&app, &purchaser, listing.id, 1).await;
    let bookings = &app.state.booking_service;

    let pending = bookings.get_booking(&purchaser, booking_id).await.unwrap();
    assert!(!pending.payable);

    bookings
        .decide(&vendor, booking_id, BookingStatus::Accepted)
        .await
        .unwrap();
    let accepted = bookings.get_booking(&purchaser, booking_id).await.unwrap();
    assert!(accepted.payable);
    assert!(!accepted.expired);

    app.clock.advance(Duration::hours(3));
    let departed = bookings.get_booking(&purchaser, booking_id).await.unwrap();
    assert_eq!(departed.booking.status, BookingStatus::Accepted);
    assert!(departed.expired);
    assert!(!departed.payable);
}
