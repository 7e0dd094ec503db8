//! Admin account management

mod common;

use tickethub_server::booking::{BookingStatus, CreateBookingRequest};
use tickethub_server::error::ServiceError;
use tickethub_server::models::UserRole;
use tickethub_server::store::Store;

use common::TestApp;

#[tokio::test]
async fn test_role_changes_are_admin_only() {
    let app = TestApp::new().await;
    let member = app.user(UserRole::User).await;
    let accounts = &app.state.auth_service;

    assert!(matches!(
        accounts
            .set_role(&member.identity(), member.id, UserRole::Admin)
            .await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        accounts
            .set_role(&app.admin, app.admin.user_id, UserRole::User)
            .await,
        Err(ServiceError::Forbidden(_))
    ));

    let promoted = accounts
        .set_role(&app.admin, member.id, UserRole::Vendor)
        .await
        .unwrap();
    assert_eq!(promoted.role, UserRole::Vendor);
    assert_eq!(app.store.get_user(member.id).await.unwrap().role, UserRole::Vendor);
}

#[tokio::test]
async fn test_only_vendors_can_be_flagged() {
    let app = TestApp::new().await;
    let member = app.user(UserRole::User).await;
    let vendor = app.user(UserRole::Vendor).await;
    let accounts = &app.state.auth_service;

    assert!(matches!(
        accounts.set_fraud(&app.admin, member.id, true).await,
        Err(ServiceError::Validation(_))
    ));

    let flagged = accounts.set_fraud(&app.admin, vendor.id, true).await.unwrap();
    assert!(flagged.fraud);
    let cleared = accounts.set_fraud(&app.admin, vendor.id, false).await.unwrap();
    assert!(!cleared.fraud);
}

#[tokio::test]
async fn test_admins_cannot_delete_themselves() {
    let app = TestApp::new().await;
    let member = app.user(UserRole::User).await;
    let accounts = &app.state.auth_service;

    assert!(matches!(
        accounts.delete_user(&app.admin, app.admin.user_id).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        accounts.delete_user(&member.identity(), member.id).await,
        Err(ServiceError::Forbidden(_))
    ));

    accounts.delete_user(&app.admin, member.id).await.unwrap();
    assert!(app.store.get_user(member.id).await.is_err());
    assert!(app.store.get_user(app.admin.user_id).await.is_ok());
}

#[tokio::test]
async fn test_vendor_with_open_bookings_is_not_deleted() {
    let app = TestApp::new().await;
    let vendor = app.user(UserRole::Vendor).await;
    let purchaser = app.identity(UserRole::User).await;
    let listing = app.approved_listing(&vendor.identity(), 4, 600, 24).await;
    let booking = app
        .state
        .booking_service
        .create_booking(
            &purchaser,
            CreateBookingRequest {
                listing_id: listing.id,
                quantity: 1,
            },
        )
        .await
        .unwrap()
        .booking;
    app.state
        .booking_service
        .decide(&vendor.identity(), booking.id, BookingStatus::Accepted)
        .await
        .unwrap();
    let accounts = &app.state.auth_service;

    assert!(matches!(
        accounts.delete_user(&app.admin, vendor.id).await,
        Err(ServiceError::Conflict(_))
    ));
    assert!(app.store.get_listing(listing.id).await.is_ok());
    assert!(app
        .state
        .payment_service
        .create_checkout_session(&purchaser, booking.id)
        .await
        .is_ok());

    app.state
        .booking_service
        .decide(&vendor.identity(), booking.id, BookingStatus::Rejected)
        .await
        .unwrap();
    accounts.delete_user(&app.admin, vendor.id).await.unwrap();
    assert!(app.store.get_listing(listing.id).await.is_err());
    assert_eq!(
        app.store.get_booking(booking.id).await.unwrap().status,
        BookingStatus::Rejected
    );
}
