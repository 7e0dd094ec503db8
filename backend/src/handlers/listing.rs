//! Listing catalogue handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{AuthenticatedUser, OptionalUser};
use crate::booking::BookingEvent;
use crate::error::ApiResult;
use crate::listing::{
    CreateListingRequest, Listing, ListingPage, ListingQuery, Locations, SetAdvertisedRequest,
    SetVerificationRequest, UpdateListingRequest,
};
use crate::models::ApiResponse;
use crate::state::AppState;

/// GET /tickets - Public search
pub async fn search_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> ApiResult<Json<ApiResponse<ListingPage>>> {
    let page = state.listing_service.search(query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /tickets/locations
pub async fn get_locations(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Locations>>> {
    let locations = state.listing_service.locations().await?;
    Ok(Json(ApiResponse::ok(locations)))
}

/// GET /tickets/advertised
pub async fn get_advertised(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<Listing>>>> {
    let listings = state.listing_service.advertised().await?;
    Ok(Json(ApiResponse::ok(listings)))
}

/// GET /tickets/:id
pub async fn get_listing(
    State(state): State<AppState>,
    user: OptionalUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Listing>>> {
    let listing = state
        .listing_service
        .get_listing(user.identity(), id)
        .await?;
    Ok(Json(ApiResponse::ok(listing)))
}

/// POST /tickets - Vendor adds a listing
pub async fn create_listing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateListingRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Listing>>)> {
    let listing = state
        .listing_service
        .create_listing(&user.identity, req)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(listing))))
}

/// PATCH /tickets/:id
pub async fn update_listing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateListingRequest>,
) -> ApiResult<Json<ApiResponse<Listing>>> {
    let listing = state
        .listing_service
        .update_listing(&user.identity, id, req)
        .await?;
    Ok(Json(ApiResponse::ok(listing)))
}

/// DELETE /tickets/:id
pub async fn delete_listing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Listing>>> {
    let listing = state
        .listing_service
        .delete_listing(&user.identity, id)
        .await?;
    Ok(Json(ApiResponse::ok(listing)))
}

/// GET /tickets/vendor - The caller's own listings
pub async fn vendor_listings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<Vec<Listing>>>> {
    let listings = state.listing_service.vendor_listings(&user.identity).await?;
    Ok(Json(ApiResponse::ok(listings)))
}

/// GET /tickets/admin - Every listing, for review
pub async fn all_listings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<Vec<Listing>>>> {
    let listings = state.listing_service.all_listings(&user.identity).await?;
    Ok(Json(ApiResponse::ok(listings)))
}

/// PATCH /tickets/status/:id - Approve or reject
pub async fn set_verification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetVerificationRequest>,
) -> ApiResult<Json<ApiResponse<Listing>>> {
    let listing = state
        .listing_service
        .set_verification(&user.identity, id, req.status)
        .await?;
    Ok(Json(ApiResponse::ok(listing)))
}

/// PATCH /tickets/advertise/:id - Toggle the advertised flag
pub async fn set_advertised(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetAdvertisedRequest>,
) -> ApiResult<Json<ApiResponse<Listing>>> {
    let listing = state
        .listing_service
        .set_advertised(&user.identity, id, req.advertised)
        .await?;

    state
        .ws_state
        .broadcast_event(BookingEvent::AdvertisedChanged {
            listing_id: listing.id,
            advertised: listing.advertised,
        })
        .await;

    Ok(Json(ApiResponse::ok(listing)))
}
