// src/handlers/ride_handler.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    errors::RideShareResult,
    models::{
        report::{FileReportRequest, Report, RideReportSummary},
        ride::{
            ArrivedRide, CancelRideRequest, GeoPoint, JoinRideRequest, OtpResponse, PostRideRequest,
            RespondToRequest, Ride, RideFilter, StartRideRequest, StartedRide, TripCompleted, TripStarted,
            VerifyOtpRequest,
        },
        user::{Caller, Role},
    },
    state::AppState,
};

/// A ride together with the moderation reports filed against it.
#[derive(Debug, Serialize, Deserialize)]
pub struct RideDetail {
    #[serde(flatten)]
    pub ride: Ride,
    pub reports: Vec<RideReportSummary>,
}

pub async fn post_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(request): Json<PostRideRequest>,
) -> RideShareResult<(StatusCode, Json<Ride>)> {
    caller.require_role(Role::Driver)?;
    let ride = state.ride_service.post_ride(&caller.id, request).await?;
    // A ban may have landed after the token check
    state.moderation_service.enforce_ban(&caller.id).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

pub async fn list_rides(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Query(filter): Query<RideFilter>,
) -> RideShareResult<Json<Vec<Ride>>> {
    Ok(Json(state.ride_service.list_rides(&filter).await?))
}

pub async fn get_ride(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(ride_id): Path<String>,
) -> RideShareResult<Json<RideDetail>> {
    let ride = state.ride_service.get_ride(&ride_id).await?;
    let reports = state
        .moderation_service
        .reports_for_ride(&ride_id)
        .await?
        .iter()
        .map(RideReportSummary::from)
        .collect();
    Ok(Json(RideDetail { ride, reports }))
}

pub async fn request_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
    Json(request): Json<JoinRideRequest>,
) -> RideShareResult<Json<Ride>> {
    caller.require_role(Role::Passenger)?;
    let ride = state.ride_service.request_ride(&ride_id, &caller.id, request).await?;
    Ok(Json(ride))
}

pub async fn respond_to_request(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
    Json(request): Json<RespondToRequest>,
) -> RideShareResult<Json<Ride>> {
    // driver_id never changes, so checking it ahead of the atomic update is safe
    state.ride_service.get_ride(&ride_id).await?.ensure_driver(&caller.id)?;
    let ride = state
        .ride_service
        .respond_to_request(&ride_id, &request.passenger_id, request.action)
        .await?;
    Ok(Json(ride))
}

pub async fn start_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
    Json(request): Json<StartRideRequest>,
) -> RideShareResult<Json<StartedRide>> {
    let location = GeoPoint::new(request.driver_latitude, request.driver_longitude);
    let started = state.ride_service.start_ride(&ride_id, &caller.id, location).await?;
    Ok(Json(started))
}

pub async fn mark_arrived(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
) -> RideShareResult<Json<ArrivedRide>> {
    Ok(Json(state.ride_service.mark_arrived(&ride_id, &caller.id).await?))
}

pub async fn start_trip(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
) -> RideShareResult<Json<TripStarted>> {
    Ok(Json(state.ride_service.start_trip(&ride_id, &caller.id).await?))
}

pub async fn complete_trip(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
) -> RideShareResult<Json<TripCompleted>> {
    Ok(Json(state.ride_service.complete_trip(&ride_id, &caller.id).await?))
}

pub async fn cancel_by_passenger(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
    Json(request): Json<CancelRideRequest>,
) -> RideShareResult<Json<Ride>> {
    caller.require_role(Role::Passenger)?;
    let ride = state
        .ride_service
        .cancel_by_passenger(&ride_id, &caller.id, &request.reason)
        .await?;
    Ok(Json(ride))
}

pub async fn generate_otp(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
) -> RideShareResult<Json<OtpResponse>> {
    Ok(Json(state.ride_service.generate_otp(&ride_id, &caller.id).await?))
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(ride_id): Path<String>,
    Json(request): Json<VerifyOtpRequest>,
) -> RideShareResult<Json<Ride>> {
    Ok(Json(state.ride_service.verify_otp(&ride_id, &request.otp).await?))
}

pub async fn report_driver(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
    Json(request): Json<FileReportRequest>,
) -> RideShareResult<(StatusCode, Json<Report>)> {
    let report = state
        .moderation_service
        .file_report(&ride_id, &caller.id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}
