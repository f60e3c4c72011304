// src/handlers/admin_handler.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    errors::RideShareResult,
    models::{
        report::{DriverBanned, DriverStanding, PlatformStats, Report, ReviewReportRequest, WarningIssued},
        ride::{Ride, RideFilter},
        user::Caller,
    },
    state::AppState,
};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn stats(State(state): State<Arc<AppState>>, caller: Caller) -> RideShareResult<Json<PlatformStats>> {
    caller.require_admin()?;
    Ok(Json(state.moderation_service.stats().await?))
}

pub async fn list_all_rides(State(state): State<Arc<AppState>>, caller: Caller) -> RideShareResult<Json<Vec<Ride>>> {
    caller.require_admin()?;
    Ok(Json(state.ride_service.list_rides(&RideFilter::default()).await?))
}

pub async fn delete_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(ride_id): Path<String>,
) -> RideShareResult<StatusCode> {
    caller.require_admin()?;
    state.ride_service.delete_ride(&ride_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_reports(State(state): State<Arc<AppState>>, caller: Caller) -> RideShareResult<Json<Vec<Report>>> {
    caller.require_admin()?;
    Ok(Json(state.moderation_service.list_reports().await?))
}

pub async fn driver_standing(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(driver_id): Path<String>,
) -> RideShareResult<Json<DriverStanding>> {
    caller.require_admin()?;
    Ok(Json(state.moderation_service.driver_standing(&driver_id).await?))
}

pub async fn warn_driver(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(report_id): Path<String>,
    review: Option<Json<ReviewReportRequest>>,
) -> RideShareResult<Json<WarningIssued>> {
    caller.require_admin()?;
    let review = review.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(
        state
            .moderation_service
            .warn_driver(&report_id, &caller.id, review)
            .await?,
    ))
}

pub async fn ban_driver(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(report_id): Path<String>,
    review: Option<Json<ReviewReportRequest>>,
) -> RideShareResult<Json<DriverBanned>> {
    caller.require_admin()?;
    let review = review.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(
        state
            .moderation_service
            .ban_driver(&report_id, &caller.id, review)
            .await?,
    ))
}

pub async fn dismiss_report(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(report_id): Path<String>,
    review: Option<Json<ReviewReportRequest>>,
) -> RideShareResult<Json<Report>> {
    caller.require_admin()?;
    let review = review.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(
        state
            .moderation_service
            .dismiss_report(&report_id, &caller.id, review)
            .await?,
    ))
}
