// src/handlers/mod.rs
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::state::AppState;

pub mod admin_handler;
pub mod auth;
pub mod ride_handler;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(admin_handler::health))
        .route("/rides", post(ride_handler::post_ride).get(ride_handler::list_rides))
        .route("/rides/:id", get(ride_handler::get_ride))
        .route("/rides/:id/request", post(ride_handler::request_ride))
        .route("/rides/:id/response", put(ride_handler::respond_to_request))
        .route("/rides/:id/start", post(ride_handler::start_ride))
        .route("/rides/:id/arrived", post(ride_handler::mark_arrived))
        .route("/rides/:id/start-trip", post(ride_handler::start_trip))
        .route("/rides/:id/complete", post(ride_handler::complete_trip))
        .route("/rides/:id/cancel-passenger", post(ride_handler::cancel_by_passenger))
        .route("/rides/:id/generate-otp", post(ride_handler::generate_otp))
        .route("/rides/:id/verify-otp", post(ride_handler::verify_otp))
        .route("/rides/:id/report-driver", post(ride_handler::report_driver))
        .route("/admin/stats", get(admin_handler::stats))
        .route("/admin/rides", get(admin_handler::list_all_rides))
        .route("/admin/rides/:id", delete(admin_handler::delete_ride))
        .route("/admin/reports", get(admin_handler::list_reports))
        .route("/admin/reports/:id/warn", put(admin_handler::warn_driver))
        .route("/admin/reports/:id/delete-account", put(admin_handler::ban_driver))
        .route("/admin/reports/:id/dismiss", put(admin_handler::dismiss_report))
        .route("/admin/drivers/:id", get(admin_handler::driver_standing))
        .with_state(state)
}
