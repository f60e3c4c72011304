// src/models/ride.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{RideShareError, RideShareResult};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Pending,   // Posted, open for requests (also re-entered after a passenger cancels)
    Started,   // Driver is heading to the pickup point
    Arrived,   // Driver is at the pickup point
    OnTrip,    // Passenger picked up, heading to the destination
    Completed, // Trip finished, fare fixed
    Cancelled, // Cancelled by moderation
}

impl RideStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "PENDING",
            RideStatus::Started => "STARTED",
            RideStatus::Arrived => "ARRIVED",
            RideStatus::OnTrip => "ON_TRIP",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassengerStatus {
    Requested,
    Accepted,
    Rejected,
    Cancelled, // Passenger withdrew after being accepted
}

/// Driver's answer to a pending request.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassengerAction {
    Accepted,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Where the passenger wants to be picked up.
///
/// Clients send a single string which is either a `"lat,lng"` pair or a
/// free-text address. It is classified once, when the request is made; the
/// address variant is geocoded lazily by the transitions that need a point.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PickupLocation {
    Coordinates(GeoPoint),
    Address(String),
}

impl PickupLocation {
    pub fn parse(raw: &str) -> RideShareResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RideShareError::MissingRequiredField("pickup_location".to_string()));
        }

        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if let [lat, lng] = parts.as_slice() {
            if let (Ok(lat), Ok(lng)) = (lat.parse::<f64>(), lng.parse::<f64>()) {
                let point = GeoPoint::new(lat, lng);
                if point.is_finite() {
                    return Ok(PickupLocation::Coordinates(point));
                }
            }
        }

        Ok(PickupLocation::Address(trimmed.to_string()))
    }

    pub fn coordinates(&self) -> Option<GeoPoint> {
        match self {
            PickupLocation::Coordinates(point) => Some(*point),
            PickupLocation::Address(_) => None,
        }
    }
}

impl fmt::Display for PickupLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickupLocation::Coordinates(point) => write!(f, "{},{}", point.lat, point.lng),
            PickupLocation::Address(address) => f.write_str(address),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Passenger {
    pub user_id: String,
    pub status: PassengerStatus,
    pub phone_number: String,
    pub pickup_location: PickupLocation,
    pub eta_seconds: Option<u64>,          // Set when the driver starts the ride
    pub distance_to_pickup_m: Option<u64>, // Set when the driver arrives
    pub cancel_reason: Option<String>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Ride {
    pub id: String,
    pub driver_id: String,
    pub driver_phone: String,
    pub status: RideStatus,

    // Route information
    pub from: String,
    pub to: String,
    pub from_coord: Option<GeoPoint>,
    pub to_coord: Option<GeoPoint>,
    pub departure_time: Option<String>,
    pub estimated_distance_m: Option<u64>, // Client-side estimate at posting
    pub estimated_duration_s: Option<u64>,

    // Capacity is a single passenger
    pub seats: u32,
    pub passengers: Vec<Passenger>,

    // Live tracking
    pub driver_location: Option<GeoPoint>,
    pub start_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub trip_start_time: Option<DateTime<Utc>>,
    pub trip_end_time: Option<DateTime<Utc>>,

    // Fixed at trip start / completion
    pub trip_distance_m: Option<u64>,
    pub trip_duration_s: Option<u64>,
    pub price: Option<u32>, // Rupees

    pub otp: Option<String>,

    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PostRideRequest {
    pub from: String,
    pub to: String,
    pub from_coord: Option<GeoPoint>,
    pub to_coord: Option<GeoPoint>,
    pub phone_number: String,
    pub seats: Option<u32>,
    pub departure_time: Option<String>,
    pub estimated_distance_m: Option<u64>,
    pub estimated_duration_s: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JoinRideRequest {
    pub phone_number: String,
    pub pickup_location: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RespondToRequest {
    pub passenger_id: String,
    pub action: PassengerAction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StartRideRequest {
    pub driver_latitude: f64,
    pub driver_longitude: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CancelRideRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyOtpRequest {
    pub otp: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OtpResponse {
    pub ride_id: String,
    pub otp: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StartedRide {
    pub ride: Ride,
    pub eta_seconds: u64,
    pub eta_minutes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ArrivedRide {
    pub ride: Ride,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TripStarted {
    pub ride: Ride,
    pub trip_distance_km: f64,
    pub trip_duration_minutes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TripCompleted {
    pub ride: Ride,
    pub price: u32,
    pub trip_distance_km: f64,
}

// Search and Filter Models
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RideFilter {
    pub status: Option<RideStatus>,
    pub driver_id: Option<String>,
    #[serde(default)]
    pub open: bool, // Only rides a passenger can still request
}

impl RideFilter {
    pub fn matches(&self, ride: &Ride) -> bool {
        if let Some(status) = self.status {
            if ride.status != status {
                return false;
            }
        }
        if let Some(driver_id) = &self.driver_id {
            if &ride.driver_id != driver_id {
                return false;
            }
        }
        !self.open || ride.is_open_for_requests()
    }
}

// Helper implementations
impl Ride {
    pub fn new(id: String, driver_id: &str, request: PostRideRequest) -> Self {
        let now = Utc::now();

        Self {
            id,
            driver_id: driver_id.to_string(),
            driver_phone: request.phone_number,
            status: RideStatus::Pending,
            from: request.from,
            to: request.to,
            from_coord: request.from_coord,
            to_coord: request.to_coord,
            departure_time: request.departure_time,
            estimated_distance_m: request.estimated_distance_m,
            estimated_duration_s: request.estimated_duration_s,
            seats: 1,
            passengers: Vec::new(),
            driver_location: None,
            start_time: None,
            arrival_time: None,
            trip_start_time: None,
            trip_end_time: None,
            trip_distance_m: None,
            trip_duration_s: None,
            price: None,
            otp: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_open_for_requests(&self) -> bool {
        self.status == RideStatus::Pending && !self.has_accepted_passenger()
    }

    pub fn has_accepted_passenger(&self) -> bool {
        self.passengers
            .iter()
            .any(|p| p.status == PassengerStatus::Accepted)
    }

    pub fn accepted_passenger(&self) -> Option<&Passenger> {
        self.passengers
            .iter()
            .find(|p| p.status == PassengerStatus::Accepted)
    }

    pub fn accepted_passenger_mut(&mut self) -> Option<&mut Passenger> {
        self.passengers
            .iter_mut()
            .find(|p| p.status == PassengerStatus::Accepted)
    }

    pub fn passenger(&self, user_id: &str) -> Option<&Passenger> {
        self.passengers.iter().find(|p| p.user_id == user_id)
    }

    pub fn passenger_mut(&mut self, user_id: &str) -> Option<&mut Passenger> {
        self.passengers.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn ensure_driver(&self, caller_id: &str) -> RideShareResult<()> {
        if self.driver_id != caller_id {
            return Err(RideShareError::NotRideDriver);
        }
        Ok(())
    }

    pub fn ensure_status(&self, expected: RideStatus) -> RideShareResult<()> {
        if self.status != expected {
            return Err(RideShareError::invalid_status(expected.as_str(), self.status));
        }
        Ok(())
    }

    pub fn ensure_not_terminal(&self) -> RideShareResult<()> {
        if self.status.is_terminal() {
            return Err(RideShareError::invalid_status("PENDING, STARTED, ARRIVED or ON_TRIP", self.status));
        }
        Ok(())
    }

    /// The accepted passenger, or a validation error naming the missing seat holder.
    pub fn require_accepted_passenger(&self) -> RideShareResult<&Passenger> {
        self.accepted_passenger()
            .ok_or_else(|| RideShareError::bad_request("No accepted passenger for this ride"))
    }
}

/// Metres to kilometres, rounded to two decimals for display.
pub fn metres_to_km(metres: u64) -> f64 {
    (metres as f64 / 10.0).round() / 100.0
}

/// Seconds to whole minutes, rounded up.
pub fn seconds_to_minutes(seconds: u64) -> u64 {
    seconds.div_ceil(60)
}
