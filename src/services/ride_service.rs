// src/services/ride_service.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing;

use crate::{
    errors::{RideShareError as AppError, RideShareResult},
    models::ride::{
        metres_to_km, seconds_to_minutes, ArrivedRide, GeoPoint, JoinRideRequest, OtpResponse, Passenger,
        PassengerAction, PassengerStatus, PickupLocation, PostRideRequest, Ride, RideFilter, RideStatus,
        StartedRide, TripCompleted, TripStarted,
    },
    services::{
        geo_service::{GeoError, GeoResolver},
        ride_repository::RideRepository,
    },
    utils::{
        fare::calculate_fare,
        id_generator::{generate_ride_id, IdGenerator, IdType},
    },
    ValidationError,
};

#[async_trait]
pub trait RideOperations: Send + Sync {
    async fn post_ride(&self, driver_id: &str, request: PostRideRequest) -> RideShareResult<Ride>;
    async fn get_ride(&self, ride_id: &str) -> RideShareResult<Ride>;
    async fn list_rides(&self, filter: &RideFilter) -> RideShareResult<Vec<Ride>>;
    async fn request_ride(
        &self,
        ride_id: &str,
        passenger_id: &str,
        request: JoinRideRequest,
    ) -> RideShareResult<Ride>;
    async fn respond_to_request(
        &self,
        ride_id: &str,
        passenger_id: &str,
        action: PassengerAction,
    ) -> RideShareResult<Ride>;
    async fn start_ride(&self, ride_id: &str, driver_id: &str, driver_location: GeoPoint)
        -> RideShareResult<StartedRide>;
    async fn mark_arrived(&self, ride_id: &str, driver_id: &str) -> RideShareResult<ArrivedRide>;
    async fn start_trip(&self, ride_id: &str, driver_id: &str) -> RideShareResult<TripStarted>;
    async fn complete_trip(&self, ride_id: &str, driver_id: &str) -> RideShareResult<TripCompleted>;
    async fn cancel_by_passenger(&self, ride_id: &str, passenger_id: &str, reason: &str) -> RideShareResult<Ride>;
    async fn generate_otp(&self, ride_id: &str, driver_id: &str) -> RideShareResult<OtpResponse>;
    async fn verify_otp(&self, ride_id: &str, otp: &str) -> RideShareResult<Ride>;
    async fn cascade_cancel_for_banned_driver(&self, driver_id: &str) -> RideShareResult<usize>;
    async fn delete_ride(&self, ride_id: &str) -> RideShareResult<()>;
}

/// The ride lifecycle engine.
///
/// Guards are checked twice: once against a snapshot so geo lookups can run
/// without holding the ride, and again inside the atomic repository update
/// so a concurrent transition that slipped in between is detected.
pub struct RideService {
    repository: Arc<dyn RideRepository>,
    geo: Arc<dyn GeoResolver>,
}

impl RideService {
    pub fn new(repository: Arc<dyn RideRepository>, geo: Arc<dyn GeoResolver>) -> Self {
        Self { repository, geo }
    }

    fn check_ride_id(ride_id: &str) -> RideShareResult<()> {
        if !IdGenerator::validate_id(ride_id, Some(IdType::Ride)) {
            tracing::warn!("Invalid ride ID format: {}", ride_id);
            return Err(AppError::ride_not_found(ride_id));
        }
        Ok(())
    }

    async fn load(&self, ride_id: &str) -> RideShareResult<Ride> {
        Self::check_ride_id(ride_id)?;
        self.repository
            .get(ride_id)
            .await?
            .ok_or_else(|| AppError::ride_not_found(ride_id))
    }

    async fn mutate<F>(&self, ride_id: &str, mut mutation: F) -> RideShareResult<Ride>
    where
        F: FnMut(&mut Ride) -> RideShareResult<()> + Send,
    {
        Self::check_ride_id(ride_id)?;
        self.repository.update(ride_id, &mut mutation).await
    }

    async fn resolve_pickup(&self, pickup: &PickupLocation) -> Result<Option<GeoPoint>, GeoError> {
        match pickup {
            PickupLocation::Coordinates(point) => Ok(Some(*point)),
            PickupLocation::Address(address) => self.geo.geocode(address).await,
        }
    }

    async fn resolve_destination(&self, ride: &Ride) -> Result<Option<GeoPoint>, GeoError> {
        match ride.to_coord {
            Some(point) => Ok(Some(point)),
            None => self.geo.geocode(&ride.to).await,
        }
    }

    fn validate_post(request: &PostRideRequest) -> RideShareResult<()> {
        let mut errors = Vec::new();
        let required = [
            ("from", &request.from),
            ("to", &request.to),
            ("phone_number", &request.phone_number),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("{} is required", field),
                });
            }
        }
        for (field, coord) in [("from_coord", request.from_coord), ("to_coord", request.to_coord)] {
            if coord.is_some_and(|point| !point.is_finite()) {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: "Coordinates must be finite numbers".to_string(),
                });
            }
        }
        if !errors.is_empty() {
            return Err(AppError::ValidationFailed(errors));
        }

        if let Some(seats) = request.seats {
            if seats != 1 {
                return Err(AppError::InvalidFieldValue {
                    field: "seats".to_string(),
                    value: seats.to_string(),
                    reason: "rides carry exactly one passenger".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RideOperations for RideService {
    async fn post_ride(&self, driver_id: &str, request: PostRideRequest) -> RideShareResult<Ride> {
        tracing::info!("Posting ride for driver: {}", driver_id);
        Self::validate_post(&request)?;

        let ride = Ride::new(generate_ride_id(), driver_id, request);
        let ride = self.repository.insert_for_driver(ride).await.inspect_err(|e| {
            tracing::warn!("Driver {} could not post ride: {}", driver_id, e);
        })?;

        tracing::info!("Ride posted: {} ({} -> {})", ride.id, ride.from, ride.to);
        Ok(ride)
    }

    async fn get_ride(&self, ride_id: &str) -> RideShareResult<Ride> {
        tracing::debug!("Getting ride: {}", ride_id);
        self.load(ride_id).await
    }

    async fn list_rides(&self, filter: &RideFilter) -> RideShareResult<Vec<Ride>> {
        tracing::debug!("Listing rides with filter: {:?}", filter);
        self.repository.list(filter).await
    }

    async fn request_ride(
        &self,
        ride_id: &str,
        passenger_id: &str,
        request: JoinRideRequest,
    ) -> RideShareResult<Ride> {
        if request.phone_number.trim().is_empty() {
            return Err(AppError::MissingRequiredField("phone_number".to_string()));
        }
        let pickup = PickupLocation::parse(&request.pickup_location)?;
        let phone_number = request.phone_number.trim().to_string();

        let ride = self
            .mutate(ride_id, |ride| {
                ride.ensure_status(RideStatus::Pending)?;
                if ride.driver_id == passenger_id {
                    return Err(AppError::bad_request("Drivers cannot request their own ride"));
                }
                if ride.passenger(passenger_id).is_some() {
                    return Err(AppError::DuplicateRequest);
                }
                if ride.has_accepted_passenger() {
                    return Err(AppError::SeatAlreadyTaken);
                }

                ride.passengers.push(Passenger {
                    user_id: passenger_id.to_string(),
                    status: PassengerStatus::Requested,
                    phone_number: phone_number.clone(),
                    pickup_location: pickup.clone(),
                    eta_seconds: None,
                    distance_to_pickup_m: None,
                    cancel_reason: None,
                    requested_at: Utc::now(),
                });
                Ok(())
            })
            .await?;

        tracing::info!("Passenger {} requested ride {}", passenger_id, ride_id);
        Ok(ride)
    }

    async fn respond_to_request(
        &self,
        ride_id: &str,
        passenger_id: &str,
        action: PassengerAction,
    ) -> RideShareResult<Ride> {
        let ride = self
            .mutate(ride_id, |ride| {
                let target_status = ride
                    .passenger(passenger_id)
                    .map(|p| p.status)
                    .ok_or_else(|| AppError::passenger_not_found(passenger_id))?;

                if action == PassengerAction::Accepted {
                    ride.ensure_status(RideStatus::Pending)?;
                    if ride.has_accepted_passenger() {
                        return Err(AppError::SeatAlreadyTaken);
                    }
                }
                if target_status != PassengerStatus::Requested {
                    return Err(AppError::conflict(format!(
                        "Request from {} is no longer pending",
                        passenger_id
                    )));
                }

                match action {
                    PassengerAction::Accepted => {
                        for passenger in ride.passengers.iter_mut() {
                            if passenger.user_id == passenger_id {
                                passenger.status = PassengerStatus::Accepted;
                            } else if passenger.status == PassengerStatus::Requested {
                                passenger.status = PassengerStatus::Rejected;
                            }
                        }
                    }
                    PassengerAction::Rejected => {
                        if let Some(passenger) = ride.passenger_mut(passenger_id) {
                            passenger.status = PassengerStatus::Rejected;
                        }
                    }
                }
                Ok(())
            })
            .await
            .inspect_err(|e| tracing::warn!("Respond on ride {} refused: {}", ride_id, e))?;

        tracing::info!("Ride {}: passenger {} {:?}", ride_id, passenger_id, action);
        Ok(ride)
    }

    async fn start_ride(
        &self,
        ride_id: &str,
        driver_id: &str,
        driver_location: GeoPoint,
    ) -> RideShareResult<StartedRide> {
        if !driver_location.is_finite() {
            return Err(AppError::validation_error(
                "driver_location",
                "Driver coordinates must be finite numbers",
            ));
        }

        let snapshot = self.load(ride_id).await?;
        snapshot.ensure_driver(driver_id)?;
        snapshot.ensure_status(RideStatus::Pending)?;
        let passenger = snapshot.require_accepted_passenger()?;
        let passenger_id = passenger.user_id.clone();

        // ETA needs a coordinate pickup; addresses are only geocoded later in the lifecycle
        let pickup = passenger
            .pickup_location
            .coordinates()
            .ok_or_else(|| AppError::bad_request("Invalid passenger pickup location"))?;

        let eta_seconds = match self.geo.route(driver_location, pickup).await {
            Ok(Some(route)) => route.duration_seconds,
            Ok(None) => {
                tracing::warn!("No route from driver to pickup for ride {}, ETA unknown", ride_id);
                0
            }
            Err(e) => {
                tracing::warn!("ETA lookup failed for ride {}: {}", ride_id, e);
                0
            }
        };

        let ride = self
            .mutate(ride_id, |ride| {
                ride.ensure_status(RideStatus::Pending)?;
                let passenger = ride
                    .accepted_passenger_mut()
                    .filter(|p| p.user_id == passenger_id)
                    .ok_or_else(|| AppError::conflict("Accepted passenger changed while starting"))?;
                passenger.eta_seconds = Some(eta_seconds);

                ride.status = RideStatus::Started;
                ride.start_time = Some(Utc::now());
                ride.driver_location = Some(driver_location);
                Ok(())
            })
            .await?;

        tracing::info!("Ride {} started, ETA {}s", ride_id, eta_seconds);
        Ok(StartedRide {
            ride,
            eta_seconds,
            eta_minutes: seconds_to_minutes(eta_seconds),
        })
    }

    async fn mark_arrived(&self, ride_id: &str, driver_id: &str) -> RideShareResult<ArrivedRide> {
        let snapshot = self.load(ride_id).await?;
        snapshot.ensure_driver(driver_id)?;
        snapshot.ensure_status(RideStatus::Started)?;

        // Distance enrichment never blocks arrival
        let mut distance_m = None;
        if let (Some(passenger), Some(driver_location)) = (snapshot.accepted_passenger(), snapshot.driver_location) {
            match self.resolve_pickup(&passenger.pickup_location).await {
                Ok(Some(pickup)) => match self.geo.route(driver_location, pickup).await {
                    Ok(route) => distance_m = route.map(|r| r.distance_meters),
                    Err(e) => tracing::warn!("Arrival distance lookup failed for ride {}: {}", ride_id, e),
                },
                Ok(None) => tracing::warn!("Pickup for ride {} could not be geocoded", ride_id),
                Err(e) => tracing::warn!("Pickup geocoding failed for ride {}: {}", ride_id, e),
            }
        }

        let ride = self
            .mutate(ride_id, |ride| {
                ride.ensure_status(RideStatus::Started)?;
                if let (Some(distance), Some(passenger)) = (distance_m, ride.accepted_passenger_mut()) {
                    passenger.distance_to_pickup_m = Some(distance);
                }
                ride.status = RideStatus::Arrived;
                ride.arrival_time = Some(Utc::now());
                Ok(())
            })
            .await?;

        tracing::info!("Driver arrived for ride {}", ride_id);
        Ok(ArrivedRide {
            ride,
            distance_km: distance_m.map(metres_to_km),
        })
    }

    async fn start_trip(&self, ride_id: &str, driver_id: &str) -> RideShareResult<TripStarted> {
        let snapshot = self.load(ride_id).await?;
        snapshot.ensure_driver(driver_id)?;
        snapshot.ensure_status(RideStatus::Arrived)?;
        let passenger = snapshot.require_accepted_passenger()?;

        let pickup = self
            .resolve_pickup(&passenger.pickup_location)
            .await?
            .ok_or_else(|| AppError::bad_request("Pickup location could not be resolved"))?;
        let destination = self
            .resolve_destination(&snapshot)
            .await?
            .ok_or_else(|| AppError::bad_request(format!("Destination '{}' could not be resolved", snapshot.to)))?;
        let route = self
            .geo
            .route(pickup, destination)
            .await?
            .ok_or_else(|| AppError::bad_request("No route between pickup and destination"))?;

        let ride = self
            .mutate(ride_id, |ride| {
                ride.ensure_status(RideStatus::Arrived)?;
                ride.require_accepted_passenger()?;
                ride.to_coord = Some(destination);
                ride.trip_distance_m = Some(route.distance_meters);
                ride.trip_duration_s = Some(route.duration_seconds);
                ride.trip_start_time = Some(Utc::now());
                ride.status = RideStatus::OnTrip;
                Ok(())
            })
            .await?;

        tracing::info!(
            "Trip started for ride {}: {}m, {}s",
            ride_id,
            route.distance_meters,
            route.duration_seconds
        );
        Ok(TripStarted {
            ride,
            trip_distance_km: metres_to_km(route.distance_meters),
            trip_duration_minutes: seconds_to_minutes(route.duration_seconds),
        })
    }

    async fn complete_trip(&self, ride_id: &str, driver_id: &str) -> RideShareResult<TripCompleted> {
        let snapshot = self.load(ride_id).await?;
        snapshot.ensure_driver(driver_id)?;

        let ride = self
            .mutate(ride_id, |ride| {
                ride.ensure_status(RideStatus::OnTrip)?;
                let price = calculate_fare(ride.trip_distance_m.unwrap_or(0));
                ride.price = Some(price);
                ride.status = RideStatus::Completed;
                ride.trip_end_time = Some(Utc::now());
                ride.otp = None;
                Ok(())
            })
            .await?;

        let price = ride.price.unwrap_or_default();
        let distance = ride.trip_distance_m.unwrap_or(0);
        tracing::info!("Ride {} completed, fare Rs {}", ride_id, price);
        Ok(TripCompleted {
            ride,
            price,
            trip_distance_km: metres_to_km(distance),
        })
    }

    async fn cancel_by_passenger(&self, ride_id: &str, passenger_id: &str, reason: &str) -> RideShareResult<Ride> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::validation_error("reason", "Cancellation reason is required"));
        }

        let ride = self
            .mutate(ride_id, |ride| {
                ride.ensure_not_terminal()?;
                let passenger = ride
                    .passenger_mut(passenger_id)
                    .ok_or_else(|| AppError::passenger_not_found(passenger_id))?;
                if passenger.status != PassengerStatus::Accepted {
                    return Err(AppError::bad_request("Only an accepted passenger can cancel"));
                }
                passenger.status = PassengerStatus::Cancelled;
                passenger.cancel_reason = Some(reason.to_string());

                // Reopen for new requests; progress of the abandoned pickup is discarded
                ride.status = RideStatus::Pending;
                ride.driver_location = None;
                ride.start_time = None;
                ride.arrival_time = None;
                ride.trip_start_time = None;
                ride.trip_distance_m = None;
                ride.trip_duration_s = None;
                ride.otp = None;
                Ok(())
            })
            .await?;

        tracing::info!("Passenger {} cancelled ride {}, ride reopened", passenger_id, ride_id);
        Ok(ride)
    }

    async fn generate_otp(&self, ride_id: &str, driver_id: &str) -> RideShareResult<OtpResponse> {
        let otp = IdGenerator::generate_otp();

        self.mutate(ride_id, |ride| {
            ride.ensure_driver(driver_id)?;
            ride.ensure_not_terminal()?;
            ride.otp = Some(otp.clone());
            Ok(())
        })
        .await?;

        tracing::info!("OTP generated for ride {}", ride_id);
        Ok(OtpResponse {
            ride_id: ride_id.to_string(),
            otp,
        })
    }

    async fn verify_otp(&self, ride_id: &str, otp: &str) -> RideShareResult<Ride> {
        let otp = otp.trim();
        if otp.is_empty() {
            return Err(AppError::MissingRequiredField("otp".to_string()));
        }

        let ride = self
            .mutate(ride_id, |ride| {
                ride.ensure_not_terminal()?;
                match ride.otp.as_deref() {
                    None => return Err(AppError::bad_request("No OTP has been generated for this ride")),
                    Some(stored) if stored != otp => return Err(AppError::bad_request("Invalid OTP")),
                    Some(_) => {}
                }
                ride.otp = None;
                ride.status = RideStatus::Completed;
                ride.trip_end_time = Some(Utc::now());
                Ok(())
            })
            .await
            .inspect_err(|e| tracing::warn!("OTP verification failed for ride {}: {}", ride_id, e))?;

        tracing::info!("Ride {} completed via OTP", ride_id);
        Ok(ride)
    }

    async fn cascade_cancel_for_banned_driver(&self, driver_id: &str) -> RideShareResult<usize> {
        let cancelled = self.repository.cancel_active_for_driver(driver_id).await?;
        tracing::info!("Cancelled {} active rides of banned driver {}", cancelled, driver_id);
        Ok(cancelled)
    }

    async fn delete_ride(&self, ride_id: &str) -> RideShareResult<()> {
        Self::check_ride_id(ride_id)?;
        if !self.repository.delete(ride_id).await? {
            return Err(AppError::ride_not_found(ride_id));
        }
        tracing::info!("Ride deleted: {}", ride_id);
        Ok(())
    }
}
