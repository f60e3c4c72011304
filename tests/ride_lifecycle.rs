use std::sync::Arc;

use campus_rides::{
    models::ride::{
        GeoPoint, JoinRideRequest, PassengerAction, PassengerStatus, PickupLocation, PostRideRequest, Ride,
        RideFilter, RideStatus,
    },
    services::{
        geo_service::StubGeoResolver,
        ride_repository::{MemoryRideStore, RideRepository},
        ride_service::{RideOperations, RideService},
    },
    utils::fare::calculate_fare,
    ErrorKind, RideShareError,
};

const DRIVER: &str = "usr-251018-drv01";

fn engine(geo: StubGeoResolver) -> Arc<RideService> {
    Arc::new(RideService::new(Arc::new(MemoryRideStore::new()), Arc::new(geo)))
}

/// Engine plus a handle on its store, for records the API would never produce.
fn engine_with_store(geo: StubGeoResolver) -> (Arc<RideService>, Arc<MemoryRideStore>) {
    let store = Arc::new(MemoryRideStore::new());
    let svc = Arc::new(RideService::new(store.clone(), Arc::new(geo)));
    (svc, store)
}

async fn set_pickup_address(store: &MemoryRideStore, ride_id: &str, address: &str) {
    store
        .update(ride_id, &mut |ride: &mut Ride| {
            let passenger = ride.accepted_passenger_mut().unwrap();
            passenger.pickup_location = PickupLocation::Address(address.to_string());
            Ok(())
        })
        .await
        .unwrap();
}

fn post_request() -> PostRideRequest {
    PostRideRequest {
        from: "A".to_string(),
        to: "B".to_string(),
        phone_number: "555".to_string(),
        ..Default::default()
    }
}

fn join(pickup: &str) -> JoinRideRequest {
    JoinRideRequest {
        phone_number: "999".to_string(),
        pickup_location: pickup.to_string(),
    }
}

/// Post a ride and get one passenger accepted.
async fn accepted_ride(svc: &RideService, passenger: &str) -> Ride {
    let ride = svc.post_ride(DRIVER, post_request()).await.unwrap();
    svc.request_ride(&ride.id, passenger, join("10.0,20.0")).await.unwrap();
    svc.respond_to_request(&ride.id, passenger, PassengerAction::Accepted)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_driver_can_hold_one_active_ride() {
    let svc = engine(StubGeoResolver::new());
    let first = svc.post_ride(DRIVER, post_request()).await.unwrap();

    let err = svc.post_ride(DRIVER, post_request()).await.unwrap_err();
    assert!(matches!(err, RideShareError::ActiveRideExists(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Completing the first ride frees the driver
    let otp = svc.generate_otp(&first.id, DRIVER).await.unwrap();
    svc.verify_otp(&first.id, &otp.otp).await.unwrap();
    svc.post_ride(DRIVER, post_request()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_posts_by_same_driver() {
    let svc = engine(StubGeoResolver::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = svc.clone();
            tokio::spawn(async move { svc.post_ride(DRIVER, post_request()).await })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let created = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(created, 1);

    let active = svc
        .list_rides(&RideFilter {
            driver_id: Some(DRIVER.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_single_winner() {
    let svc = engine(StubGeoResolver::new());
    let ride = svc.post_ride(DRIVER, post_request()).await.unwrap();
    svc.request_ride(&ride.id, "usr-p1", join("1,1")).await.unwrap();
    svc.request_ride(&ride.id, "usr-p2", join("2,2")).await.unwrap();

    let (a, b) = {
        let (svc_a, svc_b) = (svc.clone(), svc.clone());
        let (id_a, id_b) = (ride.id.clone(), ride.id.clone());
        tokio::join!(
            tokio::spawn(async move { svc_a.respond_to_request(&id_a, "usr-p1", PassengerAction::Accepted).await }),
            tokio::spawn(async move { svc_b.respond_to_request(&id_b, "usr-p2", PassengerAction::Accepted).await }),
        )
    };
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.is_ok() != b.is_ok(), "exactly one accept must win");
    let (winner, loser) = if a.is_ok() { ("usr-p1", b) } else { ("usr-p2", a) };
    let loser_err = loser.unwrap_err();
    assert!(matches!(loser_err, RideShareError::SeatAlreadyTaken));
    assert_eq!(loser_err.kind(), ErrorKind::Conflict);

    let stored = svc.get_ride(&ride.id).await.unwrap();
    let accepted: Vec<_> = stored
        .passengers
        .iter()
        .filter(|p| p.status == PassengerStatus::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].user_id, winner);

    // The other request was auto-rejected by the winning accept
    let other = stored.passengers.iter().find(|p| p.user_id != winner).unwrap();
    assert_eq!(other.status, PassengerStatus::Rejected);
}

#[tokio::test]
async fn test_request_guards() {
    let svc = engine(StubGeoResolver::new());
    let ride = svc.post_ride(DRIVER, post_request()).await.unwrap();
    svc.request_ride(&ride.id, "usr-p1", join("Main Gate")).await.unwrap();

    let err = svc.request_ride(&ride.id, "usr-p1", join("Main Gate")).await.unwrap_err();
    assert!(matches!(err, RideShareError::DuplicateRequest));

    svc.respond_to_request(&ride.id, "usr-p1", PassengerAction::Accepted)
        .await
        .unwrap();
    let err = svc.request_ride(&ride.id, "usr-p2", join("1,1")).await.unwrap_err();
    assert!(matches!(err, RideShareError::SeatAlreadyTaken));

    let err = svc
        .respond_to_request(&ride.id, "usr-nobody", PassengerAction::Rejected)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = svc.request_ride(&ride.id, "usr-p3", join("  ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_reject_leaves_ride_open() {
    let svc = engine(StubGeoResolver::new());
    let ride = svc.post_ride(DRIVER, post_request()).await.unwrap();
    svc.request_ride(&ride.id, "usr-p1", join("1,1")).await.unwrap();

    let ride = svc
        .respond_to_request(&ride.id, "usr-p1", PassengerAction::Rejected)
        .await
        .unwrap();
    assert_eq!(ride.passengers[0].status, PassengerStatus::Rejected);
    assert!(ride.is_open_for_requests());

    let open = svc
        .list_rides(&RideFilter {
            open: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[test]
fn test_fare_table() {
    for (metres, fare) in [(0, 25), (1_999, 25), (2_000, 25), (5_000, 25), (6_000, 30), (20_000, 100)] {
        assert_eq!(calculate_fare(metres), fare);
    }
}

#[tokio::test]
async fn test_transitions_only_move_forward() {
    let svc = engine(StubGeoResolver::new().with_route(100, 60));
    let location = GeoPoint::new(10.01, 20.01);

    // No accepted passenger yet
    let ride = svc.post_ride(DRIVER, post_request()).await.unwrap();
    let err = svc.start_ride(&ride.id, DRIVER, location).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    svc.request_ride(&ride.id, "usr-p1", join("10.0,20.0")).await.unwrap();
    svc.respond_to_request(&ride.id, "usr-p1", PassengerAction::Accepted)
        .await
        .unwrap();

    let err = svc.complete_trip(&ride.id, DRIVER).await.unwrap_err();
    assert!(matches!(err, RideShareError::InvalidRideStatus { .. }));
    let err = svc.start_trip(&ride.id, DRIVER).await.unwrap_err();
    assert!(matches!(err, RideShareError::InvalidRideStatus { .. }));
    let err = svc.mark_arrived(&ride.id, DRIVER).await.unwrap_err();
    assert!(matches!(err, RideShareError::InvalidRideStatus { .. }));

    // Someone else cannot drive this ride
    let err = svc.start_ride(&ride.id, "usr-impostor", location).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    svc.start_ride(&ride.id, DRIVER, location).await.unwrap();

    // Retrying start does not advance twice
    let err = svc.start_ride(&ride.id, DRIVER, location).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(svc.get_ride(&ride.id).await.unwrap().status, RideStatus::Started);
}

#[tokio::test]
async fn test_passenger_cancel_reopens_ride() {
    let svc = engine(StubGeoResolver::new().with_route(100, 60));
    let ride = accepted_ride(&svc, "usr-p1").await;
    svc.start_ride(&ride.id, DRIVER, GeoPoint::new(10.01, 20.01))
        .await
        .unwrap();

    let err = svc.cancel_by_passenger(&ride.id, "usr-p1", "   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let ride = svc
        .cancel_by_passenger(&ride.id, "usr-p1", "Plans changed")
        .await
        .unwrap();
    assert_eq!(ride.status, RideStatus::Pending);
    let cancelled = ride.passenger("usr-p1").unwrap();
    assert_eq!(cancelled.status, PassengerStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("Plans changed"));
    assert!(ride.start_time.is_none());

    // Cancelling twice is refused
    let err = svc
        .cancel_by_passenger(&ride.id, "usr-p1", "Again")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let ride = svc.request_ride(&ride.id, "usr-p2", join("3,3")).await.unwrap();
    assert_eq!(ride.passengers.len(), 2);
    assert_eq!(ride.passengers[1].status, PassengerStatus::Requested);
}

#[tokio::test]
async fn test_cancel_by_unknown_passenger() {
    let svc = engine(StubGeoResolver::new());
    let ride = accepted_ride(&svc, "usr-p1").await;
    let err = svc
        .cancel_by_passenger(&ride.id, "usr-stranger", "No reason")
        .await
        .unwrap_err();
    assert!(matches!(err, RideShareError::PassengerNotFound(_)));
}

#[tokio::test]
async fn test_otp_completion() {
    let svc = engine(StubGeoResolver::new());
    let ride = accepted_ride(&svc, "usr-p1").await;

    // No code generated yet
    let err = svc.verify_otp(&ride.id, "123456").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let code = svc.generate_otp(&ride.id, DRIVER).await.unwrap().otp;
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let err = svc.verify_otp(&ride.id, wrong).await.unwrap_err();
    assert!(matches!(err, RideShareError::BadRequest(_)));
    assert_eq!(svc.get_ride(&ride.id).await.unwrap().status, RideStatus::Pending);

    let ride = svc.verify_otp(&ride.id, &code).await.unwrap();
    assert_eq!(ride.status, RideStatus::Completed);
    assert!(ride.otp.is_none());
    assert!(ride.price.is_none());

    assert!(svc.verify_otp(&ride.id, &code).await.is_err());
}

#[tokio::test]
async fn test_full_trip() {
    let geo = StubGeoResolver::new()
        .with_geocode("B", GeoPoint::new(10.2, 20.2))
        .with_route(1_500, 300) // driver -> pickup, at start
        .with_route(1_200, 240) // driver -> pickup, at arrival
        .with_route(5_000, 600); // pickup -> destination
    let svc = engine(geo);

    let ride = svc.post_ride(DRIVER, post_request()).await.unwrap();
    assert_eq!(ride.status, RideStatus::Pending);

    svc.request_ride(&ride.id, "usr-p1", join("10.0,20.0")).await.unwrap();
    svc.request_ride(&ride.id, "usr-p2", join("Library")).await.unwrap();
    let ride = svc
        .respond_to_request(&ride.id, "usr-p1", PassengerAction::Accepted)
        .await
        .unwrap();
    assert_eq!(ride.passenger("usr-p2").unwrap().status, PassengerStatus::Rejected);

    let started = svc
        .start_ride(&ride.id, DRIVER, GeoPoint::new(10.01, 20.01))
        .await
        .unwrap();
    assert_eq!(started.eta_seconds, 300);
    assert_eq!(started.eta_minutes, 5);
    assert_eq!(started.ride.status, RideStatus::Started);
    assert_eq!(started.ride.accepted_passenger().unwrap().eta_seconds, Some(300));
    assert_eq!(started.ride.driver_location, Some(GeoPoint::new(10.01, 20.01)));

    let arrived = svc.mark_arrived(&ride.id, DRIVER).await.unwrap();
    assert_eq!(arrived.ride.status, RideStatus::Arrived);
    assert_eq!(
        arrived.ride.accepted_passenger().unwrap().distance_to_pickup_m,
        Some(1_200)
    );
    assert_eq!(arrived.distance_km, Some(1.2));

    let trip = svc.start_trip(&ride.id, DRIVER).await.unwrap();
    assert_eq!(trip.ride.status, RideStatus::OnTrip);
    assert_eq!(trip.ride.trip_distance_m, Some(5_000));
    assert_eq!(trip.ride.trip_duration_s, Some(600));
    assert_eq!(trip.ride.to_coord, Some(GeoPoint::new(10.2, 20.2)));
    assert_eq!(trip.trip_distance_km, 5.0);
    assert_eq!(trip.trip_duration_minutes, 10);

    let done = svc.complete_trip(&ride.id, DRIVER).await.unwrap();
    assert_eq!(done.price, 25);
    assert_eq!(done.ride.price, Some(25));
    assert_eq!(done.ride.status, RideStatus::Completed);
    assert!(done.ride.trip_end_time.is_some());

    // Timestamps were assigned in order
    let ride = done.ride;
    assert!(ride.start_time.unwrap() <= ride.arrival_time.unwrap());
    assert!(ride.arrival_time.unwrap() <= ride.trip_start_time.unwrap());
    assert!(ride.trip_start_time.unwrap() <= ride.trip_end_time.unwrap());

    let err = svc.complete_trip(&ride.id, DRIVER).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_geo_outage_only_blocks_trip_start() {
    let svc = engine(StubGeoResolver::failing());
    let ride = accepted_ride(&svc, "usr-p1").await;

    // ETA falls back to zero
    let started = svc
        .start_ride(&ride.id, DRIVER, GeoPoint::new(10.01, 20.01))
        .await
        .unwrap();
    assert_eq!(started.eta_seconds, 0);

    // Arrival is recorded without a distance
    let arrived = svc.mark_arrived(&ride.id, DRIVER).await.unwrap();
    assert_eq!(arrived.ride.status, RideStatus::Arrived);
    assert!(arrived.distance_km.is_none());

    // Trip start needs the route for the fare
    let err = svc.start_trip(&ride.id, DRIVER).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);

    let ride = svc.get_ride(&ride.id).await.unwrap();
    assert_eq!(ride.status, RideStatus::Arrived);
    assert!(ride.trip_distance_m.is_none());
}

#[tokio::test]
async fn test_start_requires_coordinate_pickup() {
    let geo = StubGeoResolver::new()
        .with_geocode("Main Gate", GeoPoint::new(10.0, 20.0))
        .with_route(1_500, 300);
    for geo in [geo, StubGeoResolver::failing()] {
        let svc = engine(geo);
        let ride = svc.post_ride(DRIVER, post_request()).await.unwrap();
        svc.request_ride(&ride.id, "usr-p1", join("Main Gate")).await.unwrap();
        svc.respond_to_request(&ride.id, "usr-p1", PassengerAction::Accepted)
            .await
            .unwrap();

        let err = svc
            .start_ride(&ride.id, DRIVER, GeoPoint::new(10.01, 20.01))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let ride = svc.get_ride(&ride.id).await.unwrap();
        assert_eq!(ride.status, RideStatus::Pending);
        assert!(ride.start_time.is_none());
        assert!(ride.accepted_passenger().unwrap().eta_seconds.is_none());
    }
}

#[tokio::test]
async fn test_arrival_geocodes_address_pickup() {
    let geo = StubGeoResolver::new()
        .with_geocode("Main Gate", GeoPoint::new(10.0, 20.0))
        .with_route(1_500, 300)
        .with_route(800, 120);
    let (svc, store) = engine_with_store(geo);
    let ride = accepted_ride(&svc, "usr-p1").await;
    svc.start_ride(&ride.id, DRIVER, GeoPoint::new(10.01, 20.01))
        .await
        .unwrap();
    set_pickup_address(&store, &ride.id, "Main Gate").await;

    let arrived = svc.mark_arrived(&ride.id, DRIVER).await.unwrap();
    assert_eq!(arrived.ride.status, RideStatus::Arrived);
    assert_eq!(arrived.distance_km, Some(0.8));
    assert_eq!(
        arrived.ride.accepted_passenger().unwrap().distance_to_pickup_m,
        Some(800)
    );
}

#[tokio::test]
async fn test_trip_start_rejects_unresolvable_pickup() {
    let geo = StubGeoResolver::new()
        .with_geocode("B", GeoPoint::new(10.2, 20.2))
        .with_route(1_500, 300)
        .with_route(1_200, 240)
        .with_route(5_000, 600);
    let (svc, store) = engine_with_store(geo);
    let ride = accepted_ride(&svc, "usr-p1").await;
    svc.start_ride(&ride.id, DRIVER, GeoPoint::new(10.01, 20.01))
        .await
        .unwrap();
    svc.mark_arrived(&ride.id, DRIVER).await.unwrap();
    set_pickup_address(&store, &ride.id, "Somewhere Unmapped").await;

    let err = svc.start_trip(&ride.id, DRIVER).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let ride = svc.get_ride(&ride.id).await.unwrap();
    assert_eq!(ride.status, RideStatus::Arrived);
    assert!(ride.trip_distance_m.is_none());
}

#[tokio::test]
async fn test_trip_start_rejects_unresolvable_destination() {
    // "B" is not in the geocode table and the ride has no destination coordinates
    let geo = StubGeoResolver::new()
        .with_route(1_500, 300)
        .with_route(1_200, 240)
        .with_route(5_000, 600);
    let svc = engine(geo);
    let ride = accepted_ride(&svc, "usr-p1").await;
    assert!(ride.to_coord.is_none());
    svc.start_ride(&ride.id, DRIVER, GeoPoint::new(10.01, 20.01))
        .await
        .unwrap();
    svc.mark_arrived(&ride.id, DRIVER).await.unwrap();

    let err = svc.start_trip(&ride.id, DRIVER).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let ride = svc.get_ride(&ride.id).await.unwrap();
    assert_eq!(ride.status, RideStatus::Arrived);
    assert!(ride.to_coord.is_none());
}

#[tokio::test]
async fn test_missing_route_rejects_trip_start() {
    let geo = StubGeoResolver::new()
        .with_geocode("B", GeoPoint::new(10.2, 20.2))
        .with_route(1_500, 300)
        .with_route(1_200, 240);
    let svc = engine(geo);
    let ride = accepted_ride(&svc, "usr-p1").await;
    svc.start_ride(&ride.id, DRIVER, GeoPoint::new(10.01, 20.01))
        .await
        .unwrap();
    svc.mark_arrived(&ride.id, DRIVER).await.unwrap();

    let err = svc.start_trip(&ride.id, DRIVER).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(svc.get_ride(&ride.id).await.unwrap().status, RideStatus::Arrived);
}

#[tokio::test]
async fn test_ban_cascade_cancels_active_rides() {
    let svc = engine(StubGeoResolver::new());
    let ride = accepted_ride(&svc, "usr-p1").await;

    assert_eq!(svc.cascade_cancel_for_banned_driver(DRIVER).await.unwrap(), 1);
    let ride = svc.get_ride(&ride.id).await.unwrap();
    assert_eq!(ride.status, RideStatus::Cancelled);

    // Terminal rides accept no further transitions
    let err = svc
        .cancel_by_passenger(&ride.id, "usr-p1", "Too late")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(svc.cascade_cancel_for_banned_driver(DRIVER).await.unwrap(), 0);
}
