// src/services/ride_repository.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing;

use crate::{
    errors::{RideShareError as AppError, RideShareResult},
    models::ride::{Ride, RideFilter, RideStatus},
};

/// Durable store of rides.
///
/// Every write is atomic per ride: `update` runs the mutation against a
/// private copy of the current record and only stores it when the mutation
/// returns `Ok`. A mutation may be invoked more than once when the backend
/// retries an optimistic transaction, so it must not consume captured state.
#[async_trait]
pub trait RideRepository: Send + Sync {
    /// Insert a new ride unless its driver already has an active one.
    async fn insert_for_driver(&self, ride: Ride) -> RideShareResult<Ride>;
    async fn get(&self, ride_id: &str) -> RideShareResult<Option<Ride>>;
    async fn list(&self, filter: &RideFilter) -> RideShareResult<Vec<Ride>>;
    async fn update(
        &self,
        ride_id: &str,
        mutation: &mut (dyn for<'r> FnMut(&'r mut Ride) -> RideShareResult<()> + Send),
    ) -> RideShareResult<Ride>;
    /// Cancel every active ride of `driver_id`, returning how many changed.
    async fn cancel_active_for_driver(&self, driver_id: &str) -> RideShareResult<usize>;
    async fn delete(&self, ride_id: &str) -> RideShareResult<bool>;
}

/// Sort newest first, the order every listing uses.
pub fn sort_newest_first(rides: &mut [Ride]) {
    rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Stamp a successfully mutated draft before it is stored.
pub fn finish_write(draft: &mut Ride) {
    draft.version += 1;
    draft.updated_at = Utc::now();
}

/// In-memory store for development and tests.
///
/// A single lock guards the whole map, so the per-driver active-ride check in
/// `insert_for_driver` and every read-modify-write are serialized.
#[derive(Debug, Default)]
pub struct MemoryRideStore {
    rides: RwLock<HashMap<String, Ride>>,
}

impl MemoryRideStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RideRepository for MemoryRideStore {
    async fn insert_for_driver(&self, ride: Ride) -> RideShareResult<Ride> {
        let mut rides = self.rides.write().await;

        if rides
            .values()
            .any(|existing| existing.driver_id == ride.driver_id && existing.is_active())
        {
            return Err(AppError::ActiveRideExists(ride.driver_id.clone()));
        }
        if rides.contains_key(&ride.id) {
            return Err(AppError::conflict(format!("Ride id already in use: {}", ride.id)));
        }

        rides.insert(ride.id.clone(), ride.clone());
        Ok(ride)
    }

    async fn get(&self, ride_id: &str) -> RideShareResult<Option<Ride>> {
        Ok(self.rides.read().await.get(ride_id).cloned())
    }

    async fn list(&self, filter: &RideFilter) -> RideShareResult<Vec<Ride>> {
        let rides = self.rides.read().await;
        let mut matching: Vec<Ride> = rides.values().filter(|r| filter.matches(r)).cloned().collect();
        sort_newest_first(&mut matching);
        Ok(matching)
    }

    async fn update(
        &self,
        ride_id: &str,
        mutation: &mut (dyn for<'r> FnMut(&'r mut Ride) -> RideShareResult<()> + Send),
    ) -> RideShareResult<Ride> {
        let mut rides = self.rides.write().await;
        let current = rides
            .get(ride_id)
            .ok_or_else(|| AppError::ride_not_found(ride_id))?;

        let mut draft = current.clone();
        mutation(&mut draft)?;
        finish_write(&mut draft);

        rides.insert(ride_id.to_string(), draft.clone());
        Ok(draft)
    }

    async fn cancel_active_for_driver(&self, driver_id: &str) -> RideShareResult<usize> {
        let mut rides = self.rides.write().await;
        let mut cancelled = 0;

        for ride in rides.values_mut() {
            if ride.driver_id == driver_id && ride.is_active() {
                ride.status = RideStatus::Cancelled;
                finish_write(ride);
                cancelled += 1;
            }
        }

        tracing::debug!("Cancelled {} rides in memory for driver {}", cancelled, driver_id);
        Ok(cancelled)
    }

    async fn delete(&self, ride_id: &str) -> RideShareResult<bool> {
        Ok(self.rides.write().await.remove(ride_id).is_some())
    }
}
