// src/services/redis_repository.rs
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use tracing;

use crate::{
    errors::{RideShareError as AppError, RideShareResult},
    models::{
        report::{DriverStanding, Report},
        ride::{Ride, RideFilter, RideStatus},
    },
    services::{
        report_repository::{empty_standing, ReportRepository},
        ride_repository::{finish_write, sort_newest_first, RideRepository},
    },
};

/// Attempts before an optimistic transaction gives up with a conflict.
const MAX_TRANSACTION_RETRIES: usize = 8;

pub struct RedisKeys;

impl RedisKeys {
    pub fn ride(ride_id: &str) -> String {
        format!("ride:{}", ride_id)
    }

    pub fn driver_active_ride(driver_id: &str) -> String {
        format!("driver:{}:active_ride", driver_id)
    }

    pub fn driver_rides(driver_id: &str) -> String {
        format!("driver:{}:rides", driver_id)
    }

    pub fn all_rides() -> String {
        "rides:all".to_string()
    }

    pub fn report(report_id: &str) -> String {
        format!("report:{}", report_id)
    }

    pub fn all_reports() -> String {
        "reports:all".to_string()
    }

    pub fn driver_standing(driver_id: &str) -> String {
        format!("driver:{}:standing", driver_id)
    }

    pub fn all_standings() -> String {
        "standings:all".to_string()
    }
}

async fn open_client(redis_url: &str) -> RideShareResult<Client> {
    let client = Client::open(redis_url)?;

    // Fail fast when the server is unreachable
    let mut conn = client.get_async_connection().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(client)
}

async fn get_json<T: DeserializeOwned>(conn: &mut redis::aio::Connection, key: &str) -> RideShareResult<Option<T>> {
    let data: Option<String> = conn.get(key).await?;
    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

async fn unwatch(conn: &mut redis::aio::Connection) -> RideShareResult<()> {
    let _: () = redis::cmd("UNWATCH").query_async(conn).await?;
    Ok(())
}

/// Redis-backed ride store.
///
/// Rides are stored as JSON under `ride:{id}`. Writes use WATCH/MULTI/EXEC
/// on the ride key (and the driver's active-ride pointer) so concurrent
/// transitions on the same ride serialize; an aborted EXEC is retried.
pub struct RedisRideStore {
    client: Client,
}

impl RedisRideStore {
    pub async fn new(redis_url: &str) -> RideShareResult<Self> {
        let client = open_client(redis_url).await?;
        tracing::info!("Connected to Redis ride store");
        Ok(Self { client })
    }

    async fn connection(&self) -> RideShareResult<redis::aio::Connection> {
        Ok(self.client.get_async_connection().await?)
    }

    async fn load(conn: &mut redis::aio::Connection, ride_id: &str) -> RideShareResult<Option<Ride>> {
        get_json(conn, &RedisKeys::ride(ride_id)).await
    }

    async fn all_ride_ids(&self, filter: &RideFilter) -> RideShareResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let key = match &filter.driver_id {
            Some(driver_id) => RedisKeys::driver_rides(driver_id),
            None => RedisKeys::all_rides(),
        };
        let ids: Vec<String> = conn.smembers(key).await?;
        Ok(ids)
    }
}

#[async_trait]
impl RideRepository for RedisRideStore {
    async fn insert_for_driver(&self, ride: Ride) -> RideShareResult<Ride> {
        let mut conn = self.connection().await?;
        let active_key = RedisKeys::driver_active_ride(&ride.driver_id);
        let json = serde_json::to_string(&ride)?;

        for attempt in 0..MAX_TRANSACTION_RETRIES {
            let _: () = redis::cmd("WATCH")
                .arg(&active_key)
                .arg(RedisKeys::ride(&ride.id))
                .query_async(&mut conn)
                .await?;

            let current: Option<String> = conn.get(&active_key).await?;
            if let Some(active_id) = current {
                let still_active = Self::load(&mut conn, &active_id)
                    .await?
                    .is_some_and(|existing| existing.is_active());
                if still_active {
                    unwatch(&mut conn).await?;
                    return Err(AppError::ActiveRideExists(ride.driver_id.clone()));
                }
            }

            let committed: Option<()> = redis::pipe()
                .atomic()
                .set(RedisKeys::ride(&ride.id), &json)
                .ignore()
                .set(&active_key, &ride.id)
                .ignore()
                .sadd(RedisKeys::driver_rides(&ride.driver_id), &ride.id)
                .ignore()
                .sadd(RedisKeys::all_rides(), &ride.id)
                .ignore()
                .query_async(&mut conn)
                .await?;

            if committed.is_some() {
                tracing::debug!("Stored ride {} for driver {}", ride.id, ride.driver_id);
                return Ok(ride);
            }
            tracing::debug!("Insert of ride {} raced, retry {}", ride.id, attempt + 1);
        }

        Err(AppError::conflict(format!(
            "Too much contention creating a ride for driver {}",
            ride.driver_id
        )))
    }

    async fn get(&self, ride_id: &str) -> RideShareResult<Option<Ride>> {
        let mut conn = self.connection().await?;
        Self::load(&mut conn, ride_id).await
    }

    async fn list(&self, filter: &RideFilter) -> RideShareResult<Vec<Ride>> {
        let ids = self.all_ride_ids(filter).await?;
        let mut conn = self.connection().await?;
        let mut rides = Vec::with_capacity(ids.len());

        for ride_id in ids {
            match Self::load(&mut conn, &ride_id).await? {
                Some(ride) if filter.matches(&ride) => rides.push(ride),
                Some(_) => {}
                None => tracing::warn!("Ride index points at missing ride {}", ride_id),
            }
        }

        sort_newest_first(&mut rides);
        Ok(rides)
    }

    async fn update(
        &self,
        ride_id: &str,
        mutation: &mut (dyn for<'r> FnMut(&'r mut Ride) -> RideShareResult<()> + Send),
    ) -> RideShareResult<Ride> {
        let mut conn = self.connection().await?;
        let ride_key = RedisKeys::ride(ride_id);

        for attempt in 0..MAX_TRANSACTION_RETRIES {
            let _: () = redis::cmd("WATCH").arg(&ride_key).query_async(&mut conn).await?;

            let Some(current) = Self::load(&mut conn, ride_id).await? else {
                unwatch(&mut conn).await?;
                return Err(AppError::ride_not_found(ride_id));
            };

            let mut draft = current.clone();
            if let Err(err) = mutation(&mut draft) {
                unwatch(&mut conn).await?;
                return Err(err);
            }
            finish_write(&mut draft);

            let mut pipe = redis::pipe();
            pipe.atomic()
                .set(&ride_key, serde_json::to_string(&draft)?)
                .ignore();
            if current.is_active() && draft.status.is_terminal() {
                pipe.del(RedisKeys::driver_active_ride(&draft.driver_id)).ignore();
            }

            let committed: Option<()> = pipe.query_async(&mut conn).await?;
            if committed.is_some() {
                return Ok(draft);
            }
            tracing::debug!("Update of ride {} raced, retry {}", ride_id, attempt + 1);
        }

        Err(AppError::conflict(format!(
            "Ride {} is being modified concurrently, try again",
            ride_id
        )))
    }

    async fn cancel_active_for_driver(&self, driver_id: &str) -> RideShareResult<usize> {
        let filter = RideFilter {
            driver_id: Some(driver_id.to_string()),
            ..Default::default()
        };
        let rides = self.list(&filter).await?;

        // Each ride commits in its own transaction
        let updates = rides.iter().filter(|ride| ride.is_active()).map(|ride| async move {
            let mut changed = false;
            self.update(&ride.id, &mut |draft: &mut Ride| {
                changed = draft.is_active();
                if changed {
                    draft.status = RideStatus::Cancelled;
                }
                Ok(())
            })
            .await?;
            Ok::<bool, AppError>(changed)
        });

        let results = futures::future::try_join_all(updates).await?;
        Ok(results.into_iter().filter(|changed| *changed).count())
    }

    async fn delete(&self, ride_id: &str) -> RideShareResult<bool> {
        let mut conn = self.connection().await?;
        let Some(ride) = Self::load(&mut conn, ride_id).await? else {
            return Ok(false);
        };

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(RedisKeys::ride(ride_id))
            .ignore()
            .srem(RedisKeys::driver_rides(&ride.driver_id), ride_id)
            .ignore()
            .srem(RedisKeys::all_rides(), ride_id)
            .ignore();

        let active: Option<String> = conn.get(RedisKeys::driver_active_ride(&ride.driver_id)).await?;
        if active.as_deref() == Some(ride_id) {
            pipe.del(RedisKeys::driver_active_ride(&ride.driver_id)).ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(true)
    }
}

/// Redis-backed report and driver-standing store.
///
/// Reports live under `report:{id}` and standings under
/// `driver:{id}:standing`, so bans survive restarts and are shared by every
/// instance behind the same server.
pub struct RedisReportStore {
    client: Client,
}

impl RedisReportStore {
    pub async fn new(redis_url: &str) -> RideShareResult<Self> {
        let client = open_client(redis_url).await?;
        tracing::info!("Connected to Redis report store");
        Ok(Self { client })
    }

    async fn connection(&self) -> RideShareResult<redis::aio::Connection> {
        Ok(self.client.get_async_connection().await?)
    }

    async fn load_all<T: DeserializeOwned>(&self, index_key: String, key_for: fn(&str) -> String) -> RideShareResult<Vec<T>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.smembers(&index_key).await?;
        let mut items = Vec::with_capacity(ids.len());

        for id in ids {
            match get_json(&mut conn, &key_for(&id)).await? {
                Some(item) => items.push(item),
                None => tracing::warn!("Index {} points at missing entry {}", index_key, id),
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl ReportRepository for RedisReportStore {
    async fn insert_report(&self, report: Report) -> RideShareResult<Report> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(&report)?;

        let created: bool = conn.set_nx(RedisKeys::report(&report.id), &json).await?;
        if !created {
            return Err(AppError::conflict(format!("Report id already in use: {}", report.id)));
        }
        let _: () = conn.sadd(RedisKeys::all_reports(), &report.id).await?;

        tracing::debug!("Stored report {} against driver {}", report.id, report.driver_id);
        Ok(report)
    }

    async fn list_reports(&self) -> RideShareResult<Vec<Report>> {
        self.load_all(RedisKeys::all_reports(), RedisKeys::report).await
    }

    async fn update_report(
        &self,
        report_id: &str,
        mutation: &mut (dyn for<'r> FnMut(&'r mut Report) -> RideShareResult<()> + Send),
    ) -> RideShareResult<Report> {
        let mut conn = self.connection().await?;
        let report_key = RedisKeys::report(report_id);

        for attempt in 0..MAX_TRANSACTION_RETRIES {
            let _: () = redis::cmd("WATCH").arg(&report_key).query_async(&mut conn).await?;

            let Some(mut draft) = get_json::<Report>(&mut conn, &report_key).await? else {
                unwatch(&mut conn).await?;
                return Err(AppError::report_not_found(report_id));
            };
            if let Err(err) = mutation(&mut draft) {
                unwatch(&mut conn).await?;
                return Err(err);
            }

            let committed: Option<()> = redis::pipe()
                .atomic()
                .set(&report_key, serde_json::to_string(&draft)?)
                .ignore()
                .query_async(&mut conn)
                .await?;
            if committed.is_some() {
                return Ok(draft);
            }
            tracing::debug!("Update of report {} raced, retry {}", report_id, attempt + 1);
        }

        Err(AppError::conflict(format!(
            "Report {} is being modified concurrently, try again",
            report_id
        )))
    }

    async fn get_standing(&self, driver_id: &str) -> RideShareResult<Option<DriverStanding>> {
        let mut conn = self.connection().await?;
        get_json(&mut conn, &RedisKeys::driver_standing(driver_id)).await
    }

    async fn list_standings(&self) -> RideShareResult<Vec<DriverStanding>> {
        self.load_all(RedisKeys::all_standings(), RedisKeys::driver_standing).await
    }

    async fn update_standing(
        &self,
        driver_id: &str,
        mutation: &mut (dyn for<'s> FnMut(&'s mut DriverStanding) -> RideShareResult<()> + Send),
    ) -> RideShareResult<DriverStanding> {
        let mut conn = self.connection().await?;
        let standing_key = RedisKeys::driver_standing(driver_id);

        for attempt in 0..MAX_TRANSACTION_RETRIES {
            let _: () = redis::cmd("WATCH").arg(&standing_key).query_async(&mut conn).await?;

            let mut draft = get_json::<DriverStanding>(&mut conn, &standing_key)
                .await?
                .unwrap_or_else(|| empty_standing(driver_id));
            if let Err(err) = mutation(&mut draft) {
                unwatch(&mut conn).await?;
                return Err(err);
            }

            let committed: Option<()> = redis::pipe()
                .atomic()
                .set(&standing_key, serde_json::to_string(&draft)?)
                .ignore()
                .sadd(RedisKeys::all_standings(), driver_id)
                .ignore()
                .query_async(&mut conn)
                .await?;
            if committed.is_some() {
                return Ok(draft);
            }
            tracing::debug!("Update of standing for {} raced, retry {}", driver_id, attempt + 1);
        }

        Err(AppError::conflict(format!(
            "Standing of driver {} is being modified concurrently, try again",
            driver_id
        )))
    }
}
