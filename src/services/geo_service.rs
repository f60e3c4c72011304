// src/services/geo_service.rs
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing;

use crate::{errors::RideShareError, models::ride::GeoPoint};

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geo lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("geo request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geo service error: {0}")]
    Api(String),
}

impl From<GeoError> for RideShareError {
    fn from(err: GeoError) -> Self {
        RideShareError::GeoResolverUnavailable(err.to_string())
    }
}

/// Road route between two points, rounded to whole units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSummary {
    pub distance_meters: u64,
    pub duration_seconds: u64,
}

impl RouteSummary {
    pub fn new(distance_meters: u64, duration_seconds: u64) -> Self {
        Self {
            distance_meters,
            duration_seconds,
        }
    }
}

/// Address lookup and road routing.
///
/// `Ok(None)` means the service answered but found nothing; transport
/// failures are `Err`. Callers decide which of the two they tolerate.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeoError>;
    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Option<RouteSummary>, GeoError>;
}

#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub osrm_url: String,
    pub nominatim_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            osrm_url: "https://router.project-osrm.org".to_string(),
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            timeout: Duration::from_millis(5000),
            user_agent: "campus-rides/0.1".to_string(),
        }
    }
}

// Minimal Nominatim / OSRM response shapes
#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
}

/// Geocodes with Nominatim and routes with OSRM over HTTP.
pub struct OsrmNominatimResolver {
    client: reqwest::Client,
    osrm_url: String,
    nominatim_url: String,
}

impl OsrmNominatimResolver {
    pub fn new(config: &GeoConfig) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            osrm_url: config.osrm_url.trim_end_matches('/').to_string(),
            nominatim_url: config.nominatim_url.trim_end_matches('/').to_string(),
        })
    }

    fn route_url(&self, from: GeoPoint, to: GeoPoint) -> String {
        // OSRM takes lng,lat pairs
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=false",
            self.osrm_url, from.lng, from.lat, to.lng, to.lat
        )
    }
}

#[async_trait]
impl GeoResolver for OsrmNominatimResolver {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeoError> {
        tracing::debug!("Geocoding address: {}", address);

        let hits: Vec<NominatimHit> = self
            .client
            .get(format!("{}/search", self.nominatim_url))
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        let lat = hit.lat.parse::<f64>().map_err(|e| GeoError::Api(e.to_string()))?;
        let lng = hit.lon.parse::<f64>().map_err(|e| GeoError::Api(e.to_string()))?;
        Ok(Some(GeoPoint::new(lat, lng)))
    }

    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Option<RouteSummary>, GeoError> {
        let url = self.route_url(from, to);
        tracing::debug!("Routing via {}", url);

        let response: OsrmResponse = self
            .client
            .get(url)
            .send()
            .await?
            .json()
            .await?;

        match response.code.as_str() {
            "Ok" => Ok(response.routes.first().map(|route| {
                RouteSummary::new(
                    route.distance.max(0.0).round() as u64,
                    route.duration.max(0.0).round() as u64,
                )
            })),
            "NoRoute" | "NoSegment" => Ok(None),
            other => Err(GeoError::Api(format!(
                "{}: {}",
                other,
                response.message.unwrap_or_default()
            ))),
        }
    }
}

/// Bounds every lookup of the wrapped resolver by a deadline.
pub struct TimeoutGeoResolver {
    inner: Arc<dyn GeoResolver>,
    timeout: Duration,
}

impl TimeoutGeoResolver {
    pub fn new(inner: Arc<dyn GeoResolver>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl GeoResolver for TimeoutGeoResolver {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeoError> {
        tokio::time::timeout(self.timeout, self.inner.geocode(address))
            .await
            .map_err(|_| GeoError::Timeout(self.timeout))?
    }

    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Option<RouteSummary>, GeoError> {
        tokio::time::timeout(self.timeout, self.inner.route(from, to))
            .await
            .map_err(|_| GeoError::Timeout(self.timeout))?
    }
}

/// Deterministic resolver for tests and offline development.
///
/// Geocoding answers from a fixed table. Route answers are queued and
/// consumed in order; an empty queue answers "no route".
#[derive(Default)]
pub struct StubGeoResolver {
    places: HashMap<String, GeoPoint>,
    routes: Mutex<VecDeque<RouteSummary>>,
    failing: bool,
}

impl StubGeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver whose every lookup fails as if the network were down.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_geocode(mut self, address: &str, point: GeoPoint) -> Self {
        self.places.insert(address.to_string(), point);
        self
    }

    pub fn with_route(self, distance_meters: u64, duration_seconds: u64) -> Self {
        self.push_route(RouteSummary::new(distance_meters, duration_seconds));
        self
    }

    pub fn push_route(&self, route: RouteSummary) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push_back(route);
        }
    }
}

#[async_trait]
impl GeoResolver for StubGeoResolver {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeoError> {
        if self.failing {
            return Err(GeoError::Api("stub resolver offline".to_string()));
        }
        Ok(self.places.get(address).copied())
    }

    async fn route(&self, _from: GeoPoint, _to: GeoPoint) -> Result<Option<RouteSummary>, GeoError> {
        if self.failing {
            return Err(GeoError::Api("stub resolver offline".to_string()));
        }
        let mut routes = self
            .routes
            .lock()
            .map_err(|_| GeoError::Api("stub route queue poisoned".to_string()))?;
        Ok(routes.pop_front())
    }
}
