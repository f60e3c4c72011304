// src/state.rs
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    errors::{RideShareError, RideShareResult},
    services::{
        geo_service::{GeoConfig, GeoResolver, OsrmNominatimResolver, TimeoutGeoResolver},
        moderation_service::{ModerationOperations, ModerationService},
        redis_repository::{RedisReportStore, RedisRideStore},
        report_repository::{MemoryReportStore, ReportRepository},
        ride_repository::{MemoryRideStore, RideRepository},
        ride_service::{RideOperations, RideService},
    },
};

const MIN_JWT_SECRET_LEN: usize = 32;

pub struct AppState {
    pub ride_service: Arc<dyn RideOperations>,
    pub moderation_service: Arc<dyn ModerationOperations>,
    pub config: AppConfig,
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub geo: GeoConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_address", &self.bind_address)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[set]"))
            .field("jwt_secret", &"[REDACTED]")
            .field("geo", &self.geo)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> RideShareResult<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| RideShareError::MissingEnvironmentVariable("JWT_SECRET".to_string()))?;

        let mut geo = GeoConfig::default();
        if let Ok(url) = env::var("OSRM_URL") {
            geo.osrm_url = url;
        }
        if let Ok(url) = env::var("NOMINATIM_URL") {
            geo.nominatim_url = url;
        }
        if let Ok(agent) = env::var("GEO_USER_AGENT") {
            geo.user_agent = agent;
        }
        if let Ok(raw) = env::var("GEO_TIMEOUT_MS") {
            let millis = raw.parse::<u64>().map_err(|_| {
                RideShareError::InvalidConfiguration(format!("GEO_TIMEOUT_MS must be an integer, got '{}'", raw))
            })?;
            geo.timeout = Duration::from_millis(millis);
        }

        let config = Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            jwt_secret,
            geo,
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration for tests and local tooling: in-memory store, default geo endpoints.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            redis_url: None,
            jwt_secret: secret.into(),
            geo: GeoConfig::default(),
        }
    }

    pub fn validate(&self) -> RideShareResult<()> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(RideShareError::InvalidConfiguration(format!(
                "JWT_SECRET must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }
        if self.geo.timeout.is_zero() {
            return Err(RideShareError::InvalidConfiguration(
                "GEO_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppState {
    pub async fn new(config: AppConfig) -> RideShareResult<Self> {
        let (repository, reports) = Self::open_stores(config.redis_url.as_deref()).await;

        let resolver = OsrmNominatimResolver::new(&config.geo)
            .map_err(|e| RideShareError::InvalidConfiguration(e.to_string()))?;
        let geo: Arc<dyn GeoResolver> = Arc::new(TimeoutGeoResolver::new(Arc::new(resolver), config.geo.timeout));

        Ok(Self::with_components(config, repository, reports, geo))
    }

    /// Rides and moderation records share one backend so a ban never outlives
    /// the rides it cancelled, or the reverse.
    async fn open_stores(redis_url: Option<&str>) -> (Arc<dyn RideRepository>, Arc<dyn ReportRepository>) {
        let Some(url) = redis_url else {
            tracing::warn!("REDIS_URL not set, using in-memory stores");
            return (Arc::new(MemoryRideStore::new()), Arc::new(MemoryReportStore::new()));
        };

        match (RedisRideStore::new(url).await, RedisReportStore::new(url).await) {
            (Ok(rides), Ok(reports)) => (Arc::new(rides), Arc::new(reports)),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Redis unavailable ({}), using in-memory stores", e);
                (Arc::new(MemoryRideStore::new()), Arc::new(MemoryReportStore::new()))
            }
        }
    }

    /// Wire the services around explicit stores and resolver.
    pub fn with_components(
        config: AppConfig,
        repository: Arc<dyn RideRepository>,
        reports: Arc<dyn ReportRepository>,
        geo: Arc<dyn GeoResolver>,
    ) -> Self {
        let ride_service: Arc<dyn RideOperations> = Arc::new(RideService::new(repository, geo));
        let moderation_service: Arc<dyn ModerationOperations> =
            Arc::new(ModerationService::new(ride_service.clone(), reports));

        Self {
            ride_service,
            moderation_service,
            config,
        }
    }
}
