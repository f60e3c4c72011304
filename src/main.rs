use std::sync::Arc;

use campus_rides::{create_router, AppConfig, AppState, RideShareResult};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> RideShareResult<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting campus-rides with {:?}", config);

    let bind_address = config.bind_address.clone();
    let app_state = AppState::new(config).await?;

    let app = create_router(Arc::new(app_state)).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| campus_rides::RideShareError::InvalidConfiguration(format!("cannot bind {}: {}", bind_address, e)))?;
    tracing::info!("Listening on {}", bind_address);

    axum::serve(listener, app)
        .await
        .map_err(|e| campus_rides::RideShareError::internal_error(e.to_string()))?;
    Ok(())
}
