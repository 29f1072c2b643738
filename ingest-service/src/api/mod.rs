//! HTTP API handlers for ingest-service

pub mod health;
pub mod ingest;

pub use health::health_routes;
pub use ingest::ingest_routes;

use axum::http::header::InvalidHeaderValue;
use axum::http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

/// CORS policy admitting the configured frontend origin.
///
/// Credentials are allowed, so methods and headers mirror the request
/// instead of using a wildcard.
pub fn cors_layer(frontend_url: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    let origin = HeaderValue::from_str(frontend_url)?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}
