//! Duck Server - flight simulator behind a REST + WebSocket API

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duck_server::api;
use duck_server::config::Config;
use duck_server::delivery::{DeliveryNotifier, LogDelivery, WebhookDelivery};
use duck_server::simulator::FlightSimulator;
use duck_server::state::AppState;
use duck_server::weather::{OpenMeteoConfig, OpenMeteoProvider, StaticWeather, WeatherProvider};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("duck_server=debug".parse()?))
        .init();

    tracing::info!("Starting Duck Server...");

    let config = Config::from_env();
    let port = config.server_port;

    let weather: Arc<dyn WeatherProvider> = if config.weather_provider_url.trim().is_empty() {
        tracing::warn!("No weather provider configured, flying in clear skies");
        Arc::new(StaticWeather::clear())
    } else {
        Arc::new(OpenMeteoProvider::new(OpenMeteoConfig {
            base_url: config.weather_provider_url.clone(),
            cache_ttl: Duration::from_secs(config.weather_cache_ttl_s),
            cache_max_entries: config.weather_cache_max_entries,
            request_timeout: Duration::from_secs(config.weather_request_timeout_s),
            ..OpenMeteoConfig::default()
        }))
    };

    let delivery: Arc<dyn DeliveryNotifier> = match config.delivery_webhook_url.as_deref() {
        Some(url) => {
            tracing::info!("Delivering arrivals to {}", url);
            Arc::new(WebhookDelivery::new(url, config.simulator.delivery_timeout))
        }
        None => Arc::new(LogDelivery),
    };

    let simulator = FlightSimulator::new(config.simulator.clone(), weather, delivery);
    let state = Arc::new(AppState::new(config, simulator.clone()));

    let app = api::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    simulator.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
