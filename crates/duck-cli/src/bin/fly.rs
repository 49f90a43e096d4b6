//! Fly a single duck locally and print its journey.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use duck_cli::{parse_point, parse_weather, WeatherChoice};
use duck_core::Location;
use duck_server::delivery::LogDelivery;
use duck_server::simulator::FlightSimulator;
use duck_server::weather::{OpenMeteoConfig, OpenMeteoProvider, StaticWeather, WeatherProvider};
use duck_server::{FlightEvent, SimulatorConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fly a duck between two points
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Departure as LAT,LON
    #[arg(long, value_parser = parse_point, default_value = "40.7128,-74.0060")]
    from: Location,

    /// Destination as LAT,LON
    #[arg(long, value_parser = parse_point, default_value = "51.5074,-0.1278")]
    to: Location,

    /// Base speed in km/h
    #[arg(long, default_value_t = 558_500.0)]
    speed: f64,

    /// Progress tick interval in milliseconds (weather is checked every 10 ticks)
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,

    /// clear, rain, storm, wind or open-meteo
    #[arg(long, value_parser = parse_weather, default_value = "clear")]
    weather: WeatherChoice,

    /// Intensity for fixed weather, 0..1
    #[arg(long, default_value_t = 0.5)]
    intensity: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("duck_server=info".parse()?))
        .init();

    let args = Args::parse();
    let tick = Duration::from_millis(args.tick_ms.max(1));
    let config = SimulatorConfig::default()
        .with_base_speed(args.speed)
        .with_ticks(tick, tick * 10);

    let weather: Arc<dyn WeatherProvider> = match args.weather {
        WeatherChoice::Fixed(kind) => Arc::new(StaticWeather::new(kind, args.intensity)),
        WeatherChoice::OpenMeteo => Arc::new(OpenMeteoProvider::new(OpenMeteoConfig::default())),
    };

    let simulator = FlightSimulator::new(config, weather, Arc::new(LogDelivery));
    let mut events = simulator.subscribe();

    let flight = simulator
        .initialize_flight("cli-duck", args.from, args.to)
        .await?;
    println!(
        "Duck away: {:.1} km over {} waypoints at {:.1} km/h",
        flight.total_distance_km,
        flight.path.len(),
        flight.speed_kmh
    );
    println!("  ETA: {}", flight.estimated_arrival);
    println!();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => anyhow::bail!("simulator stopped unexpectedly"),
        };
        match &event {
            FlightEvent::Progress { progress } => println!(
                "[{:6.2}%] ({:.4}, {:.4}) {:.1} km to go",
                progress.progress_pct,
                progress.current_position.latitude(),
                progress.current_position.longitude(),
                progress.distance_remaining_km
            ),
            FlightEvent::WeatherChanged { sample, speed_kmh, .. } => println!(
                "Weather now {:?} ({:.2}), flying at {:.1} km/h",
                sample.kind, sample.intensity, speed_kmh
            ),
            FlightEvent::Rerouted { total_distance_km, .. } => {
                println!("Rerouted, journey now {:.1} km", total_distance_km)
            }
            FlightEvent::Delivered { result, .. } => {
                println!();
                println!("Delivered!");
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            FlightEvent::Cancelled { .. } => println!("Flight cancelled"),
            FlightEvent::Started { .. } => {}
        }
        if event.is_terminal() {
            break;
        }
    }

    simulator.shutdown();
    Ok(())
}
