//! Weather providers consumed by the flight simulator.
//!
//! The simulator only needs "weather at this location"; caching, backoff and
//! the upstream wire format belong to the individual providers.

mod open_meteo;

pub use open_meteo::{classify_current, OpenMeteoConfig, OpenMeteoProvider};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use duck_core::{Location, WeatherKind, WeatherSample};
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    #[error("weather unavailable: {0}")]
    Unavailable(String),
    #[error("weather request timed out")]
    Timeout,
    #[error("weather provider backing off after repeated failures")]
    Backoff,
}

pub trait WeatherProvider: Send + Sync {
    fn fetch_weather<'a>(
        &'a self,
        location: &'a Location,
    ) -> BoxFuture<'a, Result<WeatherSample, WeatherError>>;
}

/// Same weather everywhere, always.
#[derive(Debug, Clone, Copy)]
pub struct StaticWeather {
    kind: WeatherKind,
    intensity: f64,
}

impl StaticWeather {
    pub fn new(kind: WeatherKind, intensity: f64) -> Self {
        Self { kind, intensity }
    }

    pub fn clear() -> Self {
        Self::new(WeatherKind::Clear, 0.0)
    }
}

impl WeatherProvider for StaticWeather {
    fn fetch_weather<'a>(
        &'a self,
        location: &'a Location,
    ) -> BoxFuture<'a, Result<WeatherSample, WeatherError>> {
        let sample = WeatherSample::new(self.kind, self.intensity, location.clone(), Utc::now());
        futures::future::ready(Ok(sample)).boxed()
    }
}

/// Provider that never answers successfully.
#[derive(Debug, Clone, Default)]
pub struct UnavailableWeather;

impl WeatherProvider for UnavailableWeather {
    fn fetch_weather<'a>(
        &'a self,
        _location: &'a Location,
    ) -> BoxFuture<'a, Result<WeatherSample, WeatherError>> {
        futures::future::ready(Err(WeatherError::Unavailable("no provider configured".into())))
            .boxed()
    }
}

pub type ScriptedOutcome = Result<(WeatherKind, f64), WeatherError>;

/// Replays a queue of outcomes, then repeats `fallback` forever.
///
/// An optional delay is applied to every call, which makes it possible to
/// exercise timeouts and overlapping weather ticks.
pub struct ScriptedWeather {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    fallback: ScriptedOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedWeather {
    pub fn new(script: impl IntoIterator<Item = ScriptedOutcome>, fallback: ScriptedOutcome) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> ScriptedOutcome {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl WeatherProvider for ScriptedWeather {
    fn fetch_weather<'a>(
        &'a self,
        location: &'a Location,
    ) -> BoxFuture<'a, Result<WeatherSample, WeatherError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self.next_outcome();
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            outcome.map(|(kind, intensity)| {
                WeatherSample::new(kind, intensity, location.clone(), Utc::now())
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> Location {
        Location::new(10.0, 20.0).unwrap()
    }

    #[tokio::test]
    async fn static_weather_reports_location() {
        let provider = StaticWeather::new(WeatherKind::Rain, 0.5);
        let sample = provider.fetch_weather(&here()).await.unwrap();
        assert_eq!(sample.kind, WeatherKind::Rain);
        assert!((sample.speed_multiplier - 0.85).abs() < 1e-9);
        assert!(sample.location.same_point(&here()));
    }

    #[tokio::test]
    async fn scripted_weather_replays_then_falls_back() {
        let provider = ScriptedWeather::new(
            [Ok((WeatherKind::Storm, 0.9)), Err(WeatherError::Timeout)],
            Ok((WeatherKind::Clear, 0.0)),
        );
        let location = here();
        assert_eq!(
            provider.fetch_weather(&location).await.unwrap().kind,
            WeatherKind::Storm
        );
        assert_eq!(
            provider.fetch_weather(&location).await,
            Err(WeatherError::Timeout)
        );
        assert_eq!(
            provider.fetch_weather(&location).await.unwrap().kind,
            WeatherKind::Clear
        );
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn unavailable_weather_always_errors() {
        let result = UnavailableWeather.fetch_weather(&here()).await;
        assert!(matches!(result, Err(WeatherError::Unavailable(_))));
    }
}
