//! Open-Meteo current-conditions adapter with a coordinate-bucketed cache.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use duck_core::{Location, WeatherKind, WeatherSample};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;

use super::{WeatherError, WeatherProvider};
use crate::cache::{prune_cache, CacheEntry};

/// Cache bucket size in degrees (about 11 km of latitude).
const BUCKET_DEG: f64 = 0.1;
const WIND_THRESHOLD_KMH: f64 = 30.0;
const WIND_SATURATION_KMH: f64 = 90.0;

#[derive(Debug, Clone)]
pub struct OpenMeteoConfig {
    pub base_url: String,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub request_timeout: Duration,
    /// First retry delay once the upstream starts failing.
    pub outage_retry: Duration,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            cache_ttl: Duration::from_secs(600),
            cache_max_entries: 4096,
            request_timeout: Duration::from_secs(8),
            outage_retry: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
struct WeatherCacheEntry {
    fetched_at: Instant,
    kind: WeatherKind,
    intensity: f64,
}

impl CacheEntry for WeatherCacheEntry {
    fn stored_at(&self) -> Instant {
        self.fetched_at
    }
}

/// An ongoing upstream outage. While it lasts, fetches are answered from the
/// cache (or fail fast) until `retry_at`.
#[derive(Debug, Clone)]
struct Outage {
    failures: u32,
    retry_at: Instant,
}

impl Outage {
    /// Doubles per failure, capped at the cache TTL.
    fn retry_delay(failures: u32, first: Duration, ttl: Duration) -> Duration {
        let doublings = failures.saturating_sub(1).min(16);
        first.saturating_mul(1 << doublings).min(ttl.max(first))
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<CurrentConditions>,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    weather_code: Option<u16>,
    wind_speed_10m: Option<f64>,
    precipitation: Option<f64>,
}

pub struct OpenMeteoProvider {
    client: Client,
    config: OpenMeteoConfig,
    cache: DashMap<(i32, i32), WeatherCacheEntry>,
    outage: Mutex<Option<Outage>>,
}

impl OpenMeteoProvider {
    pub fn new(config: OpenMeteoConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: OpenMeteoConfig) -> Self {
        Self {
            client,
            config,
            cache: DashMap::new(),
            outage: Mutex::new(None),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Consecutive upstream failures in the current outage, zero when healthy.
    pub fn outage_failures(&self) -> u32 {
        self.outage()
            .as_ref()
            .map(|outage| outage.failures)
            .unwrap_or(0)
    }

    fn outage(&self) -> MutexGuard<'_, Option<Outage>> {
        self.outage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn upstream_ready(&self) -> bool {
        self.outage()
            .as_ref()
            .map_or(true, |outage| Instant::now() >= outage.retry_at)
    }

    fn record_success(&self) {
        if let Some(outage) = self.outage().take() {
            tracing::info!(
                "Weather provider recovered after {} failed attempt(s)",
                outage.failures
            );
        }
    }

    fn record_failure(&self, err: &WeatherError) {
        let mut outage = self.outage();
        let failures = outage.as_ref().map_or(0, |o| o.failures).saturating_add(1);
        let delay = Outage::retry_delay(failures, self.config.outage_retry, self.config.cache_ttl);
        if failures == 1 {
            tracing::warn!("Weather provider unavailable ({}), retrying in {:?}", err, delay);
        } else {
            tracing::debug!(
                "Weather provider failure #{} ({}), retrying in {:?}",
                failures,
                err,
                delay
            );
        }
        *outage = Some(Outage {
            failures,
            retry_at: Instant::now() + delay,
        });
    }

    fn request_url(&self, location: &Location) -> String {
        let base = &self.config.base_url;
        let separator = if base.contains('?') { "&" } else { "?" };
        format!(
            "{}{}latitude={:.4}&longitude={:.4}&current=weather_code,wind_speed_10m,precipitation&wind_speed_unit=kmh",
            base,
            separator,
            location.latitude(),
            location.longitude()
        )
    }

    async fn fetch_upstream(&self, location: &Location) -> Result<(WeatherKind, f64), WeatherError> {
        let response = self
            .client
            .get(self.request_url(location))
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    WeatherError::Timeout
                } else {
                    WeatherError::Unavailable(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(WeatherError::Unavailable(format!(
                "weather provider HTTP {}",
                response.status()
            )));
        }

        let payload: ForecastResponse = response
            .json()
            .await
            .map_err(|err| WeatherError::Unavailable(err.to_string()))?;
        let current = payload
            .current
            .ok_or_else(|| WeatherError::Unavailable("weather provider missing current".into()))?;

        Ok(classify_current(
            current.weather_code.unwrap_or(0),
            current.wind_speed_10m.unwrap_or(0.0),
            current.precipitation.unwrap_or(0.0),
        ))
    }

    async fn fetch(&self, location: &Location) -> Result<WeatherSample, WeatherError> {
        let key = bucket_key(location);
        let ttl = self.config.cache_ttl;
        let mut stale: Option<WeatherCacheEntry> = None;
        if let Some(entry) = self.cache.get(&key) {
            let age = entry.age();
            if age <= ttl {
                return Ok(to_sample(&entry, location));
            }
            if age <= ttl.saturating_mul(2) {
                stale = Some(entry.value().clone());
            }
        }

        if !self.upstream_ready() {
            return match stale {
                Some(entry) => Ok(to_sample(&entry, location)),
                None => Err(WeatherError::Backoff),
            };
        }

        match self.fetch_upstream(location).await {
            Ok((kind, intensity)) => {
                self.record_success();
                self.cache.insert(
                    key,
                    WeatherCacheEntry {
                        fetched_at: Instant::now(),
                        kind,
                        intensity,
                    },
                );
                prune_cache(
                    &self.cache,
                    self.config.cache_max_entries,
                    ttl.saturating_mul(2),
                );
                Ok(WeatherSample::new(kind, intensity, location.clone(), Utc::now()))
            }
            Err(err) => {
                self.record_failure(&err);
                match stale {
                    Some(entry) => {
                        tracing::warn!("Weather fetch failed, using stale cache: {}", err);
                        Ok(to_sample(&entry, location))
                    }
                    None => Err(err),
                }
            }
        }
    }
}

impl WeatherProvider for OpenMeteoProvider {
    fn fetch_weather<'a>(
        &'a self,
        location: &'a Location,
    ) -> BoxFuture<'a, Result<WeatherSample, WeatherError>> {
        self.fetch(location).boxed()
    }
}

fn bucket_key(location: &Location) -> (i32, i32) {
    (
        (location.latitude() / BUCKET_DEG).round() as i32,
        (location.longitude() / BUCKET_DEG).round() as i32,
    )
}

fn to_sample(entry: &WeatherCacheEntry, location: &Location) -> WeatherSample {
    WeatherSample::new(entry.kind, entry.intensity, location.clone(), Utc::now())
}

/// Map WMO weather code, 10 m wind (km/h) and precipitation (mm) to a kind
/// and intensity.
pub fn classify_current(code: u16, wind_kmh: f64, precipitation_mm: f64) -> (WeatherKind, f64) {
    let storm = match code {
        95 => Some(0.6),
        96 => Some(0.8),
        99 => Some(1.0),
        _ => None,
    };
    if let Some(intensity) = storm {
        return (WeatherKind::Storm, intensity);
    }

    let rain = match code {
        51 => Some(0.15),
        53 => Some(0.25),
        55 => Some(0.35),
        56 | 57 => Some(0.4),
        61 => Some(0.3),
        63 => Some(0.6),
        65 => Some(0.9),
        66 => Some(0.5),
        67 => Some(0.8),
        71 | 73 | 75 | 77 | 85 | 86 => Some(0.5),
        80 => Some(0.4),
        81 => Some(0.7),
        82 => Some(1.0),
        _ => None,
    };
    if let Some(intensity) = rain {
        return (WeatherKind::Rain, intensity);
    }

    if wind_kmh.is_finite() && wind_kmh >= WIND_THRESHOLD_KMH {
        let intensity = (wind_kmh / WIND_SATURATION_KMH).clamp(0.0, 1.0);
        return (WeatherKind::Wind, intensity);
    }

    if precipitation_mm.is_finite() && precipitation_mm > 0.0 {
        return (WeatherKind::Rain, (precipitation_mm / 10.0).clamp(0.1, 1.0));
    }

    (WeatherKind::Clear, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thunderstorm_codes_are_storms() {
        assert_eq!(classify_current(99, 0.0, 0.0), (WeatherKind::Storm, 1.0));
        assert_eq!(classify_current(95, 50.0, 5.0).0, WeatherKind::Storm);
    }

    #[test]
    fn rain_and_snow_codes_are_wet() {
        assert_eq!(classify_current(63, 0.0, 2.0), (WeatherKind::Rain, 0.6));
        assert_eq!(classify_current(75, 0.0, 0.0).0, WeatherKind::Rain);
    }

    #[test]
    fn strong_wind_without_precipitation() {
        let (kind, intensity) = classify_current(3, 45.0, 0.0);
        assert_eq!(kind, WeatherKind::Wind);
        assert!((intensity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn calm_is_clear() {
        assert_eq!(classify_current(0, 5.0, 0.0), (WeatherKind::Clear, 0.0));
    }

    #[test]
    fn nearby_points_share_a_bucket() {
        let a = Location::new(51.5074, -0.1278).unwrap();
        let b = Location::new(51.5200, -0.1100).unwrap();
        assert_eq!(bucket_key(&a), bucket_key(&b));
    }

    #[tokio::test]
    async fn unreachable_provider_fails_then_backs_off() {
        let provider = OpenMeteoProvider::new(OpenMeteoConfig {
            base_url: "http://127.0.0.1:9/forecast".to_string(),
            request_timeout: Duration::from_millis(500),
            ..OpenMeteoConfig::default()
        });
        let here = Location::new(0.0, 0.0).unwrap();
        let first = provider.fetch_weather(&here).await;
        assert!(first.is_err());
        let second = provider.fetch_weather(&here).await;
        assert_eq!(second, Err(WeatherError::Backoff));
        assert_eq!(provider.outage_failures(), 1);
        assert_eq!(provider.cached_entries(), 0);
    }

    #[test]
    fn outage_retry_doubles_up_to_cache_ttl() {
        let first = Duration::from_secs(2);
        let ttl = Duration::from_secs(600);
        assert_eq!(Outage::retry_delay(1, first, ttl), Duration::from_secs(2));
        assert_eq!(Outage::retry_delay(2, first, ttl), Duration::from_secs(4));
        assert_eq!(Outage::retry_delay(5, first, ttl), Duration::from_secs(32));
        assert_eq!(Outage::retry_delay(9, first, ttl), ttl);
        assert_eq!(Outage::retry_delay(u32::MAX, first, ttl), ttl);
    }
}
