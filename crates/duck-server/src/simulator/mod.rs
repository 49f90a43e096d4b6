//! Flight simulator: owns active flights and drives their progress and
//! weather ticks.
//!
//! Each flight lives in its own slot with a private lock, so ticks for one
//! flight never contend with another. Ticks are scheduled through the
//! [`Scheduler`] trait and read time through [`Clock`], which lets tests drive
//! flights without waiting on the wall clock.
//!
//! Progress callbacks run synchronously inside the tick that produced them.
//! They must not block, and must not call [`FlightSimulator::on_progress`],
//! [`FlightSimulator::remove_callback`] or [`FlightSimulator::cancel_flight`]
//! for the same flight.

mod clock;
mod events;
mod motion;
mod scheduler;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use events::FlightEvent;
pub use motion::{advance, land, position_along, TickOutcome, ARRIVAL_PCT, ARRIVAL_TOLERANCE_KM};
pub use scheduler::{CancelToken, ManualScheduler, Scheduler, TickFn, TokioScheduler};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use duck_core::{
    journey_result, travel_duration, BoundingBoxClassifier, Flight, FlightProgress, FlightStatus,
    JourneyResult, Location, LocationError, RouteError, RoutePlanner, TerrainClassifier,
    WeatherSample,
};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::cache::{prune_cache, CacheEntry};
use crate::config::{SimulatorConfig, TimeoutPolicy};
use crate::delivery::DeliveryNotifier;
use crate::weather::WeatherProvider;

pub type ProgressCallback = Arc<dyn Fn(&FlightProgress) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlightError {
    #[error(transparent)]
    InvalidLocation(#[from] LocationError),

    #[error(transparent)]
    NoPathFound(RouteError),

    #[error("flight {0} is already en route")]
    FlightAlreadyActive(String),

    #[error("flight {0} not found")]
    FlightNotFound(String),
}

impl From<RouteError> for FlightError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::InvalidLocation(location) => FlightError::InvalidLocation(location),
            other => FlightError::NoPathFound(other),
        }
    }
}

struct FlightSlot {
    record: Mutex<Flight>,
    callback: Mutex<Option<ProgressCallback>>,
    schedules: Mutex<Vec<CancelToken>>,
    weather_busy: AtomicBool,
}

impl FlightSlot {
    fn new(flight: Flight) -> Self {
        Self {
            record: Mutex::new(flight),
            callback: Mutex::new(None),
            schedules: Mutex::new(Vec::new()),
            weather_busy: AtomicBool::new(false),
        }
    }

    fn record(&self) -> MutexGuard<'_, Flight> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callback(&self) -> MutexGuard<'_, Option<ProgressCallback>> {
        self.callback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_en_route(&self) -> bool {
        self.record().status == FlightStatus::EnRoute
    }

    fn attach_schedules(&self, tokens: Vec<CancelToken>) {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(tokens);
        // Cancelled before the schedules were attached.
        if !self.is_en_route() {
            self.cancel_schedules();
        }
    }

    fn cancel_schedules(&self) {
        let tokens = std::mem::take(&mut *self.schedules.lock().unwrap_or_else(PoisonError::into_inner));
        for token in tokens {
            token.cancel();
        }
    }
}

/// Releases the per-flight weather guard when a weather tick ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct ArchivedResult {
    stored_at: Instant,
    result: JourneyResult,
}

impl CacheEntry for ArchivedResult {
    fn stored_at(&self) -> Instant {
        self.stored_at
    }
}

struct SimulatorInner {
    config: SimulatorConfig,
    planner: RoutePlanner,
    weather: Arc<dyn WeatherProvider>,
    delivery: Arc<dyn DeliveryNotifier>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    flights: DashMap<String, Arc<FlightSlot>>,
    results: DashMap<String, ArchivedResult>,
    events: broadcast::Sender<FlightEvent>,
}

impl Drop for SimulatorInner {
    fn drop(&mut self) {
        for entry in self.flights.iter() {
            entry.value().cancel_schedules();
        }
    }
}

pub struct SimulatorBuilder {
    config: SimulatorConfig,
    weather: Arc<dyn WeatherProvider>,
    delivery: Arc<dyn DeliveryNotifier>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    classifier: Arc<dyn TerrainClassifier>,
}

impl SimulatorBuilder {
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn TerrainClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn build(self) -> FlightSimulator {
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        let planner = RoutePlanner::new(self.classifier, self.config.route.clone());
        FlightSimulator {
            inner: Arc::new(SimulatorInner {
                config: self.config,
                planner,
                weather: self.weather,
                delivery: self.delivery,
                scheduler: self.scheduler,
                clock: self.clock,
                flights: DashMap::new(),
                results: DashMap::new(),
                events,
            }),
        }
    }
}

/// Cheap to clone; all clones drive the same set of flights.
#[derive(Clone)]
pub struct FlightSimulator {
    inner: Arc<SimulatorInner>,
}

impl std::fmt::Debug for FlightSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightSimulator")
            .field("active_flights", &self.inner.flights.len())
            .finish_non_exhaustive()
    }
}

impl FlightSimulator {
    /// Simulator on the tokio scheduler and wall clock.
    pub fn new(
        config: SimulatorConfig,
        weather: Arc<dyn WeatherProvider>,
        delivery: Arc<dyn DeliveryNotifier>,
    ) -> Self {
        Self::builder(config, weather, delivery).build()
    }

    pub fn builder(
        config: SimulatorConfig,
        weather: Arc<dyn WeatherProvider>,
        delivery: Arc<dyn DeliveryNotifier>,
    ) -> SimulatorBuilder {
        SimulatorBuilder {
            config,
            weather,
            delivery,
            scheduler: Arc::new(TokioScheduler),
            clock: Arc::new(MonotonicClock::new()),
            classifier: Arc::new(BoundingBoxClassifier::default()),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlightEvent> {
        self.inner.events.subscribe()
    }

    /// Plan a route, sample the starting weather and start both schedules.
    pub async fn initialize_flight(
        &self,
        flight_id: impl Into<String>,
        start: Location,
        end: Location,
    ) -> Result<Flight, FlightError> {
        let flight_id = flight_id.into();
        if self.slot(&flight_id).is_some() {
            return Err(FlightError::FlightAlreadyActive(flight_id));
        }

        let initial_weather = self.sample_weather(&flight_id, &start).await;
        let multiplier = initial_weather
            .as_ref()
            .map(|sample| sample.speed_multiplier)
            .unwrap_or(1.0);
        let speed_kmh = self.inner.config.base_speed_kmh * multiplier;

        let now = self.inner.clock.now();
        let route = self.inner.planner.plan(&start, &end, now, speed_kmh)?;
        let total_distance_km = route.total_distance_km;

        let flight = Flight {
            id: flight_id.clone(),
            status: FlightStatus::EnRoute,
            origin: start.clone(),
            destination: end,
            path: route.waypoints,
            total_distance_km,
            distance_covered_km: 0.0,
            path_offset_km: 0.0,
            current_position: start,
            progress_pct: 0.0,
            speed_kmh,
            weather_history: initial_weather.into_iter().collect(),
            started_at: now,
            last_updated_at: now,
            estimated_arrival: now + travel_duration(total_distance_km, speed_kmh),
            reroute_count: 0,
        };

        let slot = Arc::new(FlightSlot::new(flight.clone()));
        match self.inner.flights.entry(flight_id.clone()) {
            Entry::Occupied(_) => return Err(FlightError::FlightAlreadyActive(flight_id)),
            Entry::Vacant(vacant) => {
                vacant.insert(slot.clone());
            }
        }

        let config = &self.inner.config;
        let tokens = vec![
            self.inner.scheduler.schedule_repeating(
                config.progress_tick_interval,
                self.tick_task(&flight_id, &slot, TickKind::Progress),
            ),
            self.inner.scheduler.schedule_repeating(
                config.weather_tick_interval,
                self.tick_task(&flight_id, &slot, TickKind::Weather),
            ),
        ];
        slot.attach_schedules(tokens);

        tracing::info!(
            "Flight {} started: {:.1} km over {} waypoints at {:.1} km/h, ETA {}",
            flight.id,
            flight.total_distance_km,
            flight.path.len(),
            flight.speed_kmh,
            flight.estimated_arrival
        );
        self.emit(FlightEvent::Started {
            progress: flight.progress(),
            total_distance_km: flight.total_distance_km,
        });

        Ok(flight)
    }

    pub fn get_progress(&self, flight_id: &str) -> Option<FlightProgress> {
        self.get_record(flight_id).map(|flight| flight.progress())
    }

    pub fn get_record(&self, flight_id: &str) -> Option<Flight> {
        let slot = self.slot(flight_id)?;
        let flight = slot.record();
        (flight.status == FlightStatus::EnRoute).then(|| flight.clone())
    }

    /// Register the progress callback, replacing any previous one.
    pub fn on_progress(
        &self,
        flight_id: &str,
        callback: ProgressCallback,
    ) -> Result<(), FlightError> {
        let slot = self
            .slot(flight_id)
            .ok_or_else(|| FlightError::FlightNotFound(flight_id.to_string()))?;
        let mut current = slot.callback();
        if !slot.is_en_route() {
            return Err(FlightError::FlightNotFound(flight_id.to_string()));
        }
        *current = Some(callback);
        Ok(())
    }

    pub fn remove_callback(&self, flight_id: &str) {
        if let Some(slot) = self.slot(flight_id) {
            slot.callback().take();
        }
    }

    /// Stop an en-route flight. Returns false if it is unknown or already
    /// finished.
    pub fn cancel_flight(&self, flight_id: &str) -> bool {
        let Some(slot) = self.slot(flight_id) else {
            return false;
        };
        {
            let mut flight = slot.record();
            if flight.status != FlightStatus::EnRoute {
                return false;
            }
            flight.status = FlightStatus::Cancelled;
        }
        self.retire_cancelled(flight_id, &slot);
        tracing::info!("Flight {} cancelled", flight_id);
        true
    }

    pub fn list_active_flights(&self) -> Vec<Flight> {
        let slots: Vec<Arc<FlightSlot>> = self
            .inner
            .flights
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut flights: Vec<Flight> = slots
            .iter()
            .filter_map(|slot| {
                let flight = slot.record();
                (flight.status == FlightStatus::EnRoute).then(|| flight.clone())
            })
            .collect();
        flights.sort_by(|a, b| a.id.cmp(&b.id));
        flights
    }

    pub fn active_count(&self) -> usize {
        self.list_active_flights().len()
    }

    /// Result of a delivered flight, or the projected result of one still en
    /// route.
    pub fn compute_journey_result(&self, flight_id: &str) -> Option<JourneyResult> {
        if let Some(flight) = self.get_record(flight_id) {
            return Some(journey_result(
                flight.total_distance_km,
                &flight.weather_history,
            ));
        }
        self.inner
            .results
            .get(flight_id)
            .map(|archived| archived.result.clone())
    }

    /// Run one progress tick for a flight now.
    pub async fn tick_progress(&self, flight_id: &str) -> Result<(), FlightError> {
        let slot = self
            .slot(flight_id)
            .ok_or_else(|| FlightError::FlightNotFound(flight_id.to_string()))?;
        self.progress_tick(flight_id, &slot).await;
        Ok(())
    }

    /// Run one weather tick for a flight now.
    pub async fn tick_weather(&self, flight_id: &str) -> Result<(), FlightError> {
        let slot = self
            .slot(flight_id)
            .ok_or_else(|| FlightError::FlightNotFound(flight_id.to_string()))?;
        self.weather_tick(flight_id, &slot).await;
        Ok(())
    }

    /// Stop every schedule. Flights stay readable but no longer move.
    pub fn shutdown(&self) {
        let mut stopped = 0;
        for entry in self.inner.flights.iter() {
            entry.value().cancel_schedules();
            stopped += 1;
        }
        tracing::info!("Simulator stopped, {} flight(s) halted", stopped);
    }

    fn slot(&self, flight_id: &str) -> Option<Arc<FlightSlot>> {
        self.inner
            .flights
            .get(flight_id)
            .map(|entry| entry.value().clone())
    }

    fn emit(&self, event: FlightEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn tick_task(&self, flight_id: &str, slot: &Arc<FlightSlot>, kind: TickKind) -> TickFn {
        let inner = Arc::downgrade(&self.inner);
        let slot = Arc::downgrade(slot);
        let flight_id = flight_id.to_string();
        Arc::new(move || {
            let inner: Weak<SimulatorInner> = inner.clone();
            let slot: Weak<FlightSlot> = slot.clone();
            let flight_id = flight_id.clone();
            async move {
                let (Some(inner), Some(slot)) = (inner.upgrade(), slot.upgrade()) else {
                    return;
                };
                let simulator = FlightSimulator { inner };
                match kind {
                    TickKind::Progress => simulator.progress_tick(&flight_id, &slot).await,
                    TickKind::Weather => simulator.weather_tick(&flight_id, &slot).await,
                }
            }
            .boxed()
        })
    }

    async fn sample_weather(&self, flight_id: &str, location: &Location) -> Option<WeatherSample> {
        let call = self.inner.weather.fetch_weather(location);
        match tokio::time::timeout(self.inner.config.weather_timeout, call).await {
            Ok(Ok(sample)) => Some(sample),
            Ok(Err(err)) => {
                tracing::debug!("Weather for flight {} unavailable: {}", flight_id, err);
                None
            }
            Err(_) => {
                tracing::debug!("Weather for flight {} timed out", flight_id);
                None
            }
        }
    }

    async fn progress_tick(&self, flight_id: &str, slot: &Arc<FlightSlot>) {
        let config = &self.inner.config;
        let now = self.inner.clock.now();

        let (action, snapshot) = {
            let mut flight = slot.record();
            if flight.status != FlightStatus::EnRoute {
                return;
            }
            let mut outcome = advance(&mut flight, now);
            let mut action = match outcome {
                TickOutcome::Unchanged => TickAction::Nothing,
                TickOutcome::Advanced => TickAction::Report,
                TickOutcome::Arrived => TickAction::Deliver,
            };

            if outcome != TickOutcome::Arrived && exceeded_max_duration(&flight, now, config) {
                match config.timeout_policy {
                    TimeoutPolicy::Complete => {
                        tracing::warn!(
                            "Flight {} exceeded {:?} in the air, landing it",
                            flight_id,
                            config.max_flight_duration
                        );
                        land(&mut flight);
                        outcome = TickOutcome::Arrived;
                        action = TickAction::Deliver;
                    }
                    TimeoutPolicy::Cancel => {
                        tracing::warn!(
                            "Flight {} exceeded {:?} in the air, cancelling it",
                            flight_id,
                            config.max_flight_duration
                        );
                        flight.status = FlightStatus::Cancelled;
                        action = TickAction::Expire;
                    }
                    TimeoutPolicy::Ignore => {}
                }
            }

            if outcome == TickOutcome::Arrived {
                flight.status = FlightStatus::Delivered;
            }
            (action, flight.clone())
        };

        match action {
            TickAction::Nothing => {}
            TickAction::Report => {
                let progress = snapshot.progress();
                self.notify_progress(slot, &progress);
                self.emit(FlightEvent::Progress { progress });
            }
            TickAction::Deliver => self.complete(slot, snapshot).await,
            TickAction::Expire => self.retire_cancelled(flight_id, slot),
        }
    }

    fn notify_progress(&self, slot: &FlightSlot, progress: &FlightProgress) {
        let callback = slot.callback();
        if let Some(callback) = callback.as_ref() {
            // Checked under the callback lock so a finished cancel cannot be
            // followed by another call.
            if slot.is_en_route() {
                callback(progress);
            }
        }
    }

    async fn complete(&self, slot: &Arc<FlightSlot>, flight: Flight) {
        slot.cancel_schedules();

        let final_progress = flight.progress();
        let callback = slot.callback().take();
        if let Some(callback) = callback {
            callback(&final_progress);
        }

        let result = journey_result(flight.total_distance_km, &flight.weather_history);
        tracing::info!(
            "Flight {} delivered after {:.1} km and {} reroute(s), {} points",
            flight.id,
            result.total_distance_km,
            flight.reroute_count,
            result.points_earned
        );
        self.emit(FlightEvent::delivered(&flight.id, &result));

        let notify = self.inner.delivery.notify_arrival(&flight.id, &result);
        match tokio::time::timeout(self.inner.config.delivery_timeout, notify).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!("Delivery notification for flight {} failed: {}", flight.id, err)
            }
            Err(_) => tracing::warn!("Delivery notification for flight {} timed out", flight.id),
        }

        self.archive(&flight.id, result);
        self.inner
            .flights
            .remove_if(&flight.id, |_, current| Arc::ptr_eq(current, slot));
    }

    fn archive(&self, flight_id: &str, result: JourneyResult) {
        let config = &self.inner.config;
        self.inner.results.insert(
            flight_id.to_string(),
            ArchivedResult {
                stored_at: Instant::now(),
                result,
            },
        );
        prune_cache(
            &self.inner.results,
            config.result_archive_max_entries,
            config.result_archive_ttl,
        );
    }

    /// Tear down a slot whose status was just set to cancelled.
    fn retire_cancelled(&self, flight_id: &str, slot: &Arc<FlightSlot>) {
        self.inner
            .flights
            .remove_if(flight_id, |_, current| Arc::ptr_eq(current, slot));
        slot.callback().take();
        slot.cancel_schedules();
        self.emit(FlightEvent::Cancelled {
            flight_id: flight_id.to_string(),
        });
    }

    async fn weather_tick(&self, flight_id: &str, slot: &Arc<FlightSlot>) {
        if slot.weather_busy.swap(true, Ordering::AcqRel) {
            tracing::debug!("Weather check for flight {} still running, skipping", flight_id);
            return;
        }
        let _busy = BusyGuard(&slot.weather_busy);

        let position = {
            let flight = slot.record();
            if flight.status != FlightStatus::EnRoute {
                return;
            }
            flight.current_position.clone()
        };

        let Some(sample) = self.sample_weather(flight_id, &position).await else {
            return;
        };

        let config = &self.inner.config;
        let now = self.inner.clock.now();
        let mut events = Vec::new();
        {
            let mut flight = slot.record();
            if flight.status != FlightStatus::EnRoute {
                return;
            }

            let previous = flight
                .last_weather()
                .map(|last| last.speed_multiplier)
                .unwrap_or(1.0);
            if !is_significant_change(sample.speed_multiplier, previous, config) {
                return;
            }

            flight.weather_history.push(sample.clone());
            flight.speed_kmh = config.base_speed_kmh * sample.speed_multiplier;
            flight.estimated_arrival =
                now + travel_duration(flight.distance_remaining_km(), flight.speed_kmh);
            tracing::info!(
                "Flight {} weather now {:?} ({:.2}), speed {:.1} km/h",
                flight_id,
                sample.kind,
                sample.intensity,
                flight.speed_kmh
            );
            events.push(FlightEvent::WeatherChanged {
                flight_id: flight_id.to_string(),
                sample: sample.clone(),
                speed_kmh: flight.speed_kmh,
            });

            if sample.is_severe(config.severe_storm_intensity) {
                if let Some(event) = self.replan(&mut flight, now) {
                    events.push(event);
                }
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    /// Replace the remaining path with a fresh route from the current
    /// position. Keeps the old path if planning fails.
    fn replan(&self, flight: &mut Flight, now: DateTime<Utc>) -> Option<FlightEvent> {
        let route = match self.inner.planner.plan(
            &flight.current_position,
            &flight.destination,
            now,
            flight.speed_kmh,
        ) {
            Ok(route) => route,
            Err(err) => {
                tracing::warn!("Replan for flight {} failed, keeping path: {}", flight.id, err);
                return None;
            }
        };

        flight.path_offset_km = flight.distance_covered_km;
        flight.total_distance_km = flight.distance_covered_km + route.total_distance_km;
        flight.path = route.waypoints;
        flight.reroute_count += 1;
        flight.estimated_arrival =
            now + travel_duration(flight.distance_remaining_km(), flight.speed_kmh);

        tracing::info!(
            "Flight {} rerouted around severe weather: {:.1} km remaining",
            flight.id,
            route.total_distance_km
        );
        Some(FlightEvent::Rerouted {
            flight_id: flight.id.clone(),
            reroute_count: flight.reroute_count,
            total_distance_km: flight.total_distance_km,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum TickKind {
    Progress,
    Weather,
}

enum TickAction {
    Nothing,
    Report,
    Deliver,
    Expire,
}

/// Absorbs rounding so a change of exactly the threshold still counts.
const MULTIPLIER_EPSILON: f64 = 1e-9;

fn is_significant_change(multiplier: f64, previous: f64, config: &SimulatorConfig) -> bool {
    (multiplier - previous).abs() + MULTIPLIER_EPSILON >= config.weather_change_threshold
}

fn exceeded_max_duration(flight: &Flight, now: DateTime<Utc>, config: &SimulatorConfig) -> bool {
    match chrono::Duration::from_std(config.max_flight_duration) {
        Ok(limit) => now - flight.started_at > limit,
        Err(_) => false,
    }
}
