//! Repeating task scheduling behind a trait so ticks can be driven by tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle that stops a repeating schedule. Clones share the same state.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Scheduler: Send + Sync {
    /// Run `task` every `interval`, first after one full interval. Runs of the
    /// same schedule never overlap; missed periods are skipped.
    fn schedule_repeating(&self, interval: Duration, task: TickFn) -> CancelToken;
}

/// One tokio task per schedule.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, interval: Duration, task: TickFn) -> CancelToken {
        let token = CancelToken::new();
        let guard = token.clone();
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = guard.cancelled() => break,
                    _ = ticker.tick() => {
                        if guard.is_cancelled() {
                            break;
                        }
                        task().await;
                    }
                }
            }
        });

        token
    }
}

struct Registration {
    interval: Duration,
    task: TickFn,
    token: CancelToken,
}

/// Records schedules without running them; tests fire them explicitly.
#[derive(Default)]
pub struct ManualScheduler {
    registrations: Mutex<Vec<Registration>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules ever registered.
    pub fn registered(&self) -> usize {
        self.registrations.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Schedules not yet cancelled.
    pub fn active(&self) -> usize {
        self.registrations
            .lock()
            .map(|r| r.iter().filter(|reg| !reg.token.is_cancelled()).count())
            .unwrap_or(0)
    }

    pub fn intervals(&self) -> Vec<Duration> {
        self.registrations
            .lock()
            .map(|r| r.iter().map(|reg| reg.interval).collect())
            .unwrap_or_default()
    }

    /// Run every live schedule once, in registration order.
    pub async fn fire_all(&self) {
        let tasks: Vec<TickFn> = match self.registrations.lock() {
            Ok(registrations) => registrations
                .iter()
                .filter(|reg| !reg.token.is_cancelled())
                .map(|reg| reg.task.clone())
                .collect(),
            Err(_) => return,
        };
        for task in tasks {
            task().await;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&self, interval: Duration, task: TickFn) -> CancelToken {
        let token = CancelToken::new();
        if let Ok(mut registrations) = self.registrations.lock() {
            registrations.push(Registration {
                interval,
                task,
                token: token.clone(),
            });
        }
        token
    }
}
