//! Delivery collaborators notified once per completed flight.

use std::time::Duration;

use duck_core::JourneyResult;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;

pub trait DeliveryNotifier: Send + Sync {
    fn notify_arrival<'a>(
        &'a self,
        flight_id: &'a str,
        result: &'a JourneyResult,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Logs arrivals and nothing else.
#[derive(Debug, Clone, Default)]
pub struct LogDelivery;

impl DeliveryNotifier for LogDelivery {
    fn notify_arrival<'a>(
        &'a self,
        flight_id: &'a str,
        result: &'a JourneyResult,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        tracing::info!(
            "Flight {} delivered: {:.1} km, {} weather event(s), {} points",
            flight_id,
            result.total_distance_km,
            result.weather_events.len(),
            result.points_earned
        );
        futures::future::ready(Ok(())).boxed()
    }
}

/// Forwards arrivals to an in-process consumer.
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    tx: mpsc::UnboundedSender<(String, JourneyResult)>,
}

impl ChannelDelivery {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, JourneyResult)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DeliveryNotifier for ChannelDelivery {
    fn notify_arrival<'a>(
        &'a self,
        flight_id: &'a str,
        result: &'a JourneyResult,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        let sent = self
            .tx
            .send((flight_id.to_string(), result.clone()))
            .map_err(|_| anyhow::anyhow!("delivery receiver dropped"));
        futures::future::ready(sent).boxed()
    }
}

#[derive(Debug, Serialize)]
struct ArrivalPayload<'a> {
    flight_id: &'a str,
    result: &'a JourneyResult,
}

/// POSTs arrivals as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout,
        }
    }

    async fn post(&self, flight_id: &str, result: &JourneyResult) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&ArrivalPayload { flight_id, result })
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("delivery webhook returned {}", response.status());
        }
        Ok(())
    }
}

impl DeliveryNotifier for WebhookDelivery {
    fn notify_arrival<'a>(
        &'a self,
        flight_id: &'a str,
        result: &'a JourneyResult,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        self.post(flight_id, result).boxed()
    }
}
