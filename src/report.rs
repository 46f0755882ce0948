//! Publication of cycle summaries.
//!
//! Each summary is logged as one human readable line and published as a
//! versioned JSON document:
//!
//! ```json
//! {"version":"1.0.0","data":[{"kind":"pm25","value":8.1,"dev":0.2},{"kind":"pm10","value":12.3,"dev":0.5}]}
//! ```

use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{AsyncClient, ClientError, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::sampler::{Summary, SummaryStatistic};

pub const REPORT_VERSION: &str = "1.0.0";

/// Log target used for summary lines unless another one is injected.
pub const DEFAULT_LOG_TARGET: &str = "air_quality";

const UNIT: &str = "µg/m3";
const SIGMA: &str = "σ";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to publish report: {0}")]
    Publish(#[from] ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datum {
    pub kind: Pollutant,
    pub value: f64,
    pub dev: f64,
}

impl Datum {
    fn new(kind: Pollutant, statistic: &SummaryStatistic) -> Self {
        Self {
            kind,
            value: round2(statistic.mean),
            dev: round2(statistic.stddev),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub version: &'static str,
    pub data: Vec<Datum>,
}

impl From<&Summary> for Report {
    fn from(summary: &Summary) -> Self {
        Self {
            version: REPORT_VERSION,
            data: vec![
                Datum::new(Pollutant::Pm25, &summary.pm2_5),
                Datum::new(Pollutant::Pm10, &summary.pm10),
            ],
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `PM10:12.30 µg/m3 σ: 0.50, PM2.5: 8.10 µg/m3 σ: 0.20`
pub fn summary_line(summary: &Summary) -> String {
    format!(
        "PM10:{:.2} {} {}: {:.2}, PM2.5: {:.2} {} {}: {:.2}",
        summary.pm10.mean,
        UNIT,
        SIGMA,
        summary.pm10.stddev,
        summary.pm2_5.mean,
        UNIT,
        SIGMA,
        summary.pm2_5.stddev
    )
}

/// Topic the reports of `operator` are published on.
pub fn topic_for(operator: &str) -> String {
    format!("{operator}/air-quality")
}

/// A message sink reports are handed to.
pub trait Publisher {
    fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), ReportError>>;
}

/// Publishes over MQTT with at-least-once delivery.
///
/// Reports are queued without waiting: while the broker is unreachable the
/// queue fills up and further reports are rejected with
/// [`ClientError::TryRequest`] instead of blocking the caller.
pub struct MqttPublisher {
    client: AsyncClient,
    stop: CancellationToken,
    eventloop: JoinHandle<()>,
}

/// Reports held back while the broker is unreachable.
pub const QUEUE_CAPACITY: usize = 10;

/// How long [`MqttPublisher::disconnect`] waits for queued reports to go out.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl MqttPublisher {
    /// Creates the client and spawns the task driving its event loop. The task
    /// reconnects on its own and runs until [`MqttPublisher::disconnect`].
    pub fn spawn(options: MqttOptions) -> Self {
        let (client, mut eventloop) = AsyncClient::new(options, QUEUE_CAPACITY);
        let stop = CancellationToken::new();
        let cancel = stop.clone();

        let eventloop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("MQTT event loop stopped");
                        break;
                    }
                    event = eventloop.poll() => {
                        match event {
                            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Connected to MQTT broker"),
                            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                                debug!("Report {} acknowledged", ack.pkid)
                            }
                            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                                debug!("Disconnected from MQTT broker");
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("MQTT connection error: {}", e);
                                tokio::time::sleep(Duration::from_secs(5)).await;
                            }
                        }
                    }
                }
            }
        });

        Self {
            client,
            stop,
            eventloop,
        }
    }

    /// Queues a disconnect behind the pending reports and waits, at most
    /// [`DISCONNECT_TIMEOUT`], for the event loop to send them.
    pub async fn disconnect(mut self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!("MQTT disconnect failed: {}", e);
        } else if timeout(DISCONNECT_TIMEOUT, &mut self.eventloop)
            .await
            .is_err()
        {
            warn!("Timed out flushing reports to the MQTT broker");
        }
        self.stop.cancel();
    }
}

impl Publisher for MqttPublisher {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), ReportError> {
        self.client.try_publish(topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

/// Logs summaries and forwards them to an optional [`Publisher`].
pub struct Reporter<P> {
    publisher: Option<P>,
    topic: String,
    log_target: String,
}

impl<P: Publisher> Reporter<P> {
    pub fn new(publisher: Option<P>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            log_target: DEFAULT_LOG_TARGET.to_owned(),
        }
    }

    pub fn log_target(mut self, target: impl Into<String>) -> Self {
        self.log_target = target.into();
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publisher(&self) -> Option<&P> {
        self.publisher.as_ref()
    }

    pub fn into_publisher(self) -> Option<P> {
        self.publisher
    }

    pub async fn report(&mut self, summary: &Summary) -> Result<(), ReportError> {
        info!(target: &self.log_target, "{}", summary_line(summary));

        let Some(publisher) = self.publisher.as_mut() else {
            return Ok(());
        };
        let payload = serde_json::to_vec(&Report::from(summary))?;
        debug!("Publishing {} bytes to {}", payload.len(), self.topic);
        publisher.publish(&self.topic, payload).await
    }
}
