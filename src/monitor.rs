//! The wake, stabilize, sample, sleep cycle and the loop repeating it.

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::report::{Publisher, Reporter};
use crate::sampler::{Sampler, Summary};
use crate::{DriverState, Error, Link, OperationalState, Sds011, READ_TIMEOUT};

/// Fan time the sensor needs before its readings are stable.
pub const DEFAULT_STABILIZATION: Duration = Duration::from_secs(30);

/// Pause between the end of a cycle and the next wake up.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Longest a summary may spend in the publisher before the loop moves on.
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs sampling cycles one after the other on a single sensor.
///
/// Cycles never overlap: the sensor, its link and the sample buffer are
/// owned by the monitor and only touched from [`Monitor::run_cycle`].
pub struct Monitor<L, P> {
    sensor: Sds011<L>,
    sampler: Sampler,
    reporter: Reporter<P>,
    stabilization: Duration,
    interval: Duration,
    confirm_awake: bool,
}

impl<L, P> Monitor<L, P>
where
    L: Link,
    P: Publisher,
{
    pub fn new(sensor: Sds011<L>, sampler: Sampler, reporter: Reporter<P>) -> Self {
        Self {
            sensor,
            sampler,
            reporter,
            stabilization: DEFAULT_STABILIZATION,
            interval: DEFAULT_INTERVAL,
            confirm_awake: false,
        }
    }

    pub fn stabilization(mut self, stabilization: Duration) -> Self {
        self.stabilization = stabilization;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Query the sensor state after the stabilization wait and abort the
    /// cycle if it is not working.
    pub fn confirm_awake(mut self, confirm_awake: bool) -> Self {
        self.confirm_awake = confirm_awake;
        self
    }

    pub fn sensor(&self) -> &Sds011<L> {
        &self.sensor
    }

    pub fn reporter(&self) -> &Reporter<P> {
        &self.reporter
    }

    pub fn into_reporter(self) -> Reporter<P> {
        self.reporter
    }

    /// Runs one complete cycle and returns its summary.
    ///
    /// Only reports emitted after the stabilization wait are sampled.
    /// The sensor is put back to sleep whether sampling succeeded or not. A
    /// failed sleep command is logged but does not discard a complete summary.
    pub async fn run_cycle(&mut self) -> Result<Summary, Error> {
        self.sensor.wake_up().await?;
        debug!(
            "Waiting {:?} for the sensor to stabilize",
            self.stabilization
        );
        sleep(self.stabilization).await;

        let outcome = self.sample().await;

        if let Err(e) = self.sensor.sleep().await {
            warn!("Sensor may still be running: {}", e);
        }
        outcome
    }

    async fn sample(&mut self) -> Result<Summary, Error> {
        // Reports queued while the fan was spinning up.
        self.sensor.discard_pending()?;

        if self.confirm_awake {
            let state = self.sensor.query_state().await?;
            if state != OperationalState::Working {
                return Err(Error::NotAwake);
            }
        }
        self.sampler.collect(&mut self.sensor).await
    }

    /// Repeats cycles until `cancel` fires, then releases the link.
    ///
    /// Failed cycles are logged and the next one starts after the usual
    /// interval. A summary the publisher has not taken within
    /// [`REPORT_TIMEOUT`] is dropped. Cancellation is observed during every
    /// wait and every read.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            "Sampling {} readings every {:?}",
            self.sampler.samples(),
            self.interval
        );

        while !cancel.is_cancelled() {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.run_cycle() => outcome,
            };

            match outcome {
                Ok(summary) => {
                    let report = timeout(REPORT_TIMEOUT, self.reporter.report(&summary));
                    let reported = tokio::select! {
                        _ = cancel.cancelled() => break,
                        reported = report => reported,
                    };
                    match reported {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!("Failed to report summary: {}", e),
                        Err(_) => warn!("Publishing summary timed out, dropping it"),
                    }
                }
                Err(e) => warn!("Sampling cycle aborted: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        info!("Shutting down");
        if self.sensor.state() == DriverState::Awake {
            match timeout(READ_TIMEOUT, self.sensor.sleep()).await {
                Ok(Ok(())) => debug!("Sensor put to sleep"),
                Ok(Err(_)) => {}
                Err(_) => warn!("Timed out putting the sensor to sleep"),
            }
        }
        self.sensor.close();
    }
}
