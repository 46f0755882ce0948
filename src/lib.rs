use log::{debug, error, warn};

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

pub mod frame;
pub use frame::{CommandKind, Measurement, ReportingFrame};

pub mod link;
pub use link::{Link, SerialLink};

pub mod monitor;
pub mod report;
pub mod sampler;
pub mod settings;

// Represents the operational state of the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalState {
    /// Sensor is in low-power sleep mode.
    Sleeping,
    /// Sensor is actively taking measurements.
    Working,
}

/// What the driver last asked the sensor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No command sent since the driver was created.
    Idle,
    /// A wake up command was sent.
    Awake,
    /// A sleep command was sent.
    Asleep,
}

// Replies to other commands may precede the one we wait for.
const MAX_REPLY_ATTEMPTS: usize = 5;

/// Represents an SDS011 air quality sensor.
///
/// This struct provides methods to wake the sensor up, put it to sleep and
/// read the data reports it emits while working.
///
/// # Type Parameters
///
/// * `L`: The link used to communicate with the sensor, see [`Link`].
pub struct Sds011<L> {
    link: L,
    config: Config,
    state: DriverState,
}

impl<L> Sds011<L>
where
    L: Link,
{
    /// Creates a new `Sds011` sensor instance.
    ///
    /// # Arguments
    ///
    /// * `link`: The link to the sensor, already open.
    /// * `config`: The driver configuration.
    ///
    /// # Returns
    ///
    /// A new `Sds011` instance in the [`DriverState::Idle`] state.
    pub fn new(link: L, config: Config) -> Self {
        Self {
            link,
            config,
            state: DriverState::Idle,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Sends the wake up command.
    ///
    /// Returns as soon as the command is written. The sensor needs about 30
    /// seconds of fan time before its readings are stable, waiting for it is
    /// up to the caller.
    ///
    /// A link left closed by a failed recovery is reopened first.
    pub async fn wake_up(&mut self) -> Result<(), Error> {
        if !self.link.is_open() {
            debug!("Link is closed, reopening before wake up");
            self.link.reopen().await?;
        }
        self.send(CommandKind::SetState(OperationalState::Working))
            .await
            .map_err(|e| {
                error!("Failed to wake up sensor: {}", e);
                e
            })?;
        self.state = DriverState::Awake;
        Ok(())
    }

    /// Sends the sleep command, stopping the fan and laser.
    pub async fn sleep(&mut self) -> Result<(), Error> {
        self.send(CommandKind::SetState(OperationalState::Sleeping))
            .await
            .map_err(|e| {
                error!("Failed to put sensor to sleep: {}", e);
                e
            })?;
        self.state = DriverState::Asleep;
        Ok(())
    }

    /// Reads the next data report emitted by the sensor.
    ///
    /// # Returns
    ///
    /// * `Ok(Measurement)` with the PM10 and PM2.5 concentrations.
    /// * `Err(Error::LinkTimeout)` if no frame started within the read timeout.
    /// * `Err(Error::ShortFrame)` if the frame was truncated.
    /// * `Err(Error::ChecksumMismatch)` if the frame was corrupted. Depending on
    ///   [`ReconnectPolicy`] the link is closed and reopened before returning.
    /// * `Err(Error::BadTerminator)` if the frame did not end with `TAIL`.
    pub async fn read_measurement(&mut self) -> Result<Measurement, Error> {
        match frame::read_report(&mut self.link).await {
            Ok(report) => {
                let measurement = report.measurement();
                debug!(
                    "Processed frame - PM2.5: {}, PM10: {}",
                    measurement.pm2_5, measurement.pm10
                );
                Ok(measurement)
            }
            Err(e) => Err(self.recover(e).await),
        }
    }

    /// Queries the sensor's current operational state.
    ///
    /// # Returns
    ///
    /// * `Ok(OperationalState)` as reported by the sensor.
    /// * `Err(Error::UnexpectedReply)` if no query reply was found among the
    ///   next few replies.
    /// * Any framing error, handled as in [`Sds011::read_measurement`].
    pub async fn query_state(&mut self) -> Result<OperationalState, Error> {
        self.send(CommandKind::QueryState).await?;

        let mut sync = frame::Synchronizer::reply();
        let mut last = [0u8; 6];
        for _ in 0..MAX_REPLY_ATTEMPTS {
            let payload = match frame::read_payload(&mut self.link, &mut sync).await {
                Ok(payload) => payload,
                Err(e) => return Err(self.recover(e).await),
            };
            last = payload.0;
            match frame::StateReply::try_from(payload) {
                Ok(reply) if reply.query => {
                    debug!("Queried operational state: {:?}", reply.state);
                    return Ok(reply.state);
                }
                Ok(reply) => debug!("Skipping set acknowledgement: {:?}", reply),
                Err(_) => debug!("Skipping reply to another command: {:02X?}", last),
            }
        }
        warn!("query_state: no query reply, last reply: {:02X?}", last);
        Err(Error::UnexpectedReply(last))
    }

    /// Drops reports the sensor emitted before now, so the next read returns
    /// a fresh one.
    pub fn discard_pending(&mut self) -> Result<(), Error> {
        self.link.discard_input().map_err(|e| {
            error!("Failed to discard pending input: {}", e);
            e
        })
    }

    /// Releases the link.
    pub fn close(&mut self) {
        self.link.close();
    }

    // Applies the reconnect policy to a framing error and hands it back.
    async fn recover(&mut self, e: Error) -> Error {
        if matches!(e, Error::ChecksumMismatch { .. })
            && self.config.reconnect == ReconnectPolicy::OnChecksumMismatch
        {
            warn!("{}, restarting connection", e);
            self.link.close();
            if let Err(reopen) = self.link.reopen().await {
                error!("Failed to restart connection: {}", reopen);
            }
        }
        e
    }

    // Encodes a command for the configured device ID and writes it to the link.
    async fn send(&mut self, kind: CommandKind) -> Result<(), Error> {
        let command = frame::encode_command(kind, self.config.id);
        debug!("Executing command: {:02X?}", command);
        self.link.write(&command).await
    }
}
