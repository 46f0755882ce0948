//! Process configuration, loaded from a TOML file and overridden from the
//! command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rumqttc::MqttOptions;
use serde::Deserialize;
use thiserror::Error;

use crate::sampler::{Sampler, DEFAULT_PACING, DEFAULT_SAMPLES};
use crate::{Config, DeviceID, ReconnectPolicy};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sensor: SensorSettings,
    pub sampling: SamplingSettings,
    pub mqtt: Option<MqttSettings>,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Serial device the sensor is attached to
    pub device: String,
    /// Device ID commands are addressed to, all sensors when unset
    pub id: Option<u16>,
    /// Close and reopen the serial device after a corrupted frame
    pub reconnect_on_checksum: bool,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_owned(),
            id: None,
            reconnect_on_checksum: true,
        }
    }
}

impl SensorSettings {
    pub fn driver_config(&self) -> Config {
        let id = self.id.map(DeviceID::from).unwrap_or_default();
        let reconnect = if self.reconnect_on_checksum {
            ReconnectPolicy::OnChecksumMismatch
        } else {
            ReconnectPolicy::Never
        };
        Config::new(id, reconnect)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    /// Readings averaged per cycle
    pub samples: usize,
    /// Pause between readings, in milliseconds
    pub pacing_ms: u64,
    /// Fan time after wake up before the first reading, in seconds
    pub stabilization_secs: u64,
    /// Pause between two cycles, in seconds
    pub interval_secs: u64,
    /// Ask the sensor for its state after the stabilization wait
    pub confirm_awake: bool,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            pacing_ms: DEFAULT_PACING.as_millis() as u64,
            stabilization_secs: 30,
            interval_secs: 60,
            confirm_awake: false,
        }
    }
}

impl SamplingSettings {
    pub fn sampler(&self) -> Sampler {
        Sampler::new(self.samples, Duration::from_millis(self.pacing_ms))
    }

    pub fn stabilization(&self) -> Duration {
        Duration::from_secs(self.stabilization_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MqttSettings {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Identity the publication topic is derived from
    pub operator: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

impl MqttSettings {
    pub fn options(&self) -> MqttOptions {
        let client_id = self
            .client_id
            .clone()
            .unwrap_or_else(|| format!("sds011-{}", self.operator));
        let mut options = MqttOptions::new(client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.as_deref().unwrap_or_default());
        }
        options
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// File log records are appended to
    pub file: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from("./air_quality.log"),
        }
    }
}

/// Values given on the command line, taking precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub device: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub operator: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply(&mut self, overrides: Overrides) -> Result<(), SettingsError> {
        if let Some(device) = overrides.device {
            self.sensor.device = device;
        }
        if let Some(file) = overrides.log_file {
            self.logging.file = file;
        }

        match self.mqtt.as_mut() {
            Some(mqtt) => {
                if let Some(host) = overrides.host {
                    mqtt.host = host;
                }
                if let Some(operator) = overrides.operator {
                    mqtt.operator = operator;
                }
                if let Some(port) = overrides.port {
                    mqtt.port = port;
                }
                if overrides.username.is_some() {
                    mqtt.username = overrides.username;
                }
                if overrides.password.is_some() {
                    mqtt.password = overrides.password;
                }
            }
            None => match (overrides.host, overrides.operator) {
                (Some(host), Some(operator)) => {
                    self.mqtt = Some(MqttSettings {
                        host,
                        port: overrides.port.unwrap_or_else(default_mqtt_port),
                        operator,
                        username: overrides.username,
                        password: overrides.password,
                        client_id: None,
                    });
                }
                (None, None) => {}
                _ => {
                    return Err(SettingsError::Invalid(
                        "publishing needs both a broker host and an operator".to_owned(),
                    ))
                }
            },
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.sampling.samples == 0 {
            return Err(SettingsError::Invalid(
                "sampling.samples must be at least 1".to_owned(),
            ));
        }
        if let Some(mqtt) = &self.mqtt {
            if mqtt.operator.is_empty() {
                return Err(SettingsError::Invalid(
                    "mqtt.operator must not be empty".to_owned(),
                ));
            }
        }
        Ok(())
    }
}
