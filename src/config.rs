/// Represents the unique identifier of the SDS011 sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct DeviceID {
    /// The first byte of the device ID.
    pub id1: u8,
    /// The second byte of the device ID.
    pub id2: u8,
}

impl DeviceID {
    /// The wildcard ID, addressing every sensor on the link.
    pub const ALL: DeviceID = DeviceID {
        id1: 0xff,
        id2: 0xff,
    };
}

impl Default for DeviceID {
    /// Returns the default device id.
    fn default() -> DeviceID {
        DeviceID::ALL
    }
}

/// Builds an ID from its printed form, e.g. `0xA160` gives `id1 = 0xA1, id2 = 0x60`.
impl From<u16> for DeviceID {
    fn from(value: u16) -> Self {
        let [id1, id2] = value.to_be_bytes();
        DeviceID { id1, id2 }
    }
}

/// What the driver does with the link when a frame fails its checksum.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum ReconnectPolicy {
    /// Close and reopen the link before reporting the failure.
    #[default]
    OnChecksumMismatch,
    /// Report the failure and keep the link as is.
    Never,
}

/// Configuration settings for the SDS011 driver.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Config {
    /// The device ID commands are addressed to.
    pub id: DeviceID,
    /// Link recovery behavior on corrupted frames.
    pub reconnect: ReconnectPolicy,
}

impl Config {
    /// Creates a new `Config` instance.
    ///
    /// # Arguments
    ///
    /// * `id` - The `DeviceID` for the sensor.
    /// * `reconnect` - The `ReconnectPolicy` applied on checksum failures.
    pub fn new(id: DeviceID, reconnect: ReconnectPolicy) -> Config {
        Config { id, reconnect }
    }
    /// Sets the device ID for the configuration.
    pub fn id(mut self, id: DeviceID) -> Self {
        self.id = id;
        self
    }
    /// Sets the reconnect policy for the configuration.
    pub fn reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_from_printed_form() {
        assert_eq!(DeviceID::from(0xA160), DeviceID { id1: 0xA1, id2: 0x60 });
        assert_eq!(DeviceID::from(0xFFFF), DeviceID::ALL);
    }

    #[test]
    fn default_config_targets_all_and_reconnects() {
        let config = Config::default();
        assert_eq!(config.id, DeviceID::ALL);
        assert_eq!(config.reconnect, ReconnectPolicy::OnChecksumMismatch);

        let config = config.reconnect(ReconnectPolicy::Never).id(DeviceID::from(0x0102));
        assert_eq!(config.reconnect, ReconnectPolicy::Never);
        assert_eq!(config.id.id2, 0x02);
    }
}
