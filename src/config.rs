/// Represents the reporting mode of the SDS011 sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum DeviceMode {
    /// In Active mode, the sensor automatically reports data.
    Active,
    /// In Passive mode, the sensor only reports data when queried.
    Passive,
}

impl DeviceMode {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            DeviceMode::Active => 0x00,
            DeviceMode::Passive => 0x01,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(DeviceMode::Active),
            0x01 => Some(DeviceMode::Passive),
            _ => None,
        }
    }
}

/// Represents the operational state of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalState {
    /// Sensor is in low-power sleep mode.
    Sleeping,
    /// Sensor is actively taking measurements.
    Working,
}

impl OperationalState {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            OperationalState::Sleeping => 0x00,
            OperationalState::Working => 0x01,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(OperationalState::Sleeping),
            0x01 => Some(OperationalState::Working),
            _ => None,
        }
    }
}

/// Represents the unique identifier of the SDS011 sensor.
///
/// `id1` is sent first on the wire, `id2` second.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct DeviceID {
    /// The first byte of the device ID.
    pub id1: u8,
    /// The second byte of the device ID.
    pub id2: u8,
}

impl DeviceID {
    /// Address matched by every sensor on the line.
    pub const BROADCAST: DeviceID = DeviceID {
        id1: 0xff,
        id2: 0xff,
    };

    pub const fn new(id1: u8, id2: u8) -> Self {
        DeviceID { id1, id2 }
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl Default for DeviceID {
    /// Returns the broadcast device id.
    fn default() -> DeviceID {
        DeviceID::BROADCAST
    }
}

/// Configuration settings for the SDS011 sensor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// The device ID commands are addressed to.
    pub id: DeviceID,
    /// The reporting mode the sensor is expected to be in.
    pub mode: DeviceMode,
    /// How many times the transport is polled while waiting for a reply.
    pub max_polls: u16,
    /// Delay between two polls that found no pending bytes.
    pub poll_interval_ms: u32,
}

impl Config {
    /// Creates a new `Config` instance with the default poll budget.
    ///
    /// # Arguments
    ///
    /// * `id` - The `DeviceID` for the sensor.
    /// * `mode` - The `DeviceMode` for the sensor.
    pub fn new(id: DeviceID, mode: DeviceMode) -> Config {
        Config {
            id,
            mode,
            ..Config::default()
        }
    }
    /// Sets the device ID for the configuration.
    pub fn id(mut self, id: DeviceID) -> Self {
        self.id = id;
        self
    }
    /// Sets the device mode for the configuration.
    pub fn mode(mut self, mode: DeviceMode) -> Self {
        self.mode = mode;
        self
    }
    /// Sets how many polls a request may spend waiting for its reply.
    pub fn max_polls(mut self, max_polls: u16) -> Self {
        self.max_polls = max_polls;
        self
    }
    /// Sets the delay, in milliseconds, between two empty polls.
    pub fn poll_interval_ms(mut self, poll_interval_ms: u32) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }
}

/// Provides default configuration values for the SDS011 sensor.
impl Default for Config {
    /// Returns the default configuration.
    ///
    /// The default configuration uses a device ID of `0xFFFF`, `Passive` mode and a poll
    /// budget of 40 polls spaced 50ms apart, long enough to see one active-mode report.
    fn default() -> Config {
        Config {
            id: DeviceID::default(),
            mode: DeviceMode::Passive,
            max_polls: 40,
            poll_interval_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_broadcast_passive() {
        let config = Config::default();
        assert!(config.id.is_broadcast());
        assert_eq!(config.mode, DeviceMode::Passive);
        assert!(config.max_polls > 0);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = Config::new(DeviceID::new(0xA1, 0x60), DeviceMode::Active)
            .max_polls(3)
            .poll_interval_ms(1);
        assert_eq!(config.id, DeviceID::new(0xA1, 0x60));
        assert!(!config.id.is_broadcast());
        assert_eq!(config.mode, DeviceMode::Active);
        assert_eq!(config.max_polls, 3);
        assert_eq!(config.poll_interval_ms, 1);
    }

    #[test]
    fn mode_bytes() {
        assert_eq!(DeviceMode::Active.to_byte(), 0x00);
        assert_eq!(DeviceMode::from_byte(0x01), Some(DeviceMode::Passive));
        assert_eq!(DeviceMode::from_byte(0x02), None);
        assert_eq!(OperationalState::from_byte(0x01), Some(OperationalState::Working));
        assert_eq!(OperationalState::Sleeping.to_byte(), 0x00);
    }
}
