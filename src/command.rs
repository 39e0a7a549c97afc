use crate::constants::*;
use crate::frame::checksum;
use crate::{DeviceID, DeviceMode, Error, OperationalState};

/// Whether a command reads the current value of a setting or writes a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting<T> {
    Query,
    Set(T),
}

impl<T> Setting<T> {
    fn action(&self) -> u8 {
        match self {
            Setting::Query => ACTION_QUERY,
            Setting::Set(_) => ACTION_SET,
        }
    }

    fn parse(action: u8, value: u8, from_byte: impl Fn(u8) -> Option<T>) -> Result<Self, Error> {
        match action {
            ACTION_QUERY => Ok(Setting::Query),
            ACTION_SET => from_byte(value).map(Setting::Set).ok_or(Error::Malformed),
            _ => Err(Error::Malformed),
        }
    }
}

/// A command understood by the SDS011 sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read or change the reporting mode.
    ReportingMode(Setting<DeviceMode>),
    /// Ask for one measurement, answered by a data report frame.
    QueryData,
    /// Give the addressed sensor a new device id.
    SetDeviceId(DeviceID),
    /// Read or change the sleep/work state.
    WorkState(Setting<OperationalState>),
    /// Read the firmware version date.
    FirmwareVersion,
    /// Read or change the working period, in minutes (0 = continuous).
    WorkingPeriod(Setting<u8>),
}

impl Command {
    /// Command code written at byte 2 of the frame.
    pub fn code(&self) -> u8 {
        match self {
            Command::ReportingMode(_) => CMD_REPORTING_MODE,
            Command::QueryData => CMD_QUERY_DATA,
            Command::SetDeviceId(_) => CMD_SET_DEVICE_ID,
            Command::WorkState(_) => CMD_WORK_STATE,
            Command::FirmwareVersion => CMD_FIRMWARE,
            Command::WorkingPeriod(_) => CMD_WORKING_PERIOD,
        }
    }

    /// The two option bytes carried by the command.
    pub fn options(&self) -> (u8, u8) {
        match *self {
            Command::ReportingMode(setting) => {
                (setting.action(), option_value(setting, DeviceMode::to_byte))
            }
            Command::WorkState(setting) => (
                setting.action(),
                option_value(setting, OperationalState::to_byte),
            ),
            Command::WorkingPeriod(setting) => (setting.action(), option_value(setting, |p| p)),
            Command::SetDeviceId(new_id) => (new_id.id1, new_id.id2),
            Command::QueryData | Command::FirmwareVersion => (0x00, 0x00),
        }
    }

    /// Query/set flag of the commands that carry one. Their replies echo it in DATA2.
    pub fn action(&self) -> Option<u8> {
        match self {
            Command::ReportingMode(setting) => Some(setting.action()),
            Command::WorkState(setting) => Some(setting.action()),
            Command::WorkingPeriod(setting) => Some(setting.action()),
            Command::QueryData | Command::SetDeviceId(_) | Command::FirmwareVersion => None,
        }
    }

    /// Waking a sleeping sensor is not always acknowledged.
    pub fn may_go_unanswered(&self) -> bool {
        matches!(
            self,
            Command::WorkState(Setting::Set(OperationalState::Working))
        )
    }

    /// Builds the 19-byte frame addressed to `target`.
    pub fn encode(&self, target: DeviceID) -> [u8; COMMAND_FRAME_LEN] {
        let (option1, option2) = self.options();
        encode_frame(self.code(), option1, option2, target)
    }

    /// Parses a command frame back into the command and the id it was addressed to.
    pub fn decode(frame: &[u8; COMMAND_FRAME_LEN]) -> Result<(Command, DeviceID), Error> {
        if frame[0] != HEAD || frame[1] != COMMAND_ID || frame[18] != TAIL {
            return Err(Error::Malformed);
        }
        let expected = checksum(&frame[2..=16]);
        if frame[17] != expected {
            return Err(Error::ChecksumMismatch {
                expected,
                actual: frame[17],
            });
        }

        let command = match frame[2] {
            CMD_REPORTING_MODE => Command::ReportingMode(Setting::parse(
                frame[3],
                frame[4],
                DeviceMode::from_byte,
            )?),
            CMD_QUERY_DATA => Command::QueryData,
            CMD_SET_DEVICE_ID => Command::SetDeviceId(DeviceID::new(frame[13], frame[14])),
            CMD_WORK_STATE => Command::WorkState(Setting::parse(
                frame[3],
                frame[4],
                OperationalState::from_byte,
            )?),
            CMD_FIRMWARE => Command::FirmwareVersion,
            CMD_WORKING_PERIOD => {
                Command::WorkingPeriod(Setting::parse(frame[3], frame[4], Some)?)
            }
            _ => return Err(Error::Malformed),
        };
        Ok((command, DeviceID::new(frame[15], frame[16])))
    }
}

fn option_value<T: Copy>(setting: Setting<T>, to_byte: impl Fn(T) -> u8) -> u8 {
    match setting {
        Setting::Query => 0x00,
        Setting::Set(value) => to_byte(value),
    }
}

/// Lays out a command frame from its raw parts.
///
/// The options land in bytes 3-4 for the commands that take them, or in bytes 13-14 for
/// [`CMD_SET_DEVICE_ID`]; every other data byte is zero.
pub fn encode_frame(code: u8, option1: u8, option2: u8, target: DeviceID) -> [u8; COMMAND_FRAME_LEN] {
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    frame[0] = HEAD;
    frame[1] = COMMAND_ID;
    frame[2] = code;
    match code {
        CMD_REPORTING_MODE | CMD_WORK_STATE | CMD_WORKING_PERIOD => {
            frame[3] = option1;
            frame[4] = option2;
        }
        CMD_SET_DEVICE_ID => {
            frame[13] = option1;
            frame[14] = option2;
        }
        _ => {}
    }
    frame[15] = target.id1;
    frame[16] = target.id2;
    frame[17] = checksum(&frame[2..=16]);
    frame[18] = TAIL;
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_data_broadcast_matches_datasheet() {
        let frame = Command::QueryData.encode(DeviceID::BROADCAST);
        assert_eq!(
            frame,
            [
                0xAA, 0xB4, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0xFF, 0xFF, 0x02, 0xAB
            ]
        );
    }

    #[test]
    fn set_passive_mode_addressed() {
        let frame = Command::ReportingMode(Setting::Set(DeviceMode::Passive))
            .encode(DeviceID::new(0xA1, 0x60));
        assert_eq!(
            frame,
            [
                0xAA, 0xB4, 0x02, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0xA1, 0x60, 0x05, 0xAB
            ]
        );
    }

    #[test]
    fn set_device_id_uses_bytes_13_and_14() {
        let frame = Command::SetDeviceId(DeviceID::new(0xA0, 0x01)).encode(DeviceID::new(0xA1, 0x60));
        assert_eq!(&frame[3..13], &[0u8; 10]);
        assert_eq!(frame[13], 0xA0);
        assert_eq!(frame[14], 0x01);
        assert_eq!(frame[15], 0xA1);
        assert_eq!(frame[16], 0x60);
        assert_eq!(frame[17], 0xA7);
    }

    #[test]
    fn options_ignored_for_commands_without_them() {
        let frame = encode_frame(CMD_FIRMWARE, 0x12, 0x34, DeviceID::BROADCAST);
        assert_eq!(frame, Command::FirmwareVersion.encode(DeviceID::BROADCAST));
    }

    #[test]
    fn checksum_always_covers_bytes_2_to_16() {
        let commands = [
            Command::ReportingMode(Setting::Query),
            Command::ReportingMode(Setting::Set(DeviceMode::Active)),
            Command::QueryData,
            Command::SetDeviceId(DeviceID::new(0x12, 0x34)),
            Command::WorkState(Setting::Set(OperationalState::Sleeping)),
            Command::FirmwareVersion,
            Command::WorkingPeriod(Setting::Set(30)),
        ];
        for command in commands {
            let frame = command.encode(DeviceID::BROADCAST);
            let sum = frame[2..=16].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
            assert_eq!(frame[17], sum, "{:?}", command);
            assert_eq!(frame[0], HEAD);
            assert_eq!(frame[18], TAIL);
            assert_eq!(
                Command::decode(&frame).unwrap(),
                (command, DeviceID::BROADCAST)
            );
        }
    }

    #[test]
    fn decode_rejects_corrupted_frames() {
        let mut frame = Command::WorkingPeriod(Setting::Set(5)).encode(DeviceID::BROADCAST);
        frame[4] = 6;
        assert!(matches!(
            Command::decode(&frame),
            Err(Error::ChecksumMismatch { .. })
        ));

        let mut frame = Command::QueryData.encode(DeviceID::BROADCAST);
        frame[18] = 0x00;
        assert_eq!(Command::decode(&frame), Err(Error::Malformed));
    }

    #[test]
    fn action_flag_only_for_settings() {
        assert_eq!(Command::WorkingPeriod(Setting::Query).action(), Some(ACTION_QUERY));
        assert_eq!(
            Command::ReportingMode(Setting::Set(DeviceMode::Active)).action(),
            Some(ACTION_SET)
        );
        assert_eq!(Command::FirmwareVersion.action(), None);
        assert_eq!(Command::SetDeviceId(DeviceID::BROADCAST).action(), None);
    }

    #[test]
    fn only_wake_up_may_go_unanswered() {
        assert!(Command::WorkState(Setting::Set(OperationalState::Working)).may_go_unanswered());
        assert!(!Command::WorkState(Setting::Set(OperationalState::Sleeping)).may_go_unanswered());
        assert!(!Command::WorkState(Setting::Query).may_go_unanswered());
        assert!(!Command::QueryData.may_go_unanswered());
    }
}
