// HEAD is the byte that marks the beginning of any frame (command or data).
pub const HEAD: u8 = 0xAA;

// TAIL is the byte that marks the end of any frame (command or data).
pub const TAIL: u8 = 0xAB;

// COMMAND_ID is the byte that identifies a command frame sent to the sensor.
pub const COMMAND_ID: u8 = 0xB4;

// DATA_REPORT_ID is the byte that identifies a data report frame received from the sensor.
// This is used in active reporting mode and as the reply to a query data command.
pub const DATA_REPORT_ID: u8 = 0xC0;

// REPLY_ID is the byte that identifies a configuration reply frame received from the sensor.
pub const REPLY_ID: u8 = 0xC5;

// Command codes, written at byte 2 of a command frame and echoed at byte 2 of a reply.
pub const CMD_REPORTING_MODE: u8 = 0x02;
pub const CMD_QUERY_DATA: u8 = 0x04;
pub const CMD_SET_DEVICE_ID: u8 = 0x05;
pub const CMD_WORK_STATE: u8 = 0x06;
pub const CMD_FIRMWARE: u8 = 0x07;
pub const CMD_WORKING_PERIOD: u8 = 0x08;

// Second data byte of a command: read the current value or write a new one.
pub const ACTION_QUERY: u8 = 0x00;
pub const ACTION_SET: u8 = 0x01;

pub const COMMAND_FRAME_LEN: usize = 19;
pub const REPLY_FRAME_LEN: usize = 10;
pub const REPLY_PAYLOAD_LEN: usize = 6;

// Longest working period accepted by the sensor, in minutes.
pub const MAX_WORKING_PERIOD: u8 = 30;
