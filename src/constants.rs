use std::time::Duration;

// COMMAND_ID is the byte that identifies a command frame sent to the sensor.
pub const COMMAND_ID: u8 = 0xB4;

// DATA_REPORT_ID is the byte that identifies a data report frame received from the sensor.
pub const DATA_REPORT_ID: u8 = 0xC0;

// REPLY_ID is the byte that identifies a reply frame received from the sensor
// in response to a command.
pub const REPLY_ID: u8 = 0xC5;

// HEAD is the byte that marks the beginning of any frame (command or data).
pub const HEAD: u8 = 0xAA;

// TAIL is the byte that marks the end of any frame (command or data).
pub const TAIL: u8 = 0xAB;

// WORK_STATE_CMD is the sub-command used to set or query sleep/work state.
pub const WORK_STATE_CMD: u8 = 0x06;

// COMMAND_LEN is the size of a host to sensor command frame.
pub const COMMAND_LEN: usize = 19;

// PAYLOAD_LEN is the number of bytes following HEAD and the frame id in a
// sensor to host frame: 6 data bytes, checksum and TAIL.
pub const PAYLOAD_LEN: usize = 8;

// Serial line parameters, fixed by the sensor (9600 8N1).
pub const BAUD_RATE: u32 = 9600;

// READ_TIMEOUT bounds every read performed on the serial link.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);
