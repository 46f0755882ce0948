//! SDS011 wire format.
//!
//! Sensor to host frames are 10 bytes long:
//!
//! ```text
//! AA <id> D1 D2 D3 D4 D5 D6 CS AB
//! ```
//!
//! where `<id>` is `C0` for a data report and `C5` for a command reply, and
//! `CS` is the sum of `D1..=D6` modulo 256. Host to sensor commands are 19
//! bytes long, see [`encode_command`].

use log::{debug, error};

use crate::{
    DeviceID, Error, Link, OperationalState, COMMAND_ID, COMMAND_LEN, DATA_REPORT_ID, HEAD,
    PAYLOAD_LEN, REPLY_ID, TAIL, WORK_STATE_CMD,
};

/// Sum of `bytes` modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Searching,
    HeaderSeen,
}

/// Locates the `HEAD, <frame id>` pair in an unframed byte stream.
///
/// Bytes are fed one at a time. A byte that breaks a partial match is checked
/// again as a potential `HEAD`, so `AA AA C0` synchronizes on the second `AA`.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    frame_id: u8,
    state: SyncState,
}

impl Synchronizer {
    pub fn new(frame_id: u8) -> Self {
        Self {
            frame_id,
            state: SyncState::Searching,
        }
    }

    /// Synchronizer for data reports (`AA C0`).
    pub fn data_report() -> Self {
        Self::new(DATA_REPORT_ID)
    }

    /// Synchronizer for command replies (`AA C5`).
    pub fn reply() -> Self {
        Self::new(REPLY_ID)
    }

    /// Feeds one byte, returns `true` once the frame start has been matched.
    pub fn feed(&mut self, byte: u8) -> bool {
        match self.state {
            SyncState::HeaderSeen if byte == self.frame_id => {
                self.state = SyncState::Searching;
                return true;
            }
            SyncState::Searching | SyncState::HeaderSeen => {}
        }
        self.state = if byte == HEAD {
            SyncState::HeaderSeen
        } else {
            SyncState::Searching
        };
        false
    }

    pub fn reset(&mut self) {
        self.state = SyncState::Searching;
    }
}

/// The six data bytes of a validated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload(pub [u8; 6]);

impl Payload {
    /// Validates the bytes following the frame start: checksum first, then
    /// terminator. Both checks are mandatory.
    pub fn parse(raw: &[u8; PAYLOAD_LEN]) -> Result<Self, Error> {
        let mut data = [0u8; 6];
        data.copy_from_slice(&raw[..6]);

        let calculated = checksum(&data);
        if calculated != raw[6] {
            return Err(Error::ChecksumMismatch {
                calculated,
                received: raw[6],
            });
        }
        if raw[7] != TAIL {
            return Err(Error::BadTerminator(raw[7]));
        }
        Ok(Payload(data))
    }
}

/// A single data sample read from the SDS011 sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// PM10 concentration in µg/m³.
    pub pm10: f64,
    /// PM2.5 concentration in µg/m³.
    pub pm2_5: f64,
}

/// A decoded `AA C0` data report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingFrame {
    pub pm2_5_raw: u16,
    pub pm10_raw: u16,
    pub id: DeviceID,
}

impl From<Payload> for ReportingFrame {
    fn from(Payload(data): Payload) -> Self {
        Self {
            pm2_5_raw: u16::from_le_bytes([data[0], data[1]]),
            pm10_raw: u16::from_le_bytes([data[2], data[3]]),
            id: DeviceID {
                id1: data[4],
                id2: data[5],
            },
        }
    }
}

impl ReportingFrame {
    pub fn measurement(&self) -> Measurement {
        Measurement {
            pm10: f64::from(self.pm10_raw) / 10.0,
            pm2_5: f64::from(self.pm2_5_raw) / 10.0,
        }
    }
}

/// A decoded reply to the work state command (`AA C5 06 ..`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateReply {
    /// `true` if the reply answers a query, `false` if it acknowledges a set.
    pub query: bool,
    pub state: OperationalState,
    pub id: DeviceID,
}

impl TryFrom<Payload> for StateReply {
    type Error = Error;

    fn try_from(Payload(data): Payload) -> Result<Self, Error> {
        if data[0] != WORK_STATE_CMD {
            return Err(Error::UnexpectedReply(data));
        }
        let state = match data[2] {
            0x00 => OperationalState::Sleeping,
            0x01 => OperationalState::Working,
            _ => return Err(Error::UnexpectedReply(data)),
        };
        Ok(Self {
            query: data[1] == 0x00,
            state,
            id: DeviceID {
                id1: data[4],
                id2: data[5],
            },
        })
    }
}

/// Commands the host sends to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Put the sensor to sleep or wake it up.
    SetState(OperationalState),
    /// Ask whether the sensor is working.
    QueryState,
}

/// Encodes a 19-byte command frame addressed to `id`.
///
/// ```text
/// AA B4 06 <set> <mode> 00 x10 <id1> <id2> CS AB
/// ```
///
/// `CS` is computed over bytes 2..=16, so the frame stays valid for any
/// target ID, not only the `FF FF` wildcard.
pub fn encode_command(kind: CommandKind, id: DeviceID) -> [u8; COMMAND_LEN] {
    let mut command = [0u8; COMMAND_LEN];
    command[0] = HEAD;
    command[1] = COMMAND_ID;
    command[2] = WORK_STATE_CMD;
    match kind {
        CommandKind::SetState(state) => {
            command[3] = 0x01; // Set
            command[4] = match state {
                OperationalState::Working => 0x01,
                OperationalState::Sleeping => 0x00,
            };
        }
        CommandKind::QueryState => {
            command[3] = 0x00; // Query
        }
    }
    command[15] = id.id1;
    command[16] = id.id2;
    command[17] = checksum(&command[2..=16]);
    command[18] = TAIL;
    command
}

/// Waits for the start of a frame on `link` using `sync`.
async fn synchronize<L: Link>(link: &mut L, sync: &mut Synchronizer) -> Result<(), Error> {
    sync.reset();
    loop {
        let Some(byte) = link.read_byte().await? else {
            debug!("Timed out while searching for frame header");
            return Err(Error::LinkTimeout);
        };
        if sync.feed(byte) {
            return Ok(());
        }
    }
}

/// Synchronizes on the next frame matched by `sync` and validates its payload.
pub async fn read_payload<L: Link>(
    link: &mut L,
    sync: &mut Synchronizer,
) -> Result<Payload, Error> {
    synchronize(link, sync).await?;

    let mut raw = [0u8; PAYLOAD_LEN];
    link.read_exact(&mut raw).await.map_err(|e| match e {
        Error::ShortRead { received, .. } => Error::ShortFrame { received },
        other => other,
    })?;

    Payload::parse(&raw).map_err(|e| {
        error!("Rejected frame {:02X?}: {}", raw, e);
        e
    })
}

/// Reads the next data report from `link`.
pub async fn read_report<L: Link>(link: &mut L) -> Result<ReportingFrame, Error> {
    let payload = read_payload(link, &mut Synchronizer::data_report()).await?;
    let frame = ReportingFrame::from(payload);
    debug!("Decoded data report: {:?}", frame);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    // PM2.5 = 133.8, PM10 = 72.0, ID A160.
    const REPORT: [u8; 10] = [0xAA, 0xC0, 0x3A, 0x05, 0xD0, 0x02, 0xA1, 0x60, 0x12, 0xAB];

    fn payload_of(frame: &[u8; 10]) -> [u8; PAYLOAD_LEN] {
        let mut raw = [0u8; PAYLOAD_LEN];
        raw.copy_from_slice(&frame[2..]);
        raw
    }

    fn sync_offset(stream: &[u8], sync: &mut Synchronizer) -> Option<usize> {
        stream.iter().position(|&b| sync.feed(b))
    }

    #[test]
    fn decodes_documented_report() {
        let payload = Payload::parse(&payload_of(&REPORT)).unwrap();
        let frame = ReportingFrame::from(payload);
        assert_eq!(frame.id, DeviceID::from(0xA160));
        assert_eq!(frame.pm2_5_raw, 1338);
        assert_eq!(frame.pm10_raw, 720);

        let m = frame.measurement();
        assert_eq!(m.pm2_5, 133.8);
        assert_eq!(m.pm10, 72.0);
    }

    #[test]
    fn rejects_wrong_checksum() {
        let mut raw = payload_of(&REPORT);
        raw[6] = 0x70;
        assert!(matches!(
            Payload::parse(&raw),
            Err(Error::ChecksumMismatch {
                calculated: 0x12,
                received: 0x70
            })
        ));
    }

    #[test]
    fn rejects_bad_terminator_even_with_valid_checksum() {
        let mut raw = payload_of(&REPORT);
        raw[7] = 0xAC;
        assert!(matches!(Payload::parse(&raw), Err(Error::BadTerminator(0xAC))));
    }

    #[test]
    fn checksum_is_checked_before_terminator() {
        let mut raw = payload_of(&REPORT);
        raw[0] = raw[0].wrapping_add(1);
        raw[7] = 0x00;
        assert!(matches!(
            Payload::parse(&raw),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn validation_matches_checksum_rule_for_every_first_byte() {
        let base = payload_of(&REPORT);
        for b in 0..=255u8 {
            let mut raw = base;
            raw[0] = b;
            let expected = checksum(&raw[..6]) == raw[6];
            assert_eq!(Payload::parse(&raw).is_ok(), expected, "byte {b:#04x}");
        }
    }

    #[test]
    fn synchronizes_after_garbage() {
        let mut stream = vec![0x00, 0x13, 0xAB, 0xC0, 0xFF];
        stream.extend_from_slice(&REPORT);
        let mut sync = Synchronizer::data_report();
        assert_eq!(sync_offset(&stream, &mut sync), Some(6));
    }

    #[test]
    fn repeated_header_is_rechecked() {
        let stream = [0xAA, 0xAA, 0xAA, 0xC0];
        let mut sync = Synchronizer::data_report();
        assert_eq!(sync_offset(&stream, &mut sync), Some(3));
    }

    #[test]
    fn header_followed_by_other_byte_restarts_search() {
        let stream = [0xAA, 0x01, 0xC0, 0xAA, 0xC5, 0xAA, 0xC0];
        let mut sync = Synchronizer::data_report();
        assert_eq!(sync_offset(&stream, &mut sync), Some(6));

        let mut sync = Synchronizer::reply();
        assert_eq!(sync_offset(&stream, &mut sync), Some(4));
    }

    #[test]
    fn encodes_wildcard_sleep_and_wake() {
        let sleep = encode_command(
            CommandKind::SetState(OperationalState::Sleeping),
            DeviceID::ALL,
        );
        assert_eq!(
            sleep,
            [
                0xAA, 0xB4, 0x06, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0xFF, 0xFF, 0x05, 0xAB
            ]
        );

        let wake = encode_command(
            CommandKind::SetState(OperationalState::Working),
            DeviceID::ALL,
        );
        assert_eq!(wake[4], 0x01);
        assert_eq!(wake[17], 0x06);
    }

    #[test]
    fn encodes_addressed_commands_from_datasheet() {
        let id = DeviceID::from(0xA160);
        let sleep = encode_command(CommandKind::SetState(OperationalState::Sleeping), id);
        assert_eq!(sleep[15..], [0xA1, 0x60, 0x08, 0xAB]);

        let wake = encode_command(CommandKind::SetState(OperationalState::Working), id);
        assert_eq!(wake[15..], [0xA1, 0x60, 0x09, 0xAB]);

        let query = encode_command(CommandKind::QueryState, id);
        assert_eq!(query[3], 0x00);
        assert_eq!(query[15..], [0xA1, 0x60, 0x07, 0xAB]);
    }

    #[test]
    fn sleep_and_wake_differ_only_in_mode_and_checksum() {
        for id in [0x0000u16, 0x0001, 0xA160, 0x7F80, 0xFFFF] {
            let id = DeviceID::from(id);
            let sleep = encode_command(CommandKind::SetState(OperationalState::Sleeping), id);
            let wake = encode_command(CommandKind::SetState(OperationalState::Working), id);

            let differing: Vec<usize> = (0..COMMAND_LEN).filter(|&i| sleep[i] != wake[i]).collect();
            assert_eq!(differing, vec![4, 17]);
            for command in [sleep, wake] {
                assert_eq!(command[17], checksum(&command[2..17]));
                assert_eq!(command[18], TAIL);
            }
        }
    }

    #[test]
    fn parses_state_replies() {
        // AA C5 06 00 01 00 A1 60 08 AB: query reply, working.
        let raw = [0x06, 0x00, 0x01, 0x00, 0xA1, 0x60, 0x08, 0xAB];
        let reply = StateReply::try_from(Payload::parse(&raw).unwrap()).unwrap();
        assert!(reply.query);
        assert_eq!(reply.state, OperationalState::Working);
        assert_eq!(reply.id, DeviceID::from(0xA160));

        // AA C5 06 00 00 00 A1 60 07 AB: query reply, not working.
        let raw = [0x06, 0x00, 0x00, 0x00, 0xA1, 0x60, 0x07, 0xAB];
        let reply = StateReply::try_from(Payload::parse(&raw).unwrap()).unwrap();
        assert_eq!(reply.state, OperationalState::Sleeping);

        // Reply to another command.
        let mut raw = [0x07, 0x0F, 0x07, 0x0A, 0xA1, 0x60, 0x00, 0xAB];
        raw[6] = checksum(&raw[..6]);
        assert!(matches!(
            StateReply::try_from(Payload::parse(&raw).unwrap()),
            Err(Error::UnexpectedReply(_))
        ));
    }
}
