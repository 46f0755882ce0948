#![allow(dead_code)]

use std::collections::VecDeque;

use sds011_monitor::frame::checksum;
use sds011_monitor::report::{Publisher, ReportError};
use sds011_monitor::{Error, Link};
use tokio_util::sync::CancellationToken;

/// In-memory link replaying a fixed byte script. An exhausted script behaves
/// like a read timeout.
///
/// `incoming` holds bytes already received. Each `discard_input` drops them
/// and delivers the next chunk of `arrivals`, standing in for the reports the
/// sensor emits after the discard.
#[derive(Default)]
pub struct ScriptedLink {
    pub incoming: VecDeque<u8>,
    pub arrivals: VecDeque<Vec<u8>>,
    pub discards: usize,
    pub written: Vec<Vec<u8>>,
    pub reopens: usize,
    pub closed: bool,
    pub fail_reopen: bool,
}

impl ScriptedLink {
    pub fn new(bytes: impl IntoIterator<Item = u8>) -> Self {
        Self {
            incoming: bytes.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Link delivering one chunk per cycle, each once the pending input is
    /// discarded.
    pub fn arriving(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            arrivals: chunks.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl Link for ScriptedLink {
    async fn read_byte(&mut self) -> Result<Option<u8>, Error> {
        if self.closed {
            return Err(Error::LinkClosed);
        }
        Ok(self.incoming.pop_front())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        if self.closed {
            return Err(Error::LinkClosed);
        }
        let expected = buf.len();
        for (received, slot) in buf.iter_mut().enumerate() {
            match self.incoming.pop_front() {
                Some(byte) => *slot = byte,
                None => {
                    return Err(Error::ShortRead { expected, received });
                }
            }
        }
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Err(Error::LinkClosed);
        }
        self.written.push(bytes.to_vec());
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::LinkClosed);
        }
        self.discards += 1;
        self.incoming.clear();
        if let Some(chunk) = self.arrivals.pop_front() {
            self.incoming.extend(chunk);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    async fn reopen(&mut self) -> Result<(), Error> {
        self.closed = true;
        if self.fail_reopen {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such device",
            )));
        }
        self.reopens += 1;
        self.closed = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

/// Data report carrying raw PM values (tenths of µg/m³), ID A160.
pub fn report(pm2_5: u16, pm10: u16) -> Vec<u8> {
    let [p25l, p25h] = pm2_5.to_le_bytes();
    let [p10l, p10h] = pm10.to_le_bytes();
    let data = [p25l, p25h, p10l, p10h, 0xA1, 0x60];
    let mut frame = vec![0xAA, 0xC0];
    frame.extend_from_slice(&data);
    frame.push(checksum(&data));
    frame.push(0xAB);
    frame
}

/// Reply to the work state command.
pub fn state_reply(query: bool, working: bool) -> Vec<u8> {
    let data = [0x06, u8::from(!query), u8::from(working), 0x00, 0xA1, 0x60];
    let mut frame = vec![0xAA, 0xC5];
    frame.extend_from_slice(&data);
    frame.push(checksum(&data));
    frame.push(0xAB);
    frame
}

pub fn with_bad_checksum(mut frame: Vec<u8>) -> Vec<u8> {
    frame[8] = frame[8].wrapping_add(1);
    frame
}

/// Publisher recording payloads, cancelling `stop` after `limit` reports.
pub struct Recorder {
    pub sent: Vec<(String, Vec<u8>)>,
    pub limit: usize,
    pub stop: CancellationToken,
}

impl Recorder {
    pub fn new(limit: usize, stop: CancellationToken) -> Self {
        Self {
            sent: Vec::new(),
            limit,
            stop,
        }
    }
}

impl Publisher for Recorder {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), ReportError> {
        self.sent.push((topic.to_owned(), payload));
        if self.sent.len() >= self.limit {
            self.stop.cancel();
        }
        Ok(())
    }
}

/// Publisher whose deliveries never complete, like a client stuck on an
/// unreachable broker.
#[derive(Default)]
pub struct Stalled {
    pub attempts: usize,
}

impl Publisher for Stalled {
    async fn publish(&mut self, _topic: &str, _payload: Vec<u8>) -> Result<(), ReportError> {
        self.attempts += 1;
        std::future::pending().await
    }
}
