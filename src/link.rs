//! Byte level access to the sensor's serial line.

use std::future::Future;
use std::time::Duration;

use embedded_io_async::{ErrorType, Read, Write};
use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};

use crate::{Error, BAUD_RATE, READ_TIMEOUT};

/// A point-to-point byte link to the sensor.
///
/// Reads are bounded by the link's timeout. Implementations must not buffer
/// beyond what the OS layer provides, so that a `close` followed by `reopen`
/// discards any partially received frame.
pub trait Link {
    /// Reads one byte. Returns `Ok(None)` when nothing arrived within the timeout.
    fn read_byte(&mut self) -> impl Future<Output = Result<Option<u8>, Error>>;

    /// Fills `buf` completely or fails with [`Error::ShortRead`].
    fn read_exact(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<(), Error>>;

    /// Sends all of `bytes` and flushes them to the device.
    fn write(&mut self, bytes: &[u8]) -> impl Future<Output = Result<(), Error>>;

    /// Drops every byte received but not read yet.
    fn discard_input(&mut self) -> Result<(), Error>;

    /// Releases the underlying handle. Further reads and writes fail with
    /// [`Error::LinkClosed`] until [`Link::reopen`] succeeds.
    fn close(&mut self);

    /// Closes the link if needed and opens it again.
    fn reopen(&mut self) -> impl Future<Output = Result<(), Error>>;

    fn is_open(&self) -> bool;
}

/// `embedded-io-async` view of a tokio serial stream.
pub struct SerialIo(SerialStream);

impl SerialIo {
    fn clear_input(&self) -> Result<(), std::io::Error> {
        self.0.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl ErrorType for SerialIo {
    type Error = std::io::Error;
}

impl Read for SerialIo {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        AsyncReadExt::read(&mut self.0, buf).await
    }
}

impl Write for SerialIo {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        AsyncWriteExt::write(&mut self.0, buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        AsyncWriteExt::flush(&mut self.0).await
    }
}

/// [`Link`] over a serial TTY, configured 9600 8N1 with a 2 second read timeout.
pub struct SerialLink {
    path: String,
    timeout: Duration,
    port: Option<SerialIo>,
}

impl SerialLink {
    /// Opens the serial device at `path`.
    pub fn open(path: impl Into<String>) -> Result<Self, Error> {
        let mut link = Self {
            path: path.into(),
            timeout: READ_TIMEOUT,
            port: None,
        };
        link.connect()?;
        Ok(link)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn connect(&mut self) -> Result<(), Error> {
        debug!("Opening serial device {} at {} baud", self.path, BAUD_RATE);
        let stream = tokio_serial::new(&self.path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(self.timeout)
            .open_native_async()
            .map_err(|source| Error::Open {
                path: self.path.clone(),
                source,
            })?;
        self.port = Some(SerialIo(stream));
        Ok(())
    }

    fn port(&mut self) -> Result<&mut SerialIo, Error> {
        self.port.as_mut().ok_or(Error::LinkClosed)
    }
}

impl Link for SerialLink {
    async fn read_byte(&mut self) -> Result<Option<u8>, Error> {
        let limit = self.timeout;
        let port = self.port()?;
        let mut byte = [0u8; 1];
        match timeout(limit, Read::read(port, &mut byte)).await {
            Ok(Ok(1)) => Ok(Some(byte[0])),
            Ok(Ok(_)) => Ok(None),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let deadline = Instant::now() + self.timeout;
        let port = self.port()?;
        let mut received = 0;
        while received < buf.len() {
            match timeout_at(deadline, Read::read(port, &mut buf[received..])).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => received += n,
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        if received < buf.len() {
            return Err(Error::ShortRead {
                expected: buf.len(),
                received,
            });
        }
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let port = self.port()?;
        port.write_all(bytes).await?;
        port.flush().await?;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), Error> {
        self.port()?.clear_input()?;
        debug!("Discarded pending input on {}", self.path);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed serial device {}", self.path);
        }
    }

    async fn reopen(&mut self) -> Result<(), Error> {
        self.close();
        self.connect().map_err(|e| {
            warn!("Failed to reopen serial device {}: {}", self.path, e);
            e
        })
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}
