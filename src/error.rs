use thiserror::Error;

/// Errors raised by the serial link, the frame codec and the driver.
///
/// Every variant is recoverable from the point of view of the monitor loop:
/// the current sampling cycle is aborted and the next one proceeds on schedule.
#[derive(Debug, Error)]
pub enum Error {
    /// No byte arrived within the read timeout while searching for a frame.
    #[error("link timed out waiting for data")]
    LinkTimeout,

    /// The link returned fewer bytes than requested before the timeout.
    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    /// A frame header was found but its payload was truncated.
    #[error("frame too short: received {received} of 8 payload bytes")]
    ShortFrame { received: usize },

    /// Frame checksum disagrees with the sum of its data bytes.
    #[error("checksum mismatch: calculated {calculated:#04x}, received {received:#04x}")]
    ChecksumMismatch { calculated: u8, received: u8 },

    /// Frame was not terminated by TAIL.
    #[error("bad terminator: {0:#04x}")]
    BadTerminator(u8),

    /// A reply frame was well formed but did not answer the command sent.
    #[error("unexpected reply: {0:02X?}")]
    UnexpectedReply([u8; 6]),

    /// The sensor reported it is not in working state after a wake up.
    #[error("sensor is not in working state")]
    NotAwake,

    /// Operation attempted while the link is closed.
    #[error("serial link is closed")]
    LinkClosed,

    /// The serial device could not be opened.
    #[error("failed to open serial device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// Underlying OS level I/O failure.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}
