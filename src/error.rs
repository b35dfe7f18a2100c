//! Error types for dithering, plane encoding and serial transfer.
//!
//! Every fallible operation in the crate returns [`Error`]. The transfer
//! variants carry enough context to be shown to a user as the reason a
//! session failed.

use thiserror::Error;

/// Main error type for EPD conversion and transfer.
#[derive(Error, Debug)]
pub enum Error {
    /// The palette does not have the shape the selected policy needs.
    ///
    /// Raised for an empty palette, or when the red-priority policy is used
    /// with a palette lacking exact white, black and red entries.
    #[error("Invalid palette: {0}")]
    InvalidPalette(String),

    /// Dimensions collapsed to zero or a pixel buffer does not match them.
    #[error("Unsupported geometry {width}x{height}")]
    UnsupportedGeometry { width: u32, height: u32 },

    #[error("Unknown color mode {0:?}, use bw, rw or rbw")]
    UnknownMode(String),

    #[error("Unknown dithering policy {0:?}, use nearest or red-priority")]
    UnknownPolicy(String),

    #[error("Unknown panel {0:?}")]
    UnknownPanel(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The serial device could not be opened or configured.
    #[error("Failed to open serial port {port}: {source}")]
    PortOpenFailure {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// The receiver never answered the begin marker with `OK`.
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// A plane was handed to the session with a length that is not a
    /// multiple of the 16 byte framing unit.
    #[error("Data length {0} is not a multiple of 16")]
    InvalidChunkLength(usize),

    #[error("Short write: {written} of {expected} bytes")]
    ChunkWriteFailure { written: usize, expected: usize },

    /// The receiver did not echo the chunk checksum before the timeout.
    ///
    /// `offset` is the byte offset of the failed chunk inside its plane.
    #[error("Checksum verification failed for chunk at byte {offset}, expected {expected}")]
    ChecksumTimeoutOrMismatch { offset: usize, expected: u16 },

    #[error("Session is already closed")]
    SessionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
