//! Handshake and chunked, checksum acknowledged transfer of the two planes.
//!
//! The protocol is strictly request / acknowledge:
//!
//! 1. send `Beg\n\r`, wait for a reply containing `OK`
//! 2. for each plane, send 16 byte chunks; after each chunk wait for a reply
//!    containing the decimal sum of the chunk bytes modulo 65536
//!
//! There are no retries. The first missing acknowledgement ends the session
//! and the link is closed on every exit path.

use std::fmt;
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::{
    error::{Error, Result},
    link::{Link, SerialLink},
};

pub const HANDSHAKE: &[u8] = b"Beg\n\r";
pub const HANDSHAKE_ACK: &[u8] = b"OK";
pub const CHUNK_SIZE: usize = 16;
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Sum of the chunk bytes modulo 65536.
pub fn checksum(chunk: &[u8]) -> u16 {
    chunk
        .iter()
        .fold(0u16, |sum, &byte| sum.wrapping_add(byte as u16))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    port: String,
    baud_rate: u32,
    timeout: Duration,
    settle: Duration,
    poll_interval: Duration,
}

impl SessionConfig {
    /// Defaults: 115200 baud, 10 s response timeout, 1 s settle delay after
    /// opening and 100 ms between polls.
    pub fn new(port: String) -> SessionConfig {
        SessionConfig {
            port,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_secs(10),
            settle: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn baud_rate(self, baud_rate: u32) -> Self {
        SessionConfig { baud_rate, ..self }
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        SessionConfig { timeout, ..self }
    }

    pub fn settle(self, settle: Duration) -> Self {
        SessionConfig { settle, ..self }
    }

    pub fn poll_interval(self, poll_interval: Duration) -> Self {
        SessionConfig {
            poll_interval,
            ..self
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Primary,
    Secondary,
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plane::Primary => write!(f, "primary"),
            Plane::Secondary => write!(f, "secondary"),
        }
    }
}

/// Bytes acknowledged so far for the plane in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub plane: Plane,
    pub sent: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Closed(Outcome),
    Open,
    Handshaking,
    Sending(Plane),
}

pub struct TransferSession<L: Link> {
    link: Option<L>,
    config: SessionConfig,
    state: SessionState,
    progress: Option<Progress>,
    on_progress: Option<Box<dyn FnMut(&Progress)>>,
}

impl TransferSession<SerialLink> {
    /// Open the configured serial port and wait for the receiver to reset.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let link = SerialLink::open(&config.port, config.baud_rate, config.timeout)?;
        info!("Opened {}, settling for {:?}", config.port, config.settle);
        sleep(config.settle);
        Ok(Self::with_link(link, config))
    }
}

impl<L: Link> TransferSession<L> {
    pub fn with_link(link: L, config: SessionConfig) -> Self {
        TransferSession {
            link: Some(link),
            config,
            state: SessionState::Open,
            progress: None,
            on_progress: None,
        }
    }

    /// Called after every acknowledged chunk.
    pub fn on_progress(mut self, callback: impl FnMut(&Progress) + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    /// Run the handshake and transfer both planes.
    ///
    /// The link is closed before returning, whatever the result. On failure
    /// the error's message is also kept in [`SessionState::Closed`].
    pub fn send(&mut self, primary: &[u8], secondary: &[u8]) -> Result<()> {
        if self.link.is_none() {
            return Err(Error::SessionClosed);
        }

        let result = self.run(primary, secondary);
        let outcome = match &result {
            Ok(()) => {
                info!("Data transmission completed successfully");
                Outcome::Success
            }
            Err(err) => {
                warn!("Transfer failed: {}", err);
                Outcome::Failure(err.to_string())
            }
        };
        self.close(outcome);
        result
    }

    fn run(&mut self, primary: &[u8], secondary: &[u8]) -> Result<()> {
        self.handshake()?;
        self.send_plane(Plane::Primary, primary)?;
        self.send_plane(Plane::Secondary, secondary)?;
        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        self.state = SessionState::Handshaking;
        debug!("Sending begin marker");
        self.link()?.write(HANDSHAKE)?;
        if self.wait_for(HANDSHAKE_ACK)? {
            Ok(())
        } else {
            Err(Error::HandshakeTimeout(self.config.timeout))
        }
    }

    fn send_plane(&mut self, plane: Plane, data: &[u8]) -> Result<()> {
        if data.len() % CHUNK_SIZE != 0 {
            return Err(Error::InvalidChunkLength(data.len()));
        }
        self.state = SessionState::Sending(plane);
        info!("Sending {} plane, {} bytes", plane, data.len());

        let total = data.len();
        for (index, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            let offset = index * CHUNK_SIZE;
            let written = self.link()?.write(chunk)?;
            if written != CHUNK_SIZE {
                return Err(Error::ChunkWriteFailure {
                    written,
                    expected: CHUNK_SIZE,
                });
            }

            let expected = checksum(chunk);
            if !self.wait_for(expected.to_string().as_bytes())? {
                return Err(Error::ChecksumTimeoutOrMismatch { offset, expected });
            }

            let progress = Progress {
                plane,
                sent: offset + CHUNK_SIZE,
                total,
            };
            debug!(
                "Sent {}/{} bytes ({:.1}%)",
                progress.sent,
                total,
                progress.sent as f64 / total as f64 * 100.0
            );
            self.progress = Some(progress);
            if let Some(callback) = self.on_progress.as_mut() {
                callback(&progress);
            }
        }
        Ok(())
    }

    /// Poll until the accumulated reply contains `expected` or the timeout
    /// runs out.
    fn wait_for(&mut self, expected: &[u8]) -> Result<bool> {
        let deadline = Instant::now() + self.config.timeout;
        let poll_interval = self.config.poll_interval;
        let mut response = Vec::new();
        loop {
            self.link()?.read_available(&mut response)?;
            if contains(&response, expected) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                debug!(
                    "Timed out waiting for {:?}, got {:?}",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&response)
                );
                return Ok(false);
            }
            sleep(poll_interval);
        }
    }

    fn link(&mut self) -> Result<&mut L> {
        self.link.as_mut().ok_or(Error::SessionClosed)
    }

    fn close(&mut self, outcome: Outcome) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.state = SessionState::Closed(outcome);
    }
}

impl<L: Link> Drop for TransferSession<L> {
    fn drop(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }
}
