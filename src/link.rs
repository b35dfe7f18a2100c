use std::io::{Read, Write};
use std::time::Duration;

use log::debug;
use serialport::{DataBits, Parity, SerialPort, StopBits};

use crate::error::{Error, Result};

/// Byte pipe to the panel controller.
///
/// Implemented for serial ports; tests drive the session with in-memory
/// links.
pub trait Link {
    /// Write `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Append whatever bytes are waiting to `buf` without blocking.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize>;

    /// Release the underlying device.
    fn close(&mut self) {}
}

/// 8N1 serial connection.
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialLink {
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(timeout)
            .open()
            .map_err(|source| Error::PortOpenFailure {
                port: name.to_string(),
                source,
            })?;
        debug!("Opened {} at {} baud", name, baud_rate);
        Ok(SerialLink {
            port: Some(port),
            name: name.to_string(),
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(Error::SessionClosed)
    }
}

impl Link for SerialLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let port = self.port()?;
        let n = port.write(buf)?;
        port.flush()?;
        Ok(n)
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let port = self.port()?;
        let waiting = port
            .bytes_to_read()
            .map_err(|e| Error::Io(e.into()))? as usize;
        if waiting == 0 {
            return Ok(0);
        }
        let mut chunk = vec![0u8; waiting];
        let n = port.read(&mut chunk)?;
        buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}
