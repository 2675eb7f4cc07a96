use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use super::Link;
use crate::core::{Error, LinkConfig, Result};

/// Serial port link (8N1)
pub struct SerialLink {
    /// Device path
    device: String,
    /// Baud rate
    baud_rate: u32,
    /// Driver-level read timeout
    read_timeout: Duration,
    /// Open port, if any
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Creates a closed link for the configured device
    pub fn new(config: &LinkConfig) -> Self {
        SerialLink {
            device: config.device.clone(),
            baud_rate: config.baud_rate,
            read_timeout: config.read_timeout,
            port: None,
        }
    }

    /// Creates and opens a link
    pub fn open_with(config: &LinkConfig) -> Result<Self> {
        let mut link = SerialLink::new(config);
        link.open()?;
        Ok(link)
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        let device = &self.device;
        self.port
            .as_mut()
            .ok_or_else(|| Error::link(format!("{} is not open", device)))
    }
}

impl Link for SerialLink {
    fn open(&mut self) -> Result<()> {
        self.port = None;

        let mut port = serialport::new(&self.device, self.baud_rate)
            .timeout(self.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| Error::link(format!("Failed to open {}: {}", self.device, e)))?;

        // Some adapters hold the peer in reset until these are asserted
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);

        debug!(device = %self.device, baud = self.baud_rate, "serial link opened");
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(device = %self.device, "serial link closed");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port_mut()?;
        let pending = port.bytes_to_read()? as usize;
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = pending.min(buf.len());
        match port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.device, self.baud_rate)
    }
}
