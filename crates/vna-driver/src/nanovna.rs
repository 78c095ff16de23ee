//! NanoVNA serial shell driver.
//!
//! The NanoVNA family exposes a line-oriented text shell over USB CDC. Each
//! command is terminated with `\r`; the device echoes it, prints the response
//! lines and finishes with the `ch> ` prompt.
//!
//! ```text
//! host:   "data 0\r"
//! device: "data 0\r\n"
//!         "0.912344013 -0.330171257\r\n"
//!         ...
//!         "ch> "
//! ```

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{SerialPort, SerialPortType};
use tracing::{debug, info, trace};

use crate::error::{DriverError, Result};
use crate::{Channel, VnaDevice};

/// USB vendor id used by NanoVNA (STM32 CDC).
pub const NANOVNA_VID: u16 = 0x0483;
/// USB product id used by NanoVNA.
pub const NANOVNA_PID: u16 = 0x5740;

const PROMPT: &str = "ch> ";
const READ_SLICE: Duration = Duration::from_millis(50);

/// A serial port that looks like a NanoVNA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// OS port name, e.g. `/dev/ttyACM0` or `COM3`
    pub port_name: String,
    /// Product string reported over USB, if any
    pub description: String,
}

/// List serial ports carrying the NanoVNA USB id.
pub fn list_interfaces() -> Result<Vec<Interface>> {
    let ports = serialport::available_ports()?;
    let found: Vec<Interface> = ports
        .into_iter()
        .filter_map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) if usb.vid == NANOVNA_VID && usb.pid == NANOVNA_PID => {
                Some(Interface {
                    port_name: port.port_name,
                    description: usb.product.unwrap_or_else(|| "NanoVNA".to_string()),
                })
            }
            _ => None,
        })
        .collect();
    debug!(count = found.len(), "Enumerated NanoVNA interfaces");
    Ok(found)
}

/// Open the `index`-th discovered interface (not yet connected).
pub fn open_interface(index: usize, baud_rate: u32, timeout: Duration) -> Result<NanoVna> {
    let interfaces = list_interfaces()?;
    let found = interfaces.len();
    let iface = interfaces
        .into_iter()
        .nth(index)
        .ok_or(DriverError::NoInterface { index, found })?;
    info!(port = %iface.port_name, description = %iface.description, "Selected VNA interface");
    Ok(NanoVna::new(iface.port_name, baud_rate, timeout))
}

/// NanoVNA driven through its serial shell.
pub struct NanoVna {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    max_points: usize,
    port: Option<Box<dyn SerialPort>>,
}

impl NanoVna {
    /// Create a driver for `port_name`. Nothing is opened until `connect`.
    pub fn new(port_name: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout,
            max_points: 101,
            port: None,
        }
    }

    /// Override the per-sweep point limit (101 on stock firmware).
    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }

    /// Send one command and return the response lines without echo and prompt.
    fn exec(&mut self, command: &str) -> Result<Vec<String>> {
        let timeout = self.timeout;
        let port = self.port.as_mut().ok_or_else(|| DriverError::NotConnected {
            device: self.port_name.clone(),
        })?;

        trace!(device = %self.port_name, command, "Sending command");
        port.write_all(format!("{command}\r").as_bytes())?;
        port.flush()?;

        let mut buffer = [0u8; 1024];
        let mut response = String::new();
        let start = Instant::now();

        while !response.ends_with(PROMPT) {
            if start.elapsed() > timeout {
                return Err(DriverError::Timeout {
                    command: command.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            match port.read(&mut buffer) {
                Ok(n) => response.push_str(&String::from_utf8_lossy(&buffer[..n])),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }

        let body = &response[..response.len() - PROMPT.len()];
        let mut lines = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .peekable();
        if lines.peek() == Some(&command) {
            lines.next();
        }
        let lines: Vec<String> = lines.map(str::to_string).collect();
        trace!(device = %self.port_name, command, lines = lines.len(), "Received response");
        Ok(lines)
    }
}

impl VnaDevice for NanoVna {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn connect(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(READ_SLICE)
            .open()?;
        port.clear(serialport::ClearBuffer::All)?;
        self.port = Some(port);

        // Flush whatever the shell printed before we attached.
        self.exec("")?;
        info!(device = %self.port_name, baud = self.baud_rate, "Connected to NanoVNA");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!(device = %self.port_name, "Disconnected from NanoVNA");
        }
        Ok(())
    }

    fn connected(&self) -> bool {
        self.port.is_some()
    }

    fn read_firmware(&mut self) -> Result<String> {
        Ok(self.exec("info")?.join("\n"))
    }

    fn read_features(&mut self) -> Result<Vec<String>> {
        let lines = self.exec("help")?;
        Ok(lines
            .iter()
            .flat_map(|line| line.trim_start_matches("Commands:").split_whitespace())
            .map(str::to_string)
            .collect())
    }

    fn set_sweep(&mut self, start: u64, stop: u64, points: usize) -> Result<()> {
        if points == 0 || points > self.max_points {
            return Err(DriverError::UnsupportedSweep {
                message: format!("{points} points (firmware limit {})", self.max_points),
            });
        }
        if start > stop {
            return Err(DriverError::UnsupportedSweep {
                message: format!("start {start} Hz above stop {stop} Hz"),
            });
        }
        let command = format!("sweep {start} {stop} {points}");
        let reply = self.exec(&command)?;
        if let Some(line) = reply.first() {
            return Err(DriverError::Protocol {
                command,
                message: line.clone(),
            });
        }
        Ok(())
    }

    fn read_frequencies(&mut self) -> Result<Vec<u64>> {
        self.exec("frequencies")?
            .iter()
            .map(|line| {
                line.parse::<u64>().map_err(|e| DriverError::Protocol {
                    command: "frequencies".to_string(),
                    message: format!("'{line}': {e}"),
                })
            })
            .collect()
    }

    fn read_values(&mut self, channel: Channel) -> Result<Vec<String>> {
        self.exec(&format!("data {}", channel.index()))
    }
}

impl Drop for NanoVna {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
