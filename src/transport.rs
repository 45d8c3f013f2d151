//! Serial transport and line-control surfaces for the RTU master.
//!
//! The master drives one [`SerialTransport`] for byte I/O and, optionally,
//! one [`LineControl`] callback that brackets the transmit and receive
//! windows so a half-duplex driver-enable line (RS-485 DE/RE) can be
//! toggled around the exact write. The transport is deliberately dumb: it
//! knows nothing about frames, addresses or CRCs, which keeps the
//! executor testable with a mock that has no physical line at all.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rtu_master::transport::{SerialConfig, SerialPortTransport};
//!
//! # fn main() -> rtu_master::ModbusResult<()> {
//! let transport = SerialPortTransport::new("/dev/ttyUSB0", 19200)?;
//!
//! // Or with full configuration:
//! let transport = SerialPortTransport::with_config(
//!     "/dev/ttyUSB0",
//!     SerialConfig {
//!         baud_rate: 19200,
//!         ..SerialConfig::default()
//!     },
//! )?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPort, SerialStream};

use crate::error::{ModbusError, ModbusResult};

/// Phase values passed to a [`LineControl`] callback.
///
/// Each transmit and receive window is bracketed by its begin/end pair.
/// Implementations must leave the line receive-enabled after
/// `TransmitEnd`, otherwise the bus would be left driven by the master
/// while the slave tries to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinePhase {
    /// About to write the request onto the bus.
    TransmitBegin,
    /// The request has been written.
    TransmitEnd,
    /// About to read from the bus.
    ReceiveBegin,
    /// Reading is finished.
    ReceiveEnd,
}

/// Half-duplex line-control callback. Absent means no line control is
/// performed.
pub type LineControl = Box<dyn FnMut(LinePhase) + Send>;

/// Byte-level serial transport driven by the master.
///
/// `read` returns whatever is currently available up to `max_bytes`,
/// blocking at most for the transport's own configured timeout; an empty
/// result signals that no more data arrived within that window. A
/// cancelled or aborted read is equivalent to an empty one.
#[async_trait]
pub trait SerialTransport: Send {
    /// Write the whole buffer to the bus.
    async fn write(&mut self, bytes: &[u8]) -> ModbusResult<()>;

    /// Read up to `max_bytes`, returning an empty vector once the
    /// transport's timeout elapses with nothing received.
    async fn read(&mut self, max_bytes: usize) -> ModbusResult<Vec<u8>>;

    /// Number of bytes already buffered and waiting to be read.
    fn pending(&self) -> usize;

    /// Release the underlying port.
    async fn close(&mut self) -> ModbusResult<()>;
}

/// Serial line parameters for [`SerialPortTransport`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    /// Per-read timeout; also bounds each write. This is the inter-byte
    /// timeout the executor's receive loop relies on to detect the end of
    /// a shorter-than-expected response.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            timeout: Duration::from_millis(1000),
        }
    }
}

/// [`SerialTransport`] implementation over a `tokio_serial` port
/// (RS-232 or RS-485).
///
/// Enforces the RTU inter-frame silence: each write waits the 3.5
/// character gap derived from the baud rate (with the 1750 microsecond
/// floor above 19200 baud) before driving the bus.
pub struct SerialPortTransport {
    port: Option<SerialStream>,
    port_name: String,
    config: SerialConfig,
    frame_gap: Duration,
}

impl SerialPortTransport {
    /// Open a serial port with default 8N1 settings.
    pub fn new(port: &str, baud_rate: u32) -> ModbusResult<Self> {
        Self::with_config(
            port,
            SerialConfig {
                baud_rate,
                ..SerialConfig::default()
            },
        )
    }

    /// Open a serial port with full configuration.
    pub fn with_config(port: &str, config: SerialConfig) -> ModbusResult<Self> {
        let mut transport = Self {
            port: None,
            port_name: port.to_string(),
            frame_gap: frame_gap(config.baud_rate),
            config,
        };

        transport.connect()?;

        Ok(transport)
    }

    /// Open (or re-open) the serial port.
    fn connect(&mut self) -> ModbusResult<()> {
        let builder = tokio_serial::new(&self.port_name, self.config.baud_rate)
            .data_bits(self.config.data_bits)
            .stop_bits(self.config.stop_bits)
            .parity(self.config.parity)
            .timeout(self.config.timeout);

        let port = SerialStream::open(&builder).map_err(|e| {
            ModbusError::io(format!(
                "failed to open serial port {}: {}",
                self.port_name, e
            ))
        })?;

        self.port = Some(port);

        Ok(())
    }

    /// The inter-frame gap applied before each transmit.
    pub fn frame_gap(&self) -> Duration {
        self.frame_gap
    }

    fn port_mut(&mut self) -> ModbusResult<&mut SerialStream> {
        self.port
            .as_mut()
            .ok_or_else(|| ModbusError::io("serial port not connected"))
    }
}

#[async_trait]
impl SerialTransport for SerialPortTransport {
    async fn write(&mut self, bytes: &[u8]) -> ModbusResult<()> {
        let gap = self.frame_gap;
        let io_timeout = self.config.timeout;
        let port = self.port_mut()?;

        // 3.5 character times of bus silence before driving the line.
        tokio::time::sleep(gap).await;

        match timeout(io_timeout, port.write_all(bytes)).await {
            Ok(Ok(())) => {
                let _ = timeout(io_timeout, port.flush()).await;
                Ok(())
            }
            Ok(Err(e)) => Err(ModbusError::io(format!("serial write error: {}", e))),
            Err(_) => Err(ModbusError::timeout(
                "write request",
                io_timeout.as_millis() as u64,
            )),
        }
    }

    async fn read(&mut self, max_bytes: usize) -> ModbusResult<Vec<u8>> {
        if max_bytes == 0 {
            return Ok(Vec::new());
        }

        let io_timeout = self.config.timeout;
        let port = self.port_mut()?;

        let mut buffer = vec![0u8; max_bytes];
        match timeout(io_timeout, port.read(&mut buffer)).await {
            Ok(Ok(n)) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Ok(Err(e)) => Err(ModbusError::io(format!("serial read error: {}", e))),
            // No data within the timeout window.
            Err(_) => Ok(Vec::new()),
        }
    }

    fn pending(&self) -> usize {
        self.port
            .as_ref()
            .and_then(|port| port.bytes_to_read().ok())
            .unwrap_or(0) as usize
    }

    async fn close(&mut self) -> ModbusResult<()> {
        // Dropping the stream releases the port.
        self.port.take();
        Ok(())
    }
}

/// Minimum inter-frame silence for a baud rate: 3.5 character times of 11
/// bits each, floored at 1750 microseconds above 19200 baud.
fn frame_gap(baud_rate: u32) -> Duration {
    let char_time_us = 11_000_000u64 / baud_rate.max(1) as u64;
    let gap_us = char_time_us * 35 / 10;
    if baud_rate > 19_200 {
        Duration::from_micros(gap_us.max(1750))
    } else {
        Duration::from_micros(gap_us)
    }
}
