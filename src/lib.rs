//! # RTU Master - Modbus RTU Master Library
//!
//! A Modbus application-protocol master over the serial RTU transport,
//! built for polling and commanding slave devices across RS-485/RS-232
//! half-duplex buses. Pure Rust, async (Tokio), with explicit half-duplex
//! line control and per-instance extension points.
//!
//! ## Features
//!
//! - **Complete master-side codec**: a dozen wire layouts with
//!   function-specific bit packing and byte-count arithmetic
//! - **RTU link layer**: address framing and CRC-16 integrity checking,
//!   standards-compliant low-byte-first trailer
//! - **Half-duplex aware**: transmit/receive windows bracketed by
//!   line-control callbacks for RS-485 driver-enable pins
//! - **Local-echo handling**: discards echoed request bytes on adapters
//!   that loop the transmit back
//! - **Broadcast semantics**: slave address 0 transmits without awaiting
//!   a response
//! - **Extension points**: before-send/after-send/after-receive hooks
//!   with first-replacement-wins chaining
//! - **Mock-friendly**: the executor is generic over a byte transport
//!   with no physical line required
//!
//! ## Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Register |
//! | 0x07 | Read Exception Status |
//! | 0x08 | Diagnostic |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Registers |
//! | 0x17 | Read/Write Multiple Registers |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtu_master::{RtuMaster, SerialPortTransport, ModbusResult};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let transport = SerialPortTransport::new("/dev/ttyUSB0", 19200)?;
//!     let mut master = RtuMaster::new(transport);
//!
//!     // Poll ten holding registers from slave 1.
//!     let values = master.read_holding_registers(1, 0x0000, 10).await?;
//!     println!("registers: {:?}", values);
//!
//!     // Command a coil on every slave at once; broadcasts return
//!     // immediately without awaiting a response.
//!     master.write_single_coil(0, 0x0001, true).await?;
//!
//!     master.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   Application    │  polling loop, retry policy
//! └──────────────────┘
//!          │
//! ┌──────────────────┐
//! │    RtuMaster     │  transaction executor (master)
//! └──────────────────┘
//!     │           │
//! ┌─────────┐ ┌─────────┐
//! │protocol │ │  frame  │  function codec / RTU framing + CRC-16
//! └─────────┘ └─────────┘
//!          │
//! ┌──────────────────┐    ┌──────────────────┐
//! │ SerialTransport  │◄──►│   LineControl    │  byte I/O / DE-RE pin
//! └──────────────────┘    └──────────────────┘
//! ```
//!
//! One transaction is in flight per master at a time: the bus is
//! half-duplex and shared, so callers needing concurrency serialize
//! their `execute` calls above this crate.

/// Core error types and result handling
pub mod error;

/// Modbus application protocol definitions and the function codec
pub mod protocol;

/// RTU link layer: address framing and CRC-16
pub mod frame;

/// Serial transport and half-duplex line control
pub mod transport;

/// Extension points invoked around the transaction cycle
pub mod hooks;

/// The master-side transaction executor
pub mod master;

// Re-export main types for convenience
pub use error::{ModbusError, ModbusResult};
pub use frame::{crc16, RtuFramer};
pub use hooks::MasterHooks;
pub use master::{MasterStats, RtuMaster};
pub use protocol::{
    FunctionCode, MasterRequest, RequestData, ResponseData, ResponseLayout, SlaveId,
    BROADCAST_ADDRESS,
};
pub use transport::{LineControl, LinePhase, SerialConfig, SerialPortTransport, SerialTransport};

/// Maximum Modbus RTU frame size (address + PDU + CRC).
pub const MAX_RTU_FRAME_SIZE: usize = 256;

/// Maximum PDU size within an RTU frame.
pub const MAX_PDU_SIZE: usize = MAX_RTU_FRAME_SIZE - 3;

/// Maximum number of coils/discrete inputs readable in a single request.
pub const MAX_READ_BITS: u16 = 2000;

/// Maximum number of registers readable in a single request.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of coils writable in a single request.
pub const MAX_WRITE_COILS: u16 = 1968;

/// Maximum number of registers writable in a single request.
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum number of registers writable in a combined read/write request.
pub const MAX_READ_WRITE_REGISTERS: u16 = 121;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
