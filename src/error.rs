//! # Error Handling
//!
//! Error types for the RTU master, covering serial transport failures,
//! frame-level validation, codec preconditions, and exceptions reported by
//! the addressed slave device.
//!
//! Every error is surfaced synchronously to the caller of
//! [`execute`](crate::master::RtuMaster::execute); there is no internal
//! retry and no silent downgrade. Callers that want polling/retry policy
//! implement it above this crate:
//!
//! ```rust
//! use rtu_master::ModbusResult;
//!
//! fn handle(result: ModbusResult<Vec<u16>>) {
//!     match result {
//!         Ok(values) => println!("read {} registers", values.len()),
//!         Err(error) if error.is_recoverable() => {
//!             println!("transient failure, caller may retry: {}", error);
//!         }
//!         Err(error) => println!("fatal: {}", error),
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for all master operations.
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Error conditions that can occur during a master transaction.
///
/// The protocol-level variants form a closed taxonomy: a function code
/// absent from the descriptor set (`UnsupportedFunction`), a violated
/// encoding precondition (`InvalidArgument`), a malformed frame in either
/// direction (`InvalidRequestFrame` / `InvalidResponseFrame`), and an
/// exception response from the addressed device (`SlaveException`). The
/// `Io` and `Timeout` variants cover the serial transport underneath.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// I/O failure on the serial transport (port open, read or write).
    #[error("I/O error: {message}")]
    Io { message: String },

    /// An operation exceeded the transport's configured timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Function code absent from the descriptor table.
    #[error("Unsupported function code: 0x{code:02X}")]
    UnsupportedFunction { code: u8 },

    /// An encoding precondition was violated (quantity out of range,
    /// payload shape mismatch, oversized PDU).
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A request frame failed validation: too short or CRC mismatch.
    #[error("Invalid request frame: {message}")]
    InvalidRequestFrame { message: String },

    /// A response frame failed validation: too short, CRC mismatch,
    /// address mismatch, or byte-count/data-length mismatch.
    #[error("Invalid response frame: {message}")]
    InvalidResponseFrame { message: String },

    /// The addressed device returned a Modbus exception response.
    ///
    /// `function` is the echoed function code with the exception bit
    /// cleared; `code` is the device-reported exception value (1-8 per the
    /// standard catalog, device-defined beyond that).
    #[error("Slave exception: function=0x{function:02X}, code=0x{code:02X} ({message})")]
    SlaveException {
        function: u8,
        code: u8,
        message: String,
    },
}

impl ModbusError {
    /// Create a new I/O error.
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an unsupported function error.
    pub fn unsupported_function(code: u8) -> Self {
        Self::UnsupportedFunction { code }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an invalid request frame error.
    pub fn invalid_request_frame<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequestFrame {
            message: message.into(),
        }
    }

    /// Create an invalid response frame error.
    pub fn invalid_response_frame<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponseFrame {
            message: message.into(),
        }
    }

    /// Create a slave exception error.
    ///
    /// Maps standard exception codes to human-readable messages.
    pub fn slave_exception(function: u8, code: u8) -> Self {
        let message = match code {
            0x01 => "Illegal Function",
            0x02 => "Illegal Data Address",
            0x03 => "Illegal Data Value",
            0x04 => "Slave Device Failure",
            0x05 => "Acknowledge",
            0x06 => "Slave Device Busy",
            0x08 => "Memory Parity Error",
            0x0A => "Gateway Path Unavailable",
            0x0B => "Gateway Target Device Failed to Respond",
            _ => "Device-Defined Exception",
        }
        .to_string();

        Self::SlaveException {
            function,
            code,
            message,
        }
    }

    /// The device-reported exception code, if this is a slave exception.
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::SlaveException { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if the error is recoverable (retrying the transaction might
    /// succeed).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::Timeout { .. } => true,
            // Acknowledge and Busy signal a temporarily occupied device.
            Self::SlaveException { code, .. } => matches!(code, 0x05 | 0x06),
            _ => false,
        }
    }

    /// Check if the error originated in the serial transport rather than
    /// the Modbus protocol layer.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Timeout { .. })
    }

    /// Check if the error is a protocol-level issue.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFunction { .. }
                | Self::InvalidRequestFrame { .. }
                | Self::InvalidResponseFrame { .. }
                | Self::SlaveException { .. }
        )
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ModbusError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("operation timeout", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ModbusError::timeout("read response", 1000);
        assert!(err.is_recoverable());
        assert!(err.is_transport_error());

        let err = ModbusError::slave_exception(0x03, 0x02);
        assert!(!err.is_recoverable());
        assert!(err.is_protocol_error());
        assert_eq!(err.exception_code(), Some(0x02));

        let err = ModbusError::unsupported_function(0x2B);
        assert!(err.is_protocol_error());
        assert_eq!(err.exception_code(), None);
    }

    #[test]
    fn test_busy_exception_is_recoverable() {
        assert!(ModbusError::slave_exception(0x03, 0x06).is_recoverable());
        assert!(ModbusError::slave_exception(0x03, 0x05).is_recoverable());
        assert!(!ModbusError::slave_exception(0x03, 0x01).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = ModbusError::slave_exception(0x03, 0x02);
        let msg = format!("{}", err);
        assert!(msg.contains("function=0x03"));
        assert!(msg.contains("code=0x02"));
        assert!(msg.contains("Illegal Data Address"));

        let err = ModbusError::invalid_response_frame("CRC mismatch");
        assert!(format!("{}", err).contains("Invalid response frame"));
    }
}
