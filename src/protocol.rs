//! Modbus application protocol definitions and the function codec.
//!
//! This module owns the per-function-code wire rules: building a request
//! PDU from typed arguments, computing the expected total response length
//! for the transaction executor, and decoding a response PDU back into
//! typed values. It is stateless; the RTU link layer (address byte and
//! CRC trailer) lives in [`crate::frame`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModbusError, ModbusResult};

/// Modbus address type (0-65535).
pub type ModbusAddress = u16;

/// Modbus slave/unit identifier. Address 0 is the broadcast address.
pub type SlaveId = u8;

/// Broadcast slave address: every slave acts on the request, none respond.
pub const BROADCAST_ADDRESS: SlaveId = 0;

/// Wire sentinel for an energized coil in a write-single-coil request.
const COIL_ON: u16 = 0xFF00;

/// Modbus function codes supported by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Coils (0x01)
    ReadCoils = 0x01,
    /// Read Discrete Inputs (0x02)
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    ReadInputRegisters = 0x04,
    /// Write Single Coil (0x05)
    WriteSingleCoil = 0x05,
    /// Write Single Register (0x06)
    WriteSingleRegister = 0x06,
    /// Read Exception Status (0x07)
    ReadExceptionStatus = 0x07,
    /// Diagnostic (0x08), sub-function carried in the address field
    Diagnostic = 0x08,
    /// Write Multiple Coils (0x0F)
    WriteMultipleCoils = 0x0F,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
    /// Read/Write Multiple Registers (0x17)
    ReadWriteMultipleRegisters = 0x17,
}

impl FunctionCode {
    /// Convert from the wire byte, failing for codes outside the
    /// descriptor table.
    pub fn from_u8(value: u8) -> ModbusResult<Self> {
        match value {
            0x01 => Ok(FunctionCode::ReadCoils),
            0x02 => Ok(FunctionCode::ReadDiscreteInputs),
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            0x05 => Ok(FunctionCode::WriteSingleCoil),
            0x06 => Ok(FunctionCode::WriteSingleRegister),
            0x07 => Ok(FunctionCode::ReadExceptionStatus),
            0x08 => Ok(FunctionCode::Diagnostic),
            0x0F => Ok(FunctionCode::WriteMultipleCoils),
            0x10 => Ok(FunctionCode::WriteMultipleRegisters),
            0x17 => Ok(FunctionCode::ReadWriteMultipleRegisters),
            _ => Err(ModbusError::unsupported_function(value)),
        }
    }

    /// Convert to the wire byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if the response carries a byte-count header followed by data.
    ///
    /// Non-read responses echo fixed fields after the function code
    /// instead.
    pub fn is_read_function(self) -> bool {
        matches!(
            self,
            FunctionCode::ReadCoils
                | FunctionCode::ReadDiscreteInputs
                | FunctionCode::ReadHoldingRegisters
                | FunctionCode::ReadInputRegisters
                | FunctionCode::ReadWriteMultipleRegisters
        )
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionCode::ReadCoils => "Read Coils",
            FunctionCode::ReadDiscreteInputs => "Read Discrete Inputs",
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::ReadInputRegisters => "Read Input Registers",
            FunctionCode::WriteSingleCoil => "Write Single Coil",
            FunctionCode::WriteSingleRegister => "Write Single Register",
            FunctionCode::ReadExceptionStatus => "Read Exception Status",
            FunctionCode::Diagnostic => "Diagnostic",
            FunctionCode::WriteMultipleCoils => "Write Multiple Coils",
            FunctionCode::WriteMultipleRegisters => "Write Multiple Registers",
            FunctionCode::ReadWriteMultipleRegisters => "Read/Write Multiple Registers",
        };
        write!(f, "{} (0x{:02X})", name, *self as u8)
    }
}

/// Output values carried by a request, typed per function family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestData {
    /// No output values (read functions, read exception status).
    None,
    /// Coil states for the single/multiple coil write functions.
    Coils(Vec<bool>),
    /// Register values for the register write functions.
    Registers(Vec<u16>),
    /// A pre-packed payload: custom register layouts for
    /// write-multiple-registers, or the raw data bytes of a diagnostic
    /// sub-function.
    Raw(Vec<u8>),
}

/// Decode rule for the data portion of a response PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLayout {
    /// Bit-packed coil/discrete values, LSB first, truncated to `quantity`.
    Bits { quantity: u16 },
    /// Big-endian 16-bit register values.
    Registers { quantity: u16 },
    /// Raw bytes of a known count.
    Bytes { count: usize },
    /// The fixed address/value pair echoed by write responses.
    Echo,
}

/// Values decoded from a response, mirroring [`ResponseLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseData {
    /// Individual bit values, exactly the requested quantity.
    Bits(Vec<bool>),
    /// Unsigned 16-bit register values.
    Registers(Vec<u16>),
    /// Raw response bytes.
    Bytes(Vec<u8>),
    /// Echoed address and quantity/value from a write response.
    Echo { address: u16, value: u16 },
}

impl ResponseData {
    /// Extract bit values, failing if the response decoded differently.
    pub fn into_bits(self) -> ModbusResult<Vec<bool>> {
        match self {
            ResponseData::Bits(bits) => Ok(bits),
            other => Err(unexpected_layout(&other)),
        }
    }

    /// Extract register values, failing if the response decoded
    /// differently.
    pub fn into_registers(self) -> ModbusResult<Vec<u16>> {
        match self {
            ResponseData::Registers(values) => Ok(values),
            other => Err(unexpected_layout(&other)),
        }
    }

    /// Extract raw bytes, failing if the response decoded differently.
    pub fn into_bytes(self) -> ModbusResult<Vec<u8>> {
        match self {
            ResponseData::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected_layout(&other)),
        }
    }

    /// Extract the echoed address/value pair, failing if the response
    /// decoded differently.
    pub fn into_echo(self) -> ModbusResult<(u16, u16)> {
        match self {
            ResponseData::Echo { address, value } => Ok((address, value)),
            other => Err(unexpected_layout(&other)),
        }
    }
}

fn unexpected_layout(data: &ResponseData) -> ModbusError {
    ModbusError::invalid_response_frame(format!("unexpected response layout: {:?}", data))
}

/// A single master transaction: target slave, function, addressing, output
/// values, and the optional decode/length overrides.
///
/// For [`FunctionCode::Diagnostic`] the `address` field carries the
/// sub-function code. For [`FunctionCode::ReadWriteMultipleRegisters`] the
/// `address`/`quantity` pair addresses the read and `write_address` the
/// write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRequest {
    pub slave: SlaveId,
    pub function: FunctionCode,
    pub address: ModbusAddress,
    pub quantity: u16,
    pub write_address: ModbusAddress,
    pub data: RequestData,
    /// Replaces the codec's computed decode layout. Never affects the
    /// expected-length computation.
    pub response_layout: Option<ResponseLayout>,
    /// Replaces the codec's computed expected total response length.
    pub expected_length: Option<usize>,
}

impl MasterRequest {
    /// Create a read request (coils, discrete inputs, holding or input
    /// registers).
    pub fn read(slave: SlaveId, function: FunctionCode, address: u16, quantity: u16) -> Self {
        Self {
            slave,
            function,
            address,
            quantity,
            write_address: 0,
            data: RequestData::None,
            response_layout: None,
            expected_length: None,
        }
    }

    /// Create a write-single-coil request.
    pub fn write_single_coil(slave: SlaveId, address: u16, value: bool) -> Self {
        Self {
            data: RequestData::Coils(vec![value]),
            ..Self::read(slave, FunctionCode::WriteSingleCoil, address, 1)
        }
    }

    /// Create a write-single-register request.
    ///
    /// Signed values encode bit-identically to their `u16` cast, so pass
    /// `value as u16` for an `i16`.
    pub fn write_single_register(slave: SlaveId, address: u16, value: u16) -> Self {
        Self {
            data: RequestData::Registers(vec![value]),
            ..Self::read(slave, FunctionCode::WriteSingleRegister, address, 1)
        }
    }

    /// Create a write-multiple-coils request. The coil count is the
    /// length of `values`.
    pub fn write_multiple_coils(slave: SlaveId, address: u16, values: Vec<bool>) -> Self {
        let quantity = values.len() as u16;
        Self {
            data: RequestData::Coils(values),
            ..Self::read(slave, FunctionCode::WriteMultipleCoils, address, quantity)
        }
    }

    /// Create a write-multiple-registers request from register values.
    pub fn write_multiple_registers(slave: SlaveId, address: u16, values: Vec<u16>) -> Self {
        let quantity = values.len() as u16;
        Self {
            data: RequestData::Registers(values),
            ..Self::read(slave, FunctionCode::WriteMultipleRegisters, address, quantity)
        }
    }

    /// Create a write-multiple-registers request from a pre-packed
    /// payload. The register count is `payload.len() / 2`; the payload
    /// length must be even.
    pub fn write_multiple_registers_packed(slave: SlaveId, address: u16, payload: Vec<u8>) -> Self {
        let quantity = (payload.len() / 2) as u16;
        Self {
            data: RequestData::Raw(payload),
            ..Self::read(slave, FunctionCode::WriteMultipleRegisters, address, quantity)
        }
    }

    /// Create a read-exception-status request.
    pub fn read_exception_status(slave: SlaveId) -> Self {
        Self::read(slave, FunctionCode::ReadExceptionStatus, 0, 0)
    }

    /// Create a diagnostic request. The sub-function code travels in the
    /// address field; `data` holds the sub-function's raw data bytes.
    pub fn diagnostic(slave: SlaveId, sub_function: u16, data: Vec<u8>) -> Self {
        Self {
            data: RequestData::Raw(data),
            ..Self::read(slave, FunctionCode::Diagnostic, sub_function, 0)
        }
    }

    /// Create a combined read/write-multiple-registers request.
    pub fn read_write_multiple_registers(
        slave: SlaveId,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        values: Vec<u16>,
    ) -> Self {
        Self {
            write_address,
            data: RequestData::Registers(values),
            ..Self::read(
                slave,
                FunctionCode::ReadWriteMultipleRegisters,
                read_address,
                read_quantity,
            )
        }
    }

    /// Override the decode layout for the response.
    pub fn with_response_layout(mut self, layout: ResponseLayout) -> Self {
        self.response_layout = Some(layout);
        self
    }

    /// Override the expected total response length in bytes.
    pub fn with_expected_length(mut self, length: usize) -> Self {
        self.expected_length = Some(length);
        self
    }

    /// Validate the encoding preconditions for this request.
    pub fn validate(&self) -> ModbusResult<()> {
        match self.function {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                if self.quantity == 0 || self.quantity > crate::MAX_READ_BITS {
                    return Err(ModbusError::invalid_argument(format!(
                        "bit read quantity {} out of range 1-{}",
                        self.quantity,
                        crate::MAX_READ_BITS
                    )));
                }
            }
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                if self.quantity == 0 || self.quantity > crate::MAX_READ_REGISTERS {
                    return Err(ModbusError::invalid_argument(format!(
                        "register read quantity {} out of range 1-{}",
                        self.quantity,
                        crate::MAX_READ_REGISTERS
                    )));
                }
            }
            FunctionCode::WriteSingleCoil => match &self.data {
                RequestData::Coils(values) if values.len() == 1 => {}
                _ => {
                    return Err(ModbusError::invalid_argument(
                        "write single coil requires exactly one coil value",
                    ))
                }
            },
            FunctionCode::WriteSingleRegister => match &self.data {
                RequestData::Registers(values) if values.len() == 1 => {}
                _ => {
                    return Err(ModbusError::invalid_argument(
                        "write single register requires exactly one register value",
                    ))
                }
            },
            FunctionCode::WriteMultipleCoils => match &self.data {
                RequestData::Coils(values)
                    if !values.is_empty() && values.len() <= crate::MAX_WRITE_COILS as usize => {}
                RequestData::Coils(values) => {
                    return Err(ModbusError::invalid_argument(format!(
                        "coil write count {} out of range 1-{}",
                        values.len(),
                        crate::MAX_WRITE_COILS
                    )));
                }
                _ => {
                    return Err(ModbusError::invalid_argument(
                        "write multiple coils requires coil values",
                    ))
                }
            },
            FunctionCode::WriteMultipleRegisters => match &self.data {
                RequestData::Registers(values)
                    if !values.is_empty()
                        && values.len() <= crate::MAX_WRITE_REGISTERS as usize => {}
                RequestData::Raw(payload)
                    if !payload.is_empty()
                        && payload.len() % 2 == 0
                        && payload.len() / 2 <= crate::MAX_WRITE_REGISTERS as usize => {}
                RequestData::Raw(payload) => {
                    return Err(ModbusError::invalid_argument(format!(
                        "packed register payload of {} bytes is not a valid register count",
                        payload.len()
                    )));
                }
                RequestData::Registers(values) => {
                    return Err(ModbusError::invalid_argument(format!(
                        "register write count {} out of range 1-{}",
                        values.len(),
                        crate::MAX_WRITE_REGISTERS
                    )));
                }
                _ => {
                    return Err(ModbusError::invalid_argument(
                        "write multiple registers requires register values or a packed payload",
                    ))
                }
            },
            FunctionCode::ReadExceptionStatus => {}
            FunctionCode::Diagnostic => match &self.data {
                RequestData::None | RequestData::Raw(_) => {}
                _ => {
                    return Err(ModbusError::invalid_argument(
                        "diagnostic data must be raw bytes",
                    ))
                }
            },
            FunctionCode::ReadWriteMultipleRegisters => {
                if self.quantity == 0 || self.quantity > crate::MAX_READ_REGISTERS {
                    return Err(ModbusError::invalid_argument(format!(
                        "register read quantity {} out of range 1-{}",
                        self.quantity,
                        crate::MAX_READ_REGISTERS
                    )));
                }
                match &self.data {
                    RequestData::Registers(values)
                        if !values.is_empty()
                            && values.len() <= crate::MAX_READ_WRITE_REGISTERS as usize => {}
                    _ => {
                        return Err(ModbusError::invalid_argument(format!(
                            "combined write count must be 1-{} register values",
                            crate::MAX_READ_WRITE_REGISTERS
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A request PDU together with the decode rule and expected response
/// length derived from its function descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRequest {
    /// Function code plus function-specific payload, no framing.
    pub pdu: Vec<u8>,
    /// Decode rule for the response data, before any caller override.
    pub layout: ResponseLayout,
    /// Expected total response frame length (address + function + body +
    /// CRC), before any caller override.
    pub expected_length: usize,
    /// Whether the response carries a byte-count header.
    pub reads_byte_count: bool,
}

/// Build the request PDU for a transaction and derive the response
/// expectations from the function descriptor.
pub fn encode_request(request: &MasterRequest) -> ModbusResult<EncodedRequest> {
    request.validate()?;

    let fc = request.function.to_u8();
    let mut pdu = Vec::with_capacity(8);

    let (layout, expected_length) = match request.function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            pdu.push(fc);
            pdu.extend_from_slice(&request.address.to_be_bytes());
            pdu.extend_from_slice(&request.quantity.to_be_bytes());
            let byte_count = (request.quantity as usize + 7) / 8;
            (
                ResponseLayout::Bits {
                    quantity: request.quantity,
                },
                // slave + func + count + data + crc2
                byte_count + 5,
            )
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            pdu.push(fc);
            pdu.extend_from_slice(&request.address.to_be_bytes());
            pdu.extend_from_slice(&request.quantity.to_be_bytes());
            (
                ResponseLayout::Registers {
                    quantity: request.quantity,
                },
                // slave + func + count + data x 2 + crc2
                2 * request.quantity as usize + 5,
            )
        }
        FunctionCode::WriteSingleCoil => {
            let on = matches!(&request.data, RequestData::Coils(values) if values[0]);
            let value = if on { COIL_ON } else { 0x0000 };
            pdu.push(fc);
            pdu.extend_from_slice(&request.address.to_be_bytes());
            pdu.extend_from_slice(&value.to_be_bytes());
            // slave + func + address2 + value2 + crc2
            (ResponseLayout::Echo, 8)
        }
        FunctionCode::WriteSingleRegister => {
            let value = match &request.data {
                RequestData::Registers(values) => values[0],
                _ => unreachable!("validated above"),
            };
            pdu.push(fc);
            pdu.extend_from_slice(&request.address.to_be_bytes());
            pdu.extend_from_slice(&value.to_be_bytes());
            (ResponseLayout::Echo, 8)
        }
        FunctionCode::WriteMultipleCoils => {
            let values = match &request.data {
                RequestData::Coils(values) => values,
                _ => unreachable!("validated above"),
            };
            let packed = data_utils::pack_bits(values);
            pdu.push(fc);
            pdu.extend_from_slice(&request.address.to_be_bytes());
            pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
            pdu.push(packed.len() as u8);
            pdu.extend_from_slice(&packed);
            // slave + func + address2 + quantity2 + crc2
            (ResponseLayout::Echo, 8)
        }
        FunctionCode::WriteMultipleRegisters => {
            let payload = match &request.data {
                RequestData::Registers(values) => data_utils::registers_to_bytes(values),
                RequestData::Raw(payload) => payload.clone(),
                _ => unreachable!("validated above"),
            };
            pdu.push(fc);
            pdu.extend_from_slice(&request.address.to_be_bytes());
            pdu.extend_from_slice(&((payload.len() / 2) as u16).to_be_bytes());
            pdu.push(payload.len() as u8);
            pdu.extend_from_slice(&payload);
            // The response is always the echoed address/quantity pair,
            // regardless of any custom request payload layout.
            (ResponseLayout::Echo, 8)
        }
        FunctionCode::ReadExceptionStatus => {
            pdu.push(fc);
            // slave + func + status + crc2
            (ResponseLayout::Bytes { count: 1 }, 5)
        }
        FunctionCode::Diagnostic => {
            pdu.push(fc);
            pdu.extend_from_slice(&request.address.to_be_bytes());
            let data_len = match &request.data {
                RequestData::Raw(data) => {
                    pdu.extend_from_slice(data);
                    data.len()
                }
                _ => 0,
            };
            (
                // Echoed sub-function plus data bytes.
                ResponseLayout::Bytes {
                    count: 2 + data_len,
                },
                // slave + func + subfunc2 + data + crc2
                data_len + 6,
            )
        }
        FunctionCode::ReadWriteMultipleRegisters => {
            let values = match &request.data {
                RequestData::Registers(values) => values,
                _ => unreachable!("validated above"),
            };
            pdu.push(fc);
            pdu.extend_from_slice(&request.address.to_be_bytes());
            pdu.extend_from_slice(&request.quantity.to_be_bytes());
            pdu.extend_from_slice(&request.write_address.to_be_bytes());
            pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
            pdu.push((2 * values.len()) as u8);
            pdu.extend_from_slice(&data_utils::registers_to_bytes(values));
            (
                ResponseLayout::Registers {
                    quantity: request.quantity,
                },
                2 * request.quantity as usize + 5,
            )
        }
    };

    Ok(EncodedRequest {
        pdu,
        layout,
        expected_length,
        reads_byte_count: request.function.is_read_function(),
    })
}

/// Decode a response PDU (function code plus body, framing already
/// stripped) into typed values.
///
/// `reads_byte_count` selects between the read-family body (byte-count
/// header plus data) and the write-family body (fixed fields after the
/// function code). `layout` is the decode rule, either the descriptor's
/// or a caller override.
pub fn decode_response(
    pdu: &[u8],
    reads_byte_count: bool,
    layout: ResponseLayout,
) -> ModbusResult<ResponseData> {
    if pdu.len() < 2 {
        return Err(ModbusError::invalid_response_frame(format!(
            "response PDU length {} is too short",
            pdu.len()
        )));
    }

    let function = pdu[0];
    if function & 0x80 != 0 {
        return Err(ModbusError::slave_exception(function & 0x7F, pdu[1]));
    }

    let data = if reads_byte_count {
        let byte_count = pdu[1] as usize;
        let data = &pdu[2..];
        if byte_count != data.len() {
            return Err(ModbusError::invalid_response_frame(format!(
                "byte count is {} while actual number of bytes is {}",
                byte_count,
                data.len()
            )));
        }
        data
    } else {
        &pdu[1..]
    };

    match layout {
        ResponseLayout::Bits { quantity } => {
            let needed = (quantity as usize + 7) / 8;
            if data.len() != needed {
                return Err(ModbusError::invalid_response_frame(format!(
                    "{} data bytes cannot hold {} bit values",
                    data.len(),
                    quantity
                )));
            }
            Ok(ResponseData::Bits(data_utils::unpack_bits(
                data,
                quantity as usize,
            )))
        }
        ResponseLayout::Registers { quantity } => {
            if data.len() != 2 * quantity as usize {
                return Err(ModbusError::invalid_response_frame(format!(
                    "{} data bytes cannot hold {} register values",
                    data.len(),
                    quantity
                )));
            }
            Ok(ResponseData::Registers(data_utils::bytes_to_registers(
                data,
            )?))
        }
        ResponseLayout::Bytes { count } => {
            if data.len() != count {
                return Err(ModbusError::invalid_response_frame(format!(
                    "expected {} data bytes, got {}",
                    count,
                    data.len()
                )));
            }
            Ok(ResponseData::Bytes(data.to_vec()))
        }
        ResponseLayout::Echo => {
            if data.len() != 4 {
                return Err(ModbusError::invalid_response_frame(format!(
                    "write echo must be 4 data bytes, got {}",
                    data.len()
                )));
            }
            Ok(ResponseData::Echo {
                address: u16::from_be_bytes([data[0], data[1]]),
                value: u16::from_be_bytes([data[2], data[3]]),
            })
        }
    }
}

/// Data conversion utilities shared by the codec and callers.
pub mod data_utils {
    use super::*;

    /// Convert register values to bytes (big-endian).
    pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(registers.len() * 2);
        for &register in registers {
            bytes.extend_from_slice(&register.to_be_bytes());
        }
        bytes
    }

    /// Convert bytes to register values (big-endian).
    pub fn bytes_to_registers(bytes: &[u8]) -> ModbusResult<Vec<u16>> {
        if bytes.len() % 2 != 0 {
            return Err(ModbusError::invalid_response_frame(
                "register data length must be even",
            ));
        }

        Ok(bytes
            .chunks(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect())
    }

    /// Pack boolean values into bytes, LSB first, zero-padding the final
    /// byte.
    pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
        let byte_count = (bits.len() + 7) / 8;
        let mut bytes = vec![0u8; byte_count];

        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }

        bytes
    }

    /// Unpack bytes into boolean values, LSB first, truncated to
    /// `bit_count` (pad bits in the final byte are discarded).
    pub fn unpack_bits(bytes: &[u8], bit_count: usize) -> Vec<bool> {
        let mut bits = Vec::with_capacity(bit_count);

        for i in 0..bit_count {
            let byte_index = i / 8;
            if byte_index < bytes.len() {
                bits.push((bytes[byte_index] & (1 << (i % 8))) != 0);
            } else {
                bits.push(false);
            }
        }

        bits
    }

    /// Convert u32 to two u16 registers (big-endian word order).
    pub fn u32_to_registers(value: u32) -> [u16; 2] {
        [(value >> 16) as u16, value as u16]
    }

    /// Convert two u16 registers to u32 (big-endian word order).
    pub fn registers_to_u32(registers: &[u16]) -> ModbusResult<u32> {
        if registers.len() < 2 {
            return Err(ModbusError::invalid_argument(
                "need at least 2 registers for u32",
            ));
        }
        Ok(((registers[0] as u32) << 16) | (registers[1] as u32))
    }

    /// Convert f32 to two u16 registers (IEEE 754, big-endian word order).
    pub fn f32_to_registers(value: f32) -> [u16; 2] {
        u32_to_registers(value.to_bits())
    }

    /// Convert two u16 registers to f32 (IEEE 754, big-endian word order).
    pub fn registers_to_f32(registers: &[u16]) -> ModbusResult<f32> {
        Ok(f32::from_bits(registers_to_u32(registers)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_conversion() {
        assert_eq!(
            FunctionCode::from_u8(0x03).unwrap(),
            FunctionCode::ReadHoldingRegisters
        );
        assert_eq!(FunctionCode::ReadHoldingRegisters.to_u8(), 0x03);
        assert_eq!(
            FunctionCode::from_u8(0x17).unwrap(),
            FunctionCode::ReadWriteMultipleRegisters
        );

        // Report slave id and device info are not in the descriptor table.
        assert_eq!(
            FunctionCode::from_u8(0x11),
            Err(ModbusError::unsupported_function(0x11))
        );
        assert_eq!(
            FunctionCode::from_u8(0x2B),
            Err(ModbusError::unsupported_function(0x2B))
        );
    }

    #[test]
    fn test_encode_read_holding_registers() {
        let request = MasterRequest::read(1, FunctionCode::ReadHoldingRegisters, 0, 10);
        let encoded = encode_request(&request).unwrap();

        assert_eq!(encoded.pdu, vec![0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(
            encoded.layout,
            ResponseLayout::Registers { quantity: 10 }
        );
        assert_eq!(encoded.expected_length, 25);
        assert!(encoded.reads_byte_count);
    }

    #[test]
    fn test_encode_read_coils_length() {
        let request = MasterRequest::read(1, FunctionCode::ReadCoils, 0x13, 0x25);
        let encoded = encode_request(&request).unwrap();

        assert_eq!(encoded.pdu, vec![0x01, 0x00, 0x13, 0x00, 0x25]);
        // ceil(37 / 8) = 5 data bytes, plus slave + func + count + crc2.
        assert_eq!(encoded.expected_length, 10);
        assert_eq!(encoded.layout, ResponseLayout::Bits { quantity: 0x25 });
    }

    #[test]
    fn test_encode_write_single_coil_sentinel() {
        let on = encode_request(&MasterRequest::write_single_coil(1, 0x00AC, true)).unwrap();
        assert_eq!(on.pdu, vec![0x05, 0x00, 0xAC, 0xFF, 0x00]);

        let off = encode_request(&MasterRequest::write_single_coil(1, 0x00AC, false)).unwrap();
        assert_eq!(off.pdu, vec![0x05, 0x00, 0xAC, 0x00, 0x00]);

        assert_eq!(on.layout, ResponseLayout::Echo);
        assert_eq!(on.expected_length, 8);
        assert!(!on.reads_byte_count);
    }

    #[test]
    fn test_encode_write_single_register() {
        let request = MasterRequest::write_single_register(0x11, 0x0001, 0x0003);
        let encoded = encode_request(&request).unwrap();
        assert_eq!(encoded.pdu, vec![0x06, 0x00, 0x01, 0x00, 0x03]);

        // A negative i16 cast to u16 encodes its two's-complement bytes.
        let request = MasterRequest::write_single_register(0x11, 0x0001, (-5i16) as u16);
        let encoded = encode_request(&request).unwrap();
        assert_eq!(encoded.pdu, vec![0x06, 0x00, 0x01, 0xFF, 0xFB]);
    }

    #[test]
    fn test_encode_write_multiple_coils_packing() {
        let values = vec![
            true, false, true, true, false, false, true, false, // 0x4D
            true, true, // 0x03 after padding
        ];
        let request = MasterRequest::write_multiple_coils(1, 0x0013, values);
        let encoded = encode_request(&request).unwrap();

        assert_eq!(
            encoded.pdu,
            vec![0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0x4D, 0x03]
        );
        assert_eq!(encoded.expected_length, 8);
    }

    #[test]
    fn test_encode_write_multiple_registers() {
        let request = MasterRequest::write_multiple_registers(1, 0x0001, vec![0x000A, 0x0102]);
        let encoded = encode_request(&request).unwrap();

        assert_eq!(
            encoded.pdu,
            vec![0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
        assert_eq!(encoded.layout, ResponseLayout::Echo);

        // A pre-packed payload produces the same wire bytes.
        let packed = MasterRequest::write_multiple_registers_packed(
            1,
            0x0001,
            vec![0x00, 0x0A, 0x01, 0x02],
        );
        assert_eq!(encode_request(&packed).unwrap().pdu, encoded.pdu);
    }

    #[test]
    fn test_encode_read_exception_status() {
        let encoded =
            encode_request(&MasterRequest::read_exception_status(1)).unwrap();
        assert_eq!(encoded.pdu, vec![0x07]);
        assert_eq!(encoded.layout, ResponseLayout::Bytes { count: 1 });
        assert_eq!(encoded.expected_length, 5);
    }

    #[test]
    fn test_encode_diagnostic() {
        let encoded =
            encode_request(&MasterRequest::diagnostic(1, 0x0000, vec![0xA5, 0x37])).unwrap();
        assert_eq!(encoded.pdu, vec![0x08, 0x00, 0x00, 0xA5, 0x37]);
        assert_eq!(encoded.layout, ResponseLayout::Bytes { count: 4 });
        assert_eq!(encoded.expected_length, 8);

        let empty = encode_request(&MasterRequest::diagnostic(1, 0x000A, vec![])).unwrap();
        assert_eq!(empty.pdu, vec![0x08, 0x00, 0x0A]);
        assert_eq!(empty.expected_length, 6);
    }

    #[test]
    fn test_encode_read_write_multiple_registers() {
        let request = MasterRequest::read_write_multiple_registers(
            1,
            0x0003,
            6,
            0x000E,
            vec![0x00FF, 0x00FF, 0x00FF],
        );
        let encoded = encode_request(&request).unwrap();

        assert_eq!(
            encoded.pdu,
            vec![
                0x17, 0x00, 0x03, 0x00, 0x06, 0x00, 0x0E, 0x00, 0x03, 0x06, 0x00, 0xFF, 0x00,
                0xFF, 0x00, 0xFF
            ]
        );
        assert_eq!(encoded.layout, ResponseLayout::Registers { quantity: 6 });
        assert_eq!(encoded.expected_length, 17);
        assert!(encoded.reads_byte_count);
    }

    #[test]
    fn test_validation_rejects_bad_quantities() {
        let zero = MasterRequest::read(1, FunctionCode::ReadHoldingRegisters, 0, 0);
        assert!(matches!(
            encode_request(&zero),
            Err(ModbusError::InvalidArgument { .. })
        ));

        let too_many = MasterRequest::read(1, FunctionCode::ReadHoldingRegisters, 0, 126);
        assert!(encode_request(&too_many).is_err());

        let too_many_bits = MasterRequest::read(1, FunctionCode::ReadCoils, 0, 2001);
        assert!(encode_request(&too_many_bits).is_err());

        let no_coils = MasterRequest::write_multiple_coils(1, 0, vec![]);
        assert!(encode_request(&no_coils).is_err());

        let odd_payload =
            MasterRequest::write_multiple_registers_packed(1, 0, vec![0x01, 0x02, 0x03]);
        assert!(matches!(
            encode_request(&odd_payload),
            Err(ModbusError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_decode_register_response() {
        // fc + byte count + 4 data bytes
        let pdu = vec![0x03, 0x04, 0x12, 0x34, 0x56, 0x78];
        let decoded =
            decode_response(&pdu, true, ResponseLayout::Registers { quantity: 2 }).unwrap();
        assert_eq!(
            decoded,
            ResponseData::Registers(vec![0x1234, 0x5678])
        );
    }

    #[test]
    fn test_decode_bit_response_truncates_padding() {
        let pdu = vec![0x01, 0x02, 0b1010_1010, 0b0000_0011];
        let decoded = decode_response(&pdu, true, ResponseLayout::Bits { quantity: 10 }).unwrap();

        let bits = decoded.into_bits().unwrap();
        assert_eq!(bits.len(), 10);
        assert_eq!(
            bits,
            vec![false, true, false, true, false, true, false, true, true, true]
        );
    }

    #[test]
    fn test_decode_byte_count_mismatch() {
        // Declared 4 bytes but only 2 present.
        let pdu = vec![0x03, 0x04, 0x12, 0x34];
        let err = decode_response(&pdu, true, ResponseLayout::Registers { quantity: 2 })
            .unwrap_err();
        assert!(matches!(err, ModbusError::InvalidResponseFrame { .. }));
    }

    #[test]
    fn test_decode_slave_exception() {
        let pdu = vec![0x83, 0x02];
        let err =
            decode_response(&pdu, true, ResponseLayout::Registers { quantity: 1 }).unwrap_err();
        assert_eq!(err, ModbusError::slave_exception(0x03, 0x02));
    }

    #[test]
    fn test_decode_write_echo() {
        let pdu = vec![0x10, 0x00, 0x01, 0x00, 0x02];
        let decoded = decode_response(&pdu, false, ResponseLayout::Echo).unwrap();
        assert_eq!(decoded.clone().into_echo().unwrap(), (0x0001, 0x0002));

        // A mismatched extraction is refused rather than coerced.
        assert!(decoded.into_registers().is_err());
    }

    #[test]
    fn test_decode_short_pdu() {
        let err = decode_response(&[0x03], true, ResponseLayout::Echo).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidResponseFrame { .. }));
    }

    #[test]
    fn test_bit_pack_round_trip() {
        for count in [1usize, 7, 8, 9, 16] {
            let bits: Vec<bool> = (0..count).map(|i| i % 3 == 0).collect();
            let packed = data_utils::pack_bits(&bits);
            assert_eq!(packed.len(), (count + 7) / 8);
            assert_eq!(data_utils::unpack_bits(&packed, count), bits);
        }
    }

    #[test]
    fn test_data_utils() {
        let registers = vec![0x1234, 0x5678];
        let bytes = data_utils::registers_to_bytes(&registers);
        assert_eq!(bytes, vec![0x12, 0x34, 0x56, 0x78]);
        assert_eq!(data_utils::bytes_to_registers(&bytes).unwrap(), registers);
        assert!(data_utils::bytes_to_registers(&bytes[..3]).is_err());

        assert_eq!(data_utils::u32_to_registers(0x12345678), [0x1234, 0x5678]);
        assert_eq!(
            data_utils::registers_to_u32(&[0x1234, 0x5678]).unwrap(),
            0x12345678
        );

        let registers = data_utils::f32_to_registers(1.5);
        assert_eq!(data_utils::registers_to_f32(&registers).unwrap(), 1.5);
    }
}
