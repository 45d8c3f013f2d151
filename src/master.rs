//! The Modbus RTU transaction executor (master role).
//!
//! [`RtuMaster`] owns one serial transport and one optional line-control
//! surface and drives a single request/response cycle per call: build the
//! PDU, frame it, transmit, optionally receive, validate, decode. The bus
//! is half-duplex, so no two transactions may be in flight concurrently
//! against one master; callers needing concurrency serialize above this
//! layer.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rtu_master::{RtuMaster, SerialPortTransport};
//! use rtu_master::transport::LinePhase;
//!
//! #[tokio::main]
//! async fn main() -> rtu_master::ModbusResult<()> {
//!     let transport = SerialPortTransport::new("/dev/ttyUSB0", 19200)?;
//!
//!     // Toggle an RS-485 driver-enable pin around the transmit window.
//!     let mut master = RtuMaster::with_line_control(
//!         transport,
//!         Box::new(|phase| match phase {
//!             LinePhase::TransmitBegin => { /* DE high */ }
//!             _ => { /* DE low: bus released for the reply */ }
//!         }),
//!     );
//!
//!     let values = master.read_holding_registers(1, 0x0000, 10).await?;
//!     println!("registers: {:?}", values);
//!
//!     master.close().await
//! }
//! ```

use tracing::info;

use crate::error::ModbusResult;
use crate::frame::RtuFramer;
use crate::hooks::MasterHooks;
use crate::protocol::{
    self, FunctionCode, MasterRequest, ResponseData, SlaveId, BROADCAST_ADDRESS,
};
use crate::transport::{LineControl, LinePhase, SerialTransport};

/// Format raw bytes as a hex string for packet logging.
fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log a frame with direction and target slave.
fn log_packet(direction: &str, data: &[u8], slave: SlaveId) {
    info!(
        "[MODBUS-RTU] {} slave:{} {}",
        direction,
        slave,
        format_hex_packet(data)
    );
}

/// Counters for one master's transaction history.
#[derive(Debug, Clone, Default)]
pub struct MasterStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Modbus RTU master over a [`SerialTransport`].
///
/// Long-lived: the owning application keeps one instance per bus for the
/// device's operating lifetime. Each [`execute`](Self::execute) call runs
/// one complete transaction and returns only on completion or failure;
/// there is no internal retry.
pub struct RtuMaster<T: SerialTransport> {
    transport: T,
    hooks: MasterHooks,
    line_control: Option<LineControl>,
    /// Some RS-485 adapters echo transmitted bytes back before the
    /// response; when set, exactly the request's length is read back and
    /// discarded after each transmit.
    handle_local_echo: bool,
    packet_logging: bool,
    stats: MasterStats,
}

impl<T: SerialTransport> RtuMaster<T> {
    /// Create a master with no line control.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            hooks: MasterHooks::new(),
            line_control: None,
            handle_local_echo: false,
            packet_logging: false,
            stats: MasterStats::default(),
        }
    }

    /// Create a master whose transmit/receive windows are bracketed by
    /// the given line-control callback.
    pub fn with_line_control(transport: T, line_control: LineControl) -> Self {
        Self {
            line_control: Some(line_control),
            ..Self::new(transport)
        }
    }

    /// Replace or remove the line-control callback.
    pub fn set_line_control(&mut self, line_control: Option<LineControl>) {
        self.line_control = line_control;
    }

    /// Enable or disable local-echo discarding.
    pub fn set_handle_local_echo(&mut self, enabled: bool) {
        self.handle_local_echo = enabled;
    }

    /// Enable or disable hex packet logging.
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    /// The master's extension points.
    pub fn hooks_mut(&mut self) -> &mut MasterHooks {
        &mut self.hooks
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get transaction statistics.
    pub fn stats(&self) -> MasterStats {
        self.stats.clone()
    }

    /// Close the underlying transport.
    pub async fn close(&mut self) -> ModbusResult<()> {
        self.transport.close().await
    }

    /// Execute one Modbus transaction.
    ///
    /// Returns the decoded response values, or `None` when the request
    /// was a broadcast (slave 0), for which no response is awaited.
    pub async fn execute(&mut self, request: &MasterRequest) -> ModbusResult<Option<ResponseData>> {
        match self.run_transaction(request).await {
            Ok(result) => Ok(result),
            Err(error) => {
                self.stats.errors += 1;
                Err(error)
            }
        }
    }

    async fn run_transaction(
        &mut self,
        request: &MasterRequest,
    ) -> ModbusResult<Option<ResponseData>> {
        let encoded = protocol::encode_request(request)?;
        // A custom layout replaces the computed decode rule but never the
        // computed expected length.
        let layout = request.response_layout.unwrap_or(encoded.layout);
        let expected_length = request.expected_length.unwrap_or(encoded.expected_length);

        let mut framer = RtuFramer::new();
        let mut frame = framer.build_request(&encoded.pdu, request.slave)?;

        if let Some(replacement) = self.hooks.run_before_send(&frame) {
            frame = replacement;
        }

        // Leftover noise from a previous failed cycle would corrupt the
        // upcoming read.
        self.drain_stale_bytes().await?;

        if self.packet_logging {
            log_packet("send", &frame, request.slave);
        }

        self.signal_line(LinePhase::TransmitBegin);
        let write_result = self.transport.write(&frame).await;
        self.signal_line(LinePhase::TransmitEnd);
        write_result?;

        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;

        self.hooks.run_after_send();

        if self.handle_local_echo {
            self.discard_local_echo(frame.len()).await?;
        }

        if request.slave == BROADCAST_ADDRESS {
            return Ok(None);
        }

        let mut response = self.receive_frame(expected_length).await?;

        if let Some(replacement) = self.hooks.run_after_receive(&response) {
            response = replacement;
        }

        if self.packet_logging {
            log_packet("receive", &response, request.slave);
        }

        self.stats.responses_received += 1;
        self.stats.bytes_received += response.len() as u64;

        let pdu = framer.parse_response(&response)?;
        let decoded = protocol::decode_response(&pdu, encoded.reads_byte_count, layout)?;

        Ok(Some(decoded))
    }

    /// Throw away any bytes already waiting on the transport.
    async fn drain_stale_bytes(&mut self) -> ModbusResult<()> {
        loop {
            let pending = self.transport.pending();
            if pending == 0 {
                return Ok(());
            }
            if self.transport.read(pending).await?.is_empty() {
                return Ok(());
            }
        }
    }

    /// Read back and discard the transmitted frame's echo.
    async fn discard_local_echo(&mut self, echo_length: usize) -> ModbusResult<()> {
        self.signal_line(LinePhase::ReceiveBegin);
        let result = self.read_until(echo_length).await;
        self.signal_line(LinePhase::ReceiveEnd);
        result.map(|_| ())
    }

    /// Read the response, bracketed by the receive line phases.
    async fn receive_frame(&mut self, expected_length: usize) -> ModbusResult<Vec<u8>> {
        self.signal_line(LinePhase::ReceiveBegin);
        let result = self.read_until(expected_length).await;
        self.signal_line(LinePhase::ReceiveEnd);
        result
    }

    /// Accumulate bytes until `expected_length` is reached or the
    /// transport yields no further bytes, whichever comes first.
    async fn read_until(&mut self, expected_length: usize) -> ModbusResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity(expected_length);
        while buffer.len() < expected_length {
            let chunk = self.transport.read(expected_length - buffer.len()).await?;
            if chunk.is_empty() {
                break;
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer)
    }

    fn signal_line(&mut self, phase: LinePhase) {
        if let Some(callback) = self.line_control.as_mut() {
            callback(phase);
        }
    }

    // Typed operations over `execute`, one per supported function code.

    /// Read coils (function code 0x01).
    pub async fn read_coils(
        &mut self,
        slave: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>> {
        let request = MasterRequest::read(slave, FunctionCode::ReadCoils, address, quantity);
        match self.execute(&request).await? {
            Some(data) => data.into_bits(),
            None => Ok(Vec::new()),
        }
    }

    /// Read discrete inputs (function code 0x02).
    pub async fn read_discrete_inputs(
        &mut self,
        slave: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>> {
        let request =
            MasterRequest::read(slave, FunctionCode::ReadDiscreteInputs, address, quantity);
        match self.execute(&request).await? {
            Some(data) => data.into_bits(),
            None => Ok(Vec::new()),
        }
    }

    /// Read holding registers (function code 0x03).
    pub async fn read_holding_registers(
        &mut self,
        slave: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        let request =
            MasterRequest::read(slave, FunctionCode::ReadHoldingRegisters, address, quantity);
        match self.execute(&request).await? {
            Some(data) => data.into_registers(),
            None => Ok(Vec::new()),
        }
    }

    /// Read input registers (function code 0x04).
    pub async fn read_input_registers(
        &mut self,
        slave: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        let request =
            MasterRequest::read(slave, FunctionCode::ReadInputRegisters, address, quantity);
        match self.execute(&request).await? {
            Some(data) => data.into_registers(),
            None => Ok(Vec::new()),
        }
    }

    /// Write a single coil (function code 0x05).
    pub async fn write_single_coil(
        &mut self,
        slave: SlaveId,
        address: u16,
        value: bool,
    ) -> ModbusResult<()> {
        let request = MasterRequest::write_single_coil(slave, address, value);
        self.execute(&request).await?;
        Ok(())
    }

    /// Write a single register (function code 0x06).
    pub async fn write_single_register(
        &mut self,
        slave: SlaveId,
        address: u16,
        value: u16,
    ) -> ModbusResult<()> {
        let request = MasterRequest::write_single_register(slave, address, value);
        self.execute(&request).await?;
        Ok(())
    }

    /// Read the exception status byte (function code 0x07).
    pub async fn read_exception_status(&mut self, slave: SlaveId) -> ModbusResult<u8> {
        let request = MasterRequest::read_exception_status(slave);
        match self.execute(&request).await? {
            Some(data) => Ok(data.into_bytes()?[0]),
            None => Ok(0),
        }
    }

    /// Run a diagnostic sub-function (function code 0x08). Returns the
    /// raw response bytes: the echoed sub-function followed by its data.
    pub async fn diagnostic(
        &mut self,
        slave: SlaveId,
        sub_function: u16,
        data: Vec<u8>,
    ) -> ModbusResult<Vec<u8>> {
        let request = MasterRequest::diagnostic(slave, sub_function, data);
        match self.execute(&request).await? {
            Some(data) => data.into_bytes(),
            None => Ok(Vec::new()),
        }
    }

    /// Write multiple coils (function code 0x0F).
    pub async fn write_multiple_coils(
        &mut self,
        slave: SlaveId,
        address: u16,
        values: &[bool],
    ) -> ModbusResult<()> {
        let request = MasterRequest::write_multiple_coils(slave, address, values.to_vec());
        self.execute(&request).await?;
        Ok(())
    }

    /// Write multiple registers (function code 0x10).
    pub async fn write_multiple_registers(
        &mut self,
        slave: SlaveId,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        let request = MasterRequest::write_multiple_registers(slave, address, values.to_vec());
        self.execute(&request).await?;
        Ok(())
    }

    /// Combined read/write of multiple registers (function code 0x17).
    /// The write is applied before the read on the device; the returned
    /// values are the read registers.
    pub async fn read_write_multiple_registers(
        &mut self,
        slave: SlaveId,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        values: &[u16],
    ) -> ModbusResult<Vec<u16>> {
        let request = MasterRequest::read_write_multiple_registers(
            slave,
            read_address,
            read_quantity,
            write_address,
            values.to_vec(),
        );
        match self.execute(&request).await? {
            Some(data) => data.into_registers(),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModbusError;
    use crate::frame::crc16;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted transport: records writes, serves reads from queued
    /// chunks, and reports queued stale bytes through `pending`.
    #[derive(Default)]
    struct MockTransport {
        written: Vec<Vec<u8>>,
        reads: VecDeque<Vec<u8>>,
        stale: Vec<u8>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self::default()
        }

        fn queue_read(&mut self, chunk: Vec<u8>) {
            self.reads.push_back(chunk);
        }
    }

    #[async_trait]
    impl SerialTransport for MockTransport {
        async fn write(&mut self, bytes: &[u8]) -> ModbusResult<()> {
            self.written.push(bytes.to_vec());
            Ok(())
        }

        async fn read(&mut self, max_bytes: usize) -> ModbusResult<Vec<u8>> {
            if !self.stale.is_empty() {
                let take = max_bytes.min(self.stale.len());
                return Ok(self.stale.drain(..take).collect());
            }
            match self.reads.pop_front() {
                Some(mut chunk) => {
                    if chunk.len() > max_bytes {
                        let rest = chunk.split_off(max_bytes);
                        self.reads.push_front(rest);
                    }
                    Ok(chunk)
                }
                None => Ok(Vec::new()),
            }
        }

        fn pending(&self) -> usize {
            self.stale.len()
        }

        async fn close(&mut self) -> ModbusResult<()> {
            Ok(())
        }
    }

    /// Frame a response PDU as a slave would put it on the wire.
    fn wire_frame(slave: SlaveId, pdu: &[u8]) -> Vec<u8> {
        let mut frame = vec![slave];
        frame.extend_from_slice(pdu);
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    #[tokio::test]
    async fn test_broadcast_returns_without_reading() {
        let master_transport = MockTransport::new();
        let phases = Arc::new(Mutex::new(Vec::new()));
        let recorder = phases.clone();

        let mut master = RtuMaster::with_line_control(
            master_transport,
            Box::new(move |phase| recorder.lock().unwrap().push(phase)),
        );

        let result = master.execute(&MasterRequest::write_single_coil(0, 0x0001, true)).await;
        assert_eq!(result.unwrap(), None);

        // One frame written, nothing read, no receive bracket entered.
        assert_eq!(master.transport().written.len(), 1);
        assert_eq!(
            *phases.lock().unwrap(),
            vec![LinePhase::TransmitBegin, LinePhase::TransmitEnd]
        );
    }

    #[tokio::test]
    async fn test_line_phases_bracket_transmit_and_receive() {
        let mut transport = MockTransport::new();
        transport.queue_read(wire_frame(1, &[0x06, 0x00, 0x01, 0x00, 0x03]));

        let phases = Arc::new(Mutex::new(Vec::new()));
        let recorder = phases.clone();
        let mut master = RtuMaster::with_line_control(
            transport,
            Box::new(move |phase| recorder.lock().unwrap().push(phase)),
        );

        master.write_single_register(1, 0x0001, 0x0003).await.unwrap();

        assert_eq!(
            *phases.lock().unwrap(),
            vec![
                LinePhase::TransmitBegin,
                LinePhase::TransmitEnd,
                LinePhase::ReceiveBegin,
                LinePhase::ReceiveEnd,
            ]
        );
    }

    #[tokio::test]
    async fn test_local_echo_is_discarded() {
        let request_frame = wire_frame(1, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        let response = wire_frame(1, &[0x03, 0x02, 0x12, 0x34]);

        let mut transport = MockTransport::new();
        transport.queue_read(request_frame);
        transport.queue_read(response);

        let mut master = RtuMaster::new(transport);
        master.set_handle_local_echo(true);

        let values = master.read_holding_registers(1, 0, 1).await.unwrap();
        assert_eq!(values, vec![0x1234]);
    }

    #[tokio::test]
    async fn test_stale_bytes_are_drained_before_transmit() {
        let mut transport = MockTransport::new();
        transport.stale = vec![0xDE, 0xAD, 0xBE, 0xEF];
        transport.queue_read(wire_frame(1, &[0x03, 0x02, 0x00, 0x2A]));

        let mut master = RtuMaster::new(transport);
        let values = master.read_holding_registers(1, 0, 1).await.unwrap();

        assert_eq!(values, vec![0x002A]);
        assert!(master.transport().stale.is_empty());
    }

    #[tokio::test]
    async fn test_before_send_hook_replaces_frame() {
        let replacement = wire_frame(1, &[0x03, 0x00, 0x10, 0x00, 0x01]);
        let expected = replacement.clone();

        let mut transport = MockTransport::new();
        transport.queue_read(wire_frame(1, &[0x03, 0x02, 0x00, 0x01]));

        let mut master = RtuMaster::new(transport);
        master
            .hooks_mut()
            .on_before_send(move |_| Some(replacement.clone()));

        master.read_holding_registers(1, 0, 1).await.unwrap();
        assert_eq!(master.transport().written[0], expected);
    }

    #[tokio::test]
    async fn test_after_receive_hook_replaces_response() {
        let mut transport = MockTransport::new();
        // The wire carries garbage; the hook substitutes a valid frame.
        transport.queue_read(vec![0xFF; 7]);

        let mut master = RtuMaster::new(transport);
        master
            .hooks_mut()
            .on_after_receive(|_| Some(wire_frame(1, &[0x03, 0x02, 0xAB, 0xCD])));

        let values = master.read_holding_registers(1, 0, 1).await.unwrap();
        assert_eq!(values, vec![0xABCD]);
    }

    #[tokio::test]
    async fn test_partial_reads_accumulate_to_expected_length() {
        let response = wire_frame(1, &[0x03, 0x04, 0x00, 0x01, 0x00, 0x02]);
        let (head, tail) = response.split_at(3);

        let mut transport = MockTransport::new();
        transport.queue_read(head.to_vec());
        transport.queue_read(tail.to_vec());

        let mut master = RtuMaster::new(transport);
        let values = master.read_holding_registers(1, 0, 2).await.unwrap();
        assert_eq!(values, vec![0x0001, 0x0002]);
    }

    #[tokio::test]
    async fn test_absent_response_is_an_invalid_frame() {
        let transport = MockTransport::new();
        let mut master = RtuMaster::new(transport);

        let err = master.read_holding_registers(1, 0, 1).await.unwrap_err();
        assert!(matches!(err, ModbusError::InvalidResponseFrame { .. }));
        assert_eq!(master.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_stats_track_transactions() {
        let mut transport = MockTransport::new();
        transport.queue_read(wire_frame(1, &[0x03, 0x02, 0x00, 0x07]));

        let mut master = RtuMaster::new(transport);
        master.read_holding_registers(1, 0, 1).await.unwrap();

        let stats = master.stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.responses_received, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.bytes_sent, 8);
        assert_eq!(stats.bytes_received, 7);
    }
}
