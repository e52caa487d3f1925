//! Slave side of the RTU frame engine.
//!
//! [`process`] takes one received frame and decides what goes back on the
//! wire. Register memory is reached only through an injected
//! [`RegisterAccess`] capability, so the engine itself owns no device state.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::core::{
    be_u16, swap_pairs, ByteOrder, Crc16, ExceptionCode, FunctionCode, BROADCAST_ADDRESS,
    EXCEPTION_FLAG, MAX_REGISTERS,
};
use crate::frame::{validate_request, verify_crc, FIXED_FRAME_LEN};
use crate::FrameError;

/// Capability giving the processor access to the device's register memory.
///
/// `offset` is a register index into the device's address space. Buffers
/// hold `count * 2` bytes in the device's native value order. Any `Err`
/// is forwarded verbatim as the exception code of the reply.
pub trait RegisterAccess {
    fn read(&mut self, dest: &mut [u8], offset: u16, count: u16) -> Result<(), ExceptionCode>;

    fn write(&mut self, offset: u16, src: &[u8], count: u16) -> Result<(), ExceptionCode>;
}

/// Per-call slave configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveConfig {
    pub address: u8,
    pub total_registers: u16,
    pub byte_order: ByteOrder,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            address: 1,
            total_registers: MAX_REGISTERS,
            byte_order: ByteOrder::LowHigh,
        }
    }
}

impl SlaveConfig {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    pub fn with_total_registers(mut self, total_registers: u16) -> Self {
        self.total_registers = total_registers;
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }
}

/// Why a request produced nothing to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Silence {
    /// Frame failed length or checksum validation.
    Malformed(FrameError),
    /// Frame addressed to another device.
    NotAddressed { target: u8 },
    /// Broadcast requests are executed but never answered.
    Broadcast,
}

/// Outcome of [`process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Frame(Vec<u8>),
    Silent(Silence),
}

impl Reply {
    pub fn is_silent(&self) -> bool {
        matches!(self, Reply::Silent(_))
    }

    pub fn frame(&self) -> Option<&[u8]> {
        match self {
            Reply::Frame(frame) => Some(frame.as_slice()),
            Reply::Silent(_) => None,
        }
    }

    pub fn into_frame(self) -> Option<Vec<u8>> {
        match self {
            Reply::Frame(frame) => Some(frame),
            Reply::Silent(_) => None,
        }
    }
}

/// Builds a 5-byte exception frame: address, `function | 0x80`, code, CRC.
pub fn exception_frame(address: u8, function: u8, code: ExceptionCode) -> Vec<u8> {
    let mut frame = Vec::with_capacity(5);
    frame.push(address);
    frame.push(function | EXCEPTION_FLAG);
    frame.push(code.code());
    Crc16::append(&mut frame);
    frame
}

fn exception_reply(address: u8, function: u8, code: ExceptionCode) -> Reply {
    debug!(address, function, code = code.code(), "replying with exception frame");
    Reply::Frame(exception_frame(address, function, code))
}

/// Rewrites the trailing checksum of a fully assembled response.
fn seal(mut frame: Vec<u8>) -> Vec<u8> {
    let body = frame.len() - 2;
    let crc = Crc16::compute(&frame[..body]);
    frame[body..].copy_from_slice(&crc.to_le_bytes());
    frame
}

/// Echo of the first six request bytes with a fresh checksum.
fn echo_header(frame: &[u8]) -> Vec<u8> {
    let mut reply = vec![0u8; FIXED_FRAME_LEN];
    reply[..6].copy_from_slice(&frame[..6]);
    seal(reply)
}

/// Frames with a valid checksum but an unsupported function still get an
/// IllegalFunction reply; everything else that fails validation is dropped.
fn admit(frame: &[u8]) -> Result<Option<FunctionCode>, FrameError> {
    match validate_request(frame) {
        Ok(()) => Ok(FunctionCode::from_u8(frame[1])),
        Err(FrameError::UnsupportedFunction(_)) if frame.len() >= 4 => {
            verify_crc(frame)?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Processes one request frame received by the slave described by `config`.
pub fn process<A>(frame: &[u8], config: &SlaveConfig, registers: &mut A) -> Reply
where
    A: RegisterAccess + ?Sized,
{
    let function = match admit(frame) {
        Ok(function) => function,
        Err(e) => {
            debug!(len = frame.len(), error = %e, "dropping malformed request");
            return Reply::Silent(Silence::Malformed(e));
        }
    };

    let address = frame[0];
    if address != config.address && address != BROADCAST_ADDRESS {
        trace!(target_address = address, "request for another device");
        return Reply::Silent(Silence::NotAddressed { target: address });
    }
    let broadcast = address == BROADCAST_ADDRESS;

    let Some(function) = function else {
        return exception_reply(address, frame[1], ExceptionCode::IllegalFunction);
    };

    let start = be_u16(frame, 2);
    let span = match function {
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            Some(be_u16(frame, 4))
        }
        // Bounded by the raw byte count, not the register count.
        FunctionCode::WriteMultipleRegisters => Some(frame[6] as u16),
        FunctionCode::WriteSingleRegister => None,
    };
    if let Some(count) =
        span.filter(|&count| start as u32 + count as u32 > config.total_registers as u32)
    {
        if broadcast {
            debug!(start, count, "broadcast request out of range");
            return Reply::Silent(Silence::Broadcast);
        }
        return exception_reply(address, function.code(), ExceptionCode::IllegalDataAddress);
    }

    let outcome = match function {
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            read_registers(frame, function, config.byte_order, registers, broadcast)
        }
        FunctionCode::WriteSingleRegister => {
            write_single(frame, config.byte_order, registers, broadcast)
        }
        FunctionCode::WriteMultipleRegisters => {
            write_multiple(frame, config.byte_order, registers, broadcast)
        }
    };

    match outcome {
        Ok(reply) => reply,
        Err(code) => {
            warn!(function = function.code(), code = code.code(), "register access failed");
            exception_reply(address, function.code(), code)
        }
    }
}

fn read_registers<A>(
    frame: &[u8],
    function: FunctionCode,
    order: ByteOrder,
    registers: &mut A,
    broadcast: bool,
) -> Result<Reply, ExceptionCode>
where
    A: RegisterAccess + ?Sized,
{
    if broadcast {
        debug!("ignoring broadcast read");
        return Ok(Reply::Silent(Silence::Broadcast));
    }

    let start = be_u16(frame, 2);
    let count = be_u16(frame, 4);
    let payload_len = count as usize * 2;

    let mut reply = vec![0u8; 5 + payload_len];
    let payload = 3..3 + payload_len;
    registers.read(&mut reply[payload.clone()], start, count)?;
    if order == ByteOrder::HighLow {
        swap_pairs(&mut reply[payload]);
    }

    reply[0] = frame[0];
    reply[1] = function.code();
    // Byte count is a single byte on the wire.
    reply[2] = payload_len as u8;
    Ok(Reply::Frame(seal(reply)))
}

fn write_single<A>(
    frame: &[u8],
    order: ByteOrder,
    registers: &mut A,
    broadcast: bool,
) -> Result<Reply, ExceptionCode>
where
    A: RegisterAccess + ?Sized,
{
    let register = be_u16(frame, 2);
    let mut value = [frame[4], frame[5]];
    if order == ByteOrder::HighLow {
        value.swap(0, 1);
    }

    // No range check here: the capability owns bounds for single writes.
    let result = registers.write(register, &value, 1);
    if broadcast {
        debug!(register, "broadcast single write executed");
        return Ok(Reply::Silent(Silence::Broadcast));
    }
    result?;

    Ok(Reply::Frame(echo_header(frame)))
}

fn write_multiple<A>(
    frame: &[u8],
    order: ByteOrder,
    registers: &mut A,
    broadcast: bool,
) -> Result<Reply, ExceptionCode>
where
    A: RegisterAccess + ?Sized,
{
    let start = be_u16(frame, 2);
    let byte_count = frame[6] as usize;
    let mut payload = frame[7..7 + byte_count].to_vec();
    if order == ByteOrder::HighLow {
        swap_pairs(&mut payload);
    }

    let result = registers.write(start, &payload, (byte_count / 2) as u16);
    if broadcast {
        debug!(start, byte_count, "broadcast multiple write executed");
        return Ok(Reply::Silent(Silence::Broadcast));
    }
    result?;

    Ok(Reply::Frame(echo_header(frame)))
}

/// In-memory register store. Registers are two bytes each, kept low byte first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBank {
    memory: Vec<u8>,
}

impl RegisterBank {
    pub fn new(registers: u16) -> Self {
        Self {
            memory: vec![0; registers as usize * 2],
        }
    }

    /// Number of registers in the bank.
    pub fn len(&self) -> u16 {
        (self.memory.len() / 2) as u16
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn register(&self, index: u16) -> Option<u16> {
        let at = index as usize * 2;
        let bytes = self.memory.get(at..at + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Device-side update that bypasses the protocol.
    pub fn write_registers(&mut self, offset: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        let count = u16::try_from(values.len()).map_err(|_| ExceptionCode::IllegalDataAddress)?;
        let range = self.span(offset, count)?;
        for (chunk, value) in self.memory[range].chunks_exact_mut(2).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    fn span(&self, offset: u16, count: u16) -> Result<Range<usize>, ExceptionCode> {
        let start = offset as usize * 2;
        let end = start + count as usize * 2;
        if end > self.memory.len() {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok(start..end)
    }
}

impl RegisterAccess for RegisterBank {
    fn read(&mut self, dest: &mut [u8], offset: u16, count: u16) -> Result<(), ExceptionCode> {
        let range = self.span(offset, count)?;
        let dest = dest
            .get_mut(..range.len())
            .ok_or(ExceptionCode::SlaveDeviceFailure)?;
        dest.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn write(&mut self, offset: u16, src: &[u8], count: u16) -> Result<(), ExceptionCode> {
        let range = self.span(offset, count)?;
        let src = src.get(..range.len()).ok_or(ExceptionCode::IllegalDataValue)?;
        self.memory[range].copy_from_slice(src);
        Ok(())
    }
}
