use std::fmt;

use serde::{Deserialize, Serialize};

/// Bit set in the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Reserved device address: accepted by every slave, never answered.
pub const BROADCAST_ADDRESS: u8 = 0;

/// Default register extent of a slave (maximum representable).
pub const MAX_REGISTERS: u16 = 0xFFFF;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleRegister,
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x04 => Some(FunctionCode::ReadInputRegisters),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x10 => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::WriteMultipleRegisters => 0x10,
        }
    }

    /// Function code as it appears in an exception response.
    pub fn exception_code(self) -> u8 {
        self.code() | EXCEPTION_FLAG
    }

    pub fn is_read(self) -> bool {
        matches!(
            self,
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters
        )
    }
}

/// Error code carried in the third byte of an exception frame.
///
/// Codes outside the known set are kept as `Other` and transmitted verbatim.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Acknowledge,
    SlaveDeviceBusy,
    MemoryParityError,
    Other(u8),
}

impl ExceptionCode {
    pub fn code(self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::SlaveDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::SlaveDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::Other(code) => code,
        }
    }

    /// Human readable message for display.
    pub fn message(self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::SlaveDeviceFailure => "slave device failure",
            ExceptionCode::Acknowledge => "acknowledge, request accepted and in progress",
            ExceptionCode::SlaveDeviceBusy => "slave device busy with a previous request",
            ExceptionCode::MemoryParityError => "memory parity error",
            ExceptionCode::Other(0x00) => "no error",
            ExceptionCode::Other(_) => "unknown error",
        }
    }
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::SlaveDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::SlaveDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            other => ExceptionCode::Other(other),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {:#04x})", self.message(), self.code())
    }
}

/// Serialization order of 16-bit register values inside frame payloads.
///
/// Never applies to addresses or counts, which are always big-endian.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    LowHigh,
    HighLow,
}

impl ByteOrder {
    pub fn encode(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::LowHigh => value.to_le_bytes(),
            ByteOrder::HighLow => value.to_be_bytes(),
        }
    }

    pub fn decode(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::LowHigh => u16::from_le_bytes(bytes),
            ByteOrder::HighLow => u16::from_be_bytes(bytes),
        }
    }
}

/// Swaps every adjacent pair of bytes in place. A trailing odd byte is left alone.
pub fn swap_pairs(buf: &mut [u8]) {
    for pair in buf.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

pub(crate) fn be_u16(frame: &[u8], at: usize) -> u16 {
    ((frame[at] as u16) << 8) | frame[at + 1] as u16
}

/// Modbus CRC16 (reflected polynomial 0xA001, initial value 0xFFFF).
pub struct Crc16;

impl Crc16 {
    const INIT: u16 = 0xFFFF;
    const POLY: u16 = 0xA001;

    pub fn compute(data: &[u8]) -> u16 {
        let mut crc = Self::INIT;
        for &byte in data {
            crc ^= byte as u16;
            for _ in 0..8 {
                if (crc & 0x0001) != 0 {
                    crc = (crc >> 1) ^ Self::POLY;
                } else {
                    crc >>= 1;
                }
            }
        }
        crc
    }

    /// Appends the checksum of `frame` to it, low byte first.
    pub fn append(frame: &mut Vec<u8>) {
        let crc = Self::compute(frame);
        frame.extend_from_slice(&crc.to_le_bytes());
    }

    /// Checksum stored in the trailing two bytes of `frame`.
    ///
    /// Callers guarantee `frame.len() >= 2`.
    pub fn trailing(frame: &[u8]) -> u16 {
        let n = frame.len();
        u16::from_le_bytes([frame[n - 2], frame[n - 1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_reference_vector() {
        assert_eq!(Crc16::compute(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), 0xCDC5);
    }

    #[test]
    fn crc_of_empty_is_initial_value() {
        assert_eq!(Crc16::compute(&[]), 0xFFFF);
    }

    #[test]
    fn crc_append_is_low_byte_first() {
        let mut frame = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        Crc16::append(&mut frame);
        assert_eq!(&frame[6..], &[0xC5, 0xCD]);
        assert_eq!(Crc16::trailing(&frame), 0xCDC5);
    }

    #[test]
    fn function_codes_round_trip() {
        for code in [0x03, 0x04, 0x06, 0x10] {
            assert_eq!(FunctionCode::from_u8(code).map(FunctionCode::code), Some(code));
        }
        assert_eq!(FunctionCode::from_u8(0x99), None);
        assert_eq!(FunctionCode::WriteMultipleRegisters.exception_code(), 0x90);
    }

    #[test]
    fn unknown_exception_codes_are_kept_verbatim() {
        let code = ExceptionCode::from(0x42);
        assert_eq!(code, ExceptionCode::Other(0x42));
        assert_eq!(code.code(), 0x42);
        assert_eq!(code.message(), "unknown error");
        assert_eq!(ExceptionCode::from(0x08), ExceptionCode::MemoryParityError);
    }

    #[test]
    fn byte_order_only_changes_value_bytes() {
        assert_eq!(ByteOrder::LowHigh.encode(0x1234), [0x34, 0x12]);
        assert_eq!(ByteOrder::HighLow.encode(0x1234), [0x12, 0x34]);
        assert_eq!(ByteOrder::HighLow.decode([0x12, 0x34]), 0x1234);
        assert_eq!(ByteOrder::default(), ByteOrder::LowHigh);
    }

    #[test]
    fn swap_pairs_leaves_odd_tail() {
        let mut buf = [1, 2, 3, 4, 5];
        swap_pairs(&mut buf);
        assert_eq!(buf, [2, 1, 4, 3, 5]);
    }
}
