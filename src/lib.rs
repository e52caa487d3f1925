// lib.rs

mod core;
mod frame;
mod master;
mod response;
mod slave;

pub use crate::core::{
    swap_pairs, ByteOrder, Crc16, ExceptionCode, FunctionCode, BROADCAST_ADDRESS, EXCEPTION_FLAG,
    MAX_REGISTERS,
};
pub use crate::frame::{validate_request, validate_response, verify_crc};
pub use crate::master::{
    build_read_registers, build_write_multiple_registers, build_write_single_register,
    ModbusRtuMaster, ModbusRtuMasterBuilder,
};
pub use crate::response::{decode_response, decode_to_text, to_hex_string, Response};
pub use crate::slave::{
    exception_frame, process, RegisterAccess, RegisterBank, Reply, Silence, SlaveConfig,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error(
        "Invalid frame length for function {function:#04x}: expected {expected}, received {actual}"
    )]
    LengthMismatch { function: u8, expected: usize, actual: usize },

    #[error("Unsupported function code {0:#04x}")]
    UnsupportedFunction(u8),

    #[error("CRC mismatch: expected {expected:#06x}, received {received:#06x}")]
    CrcMismatch { expected: u16, received: u16 },

    #[error("Unit ID mismatch: expected {expected}, received {received}")]
    UnitIdMismatch { expected: u8, received: u8 },

    #[error("Device ID not set")]
    DeviceIdMissing,

    #[error("Value count mismatch: expected {expected}, got {actual}")]
    ValueCountMismatch { expected: usize, actual: usize },

    #[error("Too many values: at most {max}, got {actual}")]
    TooManyValues { max: usize, actual: usize },
}
