//! Decoding of slave responses on the master side.

use std::fmt;

use tracing::debug;

use crate::core::{be_u16, ByteOrder, ExceptionCode, FunctionCode, EXCEPTION_FLAG};
use crate::frame::{validate_response, verify_crc};
use crate::FrameError;

/// A validated slave response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadRegisters {
        address: u8,
        function: FunctionCode,
        byte_count: u8,
        values: Vec<u16>,
    },
    WriteSingle {
        address: u8,
        register: u16,
        value: u16,
    },
    WriteMultiple {
        address: u8,
        start: u16,
        count: u16,
    },
    /// `function` is the received byte, exception bit included.
    Exception {
        address: u8,
        function: u8,
        code: ExceptionCode,
    },
}

impl Response {
    pub fn address(&self) -> u8 {
        match self {
            Response::ReadRegisters { address, .. }
            | Response::WriteSingle { address, .. }
            | Response::WriteMultiple { address, .. }
            | Response::Exception { address, .. } => *address,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Response::Exception { .. })
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::ReadRegisters {
                address,
                function,
                byte_count,
                values,
            } => {
                write!(
                    f,
                    "Device address: 0x{:02X}\nFunction: 0x{:02X}\nByte count: {}",
                    address,
                    function.code(),
                    byte_count
                )?;
                for (i, value) in values.iter().enumerate() {
                    write!(f, "\nValue[{}] = 0x{:04X}", i, value)?;
                }
                Ok(())
            }
            Response::WriteSingle {
                address,
                register,
                value,
            } => write!(
                f,
                "Device address: 0x{:02X}\nFunction: 0x{:02X}\nRegister address: 0x{:04X}\nWritten value: 0x{:04X}",
                address,
                FunctionCode::WriteSingleRegister.code(),
                register,
                value
            ),
            Response::WriteMultiple {
                address,
                start,
                count,
            } => write!(
                f,
                "Device address: 0x{:02X}\nFunction: 0x{:02X}\nStart address: 0x{:04X}\nRegister count: {}",
                address,
                FunctionCode::WriteMultipleRegisters.code(),
                start,
                count
            ),
            Response::Exception { function, code, .. } => write!(
                f,
                "Function: 0x{:02X}, error: {} (code: 0x{:02X})",
                function,
                code.message(),
                code.code()
            ),
        }
    }
}

/// Validates length and checksum of a slave response and decodes it.
pub fn decode_response(frame: &[u8], order: ByteOrder) -> Result<Response, FrameError> {
    validate_response(frame)?;
    verify_crc(frame)?;

    let address = frame[0];
    let function = frame[1];
    if function & EXCEPTION_FLAG != 0 {
        return Ok(Response::Exception {
            address,
            function,
            code: ExceptionCode::from(frame[2]),
        });
    }

    let response = match FunctionCode::from_u8(function) {
        Some(fc @ (FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters)) => {
            let byte_count = frame[2];
            let values = frame[3..3 + byte_count as usize]
                .chunks_exact(2)
                .map(|pair| order.decode([pair[0], pair[1]]))
                .collect();
            Response::ReadRegisters {
                address,
                function: fc,
                byte_count,
                values,
            }
        }
        Some(FunctionCode::WriteSingleRegister) => Response::WriteSingle {
            address,
            register: be_u16(frame, 2),
            value: order.decode([frame[4], frame[5]]),
        },
        Some(FunctionCode::WriteMultipleRegisters) => Response::WriteMultiple {
            address,
            start: be_u16(frame, 2),
            count: be_u16(frame, 4),
        },
        None => return Err(FrameError::UnsupportedFunction(function)),
    };
    debug!(address, function, "decoded response");
    Ok(response)
}

/// Renders a received frame, or the reason it was rejected, as text.
pub fn decode_to_text(frame: &[u8], order: ByteOrder) -> String {
    match decode_response(frame, order) {
        Ok(response) => response.to_string(),
        Err(FrameError::FrameTooShort { len } | FrameError::LengthMismatch { actual: len, .. }) => {
            format!("Invalid frame length {}", len)
        }
        Err(FrameError::CrcMismatch { expected, received }) => format!(
            "CRC mismatch\nReceived: {:04X}, computed: {:04X}",
            received, expected
        ),
        Err(FrameError::UnsupportedFunction(code)) => {
            format!("Unrecognized command with code 0x{:02X}", code)
        }
        Err(e) => e.to_string(),
    }
}

/// Two uppercase hex digits per byte, separated by spaces.
pub fn to_hex_string(frame: &[u8]) -> String {
    frame
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}
