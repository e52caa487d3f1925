//! Structural and checksum validation of RTU frames.

use crate::core::{Crc16, FunctionCode, EXCEPTION_FLAG};
use crate::FrameError;

/// Fixed length of read requests, single-write requests and write echoes.
pub(crate) const FIXED_FRAME_LEN: usize = 8;
/// Length of an exception response.
pub(crate) const EXCEPTION_FRAME_LEN: usize = 5;

fn expect_len(function: u8, expected: usize, actual: usize) -> Result<(), FrameError> {
    if expected != actual {
        return Err(FrameError::LengthMismatch {
            function,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Checks that the trailing two bytes hold the CRC of everything before them.
pub fn verify_crc(frame: &[u8]) -> Result<(), FrameError> {
    if frame.len() < 2 {
        return Err(FrameError::FrameTooShort { len: frame.len() });
    }
    let expected = Crc16::compute(&frame[..frame.len() - 2]);
    let received = Crc16::trailing(frame);
    if expected != received {
        return Err(FrameError::CrcMismatch { expected, received });
    }
    Ok(())
}

/// Validates a master-originated frame: length per function code, then CRC.
pub fn validate_request(frame: &[u8]) -> Result<(), FrameError> {
    if frame.len() < 2 {
        return Err(FrameError::FrameTooShort { len: frame.len() });
    }

    let function = frame[1];
    match FunctionCode::from_u8(function) {
        Some(FunctionCode::WriteMultipleRegisters) => {
            if frame.len() < 9 {
                return Err(FrameError::FrameTooShort { len: frame.len() });
            }
            expect_len(function, 9 + frame[6] as usize, frame.len())?;
        }
        Some(_) => expect_len(function, FIXED_FRAME_LEN, frame.len())?,
        None => return Err(FrameError::UnsupportedFunction(function)),
    }

    verify_crc(frame)
}

/// Validates the length of a slave-originated frame.
///
/// The checksum is not checked here; see [`crate::decode_response`].
pub fn validate_response(frame: &[u8]) -> Result<(), FrameError> {
    if frame.len() < 2 {
        return Err(FrameError::FrameTooShort { len: frame.len() });
    }

    let function = frame[1];
    if function & EXCEPTION_FLAG != 0 {
        return match FunctionCode::from_u8(function & !EXCEPTION_FLAG) {
            Some(_) => expect_len(function, EXCEPTION_FRAME_LEN, frame.len()),
            None => Err(FrameError::UnsupportedFunction(function)),
        };
    }

    match FunctionCode::from_u8(function) {
        Some(fc) if fc.is_read() => {
            if frame.len() < 3 {
                return Err(FrameError::FrameTooShort { len: frame.len() });
            }
            expect_len(function, 5 + frame[2] as usize, frame.len())
        }
        Some(_) => expect_len(function, FIXED_FRAME_LEN, frame.len()),
        None => Err(FrameError::UnsupportedFunction(function)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_crc(mut body: Vec<u8>) -> Vec<u8> {
        Crc16::append(&mut body);
        body
    }

    #[test]
    fn request_shorter_than_two_bytes_is_rejected() {
        assert_eq!(validate_request(&[]), Err(FrameError::FrameTooShort { len: 0 }));
        assert_eq!(validate_request(&[0x01]), Err(FrameError::FrameTooShort { len: 1 }));
    }

    #[test]
    fn read_request_must_be_eight_bytes() {
        let frame = with_crc(vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert!(validate_request(&frame).is_ok());
        assert!(matches!(
            validate_request(&frame[..7]),
            Err(FrameError::LengthMismatch { expected: 8, actual: 7, .. })
        ));
    }

    #[test]
    fn write_multiple_length_follows_byte_count() {
        let frame = with_crc(vec![0x01, 0x10, 0x00, 0x01, 0x02, 0x00, 0x04, 1, 2, 3, 4]);
        assert!(validate_request(&frame).is_ok());

        let mut short_count = frame.clone();
        short_count[6] = 0x02;
        assert!(matches!(
            validate_request(&short_count),
            Err(FrameError::LengthMismatch { expected: 11, actual: 13, .. })
        ));

        let truncated = with_crc(vec![0x01, 0x10, 0x00, 0x01, 0x00, 0x00]);
        assert!(matches!(
            validate_request(&truncated),
            Err(FrameError::FrameTooShort { len: 8 })
        ));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut frame = with_crc(vec![0x01, 0x06, 0x00, 0x01, 0x34, 0x12]);
        frame[7] ^= 0xFF;
        assert!(matches!(validate_request(&frame), Err(FrameError::CrcMismatch { .. })));
    }

    #[test]
    fn unknown_request_function_is_rejected() {
        let frame = with_crc(vec![0x01, 0x99, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(validate_request(&frame), Err(FrameError::UnsupportedFunction(0x99)));
    }

    #[test]
    fn response_lengths() {
        assert!(validate_response(&[0x01, 0x03, 0x04, 0, 0, 0, 0, 0, 0]).is_ok());
        assert!(validate_response(&[0x01, 0x06, 0, 0, 0, 0, 0, 0]).is_ok());
        assert!(validate_response(&[0x01, 0x10, 0, 0, 0, 0, 0, 0]).is_ok());
        assert!(validate_response(&[0x01, 0x83, 0x02, 0, 0]).is_ok());
        assert!(validate_response(&[0x01, 0x90, 0x02, 0, 0]).is_ok());

        assert!(matches!(
            validate_response(&[0x01, 0x03]),
            Err(FrameError::FrameTooShort { len: 2 })
        ));
        assert!(matches!(
            validate_response(&[0x01, 0x04, 0x04, 0, 0, 0, 0]),
            Err(FrameError::LengthMismatch { expected: 9, actual: 7, .. })
        ));
        assert!(matches!(
            validate_response(&[0x01, 0x86, 0x02, 0, 0, 0]),
            Err(FrameError::LengthMismatch { expected: 5, actual: 6, .. })
        ));
        assert_eq!(
            validate_response(&[0x01, 0x81, 0x01, 0, 0]),
            Err(FrameError::UnsupportedFunction(0x81))
        );
        assert_eq!(
            validate_response(&[0x01, 0x05, 0, 0, 0, 0, 0, 0]),
            Err(FrameError::UnsupportedFunction(0x05))
        );
    }

    #[test]
    fn response_checksum_is_not_checked_by_length_validation() {
        assert!(validate_response(&[0x01, 0x83, 0x02, 0xFF, 0xFF]).is_ok());
        assert!(verify_crc(&[0x01, 0x83, 0x02, 0xFF, 0xFF]).is_err());
    }
}
