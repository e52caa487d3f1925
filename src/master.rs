use crate::core::{ByteOrder, Crc16, FunctionCode};
use crate::response::{decode_response, Response};
use crate::FrameError;

/// Largest register count whose payload fits the one-byte byte count field.
const MAX_WRITE_REGISTERS: usize = u8::MAX as usize / 2;

fn wrap_rtu(address: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + pdu.len() + 2);
    frame.push(address);
    frame.extend_from_slice(pdu);
    Crc16::append(&mut frame);
    frame
}

/// Builds a read request (0x03 or 0x04): 8 bytes, start and count big-endian.
pub fn build_read_registers(
    function: FunctionCode,
    address: u8,
    start: u16,
    count: u16,
) -> Result<Vec<u8>, FrameError> {
    if !function.is_read() {
        return Err(FrameError::UnsupportedFunction(function.code()));
    }
    Ok(read_frame(function, address, start, count))
}

fn read_frame(function: FunctionCode, address: u8, start: u16, count: u16) -> Vec<u8> {
    let [start_hi, start_lo] = start.to_be_bytes();
    let [count_hi, count_lo] = count.to_be_bytes();
    wrap_rtu(
        address,
        &[function.code(), start_hi, start_lo, count_hi, count_lo],
    )
}

/// Builds a write single register request (0x06). The value follows `order`.
pub fn build_write_single_register(
    address: u8,
    register: u16,
    value: u16,
    order: ByteOrder,
) -> Vec<u8> {
    let [reg_hi, reg_lo] = register.to_be_bytes();
    let [v0, v1] = order.encode(value);
    wrap_rtu(
        address,
        &[FunctionCode::WriteSingleRegister.code(), reg_hi, reg_lo, v0, v1],
    )
}

/// Builds a write multiple registers request (0x10) of `9 + byte_count` bytes.
///
/// The register count field is written low byte first. Deployed peers of
/// this engine expect that layout; a conformant Modbus slave reads it
/// big-endian and will not interoperate.
pub fn build_write_multiple_registers(
    address: u8,
    start: u16,
    register_count: u16,
    byte_count: u8,
    values: &[u16],
    order: ByteOrder,
) -> Result<Vec<u8>, FrameError> {
    let needed = byte_count as usize / 2;
    if values.len() < needed {
        return Err(FrameError::ValueCountMismatch {
            expected: needed,
            actual: values.len(),
        });
    }

    let mut pdu = Vec::with_capacity(6 + byte_count as usize);
    pdu.push(FunctionCode::WriteMultipleRegisters.code());
    pdu.extend_from_slice(&start.to_be_bytes());
    pdu.extend_from_slice(&register_count.to_le_bytes());
    pdu.push(byte_count);
    for value in &values[..needed] {
        pdu.extend_from_slice(&order.encode(*value));
    }
    // odd byte count
    pdu.resize(6 + byte_count as usize, 0);

    Ok(wrap_rtu(address, &pdu))
}

pub struct ModbusRtuMasterBuilder {
    device_id: Option<u8>,
    byte_order: ByteOrder,
}

impl ModbusRtuMasterBuilder {
    pub fn device_id(mut self, device_id: u8) -> Self {
        self.device_id = Some(device_id);
        self
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn build(self) -> Result<ModbusRtuMaster, FrameError> {
        let device_id = self.device_id.ok_or(FrameError::DeviceIdMissing)?;

        Ok(ModbusRtuMaster {
            device_id,
            byte_order: self.byte_order,
        })
    }
}

/// Master bound to one slave address and value byte order.
#[derive(Debug, Clone)]
pub struct ModbusRtuMaster {
    device_id: u8,
    byte_order: ByteOrder,
}

impl ModbusRtuMaster {
    pub fn builder() -> ModbusRtuMasterBuilder {
        ModbusRtuMasterBuilder {
            device_id: None,
            byte_order: ByteOrder::default(),
        }
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn read_holding_registers(&self, start: u16, count: u16) -> Vec<u8> {
        read_frame(FunctionCode::ReadHoldingRegisters, self.device_id, start, count)
    }

    pub fn read_input_registers(&self, start: u16, count: u16) -> Vec<u8> {
        read_frame(FunctionCode::ReadInputRegisters, self.device_id, start, count)
    }

    pub fn write_single_register(&self, register: u16, value: u16) -> Vec<u8> {
        build_write_single_register(self.device_id, register, value, self.byte_order)
    }

    pub fn write_multiple_registers(
        &self,
        start: u16,
        values: &[u16],
    ) -> Result<Vec<u8>, FrameError> {
        if values.len() > MAX_WRITE_REGISTERS {
            return Err(FrameError::TooManyValues {
                max: MAX_WRITE_REGISTERS,
                actual: values.len(),
            });
        }
        build_write_multiple_registers(
            self.device_id,
            start,
            values.len() as u16,
            (values.len() * 2) as u8,
            values,
            self.byte_order,
        )
    }

    /// Decodes a response and checks it came from this master's slave.
    pub fn decode(&self, frame: &[u8]) -> Result<Response, FrameError> {
        let response = decode_response(frame, self.byte_order)?;
        if response.address() != self.device_id {
            return Err(FrameError::UnitIdMismatch {
                expected: self.device_id,
                received: response.address(),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::validate_request;

    #[test]
    fn read_holding_reference_frame() {
        let frame =
            build_read_registers(FunctionCode::ReadHoldingRegisters, 0x01, 0, 10).unwrap();
        assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);
    }

    #[test]
    fn read_builder_rejects_write_functions() {
        assert_eq!(
            build_read_registers(FunctionCode::WriteSingleRegister, 1, 0, 1),
            Err(FrameError::UnsupportedFunction(0x06))
        );
    }

    #[test]
    fn write_single_value_follows_byte_order() {
        let low_high = build_write_single_register(0x11, 0x0102, 0xABCD, ByteOrder::LowHigh);
        let high_low = build_write_single_register(0x11, 0x0102, 0xABCD, ByteOrder::HighLow);
        assert_eq!(&low_high[..6], &[0x11, 0x06, 0x01, 0x02, 0xCD, 0xAB]);
        assert_eq!(&high_low[..6], &[0x11, 0x06, 0x01, 0x02, 0xAB, 0xCD]);
        assert!(validate_request(&low_high).is_ok());
        assert!(validate_request(&high_low).is_ok());
    }

    #[test]
    fn write_multiple_count_is_low_byte_first() {
        let frame = build_write_multiple_registers(
            0x01,
            0x0010,
            0x0102,
            4,
            &[0x1234, 0x5678],
            ByteOrder::HighLow,
        )
        .unwrap();
        assert_eq!(frame.len(), 13);
        assert_eq!(
            &frame[..11],
            &[0x01, 0x10, 0x00, 0x10, 0x02, 0x01, 0x04, 0x12, 0x34, 0x56, 0x78]
        );
        assert!(validate_request(&frame).is_ok());
    }

    #[test]
    fn write_multiple_needs_enough_values() {
        let result = build_write_multiple_registers(1, 0, 3, 6, &[1, 2], ByteOrder::LowHigh);
        assert_eq!(
            result,
            Err(FrameError::ValueCountMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn builder_requires_device_id() {
        let master = ModbusRtuMaster::builder().byte_order(ByteOrder::HighLow).build();
        assert!(matches!(master, Err(FrameError::DeviceIdMissing)));
    }

    #[test]
    fn master_rejects_oversized_write() {
        let master = ModbusRtuMaster::builder().device_id(1).build().unwrap();
        let values = vec![0u16; 128];
        assert!(matches!(
            master.write_multiple_registers(0, &values),
            Err(FrameError::TooManyValues { max: 127, actual: 128 })
        ));
    }
}
