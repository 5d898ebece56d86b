#[cfg(feature = "ascii")]
pub(crate) mod ascii;

#[cfg(feature = "rtu")]
pub(crate) mod rtu;

#[cfg(feature = "tcp")]
pub(crate) mod tcp;

use byteorder::{BigEndian, ByteOrder};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{error::Error, frame::*};

impl From<Request> for Bytes {
    fn from(req: Request) -> Bytes {
        let cnt = request_byte_count(&req);
        let mut data = BytesMut::with_capacity(cnt);
        use crate::frame::Request::*;
        data.put_u8(req.function_code());
        match req {
            ReadCoils(address, quantity)
            | ReadDiscreteInputs(address, quantity)
            | ReadInputRegisters(address, quantity)
            | ReadHoldingRegisters(address, quantity) => {
                data.put_u16(address);
                data.put_u16(quantity);
            }
            WriteSingleCoil(address, value) | WriteSingleRegister(address, value) => {
                data.put_u16(address);
                data.put_u16(value);
            }
            WriteMultipleCoils(address, coils) => {
                data.put_u16(address);
                let len = coils.len();
                data.put_u16(len as u16);
                let packed_coils = pack_coils(&coils);
                data.put_u8(packed_coils.len() as u8);
                for b in packed_coils {
                    data.put_u8(b);
                }
            }
            WriteMultipleRegisters(address, words) => {
                data.put_u16(address);
                let len = words.len();
                data.put_u16(len as u16);
                data.put_u8((len * 2) as u8);
                for w in words {
                    data.put_u16(w);
                }
            }
            Custom(_, custom_data) => {
                data.put_slice(&custom_data);
            }
        }
        data.freeze()
    }
}

impl From<RequestPdu> for Bytes {
    fn from(pdu: RequestPdu) -> Bytes {
        pdu.0.into()
    }
}

impl From<Response> for Bytes {
    fn from(rsp: Response) -> Bytes {
        let cnt = response_byte_count(&rsp);
        let mut data = BytesMut::with_capacity(cnt);
        use crate::frame::Response::*;
        data.put_u8(rsp.function_code());
        match rsp {
            ReadCoils(coils) | ReadDiscreteInputs(coils) => {
                let packed_coils = pack_coils(&coils);
                data.put_u8(packed_coils.len() as u8);
                for b in packed_coils {
                    data.put_u8(b);
                }
            }
            ReadInputRegisters(registers) | ReadHoldingRegisters(registers) => {
                data.put_u8((registers.len() * 2) as u8);
                for r in registers {
                    data.put_u16(r);
                }
            }
            WriteSingleCoil(address, value) | WriteSingleRegister(address, value) => {
                data.put_u16(address);
                data.put_u16(value);
            }
            WriteMultipleCoils(address, quantity) | WriteMultipleRegisters(address, quantity) => {
                data.put_u16(address);
                data.put_u16(quantity);
            }
            Custom(_, custom_data) => {
                data.put_slice(&custom_data);
            }
        }
        data.freeze()
    }
}

impl From<ExceptionResponse> for Bytes {
    fn from(ex: ExceptionResponse) -> Bytes {
        let mut data = BytesMut::with_capacity(2);
        debug_assert!(ex.function < 0x80);
        data.put_u8(ex.function + 0x80);
        data.put_u8(ex.exception as u8);
        data.freeze()
    }
}

impl From<ResponsePdu> for Bytes {
    fn from(pdu: ResponsePdu) -> Bytes {
        pdu.0.map_or_else(Into::into, Into::into)
    }
}

impl TryFrom<u8> for ExceptionCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        use crate::frame::ExceptionCode::*;
        let ex = match code {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x07 => NegativeAcknowledge,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            _ => {
                return Err(Error::InvalidResponse(format!(
                    "invalid exception code: 0x{code:0>2X}"
                )));
            }
        };
        Ok(ex)
    }
}

impl TryFrom<Bytes> for Response {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use crate::frame::Response::*;
        let fn_code = *bytes
            .first()
            .ok_or_else(|| Error::InvalidResponse("empty response PDU".into()))?;
        let rsp = match fn_code {
            0x01 | 0x02 => {
                let byte_count = read_byte_count(&bytes)?;
                // The requested quantity is unknown at this layer, so all
                // bits of every payload byte are unpacked. The caller
                // truncates to the quantity it asked for.
                let coils = unpack_coils(&bytes[2..2 + byte_count], u16::from(bytes[1]) * 8);
                if fn_code == 0x01 {
                    ReadCoils(coils)
                } else {
                    ReadDiscreteInputs(coils)
                }
            }
            0x03 | 0x04 => {
                let byte_count = read_byte_count(&bytes)?;
                let words = (0..byte_count / 2)
                    .map(|i| BigEndian::read_u16(&bytes[2 + 2 * i..]))
                    .collect();
                if fn_code == 0x03 {
                    ReadHoldingRegisters(words)
                } else {
                    ReadInputRegisters(words)
                }
            }
            0x05 | 0x06 => {
                let (address, value) = read_addr_value(&bytes)?;
                if fn_code == 0x05 {
                    WriteSingleCoil(address, value)
                } else {
                    WriteSingleRegister(address, value)
                }
            }
            0x0F | 0x10 => {
                let (address, quantity) = read_addr_value(&bytes)?;
                if fn_code == 0x0F {
                    WriteMultipleCoils(address, quantity)
                } else {
                    WriteMultipleRegisters(address, quantity)
                }
            }
            _ => Custom(fn_code, bytes[1..].to_vec()),
        };
        Ok(rsp)
    }
}

impl TryFrom<Bytes> for ExceptionResponse {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(Error::InvalidResponse("truncated exception frame".into()));
        }
        let fn_err_code = bytes[0];
        if fn_err_code < 0x80 {
            return Err(Error::InvalidResponse(format!(
                "invalid exception function code: 0x{fn_err_code:0>2X}"
            )));
        }
        let function = fn_err_code - 0x80;
        let exception = ExceptionCode::try_from(bytes[1])?;
        Ok(ExceptionResponse {
            function,
            exception,
        })
    }
}

impl TryFrom<Bytes> for ResponsePdu {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let fn_code = *bytes
            .first()
            .ok_or_else(|| Error::InvalidResponse("empty response PDU".into()))?;
        let pdu = if fn_code < 0x80 {
            Response::try_from(bytes)?.into()
        } else {
            ExceptionResponse::try_from(bytes)?.into()
        };
        Ok(pdu)
    }
}

/// Decode a request PDU on the server side.
///
/// Length and byte-count fields are validated strictly. A PDU whose function
/// code is recognized but whose payload layout is broken yields the
/// `IllegalDataValue` exception response to send back, instead of an error
/// that would tear down the connection.
#[cfg(feature = "server")]
pub(crate) fn decode_request(bytes: &Bytes) -> Result<ParsedRequest, Error> {
    use crate::frame::Request::*;

    let fn_code = *bytes
        .first()
        .ok_or_else(|| Error::InvalidResponse("empty request PDU".into()))?;
    let illegal_data_value = || {
        Ok(Err(ExceptionResponse {
            function: fn_code,
            exception: ExceptionCode::IllegalDataValue,
        }))
    };
    let req = match fn_code {
        0x01..=0x06 => {
            if bytes.len() != 5 {
                return illegal_data_value();
            }
            let address = BigEndian::read_u16(&bytes[1..]);
            let value = BigEndian::read_u16(&bytes[3..]);
            match fn_code {
                0x01 => ReadCoils(address, value),
                0x02 => ReadDiscreteInputs(address, value),
                0x03 => ReadHoldingRegisters(address, value),
                0x04 => ReadInputRegisters(address, value),
                0x05 => WriteSingleCoil(address, value),
                _ => WriteSingleRegister(address, value),
            }
        }
        0x0F => {
            if bytes.len() < 6 {
                return illegal_data_value();
            }
            let address = BigEndian::read_u16(&bytes[1..]);
            let quantity = BigEndian::read_u16(&bytes[3..]);
            let byte_count = usize::from(bytes[5]);
            if bytes.len() != 6 + byte_count
                || byte_count != packed_coils_len(usize::from(quantity))
            {
                return illegal_data_value();
            }
            WriteMultipleCoils(address, unpack_coils(&bytes[6..], quantity))
        }
        0x10 => {
            if bytes.len() < 6 {
                return illegal_data_value();
            }
            let address = BigEndian::read_u16(&bytes[1..]);
            let quantity = BigEndian::read_u16(&bytes[3..]);
            let byte_count = usize::from(bytes[5]);
            if bytes.len() != 6 + byte_count || byte_count != 2 * usize::from(quantity) {
                return illegal_data_value();
            }
            let words = (0..usize::from(quantity))
                .map(|i| BigEndian::read_u16(&bytes[6 + 2 * i..]))
                .collect();
            WriteMultipleRegisters(address, words)
        }
        fn_code if fn_code < 0x80 => Custom(fn_code, bytes[1..].to_vec()),
        fn_code => {
            // The exception marker must never be set in a request.
            return Err(Error::InvalidResponse(format!(
                "invalid request function code: 0x{fn_code:0>2X}"
            )));
        }
    };
    Ok(Ok(req))
}

fn read_byte_count(bytes: &Bytes) -> Result<usize, Error> {
    if bytes.len() < 2 {
        return Err(Error::InvalidResponse("truncated response PDU".into()));
    }
    let byte_count = usize::from(bytes[1]);
    if bytes.len() < 2 + byte_count {
        return Err(Error::InvalidResponse(format!(
            "response byte count {byte_count} exceeds payload"
        )));
    }
    Ok(byte_count)
}

fn read_addr_value(bytes: &Bytes) -> Result<(u16, u16), Error> {
    if bytes.len() < 5 {
        return Err(Error::InvalidResponse("truncated response PDU".into()));
    }
    Ok((
        BigEndian::read_u16(&bytes[1..]),
        BigEndian::read_u16(&bytes[3..]),
    ))
}

/// Turn a bool into a u16 coil value.
pub(crate) const fn bool_to_u16_coil(state: bool) -> u16 {
    if state {
        0xFF00
    } else {
        0x0000
    }
}

/// Turn a u16 coil value into a boolean value.
pub(crate) const fn u16_coil_to_bool(coil: u16) -> Option<bool> {
    match coil {
        0xFF00 => Some(true),
        0x0000 => Some(false),
        _ => None,
    }
}

/// Calculate the number of bytes required for a given number of coils.
pub(crate) const fn packed_coils_len(bitcount: usize) -> usize {
    (bitcount + 7) / 8
}

/// Pack coils into a byte vector, LSB-first within each byte.
pub(crate) fn pack_coils(coils: &[Coil]) -> Vec<u8> {
    let packed_size = packed_coils_len(coils.len());
    let mut res = vec![0; packed_size];
    for (i, b) in coils.iter().enumerate() {
        let v = u8::from(*b);
        res[i / 8] |= v << (i % 8);
    }
    res
}

/// Unpack coils from a byte slice, LSB-first within each byte.
pub(crate) fn unpack_coils(bytes: &[u8], count: u16) -> Vec<Coil> {
    let mut res = Vec::with_capacity(count.into());
    for i in 0..usize::from(count) {
        res.push((bytes[i / 8] >> (i % 8)) & 0b1 > 0);
    }
    res
}

fn request_byte_count(req: &Request) -> usize {
    use crate::frame::Request::*;
    match *req {
        ReadCoils(_, _)
        | ReadDiscreteInputs(_, _)
        | ReadInputRegisters(_, _)
        | ReadHoldingRegisters(_, _)
        | WriteSingleRegister(_, _)
        | WriteSingleCoil(_, _) => 5,
        WriteMultipleCoils(_, ref coils) => 6 + packed_coils_len(coils.len()),
        WriteMultipleRegisters(_, ref data) => 6 + data.len() * 2,
        Custom(_, ref data) => 1 + data.len(),
    }
}

fn response_byte_count(rsp: &Response) -> usize {
    use crate::frame::Response::*;
    match *rsp {
        ReadCoils(ref coils) | ReadDiscreteInputs(ref coils) => 2 + packed_coils_len(coils.len()),
        WriteSingleCoil(_, _)
        | WriteMultipleCoils(_, _)
        | WriteMultipleRegisters(_, _)
        | WriteSingleRegister(_, _) => 5,
        ReadInputRegisters(ref data) | ReadHoldingRegisters(ref data) => 2 + data.len() * 2,
        Custom(_, ref data) => 1 + data.len(),
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn convert_bool_to_coil() {
        assert_eq!(bool_to_u16_coil(true), 0xFF00);
        assert_eq!(bool_to_u16_coil(false), 0x0000);
    }

    #[test]
    fn convert_coil_to_bool() {
        assert_eq!(u16_coil_to_bool(0xFF00), Some(true));
        assert_eq!(u16_coil_to_bool(0x0000), Some(false));
        assert_eq!(u16_coil_to_bool(0x00FF), None);
    }

    #[test]
    fn convert_booleans_to_bytes() {
        assert_eq!(pack_coils(&[]), &[]);
        assert_eq!(pack_coils(&[true]), &[0b_1]);
        assert_eq!(pack_coils(&[false]), &[0b_0]);
        assert_eq!(pack_coils(&[true, false]), &[0b_01]);
        assert_eq!(pack_coils(&[false, true]), &[0b_10]);
        assert_eq!(pack_coils(&[true, true]), &[0b_11]);
        assert_eq!(pack_coils(&[true; 8]), &[0b_1111_1111]);
        assert_eq!(pack_coils(&[true; 9]), &[255, 1]);
        assert_eq!(pack_coils(&[false; 8]), &[0]);
        assert_eq!(pack_coils(&[false; 9]), &[0, 0]);
    }

    #[test]
    fn unpack_bits() {
        assert_eq!(unpack_coils(&[], 0), &[]);
        assert_eq!(unpack_coils(&[0, 0], 0), &[]);
        assert_eq!(unpack_coils(&[0b1], 1), &[true]);
        assert_eq!(unpack_coils(&[0b01], 2), &[true, false]);
        assert_eq!(unpack_coils(&[0b10], 2), &[false, true]);
        assert_eq!(unpack_coils(&[0b101], 3), &[true, false, true]);
        assert_eq!(unpack_coils(&[0xff, 0b11], 10), &[true; 10]);
    }

    #[test]
    fn exception_response_into_bytes() {
        let bytes: Bytes = ExceptionResponse {
            function: 0x03,
            exception: ExceptionCode::IllegalDataAddress,
        }
        .into();
        assert_eq!(bytes[0], 0x83);
        assert_eq!(bytes[1], 0x02);
    }

    #[test]
    fn exception_response_from_bytes() {
        assert!(ExceptionResponse::try_from(Bytes::from(vec![0x79, 0x02])).is_err());

        let bytes = Bytes::from(vec![0x83, 0x02]);
        let rsp = ExceptionResponse::try_from(bytes).unwrap();
        assert_eq!(
            rsp,
            ExceptionResponse {
                function: 0x03,
                exception: ExceptionCode::IllegalDataAddress,
            }
        );
    }

    #[test]
    fn exception_codes_from_bytes() {
        for (code, exception) in [
            (0x01, ExceptionCode::IllegalFunction),
            (0x02, ExceptionCode::IllegalDataAddress),
            (0x03, ExceptionCode::IllegalDataValue),
            (0x04, ExceptionCode::ServerDeviceFailure),
            (0x05, ExceptionCode::Acknowledge),
            (0x06, ExceptionCode::ServerDeviceBusy),
            (0x07, ExceptionCode::NegativeAcknowledge),
            (0x08, ExceptionCode::MemoryParityError),
            (0x0A, ExceptionCode::GatewayPathUnavailable),
            (0x0B, ExceptionCode::GatewayTargetDevice),
        ] {
            assert_eq!(ExceptionCode::try_from(code).unwrap(), exception);
            assert_eq!(exception as u8, code);
        }
        assert!(ExceptionCode::try_from(0x00).is_err());
        assert!(ExceptionCode::try_from(0x09).is_err());
        assert!(ExceptionCode::try_from(0xAB).is_err());
    }

    mod serialize_requests {

        use super::*;

        #[test]
        fn read_coils() {
            let bytes: Bytes = Request::ReadCoils(0x12, 4).into();
            assert_eq!(&bytes[..], &[1, 0x00, 0x12, 0x00, 0x04]);
        }

        #[test]
        fn read_discrete_inputs() {
            let bytes: Bytes = Request::ReadDiscreteInputs(0x03, 19).into();
            assert_eq!(&bytes[..], &[2, 0x00, 0x03, 0x00, 19]);
        }

        #[test]
        fn write_single_coil() {
            let bytes: Bytes = Request::WriteSingleCoil(0x1234, 0xFF00).into();
            assert_eq!(&bytes[..], &[5, 0x12, 0x34, 0xFF, 0x00]);
        }

        #[test]
        fn write_multiple_coils() {
            let states = vec![true, false, true, true];
            let bytes: Bytes = Request::WriteMultipleCoils(0x3311, states).into();
            assert_eq!(
                &bytes[..],
                &[0x0F, 0x33, 0x11, 0x00, 0x04, 0x01, 0b_0000_1101]
            );
        }

        #[test]
        fn read_input_registers() {
            let bytes: Bytes = Request::ReadInputRegisters(0x09, 77).into();
            assert_eq!(&bytes[..], &[4, 0x00, 0x09, 0x00, 0x4D]);
        }

        #[test]
        fn read_holding_registers() {
            let bytes: Bytes = Request::ReadHoldingRegisters(0x09, 77).into();
            assert_eq!(&bytes[..], &[3, 0x00, 0x09, 0x00, 0x4D]);
        }

        #[test]
        fn write_single_register() {
            let bytes: Bytes = Request::WriteSingleRegister(0x07, 0xABCD).into();
            assert_eq!(&bytes[..], &[6, 0x00, 0x07, 0xAB, 0xCD]);
        }

        #[test]
        fn write_multiple_registers() {
            let bytes: Bytes = Request::WriteMultipleRegisters(0x06, vec![0xABCD, 0xEF12]).into();
            assert_eq!(
                &bytes[..],
                &[0x10, 0x00, 0x06, 0x00, 0x02, 0x04, 0xAB, 0xCD, 0xEF, 0x12]
            );
        }

        #[test]
        fn custom() {
            let bytes: Bytes = Request::Custom(0x55, vec![0xCC, 0x88, 0xAA, 0xFF]).into();
            assert_eq!(&bytes[..], &[0x55, 0xCC, 0x88, 0xAA, 0xFF]);
        }
    }

    #[cfg(feature = "server")]
    mod deserialize_requests {

        use super::*;

        fn decode(raw: Vec<u8>) -> ParsedRequest {
            decode_request(&Bytes::from(raw)).unwrap()
        }

        #[test]
        fn empty_request() {
            assert!(decode_request(&Bytes::new()).is_err());
        }

        #[test]
        fn exception_marker_in_request() {
            assert!(decode_request(&Bytes::from(vec![0x81, 0x00])).is_err());
        }

        #[test]
        fn read_coils() {
            let req = decode(vec![0x01, 0x00, 0x12, 0x00, 0x04]).unwrap();
            assert_eq!(req, Request::ReadCoils(0x12, 4));
        }

        #[test]
        fn read_coils_with_wrong_payload_size() {
            let ex = decode(vec![0x01, 0x00, 0x12, 0x00]).unwrap_err();
            assert_eq!(ex.function, 0x01);
            assert_eq!(ex.exception, ExceptionCode::IllegalDataValue);

            let ex = decode(vec![0x01, 0x00, 0x12, 0x00, 0x04, 0x00]).unwrap_err();
            assert_eq!(ex.exception, ExceptionCode::IllegalDataValue);
        }

        #[test]
        fn write_single_coil() {
            let req = decode(vec![0x05, 0x12, 0x34, 0xFF, 0x00]).unwrap();
            assert_eq!(req, Request::WriteSingleCoil(0x1234, 0xFF00));

            // Out-of-range values survive decoding so the server can
            // answer with an exception instead of dropping the frame.
            let req = decode(vec![0x05, 0x12, 0x34, 0x12, 0x34]).unwrap();
            assert_eq!(req, Request::WriteSingleCoil(0x1234, 0x1234));
        }

        #[test]
        fn write_multiple_coils() {
            let req = decode(vec![0x0F, 0x33, 0x11, 0x00, 0x04, 0x01, 0b_0000_1101]).unwrap();
            assert_eq!(
                req,
                Request::WriteMultipleCoils(0x3311, vec![true, false, true, true])
            );
        }

        #[test]
        fn write_multiple_coils_with_byte_count_mismatch() {
            let ex = decode(vec![0x0F, 0x33, 0x11, 0x00, 0x04, 0x02, 0x0D, 0x00]).unwrap_err();
            assert_eq!(ex.function, 0x0F);
            assert_eq!(ex.exception, ExceptionCode::IllegalDataValue);
        }

        #[test]
        fn write_single_register() {
            let req = decode(vec![0x06, 0x00, 0x07, 0xAB, 0xCD]).unwrap();
            assert_eq!(req, Request::WriteSingleRegister(0x07, 0xABCD));
        }

        #[test]
        fn write_multiple_registers() {
            let req = decode(vec![0x10, 0x00, 0x06, 0x00, 0x02, 0x04, 0xAB, 0xCD, 0xEF, 0x12])
                .unwrap();
            assert_eq!(
                req,
                Request::WriteMultipleRegisters(0x06, vec![0xABCD, 0xEF12])
            );
        }

        #[test]
        fn write_multiple_registers_with_byte_count_mismatch() {
            let ex = decode(vec![0x10, 0x00, 0x06, 0x00, 0x02, 0x05, 0xAB, 0xCD, 0xEF, 0x12])
                .unwrap_err();
            assert_eq!(ex.function, 0x10);
            assert_eq!(ex.exception, ExceptionCode::IllegalDataValue);
        }

        #[test]
        fn custom() {
            let req = decode(vec![0x55, 0xCC, 0x88, 0xAA, 0xFF]).unwrap();
            assert_eq!(req, Request::Custom(0x55, vec![0xCC, 0x88, 0xAA, 0xFF]));
        }
    }

    mod serialize_responses {

        use super::*;

        #[test]
        fn read_coils() {
            let bytes: Bytes = Response::ReadCoils(vec![true, false, false, true, false]).into();
            assert_eq!(&bytes[..], &[1, 1, 0b_0000_1001]);
        }

        #[test]
        fn read_discrete_inputs() {
            let bytes: Bytes = Response::ReadDiscreteInputs(vec![true, false, true, true]).into();
            assert_eq!(&bytes[..], &[2, 1, 0b_0000_1101]);
        }

        #[test]
        fn write_single_coil() {
            let bytes: Bytes = Response::WriteSingleCoil(0x33, 0xFF00).into();
            assert_eq!(&bytes[..], &[5, 0x00, 0x33, 0xFF, 0x00]);
        }

        #[test]
        fn write_multiple_coils() {
            let bytes: Bytes = Response::WriteMultipleCoils(0x3311, 5).into();
            assert_eq!(&bytes[..], &[0x0F, 0x33, 0x11, 0x00, 0x05]);
        }

        #[test]
        fn read_input_registers() {
            let bytes: Bytes = Response::ReadInputRegisters(vec![0xAA00, 0xCCBB, 0xEEDD]).into();
            assert_eq!(
                &bytes[..],
                &[4, 0x06, 0xAA, 0x00, 0xCC, 0xBB, 0xEE, 0xDD]
            );
        }

        #[test]
        fn read_holding_registers() {
            let bytes: Bytes = Response::ReadHoldingRegisters(vec![0xAA00, 0x1111]).into();
            assert_eq!(&bytes[..], &[3, 0x04, 0xAA, 0x00, 0x11, 0x11]);
        }

        #[test]
        fn write_single_register() {
            let bytes: Bytes = Response::WriteSingleRegister(0x07, 0xABCD).into();
            assert_eq!(&bytes[..], &[6, 0x00, 0x07, 0xAB, 0xCD]);
        }

        #[test]
        fn write_multiple_registers() {
            let bytes: Bytes = Response::WriteMultipleRegisters(0x06, 2).into();
            assert_eq!(&bytes[..], &[0x10, 0x00, 0x06, 0x00, 0x02]);
        }

        #[test]
        fn custom() {
            let bytes: Bytes = Response::Custom(0x55, vec![0xCC, 0x88, 0xAA, 0xFF]).into();
            assert_eq!(&bytes[..], &[0x55, 0xCC, 0x88, 0xAA, 0xFF]);
        }
    }

    mod deserialize_responses {

        use super::*;

        #[test]
        fn read_coils() {
            let bytes = Bytes::from(vec![1, 1, 0b_0000_1001]);
            let rsp = Response::try_from(bytes).unwrap();
            assert_eq!(
                rsp,
                Response::ReadCoils(vec![true, false, false, true, false, false, false, false])
            );
        }

        #[test]
        fn read_coils_with_truncated_payload() {
            let bytes = Bytes::from(vec![1, 2, 0b_0000_1001]);
            assert!(Response::try_from(bytes).is_err());
        }

        #[test]
        fn read_discrete_inputs() {
            let bytes = Bytes::from(vec![2, 1, 0b_0000_1001]);
            let rsp = Response::try_from(bytes).unwrap();
            assert_eq!(
                rsp,
                Response::ReadDiscreteInputs(vec![
                    true, false, false, true, false, false, false, false,
                ])
            );
        }

        #[test]
        fn write_single_coil() {
            let bytes = Bytes::from(vec![5, 0x00, 0x33, 0xFF, 0x00]);
            let rsp = Response::try_from(bytes).unwrap();
            assert_eq!(rsp, Response::WriteSingleCoil(0x33, 0xFF00));
        }

        #[test]
        fn write_multiple_coils() {
            let bytes = Bytes::from(vec![0x0F, 0x33, 0x11, 0x00, 0x05]);
            let rsp = Response::try_from(bytes).unwrap();
            assert_eq!(rsp, Response::WriteMultipleCoils(0x3311, 5));
        }

        #[test]
        fn read_input_registers() {
            let bytes = Bytes::from(vec![4, 0x06, 0xAA, 0x00, 0xCC, 0xBB, 0xEE, 0xDD]);
            let rsp = Response::try_from(bytes).unwrap();
            assert_eq!(
                rsp,
                Response::ReadInputRegisters(vec![0xAA00, 0xCCBB, 0xEEDD])
            );
        }

        #[test]
        fn read_holding_registers() {
            let bytes = Bytes::from(vec![3, 0x04, 0xAA, 0x00, 0x11, 0x11]);
            let rsp = Response::try_from(bytes).unwrap();
            assert_eq!(rsp, Response::ReadHoldingRegisters(vec![0xAA00, 0x1111]));
        }

        #[test]
        fn write_single_register() {
            let bytes = Bytes::from(vec![6, 0x00, 0x07, 0xAB, 0xCD]);
            let rsp = Response::try_from(bytes).unwrap();
            assert_eq!(rsp, Response::WriteSingleRegister(0x07, 0xABCD));
        }

        #[test]
        fn write_multiple_registers() {
            let bytes = Bytes::from(vec![0x10, 0x00, 0x06, 0x00, 0x02]);
            let rsp = Response::try_from(bytes).unwrap();
            assert_eq!(rsp, Response::WriteMultipleRegisters(0x06, 2));
        }

        #[test]
        fn custom() {
            let bytes = Bytes::from(vec![0x55, 0xCC, 0x88, 0xAA, 0xFF]);
            let rsp = Response::try_from(bytes).unwrap();
            assert_eq!(rsp, Response::Custom(0x55, vec![0xCC, 0x88, 0xAA, 0xFF]));
        }

        #[test]
        fn exception_as_pdu() {
            let bytes = Bytes::from(vec![0x83, 0x02]);
            let ResponsePdu(rsp) = ResponsePdu::try_from(bytes).unwrap();
            assert_eq!(
                rsp,
                Err(ExceptionResponse {
                    function: 0x03,
                    exception: ExceptionCode::IllegalDataAddress,
                })
            );
        }
    }
}
