use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use smallvec::SmallVec;
use tokio_util::codec::{Decoder, Encoder};

use crate::{error::Error, frame::rtu::*, frame::*, station::StationId};

use super::*;

// [Modbus over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a Modbus RTU frame is 256 bytes."
const MAX_FRAME_LEN: usize = 256;

// Station address + function code + data + CRC.
const MAX_PDU_LEN: usize = MAX_FRAME_LEN - 3;

type DroppedBytes = SmallVec<[u8; MAX_FRAME_LEN]>;

/// Resolves the PDU length for function codes outside the standard table,
/// e.g. the user-defined range 100-127.
///
/// Receives the raw ADU bytes received so far (station address first, the
/// function code at index 1). Returns `None` if the function code is not
/// handled by the hint, `Some(None)` if more bytes are needed to determine
/// the length, and `Some(Some(len))` once the PDU length is known.
pub type PduLenHint = fn(&[u8]) -> Option<Option<usize>>;

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct FrameDecoder {
    dropped_bytes: DroppedBytes,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            dropped_bytes: DroppedBytes::new(),
        }
    }
}

impl FrameDecoder {
    pub(crate) fn decode(
        &mut self,
        buf: &mut BytesMut,
        pdu_len: usize,
    ) -> Result<Option<(StationId, Bytes)>, Error> {
        const CRC_BYTE_COUNT: usize = 2;

        let adu_len = 1 + pdu_len;

        if buf.len() < adu_len + CRC_BYTE_COUNT {
            // Incomplete frame
            return Ok(None);
        }

        let mut adu_buf = buf.split_to(adu_len);
        let crc_buf = buf.split_to(CRC_BYTE_COUNT);

        // Read trailing CRC and verify the ADU
        let expected_crc = BigEndian::read_u16(&crc_buf);
        let actual_crc = calc_crc(&adu_buf);
        if expected_crc != actual_crc {
            // CRC is invalid - restore the input buffer
            let rem_buf = buf.split();
            debug_assert!(buf.is_empty());
            buf.unsplit(adu_buf);
            buf.unsplit(crc_buf);
            buf.unsplit(rem_buf);

            return Err(Error::InvalidCrc {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        if !self.dropped_bytes.is_empty() {
            log::warn!(
                "Successfully decoded frame after dropping {} byte(s): {:X?}",
                self.dropped_bytes.len(),
                self.dropped_bytes
            );
            self.dropped_bytes.clear();
        }
        let station = adu_buf.split_to(1)[0];
        let pdu_data = adu_buf.freeze();

        Ok(Some((station, pdu_data)))
    }

    pub(crate) fn recover_on_error(&mut self, buf: &mut BytesMut) {
        // If decoding failed the buffer cannot be empty
        debug_assert!(!buf.is_empty());
        // Skip and record the first byte of the buffer
        {
            let first = buf.first().unwrap();
            log::debug!("Dropped first byte: {first:X?}");
            if self.dropped_bytes.len() >= MAX_FRAME_LEN {
                log::error!(
                    "Giving up to decode frame after dropping {} byte(s): {:X?}",
                    self.dropped_bytes.len(),
                    self.dropped_bytes
                );
                self.dropped_bytes.clear();
            }
            self.dropped_bytes.push(*first);
        }
        buf.advance(1);
    }
}

#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct ClientCodec {
    frame_decoder: FrameDecoder,
    pub(crate) pdu_len_hint: Option<PduLenHint>,
}

#[cfg(feature = "server")]
#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct ServerCodec {
    frame_decoder: FrameDecoder,
    pub(crate) pdu_len_hint: Option<PduLenHint>,
}

#[cfg(feature = "server")]
fn get_request_pdu_len(adu_buf: &BytesMut, hint: Option<PduLenHint>) -> Result<Option<usize>, Error> {
    let Some(fn_code) = adu_buf.get(1) else {
        return Ok(None);
    };
    let len = match fn_code {
        0x01..=0x06 => 5,
        0x0F | 0x10 => {
            return Ok(adu_buf
                .get(6)
                .map(|&byte_count| 6 + usize::from(byte_count)));
        }
        _ => {
            if let Some(len) = hint.and_then(|hint| hint(adu_buf)) {
                return Ok(len);
            }
            return Err(Error::Unsupported(*fn_code));
        }
    };
    Ok(Some(len))
}

fn get_response_pdu_len(adu_buf: &BytesMut, hint: Option<PduLenHint>) -> Result<Option<usize>, Error> {
    let Some(fn_code) = adu_buf.get(1) else {
        return Ok(None);
    };
    let len = match fn_code {
        0x01..=0x04 => {
            return Ok(adu_buf
                .get(2)
                .map(|&byte_count| 2 + usize::from(byte_count)));
        }
        0x05 | 0x06 | 0x0F | 0x10 => 5,
        // Exception responses carry a single exception code byte.
        fn_code if fn_code & 0x80 != 0 => 2,
        _ => {
            if let Some(len) = hint.and_then(|hint| hint(adu_buf)) {
                return Ok(len);
            }
            return Err(Error::Unsupported(*fn_code));
        }
    };
    Ok(Some(len))
}

pub(crate) fn calc_crc(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            let crc_odd = (crc & 0x0001) != 0;
            crc >>= 1;
            if crc_odd {
                crc ^= 0xA001;
            }
        }
    }
    // The CRC is transmitted low byte first. Swapping here lets the
    // big-endian buffer accessors put it on the wire in that order.
    crc << 8 | crc >> 8
}

fn decode<F>(
    pdu_type: &str,
    frame_decoder: &mut FrameDecoder,
    get_pdu_len: F,
    buf: &mut BytesMut,
) -> Result<Option<(StationId, Bytes)>, Error>
where
    F: Fn(&BytesMut) -> Result<Option<usize>, Error>,
{
    const MAX_RETRIES: usize = 20;

    let clean_start = frame_decoder.dropped_bytes.is_empty();

    for retry in 0..MAX_RETRIES {
        let result = get_pdu_len(buf).and_then(|pdu_len| {
            let Some(pdu_len) = pdu_len else {
                // Incomplete frame
                return Ok(None);
            };

            frame_decoder.decode(buf, pdu_len)
        });

        match result {
            Err(Error::Unsupported(fn_code)) if retry == 0 && clean_start => {
                // An unknown function code at a frame boundary leaves the
                // frame length undeterminable. Drain everything received so
                // far and let the caller decide how to continue. During
                // resynchronization the same condition is indistinguishable
                // from line noise and handled below instead.
                log::warn!("Draining {} unframeable byte(s)", buf.len());
                buf.clear();
                return Err(Error::Unsupported(fn_code));
            }
            Err(err) => {
                log::warn!("Failed to decode {pdu_type} frame: {err}");
                frame_decoder.recover_on_error(buf);
                continue;
            }
            Ok(result) => return Ok(result),
        }
    }

    // Maximum number of retries exceeded.
    log::error!("Giving up to decode frame after {MAX_RETRIES} retries");
    Err(Error::InvalidResponse("too many decoding retries".into()))
}

impl Decoder for ClientCodec {
    type Item = ResponseAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseAdu>, Error> {
        let hint = self.pdu_len_hint;
        let Some((station, pdu_data)) = decode(
            "response",
            &mut self.frame_decoder,
            |buf| get_response_pdu_len(buf, hint),
            buf,
        )?
        else {
            return Ok(None);
        };

        let hdr = Header { station };

        // Decoding of the PDU is unlikely to fail due
        // to transmission errors, because the frame's bytes
        // have already been verified with the CRC.
        ResponsePdu::try_from(pdu_data)
            .map(|pdu| Some(ResponseAdu { hdr, pdu }))
            .map_err(|err| {
                // Unrecoverable error
                log::error!("Failed to decode response PDU: {err}");
                err
            })
    }
}

#[cfg(feature = "server")]
impl Decoder for ServerCodec {
    type Item = (Header, ParsedRequest);
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<(Header, ParsedRequest)>, Error> {
        let hint = self.pdu_len_hint;
        let Some((station, pdu_data)) = decode(
            "request",
            &mut self.frame_decoder,
            |buf| get_request_pdu_len(buf, hint),
            buf,
        )?
        else {
            return Ok(None);
        };

        let hdr = Header { station };
        let parsed = decode_request(&pdu_data)?;
        Ok(Some((hdr, parsed)))
    }
}

fn encode_adu(buf: &mut BytesMut, station: StationId, pdu_data: &Bytes) -> Result<(), Error> {
    if pdu_data.len() > MAX_PDU_LEN {
        return Err(Error::InvalidSize);
    }
    buf.reserve(pdu_data.len() + 3);
    let start = buf.len();
    buf.put_u8(station);
    buf.put_slice(pdu_data);
    let crc = calc_crc(&buf[start..]);
    buf.put_u16(crc);
    Ok(())
}

impl Encoder<RequestAdu> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, adu: RequestAdu, buf: &mut BytesMut) -> Result<(), Error> {
        let RequestAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        encode_adu(buf, hdr.station, &pdu_data)
    }
}

#[cfg(feature = "server")]
impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<(), Error> {
        let ResponseAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        encode_adu(buf, hdr.station, &pdu_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_crc() {
        let msg = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(calc_crc(&msg), 0xB663);

        let msg = [0x01, 0x03, 0x04, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(calc_crc(&msg), 0xFBF9);
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_get_request_pdu_len() {
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&[0x66, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            get_request_pdu_len(&buf, None),
            Err(Error::Unsupported(0x00))
        ));

        for fn_code in 0x01..=0x06 {
            buf[1] = fn_code;
            assert_eq!(get_request_pdu_len(&buf, None).unwrap(), Some(5));
        }

        buf[1] = 0x0F;
        buf[6] = 99;
        assert_eq!(get_request_pdu_len(&buf, None).unwrap(), Some(105));

        buf[1] = 0x10;
        buf[6] = 99;
        assert_eq!(get_request_pdu_len(&buf, None).unwrap(), Some(105));
    }

    #[test]
    fn test_get_response_pdu_len() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x66, 0x01, 99, 0x00]);
        assert_eq!(get_response_pdu_len(&buf, None).unwrap(), Some(101));

        buf[1] = 0x00;
        assert!(matches!(
            get_response_pdu_len(&buf, None),
            Err(Error::Unsupported(0x00))
        ));

        for fn_code in 0x01..=0x04 {
            buf[1] = fn_code;
            assert_eq!(get_response_pdu_len(&buf, None).unwrap(), Some(101));
        }

        for fn_code in [0x05, 0x06, 0x0F, 0x10] {
            buf[1] = fn_code;
            assert_eq!(get_response_pdu_len(&buf, None).unwrap(), Some(5));
        }

        for fn_code in [0x81, 0x90, 0xAB, 0xFF] {
            buf[1] = fn_code;
            assert_eq!(get_response_pdu_len(&buf, None).unwrap(), Some(2));
        }
    }

    #[test]
    fn pdu_len_from_hint() {
        fn hint(adu: &[u8]) -> Option<Option<usize>> {
            (adu[1] == 0x66).then_some(Some(3))
        }

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x01, 0x66, 0x00]);
        assert_eq!(get_response_pdu_len(&buf, Some(hint)).unwrap(), Some(3));
        #[cfg(feature = "server")]
        {
            assert_eq!(get_request_pdu_len(&buf, Some(hint)).unwrap(), Some(3));
            buf[1] = 0x67;
            assert!(get_request_pdu_len(&buf, Some(hint)).is_err());
        }
    }

    mod client {

        use super::*;

        #[test]
        fn decode_partly_received_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x12, // station address
                    0x02, // function code
                    0x03, // byte count
                    0x00, // data
                    0x00, // data
                    0x00, // data
                    0x00, // CRC first byte
                          // missing crc second byte
                ][..],
            );
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 7);
        }

        #[test]
        fn decode_empty_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::new();

            let res = codec.decode(&mut buf).unwrap();

            assert!(res.is_none());
            assert_eq!(0, buf.len());
        }

        #[test]
        fn decode_single_byte_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(&[0x00][..]);

            let res = codec.decode(&mut buf).unwrap();

            assert!(res.is_none());
            assert_eq!(1, buf.len());
        }

        #[test]
        fn decode_read_holding_registers_response() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x01, // station address
                    0x03, // function code
                    0x06, // byte count
                    0x00, //
                    0x01, //
                    0x00, //
                    0x02, //
                    0x00, //
                    0x03, //
                    0xFD, // crc
                    0x74, // crc
                ][..],
            );
            let ResponseAdu { hdr, pdu } = codec.decode(&mut buf).unwrap().unwrap();
            assert!(buf.is_empty());
            assert_eq!(hdr.station, 0x01);
            if let Ok(Response::ReadHoldingRegisters(data)) = pdu.into() {
                assert_eq!(data, vec![0x0001, 0x0002, 0x0003]);
            } else {
                panic!("unexpected response")
            }
        }

        #[test]
        fn decode_response_drop_invalid_bytes() {
            // The noise bytes parse as the header of a phantom frame whose
            // CRC check fails, so the decoder resynchronizes byte by byte.
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x42, // dropped byte
                    0x03, // dropped byte
                    0x01, // station address
                    0x03, // function code
                    0x04, // byte count
                    0x89, //
                    0x02, //
                    0x42, //
                    0xC7, //
                    0x00, // crc
                    0x9D, // crc
                    0x00,
                ][..],
            );
            let ResponseAdu { hdr, pdu } = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(buf.len(), 1);
            assert_eq!(hdr.station, 0x01);
            if let Ok(Response::ReadHoldingRegisters(data)) = pdu.into() {
                assert_eq!(data, vec![0x8902, 0x42C7]);
            } else {
                panic!("unexpected response")
            }
        }

        #[test]
        fn decode_exception_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x66, //
                    0x82, // exception = 0x80 + 0x02
                    0x03, //
                    0xB1, // crc
                    0x7E, // crc
                ][..],
            );

            let ResponseAdu { pdu, .. } = codec.decode(&mut buf).unwrap().unwrap();
            if let ResponsePdu(Err(err)) = pdu {
                assert_eq!(format!("{err}"), "Modbus function 2: Illegal data value");
                assert_eq!(buf.len(), 0);
            } else {
                panic!("unexpected response")
            }
        }

        #[test]
        fn decode_unsupported_function_drains_buffer() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(&[0x01, 0x66, 0x01, 0x02, 0x03][..]);
            assert!(matches!(
                codec.decode(&mut buf),
                Err(Error::Unsupported(0x66))
            ));
            assert!(buf.is_empty());
        }

        #[test]
        fn encode_read_request() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::new();
            let req = Request::ReadHoldingRegisters(0x00, 3);
            let adu = RequestAdu {
                hdr: Header { station: 0x01 },
                pdu: req.into(),
            };
            codec.encode(adu, &mut buf).unwrap();

            assert_eq!(
                buf,
                Bytes::from_static(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x03, 0x05, 0xCB])
            );
        }

        #[test]
        fn encode_oversized_pdu() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::new();
            let req = Request::Custom(0x65, vec![0x00; MAX_PDU_LEN]);
            let adu = RequestAdu {
                hdr: Header { station: 0x01 },
                pdu: req.into(),
            };
            assert!(matches!(
                codec.encode(adu, &mut buf),
                Err(Error::InvalidSize)
            ));
        }
    }

    #[cfg(feature = "server")]
    mod server {

        use super::*;

        #[test]
        fn decode_read_holding_registers_request() {
            let mut codec = ServerCodec::default();
            let mut buf =
                BytesMut::from(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x03, 0x05, 0xCB][..]);
            let (hdr, parsed) = codec.decode(&mut buf).unwrap().unwrap();
            assert!(buf.is_empty());
            assert_eq!(hdr.station, 0x01);
            assert_eq!(parsed.unwrap(), Request::ReadHoldingRegisters(0x00, 3));
        }

        #[test]
        fn decode_request_with_invalid_crc_recovers() {
            let mut codec = ServerCodec::default();
            // A corrupted frame directly followed by a valid one.
            let mut buf =
                BytesMut::from(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x03, 0x05, 0xCC][..]);
            buf.extend_from_slice(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x03, 0x05, 0xCB]);
            let (hdr, parsed) = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(hdr.station, 0x01);
            assert_eq!(parsed.unwrap(), Request::ReadHoldingRegisters(0x00, 3));
        }

        #[test]
        fn encode_read_response() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::new();
            let rsp = Response::ReadHoldingRegisters(vec![0x0001, 0x0002, 0x0003]);
            let adu = ResponseAdu {
                hdr: Header { station: 0x01 },
                pdu: rsp.into(),
            };
            codec.encode(adu, &mut buf).unwrap();
            assert_eq!(
                buf,
                Bytes::from_static(&[
                    0x01, 0x03, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0xFD, 0x74
                ])
            );
        }
    }
}
