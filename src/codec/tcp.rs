use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{error::Error, frame::tcp::*, frame::*};

use super::*;

const HEADER_LEN: usize = 7;

const PROTOCOL_ID: u16 = 0x0000; // Modbus

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct AduDecoder;

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ClientCodec {
    decoder: AduDecoder,
}

#[cfg(feature = "server")]
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ServerCodec {
    decoder: AduDecoder,
}

impl Decoder for AduDecoder {
    type Item = (Header, Bytes);
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<(Header, Bytes)>, Error> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = usize::from(BigEndian::read_u16(&buf[4..6]));
        // len = PDU bytes + one byte (unit id); a PDU is never shorter
        // than a single function code byte.
        if len < 2 {
            return Err(Error::InvalidResponse(format!("invalid MBAP length: {len}")));
        }
        let pdu_len = len - 1;
        if buf.len() < HEADER_LEN + pdu_len {
            return Ok(None);
        }

        let header_data = buf.split_to(HEADER_LEN);

        let protocol_id = BigEndian::read_u16(&header_data[2..4]);
        if protocol_id != PROTOCOL_ID {
            // Drain the declared frame length before surfacing the error so
            // a desynchronized peer cannot poison subsequent frames.
            let _ = buf.split_to(pdu_len);
            return Err(Error::InvalidResponse(format!(
                "invalid protocol identifier: expected = {PROTOCOL_ID}, actual = {protocol_id}"
            )));
        }

        let transaction_id = BigEndian::read_u16(&header_data[0..2]);
        let unit_id = header_data[6];

        let header = Header {
            transaction_id,
            unit_id,
        };

        let pdu_data = buf.split_to(pdu_len).freeze();

        Ok(Some((header, pdu_data)))
    }
}

impl Decoder for ClientCodec {
    type Item = ResponseAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseAdu>, Error> {
        if let Some((hdr, pdu_data)) = self.decoder.decode(buf)? {
            let pdu = ResponsePdu::try_from(pdu_data)?;
            Ok(Some(ResponseAdu { hdr, pdu }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(feature = "server")]
impl Decoder for ServerCodec {
    type Item = (Header, ParsedRequest);
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<(Header, ParsedRequest)>, Error> {
        if let Some((hdr, pdu_data)) = self.decoder.decode(buf)? {
            let parsed = decode_request(&pdu_data)?;
            Ok(Some((hdr, parsed)))
        } else {
            Ok(None)
        }
    }
}

fn encode_adu(buf: &mut BytesMut, hdr: Header, pdu_data: &Bytes) -> Result<(), Error> {
    let len = u16::try_from(pdu_data.len() + 1).map_err(|_| Error::InvalidSize)?;
    buf.reserve(pdu_data.len() + HEADER_LEN);
    buf.put_u16(hdr.transaction_id);
    buf.put_u16(PROTOCOL_ID);
    buf.put_u16(len);
    buf.put_u8(hdr.unit_id);
    buf.put_slice(pdu_data);
    Ok(())
}

impl Encoder<RequestAdu> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, adu: RequestAdu, buf: &mut BytesMut) -> Result<(), Error> {
        let RequestAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        encode_adu(buf, hdr, &pdu_data)
    }
}

#[cfg(feature = "server")]
impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<(), Error> {
        let ResponseAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        encode_adu(buf, hdr, &pdu_data)
    }
}
