use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{error::Error, frame::ascii::*, frame::*, station::StationId};

use super::*;

const FRAME_START: u8 = b':';

// Start delimiter, two hex characters for each of station address,
// function code, 252 data bytes and the LRC, then CR LF.
const MAX_FRAME_LEN: usize = 1 + 2 * 255 + 2;

const MAX_PDU_LEN: usize = 253;

#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct ClientCodec;

#[cfg(feature = "server")]
#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct ServerCodec;

/// Extract one CRLF-terminated frame from the buffer and decode it into
/// station address and PDU bytes.
///
/// Leading noise before the start delimiter is dropped. The frame is
/// consumed up to and including the line feed before any of its content is
/// validated, so a broken frame never stalls resynchronization.
fn decode_frame(buf: &mut BytesMut) -> Result<Option<(StationId, Bytes)>, Error> {
    let Some(start) = buf.iter().position(|&b| b == FRAME_START) else {
        if !buf.is_empty() {
            log::warn!("Dropped {} byte(s) without start delimiter", buf.len());
            buf.clear();
        }
        return Ok(None);
    };
    if start > 0 {
        log::warn!("Dropped {start} byte(s) before start delimiter");
        buf.advance(start);
    }

    let Some(lf) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_FRAME_LEN {
            buf.clear();
            return Err(Error::InvalidResponse("frame delimiter missing".into()));
        }
        // Incomplete frame
        return Ok(None);
    };

    let line = buf.split_to(lf + 1);
    let line = &line[1..line.len() - 1];
    let Some(line) = line.strip_suffix(b"\r") else {
        return Err(Error::InvalidResponse(
            "carriage return missing before line feed".into(),
        ));
    };
    if line.len() % 2 != 0 || line.len() < 6 {
        return Err(Error::InvalidResponse(format!(
            "unframeable character count: {}",
            line.len()
        )));
    }

    let mut decoded = Vec::with_capacity(line.len() / 2);
    for pair in line.chunks(2) {
        let (Some(hi), Some(lo)) = (hex_value(pair[0]), hex_value(pair[1])) else {
            return Err(Error::InvalidResponse(format!(
                "invalid hex pair: {:X?}",
                pair
            )));
        };
        decoded.push(hi << 4 | lo);
    }

    // A valid frame sums to zero including the transmitted LRC.
    let sum = decoded.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != 0 {
        return Err(Error::InvalidChecksum { sum });
    }

    let station = decoded[0];
    let pdu_data = Bytes::copy_from_slice(&decoded[1..decoded.len() - 1]);
    Ok(Some((station, pdu_data)))
}

fn encode_frame(buf: &mut BytesMut, station: StationId, pdu_data: &Bytes) -> Result<(), Error> {
    if pdu_data.len() > MAX_PDU_LEN {
        return Err(Error::InvalidSize);
    }
    buf.reserve(1 + 2 * (pdu_data.len() + 2) + 2);
    buf.put_u8(FRAME_START);
    put_hex(buf, station);
    for b in pdu_data {
        put_hex(buf, *b);
    }
    let lrc = calc_lrc(station, pdu_data);
    put_hex(buf, lrc);
    buf.put_slice(b"\r\n");
    Ok(())
}

/// The LRC is the two's-complement negation of the sum of all frame bytes
/// before it.
pub(crate) fn calc_lrc(station: StationId, pdu_data: &[u8]) -> u8 {
    pdu_data
        .iter()
        .fold(station, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg()
}

fn put_hex(buf: &mut BytesMut, byte: u8) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    buf.put_u8(HEX[usize::from(byte >> 4)]);
    buf.put_u8(HEX[usize::from(byte & 0x0F)]);
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

impl Decoder for ClientCodec {
    type Item = ResponseAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseAdu>, Error> {
        let Some((station, pdu_data)) = decode_frame(buf)? else {
            return Ok(None);
        };

        let hdr = Header { station };
        let pdu = ResponsePdu::try_from(pdu_data)?;
        Ok(Some(ResponseAdu { hdr, pdu }))
    }
}

#[cfg(feature = "server")]
impl Decoder for ServerCodec {
    type Item = (Header, ParsedRequest);
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<(Header, ParsedRequest)>, Error> {
        let Some((station, pdu_data)) = decode_frame(buf)? else {
            return Ok(None);
        };

        let hdr = Header { station };
        let parsed = decode_request(&pdu_data)?;
        Ok(Some((hdr, parsed)))
    }
}

impl Encoder<RequestAdu> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, adu: RequestAdu, buf: &mut BytesMut) -> Result<(), Error> {
        let RequestAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        encode_frame(buf, hdr.station, &pdu_data)
    }
}

#[cfg(feature = "server")]
impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<(), Error> {
        let ResponseAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        encode_frame(buf, hdr.station, &pdu_data)
    }
}
