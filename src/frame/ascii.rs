//! ASCII shares the serial ADU layout with RTU; only the framing
//! (hex transcription and LRC instead of CRC) differs.

#[cfg(not(feature = "rtu"))]
use crate::station::StationId;

#[cfg(feature = "rtu")]
pub(crate) use super::rtu::{Header, RequestAdu, ResponseAdu};

#[cfg(not(feature = "rtu"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) station: StationId,
}

#[cfg(not(feature = "rtu"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequestAdu {
    pub(crate) hdr: Header,
    pub(crate) pdu: super::RequestPdu,
}

#[cfg(not(feature = "rtu"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseAdu {
    pub(crate) hdr: Header,
    pub(crate) pdu: super::ResponsePdu,
}
