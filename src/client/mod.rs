//! Modbus clients.

#[cfg(feature = "ascii")]
pub mod ascii;

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;

#[cfg(feature = "rtu")]
use crate::codec::rtu::PduLenHint;
use crate::{
    error::Error,
    frame::{
        Address, Coil, Quantity, Request, Response, Word, ADDRESS_SPACE, MAX_READ_BITS,
        MAX_READ_REGISTERS, MAX_WRITE_BITS, MAX_WRITE_REGISTERS,
    },
    station::{Station, StationContext},
};

/// A transport independent asynchronous client trait.
#[async_trait]
pub trait Client: StationContext + Debug + Send {
    /// Invoke a Modbus function and await its response.
    ///
    /// This is the raw command entry point: the request is sent as a single
    /// frame without splitting, and the response payload is returned as
    /// decoded. A received exception frame surfaces as
    /// [`Error::Exception`].
    async fn call(&mut self, req: Request) -> Result<Response, Error>;
}

/// Tuning knobs applied when attaching a client to a transport.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// How long to await a response before giving up with
    /// [`Error::Timeout`]. Broadcast requests never time out because
    /// nothing is awaited.
    pub read_timeout: Option<Duration>,

    /// Pause after each successfully decoded frame, e.g. to respect
    /// inter-frame silence on serial links. Serial transports only.
    pub delay_after_read: Option<Duration>,

    /// Frame length lookup for responses with user-defined function codes.
    /// Only used by RTU transports, which cannot infer the length of
    /// unknown function codes from the framing.
    #[cfg(feature = "rtu")]
    pub pdu_len_hint: Option<PduLenHint>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            read_timeout: Some(Duration::from_millis(300)),
            delay_after_read: None,
            #[cfg(feature = "rtu")]
            pdu_len_hint: None,
        }
    }
}

/// An asynchronous Modbus reader.
#[async_trait]
pub trait Reader: Client {
    async fn read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>, Error>;

    async fn read_discrete_inputs(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Coil>, Error>;

    async fn read_holding_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>, Error>;

    async fn read_input_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>, Error>;
}

/// An asynchronous Modbus writer.
#[async_trait]
pub trait Writer: Client {
    async fn write_single_coil(&mut self, addr: Address, state: Coil) -> Result<(), Error>;

    async fn write_single_register(&mut self, addr: Address, word: Word) -> Result<(), Error>;

    async fn write_multiple_coils(&mut self, addr: Address, coils: &[Coil]) -> Result<(), Error>;

    async fn write_multiple_registers(
        &mut self,
        addr: Address,
        words: &[Word],
    ) -> Result<(), Error>;
}

/// An asynchronous Modbus client context.
///
/// Requests whose quantity exceeds the per-function item limit are split
/// into contiguous chunks of at most that limit, the final chunk taking the
/// remainder. Quantities are pre-clamped so that no request runs past the
/// end of the address space.
#[derive(Debug)]
pub struct Context {
    client: Box<dyn Client>,
}

impl From<Box<dyn Client>> for Context {
    fn from(client: Box<dyn Client>) -> Self {
        Self { client }
    }
}

impl From<Context> for Box<dyn Client> {
    fn from(from: Context) -> Self {
        from.client
    }
}

impl Context {
    /// Clamp `cnt` so the addressed range stays within the address space.
    fn clamp_quantity(addr: Address, cnt: Quantity) -> Quantity {
        let space_left = ADDRESS_SPACE - u32::from(addr);
        u32::from(cnt).min(space_left) as Quantity
    }

    async fn read_chunks<T>(
        &mut self,
        addr: Address,
        cnt: Quantity,
        max: Quantity,
        request: fn(Address, Quantity) -> Request,
        extract: fn(Response) -> Option<Vec<T>>,
    ) -> Result<Vec<T>, Error> {
        let mut remaining = Self::clamp_quantity(addr, cnt);
        let mut chunk_addr = addr;
        let mut items = Vec::with_capacity(remaining.into());
        loop {
            let chunk = remaining.min(max);
            let rsp = self.client.call(request(chunk_addr, chunk)).await?;
            let mut chunk_items = extract(rsp)
                .ok_or_else(|| Error::InvalidResponse("unexpected response".into()))?;
            if chunk_items.len() < usize::from(chunk) {
                return Err(Error::InvalidResponse(format!(
                    "expected {chunk} items, response carries {}",
                    chunk_items.len()
                )));
            }
            chunk_items.truncate(chunk.into());
            items.extend(chunk_items);
            remaining -= chunk;
            if remaining == 0 {
                break;
            }
            chunk_addr = chunk_addr.wrapping_add(chunk);
        }
        Ok(items)
    }

    async fn write_chunks<T: Copy>(
        &mut self,
        addr: Address,
        items: &[T],
        max: Quantity,
        request: fn(Address, Vec<T>) -> Request,
        extract: fn(Response) -> Option<(Address, Quantity)>,
    ) -> Result<(), Error> {
        let clamped = usize::from(Self::clamp_quantity(
            addr,
            items.len().min(usize::from(Quantity::MAX)) as Quantity,
        ));
        let mut rest = &items[..clamped];
        let mut chunk_addr = addr;
        loop {
            let (chunk, tail) = rest.split_at(rest.len().min(usize::from(max)));
            let rsp = self.client.call(request(chunk_addr, chunk.to_vec())).await?;
            let (rsp_addr, rsp_cnt) = extract(rsp)
                .ok_or_else(|| Error::InvalidResponse("unexpected response".into()))?;
            if rsp_addr != chunk_addr || usize::from(rsp_cnt) != chunk.len() {
                return Err(Error::InvalidResponse(format!(
                    "write echo mismatch: request = ({chunk_addr}, {}), response = ({rsp_addr}, {rsp_cnt})",
                    chunk.len()
                )));
            }
            rest = tail;
            if rest.is_empty() {
                break;
            }
            chunk_addr = chunk_addr.wrapping_add(chunk.len() as Quantity);
        }
        Ok(())
    }
}

impl StationContext for Context {
    fn set_station(&mut self, station: Station) {
        self.client.set_station(station);
    }
}

#[async_trait]
impl Client for Context {
    async fn call(&mut self, request: Request) -> Result<Response, Error> {
        self.client.call(request).await
    }
}

#[async_trait]
impl Reader for Context {
    async fn read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>, Error> {
        self.read_chunks(addr, cnt, MAX_READ_BITS, Request::ReadCoils, |rsp| {
            if let Response::ReadCoils(coils) = rsp {
                Some(coils)
            } else {
                None
            }
        })
        .await
    }

    async fn read_discrete_inputs(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Coil>, Error> {
        self.read_chunks(addr, cnt, MAX_READ_BITS, Request::ReadDiscreteInputs, |rsp| {
            if let Response::ReadDiscreteInputs(coils) = rsp {
                Some(coils)
            } else {
                None
            }
        })
        .await
    }

    async fn read_holding_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>, Error> {
        self.read_chunks(
            addr,
            cnt,
            MAX_READ_REGISTERS,
            Request::ReadHoldingRegisters,
            |rsp| {
                if let Response::ReadHoldingRegisters(words) = rsp {
                    Some(words)
                } else {
                    None
                }
            },
        )
        .await
    }

    async fn read_input_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>, Error> {
        self.read_chunks(
            addr,
            cnt,
            MAX_READ_REGISTERS,
            Request::ReadInputRegisters,
            |rsp| {
                if let Response::ReadInputRegisters(words) = rsp {
                    Some(words)
                } else {
                    None
                }
            },
        )
        .await
    }
}

#[async_trait]
impl Writer for Context {
    async fn write_single_coil(&mut self, addr: Address, state: Coil) -> Result<(), Error> {
        let value = if state { 0xFF00 } else { 0x0000 };
        let rsp = self.client.call(Request::WriteSingleCoil(addr, value)).await?;
        match rsp {
            Response::WriteSingleCoil(rsp_addr, rsp_value)
                if rsp_addr == addr && rsp_value == value =>
            {
                Ok(())
            }
            Response::WriteSingleCoil(_, _) => Err(Error::InvalidResponse(
                "write echo mismatch".into(),
            )),
            _ => Err(Error::InvalidResponse("unexpected response".into())),
        }
    }

    async fn write_single_register(&mut self, addr: Address, word: Word) -> Result<(), Error> {
        let rsp = self
            .client
            .call(Request::WriteSingleRegister(addr, word))
            .await?;
        match rsp {
            Response::WriteSingleRegister(rsp_addr, rsp_word)
                if rsp_addr == addr && rsp_word == word =>
            {
                Ok(())
            }
            Response::WriteSingleRegister(_, _) => Err(Error::InvalidResponse(
                "write echo mismatch".into(),
            )),
            _ => Err(Error::InvalidResponse("unexpected response".into())),
        }
    }

    async fn write_multiple_coils(&mut self, addr: Address, coils: &[Coil]) -> Result<(), Error> {
        self.write_chunks(addr, coils, MAX_WRITE_BITS, Request::WriteMultipleCoils, |rsp| {
            if let Response::WriteMultipleCoils(addr, cnt) = rsp {
                Some((addr, cnt))
            } else {
                None
            }
        })
        .await
    }

    async fn write_multiple_registers(
        &mut self,
        addr: Address,
        words: &[Word],
    ) -> Result<(), Error> {
        self.write_chunks(
            addr,
            words,
            MAX_WRITE_REGISTERS,
            Request::WriteMultipleRegisters,
            |rsp| {
                if let Response::WriteMultipleRegisters(addr, cnt) = rsp {
                    Some((addr, cnt))
                } else {
                    None
                }
            },
        )
        .await
    }
}
