use std::{future, io, sync::Arc};

use byteorder::{BigEndian, ByteOrder};

use crate::{
    codec::u16_coil_to_bool,
    frame::{
        Address, Coil, ExceptionCode, Quantity, Request, Response, Word, ADDRESS_SPACE,
        MAX_READ_BITS, MAX_READ_REGISTERS, MAX_WRITE_BITS, MAX_WRITE_REGISTERS,
    },
    server::memory::{MemoryKind, MemoryStore},
};

/// A Modbus server service.
///
/// This is the seam for dispatching requests. The crate ships
/// [`MemoryService`] for the standard data-access function codes; custom
/// services can answer user-defined codes (100-127) arriving as
/// [`Request::Custom`].
pub trait Service {
    /// The future response value.
    type Future: future::Future<Output = Result<Response, ExceptionCode>> + Send;

    /// Process the request and return the response asynchronously.
    fn call(&self, req: Request) -> Self::Future;

    /// Invoked by the dispatch loops once the reply for `req` has been
    /// written to the transport, or directly after processing a broadcast
    /// request that produces no reply. Only called for requests that were
    /// processed successfully. The default does nothing.
    fn after_send(&self, _req: &Request) {}
}

/// Creates new `Service` values, one per accepted connection.
pub trait NewService {
    /// The `Service` value created by this factory.
    type Instance: Service;

    /// Create and return a new service value.
    fn new_service(&self) -> io::Result<Self::Instance>;
}

impl<F, R> NewService for F
where
    F: Fn() -> io::Result<R>,
    R: Service,
{
    type Instance = R;

    fn new_service(&self) -> io::Result<R> {
        (*self)()
    }
}

impl<S: NewService + ?Sized> NewService for Arc<S> {
    type Instance = S::Instance;

    fn new_service(&self) -> io::Result<S::Instance> {
        (**self).new_service()
    }
}

impl<S: Service + ?Sized + 'static> Service for Box<S> {
    type Future = S::Future;

    fn call(&self, request: Request) -> Self::Future {
        (**self).call(request)
    }

    fn after_send(&self, req: &Request) {
        (**self).after_send(req);
    }
}

impl<S: Service + ?Sized + 'static> Service for Arc<S> {
    type Future = S::Future;

    fn call(&self, request: Request) -> Self::Future {
        (**self).call(request)
    }

    fn after_send(&self, req: &Request) {
        (**self).after_send(req);
    }
}

/// A [`Service`] answering the standard data-access function codes from a
/// [`MemoryStore`].
///
/// Validation is strict and ordered: quantity limits first
/// (`IllegalDataValue`), then address-space overflow (`IllegalDataAddress`),
/// then the coil value for single-coil writes (`IllegalDataValue`), and
/// finally area coverage (`IllegalDataAddress`). Function codes without a
/// handler answer `IllegalFunction`.
#[derive(Debug, Clone)]
pub struct MemoryService {
    store: MemoryStore,
}

impl MemoryService {
    #[must_use]
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn handle(&self, req: Request) -> Result<Response, ExceptionCode> {
        use Request::*;

        match req {
            ReadCoils(addr, quantity) => self
                .read_bits(MemoryKind::Coils, addr, quantity)
                .map(Response::ReadCoils),
            ReadDiscreteInputs(addr, quantity) => self
                .read_bits(MemoryKind::DiscreteInputs, addr, quantity)
                .map(Response::ReadDiscreteInputs),
            ReadHoldingRegisters(addr, quantity) => self
                .read_words(MemoryKind::HoldingRegisters, addr, quantity)
                .map(Response::ReadHoldingRegisters),
            ReadInputRegisters(addr, quantity) => self
                .read_words(MemoryKind::InputRegisters, addr, quantity)
                .map(Response::ReadInputRegisters),
            WriteSingleCoil(addr, value) => {
                let state =
                    u16_coil_to_bool(value).ok_or(ExceptionCode::IllegalDataValue)?;
                self.write_bits(addr, &[state])?;
                Ok(Response::WriteSingleCoil(addr, value))
            }
            WriteSingleRegister(addr, word) => {
                self.write_words(addr, &[word])?;
                Ok(Response::WriteSingleRegister(addr, word))
            }
            WriteMultipleCoils(addr, coils) => {
                let quantity = check_count(coils.len(), MAX_WRITE_BITS)?;
                self.write_bits(addr, &coils)?;
                Ok(Response::WriteMultipleCoils(addr, quantity))
            }
            WriteMultipleRegisters(addr, words) => {
                let quantity = check_count(words.len(), MAX_WRITE_REGISTERS)?;
                self.write_words(addr, &words)?;
                Ok(Response::WriteMultipleRegisters(addr, quantity))
            }
            Custom(_, _) => Err(ExceptionCode::IllegalFunction),
        }
    }

    fn read_bits(
        &self,
        kind: MemoryKind,
        addr: Address,
        quantity: Quantity,
    ) -> Result<Vec<Coil>, ExceptionCode> {
        check_quantity(quantity, MAX_READ_BITS)?;
        check_range(addr, quantity)?;
        let area = self
            .store
            .find(kind, addr, quantity)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        let first = usize::from(addr - area.base_address());
        Ok(area.with_bytes(|bytes| {
            (first..first + usize::from(quantity))
                .map(|bit| bytes[bit / 8] >> (bit % 8) & 0b1 > 0)
                .collect()
        }))
    }

    fn read_words(
        &self,
        kind: MemoryKind,
        addr: Address,
        quantity: Quantity,
    ) -> Result<Vec<Word>, ExceptionCode> {
        check_quantity(quantity, MAX_READ_REGISTERS)?;
        check_range(addr, quantity)?;
        let area = self
            .store
            .find(kind, addr, quantity)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        let first = usize::from(addr - area.base_address());
        Ok(area.with_bytes(|bytes| {
            (first..first + usize::from(quantity))
                .map(|reg| BigEndian::read_u16(&bytes[2 * reg..]))
                .collect()
        }))
    }

    fn write_bits(&self, addr: Address, states: &[Coil]) -> Result<(), ExceptionCode> {
        let quantity = states.len() as Quantity;
        check_range(addr, quantity)?;
        let area = self
            .store
            .find(MemoryKind::Coils, addr, quantity)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        let first = usize::from(addr - area.base_address());
        area.with_bytes(|bytes| {
            for (i, state) in states.iter().enumerate() {
                // Untouched bits of the boundary bytes keep their current
                // memory content.
                let bit = first + i;
                let mask = 1 << (bit % 8);
                if *state {
                    bytes[bit / 8] |= mask;
                } else {
                    bytes[bit / 8] &= !mask;
                }
            }
        });
        Ok(())
    }

    fn write_words(&self, addr: Address, words: &[Word]) -> Result<(), ExceptionCode> {
        let quantity = words.len() as Quantity;
        check_range(addr, quantity)?;
        let area = self
            .store
            .find(MemoryKind::HoldingRegisters, addr, quantity)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        let first = usize::from(addr - area.base_address());
        area.with_bytes(|bytes| {
            for (i, word) in words.iter().enumerate() {
                BigEndian::write_u16(&mut bytes[2 * (first + i)..], *word);
            }
        });
        Ok(())
    }
}

impl Service for MemoryService {
    type Future = future::Ready<Result<Response, ExceptionCode>>;

    fn call(&self, req: Request) -> Self::Future {
        future::ready(self.handle(req))
    }

    fn after_send(&self, req: &Request) {
        use Request::*;

        let (kind, addr, quantity) = match req {
            WriteSingleCoil(addr, _) => (MemoryKind::Coils, *addr, 1),
            WriteMultipleCoils(addr, coils) => {
                (MemoryKind::Coils, *addr, coils.len() as Quantity)
            }
            WriteSingleRegister(addr, _) => (MemoryKind::HoldingRegisters, *addr, 1),
            WriteMultipleRegisters(addr, words) => {
                (MemoryKind::HoldingRegisters, *addr, words.len() as Quantity)
            }
            _ => return,
        };
        if let Some(area) = self.store.find(kind, addr, quantity) {
            area.notify_written();
        }
    }
}

fn check_quantity(quantity: Quantity, max: Quantity) -> Result<(), ExceptionCode> {
    if quantity == 0 || quantity > max {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(())
}

fn check_count(count: usize, max: Quantity) -> Result<Quantity, ExceptionCode> {
    if count == 0 || count > usize::from(max) {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(count as Quantity)
}

fn check_range(addr: Address, quantity: Quantity) -> Result<(), ExceptionCode> {
    if u32::from(addr) + u32::from(quantity) > ADDRESS_SPACE {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(())
}
