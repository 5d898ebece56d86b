//! Application-layer frames.

#[cfg(feature = "ascii")]
pub(crate) mod ascii;

#[cfg(feature = "rtu")]
pub(crate) mod rtu;

#[cfg(feature = "tcp")]
pub(crate) mod tcp;

use std::{error, fmt};

/// A Modbus function code is represented by an unsigned 8 bit integer.
pub type FunctionCode = u8;

/// A Modbus protocol address is represented by 16 bit from `0` to `65535`.
///
/// This *protocol address* uses 0-based indexing, while the *coil address* or
/// *register address* is often specified as a number with 1-based indexing.
/// Please consult the specification of your devices if 1-based coil/register
/// addresses need to be converted to 0-based protocol addresses by subtracting 1.
pub type Address = u16;

/// A Coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// Maximum number of coils/discrete inputs in a single read request.
pub const MAX_READ_BITS: Quantity = 2000;

/// Maximum number of coils in a single write request.
pub const MAX_WRITE_BITS: Quantity = 1968;

/// Maximum number of registers in a single read request.
pub const MAX_READ_REGISTERS: Quantity = 125;

/// Maximum number of holding registers in a single write request.
pub const MAX_WRITE_REGISTERS: Quantity = 123;

/// One past the highest Modbus protocol address.
pub(crate) const ADDRESS_SPACE: u32 = 0x1_0000;

/// A request represents a message from the client (master) to the server (slave).
///
/// The coil value of [`Request::WriteSingleCoil`] is carried as the raw wire
/// word (`0xFF00` = ON, `0x0000` = OFF). Keeping the raw value allows a server
/// to answer an out-of-range value with an exception response instead of
/// dropping the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadCoils(Address, Quantity),
    ReadDiscreteInputs(Address, Quantity),
    ReadHoldingRegisters(Address, Quantity),
    ReadInputRegisters(Address, Quantity),
    WriteSingleCoil(Address, Word),
    WriteSingleRegister(Address, Word),
    WriteMultipleCoils(Address, Vec<Coil>),
    WriteMultipleRegisters(Address, Vec<Word>),
    /// A raw PDU for function codes this crate does not interpret,
    /// e.g. the user-defined range 100-127.
    Custom(FunctionCode, Vec<u8>),
}

impl Request {
    /// The function code of this request.
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        use Request::*;
        match *self {
            ReadCoils(_, _) => 0x01,
            ReadDiscreteInputs(_, _) => 0x02,
            ReadHoldingRegisters(_, _) => 0x03,
            ReadInputRegisters(_, _) => 0x04,
            WriteSingleCoil(_, _) => 0x05,
            WriteSingleRegister(_, _) => 0x06,
            WriteMultipleCoils(_, _) => 0x0F,
            WriteMultipleRegisters(_, _) => 0x10,
            Custom(code, _) => code,
        }
    }

    /// Whether this request mutates server memory.
    ///
    /// Broadcast (station address 0) is only defined for write requests;
    /// [`Request::Custom`] is conservatively treated as a read.
    #[must_use]
    pub fn is_write(&self) -> bool {
        use Request::*;
        matches!(
            self,
            WriteSingleCoil(_, _)
                | WriteSingleRegister(_, _)
                | WriteMultipleCoils(_, _)
                | WriteMultipleRegisters(_, _)
        )
    }
}

/// The data of a successful request.
///
/// ReadCoils/ReadDiscreteInputs: The length of the result Vec is always a
/// multiple of 8. Only the values of the first bits/coils that have actually
/// been requested are defined. The value of the remaining bits depend on the
/// server implementation and those coils should be ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadCoils(Vec<Coil>),
    ReadDiscreteInputs(Vec<Coil>),
    ReadHoldingRegisters(Vec<Word>),
    ReadInputRegisters(Vec<Word>),
    WriteSingleCoil(Address, Word),
    WriteSingleRegister(Address, Word),
    WriteMultipleCoils(Address, Quantity),
    WriteMultipleRegisters(Address, Quantity),
    Custom(FunctionCode, Vec<u8>),
}

impl Response {
    /// The function code of this response.
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        use Response::*;
        match *self {
            ReadCoils(_) => 0x01,
            ReadDiscreteInputs(_) => 0x02,
            ReadHoldingRegisters(_) => 0x03,
            ReadInputRegisters(_) => 0x04,
            WriteSingleCoil(_, _) => 0x05,
            WriteSingleRegister(_, _) => 0x06,
            WriteMultipleCoils(_, _) => 0x0F,
            WriteMultipleRegisters(_, _) => 0x10,
            Custom(code, _) => code,
        }
    }
}

/// A server (slave) exception code.
///
/// "No exception" is never represented as a value of this type; an operation
/// that completes without an exception returns `Ok(_)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDevice = 0x0B,
}

impl ExceptionCode {
    pub(crate) fn description(&self) -> &'static str {
        use ExceptionCode::*;

        match *self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            ServerDeviceFailure => "Server device failure",
            Acknowledge => "Acknowledge",
            ServerDeviceBusy => "Server device busy",
            NegativeAcknowledge => "Negative acknowledge",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for ExceptionCode {}

/// A server (slave) exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExceptionResponse {
    pub(crate) function: FunctionCode,
    pub(crate) exception: ExceptionCode,
}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus function {}: {}", self.function, self.exception)
    }
}

impl error::Error for ExceptionResponse {}

/// Represents a message from the client (master) to the server (slave).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequestPdu(pub(crate) Request);

impl From<Request> for RequestPdu {
    fn from(from: Request) -> Self {
        RequestPdu(from)
    }
}

impl From<RequestPdu> for Request {
    fn from(from: RequestPdu) -> Self {
        from.0
    }
}

/// Represents a message from the server (slave) to the client (master).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponsePdu(pub(crate) Result<Response, ExceptionResponse>);

impl From<Response> for ResponsePdu {
    fn from(from: Response) -> Self {
        ResponsePdu(Ok(from))
    }
}

impl From<ExceptionResponse> for ResponsePdu {
    fn from(from: ExceptionResponse) -> Self {
        ResponsePdu(Err(from))
    }
}

impl From<ResponsePdu> for Result<Response, ExceptionResponse> {
    fn from(from: ResponsePdu) -> Self {
        from.0
    }
}

/// A request PDU decoded on the server side.
///
/// Structurally broken PDUs whose function code is still recognizable decode
/// to `Err(_)` carrying the exception response that must be sent back instead
/// of tearing down the connection.
#[cfg(feature = "server")]
pub(crate) type ParsedRequest = Result<Request, ExceptionResponse>;
