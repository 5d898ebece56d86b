#[cfg(feature = "ascii")]
pub(crate) mod ascii;

#[cfg(feature = "rtu")]
pub(crate) mod rtu;

#[cfg(feature = "tcp")]
pub(crate) mod tcp;

use crate::{
    error::Error,
    frame::{FunctionCode, Quantity, Request, Response, ResponsePdu},
};

/// The response a broadcast write would have echoed.
///
/// Broadcasts produce no response on the wire; synthesizing the echo keeps
/// the write verification of the calling layer uniform.
fn broadcast_echo(req: &Request) -> Response {
    use Request::*;
    match req {
        WriteSingleCoil(addr, value) => Response::WriteSingleCoil(*addr, *value),
        WriteSingleRegister(addr, word) => Response::WriteSingleRegister(*addr, *word),
        WriteMultipleCoils(addr, coils) => {
            Response::WriteMultipleCoils(*addr, coils.len() as Quantity)
        }
        WriteMultipleRegisters(addr, words) => {
            Response::WriteMultipleRegisters(*addr, words.len() as Quantity)
        }
        _ => unreachable!("broadcast requests are always writes"),
    }
}

/// Check the function code echo and unwrap exception frames.
fn verify_response_pdu(function: FunctionCode, pdu: ResponsePdu) -> Result<Response, Error> {
    match pdu {
        ResponsePdu(Ok(rsp)) => {
            if rsp.function_code() != function {
                return Err(Error::InvalidResponse(format!(
                    "function code mismatch: request = {function}, response = {}",
                    rsp.function_code()
                )));
            }
            Ok(rsp)
        }
        ResponsePdu(Err(ex)) => {
            if ex.function != function {
                return Err(Error::InvalidResponse(format!(
                    "function code mismatch: request = {function}, exception response = {}",
                    ex.function
                )));
            }
            Err(Error::Exception(ex.exception))
        }
    }
}
