#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![cfg_attr(not(test), warn(unsafe_code))]
#![warn(clippy::all)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::explicit_deref_methods)]
#![warn(clippy::explicit_into_iter_loop)]
#![warn(clippy::explicit_iter_loop)]
#![cfg_attr(not(test), warn(clippy::panic_in_result_fn))]
#![warn(rustdoc::broken_intra_doc_links)]
#![doc = include_str!("../README.md")]

pub mod prelude;

pub mod client;

pub mod station;

#[cfg(feature = "server")]
pub mod server;

mod codec;
mod error;
mod frame;
#[cfg(any(feature = "rtu", feature = "ascii", feature = "tcp"))]
mod service;

pub use crate::{
    error::{Error, Result},
    frame::{
        Address, Coil, ExceptionCode, FunctionCode, Quantity, Request, Response, Word,
        MAX_READ_BITS, MAX_READ_REGISTERS, MAX_WRITE_BITS, MAX_WRITE_REGISTERS,
    },
    station::{Station, StationContext, StationId},
};

#[cfg(feature = "rtu")]
pub use crate::codec::rtu::PduLenHint;
