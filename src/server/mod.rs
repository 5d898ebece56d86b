//! Modbus server skeletons and request processing.

pub mod memory;

mod service;

pub use service::{MemoryService, NewService, Service};

#[cfg(feature = "ascii")]
pub mod ascii;

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;
