//! Common types

pub use crate::client;

#[allow(missing_docs)]
#[cfg(feature = "ascii")]
pub mod ascii {
    pub use crate::client::ascii::*;
}

#[allow(missing_docs)]
#[cfg(feature = "rtu")]
pub mod rtu {
    pub use crate::client::rtu::*;
}

#[allow(missing_docs)]
#[cfg(feature = "tcp")]
pub mod tcp {
    pub use crate::client::tcp::*;
}

#[cfg(feature = "server")]
pub use crate::server;

pub use crate::error::{Error, Result};

pub use crate::frame::{ExceptionCode, Request, Response};

pub use crate::station::{Station, StationContext, StationId};

pub use crate::client::{Client, Context, Options, Reader, Writer};

#[cfg(feature = "server")]
pub use crate::server::{
    memory::{MemoryArea, MemoryKind, MemoryStore},
    MemoryService, Service,
};
