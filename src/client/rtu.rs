//! RTU client connections.
//!
//! Opening and configuring the serial port is the application's business;
//! any [`AsyncRead`] + [`AsyncWrite`] byte stream can carry the client.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use super::*;

/// Attach a new client context to a transport, addressing `station`.
pub fn attach_station<T>(transport: T, station: Station) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    attach_station_with(transport, station, Options::default())
}

/// Attach with explicit [`Options`].
pub fn attach_station_with<T>(transport: T, station: Station, options: Options) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    let client = crate::service::rtu::Client::new(transport, station, options);
    Context::from(Box::new(client) as Box<dyn Client>)
}
