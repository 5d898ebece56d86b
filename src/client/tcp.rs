//! TCP client connections.

use std::{fmt, net::SocketAddr};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use super::*;

/// Establish a direct connection to a Modbus TCP coupler.
pub async fn connect(socket_addr: SocketAddr) -> Result<Context, Error> {
    connect_station(socket_addr, Station::tcp_device()).await
}

/// Connect to a physical, broadcast, or custom Modbus device, probably
/// through a Modbus TCP gateway that is forwarding messages to/from the
/// corresponding station.
pub async fn connect_station(socket_addr: SocketAddr, station: Station) -> Result<Context, Error> {
    connect_station_with(socket_addr, station, Options::default()).await
}

/// Connect with explicit [`Options`].
pub async fn connect_station_with(
    socket_addr: SocketAddr,
    station: Station,
    options: Options,
) -> Result<Context, Error> {
    let transport = TcpStream::connect(socket_addr).await?;
    // Nagle batching adds latency to the small request-response frames.
    transport.set_nodelay(true)?;
    Ok(attach_station_with(transport, station, options))
}

/// Attach a new client context to a direct transport connection.
///
/// The connection could either be an ordinary [`TcpStream`] or any other
/// byte stream talking Modbus TCP framing.
pub fn attach<T>(transport: T) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    attach_station(transport, Station::tcp_device())
}

/// Attach a new client context to a transport connection.
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
    let client = crate::service::tcp::Client::new(transport, station, options);
    Context::from(Box::new(client) as Box<dyn Client>)
}
