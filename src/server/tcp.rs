//! Modbus TCP server skeleton.

use std::{future::Future, io, net::SocketAddr, time::Duration};

use futures_util::{sink::SinkExt as _, stream::StreamExt as _};
use socket2::{Domain, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use crate::{
    codec,
    error::Error,
    frame::{tcp::ResponseAdu, ExceptionResponse},
    server::{NewService, Service},
    station::Station,
};

#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    station: Station,
    read_timeout: Option<Duration>,
    keep_alive: Option<Duration>,
}

impl Server {
    /// Attach the server to a bound listener.
    #[must_use]
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            station: Station::tcp_device(),
            read_timeout: None,
            keep_alive: None,
        }
    }

    /// Bind a listener and attach the server to it.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self::new(TcpListener::bind(addr).await?))
    }

    /// Bind with an explicit accept backlog, which bounds the number of
    /// clients that can connect concurrently before `accept` catches up.
    pub fn bind_with_backlog(addr: SocketAddr, backlog: u32) -> io::Result<Self> {
        Ok(Self::new(listener(addr, backlog)?))
    }

    /// The station address served by this instance. Requests addressed to
    /// any other unit id (except broadcast) are consumed without a reply.
    /// Defaults to [`Station::tcp_device`].
    #[must_use]
    pub fn station(mut self, station: Station) -> Self {
        self.station = station;
        self
    }

    /// Close a connection when no frame arrives within `timeout`.
    /// Connections are kept open indefinitely by default.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Enable TCP keep-alive probing on accepted connections.
    #[must_use]
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = Some(interval);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, spawning one task per connection.
    pub async fn serve<S>(&self, service: S) -> Result<(), Error>
    where
        S: NewService,
        S::Instance: Send + Sync + 'static,
    {
        loop {
            let (stream, _) = self.listener.accept().await?;
            stream.set_nodelay(true)?;
            if let Some(interval) = self.keep_alive {
                let sock = socket2::SockRef::from(&stream);
                sock.set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(interval))?;
            }

            let framed = Framed::new(stream, codec::tcp::ServerCodec::default());
            let service = service.new_service()?;
            let station = self.station;
            let read_timeout = self.read_timeout;

            tokio::spawn(async move {
                if let Err(err) = process(framed, service, station, read_timeout).await {
                    log::error!("Closing connection: {err}");
                }
            });
        }
    }

    /// Serve until the shutdown signal resolves.
    pub async fn serve_until<S, Sd>(self, service: S, shutdown_signal: Sd) -> Result<(), Error>
    where
        S: NewService,
        S::Instance: Send + Sync + 'static,
        Sd: Future<Output = ()>,
    {
        tokio::select! {
            res = self.serve(service) => res,
            () = shutdown_signal => {
                log::trace!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

/// The request-response loop run for each accepted connection.
async fn process<S>(
    mut framed: Framed<TcpStream, codec::tcp::ServerCodec>,
    service: S,
    station: Station,
    read_timeout: Option<Duration>,
) -> Result<(), Error>
where
    S: Service,
{
    loop {
        let next = match read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, framed.next())
                .await
                .map_err(|_| Error::Timeout)?,
            None => framed.next().await,
        };

        let Some(item) = next else {
            // Peer closed the connection
            break;
        };
        let (hdr, parsed) = item?;

        if hdr.unit_id != station.0 && !Station(hdr.unit_id).is_broadcast() {
            log::debug!("Discarding frame addressed to unit {}", hdr.unit_id);
            continue;
        }
        let broadcast = Station(hdr.unit_id).is_broadcast();

        let req = match parsed {
            Ok(req) => req,
            Err(ex) => {
                if !broadcast {
                    framed.send(ResponseAdu { hdr, pdu: ex.into() }).await?;
                }
                continue;
            }
        };

        if broadcast && !req.is_write() {
            log::warn!(
                "Dropping broadcast request with function code {} that would require a response",
                req.function_code()
            );
            continue;
        }

        let function = req.function_code();
        let hook_req = req.clone();
        match service.call(req).await {
            Ok(rsp) => {
                if !broadcast {
                    framed
                        .send(ResponseAdu {
                            hdr,
                            pdu: rsp.into(),
                        })
                        .await?;
                }
                service.after_send(&hook_req);
            }
            Err(exception) => {
                if !broadcast {
                    framed
                        .send(ResponseAdu {
                            hdr,
                            pdu: ExceptionResponse {
                                function,
                                exception,
                            }
                            .into(),
                        })
                        .await?;
                }
            }
        }
    }
    Ok(())
}

/// Configure and open a TCP listener with an explicit backlog.
fn listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let listener = match addr {
        SocketAddr::V4(_) => Socket::new(Domain::IPV4, Type::STREAM, None)?,
        SocketAddr::V6(_) => Socket::new(Domain::IPV6, Type::STREAM, None)?,
    };
    listener.set_nonblocking(true)?;
    listener.set_reuse_address(true)?;
    listener.bind(&addr.into())?;
    listener.listen(backlog.try_into().unwrap_or(i32::MAX))?;
    TcpListener::from_std(listener.into())
}
