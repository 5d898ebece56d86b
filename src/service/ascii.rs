use std::{fmt, io, time::Duration};

use futures_util::{sink::SinkExt as _, stream::StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    client::Options,
    codec,
    error::Error,
    frame::{ascii::*, *},
    station::{Station, StationContext},
};

use super::{broadcast_echo, verify_response_pdu};

/// Modbus ASCII client
#[derive(Debug)]
pub(crate) struct Client<T> {
    framed: Framed<T, codec::ascii::ClientCodec>,
    station: Station,
    read_timeout: Option<Duration>,
    delay_after_read: Option<Duration>,
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(transport: T, station: Station, options: Options) -> Self {
        let framed = Framed::new(transport, codec::ascii::ClientCodec);
        Self {
            framed,
            station,
            read_timeout: options.read_timeout,
            delay_after_read: options.delay_after_read,
        }
    }

    fn next_request_adu<R>(&self, req: R) -> RequestAdu
    where
        R: Into<RequestPdu>,
    {
        RequestAdu {
            hdr: Header {
                station: self.station.into(),
            },
            pdu: req.into(),
        }
    }

    pub(crate) async fn call(&mut self, req: Request) -> Result<Response, Error> {
        log::debug!("Call {req:?}");
        let broadcast = self.station.is_broadcast();
        if broadcast && !req.is_write() {
            return Err(Error::InvalidArgument("broadcast requests must be writes"));
        }
        let function = req.function_code();
        let echo = broadcast.then(|| broadcast_echo(&req));
        let req_adu = self.next_request_adu(req);
        let req_hdr = req_adu.hdr;

        // Drop stale inbound bytes of abandoned transactions.
        self.framed.read_buffer_mut().clear();

        self.framed.send(req_adu).await?;
        if let Some(echo) = echo {
            // Nothing to await on a broadcast.
            return Ok(echo);
        }

        let framed = &mut self.framed;
        let await_response = async {
            framed
                .next()
                .await
                .unwrap_or_else(|| Err(Error::Transport(io::ErrorKind::BrokenPipe.into())))
        };
        let res_adu = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, await_response)
                .await
                .map_err(|_| Error::Timeout)??,
            None => await_response.await?,
        };

        if let Some(delay) = self.delay_after_read {
            tokio::time::sleep(delay).await;
        }

        if res_adu.hdr != req_hdr {
            return Err(Error::InvalidResponse(format!(
                "station mismatch: request = {}, response = {}",
                req_hdr.station, res_adu.hdr.station
            )));
        }

        verify_response_pdu(function, res_adu.pdu)
    }
}

impl<T> StationContext for Client<T> {
    fn set_station(&mut self, station: Station) {
        self.station = station;
    }
}

#[async_trait::async_trait]
impl<T> crate::client::Client for Client<T>
where
    T: fmt::Debug + AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn call(&mut self, req: Request) -> Result<Response, Error> {
        Client::call(self, req).await
    }
}
