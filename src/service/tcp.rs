use std::{
    fmt, io,
    sync::atomic::{AtomicU16, Ordering},
    time::Duration,
};

use futures_util::{sink::SinkExt as _, stream::StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    client::Options,
    codec,
    error::Error,
    frame::{tcp::*, *},
    station::{Station, StationContext},
};

use super::{broadcast_echo, verify_response_pdu};

const INITIAL_TRANSACTION_ID: TransactionId = 0;

/// Modbus TCP client
#[derive(Debug)]
pub(crate) struct Client<T> {
    framed: Framed<T, codec::tcp::ClientCodec>,
    station: Station,
    transaction_id: AtomicU16,
    read_timeout: Option<Duration>,
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(transport: T, station: Station, options: Options) -> Self {
        let framed = Framed::new(transport, codec::tcp::ClientCodec::default());
        Self {
            framed,
            station,
            transaction_id: AtomicU16::new(INITIAL_TRANSACTION_ID),
            read_timeout: options.read_timeout,
        }
    }

    fn next_transaction_id(&self) -> TransactionId {
        let transaction_id = self.transaction_id.load(Ordering::Relaxed);
        self.transaction_id
            .store(transaction_id.wrapping_add(1), Ordering::Relaxed);
        transaction_id
    }

    fn next_request_adu<R>(&self, req: R) -> RequestAdu
    where
        R: Into<RequestPdu>,
    {
        RequestAdu {
            hdr: Header {
                transaction_id: self.next_transaction_id(),
                unit_id: self.station.into(),
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
        let await_matching = async {
            loop {
                let res_adu = framed.next().await.unwrap_or_else(|| {
                    Err(Error::Transport(io::ErrorKind::BrokenPipe.into()))
                })?;
                if res_adu.hdr.transaction_id != req_hdr.transaction_id {
                    // Responses to requests that have been abandoned, e.g.
                    // after a timeout, are consumed silently.
                    log::warn!(
                        "Discarding response with stale transaction id {} (expected {})",
                        res_adu.hdr.transaction_id,
                        req_hdr.transaction_id
                    );
                    continue;
                }
                if res_adu.hdr.unit_id != req_hdr.unit_id {
                    return Err(Error::InvalidResponse(format!(
                        "unit id mismatch: request = {}, response = {}",
                        req_hdr.unit_id, res_adu.hdr.unit_id
                    )));
                }
                return Ok(res_adu);
            }
        };
        let res_adu = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, await_matching)
                .await
                .map_err(|_| Error::Timeout)??,
            None => await_matching.await?,
        };

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
