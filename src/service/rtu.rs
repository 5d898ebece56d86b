use std::{fmt, io, time::Duration};

use futures_util::{sink::SinkExt as _, stream::StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    client::Options,
    codec,
    error::Error,
    frame::{rtu::*, *},
    station::{Station, StationContext},
};

use super::{broadcast_echo, verify_response_pdu};

/// Modbus RTU client
#[derive(Debug)]
pub(crate) struct Client<T> {
    framed: Framed<T, codec::rtu::ClientCodec>,
    station: Station,
    read_timeout: Option<Duration>,
    delay_after_read: Option<Duration>,
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(transport: T, station: Station, options: Options) -> Self {
        let mut codec = codec::rtu::ClientCodec::default();
        codec.pdu_len_hint = options.pdu_len_hint;
        let framed = Framed::new(transport, codec);
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

#[cfg(test)]
mod tests {

    use core::{
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, Result};

    use crate::{client::Options, frame::Request, station::Station};

    #[derive(Debug)]
    struct MockTransport;

    impl AsyncRead for MockTransport {
        fn poll_read(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &mut ReadBuf<'_>,
        ) -> Poll<Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockTransport {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn handle_broken_pipe() {
        let transport = MockTransport;
        let mut client = super::Client::new(
            transport,
            Station(1),
            Options {
                read_timeout: None,
                ..Options::default()
            },
        );
        let res = client.call(Request::ReadCoils(0x00, 5)).await;
        let err = res.err().unwrap();
        assert!(matches!(err, crate::error::Error::Transport(io_err)
            if io_err.kind() == std::io::ErrorKind::BrokenPipe));
    }

    #[tokio::test]
    async fn broadcast_read_is_rejected() {
        let mut client =
            super::Client::new(MockTransport, Station::broadcast(), Options::default());
        let err = client.call(Request::ReadCoils(0x00, 5)).await.err().unwrap();
        assert!(matches!(err, crate::error::Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn broadcast_write_returns_synthesized_echo() {
        let mut client =
            super::Client::new(MockTransport, Station::broadcast(), Options::default());
        let rsp = client
            .call(Request::WriteSingleRegister(0x10, 0x1234))
            .await
            .unwrap();
        assert_eq!(rsp, crate::frame::Response::WriteSingleRegister(0x10, 0x1234));
    }
}
