//! Modbus ASCII server skeleton.
//!
//! Mirrors the RTU server, but frames are CRLF-delimited so any function
//! code can be framed without a length hint.

use std::time::Duration;

use futures_util::{sink::SinkExt as _, stream::StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    codec,
    error::Error,
    frame::{ascii::ResponseAdu, ExceptionResponse},
    server::Service,
    station::Station,
};

#[derive(Debug)]
pub struct Server<T> {
    transport: T,
    station: Station,
    read_timeout: Option<Duration>,
    delay_after_read: Option<Duration>,
}

impl<T> Server<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Attach the server to a transport, answering for `station`.
    #[must_use]
    pub fn new(transport: T, station: Station) -> Self {
        Self {
            transport,
            station,
            read_timeout: None,
            delay_after_read: None,
        }
    }

    /// Bound each frame read. Without a timeout the loop waits for the
    /// next request indefinitely.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Pause after each successfully decoded frame.
    #[must_use]
    pub fn delay_after_read(mut self, delay: Duration) -> Self {
        self.delay_after_read = Some(delay);
        self
    }

    /// Serve requests until the transport is closed.
    pub async fn serve_forever<S>(self, service: S) -> Result<(), Error>
    where
        S: Service,
    {
        let Self {
            transport,
            station,
            read_timeout,
            delay_after_read,
        } = self;
        let mut framed = Framed::new(transport, codec::ascii::ServerCodec);

        loop {
            let next = match read_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, framed.next()).await {
                    Ok(next) => next,
                    Err(_) => continue,
                },
                None => framed.next().await,
            };

            let Some(item) = next else {
                // Transport is exhausted
                break;
            };
            let (hdr, parsed) = match item {
                Ok(item) => item,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    // The codec has already drained the broken line.
                    log::warn!("Ignoring unreadable frame: {err}");
                    continue;
                }
            };

            if let Some(delay) = delay_after_read {
                tokio::time::sleep(delay).await;
            }

            if hdr.station != station.0 && !Station(hdr.station).is_broadcast() {
                log::debug!("Discarding frame addressed to station {}", hdr.station);
                continue;
            }
            let broadcast = Station(hdr.station).is_broadcast();

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
}
