//! UDP receive loop feeding the ingestion queue.
//!
//! Each datagram is one complete payload. Datagrams are decoded as UTF-8,
//! trimmed and submitted with backpressure: when the queue is full the loop
//! stops reading until a worker frees a slot, and the kernel socket buffer
//! absorbs the burst.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};
use traceview::IngestHandle;
use traceview::ingest::MAX_PAYLOAD_BYTES;

/// A bound UDP socket, ready to run.
#[derive(Debug)]
pub struct UdpReceiver {
    socket: UdpSocket,
}

impl UdpReceiver {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns the bind error; the server treats it as fatal.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    /// Address the socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS cannot report the address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives datagrams until `shutdown` resolves or the queue closes.
    ///
    /// Dropping `handle` on return lets the pipeline drain and stop.
    pub async fn run(self, handle: IngestHandle, shutdown: impl Future<Output = ()>) {
        let mut buf = vec![0u8; MAX_PAYLOAD_BYTES];
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let (len, src) = tokio::select! {
                () = &mut shutdown => {
                    info!("UDP receiver stopping");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(error = %e, "UDP receive failed");
                        continue;
                    }
                },
            };
            trace!(%src, bytes = len, "received datagram");

            let payload = match std::str::from_utf8(&buf[..len]) {
                Ok(text) => text.trim(),
                Err(e) => {
                    warn!(%src, error = %e, "dropping datagram that is not valid UTF-8");
                    continue;
                }
            };
            if payload.is_empty() {
                debug!(%src, "dropping empty datagram");
                continue;
            }

            if let Err(e) = handle.submit(payload.to_string()).await {
                warn!(error = %e, "UDP receiver stopping");
                break;
            }
        }
    }
}
