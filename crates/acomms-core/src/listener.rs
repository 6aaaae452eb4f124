//! UDP receive loop feeding the raw log.

use std::net::SocketAddr;

use chrono::Utc;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::watch;

use crate::domain::{AcommsError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::raw_log::RawLogWriter;

/// Largest datagram read in one receive; longer datagrams are truncated by the OS.
pub const MAX_DATAGRAM: usize = 2048;

/// Receives datagrams and appends them, in arrival order, to the raw log.
pub struct Listener {
    socket: UdpSocket,
    writer: RawLogWriter,
    verbose: bool,
}

impl Listener {
    /// Bind the receive socket. Failure to bind is a transport error.
    pub async fn bind(addr: impl ToSocketAddrs, writer: RawLogWriter) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| AcommsError::Transport(format!("bind failed: {e}")))?;
        Ok(Self {
            socket,
            writer,
            verbose: false,
        })
    }

    /// Echo every received datagram to stdout.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| AcommsError::Transport(e.to_string()))
    }

    /// Log one datagram. Returns the number of raw log entries written.
    pub fn handle_datagram(&mut self, data: &[u8], from: SocketAddr) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let received = Utc::now();
        let text = String::from_utf8_lossy(data);
        if self.verbose {
            println!("{}", text.trim_end_matches(['\r', '\n']));
        }

        let source = from.to_string();
        let entries = self.writer.append_datagram(received, &source, &text)?;
        METRICS.inc_datagrams();
        obs::emit_datagram_logged(&source, data.len(), entries);
        Ok(entries)
    }

    /// Receive until `shutdown` flips to `true`. A datagram already received
    /// is always logged before the loop exits. Returns the datagram count.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<u64> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut received = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                res = self.socket.recv_from(&mut buf) => {
                    let (len, from) = res
                        .map_err(|e| AcommsError::Transport(format!("receive failed: {e}")))?;
                    if self.handle_datagram(&buf[..len], from)? > 0 {
                        received += 1;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(datagrams = received, "listener stopped");
        Ok(received)
    }
}
