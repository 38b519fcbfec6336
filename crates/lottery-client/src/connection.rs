//! Connection lifecycle.
//!
//! Every exchange with the aggregator gets its own connection: dial, run
//! one request/response, close. Nothing is pooled or reused, and the client
//! never holds more than one connection at a time. A `Connection` owns its
//! stream, so dropping it (on error, or when a cancelled future is dropped)
//! releases the socket; `close` is the orderly path.

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use lottery_core::wire::ACK_LEN;
use lottery_core::{Backoff, ClientConfig};

use crate::driver::Phase;
use crate::error::{ClientError, Result};
use crate::transport;

/// Opens one connection per exchange.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn open(&self, phase: Phase) -> Result<Connection<Self::Stream>>;
}

// ── Connection ────────────────────────────────────────────────────────────────

/// A single-use connection tagged with the phase it serves.
pub struct Connection<S> {
    stream: S,
    phase: Phase,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, phase: Phase) -> Self {
        Self { stream, phase }
    }

    pub async fn send_all(&mut self, buf: &[u8]) -> Result<()> {
        transport::send_all(&mut self.stream, buf)
            .await
            .map_err(|e| ClientError::io(self.phase, e))
    }

    pub async fn recv_into(&mut self, buf: &mut [u8]) -> Result<()> {
        transport::recv_into(&mut self.stream, buf)
            .await
            .map_err(|e| ClientError::io(self.phase, e))
    }

    pub async fn recv_u32(&mut self) -> Result<u32> {
        transport::recv_u32(&mut self.stream)
            .await
            .map_err(|e| ClientError::io(self.phase, e))
    }

    pub async fn recv_ack(&mut self) -> Result<[u8; ACK_LEN]> {
        transport::recv_ack(&mut self.stream)
            .await
            .map_err(|e| ClientError::io(self.phase, e))
    }

    /// Shut down the write side and drop the stream.
    ///
    /// Called on every exit path of an exchange. A failed shutdown only
    /// means the peer is already gone, so it is logged and otherwise ignored.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(phase = %self.phase, error = %e, "connection shutdown failed");
        }
    }
}

/// Bound one exchange by `deadline`, if there is one.
///
/// Expiry is reported as an I/O failure of `phase` with kind `TimedOut`.
pub async fn with_deadline<T, F>(deadline: Option<Duration>, phase: Phase, exchange: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        None => exchange.await,
        Some(limit) => match tokio::time::timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::io(
                phase,
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("exchange exceeded {}ms", limit.as_millis()),
                ),
            )),
        },
    }
}

// ── TCP ───────────────────────────────────────────────────────────────────────

/// Dials the aggregator over TCP with bounded retry.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    address: String,
    retries: u32,
    backoff: Backoff,
    connect_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new(address: impl Into<String>, retries: u32, backoff: Backoff) -> Self {
        Self {
            address: address.into(),
            retries,
            backoff,
            connect_timeout: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.server_address.clone(),
            config.connect_retries,
            config.connect_backoff,
        )
        .with_connect_timeout(config.io_timeout())
    }

    /// Bound each connect attempt. None = wait as long as the OS does.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect, retrying up to `retries` more times with `backoff` between
    /// attempts.
    pub async fn dial(&self) -> Result<TcpStream> {
        let attempts = self.retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.connect_once().await {
                Ok(stream) => {
                    if attempt > 1 {
                        tracing::info!(address = %self.address, attempt, "connected after retry");
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    if attempt < attempts {
                        let delay = self.backoff.delay(attempt);
                        tracing::warn!(
                            action = "connect",
                            result = "retry",
                            address = %self.address,
                            attempt,
                            max_attempts = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "connect failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        tracing::error!(
            action = "connect",
            result = "fail",
            address = %self.address,
            attempts,
            "connect attempts exhausted"
        );
        Err(ClientError::Connection {
            address: self.address.clone(),
            attempts,
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no connect attempt made")),
        })
    }

    async fn connect_once(&self) -> io::Result<TcpStream> {
        let stream = match self.connect_timeout {
            None => TcpStream::connect(&self.address).await?,
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(&self.address))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??,
        };
        // Requests are a handful of small writes; do not let Nagle hold them.
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn open(&self, phase: Phase) -> Result<Connection<TcpStream>> {
        let stream = self.dial().await?;
        tracing::debug!(%phase, address = %self.address, "connection opened");
        Ok(Connection::new(stream, phase))
    }
}
