//! Bet submission — chunk, frame, send, check the ack.
//!
//! Rows are pulled from the source and encoded straight into the chunk
//! body, so a bad row fails before anything about its chunk hits the wire.
//! Each chunk travels on its own connection:
//!
//! ```text
//! u8 BET_CHUNK | u32 agency | u32 count | count × bet   →   "OK"
//! ```
//!
//! Any failure aborts the whole submission. Chunks already acknowledged
//! stay with the aggregator; there is no resume point.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use lottery_core::wire::{self, Control, MAX_BET_SIZE, REQUEST_HEADER_LEN};
use lottery_core::Bet;

use crate::connection::{with_deadline, Connection, Dialer};
use crate::driver::Phase;
use crate::error::{ClientError, Result};
use crate::source::RecordSource;

const PHASE: Phase = Phase::SubmittingChunks;

/// Totals for a finished submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitReport {
    pub chunks: usize,
    pub bets: usize,
}

/// Encoded bets waiting to be sent as one chunk.
#[derive(Debug)]
pub struct Chunk {
    count: u32,
    body: BytesMut,
}

impl Chunk {
    fn with_capacity(bets: usize) -> Self {
        Self {
            count: 0,
            body: BytesMut::with_capacity(bets * MAX_BET_SIZE),
        }
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The full request for this chunk: header, count, bets.
    pub fn frame(&self, agency: u32) -> Bytes {
        let mut frame = BytesMut::with_capacity(REQUEST_HEADER_LEN + 4 + self.body.len());
        frame.put_slice(&wire::request_header(Control::BetChunk, agency));
        frame.put_u32(self.count);
        frame.put_slice(&self.body);
        frame.freeze()
    }
}

pub struct BatchSubmitter<'a, D> {
    dialer: &'a D,
    agency: u32,
    chunk_size: usize,
    loop_period: Duration,
    io_timeout: Option<Duration>,
}

impl<'a, D: Dialer> BatchSubmitter<'a, D> {
    /// `max_bets` is the configured chunk size; it is clamped to what the
    /// chunk byte budget allows.
    pub fn new(dialer: &'a D, agency: u32, max_bets: usize) -> Self {
        let chunk_size = wire::effective_chunk_size(max_bets);
        if chunk_size < max_bets {
            tracing::warn!(
                configured = max_bets,
                effective = chunk_size,
                "chunk size reduced to fit byte budget"
            );
        }
        Self {
            dialer,
            agency,
            chunk_size,
            loop_period: Duration::ZERO,
            io_timeout: None,
        }
    }

    /// Pause between consecutive chunks.
    pub fn with_loop_period(mut self, period: Duration) -> Self {
        self.loop_period = period;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Send every bet in `source`, one chunk per connection.
    pub async fn submit_all<S>(&self, source: &mut S) -> Result<SubmitReport>
    where
        S: RecordSource + ?Sized,
    {
        let mut report = SubmitReport::default();

        while let Some(chunk) = self.next_chunk(source).await? {
            if report.chunks > 0 && !self.loop_period.is_zero() {
                tokio::time::sleep(self.loop_period).await;
            }

            self.send_chunk(&chunk).await?;
            report.chunks += 1;
            report.bets += chunk.len();

            tracing::info!(
                action = "chunk_sent",
                result = "success",
                chunk = report.chunks,
                bets = chunk.len(),
                total_bets = report.bets,
                "bet chunk acknowledged"
            );
        }

        Ok(report)
    }

    /// Pull up to `chunk_size` rows. `None` once the source is dry, so an
    /// empty trailing chunk is never built.
    pub async fn next_chunk<S>(&self, source: &mut S) -> Result<Option<Chunk>>
    where
        S: RecordSource + ?Sized,
    {
        let mut chunk = Chunk::with_capacity(self.chunk_size);

        while chunk.len() < self.chunk_size {
            let Some(row) = source.next_row().await? else {
                break;
            };
            let line = source.line();
            let bet = Bet::decode_row(row.as_slice())
                .map_err(|source| ClientError::Parse { line, source })?;
            bet.encode(&mut chunk.body)
                .map_err(|source| ClientError::Validation { line, source })?;
            chunk.count += 1;
        }

        Ok((!chunk.is_empty()).then_some(chunk))
    }

    async fn send_chunk(&self, chunk: &Chunk) -> Result<()> {
        let mut conn = self.dialer.open(PHASE).await?;
        let result = with_deadline(
            self.io_timeout,
            PHASE,
            exchange_chunk(&mut conn, chunk.frame(self.agency)),
        )
        .await;
        conn.close().await;
        result
    }
}

async fn exchange_chunk<S>(conn: &mut Connection<S>, frame: Bytes) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    conn.send_all(&frame).await?;
    let ack = conn.recv_ack().await?;
    if !wire::is_ok(&ack) {
        return Err(ClientError::Protocol { phase: PHASE, ack });
    }
    Ok(())
}
