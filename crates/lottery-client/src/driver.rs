//! Protocol driver — one run from first bet to winner list.
//!
//! ```text
//! SubmittingChunks ──source dry──▶ AnnouncingCompletion ──"OK"──▶ PollingResults ──"OK"──▶ Done
//!                                                                   │  ▲
//!                                                                   └──┘ not ready: back off, re-dial
//! ```
//!
//! Any failure aborts the run. Cancellation is checked against every phase,
//! including the sleeps between them; the future in flight is dropped and
//! its connection goes with it.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use lottery_core::wire::{self, Control, WinnerId, WINNER_ID_LEN};
use lottery_core::{Backoff, ClientConfig};

use crate::connection::{with_deadline, Connection, Dialer};
use crate::error::{ClientError, Result};
use crate::source::RecordSource;
use crate::submitter::BatchSubmitter;

/// Upper bound on the winners buffer reserved up front. The count comes
/// from the peer and is not trusted for allocation.
const WINNERS_PREALLOC: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    SubmittingChunks,
    AnnouncingCompletion,
    PollingResults,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::SubmittingChunks => "submitting_chunks",
            Phase::AnnouncingCompletion => "announcing_completion",
            Phase::PollingResults => "polling_results",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub chunks: usize,
    pub bets: usize,
    /// Polls made, including the one that returned the winners.
    pub polls: u32,
    pub winners: Vec<WinnerId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunReport),
    Cancelled,
}

pub struct Driver<D> {
    dialer: D,
    client_id: String,
    agency: u32,
    batch_max_amount: usize,
    loop_period: Duration,
    poll_backoff: Backoff,
    poll_max_attempts: Option<u32>,
    io_timeout: Option<Duration>,
}

impl<D: Dialer> Driver<D> {
    pub fn new(dialer: D, config: &ClientConfig) -> Self {
        Self {
            dialer,
            client_id: config.id.clone(),
            agency: config.agency,
            batch_max_amount: config.batch_max_amount,
            loop_period: config.loop_period(),
            poll_backoff: config.poll_backoff,
            poll_max_attempts: config.poll_max_attempts,
            io_timeout: config.io_timeout(),
        }
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Drive `source` through every phase.
    ///
    /// Returns `Cancelled` rather than an error when `cancel` fires; every
    /// other stop is an `Err` carrying the cause.
    pub async fn run<S>(&self, source: &mut S, cancel: CancellationToken) -> Result<RunOutcome>
    where
        S: RecordSource + ?Sized,
    {
        let span = tracing::info_span!("client", client_id = %self.client_id, agency = self.agency);

        async move {
            tracing::info!(source = source.source_name(), "run starting");
            let mut phase = Phase::SubmittingChunks;

            match self.run_phases(source, &cancel, &mut phase).await {
                Ok(report) => {
                    tracing::info!(
                        action = "run",
                        result = "success",
                        chunks = report.chunks,
                        bets = report.bets,
                        polls = report.polls,
                        winners = report.winners.len(),
                        "run complete"
                    );
                    Ok(RunOutcome::Completed(report))
                }
                Err(ClientError::Cancelled) => {
                    tracing::info!(action = "shutdown", result = "success", %phase, "run cancelled");
                    Ok(RunOutcome::Cancelled)
                }
                Err(e) => {
                    tracing::error!(action = "run", result = "fail", %phase, error = %e, "run aborted");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_phases<S>(
        &self,
        source: &mut S,
        cancel: &CancellationToken,
        phase: &mut Phase,
    ) -> Result<RunReport>
    where
        S: RecordSource + ?Sized,
    {
        let submitter = BatchSubmitter::new(&self.dialer, self.agency, self.batch_max_amount)
            .with_loop_period(self.loop_period)
            .with_io_timeout(self.io_timeout);
        let submitted = cancellable(cancel, submitter.submit_all(source)).await?;

        advance(phase, Phase::AnnouncingCompletion);
        cancellable(cancel, self.announce_completion()).await?;

        advance(phase, Phase::PollingResults);
        let (winners, polls) = cancellable(cancel, self.poll_results()).await?;

        advance(phase, Phase::Done);
        Ok(RunReport {
            chunks: submitted.chunks,
            bets: submitted.bets,
            polls,
            winners,
        })
    }

    /// Tell the aggregator this agency has nothing more to send.
    pub async fn announce_completion(&self) -> Result<()> {
        const PHASE: Phase = Phase::AnnouncingCompletion;

        let mut conn = self.dialer.open(PHASE).await?;
        let result = with_deadline(self.io_timeout, PHASE, async {
            conn.send_all(&wire::request_header(Control::EndBets, self.agency))
                .await?;
            let ack = conn.recv_ack().await?;
            if !wire::is_ok(&ack) {
                return Err(ClientError::Protocol { phase: PHASE, ack });
            }
            Ok(())
        })
        .await;
        conn.close().await;

        if result.is_ok() {
            tracing::info!(action = "end_bets", result = "success", "completion acknowledged");
        }
        result
    }

    /// Poll until the winners arrive, re-dialing for every attempt.
    ///
    /// Returns the winners and the number of polls it took.
    pub async fn poll_results(&self) -> Result<(Vec<WinnerId>, u32)> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if let Some(winners) = self.poll_once().await? {
                tracing::info!(
                    action = "winners_query",
                    result = "success",
                    attempt,
                    winners = winners.len(),
                    "winners received"
                );
                return Ok((winners, attempt));
            }

            if self.poll_max_attempts.is_some_and(|max| attempt >= max) {
                return Err(ClientError::PollExhausted { attempts: attempt });
            }

            let delay = self.poll_backoff.delay(attempt);
            tracing::debug!(
                action = "winners_query",
                result = "not_ready",
                attempt,
                delay_ms = delay.as_millis() as u64,
                "winners not ready"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One poll on a fresh connection. `None` means "not ready".
    async fn poll_once(&self) -> Result<Option<Vec<WinnerId>>> {
        const PHASE: Phase = Phase::PollingResults;

        let mut conn = self.dialer.open(PHASE).await?;
        let result = with_deadline(self.io_timeout, PHASE, query_winners(&mut conn, self.agency)).await;
        conn.close().await;
        result
    }
}

async fn query_winners<S>(conn: &mut Connection<S>, agency: u32) -> Result<Option<Vec<WinnerId>>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    conn.send_all(&wire::request_header(Control::GetWinners, agency))
        .await?;
    if !wire::is_ok(&conn.recv_ack().await?) {
        return Ok(None);
    }

    let count = conn.recv_u32().await? as usize;
    let mut winners = Vec::with_capacity(count.min(WINNERS_PREALLOC));
    for _ in 0..count {
        let mut id = [0u8; WINNER_ID_LEN];
        conn.recv_into(&mut id).await?;
        winners.push(WinnerId(id));
    }
    Ok(Some(winners))
}

fn advance(phase: &mut Phase, next: Phase) {
    tracing::debug!(from = %phase, to = %next, "phase transition");
    *phase = next;
}

/// Race `fut` against cancellation. A cancelled future is dropped where it
/// stands.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        result = fut => result,
    }
}
