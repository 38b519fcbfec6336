//! Lottery client integration test harness.
//!
//! Every test runs the real client against an in-process mock aggregator
//! listening on 127.0.0.1:0, so tests need no setup and never share ports:
//!
//!   cargo test --test integration
//!
//! The mock serves one connection at a time, records each exchange, and
//! answers from a per-test script.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use lottery_client::TcpDialer;
use lottery_core::wire::{BIRTHDATE_LEN, DOCUMENT_LEN, NUMBER_LEN};
use lottery_core::{Backoff, Bet, ClientConfig, Control};

mod failures;
mod polling;

// ── Script ────────────────────────────────────────────────────────────────────

/// Answer to one winners poll.
#[derive(Debug, Clone, Copy)]
pub enum PollReply {
    NotReady([u8; 2]),
    Ready,
}

/// How the mock answers. Polls past the end of `polls` are "not ready".
#[derive(Debug, Clone)]
pub struct Script {
    pub chunk_ack: [u8; 2],
    pub end_ack: [u8; 2],
    pub polls: VecDeque<PollReply>,
    pub winners: Vec<[u8; 8]>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            chunk_ack: *b"OK",
            end_ack: *b"OK",
            polls: VecDeque::from([PollReply::Ready]),
            winners: Vec::new(),
        }
    }
}

/// One request as the mock decoded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Chunk { agency: u32, bets: Vec<Bet> },
    EndBets { agency: u32 },
    Poll { agency: u32 },
}

#[derive(Default)]
struct Recorded {
    connections: usize,
    exchanges: Vec<Exchange>,
}

// ── Mock aggregator ───────────────────────────────────────────────────────────

pub struct MockAggregator {
    addr: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
    task: JoinHandle<()>,
}

impl MockAggregator {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));

        let state = recorded.clone();
        let task = tokio::spawn(async move {
            let mut script = script;
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                state.lock().unwrap().connections += 1;
                if let Err(e) = serve(&mut stream, &mut script, &state).await {
                    eprintln!("mock aggregator: exchange failed: {e}");
                }
            }
        });

        Self {
            addr,
            recorded,
            task,
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn connections(&self) -> usize {
        self.recorded.lock().unwrap().connections
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.recorded.lock().unwrap().exchanges.clone()
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.exchanges()
            .iter()
            .filter_map(|e| match e {
                Exchange::Chunk { bets, .. } => Some(bets.len()),
                _ => None,
            })
            .collect()
    }

    pub fn polls(&self) -> usize {
        self.exchanges()
            .iter()
            .filter(|e| matches!(e, Exchange::Poll { .. }))
            .count()
    }
}

impl Drop for MockAggregator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: &mut TcpStream,
    script: &mut Script,
    state: &Mutex<Recorded>,
) -> io::Result<()> {
    let control = stream.read_u8().await?;
    let agency = stream.read_u32().await?;
    let control = Control::try_from(control)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    match control {
        Control::BetChunk => {
            let count = stream.read_u32().await?;
            let mut bets = Vec::with_capacity(count as usize);
            for _ in 0..count {
                bets.push(read_bet(stream).await?);
            }
            record(state, Exchange::Chunk { agency, bets });
            stream.write_all(&script.chunk_ack).await?;
        }
        Control::EndBets => {
            record(state, Exchange::EndBets { agency });
            stream.write_all(&script.end_ack).await?;
        }
        Control::GetWinners => {
            record(state, Exchange::Poll { agency });
            match script.polls.pop_front().unwrap_or(PollReply::NotReady(*b"NO")) {
                PollReply::NotReady(ack) => stream.write_all(&ack).await?,
                PollReply::Ready => {
                    let mut reply = Vec::with_capacity(6 + 8 * script.winners.len());
                    reply.extend_from_slice(b"OK");
                    reply.extend_from_slice(&(script.winners.len() as u32).to_be_bytes());
                    for id in &script.winners {
                        reply.extend_from_slice(id);
                    }
                    stream.write_all(&reply).await?;
                }
            }
        }
    }
    stream.flush().await
}

fn record(state: &Mutex<Recorded>, exchange: Exchange) {
    state.lock().unwrap().exchanges.push(exchange);
}

/// Read one length-prefixed bet off the wire and decode it.
async fn read_bet(stream: &mut TcpStream) -> io::Result<Bet> {
    let mut raw = Vec::new();
    for _ in 0..2 {
        let len = stream.read_u8().await?;
        raw.push(len);
        let start = raw.len();
        raw.resize(start + len as usize, 0);
        stream.read_exact(&mut raw[start..]).await?;
    }
    let start = raw.len();
    raw.resize(start + DOCUMENT_LEN + BIRTHDATE_LEN + NUMBER_LEN, 0);
    stream.read_exact(&mut raw[start..]).await?;

    let mut buf = raw.as_slice();
    Bet::decode(&mut buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

// ── Client helpers ────────────────────────────────────────────────────────────

/// Config pointed at `aggregator` with short delays.
pub fn client_config(aggregator: &MockAggregator, batch_max_amount: usize) -> ClientConfig {
    ClientConfig {
        id: "7".to_string(),
        server_address: aggregator.address(),
        agency: 7,
        batch_max_amount,
        connect_retries: 1,
        connect_backoff: Backoff::fixed(10),
        poll_backoff: Backoff::fixed(10),
        io_timeout_ms: Some(5_000),
        ..ClientConfig::default()
    }
}

pub fn dialer(config: &ClientConfig) -> TcpDialer {
    TcpDialer::from_config(config)
}

pub fn bet_row(i: usize) -> [String; 5] {
    [
        format!("Name{i}"),
        "Surname".to_string(),
        format!("{}", 30_000_000 + i),
        "1999-03-17".to_string(),
        (7_000 + i).to_string(),
    ]
}

/// Upper bound for a whole run; a hang fails the test instead of the suite.
pub const RUN_LIMIT: Duration = Duration::from_secs(10);
